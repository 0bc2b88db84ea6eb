// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use crate::types::Href;

/// `CalDAV` client errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CalDavError {
    /// The request never produced a response (connect, timeout, TLS, body).
    #[error("Network error: {0}")]
    Network(String),

    /// 404 / 410: the resource does not exist (any more).
    #[error("Resource not found: {0}")]
    NotFound(Href),

    /// 412: the `If-Match` / `If-None-Match` precondition failed.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(Href),

    /// Any other non-success status.
    #[error("HTTP {code}: {message}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Response body, possibly truncated.
        message: String,
    },

    /// The server answered, but not with what the protocol requires.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CalDavError {
    /// HTTP status code of the failure, if the server answered.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::NotFound(_) => Some(404),
            Self::PreconditionFailed(_) => Some(412),
            Self::Status { code, .. } => Some(*code),
            Self::Network(_) | Self::InvalidResponse(_) | Self::Config(_) => None,
        }
    }

    /// Whether retrying the same request later may succeed: network failures,
    /// 408, 429 and 5xx.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { code, .. } => matches!(code, 408 | 429) || *code >= 500,
            Self::NotFound(_)
            | Self::PreconditionFailed(_)
            | Self::InvalidResponse(_)
            | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for CalDavError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Self::Config(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let status = |code| CalDavError::Status {
            code,
            message: String::new(),
        };

        assert!(CalDavError::Network("reset".to_string()).is_retryable());
        assert!(status(408).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!CalDavError::NotFound(Href::from("/a.ics")).is_retryable());
        assert!(!CalDavError::PreconditionFailed(Href::from("/a.ics")).is_retryable());
    }

    #[test]
    fn status_code_of_classified_errors() {
        assert_eq!(
            CalDavError::NotFound(Href::from("/a.ics")).status_code(),
            Some(404)
        );
        assert_eq!(
            CalDavError::PreconditionFailed(Href::from("/a.ics")).status_code(),
            Some(412)
        );
        assert_eq!(CalDavError::Network("x".to_string()).status_code(), None);
    }
}
