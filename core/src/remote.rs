// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Collaborator interfaces of the push service: the transport that talks to
//! the server and the serializer that produces payloads.

use async_trait::async_trait;

use crate::event::Event;

/// Location and version token assigned by the server on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub location: String,
    pub etag: String,
}

/// A failed remote call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The version precondition did not hold.
    #[error("version conflict")]
    Conflict,

    /// The resource does not exist.
    #[error("resource not found")]
    NotFound,

    #[error("remote error {code}: {message}")]
    Failed {
        /// HTTP status code, 0 when no response was received.
        code: u16,
        message: String,
        retryable: bool,
    },
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Conflict => true,
            RemoteError::NotFound => false,
            RemoteError::Failed { retryable, .. } => *retryable,
        }
    }

    /// Short machine-readable tag recorded on sessions, without server text.
    pub fn error_type(&self) -> String {
        match self {
            RemoteError::Conflict => "conflict".to_string(),
            RemoteError::NotFound => "not_found".to_string(),
            RemoteError::Failed { code: 0, .. } => "network".to_string(),
            RemoteError::Failed { code, .. } => format!("http_{code}"),
        }
    }
}

/// Protocol client used to push changes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Creates a resource for `uid` in the collection at `calendar_url`. Must
    /// fail with [`RemoteError::Conflict`] if it already exists.
    async fn create_event(
        &self,
        calendar_url: &str,
        uid: &str,
        payload: String,
    ) -> Result<CreatedResource, RemoteError>;

    /// Replaces the resource at `url` if its version is still `etag`,
    /// returning the new version.
    async fn update_event(
        &self,
        url: &str,
        payload: String,
        etag: &str,
    ) -> Result<String, RemoteError>;

    /// Removes the resource at `url`, conditionally when `etag` is known.
    async fn delete_event(&self, url: &str, etag: Option<&str>) -> Result<(), RemoteError>;
}

/// Turns events into wire payloads.
pub trait Serializer: Send + Sync {
    fn serialize(&self, event: &Event) -> String;

    /// A recurring master together with its exceptions, in one payload.
    fn serialize_with_exceptions(&self, master: &Event, exceptions: &[Event]) -> String;
}
