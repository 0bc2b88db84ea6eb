// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Server settings for the write client, read from the `[caldav]` table.

use std::fmt;
use std::time::Duration;

use crate::error::CalDavError;
use crate::types::Href;

/// Credentials sent with every write.
#[derive(Clone, Default, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}

/// Where and how the push queue writes calendar objects.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CalDavConfig {
    /// Origin that relative hrefs (collections and stored resources) are
    /// resolved against.
    pub base_url: String,

    #[serde(default)]
    pub auth: AuthMethod,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

const fn default_timeout() -> u64 {
    30
}

const fn default_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("calsync-caldav/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for CalDavConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth: AuthMethod::default(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl CalDavConfig {
    /// Rejects settings no write could succeed with.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::Config`] naming the offending setting.
    pub fn validate(&self) -> Result<(), CalDavError> {
        let base = self.base_url.trim();
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(CalDavError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(CalDavError::Config("timeout_secs must be positive".into()));
        }
        if let AuthMethod::Basic { username, .. } = &self.auth {
            if username.is_empty() {
                return Err(CalDavError::Config("basic auth needs a username".into()));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.min(self.timeout_secs))
    }

    /// Absolute URL of `href`; absolute hrefs returned by the server are kept.
    pub fn resolve(&self, href: &Href) -> String {
        if href.is_absolute() {
            href.as_str().to_string()
        } else {
            let base = self.base_url.trim().trim_end_matches('/');
            if href.as_str().starts_with('/') {
                format!("{base}{href}")
            } else {
                format!("{base}/{href}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> CalDavConfig {
        CalDavConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn resolve_joins_relative_hrefs_once() {
        let config = config("https://dav.example.com/");

        assert_eq!(
            config.resolve(&Href::from("/cal/work/a.ics")),
            "https://dav.example.com/cal/work/a.ics"
        );
        assert_eq!(
            config.resolve(&Href::from("cal/work/a.ics")),
            "https://dav.example.com/cal/work/a.ics"
        );
        assert_eq!(
            config.resolve(&Href::from("https://other.example.com/x.ics")),
            "https://other.example.com/x.ics"
        );
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        assert!(config("https://dav.example.com").validate().is_ok());
        assert!(matches!(
            config("dav.example.com").validate(),
            Err(CalDavError::Config(_))
        ));

        let mut zero = config("https://dav.example.com");
        zero.timeout_secs = 0;
        assert!(zero.validate().is_err());

        let mut anonymous = config("https://dav.example.com");
        anonymous.auth = AuthMethod::Basic {
            username: String::new(),
            password: "secret".to_string(),
        };
        assert!(anonymous.validate().is_err());
    }

    #[test]
    fn connect_timeout_never_exceeds_request_timeout() {
        let mut config = config("https://dav.example.com");
        config.timeout_secs = 5;

        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn debug_hides_secrets() {
        let auth = AuthMethod::Basic {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        let bearer = AuthMethod::Bearer {
            token: "s3cr3t-token".to_string(),
        };

        let shown = format!("{auth:?} {bearer:?}");

        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("s3cr3t"));
    }
}
