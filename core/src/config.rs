// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use jiff::SignedDuration;
use serde::de;

use crate::error::Error;
use crate::pending::RetryPolicy;
use crate::recurrence::{DEFAULT_MAX_INSTANCES, Expander, system_timezone};
use crate::types::Millis;

/// The name of the application.
pub const APP_NAME: &str = "calsync";

/// File name of the local store inside the state directory.
pub const DATABASE_FILE: &str = "calsync.db";

/// Configuration for the sync engine.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Directory for storing application state.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Tunables of the recurrence and push machinery.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Config {
    /// Normalize the configuration.
    pub fn normalize(&mut self) -> Result<(), Error> {
        match &self.state_dir {
            Some(a) => {
                self.state_dir = Some(expand_path(a).map_err(|e| {
                    Error::Config(format!("Failed to expand state directory path: {e}"))
                })?);
            }

            None => match get_state_dir() {
                Ok(a) => self.state_dir = Some(a.join(APP_NAME)),
                Err(e) => tracing::warn!(err = %e, "failed to get state directory"),
            },
        }

        if let Some(name) = &self.sync.local_timezone {
            name.parse::<Tz>()
                .map_err(|_| Error::Config(format!("Unknown timezone: {name}")))?;
        }

        Ok(())
    }

    /// Path of the database file, `None` when running without a state
    /// directory (in-memory).
    pub fn database_path(&self) -> Option<PathBuf> {
        self.state_dir.as_ref().map(|a| a.join(DATABASE_FILE))
    }
}

/// Tunables under `[core.sync]`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How far ahead recurring events are materialized.
    pub horizon: ConfigDuration,

    /// Drift tolerated when re-attaching exception links after regeneration.
    pub exception_tolerance: ConfigDuration,

    /// Maximum instances produced by one expansion.
    pub max_expansion: usize,

    /// First retry delay.
    pub backoff_base: ConfigDuration,

    /// Retry delay ceiling.
    pub backoff_max: ConfigDuration,

    /// Retries before an operation is marked failed.
    pub max_retries: u32,

    /// Total queue residency before an operation is abandoned.
    pub operation_lifetime: ConfigDuration,

    /// Age after which failed operations are reset to pending.
    pub auto_recover_after: ConfigDuration,

    /// How long sync sessions are kept in the diagnostics log.
    pub session_retention: ConfigDuration,

    /// Maximum entries kept in the diagnostics log.
    pub session_max_entries: u32,

    /// IANA name of the zone floating events are evaluated in. Defaults to
    /// the system zone.
    pub local_timezone: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            horizon: ConfigDuration::from_hours(365 * 24),
            exception_tolerance: ConfigDuration(SignedDuration::from_secs(60)),
            max_expansion: DEFAULT_MAX_INSTANCES,
            backoff_base: ConfigDuration(SignedDuration::from_secs(30)),
            backoff_max: ConfigDuration::from_hours(6),
            max_retries: 8,
            operation_lifetime: ConfigDuration::from_hours(30 * 24),
            auto_recover_after: ConfigDuration::from_hours(24),
            session_retention: ConfigDuration::from_hours(48),
            session_max_entries: 200,
            local_timezone: None,
        }
    }
}

impl SyncConfig {
    pub fn local_timezone(&self) -> Tz {
        self.local_timezone
            .as_deref()
            .and_then(|a| a.parse().ok())
            .unwrap_or_else(system_timezone)
    }

    pub fn expander(&self) -> Expander {
        Expander::new(self.local_timezone(), self.max_expansion)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: self.backoff_base.as_millis(),
            max: self.backoff_max.as_millis(),
            max_retries: self.max_retries,
            lifetime: self.operation_lifetime.as_millis(),
            auto_recover_after: self.auto_recover_after.as_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDuration(pub SignedDuration);

impl ConfigDuration {
    pub fn from_hours(hours: i64) -> Self {
        Self(SignedDuration::from_hours(hours))
    }

    pub fn as_millis(&self) -> Millis {
        i64::try_from(self.0.as_millis()).unwrap_or(i64::MAX)
    }
}

impl<'de> serde::Deserialize<'de> for ConfigDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct DurationVisitor;

        impl de::Visitor<'_> for DurationVisitor {
            type Value = ConfigDuration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter
                    .write_str(r#"a duration string like "HH:MM", "1d", "24h", "60m", or "1800s""#)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                parse_duration(value)
                    .map(ConfigDuration)
                    .map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(DurationVisitor)
    }
}

/// Handle tilde (~) and environment variables in the path
pub fn expand_path(path: &Path) -> Result<PathBuf, String> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }

    let path = path.to_str().ok_or("Invalid path")?;

    // Handle tilde and home directory
    let home_prefixes: &[&str] = if cfg!(unix) {
        &["~/", "$HOME/", "${HOME}/"]
    } else {
        &[r"~\", "~/", r"%UserProfile%\", r"%UserProfile%/"]
    };
    for prefix in home_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return Ok(get_home_dir()?.join(stripped));
        }
    }

    // Handle config directories
    let config_prefixes: &[&str] = if cfg!(unix) {
        &["$XDG_CONFIG_HOME/", "${XDG_CONFIG_HOME}/"]
    } else {
        &[r"%LOCALAPPDATA%\", "%LOCALAPPDATA%/"]
    };
    for prefix in config_prefixes {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return Ok(get_config_dir()?.join(stripped));
        }
    }

    Ok(path.into())
}

fn get_home_dir() -> Result<PathBuf, String> {
    dirs::home_dir().ok_or_else(|| "User-specific home directory not found".to_string())
}

/// User configuration directory (`$XDG_CONFIG_HOME` on unix).
pub fn get_config_dir() -> Result<PathBuf, String> {
    #[cfg(unix)]
    let config_dir = xdg::BaseDirectories::new().get_config_home();
    #[cfg(windows)]
    let config_dir = dirs::config_dir();
    config_dir.ok_or_else(|| "User-specific config directory not found".to_string())
}

fn get_state_dir() -> Result<PathBuf, String> {
    #[cfg(unix)]
    let state_dir = xdg::BaseDirectories::new().get_state_home();
    #[cfg(windows)]
    let state_dir = dirs::data_dir();
    state_dir.ok_or_else(|| "User-specific state directory not found".to_string())
}

/// Parse a duration string in the format "HH:MM" / "1d" / "24h" / "60m" / "1800s".
fn parse_duration(s: &str) -> Result<SignedDuration, String> {
    let number = |v: &str| -> Result<i64, String> {
        v.trim()
            .parse()
            .map_err(|e| format!("Invalid duration {s:?}: {e}"))
    };

    // Try to parse "HH:MM" format
    if let Some((h, m)) = s.split_once(':') {
        let hours = number(h)?;
        let minutes = number(m)?;
        Ok(SignedDuration::from_mins(hours * 60 + minutes))
    }
    // Match suffix-based formats
    else if let Some(rest) = s.strip_suffix('d') {
        Ok(SignedDuration::from_hours(number(rest)? * 24))
    } else if let Some(rest) = s.strip_suffix('h') {
        Ok(SignedDuration::from_hours(number(rest)?))
    } else if let Some(rest) = s.strip_suffix('m') {
        Ok(SignedDuration::from_mins(number(rest)?))
    } else if let Some(rest) = s.strip_suffix('s') {
        Ok(SignedDuration::from_secs(number(rest)?))
    } else {
        Err(format!("Invalid duration format: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_home_env() {
        let home = get_home_dir().unwrap();
        let home_prefixes: &[&str] = if cfg!(unix) {
            &["~", "$HOME", "${HOME}"]
        } else {
            &[r"~", r"%UserProfile%"]
        };
        for prefix in home_prefixes {
            let result = expand_path(&PathBuf::from(format!("{prefix}/state"))).unwrap();
            assert_eq!(result, home.join("state"));
            assert!(result.is_absolute());
        }
    }

    #[test]
    fn test_expand_path_absolute() {
        let absolute_path = PathBuf::from("/var/lib/calsync");
        assert_eq!(expand_path(&absolute_path).unwrap(), absolute_path);
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(
            parse_duration("01:30").unwrap(),
            SignedDuration::from_mins(90)
        );
        assert_eq!(
            parse_duration("30d").unwrap(),
            SignedDuration::from_hours(720)
        );
        assert_eq!(parse_duration("6h").unwrap(), SignedDuration::from_hours(6));
        assert_eq!(parse_duration("45m").unwrap(), SignedDuration::from_mins(45));
        assert_eq!(
            parse_duration("1800s").unwrap(),
            SignedDuration::from_secs(1800)
        );
    }

    #[test]
    fn test_parse_duration_invalid_format() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("99x").is_err());
        assert!(parse_duration("12:").is_err());
        assert!(parse_duration("12").is_err());
    }

    #[test]
    fn test_sync_defaults() {
        let sync = SyncConfig::default();
        assert_eq!(sync.horizon.as_millis(), 365 * 86_400_000);
        assert_eq!(sync.exception_tolerance.as_millis(), 60_000);
        assert_eq!(sync.max_expansion, 1000);

        let policy = sync.retry_policy();
        assert_eq!(policy.base, 30_000);
        assert_eq!(policy.max, 6 * 3_600_000);
        assert_eq!(policy.max_retries, 8);
        assert_eq!(policy.lifetime, 30 * 86_400_000);
        assert_eq!(policy.auto_recover_after, 24 * 3_600_000);
    }

    #[test]
    fn test_deserialize_partial_sync_section() {
        let config: Config = toml::from_str(
            r#"
state_dir = "/tmp/calsync"

[sync]
backoff_base = "1m"
max_retries = 3
local_timezone = "Europe/Berlin"
"#,
        )
        .unwrap();

        assert_eq!(config.sync.backoff_base.as_millis(), 60_000);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.local_timezone(), chrono_tz::Europe::Berlin);
        // untouched keys keep their defaults
        assert_eq!(config.sync.session_max_entries, 200);
        assert_eq!(
            config.database_path(),
            Some(PathBuf::from("/tmp/calsync/calsync.db"))
        );
    }

    #[test]
    fn test_normalize_rejects_unknown_timezone() {
        let mut config = Config {
            state_dir: Some(PathBuf::from("/tmp/calsync")),
            ..Default::default()
        };
        config.sync.local_timezone = Some("Nowhere/Special".to_string());
        assert!(config.normalize().is_err());
    }
}
