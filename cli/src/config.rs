// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, path::PathBuf, str::FromStr};

use calsync_caldav::CalDavConfig;
use calsync_core::{APP_NAME, Config as CoreConfig, get_config_dir};
use tokio::fs;

const CALSYNC_CONFIG_ENV: &str = "CALSYNC_CONFIG";

/// Resolves the config file (`--config`, then `$CALSYNC_CONFIG`, then the
/// user config directory) and parses it.
#[tracing::instrument]
pub async fn parse_config(path: Option<PathBuf>) -> Result<(CoreConfig, Config), Box<dyn Error>> {
    let path = if let Some(path) = path {
        path
    } else if let Ok(env_path) = std::env::var(CALSYNC_CONFIG_ENV) {
        PathBuf::from(env_path)
    } else {
        let config = get_config_dir()?.join(format!("{APP_NAME}/config.toml"));
        if !config.exists() {
            return Err(format!("No config found at: {}", config.display()).into());
        }
        config
    };

    tracing::debug!(path = %path.display(), "reading config file");
    fs::read_to_string(&path)
        .await
        .map_err(|e| format!("Failed to read config file at {}: {}", path.display(), e))?
        .parse::<ConfigRaw>()
        .map(|a| (a.core, Config { caldav: a.caldav }))
}

/// Settings only the command line needs.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Server the push pass talks to. Without it only inspection commands work.
    pub caldav: Option<CalDavConfig>,
}

#[derive(Debug, serde::Deserialize)]
struct ConfigRaw {
    #[serde(default)]
    core: CoreConfig,
    caldav: Option<CalDavConfig>,
}

impl FromStr for ConfigRaw {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
