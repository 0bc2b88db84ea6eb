// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, sync::Arc};

use calsync_caldav::CalDavConfig;
use calsync_core::{Clock, Config as CoreConfig, LocalDb, SessionLog, SystemClock};
use tokio::fs;

use crate::config::Config;

/// Opened local store plus the settings commands run against.
#[derive(Debug)]
pub struct App {
    pub core: CoreConfig,
    pub caldav: Option<CalDavConfig>,
    pub db: LocalDb,
    pub clock: Arc<dyn Clock>,
}

impl App {
    pub async fn open(mut core: CoreConfig, config: Config) -> Result<Self, Box<dyn Error>> {
        core.normalize()?;

        let path = core.database_path();
        if let Some(dir) = &core.state_dir {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| format!("Failed to create state directory {}: {e}", dir.display()))?;
        }
        let db = LocalDb::open(path.as_deref()).await?;

        Ok(Self {
            core,
            caldav: config.caldav,
            db,
            clock: Arc::new(SystemClock),
        })
    }

    /// Session log with the configured retention.
    pub fn session_log(&self) -> SessionLog {
        SessionLog::new(
            self.db.clone(),
            self.clock.clone(),
            self.core.sync.session_retention.as_millis(),
            self.core.sync.session_max_entries,
        )
    }

    pub async fn close(self) -> Result<(), Box<dyn Error>> {
        self.db.close().await?;
        Ok(())
    }
}
