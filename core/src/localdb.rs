// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

pub mod calendars;
pub mod events;
pub mod occurrences;
pub mod pending_ops;
pub mod sessions;

#[cfg(test)]
pub(crate) mod tests_utils;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::error::Error;
use crate::localdb::calendars::{Calendar, NewCalendar};
use crate::pending::PendingOperation;
use crate::types::CalendarId;

/// Handle to the local store.
///
/// Cheap to clone; every component that mutates state receives one and opens
/// its own transaction per entry point.
#[derive(Debug, Clone)]
pub struct LocalDb {
    pool: SqlitePool,
}

impl LocalDb {
    /// Opens a sqlite database connection.
    /// If `filename` is `None`, it opens a private in-memory database.
    pub async fn open(filename: Option<&Path>) -> Result<Self, Error> {
        let (options, pool_options) = if let Some(filename) = filename {
            tracing::info!(path = %filename.display(), "connecting to SQLite database");
            let options = SqliteConnectOptions::new()
                .filename(filename)
                .create_if_missing(true)
                .foreign_keys(true);
            (options, SqlitePoolOptions::new())
        } else {
            tracing::info!("connecting to in-memory SQLite database");
            // Every connection would get its own in-memory database; keep a
            // single one alive for the life of the pool.
            let options = SqliteConnectOptions::new()
                .in_memory(true)
                .foreign_keys(true);
            let pool_options = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            (options, pool_options)
        };

        let pool = pool_options.connect_with(options).await?;

        tracing::debug!("running database migrations");
        sqlx::migrate!("src/localdb/migrations") // relative path from the crate root
            .run(&pool)
            .await?;

        Ok(LocalDb { pool })
    }

    /// Starts a transaction. Repository functions take the connection it
    /// derefs to.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, Error> {
        Ok(self.pool.begin().await?)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Registers a calendar. Without an account or collection URL it is
    /// local-only and never synchronized.
    pub async fn add_calendar(
        &self,
        account_id: Option<i64>,
        url: Option<&str>,
        display_name: &str,
    ) -> Result<Calendar, Error> {
        let mut conn = self.pool.acquire().await?;
        let record = NewCalendar {
            account_id,
            url: url.map(ToString::to_string),
            display_name: display_name.to_string(),
        };
        let id = calendars::insert(&mut conn, &record).await?;
        Ok(record.into_calendar(id))
    }

    pub async fn calendar(&self, id: CalendarId) -> Result<Option<Calendar>, Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(calendars::get(&mut conn, id).await?)
    }

    /// Every queued operation, oldest first.
    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>, Error> {
        let mut conn = self.pool.acquire().await?;
        Ok(pending_ops::list(&mut conn).await?)
    }

    pub async fn close(self) -> Result<(), Error> {
        tracing::debug!("closing database connection");
        self.pool.close().await;
        Ok(())
    }
}

/// `?, ?, ?` with `n` placeholders, for `IN (...)` clauses.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
