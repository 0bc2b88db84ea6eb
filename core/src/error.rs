// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::types::{CalendarId, EventId};

/// Errors surfaced by the sync engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Database query or connection failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure while opening the local store.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The referenced event does not exist.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// The referenced calendar does not exist.
    #[error("Calendar not found: {0}")]
    CalendarNotFound(CalendarId),

    /// The requested mutation is not valid for the event's current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
}
