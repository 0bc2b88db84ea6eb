// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Offline-first calendar sync engine: recurrence expansion into a
//! materialized occurrence table, a transactional event write path, and a
//! retryable push queue.

mod caldav;
mod config;
mod diagnostics;
mod error;
mod event;
mod event_service;
mod ics;
pub mod localdb;
mod occurrence;
mod pending;
mod push;
pub mod recurrence;
mod remote;
mod session;
mod types;

pub use crate::caldav::CalDavTransport;
pub use crate::config::{
    APP_NAME, Config, ConfigDuration, DATABASE_FILE, SyncConfig, expand_path, get_config_dir,
};
pub use crate::diagnostics::{DiagnosticsSink, NoopSink, SessionLog, format_session};
pub use crate::error::Error;
pub use crate::event::{
    ChangeSource, Event, EventDraft, EventKind, EventPatch, Recurrence, SyncStatus,
};
pub use crate::event_service::{EventService, MovePlan};
pub use crate::ics::IcsSerializer;
pub use crate::localdb::LocalDb;
pub use crate::localdb::calendars::Calendar;
pub use crate::localdb::occurrences::Occurrence;
pub use crate::occurrence::OccurrenceSync;
pub use crate::pending::{
    MovePhase, Operation, OperationKind, OperationStatus, PendingOperation, RemoteTarget,
    RetryPolicy, Upgrade,
};
pub use crate::push::{PassMode, PushReport, PushService};
pub use crate::remote::{CreatedResource, RemoteError, Serializer, Transport};
pub use crate::session::{SessionStatus, SkipReason, SyncCounts, SyncSession, SyncSessionBuilder};
pub use crate::types::{
    CalendarId, Clock, EventId, MILLIS_PER_DAY, MILLIS_PER_SECOND, ManualClock, Millis,
    OperationId, SystemClock, format_millis,
};
