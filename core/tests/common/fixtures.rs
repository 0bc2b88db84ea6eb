// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Test data factories for integration tests.

use std::path::Path;
use std::sync::Arc;

use calsync_core::recurrence::Expander;
use calsync_core::{
    Calendar, CalendarId, EventDraft, EventKind, EventService, IcsSerializer, LocalDb,
    MILLIS_PER_DAY, ManualClock, Millis, OccurrenceSync, PushService, Recurrence, RetryPolicy,
    SessionLog,
};

use super::transport::ScriptedTransport;

/// 2026-01-01T10:00:00Z
pub const T0: Millis = 1_767_261_600_000;
pub const MINUTE: Millis = 60_000;
pub const HOUR: Millis = 60 * MINUTE;
pub const DAY: Millis = MILLIS_PER_DAY;

const HORIZON: Millis = 30 * DAY;
const TOLERANCE: Millis = MINUTE;

/// The engine wired to an in-memory store, a manual clock and a scripted
/// transport.
pub struct Harness {
    pub db: LocalDb,
    pub clock: Arc<ManualClock>,
    pub events: EventService,
    pub transport: Arc<ScriptedTransport>,
    pub sessions: SessionLog,
    pub push: PushService,
    pub policy: RetryPolicy,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_db(LocalDb::open(None).await.unwrap()).await
    }

    /// Same wiring over a database file.
    pub async fn with_file(path: &Path) -> Self {
        Self::with_db(LocalDb::open(Some(path)).await.unwrap()).await
    }

    async fn with_db(db: LocalDb) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let expander = Expander::new(chrono_tz::UTC, 1000);
        let events = EventService::new(
            db.clone(),
            OccurrenceSync::new(expander, TOLERANCE),
            clock.clone(),
            HORIZON,
        );
        let transport = Arc::new(ScriptedTransport::new());
        let sessions = SessionLog::new(db.clone(), clock.clone(), 48 * HOUR, 200);
        let policy = RetryPolicy {
            base: 30_000,
            max: 6 * HOUR,
            max_retries: 3,
            lifetime: 30 * DAY,
            auto_recover_after: 24 * HOUR,
        };
        let push = PushService::new(
            db.clone(),
            transport.clone(),
            Arc::new(IcsSerializer::new(expander)),
            Arc::new(sessions.clone()),
            clock.clone(),
            policy,
        );

        Self {
            db,
            clock,
            events,
            transport,
            sessions,
            push,
            policy,
        }
    }

    /// A synchronized calendar of account 1.
    pub async fn remote_calendar(&self, name: &str) -> Calendar {
        self.calendar(Some(1), name).await
    }

    pub async fn calendar(&self, account: Option<i64>, name: &str) -> Calendar {
        let url = account.map(|a| format!("https://dav{a}.example.com/cal/{}/", name.to_lowercase()));
        self.db
            .add_calendar(account, url.as_deref(), name)
            .await
            .unwrap()
    }

    pub async fn local_calendar(&self, name: &str) -> Calendar {
        self.calendar(None, name).await
    }
}

/// A one-hour UTC event at `T0`.
pub fn draft(calendar_id: CalendarId, title: &str) -> EventDraft {
    EventDraft {
        calendar_id,
        title: title.to_string(),
        start: T0,
        end: T0 + HOUR,
        timezone: Some("UTC".to_string()),
        ..Default::default()
    }
}

pub fn recurring_draft(calendar_id: CalendarId, title: &str, rule: &str) -> EventDraft {
    EventDraft {
        kind: EventKind::Standalone {
            recurrence: Recurrence::rule(rule),
        },
        ..draft(calendar_id, title)
    }
}
