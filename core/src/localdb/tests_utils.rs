// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Test utilities for the localdb module.

use crate::event::{Event, EventKind, SyncStatus};
use crate::localdb::LocalDb;
use crate::localdb::calendars::Calendar;
use crate::types::Millis;

/// Creates an in-memory test database with all migrations applied.
pub async fn setup_test_db() -> LocalDb {
    LocalDb::open(None)
        .await
        .expect("Failed to create test database")
}

pub async fn remote_calendar(db: &LocalDb) -> Calendar {
    db.add_calendar(Some(1), Some("https://dav.example.com/cal/work/"), "Work")
        .await
        .expect("Failed to add calendar")
}

pub async fn local_calendar(db: &LocalDb) -> Calendar {
    db.add_calendar(None, None, "Personal")
        .await
        .expect("Failed to add calendar")
}

/// A one-hour UTC event starting at `start`; id 0 until inserted.
pub fn sample_event(calendar_id: i64, start: Millis) -> Event {
    Event {
        id: 0,
        calendar_id,
        uid: format!("uid-{start}"),
        title: "Sample".to_string(),
        description: Some("notes".to_string()),
        location: None,
        start,
        end: start + 3_600_000,
        all_day: false,
        timezone: Some("UTC".to_string()),
        kind: EventKind::default(),
        sequence: 0,
        sync_status: SyncStatus::Synced,
        caldav_url: None,
        etag: None,
        last_sync_error: None,
        needs_attention: false,
        created_at: 0,
        updated_at: 0,
    }
}
