// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Create, edit and delete flows of standalone events.

use calsync_core::{ChangeSource, EventDraft, EventKind, Operation, Recurrence, SyncStatus};

use crate::common::{DAY, HOUR, Harness, T0, draft, recurring_draft};

#[tokio::test]
async fn single_event_materializes_one_occurrence() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;

    // Act
    let event = h
        .events
        .create(draft(cal.id, "Standup"), ChangeSource::User)
        .await
        .unwrap();

    // Assert
    let rows = h.events.occurrences_of(event.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].start, T0);
    assert_eq!(rows[0].end, T0 + HOUR);
    assert_eq!(rows[0].calendar_id, cal.id);
    assert_eq!(rows[0].start_day, 20260101);
    assert_eq!(event.sync_status, SyncStatus::PendingCreate);

    let ops = h.events.pending_operations(event.id).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation, Operation::Create);
}

#[tokio::test]
async fn count_rule_with_exdate_skips_instance() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Home").await;
    let draft = EventDraft {
        kind: EventKind::Standalone {
            recurrence: Recurrence {
                rule: Some("FREQ=DAILY;COUNT=5".to_string()),
                exdates: vec!["20260103".to_string()],
                ..Default::default()
            },
        },
        ..draft(cal.id, "Gym")
    };

    // Act
    let event = h.events.create(draft, ChangeSource::User).await.unwrap();

    // Assert
    let rows = h.events.occurrences_of(event.id).await.unwrap();
    let starts: Vec<_> = rows.iter().map(|o| o.start).collect();
    assert_eq!(starts, vec![T0, T0 + DAY, T0 + 3 * DAY, T0 + 4 * DAY]);
}

#[tokio::test]
async fn title_change_keeps_occurrence_rows() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;
    let event = h
        .events
        .create(
            recurring_draft(cal.id, "Standup", "FREQ=DAILY;COUNT=3"),
            ChangeSource::User,
        )
        .await
        .unwrap();
    let before = h.events.occurrences_of(event.id).await.unwrap();

    // Act
    let mut edited = event.clone();
    edited.title = "Daily sync".to_string();
    let updated = h.events.update(&edited, ChangeSource::User).await.unwrap();

    // Assert
    let after = h.events.occurrences_of(event.id).await.unwrap();
    assert_eq!(before, after);
    assert_eq!(updated.sequence, event.sequence);
    assert_eq!(updated.title, "Daily sync");
}

#[tokio::test]
async fn time_change_regenerates_and_bumps_sequence() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;
    let event = h
        .events
        .create(
            recurring_draft(cal.id, "Standup", "FREQ=DAILY;COUNT=3"),
            ChangeSource::User,
        )
        .await
        .unwrap();

    // Act
    let mut edited = event.clone();
    edited.start += HOUR;
    edited.end += HOUR;
    let updated = h.events.update(&edited, ChangeSource::User).await.unwrap();

    // Assert
    assert_eq!(updated.sequence, event.sequence + 1);
    let starts: Vec<_> = h
        .events
        .occurrences_of(event.id)
        .await
        .unwrap()
        .iter()
        .map(|o| o.start)
        .collect();
    assert_eq!(starts, vec![T0 + HOUR, T0 + DAY + HOUR, T0 + 2 * DAY + HOUR]);
}

#[tokio::test]
async fn update_of_unpushed_event_stays_a_create() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;
    let event = h
        .events
        .create(draft(cal.id, "Standup"), ChangeSource::User)
        .await
        .unwrap();

    // Act
    let mut edited = event.clone();
    edited.location = Some("Room 4".to_string());
    let updated = h.events.update(&edited, ChangeSource::User).await.unwrap();

    // Assert
    assert_eq!(updated.sync_status, SyncStatus::PendingCreate);
    let ops = h.events.pending_operations(event.id).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation, Operation::Create);
}

#[tokio::test]
async fn delete_before_first_push_leaves_nothing() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;
    let event = h
        .events
        .create(draft(cal.id, "Typo"), ChangeSource::User)
        .await
        .unwrap();

    // Act
    h.events.delete(event.id, ChangeSource::User).await.unwrap();

    // Assert
    assert!(h.events.get(event.id).await.unwrap().is_none());
    assert!(h.db.pending_operations().await.unwrap().is_empty());
    assert!(h.events.occurrences_of(event.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn server_changes_are_never_queued() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;
    let source = ChangeSource::Server {
        url: Some("https://dav1.example.com/cal/work/x.ics".to_string()),
        etag: Some("\"s1\"".to_string()),
    };

    // Act
    let event = h.events.create(draft(cal.id, "Synced"), source.clone()).await.unwrap();
    let mut edited = event.clone();
    edited.title = "Synced again".to_string();
    h.events.update(&edited, source.clone()).await.unwrap();

    // Assert
    assert_eq!(event.sync_status, SyncStatus::Synced);
    assert!(h.db.pending_operations().await.unwrap().is_empty());

    // Act
    h.events.delete(event.id, source).await.unwrap();

    // Assert
    assert!(h.events.get(event.id).await.unwrap().is_none());
    assert!(h.db.pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn local_calendar_events_are_never_queued() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Personal").await;

    // Act
    let event = h
        .events
        .create(
            recurring_draft(cal.id, "Run", "FREQ=WEEKLY;COUNT=4"),
            ChangeSource::User,
        )
        .await
        .unwrap();
    let mut edited = event.clone();
    edited.start += HOUR;
    edited.end += HOUR;
    h.events.update(&edited, ChangeSource::User).await.unwrap();
    h.events.delete_single_occurrence(event.id, T0 + 7 * DAY + HOUR).await.unwrap();

    // Assert
    assert_eq!(event.sync_status, SyncStatus::Synced);
    assert!(h.db.pending_operations().await.unwrap().is_empty());

    // Act
    h.events.delete(event.id, ChangeSource::User).await.unwrap();

    // Assert
    assert!(h.events.get(event.id).await.unwrap().is_none());
}

#[tokio::test]
async fn occurrences_in_range_filters_by_day() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Personal").await;
    let first = h
        .events
        .create(draft(cal.id, "Today"), ChangeSource::User)
        .await
        .unwrap();
    h.events
        .create(
            EventDraft {
                start: T0 + 2 * DAY,
                end: T0 + 2 * DAY + HOUR,
                ..draft(cal.id, "Later")
            },
            ChangeSource::User,
        )
        .await
        .unwrap();

    // Act
    let today = h.events.occurrences_in_range(20260101, 20260101).await.unwrap();
    let both = h.events.occurrences_in_range(20260101, 20260103).await.unwrap();

    // Assert
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].event_id, first.id);
    assert_eq!(both.len(), 2);
}
