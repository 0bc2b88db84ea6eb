// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Moving events between local-only and synchronized calendars.

use calsync_core::{ChangeSource, MovePlan, Operation, PassMode, SyncStatus};

use crate::common::{Call, Harness, draft, recurring_draft};

fn synced(url: &str) -> ChangeSource {
    ChangeSource::Server {
        url: Some(url.to_string()),
        etag: Some("\"s1\"".to_string()),
    }
}

#[tokio::test]
async fn move_between_local_calendars_enqueues_nothing() {
    // Arrange
    let h = Harness::new().await;
    let from = h.local_calendar("Personal").await;
    let to = h.local_calendar("Family").await;
    let event = h
        .events
        .create(
            recurring_draft(from.id, "Dinner", "FREQ=WEEKLY;COUNT=3"),
            ChangeSource::User,
        )
        .await
        .unwrap();

    // Act
    let plan = h.events.move_to_calendar(event.id, to.id).await.unwrap();

    // Assert
    assert_eq!(plan, MovePlan::NoOp);
    let moved = h.events.get(event.id).await.unwrap().unwrap();
    assert_eq!(moved.calendar_id, to.id);
    let rows = h.events.occurrences_of(event.id).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|o| o.calendar_id == to.id));
    assert!(h.db.pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn move_into_same_calendar_is_noop() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;
    let event = h
        .events
        .create(draft(cal.id, "Review"), synced("https://dav1.example.com/cal/work/r.ics"))
        .await
        .unwrap();

    // Act
    let plan = h.events.move_to_calendar(event.id, cal.id).await.unwrap();

    // Assert
    assert_eq!(plan, MovePlan::NoOp);
    assert!(h.db.pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn move_local_event_to_remote_calendar_creates_it() {
    // Arrange
    let h = Harness::new().await;
    let from = h.local_calendar("Personal").await;
    let to = h.remote_calendar("Work").await;
    let event = h
        .events
        .create(draft(from.id, "Offsite"), ChangeSource::User)
        .await
        .unwrap();

    // Act
    let plan = h.events.move_to_calendar(event.id, to.id).await.unwrap();
    h.push.run(PassMode::Normal).await.unwrap();

    // Assert
    assert_eq!(plan, MovePlan::CreateOnly);
    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], Call::Create { calendar_url, .. } if calendar_url.ends_with("/work/")));
    let moved = h.events.get(event.id).await.unwrap().unwrap();
    assert_eq!(moved.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn move_synced_event_to_local_calendar_deletes_remote_copy() {
    // Arrange
    let h = Harness::new().await;
    let from = h.remote_calendar("Work").await;
    let to = h.local_calendar("Archive").await;
    let event = h
        .events
        .create(draft(from.id, "Retro"), synced("https://dav1.example.com/cal/work/t.ics"))
        .await
        .unwrap();

    // Act
    let plan = h.events.move_to_calendar(event.id, to.id).await.unwrap();

    // Assert
    assert_eq!(plan, MovePlan::DeleteOnly);
    let moved = h.events.get(event.id).await.unwrap().unwrap();
    assert_eq!(moved.caldav_url, None);
    assert_eq!(moved.sync_status, SyncStatus::Synced);
    let ops = h.events.pending_operations(event.id).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert!(ops[0].detached);

    // Act
    h.push.run(PassMode::Normal).await.unwrap();

    // Assert - the event stays, only the remote copy is gone
    assert_eq!(
        h.transport.calls(),
        vec![Call::Delete {
            url: "https://dav1.example.com/cal/work/t.ics".to_string(),
            etag: Some("\"s1\"".to_string()),
        }]
    );
    assert!(h.events.get(event.id).await.unwrap().is_some());
    assert!(h.db.pending_operations().await.unwrap().is_empty());
}

#[tokio::test]
async fn move_replaces_pending_update() {
    // Arrange
    let h = Harness::new().await;
    let from = h.remote_calendar("Work").await;
    let to = h.remote_calendar("Team").await;
    let event = h
        .events
        .create(draft(from.id, "Planning"), synced("https://dav1.example.com/cal/work/p.ics"))
        .await
        .unwrap();
    let mut edited = event.clone();
    edited.title = "Quarterly planning".to_string();
    h.events.update(&edited, ChangeSource::User).await.unwrap();

    // Act
    h.events.move_to_calendar(event.id, to.id).await.unwrap();

    // Assert
    let ops = h.events.pending_operations(event.id).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert!(matches!(
        &ops[0].operation,
        Operation::Move { source, target_calendar_id, .. }
            if source.url.ends_with("/work/p.ics") && *target_calendar_id == to.id
    ));
}
