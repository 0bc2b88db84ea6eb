// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Single-occurrence and this-and-future edits of recurring series.

use calsync_core::{ChangeSource, EventPatch, Operation, SyncStatus};

use crate::common::{DAY, HOUR, Harness, T0, recurring_draft};

#[tokio::test]
async fn delete_single_occurrence_cancels_one_instance() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;
    let master = h
        .events
        .create(
            recurring_draft(cal.id, "Standup", "FREQ=DAILY;COUNT=5"),
            ChangeSource::User,
        )
        .await
        .unwrap();

    // Act
    h.events
        .delete_single_occurrence(master.id, T0 + 2 * DAY)
        .await
        .unwrap();

    // Assert
    let live: Vec<_> = h
        .events
        .occurrences_of(master.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|o| !o.is_cancelled)
        .map(|o| o.start)
        .collect();
    assert_eq!(live, vec![T0, T0 + DAY, T0 + 3 * DAY, T0 + 4 * DAY]);

    let stored = h.events.get(master.id).await.unwrap().unwrap();
    assert_eq!(stored.recurrence().unwrap().exdates.len(), 1);
    assert_eq!(stored.sequence, master.sequence + 1);

    // Never pushed, so the edit rides along with the create
    let ops = h.events.pending_operations(master.id).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation, Operation::Create);
}

#[tokio::test]
async fn edit_single_occurrence_links_exception() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.remote_calendar("Work").await;
    let master = h
        .events
        .create(
            recurring_draft(cal.id, "Standup", "FREQ=DAILY;COUNT=3"),
            ChangeSource::Server {
                url: Some("https://dav1.example.com/cal/work/s.ics".to_string()),
                etag: Some("\"s1\"".to_string()),
            },
        )
        .await
        .unwrap();
    let patch = EventPatch {
        title: Some("Standup (late)".to_string()),
        start: Some(T0 + DAY + 2 * HOUR),
        end: Some(T0 + DAY + 3 * HOUR),
        ..Default::default()
    };

    // Act
    let exception = h
        .events
        .edit_single_occurrence(master.id, T0 + DAY, &patch)
        .await
        .unwrap();

    // Assert
    assert_eq!(exception.exception_of(), Some((master.id, T0 + DAY)));
    assert_eq!(exception.uid, master.uid);
    assert_eq!(exception.title, "Standup (late)");

    let rows = h.events.occurrences_of(master.id).await.unwrap();
    assert_eq!(rows.len(), 3);
    let linked: Vec<_> = rows
        .iter()
        .filter(|o| o.exception_event_id == Some(exception.id))
        .collect();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].start, T0 + DAY + 2 * HOUR);

    // The series goes out as one update of the master
    let master = h.events.get(master.id).await.unwrap().unwrap();
    assert_eq!(master.sync_status, SyncStatus::PendingUpdate);
    let ops = h.events.pending_operations(master.id).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation, Operation::Update);
}

#[tokio::test]
async fn editing_same_occurrence_twice_reuses_exception() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Home").await;
    let master = h
        .events
        .create(
            recurring_draft(cal.id, "Walk", "FREQ=DAILY;COUNT=3"),
            ChangeSource::User,
        )
        .await
        .unwrap();
    let first = h
        .events
        .edit_single_occurrence(
            master.id,
            T0 + DAY,
            &EventPatch {
                title: Some("Short walk".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Act
    let second = h
        .events
        .edit_single_occurrence(
            master.id,
            T0 + DAY,
            &EventPatch {
                location: Some(Some("Park".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(first.id, second.id);
    assert_eq!(second.title, "Short walk");
    assert_eq!(second.location.as_deref(), Some("Park"));
}

#[tokio::test]
async fn split_series_starts_new_series_at_split() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Home").await;
    let master = h
        .events
        .create(
            recurring_draft(cal.id, "Class", "FREQ=DAILY;COUNT=6"),
            ChangeSource::User,
        )
        .await
        .unwrap();
    let patch = EventPatch {
        title: Some("Class (new room)".to_string()),
        ..Default::default()
    };

    // Act
    let tail = h
        .events
        .split_series(master.id, T0 + 3 * DAY, &patch)
        .await
        .unwrap();

    // Assert
    assert_ne!(tail.id, master.id);
    assert_ne!(tail.uid, master.uid);
    assert_eq!(tail.start, T0 + 3 * DAY);
    assert_eq!(tail.title, "Class (new room)");

    let head: Vec<_> = h
        .events
        .occurrences_of(master.id)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.start)
        .collect();
    assert_eq!(head, vec![T0, T0 + DAY, T0 + 2 * DAY]);

    let rest: Vec<_> = h
        .events
        .occurrences_of(tail.id)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.start)
        .collect();
    assert_eq!(rest, vec![T0 + 3 * DAY, T0 + 4 * DAY, T0 + 5 * DAY]);
}

#[tokio::test]
async fn split_drops_later_instance_moved_before_split() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Home").await;
    let master = h
        .events
        .create(
            recurring_draft(cal.id, "Class", "FREQ=DAILY;COUNT=6"),
            ChangeSource::User,
        )
        .await
        .unwrap();
    let moved = h
        .events
        .edit_single_occurrence(
            master.id,
            T0 + 3 * DAY,
            &EventPatch {
                start: Some(T0 + DAY + 4 * HOUR),
                end: Some(T0 + DAY + 5 * HOUR),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Act
    let tail = h
        .events
        .split_series(master.id, T0 + 2 * DAY, &EventPatch::default())
        .await
        .unwrap();

    // Assert
    let head = h.events.occurrences_of(master.id).await.unwrap();
    let starts: Vec<_> = head.iter().map(|o| o.start).collect();
    assert_eq!(starts, vec![T0, T0 + DAY]);
    assert!(head.iter().all(|o| o.exception_event_id.is_none()));
    assert!(h.events.get(moved.id).await.unwrap().is_none());
    assert_eq!(h.events.occurrences_of(tail.id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn split_keeps_earlier_instance_moved_past_split() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Home").await;
    let master = h
        .events
        .create(
            recurring_draft(cal.id, "Class", "FREQ=DAILY;COUNT=6"),
            ChangeSource::User,
        )
        .await
        .unwrap();
    let moved = h
        .events
        .edit_single_occurrence(
            master.id,
            T0 + DAY,
            &EventPatch {
                start: Some(T0 + 4 * DAY + HOUR),
                end: Some(T0 + 4 * DAY + 2 * HOUR),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Act
    h.events
        .split_series(master.id, T0 + 3 * DAY, &EventPatch::default())
        .await
        .unwrap();

    // Assert
    let head = h.events.occurrences_of(master.id).await.unwrap();
    let originals: Vec<_> = head.iter().map(|o| o.original_start).collect();
    assert_eq!(originals, vec![T0, T0 + 2 * DAY, T0 + DAY]);
    let linked = head
        .iter()
        .find(|o| o.exception_event_id == Some(moved.id))
        .unwrap();
    assert_eq!(linked.start, T0 + 4 * DAY + HOUR);
    assert!(h.events.get(moved.id).await.unwrap().is_some());
}

#[tokio::test]
async fn split_at_first_instance_patches_whole_series() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Home").await;
    let master = h
        .events
        .create(
            recurring_draft(cal.id, "Class", "FREQ=DAILY;COUNT=3"),
            ChangeSource::User,
        )
        .await
        .unwrap();
    let patch = EventPatch {
        title: Some("Renamed".to_string()),
        ..Default::default()
    };

    // Act
    let updated = h.events.split_series(master.id, T0, &patch).await.unwrap();

    // Assert
    assert_eq!(updated.id, master.id);
    assert_eq!(updated.title, "Renamed");
    assert_eq!(h.events.occurrences_of(master.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn delete_this_and_future_truncates_series() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Home").await;
    let master = h
        .events
        .create(recurring_draft(cal.id, "Daily", "FREQ=DAILY"), ChangeSource::User)
        .await
        .unwrap();

    // Act
    h.events
        .delete_this_and_future(master.id, T0 + 5 * DAY)
        .await
        .unwrap();

    // Assert
    let starts: Vec<_> = h
        .events
        .occurrences_of(master.id)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.start)
        .collect();
    assert_eq!(starts.len(), 5);
    assert!(starts.iter().all(|s| *s < T0 + 5 * DAY));

    let stored = h.events.get(master.id).await.unwrap().unwrap();
    assert!(stored.recurrence().unwrap().rule.as_deref().unwrap().contains("UNTIL="));
}

#[tokio::test]
async fn delete_this_and_future_from_first_instance_deletes_event() {
    // Arrange
    let h = Harness::new().await;
    let cal = h.local_calendar("Home").await;
    let master = h
        .events
        .create(recurring_draft(cal.id, "Daily", "FREQ=DAILY"), ChangeSource::User)
        .await
        .unwrap();

    // Act
    h.events.delete_this_and_future(master.id, T0).await.unwrap();

    // Assert
    assert!(h.events.get(master.id).await.unwrap().is_none());
    assert!(h.events.occurrences_of(master.id).await.unwrap().is_empty());
}
