// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Queue and event state persisted in a database file across restarts.

use calsync_core::{ChangeSource, OperationStatus, PassMode, RemoteError, SyncStatus};

use crate::common::{HOUR, Harness, draft};

#[tokio::test]
async fn queue_survives_reopen() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calsync.db");
    let h = Harness::with_file(&path).await;
    let cal = h.remote_calendar("Work").await;
    let event = h
        .events
        .create(draft(cal.id, "Standup"), ChangeSource::User)
        .await
        .unwrap();
    h.transport.fail_next(RemoteError::Failed {
        code: 0,
        message: "connection refused".to_string(),
        retryable: true,
    });
    h.push.run(PassMode::Normal).await.unwrap();
    h.db.clone().close().await.unwrap();
    drop(h);

    // Act
    let h = Harness::with_file(&path).await;

    // Assert
    let ops = h.db.pending_operations().await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].event_id, event.id);
    assert_eq!(ops[0].status, OperationStatus::Pending);
    assert_eq!(ops[0].retry_count, 1);
    assert_eq!(h.db.calendar(cal.id).await.unwrap(), Some(cal));
    assert_eq!(h.events.occurrences_of(event.id).await.unwrap().len(), 1);

    // Act - the retry goes through after the restart
    h.clock.advance(HOUR);
    h.push.run(PassMode::Normal).await.unwrap();

    // Assert
    let pushed = h.events.get(event.id).await.unwrap().unwrap();
    assert_eq!(pushed.sync_status, SyncStatus::Synced);
    assert_eq!(pushed.last_sync_error, None);
    assert!(h.db.pending_operations().await.unwrap().is_empty());

    let sessions = h.sessions.list().await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].counts.pushed_created, 1);
    assert_eq!(sessions[1].error_type.as_deref(), Some("network"));
}
