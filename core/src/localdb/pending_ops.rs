// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use sqlx::SqliteConnection;

use crate::pending::{Operation, OperationKind, OperationStatus, PendingOperation, RemoteTarget};
use crate::types::{CalendarId, EventId, Millis, OperationId};

const COLUMNS: &str = "\
id, event_id, operation, move_phase, status, detached, generation, retry_count, next_retry_at,
lifetime_reset_at, failed_at, last_error, source_calendar_id, target_calendar_id, remote_url,
remote_etag, created_at";

pub async fn insert(
    conn: &mut SqliteConnection,
    op: &PendingOperation,
) -> Result<OperationId, sqlx::Error> {
    const SQL: &str = "\
INSERT INTO pending_operations (
    event_id, operation, move_phase, status, detached, generation, retry_count, next_retry_at,
    lifetime_reset_at, failed_at, last_error, source_calendar_id, target_calendar_id, remote_url,
    remote_etag, created_at
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
";

    let fields = OperationFields::from(&op.operation);
    let result = sqlx::query(SQL)
        .bind(op.event_id)
        .bind(op.kind().as_ref())
        .bind(fields.move_phase)
        .bind(op.status.as_ref())
        .bind(op.detached)
        .bind(op.generation)
        .bind(op.retry_count)
        .bind(op.next_retry_at)
        .bind(op.lifetime_reset_at)
        .bind(op.failed_at)
        .bind(&op.last_error)
        .bind(fields.source_calendar_id)
        .bind(fields.target_calendar_id)
        .bind(fields.remote_url)
        .bind(fields.remote_etag)
        .bind(op.created_at)
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Writes back an operation if its generation is still `expected_generation`.
/// Returns false when the row was upgraded (or removed) in the meantime.
pub async fn update(
    conn: &mut SqliteConnection,
    op: &PendingOperation,
    expected_generation: i64,
) -> Result<bool, sqlx::Error> {
    const SQL: &str = "\
UPDATE pending_operations SET
    operation          = ?,
    move_phase         = ?,
    status             = ?,
    generation         = ?,
    retry_count        = ?,
    next_retry_at      = ?,
    lifetime_reset_at  = ?,
    failed_at          = ?,
    last_error         = ?,
    source_calendar_id = ?,
    target_calendar_id = ?,
    remote_url         = ?,
    remote_etag        = ?
WHERE id = ? AND generation = ?;
";

    let fields = OperationFields::from(&op.operation);
    let result = sqlx::query(SQL)
        .bind(op.kind().as_ref())
        .bind(fields.move_phase)
        .bind(op.status.as_ref())
        .bind(op.generation)
        .bind(op.retry_count)
        .bind(op.next_retry_at)
        .bind(op.lifetime_reset_at)
        .bind(op.failed_at)
        .bind(&op.last_error)
        .bind(fields.source_calendar_id)
        .bind(fields.target_calendar_id)
        .bind(fields.remote_url)
        .bind(fields.remote_etag)
        .bind(op.id)
        .bind(expected_generation)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// The event's own (non-detached) operation, whatever its status.
pub async fn active_for_event(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> Result<Option<PendingOperation>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM pending_operations \
         WHERE event_id = ? AND detached = 0 ORDER BY id ASC LIMIT 1;"
    );
    let record: Option<OperationRecord> = sqlx::query_as(&sql)
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record.and_then(OperationRecord::into_operation))
}

pub async fn get(
    conn: &mut SqliteConnection,
    id: OperationId,
) -> Result<Option<PendingOperation>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM pending_operations WHERE id = ?;");
    let record: Option<OperationRecord> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record.and_then(OperationRecord::into_operation))
}

/// Pending operations whose retry instant has passed, in enqueue order.
pub async fn due(
    conn: &mut SqliteConnection,
    now: Millis,
) -> Result<Vec<PendingOperation>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM pending_operations \
         WHERE status = ? AND next_retry_at <= ? ORDER BY id ASC;"
    );
    let records: Vec<OperationRecord> = sqlx::query_as(&sql)
        .bind(OperationStatus::Pending.as_ref())
        .bind(now)
        .fetch_all(&mut *conn)
        .await?;
    Ok(records
        .into_iter()
        .filter_map(OperationRecord::into_operation)
        .collect())
}

/// Operations that can still change state: pending or failed.
pub async fn unfinished(conn: &mut SqliteConnection) -> Result<Vec<PendingOperation>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM pending_operations WHERE status IN (?, ?) ORDER BY id ASC;"
    );
    let records: Vec<OperationRecord> = sqlx::query_as(&sql)
        .bind(OperationStatus::Pending.as_ref())
        .bind(OperationStatus::Failed.as_ref())
        .fetch_all(&mut *conn)
        .await?;
    Ok(records
        .into_iter()
        .filter_map(OperationRecord::into_operation)
        .collect())
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<PendingOperation>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM pending_operations ORDER BY id ASC;");
    let records: Vec<OperationRecord> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
    Ok(records
        .into_iter()
        .filter_map(OperationRecord::into_operation)
        .collect())
}

pub async fn list_for_event(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> Result<Vec<PendingOperation>, sqlx::Error> {
    let sql =
        format!("SELECT {COLUMNS} FROM pending_operations WHERE event_id = ? ORDER BY id ASC;");
    let records: Vec<OperationRecord> = sqlx::query_as(&sql)
        .bind(event_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(records
        .into_iter()
        .filter_map(OperationRecord::into_operation)
        .collect())
}

pub async fn delete(conn: &mut SqliteConnection, id: OperationId) -> Result<bool, sqlx::Error> {
    const SQL: &str = "DELETE FROM pending_operations WHERE id = ?;";

    let result = sqlx::query(SQL).bind(id).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Completes an operation unless it was upgraded after it was read.
pub async fn delete_if_generation(
    conn: &mut SqliteConnection,
    id: OperationId,
    generation: i64,
) -> Result<bool, sqlx::Error> {
    const SQL: &str = "DELETE FROM pending_operations WHERE id = ? AND generation = ?;";

    let result = sqlx::query(SQL)
        .bind(id)
        .bind(generation)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Removes the event's own operations; detached cleanup survives.
pub async fn delete_attached(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> Result<u64, sqlx::Error> {
    const SQL: &str = "DELETE FROM pending_operations WHERE event_id = ? AND detached = 0;";

    let result = sqlx::query(SQL).bind(event_id).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

struct OperationFields {
    move_phase: Option<String>,
    source_calendar_id: Option<CalendarId>,
    target_calendar_id: Option<CalendarId>,
    remote_url: Option<String>,
    remote_etag: Option<String>,
}

impl From<&Operation> for OperationFields {
    fn from(op: &Operation) -> Self {
        let empty = Self {
            move_phase: None,
            source_calendar_id: None,
            target_calendar_id: None,
            remote_url: None,
            remote_etag: None,
        };
        match op {
            Operation::Create | Operation::Update | Operation::Delete { target: None } => empty,
            Operation::Delete {
                target: Some(target),
            } => Self {
                source_calendar_id: Some(target.calendar_id),
                remote_url: Some(target.url.clone()),
                remote_etag: target.etag.clone(),
                ..empty
            },
            Operation::Move {
                phase,
                source,
                target_calendar_id,
            } => Self {
                move_phase: Some(phase.as_ref().to_string()),
                source_calendar_id: Some(source.calendar_id),
                target_calendar_id: Some(*target_calendar_id),
                remote_url: Some(source.url.clone()),
                remote_etag: source.etag.clone(),
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OperationRecord {
    id: OperationId,
    event_id: EventId,
    operation: String,
    move_phase: Option<String>,
    status: String,
    detached: bool,
    generation: i64,
    retry_count: u32,
    next_retry_at: Millis,
    lifetime_reset_at: Millis,
    failed_at: Option<Millis>,
    last_error: Option<String>,
    source_calendar_id: Option<CalendarId>,
    target_calendar_id: Option<CalendarId>,
    remote_url: Option<String>,
    remote_etag: Option<String>,
    created_at: Millis,
}

impl OperationRecord {
    /// Rows that cannot be decoded are skipped with a warning rather than
    /// poisoning the whole queue.
    fn into_operation(self) -> Option<PendingOperation> {
        let remote = match (self.source_calendar_id, self.remote_url) {
            (Some(calendar_id), Some(url)) => Some(RemoteTarget {
                calendar_id,
                url,
                etag: self.remote_etag,
            }),
            _ => None,
        };

        let operation = match self.operation.parse::<OperationKind>() {
            Ok(OperationKind::Create) => Some(Operation::Create),
            Ok(OperationKind::Update) => Some(Operation::Update),
            Ok(OperationKind::Delete) => Some(Operation::Delete { target: remote }),
            Ok(OperationKind::Move) => {
                let phase = self.move_phase.as_deref().and_then(|a| a.parse().ok());
                match (phase, remote, self.target_calendar_id) {
                    (Some(phase), Some(source), Some(target_calendar_id)) => {
                        Some(Operation::Move {
                            phase,
                            source,
                            target_calendar_id,
                        })
                    }
                    _ => None,
                }
            }
            Err(()) => None,
        };
        let status = self.status.parse().ok();

        let (Some(operation), Some(status)) = (operation, status) else {
            tracing::warn!(operation_id = self.id, "skipping undecodable pending operation");
            return None;
        };

        Some(PendingOperation {
            id: self.id,
            event_id: self.event_id,
            operation,
            status,
            detached: self.detached,
            generation: self.generation,
            retry_count: self.retry_count,
            next_retry_at: self.next_retry_at,
            lifetime_reset_at: self.lifetime_reset_at,
            failed_at: self.failed_at,
            last_error: self.last_error,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::tests_utils::setup_test_db;
    use crate::pending::MovePhase;

    #[tokio::test]
    async fn pending_ops_round_trip_every_kind() {
        // Arrange
        let db = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let source = RemoteTarget {
            calendar_id: 3,
            url: "https://dav.example.com/a/1.ics".to_string(),
            etag: Some("\"7\"".to_string()),
        };
        let ops = [
            PendingOperation::new(1, Operation::Create, 10),
            PendingOperation::new(2, Operation::Update, 20),
            PendingOperation::new(3, Operation::Delete { target: None }, 30),
            PendingOperation::detached_delete(4, source.clone(), 40),
            PendingOperation::new(
                5,
                Operation::Move {
                    phase: MovePhase::Delete,
                    source,
                    target_calendar_id: 9,
                },
                50,
            ),
        ];

        // Act
        let mut ids = Vec::new();
        for op in &ops {
            ids.push(insert(&mut conn, op).await.unwrap());
        }
        let listed = list(&mut conn).await.unwrap();

        // Assert
        assert_eq!(listed.len(), ops.len());
        for ((mut expected, id), actual) in ops.into_iter().zip(ids).zip(listed) {
            expected.id = id;
            assert_eq!(actual, expected);
        }
    }

    #[tokio::test]
    async fn pending_ops_due_in_fifo_order() {
        // Arrange
        let db = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let first = insert(&mut conn, &PendingOperation::new(2, Operation::Update, 0))
            .await
            .unwrap();
        let mut later = PendingOperation::new(3, Operation::Update, 0);
        later.next_retry_at = 1_000;
        insert(&mut conn, &later).await.unwrap();
        let second = insert(&mut conn, &PendingOperation::new(1, Operation::Create, 0))
            .await
            .unwrap();

        // Act
        let due_now = due(&mut conn, 500).await.unwrap();

        // Assert
        let ids: Vec<_> = due_now.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn pending_ops_generation_guards_writes() {
        // Arrange
        let db = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let mut op = PendingOperation::new(1, Operation::Create, 0);
        op.id = insert(&mut conn, &op).await.unwrap();
        let read_at_start = op.clone();

        // an upgrade lands while a push is in flight
        op.refresh(Operation::Create, 100);
        assert!(update(&mut conn, &op, 0).await.unwrap());

        // Act
        let completed = delete_if_generation(&mut conn, read_at_start.id, read_at_start.generation)
            .await
            .unwrap();
        let stale_write = update(&mut conn, &read_at_start, read_at_start.generation)
            .await
            .unwrap();

        // Assert
        assert!(!completed);
        assert!(!stale_write);
        let stored = get(&mut conn, op.id).await.unwrap().unwrap();
        assert_eq!(stored.generation, 1);
    }

    #[tokio::test]
    async fn pending_ops_detached_survive_attached_cleanup() {
        // Arrange
        let db = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        insert(&mut conn, &PendingOperation::new(1, Operation::Create, 0))
            .await
            .unwrap();
        let target = RemoteTarget {
            calendar_id: 1,
            url: "/old.ics".to_string(),
            etag: None,
        };
        insert(&mut conn, &PendingOperation::detached_delete(1, target, 0))
            .await
            .unwrap();

        // Act
        let removed = delete_attached(&mut conn, 1).await.unwrap();

        // Assert
        assert_eq!(removed, 1);
        let left = list_for_event(&mut conn, 1).await.unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].detached);
        assert_eq!(active_for_event(&mut conn, 1).await.unwrap(), None);
    }
}
