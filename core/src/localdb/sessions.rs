// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use sqlx::SqliteConnection;

use crate::session::{SkipReason, SyncCounts, SyncSession};
use crate::types::{CalendarId, Millis};

pub async fn insert(conn: &mut SqliteConnection, session: &SyncSession) -> Result<i64, sqlx::Error> {
    const SQL: &str = "\
INSERT INTO sync_sessions (
    calendar_id, calendar_name, started_at, finished_at, status,
    items_reported, items_fetched, items_written, items_updated, items_deleted,
    pushed_created, pushed_updated, pushed_deleted,
    skip_reasons, truncated, used_fallback, error_type, error_message
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
";

    let skip_reasons = serde_json::to_string(&session.skip_reasons).unwrap_or_else(|e| {
        tracing::warn!(err = %e, "failed to encode skip reasons");
        "{}".to_string()
    });
    let c = &session.counts;
    let result = sqlx::query(SQL)
        .bind(session.calendar_id)
        .bind(&session.calendar_name)
        .bind(session.started_at)
        .bind(session.finished_at)
        .bind(session.status().as_ref())
        .bind(c.reported)
        .bind(c.fetched)
        .bind(c.written)
        .bind(c.updated)
        .bind(c.deleted)
        .bind(c.pushed_created)
        .bind(c.pushed_updated)
        .bind(c.pushed_deleted)
        .bind(skip_reasons)
        .bind(session.truncated)
        .bind(session.used_fallback)
        .bind(&session.error_type)
        .bind(&session.error_message)
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Sessions finished at or after `since`, newest first.
pub async fn list_since(
    conn: &mut SqliteConnection,
    since: Millis,
    limit: u32,
) -> Result<Vec<SyncSession>, sqlx::Error> {
    const SQL: &str = "\
SELECT calendar_id, calendar_name, started_at, finished_at,
       items_reported, items_fetched, items_written, items_updated, items_deleted,
       pushed_created, pushed_updated, pushed_deleted,
       skip_reasons, truncated, used_fallback, error_type, error_message
FROM sync_sessions
WHERE finished_at >= ?
ORDER BY finished_at DESC, id DESC
LIMIT ?;
";

    let records: Vec<SessionRecord> = sqlx::query_as(SQL)
        .bind(since)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;
    Ok(records.into_iter().map(SyncSession::from).collect())
}

/// Drops sessions older than `before` and everything beyond the newest
/// `keep` entries.
pub async fn prune(
    conn: &mut SqliteConnection,
    before: Millis,
    keep: u32,
) -> Result<u64, sqlx::Error> {
    const SQL_AGE: &str = "DELETE FROM sync_sessions WHERE finished_at < ?;";
    const SQL_COUNT: &str = "\
DELETE FROM sync_sessions
WHERE id NOT IN (
    SELECT id FROM sync_sessions ORDER BY finished_at DESC, id DESC LIMIT ?
);
";

    let by_age = sqlx::query(SQL_AGE)
        .bind(before)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    let by_count = sqlx::query(SQL_COUNT)
        .bind(keep)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    Ok(by_age + by_count)
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRecord {
    calendar_id: CalendarId,
    calendar_name: String,
    started_at: Millis,
    finished_at: Millis,
    items_reported: u32,
    items_fetched: u32,
    items_written: u32,
    items_updated: u32,
    items_deleted: u32,
    pushed_created: u32,
    pushed_updated: u32,
    pushed_deleted: u32,
    skip_reasons: String,
    truncated: bool,
    used_fallback: bool,
    error_type: Option<String>,
    error_message: Option<String>,
}

impl From<SessionRecord> for SyncSession {
    fn from(r: SessionRecord) -> Self {
        let skip_reasons: BTreeMap<SkipReason, u32> = serde_json::from_str(&r.skip_reasons)
            .unwrap_or_else(|e| {
                tracing::warn!(err = %e, "failed to decode skip reasons");
                BTreeMap::new()
            });

        SyncSession {
            calendar_id: r.calendar_id,
            calendar_name: r.calendar_name,
            started_at: r.started_at,
            finished_at: r.finished_at,
            counts: SyncCounts {
                reported: r.items_reported,
                fetched: r.items_fetched,
                written: r.items_written,
                updated: r.items_updated,
                deleted: r.items_deleted,
                pushed_created: r.pushed_created,
                pushed_updated: r.pushed_updated,
                pushed_deleted: r.pushed_deleted,
            },
            skip_reasons,
            truncated: r.truncated,
            used_fallback: r.used_fallback,
            error_type: r.error_type,
            error_message: r.error_message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::tests_utils::setup_test_db;
    use crate::session::SyncSessionBuilder;

    fn session(calendar_id: CalendarId, finished_at: Millis) -> SyncSession {
        let mut builder = SyncSessionBuilder::new(calendar_id, "Work", finished_at - 10);
        builder.pushed_created().skip(SkipReason::ParseError);
        builder.finish(finished_at)
    }

    #[tokio::test]
    async fn sessions_round_trip_newest_first() {
        // Arrange
        let db = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        insert(&mut conn, &session(1, 100)).await.unwrap();
        insert(&mut conn, &session(2, 300)).await.unwrap();
        insert(&mut conn, &session(3, 200)).await.unwrap();

        // Act
        let listed = list_since(&mut conn, 0, 10).await.unwrap();

        // Assert
        let ids: Vec<_> = listed.iter().map(|s| s.calendar_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(listed[0], session(2, 300));
    }

    #[tokio::test]
    async fn sessions_prune_by_age_and_count() {
        // Arrange
        let db = setup_test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        for (i, finished_at) in [10, 20, 30, 40, 50].into_iter().enumerate() {
            insert(&mut conn, &session(i64::try_from(i).unwrap(), finished_at))
                .await
                .unwrap();
        }

        // Act
        let removed = prune(&mut conn, 15, 3).await.unwrap();

        // Assert
        assert_eq!(removed, 2);
        let left: Vec<_> = list_since(&mut conn, 0, 10)
            .await
            .unwrap()
            .iter()
            .map(|s| s.finished_at)
            .collect();
        assert_eq!(left, vec![50, 40, 30]);
    }
}
