// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use sqlx::SqliteConnection;

use crate::recurrence::{DateCode, Instance};
use crate::types::{CalendarId, EventId, Millis};

/// A materialized instance of an event.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Occurrence {
    pub id: i64,
    pub event_id: EventId,
    pub calendar_id: CalendarId,

    /// Instant of this instance in the series, before any exception moved it.
    #[sqlx(rename = "original_start_ms")]
    pub original_start: Millis,

    #[sqlx(rename = "start_ms")]
    pub start: Millis,
    #[sqlx(rename = "end_ms")]
    pub end: Millis,

    /// Day bucket of the start, `YYYYMMDD` in the event's evaluation zone.
    pub start_day: i64,

    /// Day bucket of the last covered day.
    pub end_day: i64,

    pub is_cancelled: bool,

    /// Exception event replacing this instance.
    pub exception_event_id: Option<EventId>,
}

const COLUMNS: &str = "\
id, event_id, calendar_id, original_start_ms, start_ms, end_ms, start_day, end_day, is_cancelled,
exception_event_id";

/// Inserts an unlinked row for a freshly expanded instance.
pub async fn insert(
    conn: &mut SqliteConnection,
    event_id: EventId,
    calendar_id: CalendarId,
    instance: &Instance,
) -> Result<i64, sqlx::Error> {
    insert_linked(conn, event_id, calendar_id, instance.start, instance, None).await
}

/// Inserts a row for the series instant `original` showing `instance`.
pub async fn insert_linked(
    conn: &mut SqliteConnection,
    event_id: EventId,
    calendar_id: CalendarId,
    original: Millis,
    instance: &Instance,
    exception_event_id: Option<EventId>,
) -> Result<i64, sqlx::Error> {
    const SQL: &str = "\
INSERT INTO occurrences (
    event_id, calendar_id, original_start_ms, start_ms, end_ms, start_day, end_day, exception_event_id
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?);
";

    let result = sqlx::query(SQL)
        .bind(event_id)
        .bind(calendar_id)
        .bind(original)
        .bind(instance.start)
        .bind(instance.end)
        .bind(i64::from(instance.start_day))
        .bind(i64::from(instance.end_day))
        .bind(exception_event_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_for_event(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> Result<Vec<Occurrence>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM occurrences WHERE event_id = ? ORDER BY start_ms ASC, id ASC;"
    );
    sqlx::query_as(&sql)
        .bind(event_id)
        .fetch_all(&mut *conn)
        .await
}

/// Occurrences touching the day range `[day_from, day_to]`, for range
/// queries by the UI.
pub async fn list_in_range(
    conn: &mut SqliteConnection,
    day_from: DateCode,
    day_to: DateCode,
) -> Result<Vec<Occurrence>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM occurrences WHERE start_day <= ? AND end_day >= ? \
         ORDER BY start_ms ASC, id ASC;"
    );
    sqlx::query_as(&sql)
        .bind(i64::from(day_to))
        .bind(i64::from(day_from))
        .fetch_all(&mut *conn)
        .await
}

/// Unlinked rows of `event_id` whose series instant is within `tolerance`
/// of `instant`, nearest first.
pub async fn unlinked_near(
    conn: &mut SqliteConnection,
    event_id: EventId,
    instant: Millis,
    tolerance: Millis,
) -> Result<Vec<Occurrence>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM occurrences \
         WHERE event_id = ? AND exception_event_id IS NULL AND ABS(original_start_ms - ?) <= ? \
         ORDER BY ABS(original_start_ms - ?) ASC, id ASC;"
    );
    sqlx::query_as(&sql)
        .bind(event_id)
        .bind(instant)
        .bind(tolerance)
        .bind(instant)
        .fetch_all(&mut *conn)
        .await
}

pub async fn linked_to(
    conn: &mut SqliteConnection,
    event_id: EventId,
    exception_event_id: EventId,
) -> Result<Option<Occurrence>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM occurrences WHERE event_id = ? AND exception_event_id = ? LIMIT 1;"
    );
    sqlx::query_as(&sql)
        .bind(event_id)
        .bind(exception_event_id)
        .fetch_optional(&mut *conn)
        .await
}

/// Latest series instant among the unlinked rows of `event_id`. Linked rows
/// may come from a fallback insert far past the expanded range.
pub async fn max_original_start(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> Result<Option<Millis>, sqlx::Error> {
    const SQL: &str = "\
SELECT MAX(original_start_ms) FROM occurrences
WHERE event_id = ? AND exception_event_id IS NULL;
";

    let row: (Option<Millis>,) = sqlx::query_as(SQL)
        .bind(event_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0)
}

/// Whether any row of `event_id`, linked or not, stands for a series instant
/// within `tolerance` of `instant`.
pub async fn exists_near(
    conn: &mut SqliteConnection,
    event_id: EventId,
    instant: Millis,
    tolerance: Millis,
) -> Result<bool, sqlx::Error> {
    const SQL: &str = "\
SELECT EXISTS (
    SELECT 1 FROM occurrences WHERE event_id = ? AND ABS(original_start_ms - ?) <= ?
);
";

    let row: (bool,) = sqlx::query_as(SQL)
        .bind(event_id)
        .bind(instant)
        .bind(tolerance)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.0)
}

pub async fn delete_for_event(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> Result<u64, sqlx::Error> {
    const SQL: &str = "DELETE FROM occurrences WHERE event_id = ?;";

    let result = sqlx::query(SQL).bind(event_id).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Deletes rows of `event_id` whose series instant is at or after `from`,
/// wherever an exception moved them.
pub async fn delete_from(
    conn: &mut SqliteConnection,
    event_id: EventId,
    from: Millis,
) -> Result<u64, sqlx::Error> {
    const SQL: &str = "DELETE FROM occurrences WHERE event_id = ? AND original_start_ms >= ?;";

    let result = sqlx::query(SQL)
        .bind(event_id)
        .bind(from)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Points a row at an exception and shows the exception's times. The series
/// instant of the row is kept.
pub async fn link(
    conn: &mut SqliteConnection,
    id: i64,
    exception_event_id: EventId,
    instance: &Instance,
) -> Result<(), sqlx::Error> {
    const SQL: &str = "\
UPDATE occurrences SET
    exception_event_id = ?,
    start_ms           = ?,
    end_ms             = ?,
    start_day          = ?,
    end_day            = ?,
    is_cancelled       = 0
WHERE id = ?;
";

    sqlx::query(SQL)
        .bind(exception_event_id)
        .bind(instance.start)
        .bind(instance.end)
        .bind(i64::from(instance.start_day))
        .bind(i64::from(instance.end_day))
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn set_cancelled(
    conn: &mut SqliteConnection,
    id: i64,
    cancelled: bool,
) -> Result<(), sqlx::Error> {
    const SQL: &str = "UPDATE occurrences SET is_cancelled = ? WHERE id = ?;";

    sqlx::query(SQL)
        .bind(cancelled)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Re-points every row of a series at another calendar.
pub async fn set_calendar(
    conn: &mut SqliteConnection,
    master_id: EventId,
    calendar_id: CalendarId,
) -> Result<(), sqlx::Error> {
    const SQL: &str = "\
UPDATE occurrences SET calendar_id = ?
WHERE event_id = ? OR event_id IN (SELECT id FROM events WHERE master_event_id = ?);
";

    sqlx::query(SQL)
        .bind(calendar_id)
        .bind(master_id)
        .bind(master_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
