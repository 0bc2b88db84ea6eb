// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use sqlx::SqliteConnection;

use crate::event::{Event, EventKind, Recurrence, SyncStatus};
use crate::localdb::placeholders;
use crate::types::{CalendarId, EventId, Millis};

const COLUMNS: &str = "\
id, calendar_id, uid, title, description, location, start_ms, end_ms, all_day, timezone,
rrule, rdate, exdate, master_event_id, original_instance_ms, sequence, sync_status,
caldav_url, etag, last_sync_error, needs_attention, created_at, updated_at";

pub async fn insert(conn: &mut SqliteConnection, event: &Event) -> Result<EventId, sqlx::Error> {
    const SQL: &str = "\
INSERT INTO events (
    calendar_id, uid, title, description, location, start_ms, end_ms, all_day, timezone,
    rrule, rdate, exdate, master_event_id, original_instance_ms, sequence, sync_status,
    caldav_url, etag, last_sync_error, needs_attention, created_at, updated_at
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);
";

    let fields = KindFields::from(&event.kind);
    let result = sqlx::query(SQL)
        .bind(event.calendar_id)
        .bind(&event.uid)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start)
        .bind(event.end)
        .bind(event.all_day)
        .bind(&event.timezone)
        .bind(fields.rrule)
        .bind(fields.rdate)
        .bind(fields.exdate)
        .bind(fields.master_event_id)
        .bind(fields.original_instance_ms)
        .bind(event.sequence)
        .bind(event.sync_status.as_ref())
        .bind(&event.caldav_url)
        .bind(&event.etag)
        .bind(&event.last_sync_error)
        .bind(event.needs_attention)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Overwrites every column of an existing row.
pub async fn update(conn: &mut SqliteConnection, event: &Event) -> Result<(), sqlx::Error> {
    const SQL: &str = "\
UPDATE events SET
    calendar_id          = ?,
    uid                  = ?,
    title                = ?,
    description          = ?,
    location             = ?,
    start_ms             = ?,
    end_ms               = ?,
    all_day              = ?,
    timezone             = ?,
    rrule                = ?,
    rdate                = ?,
    exdate               = ?,
    master_event_id      = ?,
    original_instance_ms = ?,
    sequence             = ?,
    sync_status          = ?,
    caldav_url           = ?,
    etag                 = ?,
    last_sync_error      = ?,
    needs_attention      = ?,
    updated_at           = ?
WHERE id = ?;
";

    let fields = KindFields::from(&event.kind);
    sqlx::query(SQL)
        .bind(event.calendar_id)
        .bind(&event.uid)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start)
        .bind(event.end)
        .bind(event.all_day)
        .bind(&event.timezone)
        .bind(fields.rrule)
        .bind(fields.rdate)
        .bind(fields.exdate)
        .bind(fields.master_event_id)
        .bind(fields.original_instance_ms)
        .bind(event.sequence)
        .bind(event.sync_status.as_ref())
        .bind(&event.caldav_url)
        .bind(&event.etag)
        .bind(&event.last_sync_error)
        .bind(event.needs_attention)
        .bind(event.updated_at)
        .bind(event.id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn get(conn: &mut SqliteConnection, id: EventId) -> Result<Option<Event>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM events WHERE id = ?;");
    let record: Option<EventRecord> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record.map(Event::from))
}

pub async fn get_many(
    conn: &mut SqliteConnection,
    ids: &[EventId],
) -> Result<Vec<Event>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {COLUMNS} FROM events WHERE id IN ({});",
        placeholders(ids.len())
    );
    let mut query = sqlx::query_as::<_, EventRecord>(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let records = query.fetch_all(&mut *conn).await?;
    Ok(records.into_iter().map(Event::from).collect())
}

/// Exceptions of one master, ordered by original instant.
pub async fn exceptions_of(
    conn: &mut SqliteConnection,
    master_id: EventId,
) -> Result<Vec<Event>, sqlx::Error> {
    exceptions_of_many(conn, &[master_id]).await
}

pub async fn exceptions_of_many(
    conn: &mut SqliteConnection,
    master_ids: &[EventId],
) -> Result<Vec<Event>, sqlx::Error> {
    if master_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {COLUMNS} FROM events WHERE master_event_id IN ({}) \
         ORDER BY master_event_id ASC, original_instance_ms ASC, id ASC;",
        placeholders(master_ids.len())
    );
    let mut query = sqlx::query_as::<_, EventRecord>(&sql);
    for id in master_ids {
        query = query.bind(id);
    }
    let records = query.fetch_all(&mut *conn).await?;
    Ok(records.into_iter().map(Event::from).collect())
}

/// The exception of `master_id` whose original instant is nearest to
/// `instant`, within `tolerance`.
pub async fn find_exception(
    conn: &mut SqliteConnection,
    master_id: EventId,
    instant: Millis,
    tolerance: Millis,
) -> Result<Option<Event>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM events \
         WHERE master_event_id = ? AND ABS(original_instance_ms - ?) <= ? \
         ORDER BY ABS(original_instance_ms - ?) ASC, id ASC LIMIT 1;"
    );
    let record: Option<EventRecord> = sqlx::query_as(&sql)
        .bind(master_id)
        .bind(instant)
        .bind(tolerance)
        .bind(instant)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record.map(Event::from))
}

/// Deletes an event row; occurrences and exceptions cascade.
pub async fn delete(conn: &mut SqliteConnection, id: EventId) -> Result<bool, sqlx::Error> {
    const SQL: &str = "DELETE FROM events WHERE id = ?;";

    let result = sqlx::query(SQL).bind(id).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes the exceptions of `master_id` originally at or after `from`.
pub async fn delete_exceptions_from(
    conn: &mut SqliteConnection,
    master_id: EventId,
    from: Millis,
) -> Result<u64, sqlx::Error> {
    const SQL: &str = "\
DELETE FROM events
WHERE master_event_id = ? AND original_instance_ms >= ?;
";

    let result = sqlx::query(SQL)
        .bind(master_id)
        .bind(from)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn set_sync_status(
    conn: &mut SqliteConnection,
    id: EventId,
    status: SyncStatus,
    now: Millis,
) -> Result<(), sqlx::Error> {
    const SQL: &str = "UPDATE events SET sync_status = ?, updated_at = ? WHERE id = ?;";

    sqlx::query(SQL)
        .bind(status.as_ref())
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Stores the server's location and version token after a successful push
/// and clears any recorded error.
pub async fn mark_pushed(
    conn: &mut SqliteConnection,
    ids: &[EventId],
    url: &str,
    etag: &str,
    status: SyncStatus,
) -> Result<(), sqlx::Error> {
    if ids.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "UPDATE events SET caldav_url = ?, etag = ?, sync_status = ?, \
         last_sync_error = NULL, needs_attention = 0 WHERE id IN ({});",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql).bind(url).bind(etag).bind(status.as_ref());
    for id in ids {
        query = query.bind(id);
    }
    query.execute(&mut *conn).await?;
    Ok(())
}

pub async fn record_error(
    conn: &mut SqliteConnection,
    id: EventId,
    error: &str,
) -> Result<(), sqlx::Error> {
    const SQL: &str = "UPDATE events SET last_sync_error = ? WHERE id = ?;";

    sqlx::query(SQL)
        .bind(error)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn flag_attention(
    conn: &mut SqliteConnection,
    id: EventId,
    error: &str,
) -> Result<(), sqlx::Error> {
    const SQL: &str = "UPDATE events SET last_sync_error = ?, needs_attention = 1 WHERE id = ?;";

    sqlx::query(SQL)
        .bind(error)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Moves a master and its exceptions to another calendar, forgetting their
/// remote location.
pub async fn move_series(
    conn: &mut SqliteConnection,
    master_id: EventId,
    calendar_id: CalendarId,
    status: SyncStatus,
    now: Millis,
) -> Result<(), sqlx::Error> {
    const SQL: &str = "\
UPDATE events SET
    calendar_id = ?,
    caldav_url  = NULL,
    etag        = NULL,
    sync_status = ?,
    updated_at  = ?
WHERE id = ? OR master_event_id = ?;
";

    sqlx::query(SQL)
        .bind(calendar_id)
        .bind(status.as_ref())
        .bind(now)
        .bind(master_id)
        .bind(master_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Forgets the remote location of an event, e.g. when the server lost it.
pub async fn clear_remote(conn: &mut SqliteConnection, id: EventId) -> Result<(), sqlx::Error> {
    const SQL: &str = "\
UPDATE events SET caldav_url = NULL, etag = NULL, sync_status = ?
WHERE id = ? OR master_event_id = ?;
";

    sqlx::query(SQL)
        .bind(SyncStatus::PendingCreate.as_ref())
        .bind(id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

struct KindFields {
    rrule: Option<String>,
    rdate: Option<String>,
    exdate: Option<String>,
    master_event_id: Option<EventId>,
    original_instance_ms: Option<Millis>,
}

impl From<&EventKind> for KindFields {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Standalone { recurrence } => Self {
                rrule: recurrence.rule.clone(),
                rdate: join_dates(&recurrence.rdates),
                exdate: join_dates(&recurrence.exdates),
                master_event_id: None,
                original_instance_ms: None,
            },
            EventKind::Exception {
                master_id,
                original_instance,
            } => Self {
                rrule: None,
                rdate: None,
                exdate: None,
                master_event_id: Some(*master_id),
                original_instance_ms: Some(*original_instance),
            },
        }
    }
}

fn join_dates(dates: &[String]) -> Option<String> {
    (!dates.is_empty()).then(|| dates.join(","))
}

fn split_dates(value: Option<String>) -> Vec<String> {
    value
        .map(|a| {
            a.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, sqlx::FromRow)]
struct EventRecord {
    id: EventId,
    calendar_id: CalendarId,
    uid: String,
    title: String,
    description: Option<String>,
    location: Option<String>,
    start_ms: Millis,
    end_ms: Millis,
    all_day: bool,
    timezone: Option<String>,
    rrule: Option<String>,
    rdate: Option<String>,
    exdate: Option<String>,
    master_event_id: Option<EventId>,
    original_instance_ms: Option<Millis>,
    sequence: i64,
    sync_status: String,
    caldav_url: Option<String>,
    etag: Option<String>,
    last_sync_error: Option<String>,
    needs_attention: bool,
    created_at: Millis,
    updated_at: Millis,
}

impl From<EventRecord> for Event {
    fn from(r: EventRecord) -> Self {
        let kind = match r.master_event_id {
            Some(master_id) => EventKind::Exception {
                master_id,
                original_instance: r.original_instance_ms.unwrap_or(r.start_ms),
            },
            None => EventKind::Standalone {
                recurrence: Recurrence {
                    rule: r.rrule,
                    rdates: split_dates(r.rdate),
                    exdates: split_dates(r.exdate),
                },
            },
        };

        let sync_status = r.sync_status.parse().unwrap_or_else(|()| {
            tracing::warn!(event_id = r.id, "unknown sync status, treating as synced");
            SyncStatus::Synced
        });

        Event {
            id: r.id,
            calendar_id: r.calendar_id,
            uid: r.uid,
            title: r.title,
            description: r.description,
            location: r.location,
            start: r.start_ms,
            end: r.end_ms,
            all_day: r.all_day,
            timezone: r.timezone,
            kind,
            sequence: r.sequence,
            sync_status,
            caldav_url: r.caldav_url,
            etag: r.etag,
            last_sync_error: r.last_sync_error,
            needs_attention: r.needs_attention,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
