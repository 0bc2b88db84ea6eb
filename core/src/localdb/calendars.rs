// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use sqlx::SqliteConnection;

use crate::localdb::placeholders;
use crate::types::CalendarId;

/// A calendar collection the user's events live in.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Calendar {
    pub id: CalendarId,

    /// Remote account; `None` for local-only calendars.
    pub account_id: Option<i64>,

    /// Remote collection URL.
    pub url: Option<String>,

    pub display_name: String,
}

impl Calendar {
    /// Local-only calendars never reach a server.
    pub fn is_local_only(&self) -> bool {
        self.account_id.is_none() || self.url.is_none()
    }

    pub fn same_account(&self, other: &Calendar) -> bool {
        !self.is_local_only() && self.account_id == other.account_id
    }
}

#[derive(Debug, Clone)]
pub struct NewCalendar {
    pub account_id: Option<i64>,
    pub url: Option<String>,
    pub display_name: String,
}

impl NewCalendar {
    pub fn into_calendar(self, id: CalendarId) -> Calendar {
        Calendar {
            id,
            account_id: self.account_id,
            url: self.url,
            display_name: self.display_name,
        }
    }
}

pub async fn insert(
    conn: &mut SqliteConnection,
    calendar: &NewCalendar,
) -> Result<CalendarId, sqlx::Error> {
    const SQL: &str = "\
INSERT INTO calendars (account_id, url, display_name)
VALUES (?, ?, ?);
";

    let result = sqlx::query(SQL)
        .bind(calendar.account_id)
        .bind(&calendar.url)
        .bind(&calendar.display_name)
        .execute(&mut *conn)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn get(
    conn: &mut SqliteConnection,
    id: CalendarId,
) -> Result<Option<Calendar>, sqlx::Error> {
    const SQL: &str = "\
SELECT id, account_id, url, display_name
FROM calendars
WHERE id = ?;
";

    sqlx::query_as(SQL)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn get_many(
    conn: &mut SqliteConnection,
    ids: &[CalendarId],
) -> Result<Vec<Calendar>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT id, account_id, url, display_name FROM calendars WHERE id IN ({});",
        placeholders(ids.len())
    );
    let mut query = sqlx::query_as(&sql);
    for id in ids {
        query = query.bind(id);
    }
    query.fetch_all(&mut *conn).await
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<Calendar>, sqlx::Error> {
    const SQL: &str = "\
SELECT id, account_id, url, display_name
FROM calendars
ORDER BY id ASC;
";

    sqlx::query_as(SQL).fetch_all(&mut *conn).await
}
