// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Retention-bounded log of sync sessions for support diagnostics.

use std::fmt::Write;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::localdb::{LocalDb, sessions};
use crate::session::SyncSession;
use crate::types::{Clock, Millis, format_millis};

/// Receives completed sessions. Recording never fails the pass that produced
/// the session.
#[async_trait]
pub trait DiagnosticsSink: Send + Sync {
    async fn record(&self, session: SyncSession);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl DiagnosticsSink for NoopSink {
    async fn record(&self, _session: SyncSession) {}
}

/// SQLite-backed session log, pruned by age and count on every append.
#[derive(Debug, Clone)]
pub struct SessionLog {
    db: LocalDb,
    clock: Arc<dyn Clock>,
    retention: Millis,
    max_entries: u32,
}

impl SessionLog {
    pub fn new(db: LocalDb, clock: Arc<dyn Clock>, retention: Millis, max_entries: u32) -> Self {
        Self {
            db,
            clock,
            retention,
            max_entries: max_entries.max(1),
        }
    }

    pub async fn append(&self, session: &SyncSession) -> Result<(), Error> {
        let cutoff = self.clock.now_ms() - self.retention;
        let mut tx = self.db.begin().await?;
        sessions::insert(&mut tx, session).await?;
        let pruned = sessions::prune(&mut tx, cutoff, self.max_entries).await?;
        tx.commit().await?;

        if pruned > 0 {
            tracing::debug!(pruned, "pruned old sync sessions");
        }
        Ok(())
    }

    /// Retained sessions, newest first.
    pub async fn list(&self) -> Result<Vec<SyncSession>, Error> {
        let cutoff = self.clock.now_ms() - self.retention;
        let mut conn = self.db.pool().acquire().await?;
        Ok(sessions::list_since(&mut conn, cutoff, self.max_entries).await?)
    }

    /// Plain-text dump of the retained sessions, one line each.
    pub async fn export_text(&self) -> Result<String, Error> {
        let sessions = self.list().await?;
        let mut out = String::new();
        for session in &sessions {
            out.push_str(&format_session(session));
            out.push('\n');
        }
        Ok(out)
    }
}

#[async_trait]
impl DiagnosticsSink for SessionLog {
    async fn record(&self, session: SyncSession) {
        if let Err(e) = self.append(&session).await {
            tracing::warn!(err = %e, calendar_id = session.calendar_id, "failed to record sync session");
        }
    }
}

/// One line of the text export. Only counts, flags and the calendar name.
pub fn format_session(session: &SyncSession) -> String {
    let c = &session.counts;
    let mut line = format!(
        "{} {:?} {} {}ms reported={} fetched={} written={} updated={} deleted={} pushed={}/{}/{}",
        format_millis(session.started_at),
        session.calendar_name,
        session.status(),
        session.duration(),
        c.reported,
        c.fetched,
        c.written,
        c.updated,
        c.deleted,
        c.pushed_created,
        c.pushed_updated,
        c.pushed_deleted,
    );

    if !session.skip_reasons.is_empty() {
        let skipped: Vec<_> = session
            .skip_reasons
            .iter()
            .map(|(reason, n)| format!("{reason}:{n}"))
            .collect();
        let _ = write!(line, " skipped={}", skipped.join(","));
    }
    if session.truncated {
        line.push_str(" truncated");
    }
    if session.used_fallback {
        line.push_str(" fallback");
    }
    if let Some(error_type) = &session.error_type {
        let _ = write!(line, " error={error_type}");
        if let Some(message) = &session.error_message {
            let _ = write!(line, " ({message})");
        }
    }
    line
}
