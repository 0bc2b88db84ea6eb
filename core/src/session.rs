// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Sync session accounting.
//!
//! A [`SyncSessionBuilder`] accumulates counts during one pass over one
//! calendar and freezes into an immutable [`SyncSession`]. Accumulation never
//! fails. Only counts, flags and the calendar's display name are recorded,
//! never event content.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{CalendarId, Millis};

/// Derived outcome of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Success,
    Partial,
    Failed,
}

const SESSION_SUCCESS: &str = "success";
const SESSION_PARTIAL: &str = "partial";
const SESSION_FAILED: &str = "failed";

impl AsRef<str> for SessionStatus {
    fn as_ref(&self) -> &str {
        match self {
            SessionStatus::Success => SESSION_SUCCESS,
            SessionStatus::Partial => SESSION_PARTIAL,
            SessionStatus::Failed => SESSION_FAILED,
        }
    }
}

impl Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl FromStr for SessionStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            SESSION_SUCCESS => Ok(SessionStatus::Success),
            SESSION_PARTIAL => Ok(SessionStatus::Partial),
            SESSION_FAILED => Ok(SessionStatus::Failed),
            _ => Err(()),
        }
    }
}

/// Why an item was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The payload could not be parsed.
    ParseError,
    /// The payload had no UID.
    MissingUid,
    /// Not a component this engine handles (e.g. VTODO).
    UnsupportedComponent,
    /// Outside the synchronized window.
    OutsideWindow,
    /// An exception carried inside its master's payload.
    ExceptionBundled,
}

impl SkipReason {
    /// Skips that mean data was lost and make a session partial.
    pub fn is_parse_skip(self) -> bool {
        matches!(self, SkipReason::ParseError | SkipReason::MissingUid)
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SkipReason::ParseError => "parse_error",
            SkipReason::MissingUid => "missing_uid",
            SkipReason::UnsupportedComponent => "unsupported_component",
            SkipReason::OutsideWindow => "outside_window",
            SkipReason::ExceptionBundled => "exception_bundled",
        };
        f.write_str(name)
    }
}

/// Pull and push counters of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub reported: u32,
    pub fetched: u32,
    pub written: u32,
    pub updated: u32,
    pub deleted: u32,
    pub pushed_created: u32,
    pub pushed_updated: u32,
    pub pushed_deleted: u32,
}

impl SyncCounts {
    pub fn pushed(&self) -> u32 {
        self.pushed_created + self.pushed_updated + self.pushed_deleted
    }
}

/// Immutable record of one synchronization pass over one calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSession {
    pub calendar_id: CalendarId,
    pub calendar_name: String,
    pub started_at: Millis,
    pub finished_at: Millis,
    pub counts: SyncCounts,
    pub skip_reasons: BTreeMap<SkipReason, u32>,
    pub truncated: bool,
    pub used_fallback: bool,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl SyncSession {
    /// Failed if an error type is set, else partial if any parse skip
    /// happened, else success.
    pub fn status(&self) -> SessionStatus {
        if self.error_type.is_some() {
            SessionStatus::Failed
        } else if self
            .skip_reasons
            .iter()
            .any(|(reason, n)| reason.is_parse_skip() && *n > 0)
        {
            SessionStatus::Partial
        } else {
            SessionStatus::Success
        }
    }

    pub fn duration(&self) -> Millis {
        (self.finished_at - self.started_at).max(0)
    }

    pub fn skipped(&self) -> u32 {
        self.skip_reasons.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct SyncSessionBuilder {
    calendar_id: CalendarId,
    calendar_name: String,
    started_at: Millis,
    counts: SyncCounts,
    skip_reasons: BTreeMap<SkipReason, u32>,
    truncated: bool,
    used_fallback: bool,
    error_type: Option<String>,
    error_message: Option<String>,
}

impl SyncSessionBuilder {
    pub fn new(calendar_id: CalendarId, calendar_name: impl Into<String>, now: Millis) -> Self {
        Self {
            calendar_id,
            calendar_name: calendar_name.into(),
            started_at: now,
            counts: SyncCounts::default(),
            skip_reasons: BTreeMap::new(),
            truncated: false,
            used_fallback: false,
            error_type: None,
            error_message: None,
        }
    }

    pub fn reported(&mut self, n: u32) -> &mut Self {
        self.counts.reported = self.counts.reported.saturating_add(n);
        self
    }

    pub fn fetched(&mut self, n: u32) -> &mut Self {
        self.counts.fetched = self.counts.fetched.saturating_add(n);
        self
    }

    pub fn written(&mut self) -> &mut Self {
        self.counts.written = self.counts.written.saturating_add(1);
        self
    }

    pub fn updated(&mut self) -> &mut Self {
        self.counts.updated = self.counts.updated.saturating_add(1);
        self
    }

    pub fn deleted(&mut self) -> &mut Self {
        self.counts.deleted = self.counts.deleted.saturating_add(1);
        self
    }

    pub fn pushed_created(&mut self) -> &mut Self {
        self.counts.pushed_created = self.counts.pushed_created.saturating_add(1);
        self
    }

    pub fn pushed_updated(&mut self) -> &mut Self {
        self.counts.pushed_updated = self.counts.pushed_updated.saturating_add(1);
        self
    }

    pub fn pushed_deleted(&mut self) -> &mut Self {
        self.counts.pushed_deleted = self.counts.pushed_deleted.saturating_add(1);
        self
    }

    pub fn skip(&mut self, reason: SkipReason) -> &mut Self {
        let n = self.skip_reasons.entry(reason).or_default();
        *n = n.saturating_add(1);
        self
    }

    pub fn truncated(&mut self) -> &mut Self {
        self.truncated = true;
        self
    }

    pub fn used_fallback(&mut self) -> &mut Self {
        self.used_fallback = true;
        self
    }

    /// Records an error. The first error of the pass is kept.
    pub fn error(&mut self, error_type: impl Into<String>, message: impl Into<String>) -> &mut Self {
        if self.error_type.is_none() {
            self.error_type = Some(error_type.into());
            self.error_message = Some(message.into());
        }
        self
    }

    pub fn finish(self, now: Millis) -> SyncSession {
        SyncSession {
            calendar_id: self.calendar_id,
            calendar_name: self.calendar_name,
            started_at: self.started_at,
            finished_at: now.max(self.started_at),
            counts: self.counts,
            skip_reasons: self.skip_reasons,
            truncated: self.truncated,
            used_fallback: self.used_fallback,
            error_type: self.error_type,
            error_message: self.error_message,
        }
    }
}
