// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Display;
use std::str::FromStr;

use crate::types::{CalendarId, EventId, Millis};

/// A logical calendar item as stored locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub calendar_id: CalendarId,

    /// Protocol UID. Exceptions share their master's UID.
    pub uid: String,

    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,

    /// Start instant in epoch milliseconds.
    pub start: Millis,

    /// End instant in epoch milliseconds.
    pub end: Millis,

    pub all_day: bool,

    /// IANA timezone name; `None` means floating time.
    pub timezone: Option<String>,

    pub kind: EventKind,

    /// Revision sequence, bumped on every significant change.
    pub sequence: i64,

    pub sync_status: SyncStatus,

    /// Server-assigned location, absent until the first successful push.
    pub caldav_url: Option<String>,

    /// Server-assigned version token.
    pub etag: Option<String>,

    /// Last push error, kept for display.
    pub last_sync_error: Option<String>,

    /// Set when a pending change was abandoned and needs the user.
    pub needs_attention: bool,

    pub created_at: Millis,
    pub updated_at: Millis,
}

impl Event {
    /// Recurrence fields of a standalone event, `None` for exceptions.
    pub fn recurrence(&self) -> Option<&Recurrence> {
        match &self.kind {
            EventKind::Standalone { recurrence } => Some(recurrence),
            EventKind::Exception { .. } => None,
        }
    }

    pub fn recurrence_mut(&mut self) -> Option<&mut Recurrence> {
        match &mut self.kind {
            EventKind::Standalone { recurrence } => Some(recurrence),
            EventKind::Exception { .. } => None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence().is_some_and(Recurrence::is_recurring)
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.kind, EventKind::Exception { .. })
    }

    /// Master id and original instant if this is an exception.
    pub fn exception_of(&self) -> Option<(EventId, Millis)> {
        match self.kind {
            EventKind::Exception {
                master_id,
                original_instance,
            } => Some((master_id, original_instance)),
            EventKind::Standalone { .. } => None,
        }
    }

    pub fn duration(&self) -> Millis {
        (self.end - self.start).max(0)
    }

    /// Whether the server knows about this event.
    pub fn has_reached_server(&self) -> bool {
        self.caldav_url.is_some()
    }

    /// Whether the fields that drive occurrence materialization differ.
    pub(crate) fn timing_differs(&self, other: &Event) -> bool {
        self.start != other.start
            || self.end != other.end
            || self.all_day != other.all_day
            || self.timezone != other.timezone
    }

    pub(crate) fn recurrence_differs(&self, other: &Event) -> bool {
        self.recurrence() != other.recurrence()
    }
}

/// Whether an event stands on its own or overrides one instance of a series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// An independent event, possibly recurring.
    Standalone { recurrence: Recurrence },

    /// A single modified instance of a recurring master.
    Exception {
        master_id: EventId,

        /// The instant of the master occurrence this event replaces.
        original_instance: Millis,
    },
}

impl Default for EventKind {
    fn default() -> Self {
        Self::Standalone {
            recurrence: Recurrence::default(),
        }
    }
}

/// Recurrence fields of a standalone event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recurrence {
    /// RRULE value, with or without the `RRULE:` prefix.
    pub rule: Option<String>,

    /// Extra dates (RDATE), as epoch millis, `YYYYMMDD`, or date-time strings.
    pub rdates: Vec<String>,

    /// Excluded dates (EXDATE), same formats as `rdates`.
    pub exdates: Vec<String>,
}

impl Recurrence {
    pub fn rule(rule: impl Into<String>) -> Self {
        Self {
            rule: Some(rule.into()),
            ..Default::default()
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.rule.as_deref().is_some_and(|r| !r.trim().is_empty()) || !self.rdates.is_empty()
    }
}

/// Where a change to the local store came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChangeSource {
    /// A local edit that must eventually reach the server.
    #[default]
    User,

    /// A change applied by inbound reconciliation; never queued for push.
    Server {
        url: Option<String>,
        etag: Option<String>,
    },
}

impl ChangeSource {
    pub fn is_server(&self) -> bool {
        matches!(self, Self::Server { .. })
    }
}

/// Synchronization status of an event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The server has the latest local state.
    #[default]
    Synced,

    /// The event was created locally and never reached the server.
    PendingCreate,

    /// The server holds an older revision.
    PendingUpdate,

    /// Soft-deleted; kept until the server confirms removal.
    PendingDelete,
}

const SYNC_STATUS_SYNCED: &str = "synced";
const SYNC_STATUS_PENDING_CREATE: &str = "pending_create";
const SYNC_STATUS_PENDING_UPDATE: &str = "pending_update";
const SYNC_STATUS_PENDING_DELETE: &str = "pending_delete";

impl SyncStatus {
    /// Status after a local modification: an event still waiting for its
    /// first create stays that way.
    pub fn after_local_change(self) -> Self {
        match self {
            SyncStatus::PendingCreate => SyncStatus::PendingCreate,
            _ => SyncStatus::PendingUpdate,
        }
    }
}

impl AsRef<str> for SyncStatus {
    fn as_ref(&self) -> &str {
        match self {
            SyncStatus::Synced => SYNC_STATUS_SYNCED,
            SyncStatus::PendingCreate => SYNC_STATUS_PENDING_CREATE,
            SyncStatus::PendingUpdate => SYNC_STATUS_PENDING_UPDATE,
            SyncStatus::PendingDelete => SYNC_STATUS_PENDING_DELETE,
        }
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl FromStr for SyncStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            SYNC_STATUS_SYNCED => Ok(SyncStatus::Synced),
            SYNC_STATUS_PENDING_CREATE => Ok(SyncStatus::PendingCreate),
            SYNC_STATUS_PENDING_UPDATE => Ok(SyncStatus::PendingUpdate),
            SYNC_STATUS_PENDING_DELETE => Ok(SyncStatus::PendingDelete),
            _ => Err(()),
        }
    }
}

/// Draft for an event, used for creating new events.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub calendar_id: CalendarId,

    /// Protocol UID; generated when absent. Ignored for exceptions, which
    /// take their master's.
    pub uid: Option<String>,

    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Millis,
    pub end: Millis,
    pub all_day: bool,
    pub timezone: Option<String>,
    pub kind: EventKind,

    /// Revision sequence reported by the server; ignored for user drafts.
    pub sequence: i64,
}

/// Patch for an event, allowing partial updates.
#[derive(Debug, Default, Clone)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub start: Option<Millis>,
    pub end: Option<Millis>,
    pub all_day: Option<bool>,
    pub timezone: Option<Option<String>>,

    /// Replacement recurrence; ignored when patching an exception.
    pub recurrence: Option<Recurrence>,
}

impl EventPatch {
    /// Is this patch empty, meaning no fields are set
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.all_day.is_none()
            && self.timezone.is_none()
            && self.recurrence.is_none()
    }

    /// Applies the patch to an event, modifying it in place.
    pub fn apply_to<'a>(&self, e: &'a mut Event) -> &'a mut Event {
        if let Some(title) = &self.title {
            e.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            e.description.clone_from(description);
        }
        if let Some(location) = &self.location {
            e.location.clone_from(location);
        }

        // Keep the duration when only the start moves.
        if let Some(start) = self.start {
            let duration = e.duration();
            e.start = start;
            e.end = start + duration;
        }
        if let Some(end) = self.end {
            e.end = end;
        }

        if let Some(all_day) = self.all_day {
            e.all_day = all_day;
        }
        if let Some(timezone) = &self.timezone {
            e.timezone.clone_from(timezone);
        }
        if let (Some(recurrence), Some(target)) = (&self.recurrence, e.recurrence_mut()) {
            *target = recurrence.clone();
        }
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Event {
        Event {
            id: 1,
            calendar_id: 1,
            uid: "uid-1".to_string(),
            title: "Standup".to_string(),
            description: None,
            location: None,
            start: 1_000_000,
            end: 1_000_000 + 1_800_000,
            all_day: false,
            timezone: None,
            kind: EventKind::Standalone {
                recurrence: Recurrence::rule("FREQ=DAILY"),
            },
            sequence: 0,
            sync_status: SyncStatus::Synced,
            caldav_url: None,
            etag: None,
            last_sync_error: None,
            needs_attention: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn sync_status_round_trips_through_strings() {
        for status in [
            SyncStatus::Synced,
            SyncStatus::PendingCreate,
            SyncStatus::PendingUpdate,
            SyncStatus::PendingDelete,
        ] {
            assert_eq!(status.as_ref().parse::<SyncStatus>(), Ok(status));
        }
        assert!("bogus".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn pending_create_survives_local_changes() {
        assert_eq!(
            SyncStatus::PendingCreate.after_local_change(),
            SyncStatus::PendingCreate
        );
        assert_eq!(
            SyncStatus::Synced.after_local_change(),
            SyncStatus::PendingUpdate
        );
        assert_eq!(
            SyncStatus::PendingUpdate.after_local_change(),
            SyncStatus::PendingUpdate
        );
    }

    #[test]
    fn patch_moving_start_keeps_duration() {
        let mut e = event();
        let patch = EventPatch {
            start: Some(2_000_000),
            ..Default::default()
        };
        patch.apply_to(&mut e);
        assert_eq!(e.start, 2_000_000);
        assert_eq!(e.end, 2_000_000 + 1_800_000);
    }

    #[test]
    fn patch_recurrence_ignored_for_exceptions() {
        let mut e = event();
        e.kind = EventKind::Exception {
            master_id: 7,
            original_instance: 1_000_000,
        };
        let patch = EventPatch {
            recurrence: Some(Recurrence::rule("FREQ=WEEKLY")),
            title: Some("Moved".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut e);
        assert!(e.is_exception());
        assert_eq!(e.recurrence(), None);
        assert_eq!(e.title, "Moved");
    }

    #[test]
    fn recurrence_needs_rule_or_rdates() {
        assert!(!Recurrence::default().is_recurring());
        assert!(!Recurrence::rule("  ").is_recurring());
        assert!(Recurrence::rule("FREQ=DAILY").is_recurring());
        let rdates_only = Recurrence {
            rdates: vec!["20250101".to_string()],
            ..Default::default()
        };
        assert!(rdates_only.is_recurring());
    }
}
