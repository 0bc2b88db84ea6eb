// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The single write path for event lifecycle operations.
//!
//! Every entry point runs in one transaction and leaves the event row, its
//! occurrence rows and the pending-operation queue consistent with each
//! other. The service drives [`OccurrenceSync`]; the reverse never happens.

use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::config::SyncConfig;
use crate::error::Error;
use crate::event::{ChangeSource, Event, EventDraft, EventKind, EventPatch, Recurrence, SyncStatus};
use crate::localdb::calendars::Calendar;
use crate::localdb::occurrences::Occurrence;
use crate::localdb::{LocalDb, calendars, events, occurrences, pending_ops};
use crate::occurrence::OccurrenceSync;
use crate::pending::{self, MovePhase, Operation, PendingOperation, RemoteTarget, Upgrade};
use crate::recurrence::{
    DateCode, RecurrenceInput, Window, normalize_date_code, rule_count, rule_until, truncate_rule,
    truncation_unit, with_count,
};
use crate::types::{CalendarId, Clock, EventId, MILLIS_PER_SECOND, Millis};

/// Remote work required to move an event between calendars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePlan {
    /// Nothing to tell any server.
    NoOp,
    /// Create in the target only.
    CreateOnly,
    /// Remove from the source only.
    DeleteOnly,
    /// Delete then create within one account, as one two-phase operation.
    AtomicMove,
    /// Independent create and delete, for calendars that sync separately.
    CreateAndDelete,
}

impl MovePlan {
    /// Picks the plan from where the event goes and whether the source
    /// server holds a copy.
    pub fn resolve(source: &Calendar, target: &Calendar, on_server: bool) -> Self {
        match (source.is_local_only(), target.is_local_only()) {
            (_, true) if on_server => MovePlan::DeleteOnly,
            (_, true) => MovePlan::NoOp,
            (true, false) => MovePlan::CreateOnly,
            (false, false) if !on_server => MovePlan::CreateOnly,
            (false, false) if source.same_account(target) => MovePlan::AtomicMove,
            (false, false) => MovePlan::CreateAndDelete,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventService {
    db: LocalDb,
    occurrences: OccurrenceSync,
    clock: Arc<dyn Clock>,
    horizon: Millis,
}

impl EventService {
    pub fn new(
        db: LocalDb,
        occurrences: OccurrenceSync,
        clock: Arc<dyn Clock>,
        horizon: Millis,
    ) -> Self {
        Self {
            db,
            occurrences,
            clock,
            horizon,
        }
    }

    pub fn from_config(db: LocalDb, config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        let occurrences =
            OccurrenceSync::new(config.expander(), config.exception_tolerance.as_millis());
        Self::new(db, occurrences, clock, config.horizon.as_millis())
    }

    pub fn db(&self) -> &LocalDb {
        &self.db
    }

    /// Initial materialization window: from just before the start through
    /// the horizon.
    fn window_for(&self, event: &Event, now: Millis) -> Window {
        Window::new(
            event.start - MILLIS_PER_SECOND,
            event.start.max(now) + self.horizon,
        )
    }

    // ------------------------------------------------------------------
    // create / update / delete
    // ------------------------------------------------------------------

    pub async fn create(&self, draft: EventDraft, source: ChangeSource) -> Result<Event, Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        let event = self.create_in(&mut tx, draft, &source, now).await?;
        tx.commit().await?;
        Ok(event)
    }

    #[tracing::instrument(skip_all, fields(calendar_id = draft.calendar_id, server = source.is_server()))]
    async fn create_in(
        &self,
        conn: &mut SqliteConnection,
        draft: EventDraft,
        source: &ChangeSource,
        now: Millis,
    ) -> Result<Event, Error> {
        if draft.end < draft.start {
            return Err(Error::invalid("event ends before it starts"));
        }

        let master = match &draft.kind {
            EventKind::Exception { master_id, .. } => {
                let master = events::get(conn, *master_id)
                    .await?
                    .ok_or(Error::EventNotFound(*master_id))?;
                if master.is_exception() {
                    return Err(Error::invalid("an exception cannot have exceptions"));
                }
                Some(master)
            }
            EventKind::Standalone { .. } => None,
        };

        let calendar_id = master.as_ref().map_or(draft.calendar_id, |m| m.calendar_id);
        let calendar = calendar_in(conn, calendar_id).await?;
        let uid = match &master {
            Some(m) => m.uid.clone(),
            None => draft
                .uid
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        };

        let (sync_status, sequence, caldav_url, etag) = match source {
            ChangeSource::Server { url, etag } => {
                (SyncStatus::Synced, draft.sequence, url.clone(), etag.clone())
            }
            ChangeSource::User if calendar.is_local_only() => (SyncStatus::Synced, 0, None, None),
            ChangeSource::User => (SyncStatus::PendingCreate, 0, None, None),
        };

        let mut event = Event {
            id: 0,
            calendar_id,
            uid,
            title: draft.title,
            description: draft.description,
            location: draft.location,
            start: draft.start,
            end: draft.end,
            all_day: draft.all_day,
            timezone: draft.timezone,
            kind: draft.kind,
            sequence,
            sync_status,
            caldav_url,
            etag,
            last_sync_error: None,
            needs_attention: false,
            created_at: now,
            updated_at: now,
        };
        event.id = events::insert(conn, &event).await?;
        tracing::debug!(event_id = event.id, "created event");

        let queue = !source.is_server() && !calendar.is_local_only();
        match master {
            Some(mut master) => {
                self.occurrences
                    .link_exception_in(conn, &master, &event)
                    .await?;
                if queue {
                    self.touch_master_in(conn, &mut master, now).await?;
                }
            }
            None => {
                let window = self.window_for(&event, now);
                self.occurrences.generate_in(conn, &event, window).await?;
                if queue {
                    enqueue_in(conn, event.id, Operation::Create, now).await?;
                }
            }
        }
        Ok(event)
    }

    /// Replaces the stored content of an event. Identity, calendar and UID
    /// come from the stored row; use [`Self::move_to_calendar`] to change
    /// calendars.
    pub async fn update(&self, event: &Event, source: ChangeSource) -> Result<Event, Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        let stored = events::get(&mut tx, event.id)
            .await?
            .ok_or(Error::EventNotFound(event.id))?;
        let updated = self
            .update_in(&mut tx, &stored, event.clone(), &source, now)
            .await?;
        tx.commit().await?;
        Ok(updated)
    }

    #[tracing::instrument(skip_all, fields(event_id = stored.id, server = source.is_server()))]
    async fn update_in(
        &self,
        conn: &mut SqliteConnection,
        stored: &Event,
        mut updated: Event,
        source: &ChangeSource,
        now: Millis,
    ) -> Result<Event, Error> {
        if stored.sync_status == SyncStatus::PendingDelete {
            return Err(Error::invalid("event is pending deletion"));
        }
        if updated.end < updated.start {
            return Err(Error::invalid("event ends before it starts"));
        }
        match (&stored.kind, &updated.kind) {
            (EventKind::Standalone { .. }, EventKind::Standalone { .. }) => {}
            (EventKind::Exception { master_id: a, .. }, EventKind::Exception { master_id: b, .. })
                if a == b =>
            {
                updated.kind = stored.kind.clone();
            }
            _ => return Err(Error::invalid("cannot change whether an event is an exception")),
        }

        let calendar = calendar_in(conn, stored.calendar_id).await?;
        updated.id = stored.id;
        updated.calendar_id = stored.calendar_id;
        updated.uid.clone_from(&stored.uid);
        updated.created_at = stored.created_at;
        updated.updated_at = now;

        let significant = stored.timing_differs(&updated) || stored.recurrence_differs(&updated);
        match source {
            ChangeSource::Server { url, etag } => {
                updated.sync_status = SyncStatus::Synced;
                updated.caldav_url = url.clone().or_else(|| stored.caldav_url.clone());
                updated.etag = etag.clone().or_else(|| stored.etag.clone());
                updated.last_sync_error = None;
                updated.needs_attention = false;
            }
            ChangeSource::User => {
                updated.sequence = stored.sequence + i64::from(significant);
                updated.sync_status = if calendar.is_local_only() {
                    SyncStatus::Synced
                } else {
                    stored.sync_status.after_local_change()
                };
                updated.caldav_url.clone_from(&stored.caldav_url);
                updated.etag.clone_from(&stored.etag);
                updated.last_sync_error.clone_from(&stored.last_sync_error);
                updated.needs_attention = stored.needs_attention;
            }
        }
        events::update(conn, &updated).await?;

        let master = match updated.exception_of() {
            Some((master_id, _)) => events::get(conn, master_id).await?,
            None => None,
        };
        if significant {
            match &master {
                Some(master) => {
                    self.occurrences
                        .link_exception_in(conn, master, &updated)
                        .await?;
                }
                None => {
                    let window = self.window_for(&updated, now);
                    self.occurrences.generate_in(conn, &updated, window).await?;
                }
            }
        }

        if !source.is_server() && !calendar.is_local_only() {
            match master {
                Some(mut master) => self.touch_master_in(conn, &mut master, now).await?,
                None => {
                    enqueue_in(conn, updated.id, Operation::Update, now).await?;
                }
            }
        }
        tracing::debug!(significant, "updated event");
        Ok(updated)
    }

    /// Deletes an event. Events the server never saw (and all events of
    /// local-only calendars) are removed outright; others are soft-deleted
    /// until the server confirms.
    pub async fn delete(&self, id: EventId, source: ChangeSource) -> Result<(), Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        let event = events::get(&mut tx, id)
            .await?
            .ok_or(Error::EventNotFound(id))?;
        self.delete_in(&mut tx, event, &source, now).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(event_id = event.id, server = source.is_server()))]
    async fn delete_in(
        &self,
        conn: &mut SqliteConnection,
        event: Event,
        source: &ChangeSource,
        now: Millis,
    ) -> Result<(), Error> {
        if let Some((master_id, original)) = event.exception_of() {
            if source.is_server() {
                events::delete(conn, event.id).await?;
                if let Some(master) = events::get(conn, master_id).await? {
                    let window = self.window_for(&master, now);
                    self.occurrences.generate_in(conn, &master, window).await?;
                }
                return Ok(());
            }
            return self
                .delete_single_occurrence_in(conn, master_id, original, now)
                .await;
        }

        let calendar = calendar_in(conn, event.calendar_id).await?;
        let existing = pending_ops::active_for_event(conn, event.id).await?;
        let remote = remote_ref(&event, existing.as_ref());
        if source.is_server() || calendar.is_local_only() || remote.is_none() {
            return hard_delete_in(conn, event.id).await;
        }

        let decision = enqueue_in(conn, event.id, Operation::Delete { target: None }, now).await?;
        if decision == Upgrade::Drop {
            return hard_delete_in(conn, event.id).await;
        }

        events::set_sync_status(conn, event.id, SyncStatus::PendingDelete, now).await?;
        occurrences::delete_for_event(conn, event.id).await?;
        tracing::debug!("soft-deleted event");
        Ok(())
    }

    // ------------------------------------------------------------------
    // single occurrences
    // ------------------------------------------------------------------

    /// Overrides one instance of a recurring series with an exception event,
    /// creating it or patching the existing one.
    pub async fn edit_single_occurrence(
        &self,
        master_id: EventId,
        original_instance: Millis,
        patch: &EventPatch,
    ) -> Result<Event, Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        let mut master = self.recurring_master_in(&mut tx, master_id).await?;
        let calendar = calendar_in(&mut tx, master.calendar_id).await?;
        let local = calendar.is_local_only();
        let tolerance = self.tolerance();

        let exception = match events::find_exception(&mut tx, master_id, original_instance, tolerance)
            .await?
        {
            Some(stored) => {
                let mut exception = stored.clone();
                patch.apply_to(&mut exception);
                let significant = stored.timing_differs(&exception);
                exception.sequence += i64::from(significant);
                exception.sync_status = if local {
                    SyncStatus::Synced
                } else {
                    stored.sync_status.after_local_change()
                };
                exception.updated_at = now;
                events::update(&mut tx, &exception).await?;
                exception
            }
            None => {
                let mut exception = Event {
                    id: 0,
                    calendar_id: master.calendar_id,
                    uid: master.uid.clone(),
                    title: master.title.clone(),
                    description: master.description.clone(),
                    location: master.location.clone(),
                    start: original_instance,
                    end: original_instance + master.duration(),
                    all_day: master.all_day,
                    timezone: master.timezone.clone(),
                    kind: EventKind::Exception {
                        master_id,
                        original_instance,
                    },
                    sequence: master.sequence,
                    sync_status: if local {
                        SyncStatus::Synced
                    } else {
                        SyncStatus::PendingCreate
                    },
                    caldav_url: None,
                    etag: None,
                    last_sync_error: None,
                    needs_attention: false,
                    created_at: now,
                    updated_at: now,
                };
                patch.apply_to(&mut exception);
                exception.id = events::insert(&mut tx, &exception).await?;
                exception
            }
        };
        if exception.end < exception.start {
            return Err(Error::invalid("event ends before it starts"));
        }

        self.occurrences
            .link_exception_in(&mut tx, &master, &exception)
            .await?;
        if !local {
            self.touch_master_in(&mut tx, &mut master, now).await?;
        }
        tx.commit().await?;
        tracing::debug!(master_id, exception_id = exception.id, "edited single occurrence");
        Ok(exception)
    }

    /// Removes one instance of a recurring series.
    pub async fn delete_single_occurrence(
        &self,
        master_id: EventId,
        instant: Millis,
    ) -> Result<(), Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        self.delete_single_occurrence_in(&mut tx, master_id, instant, now)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_single_occurrence_in(
        &self,
        conn: &mut SqliteConnection,
        master_id: EventId,
        instant: Millis,
        now: Millis,
    ) -> Result<(), Error> {
        let mut master = self.recurring_master_in(conn, master_id).await?;
        let calendar = calendar_in(conn, master.calendar_id).await?;
        let zone = self.occurrences.expander().zone_for(&master);
        let value = zone
            .exdate_value(instant)
            .map_err(|e| Error::invalid(e.to_string()))?;

        let exception = events::find_exception(conn, master_id, instant, self.tolerance()).await?;
        let linked = match &exception {
            Some(e) => occurrences::linked_to(conn, master_id, e.id).await?,
            None => None,
        };

        if let Some(recurrence) = master.recurrence_mut() {
            if !recurrence.exdates.contains(&value) {
                recurrence.exdates.push(value);
            }
        }
        master.sequence += 1;
        master.sync_status = if calendar.is_local_only() {
            SyncStatus::Synced
        } else {
            master.sync_status.after_local_change()
        };
        master.updated_at = now;
        events::update(conn, &master).await?;

        if let Some(exception) = exception {
            events::delete(conn, exception.id).await?;
        }
        match linked {
            Some(row) => occurrences::set_cancelled(conn, row.id, true).await?,
            None => {
                self.occurrences.cancel_in(conn, master_id, instant).await?;
            }
        }

        if !calendar.is_local_only() {
            enqueue_in(conn, master_id, Operation::Update, now).await?;
        }
        tracing::debug!(master_id, "deleted single occurrence");
        Ok(())
    }

    // ------------------------------------------------------------------
    // this-and-future
    // ------------------------------------------------------------------

    /// Ends the series before `split` and starts a new, independent series
    /// there carrying `patch`. Splitting at or before the first instance
    /// patches the whole series instead. Returns the event that now holds the
    /// modified instances.
    pub async fn split_series(
        &self,
        master_id: EventId,
        split: Millis,
        patch: &EventPatch,
    ) -> Result<Event, Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        let mut master = self.recurring_master_in(&mut tx, master_id).await?;

        if split <= master.start {
            let mut updated = master.clone();
            patch.apply_to(&mut updated);
            let updated = self
                .update_in(&mut tx, &master, updated, &ChangeSource::User, now)
                .await?;
            tx.commit().await?;
            return Ok(updated);
        }

        let tail = self.truncate_in(&mut tx, &mut master, split, now).await?;
        let mut draft = EventDraft {
            calendar_id: master.calendar_id,
            uid: None,
            title: master.title.clone(),
            description: master.description.clone(),
            location: master.location.clone(),
            start: split,
            end: split + master.duration(),
            all_day: master.all_day,
            timezone: master.timezone.clone(),
            kind: EventKind::Standalone { recurrence: tail },
            sequence: 0,
        };
        apply_patch_to_draft(patch, &mut draft);
        let created = self
            .create_in(&mut tx, draft, &ChangeSource::User, now)
            .await?;
        tx.commit().await?;
        tracing::debug!(master_id, new_event_id = created.id, "split series");
        Ok(created)
    }

    /// Deletes the instance at `instant` and every later one. From the first
    /// instance this deletes the whole event.
    pub async fn delete_this_and_future(
        &self,
        master_id: EventId,
        instant: Millis,
    ) -> Result<(), Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        let mut master = self.recurring_master_in(&mut tx, master_id).await?;
        if instant <= master.start {
            self.delete_in(&mut tx, master, &ChangeSource::User, now)
                .await?;
        } else {
            self.truncate_in(&mut tx, &mut master, instant, now).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Ends a series one unit before `split`, drops the rows and exceptions
    /// whose series instant is from there on, and returns the recurrence the
    /// remainder would need.
    async fn truncate_in(
        &self,
        conn: &mut SqliteConnection,
        master: &mut Event,
        split: Millis,
        now: Millis,
    ) -> Result<Recurrence, Error> {
        let calendar = calendar_in(conn, master.calendar_id).await?;
        let expander = self.occurrences.expander();
        let zone = expander.zone_for(master);
        let input = RecurrenceInput::from_event(master);
        let recurrence = master.recurrence().cloned().unwrap_or_default();
        let map_err = |e: crate::recurrence::RecurrenceError| Error::invalid(e.to_string());

        let (master_rule, tail_rule) = match recurrence.rule.as_deref() {
            Some(rule) => {
                let until = split - truncation_unit(master.all_day);
                let until = match rule_until(rule, zone).map_err(map_err)? {
                    Some(existing) => existing.min(until),
                    None => until,
                };
                let tail = match rule_count(rule) {
                    Some(count) => {
                        let before = expander
                            .rule_instants_before(&input, split)
                            .map_err(map_err)?;
                        let used = u32::try_from(before).unwrap_or(u32::MAX);
                        count
                            .checked_sub(used)
                            .filter(|n| *n > 0)
                            .map(|n| with_count(rule, n))
                    }
                    None => Some(rule.to_string()),
                };
                (Some(truncate_rule(rule, until).map_err(map_err)?), tail)
            }
            None => (None, None),
        };

        let split_day = zone.date_code(split).map_err(map_err)?;
        let on_or_after = |value: &String| -> Result<bool, Error> {
            let code: DateCode = normalize_date_code(value, zone).map_err(map_err)?;
            Ok(code >= split_day)
        };
        let mut master_rdates = Vec::new();
        let mut tail_rdates = Vec::new();
        for value in recurrence.rdates {
            if on_or_after(&value)? {
                tail_rdates.push(value);
            } else {
                master_rdates.push(value);
            }
        }
        let mut tail_exdates = Vec::new();
        for value in &recurrence.exdates {
            if on_or_after(value)? {
                tail_exdates.push(value.clone());
            }
        }

        if let Some(r) = master.recurrence_mut() {
            r.rule = master_rule;
            r.rdates = master_rdates;
        }
        master.sequence += 1;
        master.sync_status = if calendar.is_local_only() {
            SyncStatus::Synced
        } else {
            master.sync_status.after_local_change()
        };
        master.updated_at = now;
        events::update(conn, master).await?;

        let removed_rows = occurrences::delete_from(conn, master.id, split).await?;
        let removed_exceptions = events::delete_exceptions_from(conn, master.id, split).await?;
        if !calendar.is_local_only() {
            enqueue_in(conn, master.id, Operation::Update, now).await?;
        }
        tracing::debug!(
            master_id = master.id,
            removed_rows,
            removed_exceptions,
            "truncated series"
        );

        Ok(Recurrence {
            rule: tail_rule,
            rdates: tail_rdates,
            exdates: tail_exdates,
        })
    }

    // ------------------------------------------------------------------
    // calendar moves
    // ------------------------------------------------------------------

    /// Moves an event (and its exceptions) to another calendar, replacing any
    /// pending operation with the remote work the move requires.
    pub async fn move_to_calendar(
        &self,
        event_id: EventId,
        target_calendar_id: CalendarId,
    ) -> Result<MovePlan, Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        let event = events::get(&mut tx, event_id)
            .await?
            .ok_or(Error::EventNotFound(event_id))?;
        if event.is_exception() {
            return Err(Error::invalid("exceptions move with their master"));
        }
        if event.sync_status == SyncStatus::PendingDelete {
            return Err(Error::invalid("event is pending deletion"));
        }
        if event.calendar_id == target_calendar_id {
            return Ok(MovePlan::NoOp);
        }

        let source = calendar_in(&mut tx, event.calendar_id).await?;
        let target = calendar_in(&mut tx, target_calendar_id).await?;
        let existing = pending_ops::active_for_event(&mut tx, event_id).await?;
        let remote = remote_ref(&event, existing.as_ref());
        let plan = MovePlan::resolve(&source, &target, remote.is_some());

        pending_ops::delete_attached(&mut tx, event_id).await?;
        let status = match (plan, remote) {
            (MovePlan::NoOp, _) => SyncStatus::Synced,
            (MovePlan::CreateOnly, _) => {
                let op = PendingOperation::new(event_id, Operation::Create, now);
                pending_ops::insert(&mut tx, &op).await?;
                SyncStatus::PendingCreate
            }
            (MovePlan::DeleteOnly, Some(remote)) => {
                let op = PendingOperation::detached_delete(event_id, remote, now);
                pending_ops::insert(&mut tx, &op).await?;
                SyncStatus::Synced
            }
            (MovePlan::AtomicMove, Some(remote)) => {
                let op = Operation::Move {
                    phase: MovePhase::Delete,
                    source: remote,
                    target_calendar_id,
                };
                pending_ops::insert(&mut tx, &PendingOperation::new(event_id, op, now)).await?;
                SyncStatus::PendingCreate
            }
            (MovePlan::CreateAndDelete, Some(remote)) => {
                let create = PendingOperation::new(event_id, Operation::Create, now);
                pending_ops::insert(&mut tx, &create).await?;
                let delete = PendingOperation::detached_delete(event_id, remote, now);
                pending_ops::insert(&mut tx, &delete).await?;
                SyncStatus::PendingCreate
            }
            (MovePlan::DeleteOnly | MovePlan::AtomicMove | MovePlan::CreateAndDelete, None) => {
                return Err(Error::invalid("move plan needs a remote location"));
            }
        };

        events::move_series(&mut tx, event_id, target_calendar_id, status, now).await?;
        occurrences::set_calendar(&mut tx, event_id, target_calendar_id).await?;
        tx.commit().await?;
        tracing::info!(event_id, target_calendar_id, ?plan, "moved event");
        Ok(plan)
    }

    // ------------------------------------------------------------------
    // reads and maintenance
    // ------------------------------------------------------------------

    pub async fn get(&self, id: EventId) -> Result<Option<Event>, Error> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(events::get(&mut conn, id).await?)
    }

    pub async fn occurrences_of(&self, event_id: EventId) -> Result<Vec<Occurrence>, Error> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(occurrences::list_for_event(&mut conn, event_id).await?)
    }

    /// Occurrences touching the day range, for calendar views.
    pub async fn occurrences_in_range(
        &self,
        day_from: DateCode,
        day_to: DateCode,
    ) -> Result<Vec<Occurrence>, Error> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(occurrences::list_in_range(&mut conn, day_from, day_to).await?)
    }

    /// Every queued operation of the event, detached cleanup included.
    pub async fn pending_operations(&self, event_id: EventId) -> Result<Vec<PendingOperation>, Error> {
        let mut conn = self.db.pool().acquire().await?;
        Ok(pending_ops::list_for_event(&mut conn, event_id).await?)
    }

    /// Materializes a recurring event up to the current horizon.
    pub async fn extend_horizon(&self, event_id: EventId) -> Result<usize, Error> {
        let new_end = self.clock.now_ms() + self.horizon;
        self.occurrences.extend(&self.db, event_id, new_end).await
    }

    // ------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------

    fn tolerance(&self) -> Millis {
        self.occurrences.tolerance()
    }

    async fn recurring_master_in(
        &self,
        conn: &mut SqliteConnection,
        master_id: EventId,
    ) -> Result<Event, Error> {
        let master = events::get(conn, master_id)
            .await?
            .ok_or(Error::EventNotFound(master_id))?;
        if master.is_exception() {
            return Err(Error::invalid("expected a series master, got an exception"));
        }
        if !master.is_recurring() {
            return Err(Error::invalid("event is not recurring"));
        }
        if master.sync_status == SyncStatus::PendingDelete {
            return Err(Error::invalid("event is pending deletion"));
        }
        Ok(master)
    }

    /// Queues the master for push after one of its exceptions changed.
    async fn touch_master_in(
        &self,
        conn: &mut SqliteConnection,
        master: &mut Event,
        now: Millis,
    ) -> Result<(), Error> {
        if master.sync_status == SyncStatus::PendingDelete {
            return Ok(());
        }
        master.sync_status = master.sync_status.after_local_change();
        events::set_sync_status(conn, master.id, master.sync_status, now).await?;
        enqueue_in(conn, master.id, Operation::Update, now).await?;
        Ok(())
    }
}

async fn calendar_in(conn: &mut SqliteConnection, id: CalendarId) -> Result<Calendar, Error> {
    calendars::get(conn, id)
        .await?
        .ok_or(Error::CalendarNotFound(id))
}

/// Where the server holds the event, if anywhere: its own location, or the
/// source of a move whose delete phase has not run yet.
fn remote_ref(event: &Event, existing: Option<&PendingOperation>) -> Option<RemoteTarget> {
    if let Some(url) = &event.caldav_url {
        return Some(RemoteTarget {
            calendar_id: event.calendar_id,
            url: url.clone(),
            etag: event.etag.clone(),
        });
    }
    match existing.map(|op| &op.operation) {
        Some(Operation::Move {
            phase: MovePhase::Delete,
            source,
            ..
        }) => Some(source.clone()),
        _ => None,
    }
}

/// Removes an event row with its own queue entries; rows and exceptions
/// cascade, detached cleanup stays queued.
async fn hard_delete_in(conn: &mut SqliteConnection, event_id: EventId) -> Result<(), Error> {
    let ops = pending_ops::delete_attached(conn, event_id).await?;
    events::delete(conn, event_id).await?;
    tracing::debug!(event_id, dropped_ops = ops, "hard-deleted event");
    Ok(())
}

/// Applies the at-most-one-operation rule and persists the outcome.
pub(crate) async fn enqueue_in(
    conn: &mut SqliteConnection,
    event_id: EventId,
    operation: Operation,
    now: Millis,
) -> Result<Upgrade, Error> {
    let existing = pending_ops::active_for_event(conn, event_id).await?;
    let decision = pending::upgrade(existing.as_ref(), operation);
    match (&decision, existing) {
        (Upgrade::Insert(op), _) => {
            pending_ops::insert(conn, &PendingOperation::new(event_id, op.clone(), now)).await?;
        }
        (Upgrade::Replace(op), Some(mut existing)) => {
            let generation = existing.generation;
            existing.refresh(op.clone(), now);
            if !pending_ops::update(conn, &existing, generation).await? {
                return Err(Error::invalid("pending operation changed concurrently"));
            }
        }
        (Upgrade::Drop, Some(existing)) => {
            pending_ops::delete(conn, existing.id).await?;
        }
        (Upgrade::Replace(_) | Upgrade::Drop, None) => {}
    }
    tracing::debug!(event_id, ?decision, "enqueued operation");
    Ok(decision)
}

fn apply_patch_to_draft(patch: &EventPatch, draft: &mut EventDraft) {
    if let Some(title) = &patch.title {
        draft.title.clone_from(title);
    }
    if let Some(description) = &patch.description {
        draft.description.clone_from(description);
    }
    if let Some(location) = &patch.location {
        draft.location.clone_from(location);
    }
    if let Some(start) = patch.start {
        let duration = (draft.end - draft.start).max(0);
        draft.start = start;
        draft.end = start + duration;
    }
    if let Some(end) = patch.end {
        draft.end = end;
    }
    if let Some(all_day) = patch.all_day {
        draft.all_day = all_day;
    }
    if let Some(timezone) = &patch.timezone {
        draft.timezone.clone_from(timezone);
    }
    if let Some(recurrence) = &patch.recurrence {
        draft.kind = EventKind::Standalone {
            recurrence: recurrence.clone(),
        };
    }
}
