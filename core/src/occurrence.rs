// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Keeps the materialized occurrence rows of an event in step with its
//! recurrence, preserving exception links across regeneration.
//!
//! Every public entry point runs in one transaction. The `*_in` variants take
//! an open connection so the event service can compose them into its own
//! transaction.

use std::collections::{HashMap, HashSet};

use sqlx::SqliteConnection;

use crate::error::Error;
use crate::event::Event;
use crate::localdb::{LocalDb, events, occurrences};
use crate::recurrence::{Expander, Instance, RecurrenceInput, Window};
use crate::types::{EventId, MILLIS_PER_SECOND, Millis};

/// Link state of one occurrence captured before regeneration, keyed by the
/// original instant of the series.
#[derive(Debug, Clone, Copy)]
struct Captured {
    instant: Millis,
    exception_id: Option<EventId>,
    cancelled: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct OccurrenceSync {
    expander: Expander,
    tolerance: Millis,
}

impl OccurrenceSync {
    pub fn new(expander: Expander, tolerance: Millis) -> Self {
        Self {
            expander,
            tolerance: tolerance.max(0),
        }
    }

    pub fn expander(&self) -> &Expander {
        &self.expander
    }

    /// Drift allowed when matching an exception to a regenerated row.
    pub fn tolerance(&self) -> Millis {
        self.tolerance
    }

    /// Regenerates the occurrences of an event over `window`. Returns the
    /// number of instances materialized.
    pub async fn generate(
        &self,
        db: &LocalDb,
        event_id: EventId,
        window: Window,
    ) -> Result<usize, Error> {
        let mut tx = db.begin().await?;
        let event = events::get(&mut tx, event_id)
            .await?
            .ok_or(Error::EventNotFound(event_id))?;
        let n = self.generate_in(&mut tx, &event, window).await?;
        tx.commit().await?;
        Ok(n)
    }

    #[tracing::instrument(skip_all, fields(event_id = event.id))]
    pub async fn generate_in(
        &self,
        conn: &mut SqliteConnection,
        event: &Event,
        window: Window,
    ) -> Result<usize, Error> {
        // Compute first; persisted rows are untouched until the new set is
        // known to be usable.
        let input = RecurrenceInput::from_event(event);
        let instances = if event.is_recurring() {
            self.expander.expand(&input, window)
        } else {
            vec![self.expander.single(&input)]
        };
        if instances.is_empty() {
            if event.is_recurring() {
                tracing::warn!("expansion produced no instances, keeping previous occurrences");
            }
            return Ok(0);
        }

        let exceptions = events::exceptions_of(conn, event.id).await?;
        let captured = self.capture(conn, event.id, &exceptions).await?;

        occurrences::delete_for_event(conn, event.id).await?;
        for instance in &instances {
            occurrences::insert(conn, event.id, event.calendar_id, instance).await?;
        }

        let mut linked = HashSet::new();
        for c in captured {
            if self.reapply(conn, event.id, c, &exceptions).await? {
                if let Some(id) = c.exception_id {
                    linked.insert(id);
                }
            }
        }

        for exception in &exceptions {
            let Some((_, original)) = exception.exception_of() else {
                continue;
            };
            if !linked.contains(&exception.id) && window.contains(original) {
                tracing::debug!(exception_id = exception.id, "folding unlinked exception");
                self.attach(conn, event, exception, false).await?;
            }
        }

        tracing::debug!(count = instances.len(), "regenerated occurrences");
        Ok(instances.len())
    }

    async fn capture(
        &self,
        conn: &mut SqliteConnection,
        event_id: EventId,
        exceptions: &[Event],
    ) -> Result<Vec<Captured>, Error> {
        let originals: HashMap<EventId, Millis> = exceptions
            .iter()
            .filter_map(|e| e.exception_of().map(|(_, original)| (e.id, original)))
            .collect();

        let mut captured = Vec::new();
        for row in occurrences::list_for_event(conn, event_id).await? {
            match row.exception_event_id {
                Some(exception_id) => match originals.get(&exception_id) {
                    Some(&instant) => captured.push(Captured {
                        instant,
                        exception_id: Some(exception_id),
                        cancelled: row.is_cancelled,
                    }),
                    None => tracing::debug!(exception_id, "dropping link to missing exception"),
                },
                None if row.is_cancelled => captured.push(Captured {
                    instant: row.original_start,
                    exception_id: None,
                    cancelled: true,
                }),
                None => {}
            }
        }
        Ok(captured)
    }

    /// Re-attaches one captured link to the nearest fresh row. Returns false
    /// when the link is orphaned.
    async fn reapply(
        &self,
        conn: &mut SqliteConnection,
        event_id: EventId,
        captured: Captured,
        exceptions: &[Event],
    ) -> Result<bool, Error> {
        let candidates =
            occurrences::unlinked_near(conn, event_id, captured.instant, self.tolerance).await?;
        let Some(row) = candidates.first() else {
            if captured.exception_id.is_some() {
                tracing::warn!(
                    exception_id = ?captured.exception_id,
                    instant = captured.instant,
                    "exception link orphaned by regeneration"
                );
            } else {
                tracing::debug!(instant = captured.instant, "cancelled occurrence no longer generated");
            }
            return Ok(false);
        };
        if candidates.len() > 1 {
            tracing::warn!(
                instant = captured.instant,
                candidates = candidates.len(),
                "ambiguous occurrence match within tolerance, taking the nearest"
            );
        }

        if let Some(exception_id) = captured.exception_id {
            let instance = exceptions
                .iter()
                .find(|e| e.id == exception_id)
                .map(|e| self.expander.single(&RecurrenceInput::from_event(e)));
            if let Some(instance) = instance {
                occurrences::link(conn, row.id, exception_id, &instance).await?;
            }
        }
        if captured.cancelled {
            occurrences::set_cancelled(conn, row.id, true).await?;
        }
        Ok(true)
    }

    /// Materializes instances after the last materialized series instant, up
    /// to `new_end`.
    pub async fn extend(
        &self,
        db: &LocalDb,
        event_id: EventId,
        new_end: Millis,
    ) -> Result<usize, Error> {
        let mut tx = db.begin().await?;
        let event = events::get(&mut tx, event_id)
            .await?
            .ok_or(Error::EventNotFound(event_id))?;
        let n = self.extend_in(&mut tx, &event, new_end).await?;
        tx.commit().await?;
        Ok(n)
    }

    #[tracing::instrument(skip_all, fields(event_id = event.id))]
    pub async fn extend_in(
        &self,
        conn: &mut SqliteConnection,
        event: &Event,
        new_end: Millis,
    ) -> Result<usize, Error> {
        if !event.is_recurring() {
            return Ok(0);
        }

        let from = occurrences::max_original_start(conn, event.id)
            .await?
            .unwrap_or(event.start - MILLIS_PER_SECOND);
        if new_end <= from {
            return Ok(0);
        }

        // Trailing instances may be linked and moved anywhere; they are
        // expanded again and skipped by their series instant.
        let window = Window::new(from, new_end);
        let instances = self
            .expander
            .expand(&RecurrenceInput::from_event(event), window);
        let mut fresh = Vec::with_capacity(instances.len());
        for instance in instances {
            if !occurrences::exists_near(conn, event.id, instance.start, self.tolerance).await? {
                fresh.push(instance);
            }
        }
        for instance in &fresh {
            occurrences::insert(conn, event.id, event.calendar_id, instance).await?;
        }

        for exception in events::exceptions_of(conn, event.id).await? {
            let Some((_, original)) = exception.exception_of() else {
                continue;
            };
            if window.contains(original)
                && occurrences::linked_to(conn, event.id, exception.id)
                    .await?
                    .is_none()
            {
                self.attach(conn, event, &exception, false).await?;
            }
        }

        tracing::debug!(count = fresh.len(), "extended occurrences");
        Ok(fresh.len())
    }

    /// Marks the occurrence at `instant` cancelled. Returns false when no
    /// unlinked occurrence is near that instant.
    pub async fn cancel_occurrence(
        &self,
        db: &LocalDb,
        event_id: EventId,
        instant: Millis,
    ) -> Result<bool, Error> {
        let mut tx = db.begin().await?;
        let cancelled = self.cancel_in(&mut tx, event_id, instant).await?;
        tx.commit().await?;
        Ok(cancelled)
    }

    pub async fn cancel_in(
        &self,
        conn: &mut SqliteConnection,
        event_id: EventId,
        instant: Millis,
    ) -> Result<bool, Error> {
        let candidates = occurrences::unlinked_near(conn, event_id, instant, self.tolerance).await?;
        match candidates.first() {
            Some(row) => {
                occurrences::set_cancelled(conn, row.id, true).await?;
                Ok(true)
            }
            None => {
                tracing::debug!(event_id, instant, "no occurrence to cancel");
                Ok(false)
            }
        }
    }

    /// Points the master's occurrence at the exception's original instant to
    /// the exception.
    pub async fn link_exception(
        &self,
        db: &LocalDb,
        master_id: EventId,
        exception_id: EventId,
    ) -> Result<(), Error> {
        let mut tx = db.begin().await?;
        let master = events::get(&mut tx, master_id)
            .await?
            .ok_or(Error::EventNotFound(master_id))?;
        let exception = events::get(&mut tx, exception_id)
            .await?
            .ok_or(Error::EventNotFound(exception_id))?;
        self.link_exception_in(&mut tx, &master, &exception).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Folds an exception into its master's rows: any row the exception got
    /// as an independent event is removed, and the master's row at the
    /// original instant takes the exception's times. Without such a row a
    /// linked one is inserted.
    pub async fn link_exception_in(
        &self,
        conn: &mut SqliteConnection,
        master: &Event,
        exception: &Event,
    ) -> Result<(), Error> {
        self.attach(conn, master, exception, true).await
    }

    async fn attach(
        &self,
        conn: &mut SqliteConnection,
        master: &Event,
        exception: &Event,
        insert_fallback: bool,
    ) -> Result<(), Error> {
        let Some((master_id, original)) = exception.exception_of() else {
            return Err(Error::invalid("not an exception event"));
        };
        if master_id != master.id {
            return Err(Error::invalid("exception belongs to another master"));
        }

        let removed = occurrences::delete_for_event(conn, exception.id).await?;
        if removed > 0 {
            tracing::debug!(exception_id = exception.id, removed, "folded independent exception rows");
        }

        let instance = self.instance_of(exception);
        if let Some(row) = occurrences::linked_to(conn, master.id, exception.id).await? {
            occurrences::link(conn, row.id, exception.id, &instance).await?;
            return Ok(());
        }

        let candidates = occurrences::unlinked_near(conn, master.id, original, self.tolerance).await?;
        if candidates.len() > 1 {
            tracing::warn!(
                exception_id = exception.id,
                candidates = candidates.len(),
                "ambiguous occurrence match within tolerance, taking the nearest"
            );
        }
        match candidates.first() {
            Some(row) => occurrences::link(conn, row.id, exception.id, &instance).await?,
            None if insert_fallback => {
                occurrences::insert_linked(
                    conn,
                    master.id,
                    master.calendar_id,
                    original,
                    &instance,
                    Some(exception.id),
                )
                .await?;
            }
            None => {}
        }
        Ok(())
    }

    fn instance_of(&self, event: &Event) -> Instance {
        self.expander.single(&RecurrenceInput::from_event(event))
    }
}
