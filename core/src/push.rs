// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Outbound reconciliation: drains the pending-operation queue.
//!
//! A pass runs queue maintenance (recovery, lifetime abandonment), then
//! processes every due operation in FIFO order. Network calls happen outside
//! any transaction; each outcome is written back in its own transaction and
//! completion is guarded by the operation's generation, so edits made while a
//! call was in flight are never lost.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::diagnostics::DiagnosticsSink;
use crate::error::Error;
use crate::event::{Event, SyncStatus};
use crate::localdb::calendars::Calendar;
use crate::localdb::{LocalDb, calendars, events, pending_ops};
use crate::pending::{
    MovePhase, Operation, OperationStatus, PendingOperation, RemoteTarget, Retry, RetryPolicy,
};
use crate::remote::{RemoteError, Serializer, Transport};
use crate::session::SyncSessionBuilder;
use crate::types::{CalendarId, Clock, EventId, Millis};

const LIFETIME_EXCEEDED: &str = "Gave up after the retry lifetime was exceeded";

/// Whether a pass was requested by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PassMode {
    /// Scheduled pass.
    #[default]
    Normal,

    /// User-requested: every failed operation is retried immediately and gets
    /// a fresh lifetime.
    Forced,
}

/// Totals of one push pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    pub recovered: u32,
    pub abandoned: u32,
    pub processed: u32,
    /// Operations whose remote call went through.
    pub succeeded: u32,
    /// Operations completed without a remote call.
    pub skipped: u32,
    pub retried: u32,
    pub failed: u32,
}

/// Result of one remote call, before it is written back.
enum Outcome {
    Created {
        location: String,
        etag: String,
        bundled: Vec<EventId>,
    },
    Updated {
        location: String,
        etag: String,
        bundled: Vec<EventId>,
    },
    Deleted,
    /// The update target is gone on the server; recreate it.
    Vanished,
    /// Nothing to send.
    Skipped(&'static str),
}

/// Data loaded once per pass.
#[derive(Default)]
struct Batch {
    events: HashMap<EventId, Event>,
    exceptions: HashMap<EventId, Vec<Event>>,
    calendars: HashMap<CalendarId, Calendar>,
}

impl Batch {
    async fn load(conn: &mut SqliteConnection, ops: &[PendingOperation]) -> Result<Self, Error> {
        let event_ids: Vec<EventId> = ops.iter().map(|op| op.event_id).collect();
        let events: HashMap<_, _> = events::get_many(conn, &event_ids)
            .await?
            .into_iter()
            .map(|e| (e.id, e))
            .collect();

        let master_ids: Vec<EventId> = events
            .values()
            .filter(|e| e.is_recurring())
            .map(|e| e.id)
            .collect();
        let mut exceptions: HashMap<EventId, Vec<Event>> = HashMap::new();
        for exception in events::exceptions_of_many(conn, &master_ids).await? {
            if let Some((master_id, _)) = exception.exception_of() {
                exceptions.entry(master_id).or_default().push(exception);
            }
        }

        let mut calendar_ids: Vec<CalendarId> = events.values().map(|e| e.calendar_id).collect();
        for op in ops {
            match &op.operation {
                Operation::Delete {
                    target: Some(target),
                } => calendar_ids.push(target.calendar_id),
                Operation::Move {
                    source,
                    target_calendar_id,
                    ..
                } => {
                    calendar_ids.push(source.calendar_id);
                    calendar_ids.push(*target_calendar_id);
                }
                _ => {}
            }
        }
        calendar_ids.sort_unstable();
        calendar_ids.dedup();
        let calendars = calendars::get_many(conn, &calendar_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        Ok(Self {
            events,
            exceptions,
            calendars,
        })
    }
}

/// Per-calendar session builders of one pass.
struct Sessions {
    started_at: Millis,
    builders: BTreeMap<CalendarId, SyncSessionBuilder>,
}

impl Sessions {
    fn new(started_at: Millis) -> Self {
        Self {
            started_at,
            builders: BTreeMap::new(),
        }
    }

    fn of(&mut self, batch: &Batch, calendar_id: CalendarId) -> &mut SyncSessionBuilder {
        let started_at = self.started_at;
        self.builders.entry(calendar_id).or_insert_with(|| {
            let name = batch
                .calendars
                .get(&calendar_id)
                .map(|c| c.display_name.clone())
                .unwrap_or_default();
            SyncSessionBuilder::new(calendar_id, name, started_at)
        })
    }
}

pub struct PushService {
    db: LocalDb,
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn Serializer>,
    sink: Arc<dyn DiagnosticsSink>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for PushService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushService")
            .field("db", &self.db)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PushService {
    pub fn new(
        db: LocalDb,
        transport: Arc<dyn Transport>,
        serializer: Arc<dyn Serializer>,
        sink: Arc<dyn DiagnosticsSink>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            db,
            transport,
            serializer,
            sink,
            clock,
            policy,
        }
    }

    /// Runs one pass over the queue.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, mode: PassMode) -> Result<PushReport, Error> {
        let started_at = self.clock.now_ms();
        let mut report = PushReport::default();
        self.maintain(mode, started_at, &mut report).await?;

        let mut conn = self.db.pool().acquire().await?;
        let ops = pending_ops::due(&mut conn, started_at).await?;
        let batch = Batch::load(&mut conn, &ops).await?;
        drop(conn);

        let mut sessions = Sessions::new(started_at);
        for op in ops {
            report.processed += 1;
            self.process(op, &batch, &mut sessions, &mut report).await?;
        }

        let finished_at = self.clock.now_ms();
        for (_, builder) in sessions.builders {
            self.sink.record(builder.finish(finished_at)).await;
        }

        tracing::info!(
            processed = report.processed,
            succeeded = report.succeeded,
            skipped = report.skipped,
            retried = report.retried,
            failed = report.failed,
            recovered = report.recovered,
            abandoned = report.abandoned,
            "push pass finished"
        );
        Ok(report)
    }

    /// Recovery before abandonment: a forced pass resets every failed
    /// operation's lifetime first, so it cannot be abandoned in the same pass.
    async fn maintain(
        &self,
        mode: PassMode,
        now: Millis,
        report: &mut PushReport,
    ) -> Result<(), Error> {
        let mut tx = self.db.begin().await?;
        for mut op in pending_ops::unfinished(&mut tx).await? {
            let mut changed = false;
            if op.status == OperationStatus::Failed {
                if mode == PassMode::Forced {
                    op.recover(now, true);
                    changed = true;
                } else if op.should_auto_recover(&self.policy, now) {
                    op.recover(now, false);
                    changed = true;
                }
                if changed {
                    report.recovered += 1;
                    tracing::debug!(op_id = op.id, event_id = op.event_id, "recovered failed operation");
                }
            }

            if op.lifetime_expired(&self.policy, now) {
                op.abandon(LIFETIME_EXCEEDED);
                changed = true;
                report.abandoned += 1;
                events::flag_attention(&mut tx, op.event_id, LIFETIME_EXCEEDED).await?;
                tracing::warn!(op_id = op.id, event_id = op.event_id, kind = %op.kind(), "abandoned operation");
            }

            if changed {
                pending_ops::update(&mut tx, &op, op.generation).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(op_id = op.id, event_id = op.event_id, kind = %op.kind()))]
    async fn process(
        &self,
        mut op: PendingOperation,
        batch: &Batch,
        sessions: &mut Sessions,
        report: &mut PushReport,
    ) -> Result<(), Error> {
        let event = batch.events.get(&op.event_id);

        let move_source = match &op.operation {
            Operation::Move {
                phase: MovePhase::Delete,
                source,
                ..
            } => Some(source.clone()),
            _ => None,
        };
        if let Some(source) = move_source {
            if let Err(err) = self.delete_remote(&source).await {
                let session = sessions.of(batch, source.calendar_id);
                return self.fail_or_retry(&mut op, &err, session, report).await;
            }

            let generation = op.generation;
            op.advance_move_phase(self.clock.now_ms());
            let mut tx = self.db.begin().await?;
            let advanced = pending_ops::update(&mut tx, &op, generation).await?;
            tx.commit().await?;
            if !advanced {
                tracing::debug!("move superseded during delete phase");
                return Ok(());
            }
            sessions.of(batch, source.calendar_id).pushed_deleted();
            tracing::debug!("move advanced to create phase");
        }

        let calendar_id = session_calendar(&op, event);
        let outcome = match self.dispatch(&op, event, batch).await {
            Ok(outcome) => outcome,
            Err(err) => {
                return self
                    .fail_or_retry(&mut op, &err, sessions.of(batch, calendar_id), report)
                    .await;
            }
        };

        let session = sessions.of(batch, calendar_id);
        match &outcome {
            Outcome::Created { .. } => {
                session.pushed_created();
            }
            Outcome::Updated { .. } => {
                session.pushed_updated();
            }
            Outcome::Deleted => {
                session.pushed_deleted();
            }
            Outcome::Vanished | Outcome::Skipped(_) => {}
        }
        let skipped = matches!(outcome, Outcome::Skipped(_));
        self.complete(&op, event, outcome).await?;
        if skipped {
            report.skipped += 1;
        } else {
            report.succeeded += 1;
        }
        Ok(())
    }

    /// Performs the remote call of an operation.
    async fn dispatch(
        &self,
        op: &PendingOperation,
        event: Option<&Event>,
        batch: &Batch,
    ) -> Result<Outcome, RemoteError> {
        let operation = &op.operation;
        if let Operation::Delete { target } = operation {
            let target = target.clone().or_else(|| {
                let event = event?;
                Some(RemoteTarget {
                    calendar_id: event.calendar_id,
                    url: event.caldav_url.clone()?,
                    etag: event.etag.clone(),
                })
            });
            return match target {
                Some(target) => self.delete_remote(&target).await.map(|()| Outcome::Deleted),
                None => Ok(Outcome::Deleted),
            };
        }

        let Some(event) = event else {
            return Err(RemoteError::Failed {
                code: 0,
                message: format!("event {} no longer exists", op.event_id),
                retryable: false,
            });
        };
        if event.is_exception() {
            return Ok(Outcome::Skipped("exceptions are pushed with their master"));
        }

        let calendar_id = match operation {
            Operation::Move {
                target_calendar_id, ..
            } => *target_calendar_id,
            _ => event.calendar_id,
        };
        let Some(calendar_url) = batch
            .calendars
            .get(&calendar_id)
            .filter(|c| !c.is_local_only())
            .and_then(|c| c.url.as_deref())
        else {
            return Ok(Outcome::Skipped("calendar is local-only"));
        };

        let exceptions = batch
            .exceptions
            .get(&event.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let (payload, bundled) = if event.is_recurring() && !exceptions.is_empty() {
            (
                self.serializer.serialize_with_exceptions(event, exceptions),
                exceptions.iter().map(|e| e.id).collect(),
            )
        } else {
            (self.serializer.serialize(event), Vec::new())
        };

        let update_target = match operation {
            Operation::Update => event.caldav_url.as_deref(),
            _ => None,
        };
        match update_target {
            Some(url) => {
                let Some(etag) = event.etag.as_deref() else {
                    return Err(RemoteError::Failed {
                        code: 0,
                        message: "no version token for update".to_string(),
                        retryable: false,
                    });
                };
                match self.transport.update_event(url, payload, etag).await {
                    Ok(etag) => Ok(Outcome::Updated {
                        location: url.to_string(),
                        etag,
                        bundled,
                    }),
                    Err(RemoteError::NotFound) => Ok(Outcome::Vanished),
                    Err(err) => Err(err),
                }
            }
            // Creates, move create phases, and updates of events the server
            // never acknowledged.
            None => {
                let created = self
                    .transport
                    .create_event(calendar_url, &event.uid, payload)
                    .await?;
                Ok(Outcome::Created {
                    location: created.location,
                    etag: created.etag,
                    bundled,
                })
            }
        }
    }

    /// Deletes a remote resource; one that is already gone counts as deleted.
    async fn delete_remote(&self, target: &RemoteTarget) -> Result<(), RemoteError> {
        match self
            .transport
            .delete_event(&target.url, target.etag.as_deref())
            .await
        {
            Ok(()) | Err(RemoteError::NotFound) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Writes a successful outcome back. Completion only removes the
    /// operation if nothing upgraded it meanwhile.
    async fn complete(
        &self,
        op: &PendingOperation,
        event: Option<&Event>,
        outcome: Outcome,
    ) -> Result<(), Error> {
        let now = self.clock.now_ms();
        let mut tx = self.db.begin().await?;
        let completed = pending_ops::delete_if_generation(&mut tx, op.id, op.generation).await?;
        let current = if completed {
            None
        } else {
            pending_ops::get(&mut tx, op.id).await?
        };

        match outcome {
            Outcome::Created {
                location,
                etag,
                bundled,
            } => {
                let ids = pushed_ids(op.event_id, bundled);
                match (completed, current) {
                    (true, _) => {
                        events::mark_pushed(&mut tx, &ids, &location, &etag, SyncStatus::Synced)
                            .await?;
                    }
                    (false, Some(mut current)) => {
                        // Edited while in flight: the resource exists now, so
                        // the newer state goes out as an update.
                        events::mark_pushed(
                            &mut tx,
                            &ids,
                            &location,
                            &etag,
                            SyncStatus::PendingUpdate,
                        )
                        .await?;
                        if current.operation == Operation::Create {
                            let generation = current.generation;
                            current.operation = Operation::Update;
                            pending_ops::update(&mut tx, &current, generation).await?;
                        }
                    }
                    (false, None) => {
                        // Deleted or moved while in flight: the new resource
                        // is an orphan.
                        let calendar_id = event.map_or(0, |e| e.calendar_id);
                        let cleanup = PendingOperation::detached_delete(
                            op.event_id,
                            RemoteTarget {
                                calendar_id,
                                url: location,
                                etag: Some(etag),
                            },
                            now,
                        );
                        pending_ops::insert(&mut tx, &cleanup).await?;
                        tracing::debug!("queued cleanup of superseded create");
                    }
                }
            }
            Outcome::Updated {
                location,
                etag,
                bundled,
            } => {
                let ids = pushed_ids(op.event_id, bundled);
                let status = if completed {
                    SyncStatus::Synced
                } else {
                    current_status(&mut tx, op.event_id).await?
                };
                events::mark_pushed(&mut tx, &ids, &location, &etag, status).await?;
            }
            Outcome::Deleted => {
                let soft_deleted = event.is_some_and(|e| e.sync_status == SyncStatus::PendingDelete);
                if completed && !op.detached && soft_deleted {
                    events::delete(&mut tx, op.event_id).await?;
                }
            }
            Outcome::Vanished => match current {
                Some(current) if current.operation == (Operation::Delete { target: None }) => {
                    // Already gone, which is what the newer intent asked for.
                    pending_ops::delete(&mut tx, current.id).await?;
                    events::delete(&mut tx, op.event_id).await?;
                }
                Some(mut current)
                    if matches!(current.operation, Operation::Create | Operation::Update) =>
                {
                    events::clear_remote(&mut tx, op.event_id).await?;
                    let generation = current.generation;
                    current.operation = Operation::Create;
                    current.next_retry_at = now;
                    pending_ops::update(&mut tx, &current, generation).await?;
                }
                Some(_) => {}
                None if completed => {
                    events::clear_remote(&mut tx, op.event_id).await?;
                    let recreate = PendingOperation::new(op.event_id, Operation::Create, now);
                    pending_ops::insert(&mut tx, &recreate).await?;
                    tracing::debug!("update target vanished, recreating");
                }
                None => {}
            },
            Outcome::Skipped(reason) => {
                let settled = event.filter(|e| {
                    !e.is_exception() && e.sync_status != SyncStatus::PendingDelete
                });
                if let (true, Some(event)) = (completed, settled) {
                    events::set_sync_status(&mut tx, event.id, SyncStatus::Synced, now).await?;
                }
                tracing::debug!(reason, "skipped operation");
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn fail_or_retry(
        &self,
        op: &mut PendingOperation,
        err: &RemoteError,
        session: &mut SyncSessionBuilder,
        report: &mut PushReport,
    ) -> Result<(), Error> {
        let now = self.clock.now_ms();
        let message = err.to_string();
        session.error(err.error_type(), "push failed");

        if err.is_retryable() {
            match op.schedule_retry(&self.policy, now, &message) {
                Retry::At(at) => {
                    report.retried += 1;
                    tracing::debug!(error_type = %err.error_type(), retry_at = at, "scheduled retry");
                }
                Retry::Exhausted => {
                    report.failed += 1;
                    tracing::warn!(error_type = %err.error_type(), "retries exhausted");
                }
            }
        } else {
            op.fail(now, &message);
            report.failed += 1;
            tracing::warn!(error_type = %err.error_type(), "operation failed");
        }

        let mut tx = self.db.begin().await?;
        if !pending_ops::update(&mut tx, op, op.generation).await? {
            tracing::debug!("operation upgraded while in flight, keeping the newer intent");
        }
        if !op.detached {
            events::record_error(&mut tx, op.event_id, &message).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Calendar a session is accounted to: the remote side the operation touches.
fn session_calendar(op: &PendingOperation, event: Option<&Event>) -> CalendarId {
    match &op.operation {
        Operation::Delete {
            target: Some(target),
        } => target.calendar_id,
        Operation::Move {
            phase: MovePhase::Delete,
            source,
            ..
        } => source.calendar_id,
        Operation::Move {
            target_calendar_id, ..
        } => *target_calendar_id,
        _ => event.map_or(0, |e| e.calendar_id),
    }
}

fn pushed_ids(event_id: EventId, bundled: Vec<EventId>) -> Vec<EventId> {
    let mut ids = Vec::with_capacity(bundled.len() + 1);
    ids.push(event_id);
    ids.extend(bundled);
    ids
}

async fn current_status(conn: &mut SqliteConnection, event_id: EventId) -> Result<SyncStatus, Error> {
    Ok(match events::get(conn, event_id).await? {
        Some(event) if event.sync_status == SyncStatus::PendingDelete => SyncStatus::PendingDelete,
        _ => SyncStatus::PendingUpdate,
    })
}
