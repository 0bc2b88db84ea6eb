// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Pending outbound operations.
//!
//! One row per not-yet-confirmed change. An operation is an explicit state
//! machine over kind × move phase × retry budget; every transition lives on
//! [`PendingOperation`] so the push service never flips fields ad hoc.

use std::fmt::Display;
use std::str::FromStr;

use crate::types::{CalendarId, EventId, Millis, OperationId};

/// A remote resource an operation acts on when the event row no longer
/// carries it (cleared by a calendar move).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Calendar the resource lives in.
    pub calendar_id: CalendarId,
    pub url: String,
    pub etag: Option<String>,
}

/// What an operation asks the server to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete {
        /// Explicit location; falls back to the event's own when absent.
        target: Option<RemoteTarget>,
    },
    /// Delete from the source collection, then create in the target one.
    Move {
        phase: MovePhase,
        source: RemoteTarget,
        target_calendar_id: CalendarId,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create => OperationKind::Create,
            Operation::Update => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Move { .. } => OperationKind::Move,
        }
    }
}

/// Phase of a two-phase move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovePhase {
    Delete,
    Create,
}

const PHASE_DELETE: &str = "delete";
const PHASE_CREATE: &str = "create";

impl AsRef<str> for MovePhase {
    fn as_ref(&self) -> &str {
        match self {
            MovePhase::Delete => PHASE_DELETE,
            MovePhase::Create => PHASE_CREATE,
        }
    }
}

impl FromStr for MovePhase {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            PHASE_DELETE => Ok(MovePhase::Delete),
            PHASE_CREATE => Ok(MovePhase::Create),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    Move,
}

const KIND_CREATE: &str = "create";
const KIND_UPDATE: &str = "update";
const KIND_DELETE: &str = "delete";
const KIND_MOVE: &str = "move";

impl AsRef<str> for OperationKind {
    fn as_ref(&self) -> &str {
        match self {
            OperationKind::Create => KIND_CREATE,
            OperationKind::Update => KIND_UPDATE,
            OperationKind::Delete => KIND_DELETE,
            OperationKind::Move => KIND_MOVE,
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl FromStr for OperationKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            KIND_CREATE => Ok(OperationKind::Create),
            KIND_UPDATE => Ok(OperationKind::Update),
            KIND_DELETE => Ok(OperationKind::Delete),
            KIND_MOVE => Ok(OperationKind::Move),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// Waiting for its next eligible retry instant.
    #[default]
    Pending,

    /// Retries exhausted or a non-retryable error; auto-recovers later.
    Failed,

    /// Aged past the lifetime ceiling; never retried again.
    Abandoned,
}

const STATUS_PENDING: &str = "pending";
const STATUS_FAILED: &str = "failed";
const STATUS_ABANDONED: &str = "abandoned";

impl AsRef<str> for OperationStatus {
    fn as_ref(&self) -> &str {
        match self {
            OperationStatus::Pending => STATUS_PENDING,
            OperationStatus::Failed => STATUS_FAILED,
            OperationStatus::Abandoned => STATUS_ABANDONED,
        }
    }
}

impl Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl FromStr for OperationStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            STATUS_PENDING => Ok(OperationStatus::Pending),
            STATUS_FAILED => Ok(OperationStatus::Failed),
            STATUS_ABANDONED => Ok(OperationStatus::Abandoned),
            _ => Err(()),
        }
    }
}

/// Retry, backoff and lifetime limits, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Millis,
    pub max: Millis,
    pub max_retries: u32,
    pub lifetime: Millis,
    pub auto_recover_after: Millis,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        const HOUR: Millis = 3_600_000;
        Self {
            base: 30_000,
            max: 6 * HOUR,
            max_retries: 8,
            lifetime: 30 * 24 * HOUR,
            auto_recover_after: 24 * HOUR,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt of an operation that has already been
    /// retried `retry_count` times: `base * 2^retry_count`, capped at `max`.
    pub fn backoff(&self, retry_count: u32) -> Millis {
        let factor = 1_i64.checked_shl(retry_count.min(62)).unwrap_or(i64::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Outcome of scheduling a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    At(Millis),
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub id: OperationId,
    pub event_id: EventId,
    pub operation: Operation,
    pub status: OperationStatus,

    /// Remote cleanup that does not count as the event's active operation.
    pub detached: bool,

    /// Bumped on every upgrade; completion is conditional on it.
    pub generation: i64,

    pub retry_count: u32,
    pub next_retry_at: Millis,

    /// Start of the residency period bounded by the lifetime ceiling.
    pub lifetime_reset_at: Millis,

    pub failed_at: Option<Millis>,
    pub last_error: Option<String>,
    pub created_at: Millis,
}

impl PendingOperation {
    pub fn new(event_id: EventId, operation: Operation, now: Millis) -> Self {
        Self {
            id: 0,
            event_id,
            operation,
            status: OperationStatus::Pending,
            detached: false,
            generation: 0,
            retry_count: 0,
            next_retry_at: now,
            lifetime_reset_at: now,
            failed_at: None,
            last_error: None,
            created_at: now,
        }
    }

    /// A remote-cleanup delete of `target` that outlives the event's own
    /// queue entry.
    pub fn detached_delete(event_id: EventId, target: RemoteTarget, now: Millis) -> Self {
        let mut op = Self::new(
            event_id,
            Operation::Delete {
                target: Some(target),
            },
            now,
        );
        op.detached = true;
        op
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn is_due(&self, now: Millis) -> bool {
        self.status == OperationStatus::Pending && self.next_retry_at <= now
    }

    pub fn is_terminal(&self) -> bool {
        self.status != OperationStatus::Pending
    }

    /// Moves a move operation from its delete phase to its create phase with
    /// a fresh retry budget. Returns false for anything else.
    pub fn advance_move_phase(&mut self, now: Millis) -> bool {
        match &mut self.operation {
            Operation::Move { phase, .. } if *phase == MovePhase::Delete => {
                *phase = MovePhase::Create;
                self.retry_count = 0;
                self.next_retry_at = now;
                self.last_error = None;
                true
            }
            _ => false,
        }
    }

    /// Records a retryable failure. Past the retry budget the operation is
    /// marked failed instead.
    pub fn schedule_retry(&mut self, policy: &RetryPolicy, now: Millis, error: &str) -> Retry {
        self.last_error = Some(error.to_string());
        if self.retry_count >= policy.max_retries {
            self.fail(now, error);
            return Retry::Exhausted;
        }
        let at = now + policy.backoff(self.retry_count);
        self.retry_count += 1;
        self.next_retry_at = at;
        Retry::At(at)
    }

    pub fn fail(&mut self, now: Millis, error: &str) {
        self.status = OperationStatus::Failed;
        self.failed_at = Some(now);
        self.last_error = Some(error.to_string());
    }

    pub fn abandon(&mut self, error: &str) {
        self.status = OperationStatus::Abandoned;
        self.last_error = Some(error.to_string());
    }

    /// Resets a failed operation to pending with a fresh retry count. The
    /// lifetime only restarts when the user asked for it.
    pub fn recover(&mut self, now: Millis, reset_lifetime: bool) {
        self.status = OperationStatus::Pending;
        self.retry_count = 0;
        self.next_retry_at = now;
        self.failed_at = None;
        if reset_lifetime {
            self.lifetime_reset_at = now;
        }
    }

    pub fn lifetime_expired(&self, policy: &RetryPolicy, now: Millis) -> bool {
        self.status != OperationStatus::Abandoned
            && now.saturating_sub(self.lifetime_reset_at) > policy.lifetime
    }

    pub fn should_auto_recover(&self, policy: &RetryPolicy, now: Millis) -> bool {
        self.status == OperationStatus::Failed
            && self
                .failed_at
                .is_some_and(|at| now.saturating_sub(at) > policy.auto_recover_after)
    }

    /// Replaces the intent after an upgrade: new generation, fresh budget.
    pub fn refresh(&mut self, operation: Operation, now: Millis) {
        self.operation = operation;
        self.generation += 1;
        self.recover(now, true);
        self.last_error = None;
    }
}

/// How an incoming operation combines with the event's existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upgrade {
    /// No active operation: insert the incoming one.
    Insert(Operation),

    /// Overwrite the existing row with this operation.
    Replace(Operation),

    /// The pair cancels out; the existing row is removed and the event never
    /// needs to reach the server.
    Drop,
}

/// Resolves the at-most-one-operation-per-event rule.
pub fn upgrade(existing: Option<&PendingOperation>, incoming: Operation) -> Upgrade {
    let Some(existing) = existing else {
        return Upgrade::Insert(incoming);
    };

    use Operation as Op;
    match (&existing.operation, incoming) {
        // The server never saw the event.
        (Op::Create, Op::Update | Op::Create) => Upgrade::Replace(Op::Create),
        (Op::Create, Op::Delete { .. }) => Upgrade::Drop,

        // A pending move already carries the latest state into the target.
        (Op::Move { .. }, Op::Update | Op::Create) => Upgrade::Replace(existing.operation.clone()),
        (Op::Move { phase: MovePhase::Delete, source, .. }, Op::Delete { .. }) => {
            Upgrade::Replace(Op::Delete {
                target: Some(source.clone()),
            })
        }
        (Op::Move { phase: MovePhase::Create, .. }, Op::Delete { .. }) => Upgrade::Drop,

        (Op::Update | Op::Delete { .. }, incoming) => Upgrade::Replace(incoming),
        (_, incoming @ Op::Move { .. }) => Upgrade::Replace(incoming),
    }
}
