// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Mutex;

/// Row id of an event.
pub type EventId = i64;

/// Row id of a calendar.
pub type CalendarId = i64;

/// Row id of a pending operation.
pub type OperationId = i64;

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

pub const MILLIS_PER_SECOND: Millis = 1_000;
pub const MILLIS_PER_DAY: Millis = 86_400_000;

/// Source of the current instant.
///
/// Every state transition that depends on "now" (backoff, lifetime,
/// auto-recovery, session retention) reads it through this trait so tests can
/// drive time explicitly.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now_ms(&self) -> Millis;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        jiff::Timestamp::now().as_millisecond()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Millis>,
}

impl ManualClock {
    pub fn new(now: Millis) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: Millis) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, delta: Millis) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.lock().map(|a| *a).unwrap_or_default()
    }
}

/// Formats an epoch-millisecond instant for humans, falling back to the raw
/// number when it is out of range.
pub fn format_millis(ms: Millis) -> String {
    match jiff::Timestamp::from_millisecond(ms) {
        Ok(ts) => ts.strftime("%Y-%m-%dT%H:%M:%SZ").to_string(),
        Err(_) => ms.to_string(),
    }
}
