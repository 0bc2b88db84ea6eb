// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities for integration tests.
//!
//! - Fixtures: a wired-up engine over an in-memory store and a manual clock
//! - A scripted transport that records every call

mod fixtures;
mod transport;

#[allow(unused_imports)]
pub use fixtures::{DAY, HOUR, Harness, MINUTE, T0, draft, recurring_draft};
#[allow(unused_imports)]
pub use transport::{Call, ScriptedTransport};
