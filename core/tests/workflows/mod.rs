// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end workflow tests for the calsync-core crate.
//!
//! These tests drive the event service through multi-step edits and check
//! the materialized occurrences and the push queue together.

mod calendar_moves;
mod config_driven;
mod event_lifecycle;
mod file_store;
mod series_editing;
