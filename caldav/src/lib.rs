// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Minimal `CalDAV` client (RFC 4791) for pushing calendar object resources.
//!
//! Only the write side is covered: conditional creation with
//! `If-None-Match: *`, conditional update and deletion with `If-Match`, and a
//! `HEAD` to recover a missing `ETag`. Responses are classified so callers can
//! tell "already gone" and "changed on the server" apart from retryable
//! transport failures.

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(clippy::single_match_else, clippy::match_bool)]

mod client;
mod config;
mod error;
mod http;
mod types;

pub use crate::client::{CalDavClient, CreatedResource};
pub use crate::config::{AuthMethod, CalDavConfig};
pub use crate::error::CalDavError;
pub use crate::types::{ETag, Href};
