// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Command line for the calsync engine.

mod app;
mod cli;
mod cmd_expand;
mod cmd_push;
mod cmd_queue;
mod cmd_sessions;
mod config;
mod table;

pub use crate::app::App;
pub use crate::cli::{Cli, Commands, run};
pub use crate::config::{Config, parse_config};
