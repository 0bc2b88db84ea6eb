// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, sync::Arc};

use calsync_core::{CalDavTransport, IcsSerializer, PassMode, PushReport, PushService};
use clap::{ArgMatches, Command, arg};
use colored::Colorize;

use crate::app::App;

#[derive(Debug, Clone, Copy)]
pub struct CmdPush {
    pub force: bool,
}

impl CmdPush {
    pub const NAME: &str = "push";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Run one push pass over the pending-operation queue")
            .arg(
                arg!(-f --force "Reset failed operations and retry them now")
                    .long_help("Reset failed operations to pending with a fresh lifetime before the pass."),
            )
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            force: matches.get_flag("force"),
        }
    }

    pub fn mode(&self) -> PassMode {
        if self.force {
            PassMode::Forced
        } else {
            PassMode::Normal
        }
    }

    pub async fn run(self, app: &mut App) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "running push pass...");
        let caldav = app
            .caldav
            .clone()
            .ok_or("No [caldav] section in the config, nothing to push to")?;

        let transport = CalDavTransport::from_config(caldav)?;
        let service = PushService::new(
            app.db.clone(),
            Arc::new(transport),
            Arc::new(IcsSerializer::new(app.core.sync.expander())),
            Arc::new(app.session_log()),
            app.clock.clone(),
            app.core.sync.retry_policy(),
        );

        let report = service.run(self.mode()).await?;
        println!("{}", format_report(&report));
        Ok(())
    }
}

fn format_report(report: &PushReport) -> String {
    let mut out = format!(
        "{} {} processed, {} pushed",
        "Push:".bold(),
        report.processed,
        report.succeeded.to_string().green(),
    );
    if report.skipped > 0 {
        out.push_str(&format!(", {} skipped", report.skipped));
    }
    if report.retried > 0 {
        out.push_str(&format!(", {} to retry", report.retried.to_string().yellow()));
    }
    if report.failed > 0 {
        out.push_str(&format!(", {} failed", report.failed.to_string().red()));
    }
    if report.recovered > 0 {
        out.push_str(&format!(", {} recovered", report.recovered));
    }
    if report.abandoned > 0 {
        out.push_str(&format!(", {} abandoned", report.abandoned.to_string().red()));
    }
    out
}
