// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use calsync_core::{SessionStatus, SyncSession, format_millis};
use clap::{ArgMatches, Command, arg};
use colored::{Color, Colorize};

use crate::app::App;
use crate::table::{Column, PaddingDirection, Table};

#[derive(Debug, Clone, Copy)]
pub struct CmdSessions {
    pub export: bool,
}

impl CmdSessions {
    pub const NAME: &str = "sessions";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("List recent sync sessions")
            .arg(arg!(--export "Print the plain-text diagnostics export instead of a table"))
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            export: matches.get_flag("export"),
        }
    }

    pub async fn run(self, app: &mut App) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "listing sync sessions...");
        let log = app.session_log();
        if self.export {
            print!("{}", log.export_text().await?);
            return Ok(());
        }

        let sessions = log.list().await?;
        if sessions.is_empty() {
            println!("{}", "No sync sessions recorded".italic());
            return Ok(());
        }

        println!("{}", Table::new(SessionColumn::ALL, &sessions));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SessionColumn {
    Started,
    Calendar,
    Status,
    Pushed,
    Error,
}

impl SessionColumn {
    const ALL: &[SessionColumn] = &[
        SessionColumn::Started,
        SessionColumn::Calendar,
        SessionColumn::Status,
        SessionColumn::Pushed,
        SessionColumn::Error,
    ];
}

impl Column<SyncSession> for SessionColumn {
    fn format(&self, session: &SyncSession) -> String {
        match self {
            SessionColumn::Started => format_millis(session.started_at),
            SessionColumn::Calendar => session.calendar_name.clone(),
            SessionColumn::Status => session.status().to_string(),
            SessionColumn::Pushed => {
                let c = &session.counts;
                format!("+{} ~{} -{}", c.pushed_created, c.pushed_updated, c.pushed_deleted)
            }
            SessionColumn::Error => session.error_type.clone().unwrap_or_default(),
        }
    }

    fn padding_direction(&self) -> PaddingDirection {
        match self {
            SessionColumn::Pushed => PaddingDirection::Right,
            _ => PaddingDirection::Left,
        }
    }

    fn color(&self, session: &SyncSession) -> Option<Color> {
        match self {
            SessionColumn::Status => match session.status() {
                SessionStatus::Success => Some(Color::Green),
                SessionStatus::Partial => Some(Color::Yellow),
                SessionStatus::Failed => Some(Color::Red),
            },
            SessionColumn::Error => Some(Color::Red),
            _ => None,
        }
    }
}
