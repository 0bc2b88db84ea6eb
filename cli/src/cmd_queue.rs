// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use calsync_core::{Operation, OperationStatus, PendingOperation, format_millis};
use clap::{ArgMatches, Command, arg};
use colored::{Color, Colorize};

use crate::app::App;
use crate::table::{Column, PaddingDirection, Table};

#[derive(Debug, Clone, Copy)]
pub struct CmdQueue {
    pub all: bool,
}

impl CmdQueue {
    pub const NAME: &str = "queue";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Show the pending-operation queue")
            .arg(arg!(-a --all "Include abandoned operations"))
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            all: matches.get_flag("all"),
        }
    }

    pub async fn run(self, app: &mut App) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "listing pending operations...");
        let ops: Vec<_> = app
            .db
            .pending_operations()
            .await?
            .into_iter()
            .filter(|op| self.all || op.status != OperationStatus::Abandoned)
            .collect();

        if ops.is_empty() {
            println!("{}", "Queue is empty".italic());
            return Ok(());
        }

        println!("{}", Table::new(QueueColumn::ALL, &ops));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum QueueColumn {
    Id,
    Event,
    Operation,
    Status,
    Retries,
    NextRetry,
    LastError,
}

impl QueueColumn {
    const ALL: &[QueueColumn] = &[
        QueueColumn::Id,
        QueueColumn::Event,
        QueueColumn::Operation,
        QueueColumn::Status,
        QueueColumn::Retries,
        QueueColumn::NextRetry,
        QueueColumn::LastError,
    ];
}

impl Column<PendingOperation> for QueueColumn {
    fn format(&self, op: &PendingOperation) -> String {
        match self {
            QueueColumn::Id => format!("#{}", op.id),
            QueueColumn::Event => op.event_id.to_string(),
            QueueColumn::Operation => describe_operation(op),
            QueueColumn::Status => op.status.to_string(),
            QueueColumn::Retries => op.retry_count.to_string(),
            QueueColumn::NextRetry => match op.status {
                OperationStatus::Pending => format_millis(op.next_retry_at),
                _ => "-".to_string(),
            },
            QueueColumn::LastError => op.last_error.clone().unwrap_or_default(),
        }
    }

    fn padding_direction(&self) -> PaddingDirection {
        match self {
            QueueColumn::Id | QueueColumn::Event | QueueColumn::Retries => PaddingDirection::Right,
            _ => PaddingDirection::Left,
        }
    }

    fn color(&self, op: &PendingOperation) -> Option<Color> {
        match (self, op.status) {
            (QueueColumn::Status, OperationStatus::Failed) => Some(Color::Red),
            (QueueColumn::Status, OperationStatus::Abandoned) => Some(Color::BrightBlack),
            (QueueColumn::LastError, _) => Some(Color::Yellow),
            _ => None,
        }
    }
}

fn describe_operation(op: &PendingOperation) -> String {
    let mut text = match &op.operation {
        Operation::Move { phase, target_calendar_id, .. } => format!(
            "move({}) -> calendar {target_calendar_id}",
            phase.as_ref()
        ),
        operation => operation.kind().to_string(),
    };
    if op.detached {
        text.push_str(" [cleanup]");
    }
    text
}
