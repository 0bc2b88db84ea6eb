// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{error::Error, ffi::OsString, path::PathBuf};

use calsync_core::APP_NAME;
use clap::{ArgMatches, Command, ValueHint, arg, builder::styling, crate_version, value_parser};
use colored::Colorize;
use futures::{FutureExt, future::BoxFuture};
use tracing_subscriber::{EnvFilter, fmt};

use crate::app::App;
use crate::cmd_expand::CmdExpand;
use crate::cmd_push::CmdPush;
use crate::cmd_queue::CmdQueue;
use crate::cmd_sessions::CmdSessions;
use crate::config::parse_config;

const DEFAULT_LOG_FILTER: &str = "calsync=info";

/// Run the calsync command-line interface.
pub async fn run() -> Result<(), Box<dyn Error>> {
    init_tracing();
    match Cli::parse() {
        Ok(cli) => {
            if let Err(e) = cli.run().await {
                println!("{} {}", "Error:".red(), e);
            }
        }
        Err(e) => println!("{} {}", "Error:".red(), e),
    }
    Ok(())
}

/// Logs go to stderr so command output stays pipeable.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Command-line interface
#[derive(Debug)]
pub struct Cli {
    /// Path to the configuration file
    pub config: Option<PathBuf>,

    /// The command to execute
    pub command: Commands,
}

impl Cli {
    /// Create the command-line interface
    pub fn command() -> Command {
        const STYLES: styling::Styles = styling::Styles::styled()
            .header(styling::AnsiColor::Green.on_default().bold())
            .usage(styling::AnsiColor::Green.on_default().bold())
            .literal(styling::AnsiColor::Blue.on_default().bold())
            .placeholder(styling::AnsiColor::Cyan.on_default());

        Command::new(APP_NAME)
            .about("Offline-first calendar sync: push queue and diagnostics.")
            .version(crate_version!())
            .styles(STYLES)
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                arg!(-c --config [CONFIG] "Path to the configuration file")
                    .long_help(
                        "\
Path to the configuration file. Defaults to $CALSYNC_CONFIG, then \
$XDG_CONFIG_HOME/calsync/config.toml on Linux and MacOS, \
%LOCALAPPDATA%/calsync/config.toml on Windows.",
                    )
                    .value_parser(value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath),
            )
            .subcommand(CmdPush::command())
            .subcommand(CmdQueue::command())
            .subcommand(CmdSessions::command())
            .subcommand(CmdExpand::command())
    }

    /// Parse the command-line arguments
    pub fn parse() -> Result<Self, Box<dyn Error>> {
        let commands = Self::command();
        let matches = commands.get_matches();
        Self::from(matches)
    }

    /// Parse the specified arguments
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, Box<dyn Error>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let commands = Self::command();
        let matches = commands.try_get_matches_from(args)?;
        Self::from(matches)
    }

    /// Create a CLI instance from the `ArgMatches`
    pub fn from(matches: ArgMatches) -> Result<Self, Box<dyn Error>> {
        use Commands::*;
        let command = match matches.subcommand() {
            Some((CmdPush::NAME, matches)) => Push(CmdPush::from(matches)),
            Some((CmdQueue::NAME, matches)) => Queue(CmdQueue::from(matches)),
            Some((CmdSessions::NAME, matches)) => Sessions(CmdSessions::from(matches)),
            Some((CmdExpand::NAME, matches)) => Expand(CmdExpand::from(matches)),
            Some((name, _)) => return Err(format!("Unknown command: {name}").into()),
            None => return Err("No command given".into()),
        };

        let config = matches.get_one("config").cloned();
        Ok(Cli { config, command })
    }

    /// Run the command
    pub async fn run(self) -> Result<(), Box<dyn Error>> {
        self.command.run(self.config).await
    }
}

/// The commands available in the CLI
#[derive(Debug, Clone)]
pub enum Commands {
    /// Run a push pass
    Push(CmdPush),

    /// Show the pending-operation queue
    Queue(CmdQueue),

    /// List or export sync sessions
    Sessions(CmdSessions),

    /// Expand a recurrence rule
    Expand(CmdExpand),
}

impl Commands {
    /// Run the command with the given configuration
    #[rustfmt::skip]
    pub async fn run(self, config: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
        use Commands::*;
        match self {
            Push(a)     => Self::run_with(config, |x| a.run(x).boxed()).await,
            Queue(a)    => Self::run_with(config, |x| a.run(x).boxed()).await,
            Sessions(a) => Self::run_with(config, |x| a.run(x).boxed()).await,
            Expand(a)   => a.run(),
        }
    }

    async fn run_with<F>(config: Option<PathBuf>, f: F) -> Result<(), Box<dyn Error>>
    where
        F: for<'a> FnOnce(&'a mut App) -> BoxFuture<'a, Result<(), Box<dyn Error>>>,
    {
        tracing::debug!("parsing configuration...");
        let (core_config, config) = parse_config(config).await?;
        let mut app = App::open(core_config, config).await?;

        let result = f(&mut app).await;

        app.close().await?;
        result
    }
}
