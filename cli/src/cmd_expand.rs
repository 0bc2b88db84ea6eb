// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use calsync_core::MILLIS_PER_SECOND;
use calsync_core::recurrence::{
    DEFAULT_MAX_INSTANCES, EvalZone, Expander, Instance, RecurrenceInput, Window, system_timezone,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use clap::{ArgAction, ArgMatches, Command, arg, value_parser};
use clap_num::number_range;
use colored::Colorize;

const DEFAULT_COUNT: usize = 10;
const HOUR: i64 = 3_600_000;
const DAY: i64 = 24 * HOUR;

/// Debug helper: expands a rule the way the occurrence store would.
#[derive(Debug, Clone)]
pub struct CmdExpand {
    pub rule: Option<String>,
    pub start: String,
    pub timezone: Option<String>,
    pub all_day: bool,
    pub count: usize,
    pub rdates: Vec<String>,
    pub exdates: Vec<String>,
}

impl CmdExpand {
    pub const NAME: &str = "expand";

    pub fn command() -> Command {
        fn from_1_to_max(s: &str) -> Result<usize, String> {
            number_range(s, 1, DEFAULT_MAX_INSTANCES)
        }

        Command::new(Self::NAME)
            .about("Expand a recurrence rule and print the instances")
            .arg(arg!([RULE] "Recurrence rule, e.g. FREQ=WEEKLY;BYDAY=MO,WE;COUNT=6"))
            .arg(
                arg!(-s --start <START> "First instance: RFC 3339, local YYYY-MM-DDTHH:MM:SS, or YYYY-MM-DD")
                    .required(true),
            )
            .arg(arg!(--tz <TZ> "IANA timezone of the event; floating when omitted"))
            .arg(arg!(--"all-day" "Treat the event as all-day"))
            .arg(
                arg!(-n --count <N> "Maximum number of instances to print")
                    .value_parser(from_1_to_max)
                    .default_value("10"),
            )
            .arg(
                arg!(--rdate <DATE> "Extra instance date (repeatable)")
                    .action(ArgAction::Append)
                    .value_parser(value_parser!(String)),
            )
            .arg(
                arg!(--exdate <DATE> "Excluded instance date (repeatable)")
                    .action(ArgAction::Append)
                    .value_parser(value_parser!(String)),
            )
    }

    pub fn from(matches: &ArgMatches) -> Self {
        let strings = |id: &str| -> Vec<String> {
            matches
                .get_many::<String>(id)
                .map(|a| a.cloned().collect())
                .unwrap_or_default()
        };
        Self {
            rule: matches.get_one::<String>("RULE").cloned(),
            start: matches.get_one::<String>("start").cloned().unwrap_or_default(),
            timezone: matches.get_one::<String>("tz").cloned(),
            all_day: matches.get_flag("all-day"),
            count: matches.get_one("count").copied().unwrap_or(DEFAULT_COUNT),
            rdates: strings("rdate"),
            exdates: strings("exdate"),
        }
    }

    /// Needs no configuration or store.
    pub fn run(self) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "expanding recurrence rule...");
        let (zone, instances) = self.expand(system_timezone())?;
        if instances.is_empty() {
            println!("{}", "No instances".italic());
            return Ok(());
        }

        for (i, instance) in instances.iter().enumerate() {
            let start = zone.local(instance.start)?;
            let end = zone.local(instance.end)?;
            let (start, end) = if self.all_day {
                (start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
            } else {
                (start.format("%Y-%m-%d %H:%M"), end.format("%Y-%m-%d %H:%M"))
            };
            println!("{:>4}  {start} → {end}  {}", (i + 1).to_string().cyan(), instance.start_day);
        }
        Ok(())
    }

    fn expand(&self, local: Tz) -> Result<(EvalZone, Vec<Instance>), Box<dyn Error>> {
        if let Some(name) = &self.timezone {
            name.parse::<Tz>()
                .map_err(|_| format!("Unknown timezone: {name}"))?;
        }

        let expander = Expander::new(local, self.count);
        let zone = expander.zone(self.all_day, self.timezone.as_deref());
        let start = self.start_instant(zone)?;
        let end = start + if self.all_day { DAY } else { HOUR };

        let input = RecurrenceInput {
            start,
            end,
            all_day: self.all_day,
            timezone: self.timezone.as_deref(),
            rule: self.rule.as_deref().map(str::trim).filter(|a| !a.is_empty()),
            rdates: &self.rdates,
            exdates: &self.exdates,
        };
        // Open interval: keep the first instance inside it
        let window = Window::new(start - MILLIS_PER_SECOND, start + 100 * 366 * DAY);
        let instances = expander.try_expand(&input, window)?;
        Ok((zone, instances))
    }

    fn start_instant(&self, zone: EvalZone) -> Result<i64, Box<dyn Error>> {
        let value = self.start.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(dt.timestamp_millis());
        }
        let local = if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
            dt
        } else if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            date.and_time(chrono::NaiveTime::MIN)
        } else {
            return Err(format!("Invalid start: {value}").into());
        };
        Ok(zone.instant(local)?)
    }
}
