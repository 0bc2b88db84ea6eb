// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Recurrence expansion.
//!
//! Evaluates a base instant plus RRULE / RDATE / EXDATE over a window into an
//! ordered, duplicate-free list of instances. All-day events are evaluated in
//! UTC so a date never shifts; timed events use their own zone, or the local
//! zone when floating.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::event::Event;
use crate::types::{MILLIS_PER_DAY, MILLIS_PER_SECOND, Millis};

/// Upper bound on instances produced for one event.
pub const DEFAULT_MAX_INSTANCES: usize = 1000;

/// A calendar date encoded as `YYYYMMDD`.
pub type DateCode = u32;

#[derive(Debug, thiserror::Error)]
pub enum RecurrenceError {
    #[error("invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("invalid date value: {0:?}")]
    InvalidDate(String),

    #[error("instant out of range: {0}")]
    OutOfRange(Millis),
}

/// Zone in which a recurrence set is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalZone {
    /// All-day events.
    Utc,

    /// Timed events carrying a known timezone.
    Zoned(Tz),

    /// Timed events without a timezone, pinned to the local zone.
    Floating(Tz),
}

impl EvalZone {
    /// Picks the zone for an event. Unknown timezone names fall back to the
    /// local zone.
    pub fn resolve(all_day: bool, timezone: Option<&str>, local: Tz) -> Self {
        if all_day {
            return EvalZone::Utc;
        }
        match timezone.map(str::trim).filter(|a| !a.is_empty()) {
            Some(name) => match name.parse::<Tz>() {
                Ok(tz) => EvalZone::Zoned(tz),
                Err(_) => {
                    tracing::warn!(timezone = name, "unknown timezone, evaluating as floating");
                    EvalZone::Floating(local)
                }
            },
            None => EvalZone::Floating(local),
        }
    }

    pub fn tz(&self) -> Tz {
        match self {
            EvalZone::Utc => chrono_tz::UTC,
            EvalZone::Zoned(tz) | EvalZone::Floating(tz) => *tz,
        }
    }

    pub fn datetime(&self, ms: Millis) -> Result<DateTime<Tz>, RecurrenceError> {
        self.tz()
            .timestamp_millis_opt(ms)
            .single()
            .ok_or(RecurrenceError::OutOfRange(ms))
    }

    /// Local wall-clock time of an instant in this zone.
    pub fn local(&self, ms: Millis) -> Result<NaiveDateTime, RecurrenceError> {
        self.datetime(ms).map(|a| a.naive_local())
    }

    pub fn date_code(&self, ms: Millis) -> Result<DateCode, RecurrenceError> {
        self.datetime(ms).map(|a| encode_date(a.date_naive()))
    }

    /// Resolves a wall-clock time to an instant. Ambiguous times take the
    /// earlier instant, times inside a DST gap move forward by an hour.
    pub fn instant(&self, local: NaiveDateTime) -> Result<Millis, RecurrenceError> {
        let tz = self.tz();
        tz.from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
            .map(|a| a.timestamp_millis())
            .ok_or_else(|| RecurrenceError::InvalidDate(local.to_string()))
    }

    /// Value written into an EXDATE/RDATE entry for an instant of this event.
    pub fn exdate_value(&self, ms: Millis) -> Result<String, RecurrenceError> {
        let local = self.local(ms)?;
        Ok(match self {
            EvalZone::Utc => local.format("%Y%m%d").to_string(),
            EvalZone::Zoned(_) | EvalZone::Floating(_) => {
                local.format("%Y%m%dT%H%M%S").to_string()
            }
        })
    }
}

/// Recurrence input of one event.
#[derive(Debug, Clone, Copy)]
pub struct RecurrenceInput<'a> {
    pub start: Millis,
    pub end: Millis,
    pub all_day: bool,
    pub timezone: Option<&'a str>,
    pub rule: Option<&'a str>,
    pub rdates: &'a [String],
    pub exdates: &'a [String],
}

impl<'a> RecurrenceInput<'a> {
    /// Exceptions are treated as single instances.
    pub fn from_event(event: &'a Event) -> Self {
        let (rule, rdates, exdates) = match event.recurrence() {
            Some(r) => (r.rule.as_deref(), r.rdates.as_slice(), r.exdates.as_slice()),
            None => (None, &[][..], &[][..]),
        };
        Self {
            start: event.start,
            end: event.end,
            all_day: event.all_day,
            timezone: event.timezone.as_deref(),
            rule: rule.map(str::trim).filter(|a| !a.is_empty()),
            rdates,
            exdates,
        }
    }

    pub fn duration(&self) -> Millis {
        (self.end - self.start).max(0)
    }
}

/// An open interval `(start, end)` of epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: Millis,
    pub end: Millis,
}

impl Window {
    pub fn new(start: Millis, end: Millis) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: Millis) -> bool {
        t > self.start && t < self.end
    }
}

/// One materialized instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance {
    pub start: Millis,
    pub end: Millis,
    pub start_day: DateCode,
    pub end_day: DateCode,
}

#[derive(Debug, Clone, Copy)]
pub struct Expander {
    local: Tz,
    max_instances: usize,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new(chrono_tz::UTC, DEFAULT_MAX_INSTANCES)
    }
}

impl Expander {
    pub fn new(local: Tz, max_instances: usize) -> Self {
        Self {
            local,
            max_instances: max_instances.max(1),
        }
    }

    pub fn local_timezone(&self) -> Tz {
        self.local
    }

    pub fn zone(&self, all_day: bool, timezone: Option<&str>) -> EvalZone {
        EvalZone::resolve(all_day, timezone, self.local)
    }

    pub fn zone_for(&self, event: &Event) -> EvalZone {
        self.zone(event.all_day, event.timezone.as_deref())
    }

    /// Expands the input over the window. A malformed rule or date yields an
    /// empty result.
    pub fn expand(&self, input: &RecurrenceInput<'_>, window: Window) -> Vec<Instance> {
        match self.try_expand(input, window) {
            Ok(instances) => instances,
            Err(e) => {
                tracing::warn!(err = %e, "recurrence expansion failed");
                Vec::new()
            }
        }
    }

    pub fn try_expand(
        &self,
        input: &RecurrenceInput<'_>,
        window: Window,
    ) -> Result<Vec<Instance>, RecurrenceError> {
        let zone = self.zone(input.all_day, input.timezone);
        let base = zone.datetime(input.start)?;

        let mut starts = BTreeSet::new();
        if window.contains(input.start) {
            starts.insert(input.start);
        }

        if let Some(rule) = input.rule {
            starts.extend(self.rule_instants(rule, zone, &base, window)?);
        }

        let base_time = base.naive_local().time();
        for value in input.rdates {
            let t = combine(normalize_date_code(value, zone)?, base_time, zone)?;
            if window.contains(t) {
                starts.insert(t);
            }
        }

        if !input.exdates.is_empty() {
            let excluded = input
                .exdates
                .iter()
                .map(|a| normalize_date_code(a, zone))
                .collect::<Result<HashSet<_>, _>>()?;
            let mut kept = BTreeSet::new();
            for t in starts {
                if !excluded.contains(&zone.date_code(t)?) {
                    kept.insert(t);
                }
            }
            starts = kept;
        }

        let duration = input.duration();
        starts
            .into_iter()
            .take(self.max_instances)
            .map(|t| make_instance(zone, t, duration, input.all_day))
            .collect()
    }

    /// The single instance of a non-recurring event (or an exception).
    pub fn single(&self, input: &RecurrenceInput<'_>) -> Instance {
        let zone = self.zone(input.all_day, input.timezone);
        make_instance(zone, input.start, input.duration(), input.all_day).unwrap_or(Instance {
            start: input.start,
            end: input.end,
            start_day: 0,
            end_day: 0,
        })
    }

    /// Number of rule-generated instants strictly before `until`. Excluded
    /// dates still count, as they do for COUNT.
    pub fn rule_instants_before(
        &self,
        input: &RecurrenceInput<'_>,
        until: Millis,
    ) -> Result<usize, RecurrenceError> {
        let Some(rule) = input.rule else {
            return Ok(0);
        };
        let zone = self.zone(input.all_day, input.timezone);
        let base = zone.datetime(input.start)?;
        let window = Window::new(input.start - MILLIS_PER_SECOND, until);
        let instants = self.rule_instants(rule, zone, &base, window)?;
        Ok(instants.len())
    }

    fn rule_instants(
        &self,
        rule: &str,
        zone: EvalZone,
        base: &DateTime<Tz>,
        window: Window,
    ) -> Result<Vec<Millis>, RecurrenceError> {
        let rule = normalize_rule(rule, zone)?;
        let dtstart = match zone {
            EvalZone::Utc => format!("DTSTART:{}Z", base.naive_utc().format("%Y%m%dT%H%M%S")),
            EvalZone::Zoned(tz) | EvalZone::Floating(tz) => format!(
                "DTSTART;TZID={}:{}",
                tz.name(),
                base.naive_local().format("%Y%m%dT%H%M%S")
            ),
        };

        let set: RRuleSet = format!("{dtstart}\nRRULE:{rule}")
            .parse()
            .map_err(|e: rrule::RRuleError| RecurrenceError::InvalidRule(e.to_string()))?;

        // The base instant is added by the caller, so starting the scan at
        // the window never drops it.
        let tz: rrule::Tz = Utc.into();
        let after = utc(window.start - MILLIS_PER_SECOND)?.with_timezone(&tz);
        let before = utc(window.end + MILLIS_PER_SECOND)?.with_timezone(&tz);
        let limit = u16::try_from(self.max_instances).unwrap_or(u16::MAX);
        let result = set.after(after).before(before).all(limit);
        if result.limited {
            tracing::debug!(limit, "recurrence expansion hit the instance limit");
        }

        Ok(result
            .dates
            .iter()
            .map(DateTime::timestamp_millis)
            .filter(|t| window.contains(*t))
            .collect())
    }
}

fn utc(ms: Millis) -> Result<DateTime<Utc>, RecurrenceError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(RecurrenceError::OutOfRange(ms))
}

fn make_instance(
    zone: EvalZone,
    start: Millis,
    duration: Millis,
    all_day: bool,
) -> Result<Instance, RecurrenceError> {
    let end = start + duration;
    // An all-day end is exclusive midnight; bucket it on the last covered day.
    let last = if all_day && end > start { end - 1 } else { end };
    Ok(Instance {
        start,
        end,
        start_day: zone.date_code(start)?,
        end_day: zone.date_code(last)?,
    })
}

pub fn encode_date(date: NaiveDate) -> DateCode {
    let year = u32::try_from(date.year()).unwrap_or_default();
    year * 10_000 + date.month() * 100 + date.day()
}

pub fn decode_date(code: DateCode) -> Option<NaiveDate> {
    let year = i32::try_from(code / 10_000).ok()?;
    NaiveDate::from_ymd_opt(year, (code / 100) % 100, code % 100)
}

/// Normalizes a date field to an 8-digit date code. Accepts epoch millis,
/// `YYYYMMDD`, `YYYY-MM-DD`, and date-time strings with a `T` separator.
pub fn normalize_date_code(value: &str, zone: EvalZone) -> Result<DateCode, RecurrenceError> {
    let value = value.trim();
    let invalid = || RecurrenceError::InvalidDate(value.to_string());

    if let Some((date, _)) = value.split_once('T') {
        return parse_date_digits(&date.replace('-', "")).ok_or_else(invalid);
    }
    if value.len() == 10 && value.as_bytes().get(4) == Some(&b'-') {
        return parse_date_digits(&value.replace('-', "")).ok_or_else(invalid);
    }
    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        return parse_date_digits(value).ok_or_else(invalid);
    }
    match value.parse::<Millis>() {
        Ok(ms) => zone.date_code(ms),
        Err(_) => Err(invalid()),
    }
}

fn parse_date_digits(digits: &str) -> Option<DateCode> {
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code: DateCode = digits.parse().ok()?;
    decode_date(code).map(|_| code)
}

fn combine(code: DateCode, time: NaiveTime, zone: EvalZone) -> Result<Millis, RecurrenceError> {
    let date = decode_date(code).ok_or_else(|| RecurrenceError::InvalidDate(code.to_string()))?;
    zone.instant(date.and_time(time))
}

/// Strips an `RRULE:` prefix and rewrites UNTIL as a UTC date-time.
fn normalize_rule(rule: &str, zone: EvalZone) -> Result<String, RecurrenceError> {
    let rule = rule.trim();
    let rule = rule.strip_prefix("RRULE:").unwrap_or(rule);
    rule.split(';')
        .filter(|part| !part.trim().is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.trim().eq_ignore_ascii_case("UNTIL") => {
                until_to_utc(value.trim(), zone).map(|u| format!("UNTIL={u}"))
            }
            _ => Ok(part.trim().to_string()),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|parts| parts.join(";"))
}

fn until_to_utc(value: &str, zone: EvalZone) -> Result<String, RecurrenceError> {
    const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
    if value.ends_with('Z') {
        return Ok(value.to_string());
    }
    let invalid = || RecurrenceError::InvalidRule(format!("UNTIL={value}"));
    let local = if let Some(code) = parse_date_digits(value) {
        // A date-only bound includes the whole day.
        decode_date(code)
            .and_then(|d| d.and_hms_opt(23, 59, 59))
            .ok_or_else(invalid)?
    } else {
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?
    };
    let ms = zone.instant(local)?;
    Ok(utc(ms)?.format(UTC_FORMAT).to_string())
}

/// The COUNT part of a rule, if any.
pub fn rule_count(rule: &str) -> Option<u32> {
    rule_parts(rule).find_map(|(key, value)| {
        key.eq_ignore_ascii_case("COUNT")
            .then(|| value.parse().ok())
            .flatten()
    })
}

/// The UNTIL bound of a rule as an instant, if it has one.
pub fn rule_until(rule: &str, zone: EvalZone) -> Result<Option<Millis>, RecurrenceError> {
    let Some(value) =
        rule_parts(rule).find_map(|(key, value)| key.eq_ignore_ascii_case("UNTIL").then_some(value))
    else {
        return Ok(None);
    };
    let utc_value = until_to_utc(value, zone)?;
    let until = NaiveDateTime::parse_from_str(&utc_value, "%Y%m%dT%H%M%SZ")
        .map_err(|_| RecurrenceError::InvalidRule(format!("UNTIL={value}")))?;
    Ok(Some(until.and_utc().timestamp_millis()))
}

/// Rewrites a rule to end at `until`, dropping any COUNT.
pub fn truncate_rule(rule: &str, until: Millis) -> Result<String, RecurrenceError> {
    let until = utc(until)?.format("%Y%m%dT%H%M%SZ").to_string();
    let mut parts: Vec<String> = rule_parts(rule)
        .filter(|(key, _)| !key.eq_ignore_ascii_case("COUNT") && !key.eq_ignore_ascii_case("UNTIL"))
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    parts.push(format!("UNTIL={until}"));
    Ok(parts.join(";"))
}

/// Rewrites a rule to produce `count` instances, dropping any UNTIL.
pub fn with_count(rule: &str, count: u32) -> String {
    let mut parts: Vec<String> = rule_parts(rule)
        .filter(|(key, _)| !key.eq_ignore_ascii_case("COUNT") && !key.eq_ignore_ascii_case("UNTIL"))
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    parts.push(format!("COUNT={count}"));
    parts.join(";")
}

fn rule_parts(rule: &str) -> impl Iterator<Item = (&str, &str)> {
    let rule = rule.trim();
    rule.strip_prefix("RRULE:")
        .unwrap_or(rule)
        .split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
}

/// The smallest step a truncated rule ends before its split instant.
pub fn truncation_unit(all_day: bool) -> Millis {
    if all_day {
        MILLIS_PER_DAY
    } else {
        MILLIS_PER_SECOND
    }
}

/// Resolves the local timezone, falling back to UTC.
pub fn system_timezone() -> Tz {
    match iana_time_zone::get_timezone() {
        Ok(name) => name.parse().unwrap_or_else(|_| {
            tracing::warn!(timezone = name, "unknown system timezone, using UTC");
            chrono_tz::UTC
        }),
        Err(e) => {
            tracing::warn!(err = %e, "failed to detect system timezone, using UTC");
            chrono_tz::UTC
        }
    }
}
