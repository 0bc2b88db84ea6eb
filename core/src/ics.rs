// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! iCalendar payloads for the push service.

use chrono::NaiveDateTime;
use icalendar::{Calendar, Component, EventLike, Property, ValueType};

use crate::event::Event;
use crate::recurrence::{EvalZone, Expander, decode_date, normalize_date_code};
use crate::remote::Serializer;
use crate::types::Millis;

const PRODID: &str = "-//calsync//calsync-core//EN";

/// Serializes events as `VCALENDAR` documents. Exceptions become extra
/// `VEVENT`s sharing the master's UID, keyed by `RECURRENCE-ID`.
#[derive(Debug, Clone, Copy)]
pub struct IcsSerializer {
    expander: Expander,
}

impl IcsSerializer {
    pub fn new(expander: Expander) -> Self {
        Self { expander }
    }

    fn vevent(&self, event: &Event, recurrence_id: Option<(EvalZone, Millis)>) -> icalendar::Event {
        let zone = self.expander.zone_for(event);
        let mut vevent = icalendar::Event::new();
        vevent.uid(&event.uid);
        vevent.summary(&event.title);
        vevent.add_property("DTSTAMP", utc_stamp(event.updated_at));
        vevent.add_property("LAST-MODIFIED", utc_stamp(event.updated_at));
        vevent.add_property("SEQUENCE", event.sequence.to_string());
        vevent.append_property(time_property("DTSTART", zone, event.start));
        vevent.append_property(time_property("DTEND", zone, event.end));

        if let Some(description) = &event.description {
            vevent.description(description);
        }
        if let Some(location) = &event.location {
            vevent.location(location);
        }

        if let Some(recurrence) = event.recurrence() {
            if let Some(rule) = recurrence.rule.as_deref().filter(|a| !a.trim().is_empty()) {
                let rule = rule.trim();
                vevent.add_property("RRULE", rule.strip_prefix("RRULE:").unwrap_or(rule));
            }
            for value in &recurrence.rdates {
                if let Some(prop) = date_list_property("RDATE", zone, event.start, value) {
                    vevent.append_multi_property(prop);
                }
            }
            for value in &recurrence.exdates {
                if let Some(prop) = date_list_property("EXDATE", zone, event.start, value) {
                    vevent.append_multi_property(prop);
                }
            }
        }

        if let Some((master_zone, original)) = recurrence_id {
            vevent.append_property(time_property("RECURRENCE-ID", master_zone, original));
        }
        vevent.done()
    }
}

impl Serializer for IcsSerializer {
    fn serialize(&self, event: &Event) -> String {
        let recurrence_id = event.exception_of().map(|(_, original)| {
            // Without the master at hand, the exception's own zone stands in.
            (self.expander.zone_for(event), original)
        });
        let mut cal = Calendar::new();
        cal.push(self.vevent(event, recurrence_id));
        finish(cal)
    }

    fn serialize_with_exceptions(&self, master: &Event, exceptions: &[Event]) -> String {
        let master_zone = self.expander.zone_for(master);
        let mut cal = Calendar::new();
        cal.push(self.vevent(master, None));
        for exception in exceptions {
            let Some((_, original)) = exception.exception_of() else {
                continue;
            };
            cal.push(self.vevent(exception, Some((master_zone, original))));
        }
        finish(cal)
    }
}

fn finish(mut cal: Calendar) -> String {
    let cal = cal.done();
    let mut out = String::new();
    for line in cal.to_string().lines() {
        if line.starts_with("PRODID:") {
            out.push_str("PRODID:");
            out.push_str(PRODID);
        } else {
            out.push_str(line);
        }
        out.push_str("\r\n");
    }
    out
}

fn utc_stamp(ms: Millis) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .unwrap_or_default()
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
}

fn local_time(zone: EvalZone, ms: Millis) -> NaiveDateTime {
    zone.local(ms).unwrap_or_else(|err| {
        tracing::warn!(%err, "instant out of range, writing epoch");
        NaiveDateTime::default()
    })
}

/// DATE for all-day events, UTC for UTC events, TZID-qualified local time for
/// zoned events, bare local time for floating ones.
fn time_property(name: &str, zone: EvalZone, ms: Millis) -> Property {
    let local = local_time(zone, ms);
    match zone {
        EvalZone::Utc => {
            let mut prop = Property::new(name, local.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            prop
        }
        EvalZone::Zoned(tz) if tz == chrono_tz::UTC => {
            Property::new(name, local.format("%Y%m%dT%H%M%SZ").to_string())
        }
        EvalZone::Zoned(tz) => {
            let mut prop = Property::new(name, local.format("%Y%m%dT%H%M%S").to_string());
            prop.add_parameter("TZID", tz.name());
            prop
        }
        EvalZone::Floating(_) => Property::new(name, local.format("%Y%m%dT%H%M%S").to_string()),
    }
}

/// RDATE/EXDATE entry: matching is by date, so the stored value is reduced to
/// its date and recombined with the start's time of day.
fn date_list_property(name: &str, zone: EvalZone, start: Millis, value: &str) -> Option<Property> {
    let code = match normalize_date_code(value, zone) {
        Ok(code) => code,
        Err(err) => {
            tracing::warn!(%err, property = name, "skipping unreadable date entry");
            return None;
        }
    };
    let date = decode_date(code)?;
    let instant = zone.instant(date.and_time(local_time(zone, start).time())).ok()?;
    Some(time_property(name, zone, instant))
}
