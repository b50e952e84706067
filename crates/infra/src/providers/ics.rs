//! iCalendar bodies shared by the CalDAV and ICS-URL adapters.
//!
//! Parsing is delegated to the `icalendar` crate's parser; this module only
//! maps VEVENT components onto [`RemoteEvent`] and renders a
//! [`MirroredEvent`] for upload.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use hearthsync_core::ProviderResult;
use hearthsync_domain::{MirroredEvent, ProviderError, RemoteEvent};
use icalendar::parser::{read_calendar, unfold, Component as ParsedComponent};
use icalendar::{
    Calendar, CalendarDateTime, Component, DatePerhapsTime, EventLike, Property, ValueType,
};
use tracing::debug;

const UNTITLED: &str = "(No title)";

/// Parse every VEVENT in `content`.
///
/// Cancelled events and components without a UID or DTSTART are skipped.
/// Times with a TZID are converted through the tz database; floating times
/// are read as UTC.
pub fn parse_events(content: &str) -> ProviderResult<Vec<RemoteEvent>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|err| ProviderError::unknown(format!("unparseable calendar data: {err}")))?;

    let mut events = Vec::new();
    for component in &calendar.components {
        collect_events(component, &mut events);
    }
    Ok(events)
}

// Some servers nest VEVENTs inside a VCALENDAR component, others return them
// at the top level.
fn collect_events(component: &ParsedComponent<'_>, out: &mut Vec<RemoteEvent>) {
    if component.name == "VEVENT" {
        if let Some(event) = to_remote_event(component) {
            out.push(event);
        }
        return;
    }
    for child in &component.components {
        collect_events(child, out);
    }
}

fn to_remote_event(vevent: &ParsedComponent<'_>) -> Option<RemoteEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();

    if vevent.find_prop("STATUS").is_some_and(|p| p.val.as_ref().eq_ignore_ascii_case("CANCELLED")) {
        debug!(uid, "skipping cancelled event");
        return None;
    }

    let start = DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?;
    let is_all_day = matches!(start, DatePerhapsTime::Date(_));
    let start_time = to_utc(start)?;

    let end_time = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .and_then(to_utc)
        .filter(|end| *end >= start_time)
        .unwrap_or_else(|| {
            if is_all_day {
                start_time + Duration::days(1)
            } else {
                start_time
            }
        });

    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    Some(RemoteEvent {
        external_id: uid,
        title,
        start_time,
        end_time,
        is_all_day,
        location: non_empty(vevent, "LOCATION"),
        description: non_empty(vevent, "DESCRIPTION"),
        is_declined: false,
        color: non_empty(vevent, "COLOR"),
    })
}

fn non_empty(vevent: &ParsedComponent<'_>, name: &str) -> Option<String> {
    vevent.find_prop(name).map(|p| p.val.to_string()).filter(|s| !s.trim().is_empty())
}

fn to_utc(value: DatePerhapsTime) -> Option<DateTime<Utc>> {
    match value {
        DatePerhapsTime::Date(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Some(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => Some(naive.and_utc()),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            Some(zoned_to_utc(date_time, &tzid))
        }
    }
}

/// Unknown zone names fall back to UTC. A local time skipped by a DST gap
/// resolves to the earliest valid instant after it.
fn zoned_to_utc(local: NaiveDateTime, tzid: &str) -> DateTime<Utc> {
    let Ok(tz) = tzid.trim_matches('"').parse::<Tz>() else {
        debug!(tzid, "unknown TZID, reading as UTC");
        return local.and_utc();
    };
    match tz.from_local_datetime(&local).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => tz
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map_or_else(|| local.and_utc(), |dt| dt.with_timezone(&Utc)),
    }
}

/// Render one event as a standalone VCALENDAR document.
pub fn render_event(event: &MirroredEvent, uid: &str) -> String {
    let mut calendar = Calendar::new();
    let mut vevent = icalendar::Event::new();
    vevent.uid(uid);
    vevent.summary(&event.title);
    vevent.add_property("DTSTAMP", Utc::now().format("%Y%m%dT%H%M%SZ").to_string());

    if event.is_all_day {
        add_date(&mut vevent, "DTSTART", event.start_time.date_naive());
        add_date(&mut vevent, "DTEND", event.end_time.date_naive());
    } else {
        vevent.add_property("DTSTART", event.start_time.format("%Y%m%dT%H%M%SZ").to_string());
        vevent.add_property("DTEND", event.end_time.format("%Y%m%dT%H%M%SZ").to_string());
    }

    if let Some(location) = &event.location {
        vevent.location(location);
    }

    calendar.push(vevent.done());
    calendar.done().to_string()
}

fn add_date(vevent: &mut icalendar::Event, name: &str, date: NaiveDate) {
    let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
    prop.append_parameter(ValueType::Date);
    vevent.append_property(prop);
}
