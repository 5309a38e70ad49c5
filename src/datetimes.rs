//! Date parsing for the many formats feeds use in the wild.
//!
//! [`parse_date`] tries each grammar in turn and returns the first success,
//! normalized to UTC. A grammar that cannot make sense of its input simply
//! yields `None`; nothing here fails loudly.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use regex::Regex;

type DateHandler = fn(&str) -> Option<DateTime<Utc>>;

/// Grammars in the order they are tried.
const DATE_HANDLERS: &[DateHandler] = &[
    parse_w3dtf,
    parse_rfc822,
    parse_iso8601,
    parse_asctime,
    parse_perforce,
    parse_greek,
];

const MONTHS: &[&str] = &["jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec"];
const DAY_NAMES: &[&str] = &["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Named zones and their offset from UTC in hours.
const TIMEZONE_NAMES: &[(&str, i64)] = &[
    ("ut", 0), ("gmt", 0), ("z", 0),
    ("adt", -3), ("ast", -4), ("at", -4),
    ("edt", -4), ("est", -5), ("et", -5),
    ("cdt", -5), ("cst", -6), ("ct", -6),
    ("mdt", -6), ("mst", -7), ("mt", -7),
    ("pdt", -7), ("pst", -8), ("pt", -8),
    ("a", -1), ("n", 1), ("m", -12), ("y", 12),
    ("met", 1), ("mest", 2),
];

/// Parses a date in any supported format.
///
/// # Examples
///
/// ```
/// use feedparse::datetimes::parse_date;
///
/// let d = parse_date("Thu, 01 Jan 2004 19:48:21 GMT").unwrap();
/// assert_eq!(d.to_rfc3339(), "2004-01-01T19:48:21+00:00");
///
/// let d = parse_date("2003-12-31T10:14:55-08:00").unwrap();
/// assert_eq!(d.to_rfc3339(), "2003-12-31T18:14:55+00:00");
///
/// assert!(parse_date("not a date").is_none());
/// ```
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if text.trim().is_empty() {
        return None;
    }
    DATE_HANDLERS.iter().find_map(|handler| handler(text))
}

fn month_number(name: &str) -> Option<u32> {
    let head: String = name.chars().take(3).collect();
    MONTHS.iter().position(|m| *m == head).map(|i| i as u32 + 1)
}

fn zone_hours(name: &str) -> i64 {
    TIMEZONE_NAMES
        .iter()
        .find(|(zone, _)| *zone == name)
        .map_or(0, |(_, hours)| *hours)
}

/// Builds a UTC instant from local fields and a UTC offset in minutes.
fn to_utc(
    year: i32,
    month: u32,
    day: u32,
    (hour, minute, second): (u32, u32, u32),
    offset_minutes: i64,
) -> Option<DateTime<Utc>> {
    let local = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    let utc = local.checked_sub_signed(TimeDelta::try_minutes(offset_minutes)?)?;
    Some(utc.and_utc())
}

/// Parses a `+hh:mm`, `+hhmm` or `+hh` offset into minutes.
fn numeric_offset(zone: &str) -> Option<i64> {
    let sign = match zone.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let body = &zone[1..];
    let (hours, minutes) = match body.split_once(':') {
        Some((h, m)) => (h, m),
        None => (body.get(..2)?, body.get(2..).unwrap_or("")),
    };
    let hours: i64 = hours.parse().ok()?;
    let minutes: i64 = if minutes.is_empty() { 0 } else { minutes.parse().ok()? };
    Some(sign * (hours * 60 + minutes))
}

// ============================================================================
// W3C date-time profile of ISO 8601
// ============================================================================

fn parse_w3dtf(text: &str) -> Option<DateTime<Utc>> {
    let lowered = text.to_lowercase();
    let mut parts: Vec<String> = lowered.split('t').map(str::to_owned).collect();
    if parts.len() == 1 {
        // Date only, or an MSSQL-style "date time zone" triple
        parts = lowered.split_whitespace().map(str::to_owned).collect();
        if parts.len() == 1 {
            parts.push("00:00:00z".to_owned());
        }
    } else if parts.len() > 2 {
        return None;
    }
    if parts.len() < 2 {
        return None;
    }

    let date: Vec<&str> = parts[0].splitn(3, '-').collect();
    if date[0].len() != 4 {
        return None;
    }
    let year: i32 = date[0].trim().parse().ok()?;
    let month: u32 = date.get(1).map_or(Ok(1), |m| m.trim().parse()).ok()?;
    let day: u32 = date.get(2).map_or(Ok(1), |d| d.trim().parse()).ok()?;

    if let Some(stripped) = parts[1].strip_suffix('z') {
        parts[1] = stripped.to_owned();
        parts.push("z".to_owned());
    }
    let loc = parts[1]
        .find('-')
        .or_else(|| parts[1].find('+'))
        .unwrap_or(parts[1].len());
    let zone = parts[1][loc..].to_owned();
    parts[1].truncate(loc);
    parts.push(zone);

    let mut time: Vec<&str> = parts[1].splitn(3, ':').collect();
    time.resize(3, "0");
    let hour: u32 = time[0].trim().parse().ok()?;
    let minute: u32 = time[1].trim().parse().ok()?;
    let second = if time[2].trim().is_empty() {
        0
    } else {
        time[2].trim().parse::<f64>().ok()? as u32
    };

    let zone = parts[2].trim();
    let offset = if zone.starts_with(['+', '-']) {
        numeric_offset(zone)?
    } else {
        zone_hours(zone) * 60
    };
    to_utc(year, month, day, (hour, minute, second), offset)
}

// ============================================================================
// RFC 822 / 2822
// ============================================================================

/// RFC 822 with real-world leniency: two-digit years, day and month
/// swapped, extra zone names, and a date without time or zone.
fn parse_rfc822(text: &str) -> Option<DateTime<Utc>> {
    let lowered = text.to_lowercase();
    let mut parts: Vec<String> = lowered.split_whitespace().map(str::to_owned).collect();
    if parts.len() < 5 {
        parts.push("00:00:00".to_owned());
        parts.push("0000".to_owned());
    }
    let head: String = parts[0].chars().take(3).collect();
    if DAY_NAMES.contains(&head.as_str()) {
        parts.remove(0);
    }
    if parts.len() < 5 {
        return None;
    }

    let day: u32 = match parts[0].parse() {
        Ok(day) => day,
        Err(_) => {
            month_number(&parts[0])?;
            let day = parts[1].parse().ok()?;
            parts[1] = parts[0].clone();
            day
        }
    };
    let month = month_number(&parts[1])?;
    let mut year: i32 = parts[2].parse().ok()?;
    if parts[2].len() <= 2 {
        year += if year < 90 { 2000 } else { 1900 };
    }

    let clock: Vec<&str> = parts[3].split(':').collect();
    if clock.len() > 3 {
        return None;
    }
    let mut fields = [0u32; 3];
    for (slot, value) in fields.iter_mut().zip(&clock) {
        *slot = value.parse().ok()?;
    }

    let mut zone = parts[4].as_str();
    if let Some(rest) = zone.strip_prefix("etc/") {
        zone = rest;
    }
    let gmt_offset;
    if let Some(rest) = zone.strip_prefix("gmt") {
        gmt_offset = rest.replace(':', "");
        zone = if gmt_offset.is_empty() { "gmt" } else { &gmt_offset };
    }
    let offset = if zone.starts_with(['+', '-']) {
        let hours: i64 = zone.get(1..3)?.parse().ok()?;
        let minutes: i64 = zone.get(3..)?.parse().ok()?;
        let total = hours * 60 + minutes;
        if zone.starts_with('-') { -total } else { total }
    } else {
        zone_hours(zone) * 60
    };
    to_utc(year, month, day, (fields[0], fields[1], fields[2]), offset)
}

// ============================================================================
// Compact ISO 8601
// ============================================================================

static ISO8601_RE: OnceLock<Regex> = OnceLock::new();

fn iso8601_regex() -> &'static Regex {
    ISO8601_RE.get_or_init(|| {
        Regex::new(
            r"(?x)^
            (?P<year>\d{4})-?
            (?:(?P<month>\d{2})-?(?P<day>\d{2})|(?P<ordinal>\d{3}))
            (?:T?(?P<hour>\d{2}):?(?P<minute>\d{2})(?::?(?P<second>\d{2}))?(?:\.\d+)?)?
            \s*(?P<zone>Z|[+-]\d{2}(?::?\d{2})?)?
            $",
        )
        .expect("Failed to compile ISO 8601 regex")
    })
}

fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    let caps = iso8601_regex().captures(text.trim())?;
    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());

    let year: i32 = caps.name("year")?.as_str().parse().ok()?;
    let (month, day) = match number("ordinal") {
        Some(ordinal) => {
            let date = NaiveDate::from_yo_opt(year, ordinal)?;
            (chrono::Datelike::month(&date), chrono::Datelike::day(&date))
        }
        None => (number("month")?, number("day")?),
    };
    let clock = (
        number("hour").unwrap_or(0),
        number("minute").unwrap_or(0),
        number("second").unwrap_or(0),
    );
    let offset = match caps.name("zone").map(|m| m.as_str()) {
        None | Some("Z") => 0,
        Some(zone) => numeric_offset(zone)?,
    };
    to_utc(year, month, day, clock, offset)
}

// ============================================================================
// asctime, Perforce and Greek: rewritten to RFC 822
// ============================================================================

/// `Sun Jan  4 16:29:06 PST 2004` and `Sun Jan  4 16:29:06 2004`.
fn parse_asctime(text: &str) -> Option<DateTime<Utc>> {
    let mut parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() == 5 {
        parts.insert(4, "+0000");
    }
    if parts.len() != 6 {
        return None;
    }
    parse_rfc822(&[parts[0], parts[2], parts[1], parts[5], parts[3], parts[4]].join(" "))
}

static PERFORCE_RE: OnceLock<Regex> = OnceLock::new();

fn perforce_regex() -> &'static Regex {
    PERFORCE_RE.get_or_init(|| {
        Regex::new(r"^(\w{0,3}), (\d{4})/(\d{1,2})/(\d{1,2}) (\d{1,2}):(\d{2}):(\d{2}) (\w+)$")
            .expect("Failed to compile Perforce date regex")
    })
}

/// `Fri, 2006/09/15 08:19:53 EDT`.
fn parse_perforce(text: &str) -> Option<DateTime<Utc>> {
    let caps = perforce_regex().captures(text)?;
    let month: usize = caps[3].parse().ok()?;
    let month = MONTHS.get(month.checked_sub(1)?)?;
    let rfc822 = format!(
        "{}, {} {} {} {}:{}:{} {}",
        &caps[1], &caps[4], month, &caps[2], &caps[5], &caps[6], &caps[7], &caps[8]
    );
    parse_rfc822(&rfc822)
}

const GREEK_MONTHS: &[(&str, &str)] = &[
    ("\u{399}\u{3b1}\u{3bd}", "Jan"),
    ("\u{3a6}\u{3b5}\u{3b2}", "Feb"),
    ("\u{39c}\u{3ac}\u{3ce}", "Mar"),
    ("\u{39c}\u{3b1}\u{3ce}", "Mar"),
    ("\u{391}\u{3c0}\u{3c1}", "Apr"),
    ("\u{39c}\u{3ac}\u{3b9}", "May"),
    ("\u{39c}\u{3b1}\u{3ca}", "May"),
    ("\u{39c}\u{3b1}\u{3b9}", "May"),
    ("\u{399}\u{3bf}\u{3cd}\u{3bd}", "Jun"),
    ("\u{399}\u{3bf}\u{3bd}", "Jun"),
    ("\u{399}\u{3bf}\u{3cd}\u{3bb}", "Jul"),
    ("\u{399}\u{3bf}\u{3bb}", "Jul"),
    ("\u{391}\u{3cd}\u{3b3}", "Aug"),
    ("\u{391}\u{3c5}\u{3b3}", "Aug"),
    ("\u{3a3}\u{3b5}\u{3c0}", "Sep"),
    ("\u{39f}\u{3ba}\u{3c4}", "Oct"),
    ("\u{39d}\u{3bf}\u{3ad}", "Nov"),
    ("\u{39d}\u{3bf}\u{3b5}", "Nov"),
    ("\u{394}\u{3b5}\u{3ba}", "Dec"),
];

const GREEK_WEEKDAYS: &[(&str, &str)] = &[
    ("\u{39a}\u{3c5}\u{3c1}", "Sun"),
    ("\u{394}\u{3b5}\u{3c5}", "Mon"),
    ("\u{3a4}\u{3c1}\u{3b9}", "Tue"),
    ("\u{3a4}\u{3b5}\u{3c4}", "Wed"),
    ("\u{3a0}\u{3b5}\u{3bc}", "Thu"),
    ("\u{3a0}\u{3b1}\u{3c1}", "Fri"),
    ("\u{3a3}\u{3b1}\u{3b2}", "Sat"),
];

static GREEK_RE: OnceLock<Regex> = OnceLock::new();

fn greek_regex() -> &'static Regex {
    GREEK_RE.get_or_init(|| {
        Regex::new(r"^([^,]+),\s+(\d{2})\s+(\S+)\s+(\d{4})\s+(\d{2}):(\d{2}):(\d{2})\s+(\S+)")
            .expect("Failed to compile Greek date regex")
    })
}

fn parse_greek(text: &str) -> Option<DateTime<Utc>> {
    let caps = greek_regex().captures(text)?;
    let lookup = |table: &[(&str, &'static str)], key: &str| {
        table.iter().find(|(greek, _)| *greek == key).map(|(_, english)| *english)
    };
    let weekday = lookup(GREEK_WEEKDAYS, &caps[1])?;
    let month = lookup(GREEK_MONTHS, &caps[3])?;
    let rfc822 = format!(
        "{weekday}, {} {month} {} {}:{}:{} {}",
        &caps[2], &caps[4], &caps[5], &caps[6], &caps[7], &caps[8]
    );
    parse_rfc822(&rfc822)
}
