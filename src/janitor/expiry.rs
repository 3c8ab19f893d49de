//! TTL tag evaluation
//!
//! A TTL marker is a single tag value holding either an absolute expiry
//! timestamp or a relative duration. Absolute values are tried against an
//! ordered list of accepted time formats; relative values are parsed as an
//! ISO-8601 period first, then as a compact shorthand ("5d", "1h30m"), and
//! get normalized into an absolute timestamp written back under the target
//! tag so later scans read a stable value.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use tracing::{error, info};

use crate::azure::model::TagMap;

/// Outcome of evaluating one resource's tag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Absolute expiry time, when the TTL marker parsed successfully.
    pub expiry_time: Option<DateTime<Utc>>,
    /// True when the expiry time lies in the past (always false in dry-run).
    pub expired: bool,
    /// True when a relative duration was found and the normalized absolute
    /// value should be written back under the target tag.
    pub rewrite_needed: bool,
    /// The normalized absolute tag value accompanying `rewrite_needed`.
    pub new_tag_value: Option<String>,
}

/// Accepted absolute time formats, most-preferred first. The first format
/// that parses and yields a strictly positive epoch wins.
enum TimeFormat {
    /// RFC 3339, including fractional seconds.
    Rfc3339,
    /// RFC 1123 / 2822 dates, named or numeric zone.
    Rfc2822,
    /// strftime pattern carrying its own zone offset.
    Offset(&'static str),
    /// strftime pattern without zone information, read as UTC.
    NaiveUtc(&'static str),
    /// strftime pattern followed by a named zone abbreviation. chrono has no
    /// `%Z` parser, so the abbreviation is validated as a word and the time
    /// is read as UTC.
    NamedZone(&'static str),
    /// Bare date, midnight UTC.
    DateOnly,
}

const TIME_FORMATS: &[TimeFormat] = &[
    TimeFormat::Rfc3339,
    TimeFormat::Offset("%Y-%m-%d %H:%M:%S %:z"),
    TimeFormat::NamedZone("%Y-%m-%d %H:%M:%S"),
    TimeFormat::NaiveUtc("%Y-%m-%d %H:%M:%S"),
    TimeFormat::NamedZone("%d %b %y %H:%M"),
    TimeFormat::Offset("%d %b %y %H:%M %z"),
    TimeFormat::NamedZone("%A, %d-%b-%y %H:%M:%S"),
    TimeFormat::Rfc2822,
    TimeFormat::DateOnly,
];

/// Evaluates TTL markers against the configured source/target tag pair.
#[derive(Debug, Clone)]
pub struct ExpiryEvaluator {
    source_tag: String,
    target_tag: String,
    dry_run: bool,
}

impl ExpiryEvaluator {
    pub fn new(source_tag: impl Into<String>, target_tag: impl Into<String>, dry_run: bool) -> Self {
        Self {
            source_tag: source_tag.into(),
            target_tag: target_tag.into(),
            dry_run,
        }
    }

    /// Tag name rewritten values are stored under.
    pub fn target_tag(&self) -> &str {
        &self.target_tag
    }

    /// Decide whether a tag set marks its resource as expired.
    ///
    /// Returns empty outputs when no TTL marker is present or the marker
    /// fails to parse (the latter is logged, never fatal). In dry-run mode
    /// an expired resource is still reported with its expiry time but
    /// `expired` stays false.
    pub fn evaluate(&self, tags: &TagMap) -> Evaluation {
        let Some(value) = self.ttl_value(tags) else {
            return Evaluation::default();
        };
        let now = Utc::now();

        if let Some(expiry) = parse_expiry_time(value) {
            let mut expired = expiry < now;
            if expired && self.dry_run {
                info!(ttl = %value, "expired, but dry-run is active");
                expired = false;
            }
            return Evaluation {
                expiry_time: Some(expiry),
                expired,
                rewrite_needed: false,
                new_tag_value: None,
            };
        }

        match parse_expiry_duration(value) {
            Some(duration) => {
                let Some(expiry) = now.checked_add_signed(duration) else {
                    error!(ttl = %value, "duration exceeds the representable time range");
                    return Evaluation::default();
                };
                info!(ttl = %value, expiry = %expiry, "found valid duration");
                Evaluation {
                    expiry_time: Some(expiry),
                    expired: false,
                    rewrite_needed: true,
                    new_tag_value: Some(expiry.to_rfc3339_opts(SecondsFormat::Secs, true)),
                }
            }
            None => {
                error!(ttl = %value, "unable to parse ttl value as time or duration");
                Evaluation::default()
            }
        }
    }

    /// Find the TTL marker: target tag first, then source tag. Tag names are
    /// matched case-insensitively; empty or whitespace-only values count as
    /// absent.
    fn ttl_value<'a>(&self, tags: &'a TagMap) -> Option<&'a str> {
        tag_value(tags, &self.target_tag).or_else(|| tag_value(tags, &self.source_tag))
    }
}

fn tag_value<'a>(tags: &'a TagMap, name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|(key, value)| key.eq_ignore_ascii_case(name) && !value.trim().is_empty())
        .map(|(_, value)| value.trim())
}

/// Try the ordered format list; first successful parse with a strictly
/// positive epoch wins.
fn parse_expiry_time(value: &str) -> Option<DateTime<Utc>> {
    for format in TIME_FORMATS {
        let parsed = match format {
            TimeFormat::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            TimeFormat::Rfc2822 => DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            TimeFormat::Offset(pattern) => DateTime::parse_from_str(value, pattern)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            TimeFormat::NaiveUtc(pattern) => NaiveDateTime::parse_from_str(value, pattern)
                .ok()
                .map(|t| Utc.from_utc_datetime(&t)),
            TimeFormat::NamedZone(pattern) => parse_with_zone_word(value, pattern),
            TimeFormat::DateOnly => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|t| Utc.from_utc_datetime(&t)),
        };

        if let Some(time) = parsed {
            if time.timestamp() > 0 {
                return Some(time);
            }
        }
    }
    None
}

fn parse_with_zone_word(value: &str, pattern: &'static str) -> Option<DateTime<Utc>> {
    let (front, zone) = value.rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    NaiveDateTime::parse_from_str(front, pattern)
        .ok()
        .map(|t| Utc.from_utc_datetime(&t))
}

/// Parse a relative TTL: ISO-8601 period grammar first, compact shorthand
/// second.
fn parse_expiry_duration(value: &str) -> Option<Duration> {
    parse_iso8601_period(value).or_else(|| parse_compact_duration(value))
}

/// ISO-8601 period subset: `P[nY][nM][nW][nD][T[nH][nM][nS]]` with integer
/// components. Years and months are approximated as 365 and 30 days.
fn parse_iso8601_period(value: &str) -> Option<Duration> {
    let rest = value.strip_prefix(['P', 'p'])?;

    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut components = 0usize;
    let mut in_time = false;

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            'T' if digits.is_empty() => in_time = true,
            '0'..='9' => digits.push(c),
            unit => {
                let amount: i64 = digits.parse().ok()?;
                digits.clear();
                let part = match (unit, in_time) {
                    ('Y', false) => Duration::try_days(amount.checked_mul(365)?),
                    ('M', false) => Duration::try_days(amount.checked_mul(30)?),
                    ('W', false) => Duration::try_weeks(amount),
                    ('D', false) => Duration::try_days(amount),
                    ('H', true) => Duration::try_hours(amount),
                    ('M', true) => Duration::try_minutes(amount),
                    ('S', true) => Duration::try_seconds(amount),
                    _ => return None,
                }?;
                total = total.checked_add(&part)?;
                components += 1;
            }
        }
    }

    // trailing digits without a unit, or a bare "P"/"PT", are malformed
    if !digits.is_empty() || components == 0 {
        return None;
    }
    Some(total)
}

/// Compact shorthand: one or more `<number><unit>` segments ("5d", "1h30m").
fn parse_compact_duration(value: &str) -> Option<Duration> {
    let mut chars = value.chars().peekable();
    let mut total = Duration::zero();
    let mut segments = 0usize;

    while chars.peek().is_some() {
        let mut digits = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_digit() {
                digits.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        let mut unit = String::new();
        while let Some(c) = chars.peek() {
            if c.is_ascii_alphabetic() {
                unit.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return None;
        }

        let amount: i64 = digits.parse().ok()?;
        let part = match unit.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => Duration::try_seconds(amount),
            "m" | "min" | "mins" | "minute" | "minutes" => Duration::try_minutes(amount),
            "h" | "hr" | "hrs" | "hour" | "hours" => Duration::try_hours(amount),
            "d" | "day" | "days" => Duration::try_days(amount),
            "w" | "week" | "weeks" => Duration::try_weeks(amount),
            _ => return None,
        }?;
        total = total.checked_add(&part)?;
        segments += 1;
    }

    (segments > 0).then_some(total)
}

/// Parse a duration for configuration values (intervals, default TTLs),
/// accepting the same grammars as TTL tags.
pub fn parse_duration_value(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    parse_expiry_duration(value)
}
