//! Timestamp normalisation shared by the dialects, the replay pacer and the
//! live writer.
//!
//! Every instant is carried as `DateTime<Utc>` and rendered as ISO-8601 with a
//! trailing `Z`. Microseconds are written only when the instant has a
//! fractional part.

use std::ops::Range;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Wall-clock timestamp in any of the shapes the supported logs produce:
/// `2020/10/25 19:34:30`, `2024-08-14 06:29:23.003000`,
/// `2025-10-21 05:22:03:880`, `2024-08-14T06:29:23Z`, `...+03:00`.
static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})[/-](\d{2})[/-](\d{2})[ T,](\d{2}):(\d{2}):(\d{2})(?:[.:](\d{1,9}))?\s*(Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("static regex compiles")
});

/// Line prefix: timestamp, then an optional `[tag]` or `| elapsed |` group.
static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4}[/-]\d{2}[/-]\d{2}[ T]\d{2}:\d{2}:\d{2}(?:[:.]\d{1,6})?)\s*(?:\[[^\]]*\]\s*|\|\s*[^|]*\|\s*)?(.*)$",
    )
    .expect("static regex compiles")
});

static INLINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}[/-]\d{2}[/-]\d{2}[ ,T]\d{2}:\d{2}:\d{2}(?:[.:]\d{1,6})?")
        .expect("static regex compiles")
});

/// Normalise timestamp text to a UTC instant. Naive timestamps are UTC.
pub fn normalize_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let Some(caps) = TIMESTAMP_RE.captures(text) else {
        return DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    };

    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?;

    let nanos = match caps.get(7) {
        Some(frac) => {
            let digits = frac.as_str();
            let padded = format!("{:0<9}", digits);
            padded.parse::<u32>().ok()?
        }
        None => 0,
    };
    // Truncate to microseconds so every path yields the same precision.
    let micros = nanos / 1_000;
    let naive = date.and_hms_micro_opt(num(4)?, num(5)?, num(6)?, micros)?;
    let mut instant = naive.and_utc();

    if let Some(offset) = caps.get(8).map(|m| m.as_str()) {
        if offset != "Z" {
            instant -= parse_offset(offset)?;
        }
    }
    Some(instant)
}

fn parse_offset(text: &str) -> Option<Duration> {
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let digits: String = text[1..].chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i64 = digits[..2].parse().ok()?;
    let minutes: i64 = digits[2..].parse().ok()?;
    Some(Duration::minutes(sign * (hours * 60 + minutes)))
}

/// Interpret a (possibly fractional) epoch-seconds string.
pub fn epoch_to_utc(text: &str) -> Option<DateTime<Utc>> {
    let secs: f64 = text.trim().parse().ok()?;
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * 1_000_000.0).round() as i64;
    DateTime::from_timestamp_micros(micros)
}

pub fn format_iso_z(dt: &DateTime<Utc>) -> String {
    if dt.timestamp_subsec_micros() == 0 {
        dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
    }
}

pub fn unix_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Split a leading wall-clock prefix off a log line.
///
/// Returns the normalised instant and the message that follows the prefix.
pub fn split_prefix(line: &str) -> Option<(DateTime<Utc>, &str)> {
    let caps = PREFIX_RE.captures(line)?;
    let ts = normalize_timestamp(caps.get(1)?.as_str())?;
    let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    Some((ts, rest))
}

/// First absolute timestamp found anywhere in the line.
pub fn find_inline(line: &str) -> Option<(DateTime<Utc>, Range<usize>)> {
    INLINE_RE.find_iter(line).find_map(|m| {
        normalize_timestamp(m.as_str()).map(|ts| (ts, m.range()))
    })
}

/// Timestamp of a raw line for pacing: leading prefix first, then the first
/// inline timestamp. The range locates the timestamp text in the line.
pub fn line_timestamp(line: &str) -> Option<(DateTime<Utc>, Range<usize>)> {
    if let Some(caps) = PREFIX_RE.captures(line) {
        if let Some(m) = caps.get(1) {
            if let Some(ts) = normalize_timestamp(m.as_str()) {
                return Some((ts, m.range()));
            }
        }
    }
    find_inline(line)
}

/// Render `dt` in the same textual shape as `template`: same date separator,
/// same date/time separator, same fractional separator and precision.
pub fn render_like(template: &str, dt: &DateTime<Utc>) -> String {
    let bytes = template.as_bytes();
    let date_sep = bytes.get(4).map(|b| *b as char).unwrap_or('-');
    let dt_sep = bytes.get(10).map(|b| *b as char).unwrap_or(' ');

    let mut out = format!(
        "{}{}{}",
        dt.format(&format!("%Y{date_sep}%m{date_sep}%d")),
        dt_sep,
        dt.format("%H:%M:%S"),
    );

    if template.len() > 19 {
        let frac_sep = bytes[19] as char;
        let precision = template.len() - 20;
        if precision > 0 {
            let nanos = format!("{:09}", dt.timestamp_subsec_nanos());
            out.push(frac_sep);
            out.push_str(&nanos[..precision.min(9)]);
        }
    }
    out
}

/// Serde adapter for `DateTime<Utc>` fields rendered as ISO-8601 `Z`.
///
/// Deserialisation accepts any shape [`normalize_timestamp`] understands.
pub mod iso_z {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_iso_z(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::normalize_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("unrecognised timestamp: {raw}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match dt {
                Some(dt) => serializer.serialize_some(&super::super::format_iso_z(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.is_empty() => super::super::normalize_timestamp(&raw)
                    .map(Some)
                    .ok_or_else(|| de::Error::custom(format!("unrecognised timestamp: {raw}"))),
                _ => Ok(None),
            }
        }
    }
}
