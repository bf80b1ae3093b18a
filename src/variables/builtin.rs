//! Built-in generators
//!
//! Canonical syntax is `@{__name}` or `@{__name(arg,...)}`:
//! - `@{__uuid}` - Random UUID v4
//! - `@{__timestamp}` - Unix timestamp (milliseconds)
//! - `@{__datetime(FORMAT[,TZ])}` - Formatted date/time (TZ: `UTC`, `Z`, `local`, `+08:00`)
//! - `@{__prefixTimestamp(PREFIX)}` - Prefix followed by the millisecond timestamp
//! - `@{__prefixDatetime(PREFIX[,FORMAT])}` - Prefix followed by a formatted date/time
//! - `@{__randomString(LEN[,MODE])}` - Random string, MODE one of `a` (alphanumeric),
//!   `u` (upper), `l` (lower), `m` (mixed-case letters), `n` (numeric)
//!
//! The legacy spelling without the double underscore (`@{randomString(8,a)}`,
//! `@{uuid()}`, ...) is translated to the canonical form first.

use std::fmt::Write as _;
use chrono::format::{Item, StrftimeItems};
use chrono::{FixedOffset, Local, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::{Captures, Regex};
use tracing::warn;
use uuid::Uuid;

const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_PREFIX_DATETIME_FORMAT: &str = "%Y%m%d%H%M%S";
const MAX_RANDOM_LEN: usize = 10_000;

static LEGACY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@\{(uuid|timestamp|datetime|prefixTimestamp|prefixDatetime|randomString)(\([^()]*\))?\}").unwrap()
});
static UUID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\{__uuid(?:\(\s*\))?\}").unwrap());
static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\{__timestamp(?:\(\s*\))?\}").unwrap());
static RANDOM_STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\{__randomString\(([^()]*)\)\}").unwrap());
static DATETIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\{__datetime(?:\(([^()]*)\))?\}").unwrap());
static PREFIX_TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\{__prefixTimestamp\(([^()]*)\)\}").unwrap());
static PREFIX_DATETIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\{__prefixDatetime\(([^()]*)\)\}").unwrap());

/// Rewrite legacy generator calls into canonical `@{__name(...)}` form
pub fn translate_legacy(input: &str) -> String {
    if !input.contains("@{") {
        return input.to_string();
    }
    LEGACY_RE
        .replace_all(input, |caps: &Captures| {
            let args = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            format!("@{{__{}{}}}", &caps[1], args)
        })
        .into_owned()
}

/// Apply every built-in pass, each over the output of the previous one
pub fn resolve_builtins(input: &str) -> String {
    if !input.contains("@{__") {
        return input.to_string();
    }

    let out = replace_pass(&UUID_RE, input, |_| Some(Uuid::new_v4().to_string()));
    let out = replace_pass(&TIMESTAMP_RE, &out, |_| Some(timestamp_ms()));
    let out = replace_pass(&RANDOM_STRING_RE, &out, |args| random_string_from_args(args.unwrap_or("")));
    let out = replace_pass(&DATETIME_RE, &out, |args| {
        let (format, tz) = split_two(args.unwrap_or(""));
        format_datetime(format.unwrap_or(DEFAULT_DATETIME_FORMAT), tz)
    });
    let out = replace_pass(&PREFIX_TIMESTAMP_RE, &out, |args| {
        Some(format!("{}{}", args.unwrap_or("").trim(), timestamp_ms()))
    });
    replace_pass(&PREFIX_DATETIME_RE, &out, |args| {
        let (prefix, format) = split_two(args.unwrap_or(""));
        let formatted = format_datetime(format.unwrap_or(DEFAULT_PREFIX_DATETIME_FORMAT), None)?;
        Some(format!("{}{}", prefix.unwrap_or(""), formatted))
    })
}

/// Run one regex pass; invocations the generator rejects stay literal
fn replace_pass<F>(re: &Regex, input: &str, generate: F) -> String
where
    F: Fn(Option<&str>) -> Option<String>,
{
    re.replace_all(input, |caps: &Captures| {
        let args = caps.get(1).map(|m| m.as_str());
        match generate(args) {
            Some(value) => value,
            None => {
                warn!(expression = %&caps[0], "Malformed built-in variable, leaving unresolved");
                caps[0].to_string()
            }
        }
    })
    .into_owned()
}

/// Split `a,b` into trimmed parts; the second part keeps any further commas
fn split_two(args: &str) -> (Option<&str>, Option<&str>) {
    let mut parts = args.splitn(2, ',');
    let first = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let second = parts.next().map(str::trim).filter(|s| !s.is_empty());
    (first, second)
}

fn timestamp_ms() -> String {
    Utc::now().timestamp_millis().to_string()
}

/// Character set for a random string mode flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RandomMode {
    Alphanumeric,
    Upper,
    Lower,
    Mixed,
    Numeric,
}

impl RandomMode {
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag.trim() {
            "" | "a" | "A" => Some(RandomMode::Alphanumeric),
            "u" | "U" => Some(RandomMode::Upper),
            "l" | "L" => Some(RandomMode::Lower),
            "m" | "M" => Some(RandomMode::Mixed),
            "n" | "N" => Some(RandomMode::Numeric),
            _ => None,
        }
    }

    fn charset(&self) -> &'static [u8] {
        match self {
            RandomMode::Alphanumeric => b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789",
            RandomMode::Upper => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            RandomMode::Lower => b"abcdefghijklmnopqrstuvwxyz",
            RandomMode::Mixed => b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz",
            RandomMode::Numeric => b"0123456789",
        }
    }
}

fn random_string_from_args(args: &str) -> Option<String> {
    let (len, mode) = split_two(args);
    let len: usize = len?.parse().ok()?;
    if len > MAX_RANDOM_LEN {
        return None;
    }
    let mode = RandomMode::from_flag(mode.unwrap_or(""))?;
    Some(generate_random_string(len, mode))
}

/// Generate a random string drawn from the mode's character set
pub fn generate_random_string(len: usize, mode: RandomMode) -> String {
    let charset = mode.charset();
    let mut rng = rand::rng();
    (0..len)
        .map(|_| charset[rng.random_range(0..charset.len())] as char)
        .collect()
}

enum Zone {
    Utc,
    Local,
    Fixed(FixedOffset),
}

fn parse_timezone(tz: Option<&str>) -> Option<Zone> {
    let tz = match tz {
        None => return Some(Zone::Utc),
        Some(tz) => tz.trim(),
    };

    if tz.is_empty() || tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return Some(Zone::Utc);
    }
    if tz.eq_ignore_ascii_case("local") {
        return Some(Zone::Local);
    }

    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Zone::Fixed)
}

/// Format the current time; `None` on an invalid format or timezone
pub fn format_datetime(format: &str, tz: Option<&str>) -> Option<String> {
    let items: Vec<Item> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }

    let now = Utc::now();
    let mut out = String::new();
    match parse_timezone(tz)? {
        Zone::Utc => write!(out, "{}", now.format_with_items(items.iter())).ok()?,
        Zone::Local => write!(out, "{}", now.with_timezone(&Local).format_with_items(items.iter())).ok()?,
        Zone::Fixed(offset) => write!(out, "{}", now.with_timezone(&offset).format_with_items(items.iter())).ok()?,
    }
    Some(out)
}
