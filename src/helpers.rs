//! Formatting and small utilities shared by the pages.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const INVALID_DATE: &str = "Invalid Date";

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("uuid regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateStyle {
    /// `Jan 15, 2024`
    #[default]
    Short,
    /// `Monday, January 15, 2024`
    Long,
    /// `Jan 15, 2024, 02:30 PM`
    Time,
}

/// RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text.trim()) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn format_datetime(date: DateTime<Utc>, style: DateStyle) -> String {
    let pattern = match style {
        DateStyle::Short => "%b %-d, %Y",
        DateStyle::Long => "%A, %B %-d, %Y",
        DateStyle::Time => "%b %-d, %Y, %I:%M %p",
    };
    date.format(pattern).to_string()
}

/// [`format_datetime`] over text input; unparsable input gives `Invalid Date`.
pub fn format_date(date: &str, style: DateStyle) -> String {
    match parse_date(date) {
        Some(dt) => format_datetime(dt, style),
        None => INVALID_DATE.to_string(),
    }
}

/// `just now`, `5m ago`, `3h ago`, `12d ago`, then the short date.
pub fn time_ago(date: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - date).num_seconds();
    let mins = secs.div_euclid(60);
    let hours = mins.div_euclid(60);
    let days = hours.div_euclid(24);

    if secs < 60 {
        "just now".to_string()
    } else if mins < 60 {
        format!("{mins}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 30 {
        format!("{days}d ago")
    } else {
        format_datetime(date, DateStyle::Short)
    }
}

pub fn is_valid_uuid(text: &str) -> bool {
    UUID.is_match(text)
}

/// Cut to `max_len - 2` characters plus `...` when longer than `max_len`.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_len.saturating_sub(2)).collect();
    format!("{kept}...")
}

/// Thousands-separated value followed by `symbol`: `12,500 ⭐`.
pub fn format_value(value: i64, symbol: &str) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0 { "-" } else { "" };
    format!("{sign}{grouped} {symbol}")
}

/// Resolve `base` against `http://localhost` and append the present params.
pub fn build_url(base: &str, params: &[(&str, Option<&str>)]) -> Result<String, url::ParseError> {
    let origin = url::Url::parse("http://localhost")?;
    let mut url = origin.join(base)?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            if let Some(value) = value {
                query.append_pair(key, value);
            }
        }
    }
    let mut text = url.to_string();
    if text.ends_with('?') {
        text.pop();
    }
    Ok(text)
}

pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Parse `text`, logging and returning `fallback` on failure.
pub fn safe_parse<T: DeserializeOwned>(text: &str, fallback: T) -> T {
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "error parsing JSON");
            fallback
        }
    }
}

/// Null, false, zero, blank strings and empty collections.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}
