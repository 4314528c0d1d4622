//! Rule library
//!
//! A rule looks at one JSON value and returns `Some(message)` when the value
//! is rejected. Apart from `required` and `password`, rules accept absent
//! values (null or empty string); pair them with `required` to demand one.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

pub type RuleFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+]?[(]?[0-9]{3}[)]?[-\s.]?[0-9]{3}[-\s.]?[0-9]{4,6}$")
        .expect("phone regex")
});

/// Null, missing or an all-whitespace string.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn is_absent(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty())
}

/// Text form of scalars; `None` for null, arrays and objects.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn length(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        other => text(other).map_or(0, |s| s.chars().count()),
    }
}

fn rule(f: impl Fn(&Value) -> Option<String> + Send + Sync + 'static) -> RuleFn {
    Arc::new(f)
}

// =============================================================================
// RULES
// =============================================================================

pub fn required() -> RuleFn {
    rule(|value| is_empty_value(value).then(|| "Полето е задължително".to_string()))
}

pub fn email() -> RuleFn {
    rule(|value| {
        if is_absent(value) {
            return None;
        }
        match text(value) {
            Some(s) if EMAIL.is_match(&s) => None,
            _ => Some("Невалиден имейл формат".to_string()),
        }
    })
}

pub fn min_length(min: usize) -> RuleFn {
    rule(move |value| {
        if is_absent(value) || length(value) >= min {
            None
        } else {
            Some(format!("Минимална дължина е {min}"))
        }
    })
}

pub fn max_length(max: usize) -> RuleFn {
    rule(move |value| {
        if is_absent(value) || length(value) <= max {
            None
        } else {
            Some(format!("Максимална дължина е {max}"))
        }
    })
}

/// `message` defaults to a generic "invalid format" text.
pub fn pattern(regex: Regex, message: Option<String>) -> RuleFn {
    rule(move |value| {
        if is_absent(value) {
            return None;
        }
        match text(value) {
            Some(s) if regex.is_match(&s) => None,
            _ => Some(
                message
                    .clone()
                    .unwrap_or_else(|| "Невалиден формат".to_string()),
            ),
        }
    })
}

pub fn number() -> RuleFn {
    rule(|value| {
        if is_absent(value) || numeric(value).is_some() {
            None
        } else {
            Some("Трябва да е число".to_string())
        }
    })
}

pub fn min(min: f64) -> RuleFn {
    rule(move |value| {
        if is_absent(value) {
            return None;
        }
        match numeric(value) {
            Some(n) if n >= min => None,
            _ => Some(format!("Минимална стойност е {min}")),
        }
    })
}

pub fn max(max: f64) -> RuleFn {
    rule(move |value| {
        if is_absent(value) {
            return None;
        }
        match numeric(value) {
            Some(n) if n <= max => None,
            _ => Some(format!("Максимална стойност е {max}")),
        }
    })
}

/// At least 8 characters with an upper-case letter, a lower-case letter and a digit.
pub fn password() -> RuleFn {
    rule(|value| {
        let Some(s) = text(value).filter(|s| !s.is_empty()) else {
            return Some("Изисква се парола".to_string());
        };
        let message = if s.chars().count() < 8 {
            "Паролата трябва да е поне 8 символа"
        } else if !s.chars().any(|c| c.is_ascii_uppercase()) {
            "Паролата трябва да съдържа главна буква"
        } else if !s.chars().any(|c| c.is_ascii_lowercase()) {
            "Паролата трябва да съдържа малка буква"
        } else if !s.chars().any(|c| c.is_ascii_digit()) {
            "Паролата трябва да съдържа число"
        } else {
            return None;
        };
        Some(message.to_string())
    })
}

/// Accepts only a value equal to `expected`.
pub fn matches(expected: Value) -> RuleFn {
    rule(move |value| (*value != expected).then(|| "Fields do not match".to_string()))
}

pub fn url() -> RuleFn {
    rule(|value| {
        if is_absent(value) {
            return None;
        }
        match text(value) {
            Some(s) if url::Url::parse(&s).is_ok() => None,
            _ => Some("Invalid URL format".to_string()),
        }
    })
}

pub fn phone() -> RuleFn {
    rule(|value| {
        if is_absent(value) {
            return None;
        }
        match text(value) {
            Some(s) if PHONE.is_match(&s) => None,
            _ => Some("Invalid phone format".to_string()),
        }
    })
}
