//! Application log
//!
//! Two layers:
//! - [`init_tracing`] wires process diagnostics to `tracing-subscriber`.
//! - [`Logger`] is the in-memory application log the UI can inspect, export
//!   and ship to a collector. Every stored entry is also forwarded to
//!   `tracing` at the matching level.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::api::transport::{HttpRequest, Method, Transport};
use crate::config::LoggingConfig;
use crate::listeners::{lock, Listeners, Subscription};

pub const DEFAULT_MAX_LOGS: usize = 1000;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over
/// `default_filter`. Calling it twice is harmless.
pub fn init_tracing(default_filter: &str) {
    let result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

// =============================================================================
// LEVELS AND ENTRIES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Origin: `"app"` or the child prefix chain.
    pub context: String,
}

// =============================================================================
// LOGGER
// =============================================================================

struct Shared {
    min_level: RwLock<LogLevel>,
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    listeners: Listeners<LogEntry>,
}

/// Cheap to clone; clones and children share one buffer.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
    prefixes: Vec<String>,
}

impl Logger {
    pub fn new(min_level: LogLevel, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                min_level: RwLock::new(min_level),
                entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_MAX_LOGS))),
                capacity: capacity.max(1),
                listeners: Listeners::new(),
            }),
            prefixes: Vec::new(),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let logger = Self::new(LogLevel::Info, config.max_logs);
        logger.set_level(&config.level);
        logger
    }

    pub fn level(&self) -> LogLevel {
        *self
            .shared
            .min_level
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Unknown names fall back to INFO.
    pub fn set_level(&self, level: &str) {
        let parsed = level.parse::<LogLevel>().unwrap_or_else(|e: UnknownLevel| {
            tracing::warn!(error = %e, "falling back to INFO");
            LogLevel::Info
        });
        *self
            .shared
            .min_level
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = parsed;
    }

    pub fn subscribe(&self, listener: impl Fn(&LogEntry) + Send + Sync + 'static) -> Subscription {
        self.shared.listeners.add(Arc::new(listener))
    }

    /// A logger writing into the same buffer with `[prefix] ` prepended.
    pub fn child(&self, prefix: impl Into<String>) -> Logger {
        let mut prefixes = self.prefixes.clone();
        prefixes.push(prefix.into());
        Logger {
            shared: Arc::clone(&self.shared),
            prefixes,
        }
    }

    fn context(&self) -> String {
        if self.prefixes.is_empty() {
            "app".to_string()
        } else {
            self.prefixes.join(":")
        }
    }

    /// Store, forward and broadcast one entry. Returns `None` when filtered.
    pub fn log(&self, level: LogLevel, message: &str, data: Option<Value>) -> Option<LogEntry> {
        if level != LogLevel::Fatal && level < self.level() {
            return None;
        }

        let mut text = String::new();
        for prefix in &self.prefixes {
            text.push('[');
            text.push_str(prefix);
            text.push_str("] ");
        }
        text.push_str(message);

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: text,
            data,
            context: self.context(),
        };

        forward(&entry);

        {
            let mut entries = lock(&self.shared.entries);
            entries.push_back(entry.clone());
            while entries.len() > self.shared.capacity {
                entries.pop_front();
            }
        }

        self.shared.listeners.emit(&entry, "logger");
        Some(entry)
    }

    pub fn debug(&self, message: &str, data: Option<Value>) -> Option<LogEntry> {
        self.log(LogLevel::Debug, message, data)
    }

    pub fn info(&self, message: &str, data: Option<Value>) -> Option<LogEntry> {
        self.log(LogLevel::Info, message, data)
    }

    pub fn warn(&self, message: &str, data: Option<Value>) -> Option<LogEntry> {
        self.log(LogLevel::Warn, message, data)
    }

    pub fn error(&self, message: &str, data: Option<Value>) -> Option<LogEntry> {
        self.log(LogLevel::Error, message, data)
    }

    pub fn fatal(&self, message: &str, data: Option<Value>) -> Option<LogEntry> {
        self.log(LogLevel::Fatal, message, data)
    }

    /// ERROR entry with the error and its source chain attached under `error`.
    pub fn error_with(
        &self,
        message: &str,
        error: &(dyn std::error::Error + 'static),
        data: Option<Value>,
    ) -> Option<LogEntry> {
        self.log(LogLevel::Error, message, Some(attach_error(error, data)))
    }

    pub fn fatal_with(
        &self,
        message: &str,
        error: &(dyn std::error::Error + 'static),
        data: Option<Value>,
    ) -> Option<LogEntry> {
        self.log(LogLevel::Fatal, message, Some(attach_error(error, data)))
    }

    // -------------------------------------------------------------------------
    // Structured helpers
    // -------------------------------------------------------------------------

    pub fn log_api(&self, method: Method, url: &str, status: u16, duration: Duration) {
        let message = format!("API {method} {url} - {status}");
        let data = Some(json!({
            "method": method,
            "url": url,
            "status": status,
            "duration": format!("{}ms", duration.as_millis()),
        }));
        if status >= 400 {
            self.warn(&message, data);
        } else {
            self.debug(&message, data);
        }
    }

    pub fn log_performance(&self, label: &str, duration: Duration) {
        self.info(
            &format!("Performance: {label}"),
            Some(json!({ "duration": format!("{}ms", duration.as_millis()) })),
        );
    }

    pub fn log_action(&self, action: &str, details: Option<Value>) {
        self.info(&format!("User Action: {action}"), details);
    }

    // -------------------------------------------------------------------------
    // Buffer access
    // -------------------------------------------------------------------------

    pub fn logs(&self, level: Option<LogLevel>) -> Vec<LogEntry> {
        lock(&self.shared.entries)
            .iter()
            .filter(|entry| level.map_or(true, |l| entry.level == l))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.shared.entries).clear();
    }

    pub fn export_json(&self) -> String {
        let entries = self.logs(None);
        serde_json::to_string_pretty(&entries).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize logs");
            "[]".to_string()
        })
    }

    /// POST the export to `endpoint`; on a 2xx reply the buffer is cleared.
    /// Failures are logged, never returned.
    pub async fn send_logs(&self, transport: &dyn Transport, endpoint: &str) {
        let request = HttpRequest::new(Method::Post, endpoint)
            .with_header("Content-Type", "application/json")
            .with_body(self.export_json());

        match transport.send(&request).await {
            Ok(response) if response.is_success() => {
                self.info("Logs sent successfully", None);
                self.clear();
            }
            Ok(response) => {
                self.error(
                    "Failed to send logs",
                    Some(json!({ "status": response.status })),
                );
            }
            Err(e) => {
                self.error_with("Failed to send logs", &e, None);
            }
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Info, DEFAULT_MAX_LOGS)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level())
            .field("prefixes", &self.prefixes)
            .finish_non_exhaustive()
    }
}

fn attach_error(error: &(dyn std::error::Error + 'static), data: Option<Value>) -> Value {
    let mut chain = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push(Value::String(cause.to_string()));
        source = cause.source();
    }
    let error_value = json!({ "message": error.to_string(), "sources": chain });

    match data {
        Some(Value::Object(mut map)) => {
            map.insert("error".to_string(), error_value);
            Value::Object(map)
        }
        Some(other) => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map.insert("error".to_string(), error_value);
            Value::Object(map)
        }
        None => json!({ "error": error_value }),
    }
}

fn forward(entry: &LogEntry) {
    let context = entry.context.as_str();
    let message = entry.message.as_str();
    match entry.level {
        LogLevel::Debug => tracing::debug!(context, data = ?entry.data, "{message}"),
        LogLevel::Info => tracing::info!(context, data = ?entry.data, "{message}"),
        LogLevel::Warn => tracing::warn!(context, data = ?entry.data, "{message}"),
        LogLevel::Error => tracing::error!(context, data = ?entry.data, "{message}"),
        LogLevel::Fatal => tracing::error!(context, fatal = true, data = ?entry.data, "{message}"),
    }
}
