//! User-facing alert dialogs.

use std::sync::Mutex;

use clean_quarter_types::NotificationKind;
use serde::{Deserialize, Serialize};

use crate::listeners::lock;
use crate::state::{Store, DEFAULT_NOTIFICATION_DURATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Success,
    Error,
    Info,
    Warning,
}

impl From<AlertKind> for NotificationKind {
    fn from(kind: AlertKind) -> Self {
        match kind {
            AlertKind::Success => NotificationKind::Success,
            AlertKind::Error => NotificationKind::Error,
            AlertKind::Info => NotificationKind::Info,
            AlertKind::Warning => NotificationKind::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub title: String,
    pub text: String,
}

impl Alert {
    pub fn new(kind: AlertKind, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            text: text.into(),
        }
    }

    pub fn success(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(AlertKind::Success, title, text)
    }

    pub fn error(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(AlertKind::Error, title, text)
    }
}

pub trait Alerts: Send + Sync {
    fn show(&self, alert: Alert);
}

/// Shows alerts as store notifications (`"<title>: <text>"`).
#[derive(Debug, Clone)]
pub struct StoreAlerts {
    store: Store,
}

impl StoreAlerts {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl Alerts for StoreAlerts {
    fn show(&self, alert: Alert) {
        let message = if alert.text.is_empty() {
            alert.title
        } else {
            format!("{}: {}", alert.title, alert.text)
        };
        self.store
            .add_notification(message, alert.kind.into(), DEFAULT_NOTIFICATION_DURATION);
    }
}

/// Keeps every alert; handy where no UI exists.
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    shown: Mutex<Vec<Alert>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<Alert> {
        lock(&self.shown).clone()
    }

    pub fn titles(&self) -> Vec<String> {
        lock(&self.shown).iter().map(|a| a.title.clone()).collect()
    }
}

impl Alerts for RecordingAlerts {
    fn show(&self, alert: Alert) {
        tracing::debug!(title = %alert.title, kind = ?alert.kind, "alert");
        lock(&self.shown).push(alert);
    }
}
