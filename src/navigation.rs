//! Page navigation seam.

use std::sync::Mutex;

use crate::listeners::lock;

pub const LOGIN_PAGE: &str = "/index.html";
pub const DASHBOARD_PAGE: &str = "/src/pages/dashboard.html";

pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str);
}

/// Logs the target instead of moving anywhere. Used headless.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, url: &str) {
        tracing::info!(url, "navigate");
    }
}

/// Remembers every navigation, for assertions and simulations.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visited(&self) -> Vec<String> {
        lock(&self.visited).clone()
    }

    pub fn last(&self) -> Option<String> {
        lock(&self.visited).last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &str) {
        tracing::debug!(url, "navigate");
        lock(&self.visited).push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_navigator_keeps_history() {
        let nav = RecordingNavigator::new();
        nav.navigate(LOGIN_PAGE);
        nav.navigate(DASHBOARD_PAGE);
        assert_eq!(nav.visited(), vec![LOGIN_PAGE, DASHBOARD_PAGE]);
        assert_eq!(nav.last().as_deref(), Some(DASHBOARD_PAGE));
    }
}
