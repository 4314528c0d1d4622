//! The application store: one state record, middleware, subscribers,
//! transient notifications, a bounded error list and a TTL cache.
//!
//! Every committed change notifies all subscribers synchronously, in
//! subscription order, with a full snapshot. Redundant updates are not
//! suppressed. Nothing in here returns an error to the caller; cosmetic
//! failures degrade to a log line.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use clean_quarter_types::{ErrorRecord, Notification, NotificationKind};
use serde_json::{json, Value};

use super::app_state::{keys, AppState, StateUpdate};
use super::cache::{Clock, SystemClock, TtlCache};
use crate::config::StoreConfig;
use crate::listeners::{lock, Listeners, Subscription};

/// Default lifetime of a toast.
pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(3000);

/// Rewrites a pending update. `None` keeps the update as it is.
pub type Middleware = Arc<dyn Fn(&AppState, &StateUpdate) -> Option<StateUpdate> + Send + Sync>;

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    config: StoreConfig,
    state: Mutex<AppState>,
    cache: Mutex<TtlCache>,
    middlewares: RwLock<Vec<Middleware>>,
    listeners: Listeners<AppState>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        let state = AppState::initial(&config.default_language);
        tracing::debug!(language = %config.default_language, "store initialized");
        Self {
            inner: Arc::new(StoreInner {
                config,
                state: Mutex::new(state),
                cache: Mutex::new(TtlCache::new()),
                middlewares: RwLock::new(Vec::new()),
                listeners: Listeners::new(),
                next_id: AtomicU64::new(1),
                clock,
            }),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn snapshot(&self) -> AppState {
        lock(&self.inner.state).clone()
    }

    /// Dot-path lookup; `None` for any missing segment.
    pub fn get(&self, path: &str) -> Option<Value> {
        lock(&self.inner.state).get(path).cloned()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn set_state(&self, update: StateUpdate) {
        let middlewares: Vec<Middleware> = self
            .inner
            .middlewares
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        let mut update = update;
        if !middlewares.is_empty() {
            let current = self.snapshot();
            for middleware in middlewares {
                if let Some(rewritten) = middleware(&current, &update) {
                    update = rewritten;
                }
            }
        }

        lock(&self.inner.state).apply(update);
        self.notify();
    }

    /// Shallow merge of a `json!({...})` object.
    pub fn merge(&self, partial: Value) {
        self.set_state(StateUpdate::merge(partial));
    }

    pub fn set_path(&self, path: &str, value: impl Into<Value>) {
        self.set_state(StateUpdate::path(path, value));
    }

    pub fn subscribe(&self, listener: impl Fn(&AppState) + Send + Sync + 'static) -> Subscription {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn use_middleware(
        &self,
        middleware: impl Fn(&AppState, &StateUpdate) -> Option<StateUpdate> + Send + Sync + 'static,
    ) {
        self.inner
            .middlewares
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Arc::new(middleware));
    }

    /// Restore the initial state, keeping the active language.
    pub fn reset(&self) {
        {
            let mut state = lock(&self.inner.state);
            let language = state.current_language().to_string();
            *state = AppState::initial(if language.is_empty() {
                &self.inner.config.default_language
            } else {
                &language
            });
        }
        lock(&self.inner.cache).clear();
        self.notify();
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        tracing::trace!(listeners = self.inner.listeners.len(), "state updated");
        self.inner.listeners.emit(&snapshot, "store");
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Append a toast. A non-zero `duration` removes it again after that
    /// delay, with a second notification; overlapping timers are independent.
    pub fn add_notification(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        duration: Duration,
    ) -> u64 {
        let notification = Notification {
            id: self.next_id(),
            message: message.into(),
            kind,
            timestamp: self.inner.clock.now(),
        };
        let id = notification.id;

        lock(&self.inner.state)
            .list_mut(keys::NOTIFICATIONS)
            .push(json!(notification));
        self.notify();

        if !duration.is_zero() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
                    runtime.spawn(async move {
                        tokio::time::sleep(duration).await;
                        if let Some(inner) = weak.upgrade() {
                            Store { inner }.remove_notification(id);
                        }
                    });
                }
                Err(_) => {
                    tracing::warn!(id, "no async runtime, notification will not auto-dismiss");
                }
            }
        }
        id
    }

    /// Remove a toast by id. Returns whether it was still present.
    pub fn dismiss_notification(&self, id: u64) -> bool {
        self.remove_notification(id)
    }

    fn remove_notification(&self, id: u64) -> bool {
        let removed = {
            let mut state = lock(&self.inner.state);
            let list = state.list_mut(keys::NOTIFICATIONS);
            let before = list.len();
            list.retain(|n| n.get("id").and_then(Value::as_u64) != Some(id));
            before != list.len()
        };
        self.notify();
        removed
    }

    // =========================================================================
    // Errors
    // =========================================================================

    /// Record an error. The list keeps at most `max_errors` entries.
    pub fn add_error(&self, message: impl Into<String>, context: impl Into<String>) -> u64 {
        let record = ErrorRecord {
            id: self.next_id(),
            message: message.into(),
            context: context.into(),
            timestamp: self.inner.clock.now(),
        };
        let id = record.id;

        {
            let mut state = lock(&self.inner.state);
            let list = state.list_mut(keys::ERRORS);
            list.push(json!(record));
            let max = self.inner.config.max_errors.max(1);
            if list.len() > max {
                let overflow = list.len() - max;
                list.drain(..overflow);
            }
        }
        self.notify();
        id
    }

    pub fn clear_errors(&self) {
        lock(&self.inner.state).list_mut(keys::ERRORS).clear();
        self.notify();
    }

    // =========================================================================
    // Cache
    // =========================================================================

    /// `ttl_seconds == 0` never expires.
    pub fn set_cache(&self, key: &str, value: Value, ttl_seconds: u64) {
        let now = self.inner.clock.now();
        lock(&self.inner.cache).insert(key, value, ttl_seconds, now);
    }

    pub fn get_cache(&self, key: &str) -> Option<Value> {
        let now = self.inner.clock.now();
        lock(&self.inner.cache).get(key, now)
    }

    /// Drop one key, or everything when `key` is `None`.
    pub fn clear_cache(&self, key: Option<&str>) {
        let mut cache = lock(&self.inner.cache);
        match key {
            Some(key) => {
                cache.remove(key);
            }
            None => cache.clear(),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("listeners", &self.inner.listeners.len())
            .finish_non_exhaustive()
    }
}
