use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use clean_quarter_types::{ErrorRecord, NotificationKind};
use futures::FutureExt;
use serde_json::json;

use super::{AppError, ErrorKind};
use crate::listeners::{catch_contained, contained, panic_text, Listeners, Subscription};
use crate::logging::{LogLevel, Logger};
use crate::navigation::{Navigator, LOGIN_PAGE};
use crate::state::{Store, DEFAULT_NOTIFICATION_DURATION};

/// Recovery action for one error kind.
pub type Strategy = Arc<dyn Fn(&AppError) + Send + Sync>;

pub struct ErrorHandler {
    store: Store,
    logger: Logger,
    navigator: Arc<dyn Navigator>,
    strategies: RwLock<HashMap<ErrorKind, Strategy>>,
    listeners: Listeners<AppError>,
}

impl ErrorHandler {
    /// Handler with the default strategy for every kind.
    pub fn new(store: Store, logger: Logger, navigator: Arc<dyn Navigator>) -> Self {
        let handler = Self {
            store,
            logger,
            navigator,
            strategies: RwLock::new(HashMap::new()),
            listeners: Listeners::new(),
        };
        for kind in ErrorKind::ALL {
            handler.register_strategy(kind, handler.default_strategy(kind));
        }
        handler
    }

    fn default_strategy(&self, kind: ErrorKind) -> impl Fn(&AppError) + Send + Sync + 'static {
        let store = self.store.clone();
        let logger = self.logger.clone();
        let navigator = Arc::clone(&self.navigator);

        move |error: &AppError| {
            let toast = match kind {
                ErrorKind::Network => {
                    "Network connection failed. Please check your internet.".to_string()
                }
                ErrorKind::Auth => "Authentication failed. Please login again.".to_string(),
                ErrorKind::Validation => format!("Validation error: {}", error.message),
                ErrorKind::Api => error
                    .details
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("API request failed")
                    .to_string(),
                ErrorKind::Permission => {
                    "You do not have permission to perform this action.".to_string()
                }
                ErrorKind::NotFound => "Resource not found.".to_string(),
                ErrorKind::Server => "Server error. Please try again later.".to_string(),
                ErrorKind::Unknown => "An unexpected error occurred.".to_string(),
            };
            store.add_notification(toast, NotificationKind::Error, DEFAULT_NOTIFICATION_DURATION);

            let (label, data) = match kind {
                ErrorKind::Network => ("Network error", error.to_json()),
                ErrorKind::Auth => ("Auth error", error.to_json()),
                ErrorKind::Validation => ("Validation error", error.details.clone().unwrap_or_default()),
                ErrorKind::Api => ("API error", error.to_json()),
                ErrorKind::Permission => ("Permission denied", error.to_json()),
                ErrorKind::NotFound => ("Resource not found", error.details.clone().unwrap_or_default()),
                ErrorKind::Server => ("Server error", error.to_json()),
                ErrorKind::Unknown => ("Unknown error", error.to_json()),
            };
            logger.log(kind.severity(), label, Some(data));

            if kind == ErrorKind::Auth {
                navigator.navigate(LOGIN_PAGE);
            }
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Replace the strategy for `kind`.
    pub fn register_strategy(&self, kind: ErrorKind, strategy: impl Fn(&AppError) + Send + Sync + 'static) {
        self.strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Arc::new(strategy));
    }

    pub fn subscribe(&self, listener: impl Fn(&AppError) + Send + Sync + 'static) -> Subscription {
        self.listeners.add(Arc::new(listener))
    }

    // =========================================================================
    // Handling
    // =========================================================================

    /// Normalize, record, broadcast and recover. Never fails.
    pub fn handle(&self, error: impl Into<AppError>) -> AppError {
        let error: AppError = error.into();

        self.store.add_error(error.message.clone(), error.kind.code());

        let failures = self.listeners.emit(&error, "error-handler");
        if failures > 0 {
            self.logger
                .error("Error listener failed", Some(json!({ "failures": failures })));
        }

        let strategy = {
            let strategies = self.strategies.read().unwrap_or_else(PoisonError::into_inner);
            strategies
                .get(&error.kind)
                .or_else(|| strategies.get(&ErrorKind::Unknown))
                .cloned()
        };
        if let Some(strategy) = strategy {
            if let Err(payload) = catch_contained(|| strategy(&error)) {
                self.logger.error(
                    "Error strategy failed",
                    Some(json!({ "panic": panic_text(payload.as_ref()), "kind": error.kind })),
                );
            }
        }

        error
    }

    /// Await `operation`; a failure is logged, handled and returned.
    pub async fn handle_async<T, E, F>(&self, operation: F, context: &str) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<AppError>,
    {
        match operation.await {
            Ok(value) => Ok(value),
            Err(e) => {
                let error: AppError = e.into();
                self.logger
                    .error(&format!("Error in {context}"), Some(error.to_json()));
                Err(self.handle(error))
            }
        }
    }

    /// Run `operation` up to `max_attempts` times, sleeping
    /// `delay * 2^(attempt - 1)` between attempts. Only the final failure is
    /// handled.
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut operation: F,
        max_attempts: u32,
        delay: Duration,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<AppError>,
    {
        let mut last = AppError::unknown("operation was never attempted");

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let error: AppError = e.into();
                    self.logger.warn(
                        &format!("Attempt {attempt}/{max_attempts} failed, retrying..."),
                        Some(json!({ "error": error.message })),
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(delay.saturating_mul(2u32.saturating_pow(attempt - 1))).await;
                    }
                    last = error;
                }
            }
        }

        Err(self.handle(last))
    }

    /// Run `f`, turning an error or a panic into a handled error and `None`.
    pub fn safe<T, E>(&self, f: impl FnOnce() -> Result<T, E>) -> Option<T>
    where
        E: Into<AppError>,
    {
        match catch_contained(f) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.handle(e);
                None
            }
            Err(payload) => {
                self.handle(AppError::unknown(panic_text(payload.as_ref())));
                None
            }
        }
    }

    /// Async counterpart of [`ErrorHandler::safe`].
    pub async fn safe_async<T, E, F>(&self, operation: F) -> Option<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<AppError>,
    {
        let mut guarded = std::pin::pin!(AssertUnwindSafe(operation).catch_unwind());
        let outcome = futures::future::poll_fn(|cx| contained(|| guarded.as_mut().poll(cx))).await;
        match outcome {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                self.handle(e);
                None
            }
            Err(payload) => {
                self.handle(AppError::unknown(panic_text(payload.as_ref())));
                None
            }
        }
    }

    /// Field errors for validation failures; empty otherwise.
    pub fn form_errors(&self, error: &AppError) -> BTreeMap<String, String> {
        error.field_errors()
    }

    pub fn all_errors(&self) -> Vec<ErrorRecord> {
        self.store.snapshot().errors()
    }

    pub fn clear_errors(&self) {
        self.store.clear_errors();
    }

    pub(crate) fn log_fatal(&self, label: &str, error: &AppError) {
        self.logger.log(LogLevel::Fatal, label, Some(error.to_json()));
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::navigation::RecordingNavigator;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Fixture {
        handler: ErrorHandler,
        store: Store,
        logger: Logger,
        nav: Arc<RecordingNavigator>,
    }

    fn fixture() -> Fixture {
        let store = Store::new(StoreConfig::default());
        let logger = Logger::new(LogLevel::Debug, 100);
        let nav = Arc::new(RecordingNavigator::new());
        let handler = ErrorHandler::new(store.clone(), logger.clone(), nav.clone());
        Fixture {
            handler,
            store,
            logger,
            nav,
        }
    }

    #[test]
    fn handle_records_notifies_and_recovers() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = f.handler.subscribe(move |e: &AppError| sink.lock().unwrap().push(e.kind));

        let err = f.handler.handle(AppError::new("down", ErrorKind::Network));
        assert_eq!(err.kind, ErrorKind::Network);

        let records = f.handler.all_errors();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context, "NETWORK_ERROR");
        assert_eq!(*seen.lock().unwrap(), vec![ErrorKind::Network]);

        let toasts = f.store.snapshot().notifications();
        assert_eq!(toasts[0].message, "Network connection failed. Please check your internet.");
        assert_eq!(toasts[0].kind, NotificationKind::Error);
        assert_eq!(f.logger.logs(Some(LogLevel::Error)).len(), 1);
    }

    #[test]
    fn auth_strategy_redirects_to_login() {
        let f = fixture();
        f.handler.handle(AppError::new("expired", ErrorKind::Auth));
        assert_eq!(f.nav.visited(), vec![LOGIN_PAGE]);
        assert_eq!(f.logger.logs(Some(LogLevel::Warn))[0].message, "Auth error");
    }

    #[test]
    fn api_strategy_prefers_detail_message() {
        let f = fixture();
        f.handler.handle(
            AppError::new("x", ErrorKind::Api).with_details(json!({"message": "Quota exceeded"})),
        );
        f.handler.handle(AppError::new("y", ErrorKind::Api));
        let messages: Vec<_> = f
            .store
            .snapshot()
            .notifications()
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(messages, vec!["Quota exceeded", "API request failed"]);
    }

    #[test]
    fn plain_values_become_unknown() {
        let f = fixture();
        let err = f.handler.handle("something odd");
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(f.logger.logs(Some(LogLevel::Fatal)).len(), 1);
    }

    #[test]
    fn custom_strategy_replaces_default() {
        let f = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        f.handler.register_strategy(ErrorKind::NotFound, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        f.handler.handle(AppError::new("gone", ErrorKind::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(f.store.snapshot().notifications().is_empty());
    }

    #[test]
    fn panicking_listener_and_strategy_are_contained() {
        let f = fixture();
        let _bad = f.handler.subscribe(|_: &AppError| panic!("listener bug"));
        f.handler
            .register_strategy(ErrorKind::Server, |_| panic!("strategy bug"));

        let err = f.handler.handle(AppError::new("500", ErrorKind::Server));
        assert_eq!(err.kind, ErrorKind::Server);

        let messages: Vec<_> = f
            .logger
            .logs(Some(LogLevel::Error))
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert!(messages.contains(&"Error listener failed".to_string()));
        assert!(messages.contains(&"Error strategy failed".to_string()));
    }

    #[test]
    fn safe_catches_errors_and_panics() {
        let f = fixture();
        assert_eq!(f.handler.safe(|| Ok::<_, AppError>(5)), Some(5));
        assert_eq!(f.handler.safe(|| Err::<u8, _>("bad input")), None);
        assert_eq!(f.handler.safe::<u8, AppError>(|| panic!("kaboom")), None);

        let records = f.handler.all_errors();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].message, "kaboom");

        f.handler.clear_errors();
        assert!(f.handler.all_errors().is_empty());
    }

    #[tokio::test]
    async fn handle_async_returns_normalized_error() {
        let f = fixture();
        let result: Result<u8, AppError> = f
            .handler
            .handle_async(async { Err::<u8, _>(AppError::new("nope", ErrorKind::Permission)) }, "loading rewards")
            .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Permission);
        assert!(f
            .logger
            .logs(Some(LogLevel::Error))
            .iter()
            .any(|e| e.message == "Error in loading rewards"));
    }

    #[tokio::test]
    async fn safe_async_returns_none_on_failure() {
        let f = fixture();
        assert_eq!(f.handler.safe_async(async { Ok::<_, AppError>(1) }).await, Some(1));
        assert_eq!(f.handler.safe_async(async { Err::<u8, _>("x") }).await, None);
        assert_eq!(f.handler.all_errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_backs_off_and_handles_only_the_last_failure() {
        let f = fixture();
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<u8, AppError> = f
            .handler
            .retry(
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err::<u8, _>(AppError::new("flaky", ErrorKind::Server)) }
                },
                3,
                Duration::from_millis(100),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(300));
        assert_eq!(f.handler.all_errors().len(), 1);
        assert_eq!(f.logger.logs(Some(LogLevel::Warn)).len(), 3);
    }

    #[tokio::test]
    async fn retry_succeeds_after_failures() {
        let f = fixture();
        let attempts = AtomicU32::new(0);
        let value = f
            .handler
            .retry(
                || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(AppError::unknown("not yet"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                3,
                Duration::from_millis(1),
            )
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert!(f.handler.all_errors().is_empty());
    }

    #[test]
    fn form_errors_only_for_validation() {
        let f = fixture();
        let err = AppError::new("bad", ErrorKind::Validation)
            .with_details(json!({"title": "Полето е задължително"}));
        assert_eq!(f.handler.form_errors(&err)["title"], "Полето е задължително");
        assert!(f
            .handler
            .form_errors(&AppError::new("bad", ErrorKind::Api))
            .is_empty());
    }
}
