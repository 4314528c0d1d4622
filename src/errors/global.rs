//! Process-wide capture of failures nobody handled.

use std::future::Future;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use futures::FutureExt;
use tokio::task::JoinHandle;

use super::{AppError, ErrorHandler};
use crate::listeners::{contained, in_contained_scope, panic_text};

static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Route every panic nobody catches through `handler` as an UNKNOWN error.
///
/// Reports are handled on a dedicated thread, after the panicking thread has
/// released whatever it held. Panics inside listeners, strategies and the
/// `safe` wrappers are already handled where they are caught and are not
/// reported again. The previous hook still runs.
///
/// Only the first call installs anything; it returns `false` afterwards.
pub fn setup_global_error_handling(handler: Arc<ErrorHandler>) -> bool {
    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        handler.logger().debug("Global error handling already initialized", None);
        return false;
    }

    let (tx, rx) = mpsc::channel::<AppError>();

    let worker = Arc::clone(&handler);
    let spawned = thread::Builder::new()
        .name("clean-quarter-panics".to_string())
        .spawn(move || {
            for error in rx {
                contained(|| {
                    worker.log_fatal("Unhandled error", &error);
                    worker.handle(error);
                });
            }
        });
    if let Err(e) = spawned {
        HOOK_INSTALLED.store(false, Ordering::SeqCst);
        handler.logger().error(
            "Global error handling unavailable",
            Some(serde_json::json!({ "error": e.to_string() })),
        );
        return false;
    }

    let previous = panic::take_hook();
    let tx = std::sync::Mutex::new(tx);
    panic::set_hook(Box::new(move |info| {
        if !in_contained_scope() {
            let mut error = AppError::unknown(panic_text(info.payload()));
            if let Some(location) = info.location() {
                error = error.with_details(serde_json::json!({
                    "file": location.file(),
                    "line": location.line(),
                    "column": location.column(),
                }));
            }
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(error);
            }
        }
        previous(info);
    }));

    handler.logger().info("Global error handling initialized", None);
    true
}

/// Spawn `future`; an `Err` it resolves to, or a panic, is logged and
/// handled instead of being dropped.
pub fn spawn_guarded<T, E, F>(handler: Arc<ErrorHandler>, future: F) -> JoinHandle<Option<T>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    tokio::spawn(async move {
        let mut guarded = std::pin::pin!(panic::AssertUnwindSafe(future).catch_unwind());
        let outcome =
            futures::future::poll_fn(|cx| contained(|| guarded.as_mut().poll(cx))).await;
        let error: AppError = match outcome {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e.into(),
            Err(payload) => AppError::unknown(panic_text(payload.as_ref())),
        };
        handler.log_fatal("Unhandled promise rejection", &error);
        handler.handle(error);
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::errors::ErrorKind;
    use crate::logging::{LogLevel, Logger};
    use crate::navigation::TracingNavigator;
    use crate::state::Store;

    fn handler() -> Arc<ErrorHandler> {
        Arc::new(ErrorHandler::new(
            Store::new(StoreConfig::default()),
            Logger::new(LogLevel::Debug, 100),
            Arc::new(TracingNavigator),
        ))
    }

    #[tokio::test]
    async fn guarded_task_passes_values_through() {
        let handler = handler();
        let value = spawn_guarded(Arc::clone(&handler), async { Ok::<_, AppError>(42) })
            .await
            .unwrap();
        assert_eq!(value, Some(42));
        assert!(handler.all_errors().is_empty());
    }

    #[tokio::test]
    async fn guarded_task_reports_rejections() {
        let handler = handler();
        let value = spawn_guarded(Arc::clone(&handler), async {
            Err::<(), _>(AppError::new("socket closed", ErrorKind::Network))
        })
        .await
        .unwrap();

        assert_eq!(value, None);
        let records = handler.all_errors();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context, "NETWORK_ERROR");
        assert!(handler
            .logger()
            .logs(Some(LogLevel::Fatal))
            .iter()
            .any(|e| e.message == "Unhandled promise rejection"));
    }
}
