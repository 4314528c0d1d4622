//! Subscriber registry shared by the store, the logger and the error handler.
//!
//! Listeners are called synchronously, in subscription order, outside of any
//! lock held by the owner. A panicking listener is contained and reported;
//! it never reaches the caller that triggered the notification.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

thread_local! {
    static CONTAINED: Cell<usize> = const { Cell::new(0) };
}

struct ContainedScope;

impl ContainedScope {
    fn enter() -> Self {
        CONTAINED.with(|depth| depth.set(depth.get() + 1));
        ContainedScope
    }
}

impl Drop for ContainedScope {
    fn drop(&mut self) {
        CONTAINED.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Run `f` in a scope whose panics are already accounted for. The global
/// panic hook does not report panics raised here.
pub(crate) fn contained<R>(f: impl FnOnce() -> R) -> R {
    let _scope = ContainedScope::enter();
    f()
}

/// [`contained`] plus `catch_unwind`.
pub(crate) fn catch_contained<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
    contained(|| catch_unwind(AssertUnwindSafe(f)))
}

/// Whether the current thread is inside a [`contained`] scope.
pub(crate) fn in_contained_scope() -> bool {
    CONTAINED.with(|depth| depth.get() > 0)
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Table<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

pub struct Listeners<T: ?Sized> {
    table: Arc<Mutex<Table<T>>>,
}

impl<T: ?Sized + 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(Table {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub fn add(&self, listener: Listener<T>) -> Subscription {
        let id = {
            let mut table = lock(&self.table);
            table.next_id += 1;
            let id = table.next_id;
            table.entries.push((id, listener));
            id
        };

        let weak: Weak<Mutex<Table<T>>> = Arc::downgrade(&self.table);
        Subscription::new(move || {
            if let Some(table) = weak.upgrade() {
                lock(&table).entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    pub fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `value` to every listener. Returns how many listeners panicked.
    pub fn emit(&self, value: &T, origin: &'static str) -> usize {
        let snapshot: Vec<Listener<T>> = lock(&self.table)
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut failures = 0;
        for listener in snapshot {
            if let Err(payload) = catch_contained(|| listener(value)) {
                failures += 1;
                tracing::error!(origin, panic = %panic_text(payload.as_ref()), "listener failed");
            }
        }
        failures
    }
}

impl<T: ?Sized + 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort rendering of a panic payload.
pub(crate) fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle returned by every `subscribe` call.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn listeners_run_in_subscription_order() {
        let listeners: Listeners<u32> = Listeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            let _ = listeners.add(Arc::new(move |v: &u32| seen.lock().unwrap().push((tag, *v))));
        }

        listeners.emit(&7, "test");
        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn unsubscribe_removes_only_that_listener() {
        let listeners: Listeners<u32> = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = Arc::clone(&hits);
        let first = listeners.add(Arc::new(move |_: &u32| {
            h1.fetch_add(1, Ordering::SeqCst);
        }));
        let h2 = Arc::clone(&hits);
        let _second = listeners.add(Arc::new(move |_: &u32| {
            h2.fetch_add(10, Ordering::SeqCst);
        }));

        first.unsubscribe();
        listeners.emit(&0, "test");
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn panicking_listener_is_contained() {
        let listeners: Listeners<u32> = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = listeners.add(Arc::new(|_: &u32| panic!("boom")));
        let h = Arc::clone(&hits);
        let _good = listeners.add(Arc::new(move |_: &u32| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(listeners.emit(&1, "test"), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn contained_scope_nests_and_unwinds() {
        assert!(!in_contained_scope());
        contained(|| {
            contained(|| assert!(in_contained_scope()));
            assert!(in_contained_scope());
        });
        assert!(!in_contained_scope());

        let caught = catch_contained(|| {
            assert!(in_contained_scope());
            panic!("inside");
        });
        assert!(caught.is_err());
        assert!(!in_contained_scope());
    }
}
