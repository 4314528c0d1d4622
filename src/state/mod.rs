//! Centralized application state.

mod app_state;
mod cache;
mod store;

pub use app_state::{keys, AppState, StateUpdate};
pub use cache::{CacheEntry, Clock, ManualClock, SystemClock, TtlCache};
pub use store::{Middleware, Store, DEFAULT_NOTIFICATION_DURATION};
