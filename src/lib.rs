//! Clean Quarter client core
//!
//! The application layer behind the Clean Quarter cleanup-campaign app:
//! registration and login, campaign browsing, points and rewards. The heavy
//! lifting (auth, rows, object storage) lives in a hosted backend; this crate
//! owns everything between the page and that backend.
//!
//! ## Layout
//!
//! ```text
//!   page controllers
//!        │
//!        ▼
//!   validation ──► services (auth / campaigns / photos) ──► backend traits
//!        │                 │
//!        ▼                 ▼
//!   state::Store ◄──── errors::ErrorHandler ────► logging::Logger
//!        ▲
//!        │
//!   api::ApiClient (interceptors, retry with backoff)
//! ```
//!
//! Everything hangs off an explicitly constructed [`context::AppContext`];
//! there are no process-wide singletons.

pub mod api;
pub mod backend;
pub mod config;
pub mod context;
pub mod demo;
pub mod errors;
pub mod forms;
pub mod helpers;
pub mod i18n;
pub mod listeners;
pub mod logging;
pub mod navigation;
pub mod offline;
pub mod persistence;
pub mod services;
pub mod state;
pub mod validation;

pub use clean_quarter_types as types;

pub use api::{ApiClient, ApiError};
pub use config::AppConfig;
pub use context::AppContext;
pub use errors::{AppError, ErrorHandler, ErrorKind};
pub use logging::{LogLevel, Logger};
pub use state::Store;
pub use validation::{ValidationResult, Validator};
