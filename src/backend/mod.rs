//! Backend-as-a-service seams
//!
//! The hosted backend offers three capabilities: auth, table rows and object
//! storage. Each is a trait so services can run against the hosted client,
//! the in-memory [`MemoryBackend`] (demo mode, tests) or anything else.

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;
use clean_quarter_types::{AuthSession, User};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryBackend;

pub const CAMPAIGN_PHOTOS_BUCKET: &str = "campaign-photos";

pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const CAMPAIGNS: &str = "campaigns";
    pub const PARTICIPATIONS: &str = "participations";
    pub const REWARDS: &str = "rewards";
    pub const TRANSACTIONS: &str = "transactions";
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendError {
    #[error("{message}")]
    Auth { message: String, status: Option<u16> },

    #[error("{message}")]
    Data { message: String, code: Option<String> },

    #[error("{message}")]
    Storage { message: String },

    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
}

impl BackendError {
    pub fn auth(message: impl Into<String>, status: u16) -> Self {
        BackendError::Auth {
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        BackendError::Data {
            message: message.into(),
            code: None,
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        BackendError::Storage {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            BackendError::Auth { message, .. }
            | BackendError::Data { message, .. }
            | BackendError::Storage { message }
            | BackendError::Unavailable { message } => message,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, BackendError::Auth { .. })
    }
}

// =============================================================================
// QUERIES
// =============================================================================

/// Equality match on one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(&self.column) == Some(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Filter, order and truncate `rows` the way the hosted backend would.
    pub fn apply(&self, rows: impl IntoIterator<Item = Value>) -> Vec<Value> {
        let mut selected: Vec<Value> = rows.into_iter().filter(|row| self.matches(row)).collect();
        if let Some(order) = &self.order {
            selected.sort_by(|a, b| {
                let ord = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Numbers numerically, strings lexically, missing values first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// File handed to object storage.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

// =============================================================================
// TRAITS
// =============================================================================

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// The signed-in user, if any.
    async fn get_user(&self) -> Result<Option<User>, BackendError>;
}

#[async_trait]
pub trait DataBackend: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError>;

    /// Shallow-merge `patch` into matching rows and return them.
    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, BackendError>;

    /// Returns the number of deleted rows.
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, BackendError>;
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `file` at `path` in `bucket`; returns the stored path.
    async fn upload(&self, bucket: &str, path: &str, file: &FileUpload) -> Result<String, BackendError>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// All three capabilities behind one handle.
pub trait Backend: AuthBackend + DataBackend + StorageBackend {}

impl<T: AuthBackend + DataBackend + StorageBackend> Backend for T {}
