//! In-memory backend for demo mode and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use clean_quarter_types::{AuthSession, User};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    tables, AuthBackend, BackendError, DataBackend, FileUpload, Filter, Query, StorageBackend,
};
use crate::demo::{DemoDataset, DEMO_EMAIL, DEMO_PASSWORD};
use crate::listeners::lock;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    session: Option<User>,
    tables: HashMap<String, Vec<Value>>,
    objects: HashMap<(String, String), FileUpload>,
}

/// Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    offline: Arc<AtomicBool>,
    base_url: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            offline: Arc::new(AtomicBool::new(false)),
            base_url: "http://localhost:54321".to_string(),
        }
    }

    /// Seeded with the demo account and the demo tables.
    pub fn demo(dataset: &DemoDataset) -> Self {
        let backend = Self::new();
        backend.add_account(DEMO_EMAIL, DEMO_PASSWORD, dataset.user.clone());
        backend.seed(
            tables::PROFILES,
            vec![serde_json::json!({
                "id": dataset.user.id,
                "username": dataset.user.username,
                "role": "admin",
                "points_balance": dataset.user.points_balance.unwrap_or_default(),
                "neighborhood": dataset.user.neighborhood,
            })],
        );
        backend.seed(tables::CAMPAIGNS, to_rows(&dataset.campaigns));
        backend.seed(tables::PARTICIPATIONS, to_rows(&dataset.participations));
        backend.seed(tables::REWARDS, to_rows(&dataset.rewards));
        backend.seed(tables::TRANSACTIONS, to_rows(&dataset.transactions));
        tracing::info!("memory backend seeded with demo data");
        backend
    }

    pub fn add_account(&self, email: &str, password: &str, user: User) {
        lock(&self.state).accounts.insert(
            email.to_lowercase(),
            Account {
                user,
                password: password.to_string(),
            },
        );
    }

    /// Replace the contents of `table`.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        lock(&self.state).tables.insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        lock(&self.state).tables.get(table).cloned().unwrap_or_default()
    }

    pub fn has_object(&self, bucket: &str, path: &str) -> bool {
        lock(&self.state)
            .objects
            .contains_key(&(bucket.to_string(), path.to_string()))
    }

    /// Simulate losing the connection: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable {
                message: "Failed to fetch".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn to_rows<T: serde::Serialize>(items: &[T]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect()
}

fn session_for(user: &User) -> AuthSession {
    AuthSession {
        user: user.clone(),
        access_token: Some(Uuid::new_v4().to_string()),
    }
}

// =============================================================================
// AUTH
// =============================================================================

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        self.check_online()?;
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(BackendError::auth("Email and password are required", 400));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BackendError::auth(
                "Password should be at least 6 characters",
                422,
            ));
        }

        let mut state = lock(&self.state);
        if state.accounts.contains_key(&email) {
            return Err(BackendError::auth("User already registered", 422));
        }

        let mut user = User::with_id(Uuid::new_v4().to_string());
        user.email = Some(email.clone());
        user.created_at = Some(Utc::now());
        state.accounts.insert(
            email,
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        state.session = Some(user.clone());
        tracing::debug!(user_id = %user.id, "account created");
        Ok(session_for(&user))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        self.check_online()?;
        let mut state = lock(&self.state);
        let user = match state.accounts.get(&email.trim().to_lowercase()) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(BackendError::auth("Invalid login credentials", 400)),
        };
        state.session = Some(user.clone());
        Ok(session_for(&user))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.check_online()?;
        lock(&self.state).session = None;
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<User>, BackendError> {
        self.check_online()?;
        Ok(lock(&self.state).session.clone())
    }
}

// =============================================================================
// DATA
// =============================================================================

#[async_trait]
impl DataBackend for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.check_online()?;
        let rows = self.rows(table);
        Ok(query.apply(rows))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        self.check_online()?;
        let Value::Object(mut row) = row else {
            return Err(BackendError::Data {
                message: "row must be a JSON object".to_string(),
                code: Some("22023".to_string()),
            });
        };
        row.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        row.entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let mut state = lock(&self.state);
        let rows = state.tables.entry(table.to_string()).or_default();
        if rows.iter().any(|existing| existing.get("id") == row.get("id")) {
            return Err(BackendError::Data {
                message: format!("duplicate key value violates unique constraint \"{table}_pkey\""),
                code: Some("23505".to_string()),
            });
        }
        let row = Value::Object(row);
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.check_online()?;
        let patch: Map<String, Value> = match patch {
            Value::Object(map) => map,
            _ => return Err(BackendError::data("patch must be a JSON object")),
        };

        let mut state = lock(&self.state);
        let mut updated = Vec::new();
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut() {
                if !filters.iter().all(|f| f.matches(row)) {
                    continue;
                }
                if let Value::Object(fields) = row {
                    for (key, value) in &patch {
                        fields.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, BackendError> {
        self.check_online()?;
        let mut state = lock(&self.state);
        let Some(rows) = state.tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !filters.iter().all(|f| f.matches(row)));
        Ok(before - rows.len())
    }
}

// =============================================================================
// STORAGE
// =============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upload(&self, bucket: &str, path: &str, file: &FileUpload) -> Result<String, BackendError> {
        self.check_online()?;
        let key = (bucket.to_string(), path.to_string());
        let mut state = lock(&self.state);
        if state.objects.contains_key(&key) {
            return Err(BackendError::storage("The resource already exists"));
        }
        state.objects.insert(key, file.clone());
        Ok(path.to_string())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError> {
        self.check_online()?;
        let mut state = lock(&self.state);
        for path in paths {
            state.objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}
