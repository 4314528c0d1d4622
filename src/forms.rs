//! Form state and cached reads for page controllers.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use clean_quarter_types::NotificationKind;
use serde_json::{Map, Value};

use crate::api::{ApiClient, ApiError};
use crate::errors::AppError;
use crate::state::{Store, DEFAULT_NOTIFICATION_DURATION};
use crate::validation::{validate_form, validate_value, FieldOutcome, Schema};

pub const DEFAULT_FETCH_TTL: u64 = 300;

/// What a page needs to render one input.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldView {
    pub value: Value,
    /// Only present once the field has been touched.
    pub error: Option<String>,
}

/// Values, errors and touch state of one form, validated against a schema.
#[derive(Debug, Clone)]
pub struct FormState {
    schema: Schema,
    initial: Map<String, Value>,
    values: Map<String, Value>,
    errors: BTreeMap<String, String>,
    touched: BTreeSet<String>,
    dirty: bool,
    submitting: bool,
}

impl FormState {
    /// `initial` should be a JSON object; anything else starts empty.
    pub fn new(initial: Value, schema: Schema) -> Self {
        let initial = match initial {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        Self {
            schema,
            values: initial.clone(),
            initial,
            errors: BTreeMap::new(),
            touched: BTreeSet::new(),
            dirty: false,
            submitting: false,
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Update a value and re-validate that field right away.
    pub fn set_value(&mut self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        if let Some(field_rules) = self.schema.rules_for(field) {
            match validate_value(&value, field_rules) {
                FieldOutcome::Valid => {
                    self.errors.remove(field);
                }
                FieldOutcome::Invalid(message) => {
                    self.errors.insert(field.to_string(), message);
                }
            }
        }
        self.values.insert(field.to_string(), value);
        self.dirty = true;
    }

    pub fn set_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.insert(field.to_string(), message.into());
    }

    pub fn set_touched(&mut self, field: &str, touched: bool) {
        if touched {
            self.touched.insert(field.to_string());
        } else {
            self.touched.remove(field);
        }
    }

    pub fn field(&self, name: &str) -> FieldView {
        FieldView {
            value: self
                .values
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::String(String::new())),
            error: self
                .touched
                .contains(name)
                .then(|| self.errors.get(name).cloned())
                .flatten(),
        }
    }

    pub fn reset(&mut self) {
        self.values = self.initial.clone();
        self.errors.clear();
        self.touched.clear();
        self.dirty = false;
        self.submitting = false;
    }

    /// Validate everything, then run `on_submit` with the values.
    ///
    /// Outcomes are reported through the store: a notification on invalid
    /// input or success, an error record when `on_submit` fails.
    pub async fn submit<F, Fut, E>(&mut self, store: &Store, on_submit: F) -> bool
    where
        F: FnOnce(Map<String, Value>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Into<AppError>,
    {
        let result = validate_form(&Value::Object(self.values.clone()), &self.schema);
        self.errors = result.errors;
        if !self.errors.is_empty() {
            store.add_notification(
                "Please fix errors before submitting",
                NotificationKind::Error,
                DEFAULT_NOTIFICATION_DURATION,
            );
            return false;
        }

        self.submitting = true;
        let outcome = on_submit(self.values.clone()).await;
        self.submitting = false;

        match outcome {
            Ok(()) => {
                store.add_notification(
                    "Form submitted successfully",
                    NotificationKind::Success,
                    DEFAULT_NOTIFICATION_DURATION,
                );
                true
            }
            Err(e) => {
                let error: AppError = e.into();
                let message = if error.message.is_empty() {
                    "Form submission failed".to_string()
                } else {
                    error.message
                };
                store.add_error(message, "form");
                false
            }
        }
    }
}

pub fn cache_key(path: &str) -> String {
    format!("fetch_{path}")
}

/// GET `path`, served from the store cache while fresh.
pub async fn fetch_cached(
    api: &ApiClient,
    store: &Store,
    path: &str,
    ttl_seconds: u64,
) -> Result<Value, ApiError> {
    let key = cache_key(path);
    if let Some(hit) = store.get_cache(&key) {
        return Ok(hit);
    }
    match api.get(path).await {
        Ok(value) => {
            store.set_cache(&key, value.clone(), ttl_seconds);
            Ok(value)
        }
        Err(e) => {
            store.add_error(e.message.clone(), "fetch");
            Err(e)
        }
    }
}
