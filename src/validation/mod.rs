//! Form validation
//!
//! A schema maps field names to ordered rule lists. Each field reports at
//! most one message: the first rule that rejects it. Empty fields only run
//! their `required` rule, so optional fields never produce format errors.

pub mod rules;
pub mod schema;

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use rules::RuleFn;
pub use schema::{ResolvedRule, Rule, RuleRegistry, Schema, SchemaRegistry, REQUIRED};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown validation rule: {0}")]
    UnknownRule(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    Valid,
    Invalid(String),
}

impl FieldOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, FieldOutcome::Valid)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            FieldOutcome::Valid => None,
            FieldOutcome::Invalid(message) => Some(message),
        }
    }
}

/// `is_valid` is always `errors.is_empty()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: BTreeMap<String, String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self::from_errors(BTreeMap::new())
    }

    pub fn from_errors(errors: BTreeMap<String, String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Run rules in order and stop at the first rejection.
pub fn validate_field(value: &Value, field_rules: &[ResolvedRule]) -> FieldOutcome {
    field_rules
        .iter()
        .find_map(|rule| (rule.check)(value))
        .map_or(FieldOutcome::Valid, FieldOutcome::Invalid)
}

/// Form semantics for one value: an empty value only runs `required`.
pub fn validate_value(value: &Value, field_rules: &[ResolvedRule]) -> FieldOutcome {
    if rules::is_empty_value(value) {
        field_rules
            .iter()
            .find(|rule| rule.is_required())
            .and_then(|rule| (rule.check)(value))
            .map_or(FieldOutcome::Valid, FieldOutcome::Invalid)
    } else {
        validate_field(value, field_rules)
    }
}

pub fn validate_form(data: &Value, schema: &Schema) -> ValidationResult {
    let mut errors = BTreeMap::new();
    for (field, field_rules) in schema.fields() {
        let value = data.get(field).unwrap_or(&Value::Null);
        if let FieldOutcome::Invalid(message) = validate_value(value, field_rules) {
            errors.insert(field.to_string(), message);
        }
    }
    ValidationResult::from_errors(errors)
}

/// Best human-readable message in an API error payload.
pub fn error_message(payload: &Value) -> String {
    let text_at = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    text_at(payload.get("message"))
        .or_else(|| text_at(payload.get("error").and_then(|e| e.get("message"))))
        .or_else(|| text_at(payload.get("data").and_then(|d| d.get("message"))))
        .unwrap_or_else(|| "An error occurred".to_string())
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Rule and schema registries with runtime registration.
#[derive(Debug)]
pub struct Validator {
    rules: RwLock<RuleRegistry>,
    schemas: RwLock<SchemaRegistry>,
}

impl Validator {
    pub fn new() -> Self {
        let rules = RuleRegistry::builtin();
        let schemas = SchemaRegistry::builtin(&rules).unwrap_or_else(|e| {
            tracing::error!(error = %e, "built-in schemas failed to resolve");
            SchemaRegistry::default()
        });
        Self {
            rules: RwLock::new(rules),
            schemas: RwLock::new(schemas),
        }
    }

    /// Register or replace a named rule.
    pub fn add_rule(
        &self,
        name: impl Into<String>,
        check: impl Fn(&Value) -> Option<String> + Send + Sync + 'static,
    ) {
        let name = name.into();
        tracing::debug!(rule = %name, "validation rule registered");
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, std::sync::Arc::new(check));
    }

    /// Register or replace a schema. Named rules must already be registered.
    pub fn add_schema<F, S, R>(&self, name: impl Into<String>, fields: F) -> Result<(), ValidationError>
    where
        F: IntoIterator<Item = (S, R)>,
        S: Into<String>,
        R: IntoIterator<Item = Rule>,
    {
        let schema = {
            let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
            Schema::resolve(&rules, fields)?
        };
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, schema);
        Ok(())
    }

    pub fn schema(&self, name: &str) -> Option<Schema> {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// An unknown schema logs an error and validates nothing.
    pub fn validate_with_schema(&self, name: &str, data: &Value) -> ValidationResult {
        match self.schema(name) {
            Some(schema) => validate_form(data, &schema),
            None => {
                tracing::error!(schema = name, "validation schema not found");
                ValidationResult::valid()
            }
        }
    }

    /// Validate one value against rules resolved now. Unknown names are skipped.
    pub fn validate_field(&self, value: &Value, field_rules: &[Rule]) -> FieldOutcome {
        let resolved: Vec<ResolvedRule> = {
            let registry = self.rules.read().unwrap_or_else(PoisonError::into_inner);
            field_rules
                .iter()
                .filter_map(|rule| match registry.resolve(rule) {
                    Ok(resolved) => Some(resolved),
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping rule");
                        None
                    }
                })
                .collect()
        };
        validate_field(value, &resolved)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
