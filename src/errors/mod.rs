//! Application errors and the central error handler
//!
//! Every failure that reaches the UI is normalized into an [`AppError`] with
//! one of eight [`ErrorKind`]s. The [`ErrorHandler`] records it in the store,
//! informs listeners and runs the recovery strategy registered for the kind.

mod global;
mod handler;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::api::{ApiError, RequestFailure, TransportError};
use crate::backend::BackendError;
use crate::logging::LogLevel;
use crate::validation::ValidationResult;

pub use crate::navigation::Navigator;
pub use global::{setup_global_error_handling, spawn_guarded};
pub use handler::{ErrorHandler, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "AUTH_ERROR")]
    Auth,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "API_ERROR")]
    Api,
    #[serde(rename = "PERMISSION_ERROR")]
    Permission,
    #[serde(rename = "NOT_FOUND_ERROR")]
    NotFound,
    #[serde(rename = "SERVER_ERROR")]
    Server,
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Network,
        ErrorKind::Auth,
        ErrorKind::Validation,
        ErrorKind::Api,
        ErrorKind::Permission,
        ErrorKind::NotFound,
        ErrorKind::Server,
        ErrorKind::Unknown,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Auth => "AUTH_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::Api => "API_ERROR",
            ErrorKind::Permission => "PERMISSION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND_ERROR",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Level the default strategy logs at.
    pub fn severity(self) -> LogLevel {
        match self {
            ErrorKind::Network | ErrorKind::Api | ErrorKind::Server => LogLevel::Error,
            ErrorKind::Auth | ErrorKind::Permission => LogLevel::Warn,
            ErrorKind::Validation | ErrorKind::NotFound => LogLevel::Info,
            ErrorKind::Unknown => LogLevel::Fatal,
        }
    }

    /// Status-code classification of an HTTP failure.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Auth,
            403 => ErrorKind::Permission,
            404 => ErrorKind::NotFound,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Api,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// APP ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct AppError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl AppError {
    pub fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(message, ErrorKind::Unknown)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "message": self.message,
            "type": self.kind,
            "details": self.details,
            "timestamp": self.timestamp,
        })
    }

    /// Field → message map carried by validation errors.
    pub fn field_errors(&self) -> BTreeMap<String, String> {
        if self.kind != ErrorKind::Validation {
            return BTreeMap::new();
        }
        self.details
            .as_ref()
            .and_then(Value::as_object)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        let kind = match &err.error {
            RequestFailure::Transport(TransportError::InvalidRequest(_)) => ErrorKind::Api,
            RequestFailure::Transport(_) => ErrorKind::Network,
            RequestFailure::Status { status, .. } => ErrorKind::from_status(*status),
            RequestFailure::Decode(_) | RequestFailure::NoAttempts => ErrorKind::Api,
        };
        Self {
            message: err.message.clone(),
            kind,
            details: serde_json::to_value(&err).ok(),
            timestamp: err.timestamp,
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        let kind = match &err {
            BackendError::Auth { .. } => ErrorKind::Auth,
            BackendError::Unavailable { .. } => ErrorKind::Network,
            BackendError::Data { .. } | BackendError::Storage { .. } => ErrorKind::Api,
        };
        Self::new(err.message(), kind).with_details(json!(err))
    }
}

impl From<ValidationResult> for AppError {
    fn from(result: ValidationResult) -> Self {
        let first = result
            .errors
            .values()
            .next()
            .cloned()
            .unwrap_or_else(|| "invalid input".to_string());
        Self::new(first, ErrorKind::Validation).with_details(json!(result.errors))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::unknown(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        Self::unknown(message)
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        Self::unknown(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Method;

    fn api_error(failure: RequestFailure) -> ApiError {
        ApiError::new(Method::Get, "/x", failure)
    }

    fn status(code: u16) -> RequestFailure {
        RequestFailure::Status {
            status: code,
            message: format!("HTTP {code}"),
            body: json!({}),
        }
    }

    #[test]
    fn kinds_serialize_as_codes() {
        assert_eq!(serde_json::to_value(ErrorKind::NotFound).unwrap(), json!("NOT_FOUND_ERROR"));
        for kind in ErrorKind::ALL {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.code()));
        }
    }

    #[test]
    fn api_errors_are_classified() {
        let cases = [
            (status(401), ErrorKind::Auth),
            (status(403), ErrorKind::Permission),
            (status(404), ErrorKind::NotFound),
            (status(422), ErrorKind::Api),
            (status(503), ErrorKind::Server),
            (RequestFailure::Transport(TransportError::Network("x".into())), ErrorKind::Network),
            (
                RequestFailure::Transport(TransportError::Timeout(std::time::Duration::from_secs(1))),
                ErrorKind::Network,
            ),
            (RequestFailure::Decode("bad".into()), ErrorKind::Api),
        ];
        for (failure, expected) in cases {
            assert_eq!(AppError::from(api_error(failure)).kind, expected);
        }
    }

    #[test]
    fn api_error_details_keep_the_envelope() {
        let err = AppError::from(api_error(status(500)));
        let details = err.details.unwrap();
        assert_eq!(details["type"], "API_ERROR");
        assert_eq!(details["message"], "HTTP 500");
    }

    #[test]
    fn backend_errors_are_classified() {
        let auth = AppError::from(BackendError::auth("Invalid login credentials", 400));
        assert_eq!(auth.kind, ErrorKind::Auth);
        assert_eq!(auth.message, "Invalid login credentials");

        let data = AppError::from(BackendError::data("permission denied for table"));
        assert_eq!(data.kind, ErrorKind::Api);
    }

    #[test]
    fn validation_result_carries_field_map() {
        let mut errors = BTreeMap::new();
        errors.insert("email".to_string(), "Невалиден имейл формат".to_string());
        let err = AppError::from(ValidationResult::from_errors(errors.clone()));
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.field_errors(), errors);
        assert!(AppError::unknown("x").field_errors().is_empty());
    }

    #[test]
    fn to_json_shape() {
        let value = AppError::new("boom", ErrorKind::Server).to_json();
        assert_eq!(value["message"], "boom");
        assert_eq!(value["type"], "SERVER_ERROR");
        assert!(value["details"].is_null());
    }

    #[test]
    fn plain_errors_are_unknown() {
        assert_eq!(AppError::from("oops").kind, ErrorKind::Unknown);
        assert_eq!(AppError::from(anyhow::anyhow!("ctx")).message, "ctx");
    }
}
