//! Retrying JSON client
//!
//! One call = request interceptors, then up to `retries` attempts with
//! exponential backoff (`retry_delay * 2^attempt`, no jitter, no sleep after
//! the last attempt), then response interceptors. A 4xx status is final.
//!
//! The store's `is_loading` flag is raised before the request interceptors
//! run and cleared when the call settles. The flag is shared: with
//! concurrent calls the first to finish clears it.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::interceptors::{ApiResponse, FnInterceptor, RequestInterceptor, ResponseInterceptor};
use super::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use crate::config::ApiClientConfig;
use crate::state::{keys, Store};

pub const API_ERROR: &str = "API_ERROR";

/// Why the last attempt of a call failed.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RequestFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{message}")]
    Status {
        status: u16,
        message: String,
        body: Value,
    },

    #[error("invalid JSON in response: {0}")]
    Decode(String),

    #[error("no attempts configured")]
    NoAttempts,
}

impl RequestFailure {
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestFailure::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(status) if (400..500).contains(&status))
    }
}

/// Final error of a call after retries are exhausted.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{method} {path} failed: {message}")]
pub struct ApiError {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub method: Method,
    pub path: String,
    #[source]
    pub error: RequestFailure,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ApiError {
    pub fn new(method: Method, path: impl Into<String>, error: RequestFailure) -> Self {
        Self {
            kind: API_ERROR,
            method,
            path: path.into(),
            message: error.to_string(),
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.error.status()
    }

    /// Body of the failing response, if the server sent one.
    pub fn body(&self) -> Option<&Value> {
        match &self.error {
            RequestFailure::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    /// Overrides the client-wide timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct ApiClient {
    config: ApiClientConfig,
    transport: Arc<dyn Transport>,
    store: Option<Store>,
    request_interceptors: RwLock<Vec<Arc<dyn RequestInterceptor>>>,
    response_interceptors: RwLock<Vec<Arc<dyn ResponseInterceptor>>>,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            store: None,
            request_interceptors: RwLock::new(Vec::new()),
            response_interceptors: RwLock::new(Vec::new()),
        }
    }

    /// Mirror in-flight state into `is_loading`.
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    pub fn add_request_interceptor(&self, interceptor: Arc<dyn RequestInterceptor>) {
        self.request_interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    pub fn add_response_interceptor(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response_interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    pub fn on_request(
        &self,
        f: impl Fn(&HttpRequest) -> Option<HttpRequest> + Send + Sync + 'static,
    ) {
        self.add_request_interceptor(Arc::new(FnInterceptor(f)));
    }

    pub fn on_response(
        &self,
        f: impl Fn(&ApiResponse) -> Option<ApiResponse> + Send + Sync + 'static,
    ) {
        self.add_response_interceptor(Arc::new(FnInterceptor(f)));
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::Get, path, None, RequestOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::Post, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::Put, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::Patch, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::Delete, path, None, RequestOptions::default())
            .await
    }

    // =========================================================================
    // Core
    // =========================================================================

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<Value, ApiError> {
        let timeout = options.timeout.unwrap_or_else(|| self.config.timeout());

        let mut request = HttpRequest::new(method, self.url_for(path)).with_timeout(timeout);
        request.headers = self.config.default_headers.clone();
        request.headers.extend(options.headers);
        if let Some(body) = body {
            request.body = Some(body.to_string());
        }

        self.set_loading(true);
        let interceptors = self
            .request_interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for interceptor in interceptors {
            if let Some(next) = interceptor.intercept(&request).await {
                request = next;
            }
        }

        let outcome = self.send_with_retry(&request, timeout).await;
        self.set_loading(false);

        match outcome {
            Ok(response) => Ok(self.run_response_interceptors(response).await.data),
            Err(failure) => {
                let error = ApiError::new(method, path, failure);
                tracing::warn!(%method, path, error = %error.message, "API request failed");
                Err(error)
            }
        }
    }

    async fn run_response_interceptors(&self, mut response: ApiResponse) -> ApiResponse {
        let interceptors = self
            .response_interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for interceptor in interceptors {
            if let Some(next) = interceptor.intercept(&response).await {
                response = next;
            }
        }
        response
    }

    async fn send_with_retry(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<ApiResponse, RequestFailure> {
        let attempts = self.config.retries;
        let mut last = RequestFailure::NoAttempts;

        for attempt in 0..attempts {
            match self.attempt(request, timeout).await {
                Ok(response) => return Ok(response),
                Err(failure) if failure.is_client_error() => return Err(failure),
                Err(failure) => {
                    if attempt + 1 < attempts {
                        let delay = self.config.retry_delay() * 2u32.saturating_pow(attempt);
                        tracing::debug!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %failure,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last = failure;
                }
            }
        }
        Err(last)
    }

    async fn attempt(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<ApiResponse, RequestFailure> {
        let response: HttpResponse =
            match tokio::time::timeout(timeout, self.transport.send(request)).await {
                Ok(result) => result?,
                Err(_) => return Err(TransportError::Timeout(timeout).into()),
            };

        if !response.is_success() {
            let body = serde_json::from_str::<Value>(&response.body)
                .unwrap_or_else(|_| Value::Object(Default::default()));
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", response.status));
            return Err(RequestFailure::Status {
                status: response.status,
                message,
                body,
            });
        }

        let data = if response.body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&response.body)
                .map_err(|e| RequestFailure::Decode(e.to_string()))?
        };

        Ok(ApiResponse {
            status: response.status,
            data,
            headers: response.headers,
            url: request.url.clone(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    fn set_loading(&self, loading: bool) {
        if let Some(store) = &self.store {
            store.set_path(keys::IS_LOADING, loading);
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .field("retries", &self.config.retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::state::AppState;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
        }
    }

    fn client(transport: Arc<Scripted>) -> ApiClient {
        ApiClient::new(
            ApiClientConfig {
                retry_delay_ms: 10,
                ..ApiClientConfig::default()
            },
            transport,
        )
    }

    #[tokio::test]
    async fn success_returns_decoded_body() {
        let transport = Scripted::new(vec![Ok(HttpResponse::json_body(200, &json!({"id": "c1"})))]);
        let api = client(transport.clone());

        let data = api.get("/campaigns/c1").await.unwrap();
        assert_eq!(data, json!({"id": "c1"}));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://api.example.com/campaigns/c1");
        assert_eq!(seen[0].headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn body_is_serialized_and_headers_merge() {
        let transport = Scripted::new(vec![Ok(HttpResponse::new(204, ""))]);
        let api = client(transport.clone());

        let data = api
            .request(
                Method::Post,
                "campaigns",
                Some(&json!({"title": "Park"})),
                RequestOptions::default().with_header("X-Trace", "1"),
            )
            .await
            .unwrap();
        assert_eq!(data, Value::Null);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].body.as_deref(), Some(r#"{"title":"Park"}"#));
        assert_eq!(seen[0].headers["X-Trace"], "1");
        assert_eq!(seen[0].url, "https://api.example.com/campaigns");
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let transport = Scripted::new(vec![Ok(HttpResponse::json_body(
            404,
            &json!({"message": "no such campaign"}),
        ))]);
        let api = client(transport.clone());

        let err = api.get("/campaigns/x").await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert_eq!(err.kind, API_ERROR);
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.message, "no such campaign");
        assert_eq!(err.path, "/campaigns/x");
    }

    #[tokio::test]
    async fn server_error_without_message_uses_status_text() {
        let transport = Scripted::new(vec![
            Ok(HttpResponse::new(500, "oops")),
            Ok(HttpResponse::new(502, "")),
            Ok(HttpResponse::new(503, "")),
        ]);
        let api = client(transport.clone());

        let err = api.get("/x").await.unwrap_err();
        assert_eq!(transport.calls(), 3);
        assert_eq!(err.message, "HTTP 503");
        assert_eq!(err.body(), Some(&json!({})));
    }

    #[tokio::test]
    async fn zero_retries_is_a_distinct_failure() {
        let transport = Scripted::new(vec![]);
        let api = ApiClient::new(
            ApiClientConfig {
                retries: 0,
                ..ApiClientConfig::default()
            },
            transport.clone(),
        );
        let err = api.get("/x").await.unwrap_err();
        assert_eq!(err.error, RequestFailure::NoAttempts);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn request_interceptors_run_once_in_order() {
        let transport = Scripted::new(vec![
            Err(TransportError::Network("down".into())),
            Ok(HttpResponse::json_body(200, &json!([]))),
        ]);
        let api = client(transport.clone());
        api.on_request(|r: &HttpRequest| Some(r.clone().with_header("X-Order", "first")));
        api.on_request(|r: &HttpRequest| {
            let previous = r.headers.get("X-Order").cloned().unwrap_or_default();
            Some(r.clone().with_header("X-Order", format!("{previous},second")))
        });

        api.get("/x").await.unwrap();
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|r| r.headers["X-Order"] == "first,second"));
    }

    #[tokio::test]
    async fn response_interceptors_can_reshape_data() {
        let transport = Scripted::new(vec![Ok(HttpResponse::json_body(200, &json!({"data": [1]})))]);
        let api = client(transport);
        api.on_response(|r: &ApiResponse| {
            let mut next = r.clone();
            next.data = r.data["data"].clone();
            Some(next)
        });
        assert_eq!(api.get("/x").await.unwrap(), json!([1]));
    }

    #[tokio::test]
    async fn invalid_json_is_decode_failure() {
        let transport = Scripted::new(vec![
            Ok(HttpResponse::new(200, "<html>")),
            Ok(HttpResponse::new(200, "<html>")),
            Ok(HttpResponse::new(200, "<html>")),
        ]);
        let api = client(transport);
        let err = api.get("/x").await.unwrap_err();
        assert!(matches!(err.error, RequestFailure::Decode(_)));
    }

    #[tokio::test]
    async fn loading_flag_is_toggled() {
        let store = Store::new(StoreConfig::default());
        let flags = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&flags);
        let _sub = store.subscribe(move |s: &AppState| sink.lock().unwrap().push(s.is_loading()));

        let transport = Scripted::new(vec![Ok(HttpResponse::json_body(200, &json!(1)))]);
        let api = client(transport).with_store(store.clone());
        api.get("/x").await.unwrap();

        assert_eq!(*flags.lock().unwrap(), vec![true, false]);
        assert!(!store.snapshot().is_loading());
    }

    #[tokio::test]
    async fn request_interceptors_run_while_loading() {
        let store = Store::new(StoreConfig::default());
        let transport = Scripted::new(vec![Ok(HttpResponse::json_body(200, &json!(1)))]);
        let api = client(transport).with_store(store.clone());

        let observed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&observed);
        let watched = store.clone();
        api.on_request(move |_: &HttpRequest| {
            *sink.lock().unwrap() = Some(watched.snapshot().is_loading());
            None
        });

        api.get("/x").await.unwrap();
        assert_eq!(*observed.lock().unwrap(), Some(true));
        assert!(!store.snapshot().is_loading());
    }

    #[test]
    fn api_error_serializes_envelope() {
        let err = ApiError::new(
            Method::Get,
            "/x",
            RequestFailure::Transport(TransportError::Network("refused".into())),
        );
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["type"], "API_ERROR");
        assert_eq!(value["method"], "GET");
        assert_eq!(value["error"]["kind"], "transport");
        assert_eq!(value["message"], "network error: refused");
    }
}
