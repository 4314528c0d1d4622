//! Request and response interceptors.
//!
//! Request interceptors run once per call, before the first attempt.
//! Response interceptors run after a successful attempt. Both run in
//! registration order; returning `None` keeps the value unchanged.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::transport::HttpRequest;
use crate::logging::Logger;

/// Decoded successful response as seen by response interceptors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Value,
    pub headers: BTreeMap<String, String>,
    pub url: String,
}

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn intercept(&self, request: &HttpRequest) -> Option<HttpRequest>;
}

#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    async fn intercept(&self, response: &ApiResponse) -> Option<ApiResponse>;
}

/// Adapts a synchronous closure into an interceptor.
pub(crate) struct FnInterceptor<F>(pub(crate) F);

#[async_trait]
impl<F> RequestInterceptor for FnInterceptor<F>
where
    F: Fn(&HttpRequest) -> Option<HttpRequest> + Send + Sync,
{
    async fn intercept(&self, request: &HttpRequest) -> Option<HttpRequest> {
        (self.0)(request)
    }
}

#[async_trait]
impl<F> ResponseInterceptor for FnInterceptor<F>
where
    F: Fn(&ApiResponse) -> Option<ApiResponse> + Send + Sync,
{
    async fn intercept(&self, response: &ApiResponse) -> Option<ApiResponse> {
        (self.0)(response)
    }
}

// =============================================================================
// DEFAULTS
// =============================================================================

/// Debug-level trace of outgoing requests and incoming responses.
#[derive(Debug, Clone)]
pub struct LoggingInterceptor {
    logger: Logger,
}

impl LoggingInterceptor {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    async fn intercept(&self, request: &HttpRequest) -> Option<HttpRequest> {
        self.logger.debug(
            "API Request",
            Some(json!({ "method": request.method, "url": request.url })),
        );
        None
    }
}

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    async fn intercept(&self, response: &ApiResponse) -> Option<ApiResponse> {
        self.logger.debug(
            "API Response",
            Some(json!({ "status": response.status, "url": response.url })),
        );
        None
    }
}

/// Adds a bearer token to every request that does not carry one already.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl RequestInterceptor for BearerAuth {
    async fn intercept(&self, request: &HttpRequest) -> Option<HttpRequest> {
        if request.headers.contains_key("Authorization") {
            return None;
        }
        Some(
            request
                .clone()
                .with_header("Authorization", format!("Bearer {}", self.token)),
        )
    }
}
