//! HTTP client with interceptors and retry.

pub mod client;
pub mod interceptors;
pub mod transport;

pub use client::{ApiClient, ApiError, RequestFailure, RequestOptions, API_ERROR};
pub use interceptors::{ApiResponse, BearerAuth, LoggingInterceptor, RequestInterceptor, ResponseInterceptor};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError};
