use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clean_quarter::api::{
    ApiClient, HttpRequest, HttpResponse, Method, RequestFailure, RequestOptions, Transport,
    TransportError,
};
use clean_quarter::config::{ApiClientConfig, StoreConfig};
use clean_quarter::errors::{AppError, ErrorKind};
use clean_quarter::forms::{fetch_cached, DEFAULT_FETCH_TTL};
use clean_quarter::Store;
use tokio::time::Instant;

type Reply = Result<HttpResponse, TransportError>;

struct Script {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<usize>,
}

impl Script {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transport for Script {
    async fn send(&self, _: &HttpRequest) -> Reply {
        *self.calls.lock().unwrap() += 1;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
    }
}

/// Never answers within any sane timeout.
#[derive(Default)]
struct Stalled {
    timeouts: Mutex<Vec<Option<Duration>>>,
}

#[async_trait]
impl Transport for Stalled {
    async fn send(&self, request: &HttpRequest) -> Reply {
        self.timeouts.lock().unwrap().push(request.timeout);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(HttpResponse::new(200, "{}"))
    }
}

fn client(script: Arc<Script>) -> ApiClient {
    let config = ApiClientConfig {
        base_url: "https://api.example.com".into(),
        ..ApiClientConfig::default()
    };
    ApiClient::new(config, script)
}

#[tokio::test(start_paused = true)]
async fn not_found_is_not_retried() {
    let script = Script::new(vec![Ok(HttpResponse::new(404, r#"{"message":"missing"}"#))]);
    let api = client(script.clone());

    let err = api.get("/campaigns/42").await.unwrap_err();

    assert_eq!(script.calls(), 1);
    assert_eq!(err.status(), Some(404));
    assert_eq!(AppError::from(err).kind, ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn network_failures_back_off_exponentially() {
    let script = Script::new(vec![
        Err(TransportError::Network("connection reset".into())),
        Err(TransportError::Network("connection reset".into())),
        Ok(HttpResponse::new(200, r#"[{"id":"campaign-001"}]"#)),
    ]);
    let api = client(script.clone());

    let started = Instant::now();
    let data = api.get("/campaigns").await.unwrap();

    assert_eq!(started.elapsed().as_millis(), 3000);
    assert_eq!(script.calls(), 3);
    assert_eq!(data[0]["id"], "campaign-001");
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_retried_and_classified_as_network() {
    let stalled = Arc::new(Stalled::default());
    let api = ApiClient::new(ApiClientConfig::default(), stalled.clone());

    let started = Instant::now();
    let err = api.get("/campaigns").await.unwrap_err();

    // 3 x 30s timeouts plus 1s and 2s of backoff.
    assert_eq!(started.elapsed().as_millis(), 93_000);
    assert_eq!(stalled.timeouts.lock().unwrap().len(), 3);
    assert_eq!(
        err.error,
        RequestFailure::Transport(TransportError::Timeout(Duration::from_secs(30)))
    );
    assert_eq!(AppError::from(err).kind, ErrorKind::Network);
}

#[tokio::test(start_paused = true)]
async fn per_request_timeout_overrides_config() {
    let stalled = Arc::new(Stalled::default());
    let api = ApiClient::new(ApiClientConfig::default(), stalled.clone());

    let started = Instant::now();
    let err = api
        .request(
            Method::Get,
            "/campaigns",
            None,
            RequestOptions::default().with_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

    assert_eq!(started.elapsed().as_millis(), 18_000);
    assert_eq!(
        *stalled.timeouts.lock().unwrap(),
        vec![Some(Duration::from_secs(5)); 3]
    );
    assert!(matches!(
        err.error,
        RequestFailure::Transport(TransportError::Timeout(t)) if t == Duration::from_secs(5)
    ));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_surface_as_network_errors() {
    let script = Script::new(vec![]);
    let api = client(script.clone());

    let err = api.get("/campaigns").await.unwrap_err();

    assert_eq!(script.calls(), 3);
    assert_eq!(AppError::from(err).kind, ErrorKind::Network);
}

#[tokio::test]
async fn server_errors_are_retried_then_classified() {
    let script = Script::new(vec![
        Ok(HttpResponse::new(503, "")),
        Ok(HttpResponse::new(503, "")),
        Ok(HttpResponse::new(503, "")),
    ]);
    let config = ApiClientConfig {
        retry_delay_ms: 0,
        ..ApiClientConfig::default()
    };
    let api = ApiClient::new(config, script.clone());

    let err = api.get("/campaigns").await.unwrap_err();

    assert_eq!(script.calls(), 3);
    assert_eq!(AppError::from(err).kind, ErrorKind::Server);
}

#[tokio::test]
async fn cached_fetch_hits_the_network_once() {
    let script = Script::new(vec![Ok(HttpResponse::new(200, r#"{"total":5}"#))]);
    let api = client(script.clone());
    let store = Store::new(StoreConfig::default());

    let first = fetch_cached(&api, &store, "/stats", DEFAULT_FETCH_TTL).await.unwrap();
    let second = fetch_cached(&api, &store, "/stats", DEFAULT_FETCH_TTL).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(script.calls(), 1);
    assert!(store.get_cache("fetch_/stats").is_some());
}

#[tokio::test]
async fn cached_fetch_records_failures() {
    let script = Script::new(vec![Ok(HttpResponse::new(400, r#"{"message":"bad filter"}"#))]);
    let api = client(script);
    let store = Store::new(StoreConfig::default());

    let err = fetch_cached(&api, &store, "/stats", 60).await.unwrap_err();

    assert_eq!(err.status(), Some(400));
    let errors = store.snapshot().errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].context, "fetch");
    assert!(store.get_cache("fetch_/stats").is_none());
}
