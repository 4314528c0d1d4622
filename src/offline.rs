//! Offline support
//!
//! Cache policy of the service worker, expressed over the transport seam:
//!
//! - static assets are **cache first** (fall back to a 503 text response
//!   when neither cache nor network can answer)
//! - backend REST calls (`/rest/v1/`) are **network first**, falling back to
//!   the last good response
//! - anything but GET passes straight through
//!
//! Push payloads and notification clicks are translated into plain values
//! the host can act on.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use crate::listeners::lock;
use crate::navigation::DASHBOARD_PAGE;

pub const CACHE_NAME: &str = "clean-quarter-v1";
pub const OFFLINE_BODY: &str = "Offline - Please check your internet connection";
pub const API_PATH_MARKER: &str = "/rest/v1/";

pub const STATIC_ASSETS: &[&str] = &[
    "/",
    "/index.html",
    "/src/pages/dashboard.html",
    "/src/pages/create-campaign.html",
    "/src/pages/campaign-detail.html",
    "/src/pages/rewards.html",
    "/src/pages/profile.html",
    "/src/pages/admin.html",
    "/src/style.css",
    "/src/assets/style.css",
    "/src/main.js",
];

/// Network access as seen by the cache.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Network for T {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.send(request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    Passthrough,
    NetworkFirst,
    CacheFirst,
}

impl FetchStrategy {
    pub fn for_request(method: Method, url: &str) -> Self {
        if method != Method::Get {
            return FetchStrategy::Passthrough;
        }
        let path = match url::Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
        };
        if path.contains(API_PATH_MARKER) {
            FetchStrategy::NetworkFirst
        } else {
            FetchStrategy::CacheFirst
        }
    }
}

/// 503 text response served when nothing else can answer.
pub fn offline_response() -> HttpResponse {
    HttpResponse::new(503, OFFLINE_BODY).with_header("Content-Type", "text/plain")
}

// =============================================================================
// CACHE
// =============================================================================

type Entries = BTreeMap<String, HttpResponse>;

/// Named response caches; one of them is current.
#[derive(Debug)]
pub struct OfflineCache {
    current: String,
    caches: Mutex<BTreeMap<String, Entries>>,
}

impl Default for OfflineCache {
    fn default() -> Self {
        Self::new(CACHE_NAME)
    }
}

impl OfflineCache {
    pub fn new(current: impl Into<String>) -> Self {
        let current = current.into();
        let mut caches = BTreeMap::new();
        caches.insert(current.clone(), Entries::new());
        Self {
            current,
            caches: Mutex::new(caches),
        }
    }

    pub fn name(&self) -> &str {
        &self.current
    }

    pub fn cache_names(&self) -> Vec<String> {
        lock(&self.caches).keys().cloned().collect()
    }

    /// Store `response` for `url` in the named cache, creating it.
    pub fn put_in(&self, cache: &str, url: &str, response: HttpResponse) {
        lock(&self.caches)
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response);
    }

    pub fn put(&self, url: &str, response: HttpResponse) {
        self.put_in(&self.current, url, response);
    }

    /// First match across all caches, current cache first.
    pub fn lookup(&self, url: &str) -> Option<HttpResponse> {
        let caches = lock(&self.caches);
        caches
            .get(&self.current)
            .and_then(|entries| entries.get(url))
            .or_else(|| caches.values().find_map(|entries| entries.get(url)))
            .cloned()
    }

    /// Fetch and store every asset. All or nothing: one failure caches none
    /// of them and is logged.
    pub async fn install(&self, assets: &[&str], network: &dyn Network) -> bool {
        let mut fetched = Vec::with_capacity(assets.len());
        for asset in assets {
            let request = HttpRequest::new(Method::Get, *asset);
            match network.fetch(&request).await {
                Ok(response) if response.is_success() => fetched.push((*asset, response)),
                Ok(response) => {
                    tracing::warn!(asset, status = response.status, "error caching assets");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(asset, error = %e, "error caching assets");
                    return false;
                }
            }
        }

        let count = fetched.len();
        for (asset, response) in fetched {
            self.put(asset, response);
        }
        tracing::info!(cache = %self.current, count, "caching static assets");
        true
    }

    /// Drop every cache but the current one. Returns the dropped names.
    pub fn activate(&self) -> Vec<String> {
        let mut caches = lock(&self.caches);
        let stale: Vec<String> = caches
            .keys()
            .filter(|name| **name != self.current)
            .cloned()
            .collect();
        for name in &stale {
            tracing::info!(cache = %name, "deleting old cache");
            caches.remove(name);
        }
        caches.entry(self.current.clone()).or_default();
        stale
    }

    /// Answer `request` according to its [`FetchStrategy`].
    ///
    /// `None` means nobody could answer: a pass-through request that failed,
    /// or a network-first request with no cached copy.
    pub async fn respond(&self, request: &HttpRequest, network: &dyn Network) -> Option<HttpResponse> {
        match FetchStrategy::for_request(request.method, &request.url) {
            FetchStrategy::Passthrough => network.fetch(request).await.ok(),
            FetchStrategy::NetworkFirst => match network.fetch(request).await {
                Ok(response) => {
                    if response.status == 200 {
                        self.put(&request.url, response.clone());
                    }
                    Some(response)
                }
                Err(e) => {
                    tracing::debug!(url = %request.url, error = %e, "network failed, trying cache");
                    self.lookup(&request.url)
                }
            },
            FetchStrategy::CacheFirst => {
                if let Some(cached) = self.lookup(&request.url) {
                    return Some(cached);
                }
                match network.fetch(request).await {
                    Ok(response) => {
                        if response.status == 200 {
                            self.put(&request.url, response.clone());
                        }
                        Some(response)
                    }
                    Err(_) => Some(offline_response()),
                }
            }
        }
    }
}

// =============================================================================
// PUSH NOTIFICATIONS
// =============================================================================

pub const DEFAULT_PUSH_TITLE: &str = "Clean Quarter";
pub const DEFAULT_PUSH_BODY: &str = "New notification from Clean Quarter";
pub const PUSH_ICON: &str = "/images/icon-192x192.png";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationSpec {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub url: Option<String>,
}

impl From<PushPayload> for NotificationSpec {
    fn from(payload: PushPayload) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| DEFAULT_PUSH_TITLE.to_string()),
            body: payload.body.unwrap_or_else(|| DEFAULT_PUSH_BODY.to_string()),
            icon: PUSH_ICON.to_string(),
            badge: PUSH_ICON.to_string(),
            tag: payload.tag.unwrap_or_else(|| "default".to_string()),
            require_interaction: true,
            url: payload.url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
    Focus(String),
    OpenWindow(String),
}

/// Focus an open window already showing the target, otherwise open one.
pub fn notification_click(target_url: Option<&str>, open_clients: &[String]) -> ClickAction {
    let target = target_url.unwrap_or(DASHBOARD_PAGE);
    if open_clients.iter().any(|client| client == target) {
        ClickAction::Focus(target.to_string())
    } else {
        ClickAction::OpenWindow(target.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_by_method_and_path() {
        assert_eq!(
            FetchStrategy::for_request(Method::Post, "https://x.supabase.co/rest/v1/campaigns"),
            FetchStrategy::Passthrough
        );
        assert_eq!(
            FetchStrategy::for_request(Method::Get, "https://x.supabase.co/rest/v1/campaigns?select=*"),
            FetchStrategy::NetworkFirst
        );
        assert_eq!(
            FetchStrategy::for_request(Method::Get, "/src/style.css"),
            FetchStrategy::CacheFirst
        );
        assert_eq!(
            FetchStrategy::for_request(Method::Get, "/page?next=/rest/v1/"),
            FetchStrategy::CacheFirst
        );
    }

    #[test]
    fn activate_keeps_only_current() {
        let cache = OfflineCache::default();
        cache.put_in("clean-quarter-v0", "/index.html", HttpResponse::new(200, "old"));
        cache.put("/index.html", HttpResponse::new(200, "new"));

        assert_eq!(cache.lookup("/index.html").unwrap().body, "new");
        assert_eq!(cache.activate(), vec!["clean-quarter-v0"]);
        assert_eq!(cache.cache_names(), vec![CACHE_NAME]);
    }

    #[test]
    fn push_defaults() {
        let spec = NotificationSpec::from(PushPayload::parse("{}").unwrap());
        assert_eq!(spec.title, DEFAULT_PUSH_TITLE);
        assert_eq!(spec.body, DEFAULT_PUSH_BODY);
        assert_eq!(spec.tag, "default");
        assert_eq!(spec.badge, PUSH_ICON);
        assert!(spec.require_interaction);

        let spec = NotificationSpec::from(
            PushPayload::parse(r#"{"title":"Нова кампания","tag":"campaign"}"#).unwrap(),
        );
        assert_eq!(spec.title, "Нова кампания");
        assert_eq!(spec.tag, "campaign");
    }

    #[test]
    fn click_focuses_or_opens() {
        let open = vec!["/src/pages/rewards.html".to_string()];
        assert_eq!(
            notification_click(Some("/src/pages/rewards.html"), &open),
            ClickAction::Focus("/src/pages/rewards.html".to_string())
        );
        assert_eq!(
            notification_click(None, &open),
            ClickAction::OpenWindow(DASHBOARD_PAGE.to_string())
        );
    }
}
