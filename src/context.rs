//! Application context
//!
//! Owns one instance of every component and wires them together. Pages get
//! a reference to the context instead of reaching for globals.
//!
//! ```text
//!   AppConfig ─► AppContextBuilder ─► AppContext
//!                  ▲ transport          ├─ Store, Logger, ErrorHandler
//!                  │ backend            ├─ ApiClient, Validator, I18n
//!                  │ local store        └─ AuthService, CampaignService,
//!                  │ navigator             PhotoService
//!                  └ alerts
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use thiserror::Error;

use crate::api::{ApiClient, LoggingInterceptor, ReqwestTransport, Transport};
use crate::backend::{Backend, MemoryBackend};
use crate::config::{AppConfig, ConfigError};
use crate::demo::{self, DemoDataset, DemoError};
use crate::errors::{AppError, ErrorHandler};
use crate::i18n::{I18n, I18nError};
use crate::listeners::{lock, Subscription};
use crate::logging::Logger;
use crate::navigation::{Navigator, TracingNavigator};
use crate::persistence::{LocalStore, MemoryLocalStore};
use crate::services::{Alerts, AuthService, CampaignService, PhotoService, StoreAlerts};
use crate::state::Store;
use crate::validation::Validator;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no backend supplied and demo mode is off")]
    NoBackend,

    #[error("failed to prepare demo mode: {0}")]
    Demo(#[from] DemoError),

    #[error("failed to load translations: {0}")]
    I18n(#[from] I18nError),
}

// =============================================================================
// BUILDER
// =============================================================================

/// Collects the injected collaborators. Anything left unset gets a default:
/// reqwest transport, in-memory local store, tracing navigator and alerts
/// that land in the store's notifications. The backend has no default
/// outside demo mode.
pub struct AppContextBuilder {
    config: AppConfig,
    transport: Option<Arc<dyn Transport>>,
    backend: Option<Arc<dyn Backend>>,
    local: Option<Arc<dyn LocalStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    alerts: Option<Arc<dyn Alerts>>,
}

impl AppContextBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            transport: None,
            backend: None,
            local: None,
            navigator: None,
            alerts: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn local_store(mut self, local: Arc<dyn LocalStore>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn alerts(mut self, alerts: Arc<dyn Alerts>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn build(self) -> Result<AppContext, ContextError> {
        let config = self.config;
        config.backend.validate()?;

        let local = self
            .local
            .unwrap_or_else(|| Arc::new(MemoryLocalStore::new()));
        let backend = match (self.backend, config.backend.demo_mode) {
            (Some(backend), _) => backend,
            (None, true) => {
                let dataset = demo::init_demo_mode(local.as_ref())?;
                Arc::new(MemoryBackend::demo(&dataset)) as Arc<dyn Backend>
            }
            (None, false) => return Err(ContextError::NoBackend),
        };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(TracingNavigator));

        let store = Store::new(config.store.clone());
        let logger = Logger::from_config(&config.logging);
        let alerts = self
            .alerts
            .unwrap_or_else(|| Arc::new(StoreAlerts::new(store.clone())));
        let handler = Arc::new(ErrorHandler::new(
            store.clone(),
            logger.clone(),
            Arc::clone(&navigator),
        ));
        let api = ApiClient::new(config.api.clone(), transport).with_store(store.clone());
        let validator = Arc::new(Validator::new());

        let i18n = I18n::new(Arc::clone(&local), &config.store.default_language)
            .with_store(store.clone());
        i18n.load_bundled()?;

        let auth = AuthService::new(
            Arc::clone(&backend),
            store.clone(),
            Arc::clone(&handler),
            Arc::clone(&alerts),
            Arc::clone(&local),
        );
        let campaigns = CampaignService::new(
            Arc::clone(&backend),
            store.clone(),
            Arc::clone(&handler),
            Arc::clone(&validator),
        );
        let photos = PhotoService::new(Arc::clone(&backend), alerts);

        tracing::info!(demo_mode = config.backend.demo_mode, "application context built");
        Ok(AppContext {
            config,
            store,
            logger,
            handler,
            api,
            validator,
            i18n,
            local,
            navigator,
            auth,
            campaigns,
            photos,
            initialized: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        })
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

pub struct AppContext {
    config: AppConfig,
    store: Store,
    logger: Logger,
    handler: Arc<ErrorHandler>,
    api: ApiClient,
    validator: Arc<Validator>,
    i18n: I18n,
    local: Arc<dyn LocalStore>,
    navigator: Arc<dyn Navigator>,
    auth: AuthService,
    campaigns: CampaignService,
    photos: PhotoService,
    initialized: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl AppContext {
    pub fn builder(config: AppConfig) -> AppContextBuilder {
        AppContextBuilder::new(config)
    }

    /// Demo-mode context over the bundled dataset, everything else default.
    pub fn demo() -> Result<Self, ContextError> {
        Self::builder(AppConfig::demo()).build()
    }

    /// Logger level, a debug trace of every state change and the default
    /// API interceptors. Runs once; later calls are no-ops.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        self.logger.set_level(&self.config.logging.level);

        let logger = self.logger.child("state");
        let subscription = self.store.subscribe(move |state| {
            logger.debug("State updated", Some(state.to_value()));
        });
        lock(&self.subscriptions).push(subscription);

        let interceptor = Arc::new(LoggingInterceptor::new(self.logger.child("api")));
        self.api.add_request_interceptor(interceptor.clone());
        self.api.add_response_interceptor(interceptor);

        self.logger.info(
            "Application initialized",
            Some(json!({ "demo_mode": self.config.backend.demo_mode })),
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// GET through the API client; failures go through the error handler.
    pub async fn fetch_data(&self, path: &str) -> Result<Value, AppError> {
        self.api.get(path).await.map_err(|e| self.handler.handle(e))
    }

    /// POST through the API client; failures go through the error handler.
    pub async fn post_data(&self, path: &str, body: &Value) -> Result<Value, AppError> {
        self.api
            .post(path, body)
            .await
            .map_err(|e| self.handler.handle(e))
    }

    /// Install the process-wide panic hook that reports into this context.
    /// Returns `false` when a hook was already installed by any context.
    pub fn install_global_error_handling(&self) -> bool {
        crate::errors::setup_global_error_handling(Arc::clone(&self.handler))
    }

    /// Drop the stored demo dataset, if any.
    pub fn leave_demo_mode(&self) {
        demo::clear_demo_mode(self.local.as_ref());
    }

    pub fn demo_dataset(&self) -> Option<DemoDataset> {
        if !demo::is_demo_mode(self.local.as_ref()) {
            return None;
        }
        Some(DemoDataset {
            user: demo::demo_user(self.local.as_ref())?,
            campaigns: demo::demo_campaigns(self.local.as_ref()),
            participations: demo::demo_participations(self.local.as_ref()),
            rewards: demo::demo_rewards(self.local.as_ref()),
            transactions: demo::demo_transactions(self.local.as_ref()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn i18n(&self) -> &I18n {
        &self.i18n
    }

    pub fn local_store(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn campaigns(&self) -> &CampaignService {
        &self.campaigns
    }

    pub fn photos(&self) -> &PhotoService {
        &self.photos
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("demo_mode", &self.config.backend.demo_mode)
            .field("initialized", &self.is_initialized())
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HttpRequest, HttpResponse, TransportError};
    use crate::logging::LogLevel;
    use crate::navigation::RecordingNavigator;
    use crate::errors::ErrorKind;
    use async_trait::async_trait;

    struct Fixed(u16, &'static str);

    #[async_trait]
    impl Transport for Fixed {
        async fn send(&self, _: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse::new(self.0, self.1))
        }
    }

    fn demo_with(transport: Fixed) -> AppContext {
        let mut config = AppConfig::demo();
        config.logging.level = "debug".to_string();
        AppContext::builder(config)
            .transport(Arc::new(transport))
            .navigator(Arc::new(RecordingNavigator::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn non_demo_without_backend_is_rejected() {
        let mut config = AppConfig::default();
        config.backend.url = Some("https://x.supabase.co".into());
        config.backend.anon_key = Some("anon".into());
        assert!(matches!(
            AppContext::builder(config).build(),
            Err(ContextError::NoBackend)
        ));
        assert!(matches!(
            AppContext::builder(AppConfig::default()).build(),
            Err(ContextError::Config(ConfigError::MissingBackend))
        ));
    }

    #[test]
    fn demo_context_seeds_local_storage() {
        let ctx = AppContext::demo().unwrap();
        let dataset = ctx.demo_dataset().unwrap();
        assert_eq!(dataset.campaigns.len(), 5);
        assert_eq!(ctx.i18n().t("nav.dashboard"), "Табло");

        ctx.leave_demo_mode();
        assert!(ctx.demo_dataset().is_none());
    }

    #[tokio::test]
    async fn initialize_traces_state_and_requests_once() {
        let ctx = demo_with(Fixed(200, r#"{"ok":true}"#));
        ctx.initialize();
        ctx.initialize();
        assert!(ctx.is_initialized());
        assert_eq!(ctx.logger().level(), LogLevel::Debug);

        ctx.store().set_path("campaigns_loading", true);
        let state_logs: Vec<_> = ctx
            .logger()
            .logs(Some(LogLevel::Debug))
            .into_iter()
            .filter(|e| e.message.contains("State updated"))
            .collect();
        assert_eq!(state_logs.len(), 1);

        let data = ctx.fetch_data("/campaigns").await.unwrap();
        assert_eq!(data["ok"], true);
        let debug = ctx.logger().logs(Some(LogLevel::Debug));
        assert!(debug.iter().any(|e| e.message.contains("API Request")));
        assert!(debug.iter().any(|e| e.message.contains("API Response")));
    }

    #[tokio::test]
    async fn failed_post_is_handled_and_returned() {
        let ctx = demo_with(Fixed(404, r#"{"message":"no such thing"}"#));
        let err = ctx.post_data("/campaigns", &json!({})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(ctx.store().snapshot().errors().len(), 1);
        assert_eq!(
            ctx.store().snapshot().notifications()[0].message,
            "Resource not found."
        );
    }
}
