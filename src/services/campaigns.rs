//! Campaigns, participations, rewards and the points ledger.

use std::sync::Arc;

use clean_quarter_types::{
    ledger_delta, Campaign, CampaignMarker, CampaignStatus, NewCampaign, Participation, Reward,
    Transaction,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::backend::{tables, Backend, BackendError, Query};
use crate::errors::{AppError, ErrorHandler, ErrorKind};
use crate::state::{keys, Store};
use crate::validation::Validator;

pub const CAMPAIGNS_CACHE_KEY: &str = "campaigns:all";
pub const CAMPAIGNS_CACHE_TTL: u64 = 300;

pub struct CampaignService {
    backend: Arc<dyn Backend>,
    store: Store,
    handler: Arc<ErrorHandler>,
    validator: Arc<Validator>,
}

impl CampaignService {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Store,
        handler: Arc<ErrorHandler>,
        validator: Arc<Validator>,
    ) -> Self {
        Self {
            backend,
            store,
            handler,
            validator,
        }
    }

    // =========================================================================
    // Campaigns
    // =========================================================================

    /// All campaigns, newest first. Served from the store cache for five
    /// minutes after a successful load.
    pub async fn list(&self) -> Result<Vec<Campaign>, AppError> {
        if let Some(cached) = self.store.get_cache(CAMPAIGNS_CACHE_KEY) {
            match serde_json::from_value::<Vec<Campaign>>(cached) {
                Ok(campaigns) => {
                    tracing::debug!(count = campaigns.len(), "campaigns from cache");
                    return Ok(campaigns);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unreadable campaign cache");
                    self.store.clear_cache(Some(CAMPAIGNS_CACHE_KEY));
                }
            }
        }

        self.store.set_path(keys::CAMPAIGNS_LOADING, true);
        let query = Query::new().order("created_at", true);
        let loaded = match self.backend.select(tables::CAMPAIGNS, &query).await {
            Ok(rows) => decode_rows::<Campaign>(rows),
            Err(e) => Err(AppError::from(e)),
        };

        match loaded {
            Ok(campaigns) => {
                let value = json!(campaigns);
                self.store.merge(json!({
                    "campaigns": value.clone(),
                    "campaigns_loading": false,
                    "campaigns_error": null,
                }));
                self.store
                    .set_cache(CAMPAIGNS_CACHE_KEY, value, CAMPAIGNS_CACHE_TTL);
                Ok(campaigns)
            }
            Err(e) => {
                self.store.merge(json!({
                    "campaigns_loading": false,
                    "campaigns_error": e.message,
                }));
                Err(self.handler.handle(e))
            }
        }
    }

    /// Map markers for active campaigns. Failures leave the map empty.
    pub async fn active_markers(&self) -> Vec<CampaignMarker> {
        let query = Query::new().eq("status", "active");
        let rows = match self.backend.select(tables::CAMPAIGNS, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "error fetching campaigns");
                return Vec::new();
            }
        };
        let markers: Vec<CampaignMarker> = match decode_rows::<Campaign>(rows) {
            Ok(campaigns) => campaigns
                .iter()
                .filter(|c| c.status == CampaignStatus::Active)
                .map(CampaignMarker::from)
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "error loading campaign markers");
                Vec::new()
            }
        };
        tracing::info!(count = markers.len(), "loaded active campaigns");
        markers
    }

    /// One campaign; also becomes the store's `current_campaign`.
    pub async fn get(&self, id: &str) -> Result<Option<Campaign>, AppError> {
        let query = Query::new().eq("id", id).limit(1);
        let rows = self.select(tables::CAMPAIGNS, &query).await?;
        let campaign = decode_rows::<Campaign>(rows)
            .map_err(|e| self.handler.handle(e))?
            .into_iter()
            .next();
        self.store
            .set_path(keys::CURRENT_CAMPAIGN, json!(campaign));
        Ok(campaign)
    }

    /// Validate against the `campaign` schema and insert as active.
    pub async fn create(&self, created_by: &str, campaign: NewCampaign) -> Result<Campaign, AppError> {
        let payload = json!(campaign);
        let result = self.validator.validate_with_schema("campaign", &payload);
        if !result.is_valid {
            return Err(self.handler.handle(result));
        }

        let mut row = payload;
        if let Some(fields) = row.as_object_mut() {
            fields.insert("status".to_string(), json!(CampaignStatus::Active));
            fields.insert("created_by".to_string(), json!(created_by));
        }
        let stored = self
            .backend
            .insert(tables::CAMPAIGNS, row)
            .await
            .map_err(|e| self.handler.handle(e))?;

        self.store.clear_cache(Some(CAMPAIGNS_CACHE_KEY));
        let campaign = decode_row::<Campaign>(stored).map_err(|e| self.handler.handle(e))?;
        tracing::info!(campaign_id = %campaign.id, "campaign created");
        Ok(campaign)
    }

    // =========================================================================
    // Participation
    // =========================================================================

    /// Join a campaign as a pending participant. Joining twice is a
    /// validation error.
    pub async fn participate(&self, campaign_id: &str, user_id: &str) -> Result<Participation, AppError> {
        let existing = Query::new()
            .eq("campaign_id", campaign_id)
            .eq("user_id", user_id)
            .limit(1);
        if !self.select(tables::PARTICIPATIONS, &existing).await?.is_empty() {
            let error = AppError::new("Already participating in this campaign", ErrorKind::Validation)
                .with_details(json!({ "campaign_id": "Already participating in this campaign" }));
            return Err(self.handler.handle(error));
        }

        let row = json!({
            "campaign_id": campaign_id,
            "user_id": user_id,
            "status": "pending",
            "points_earned": 0,
        });
        let stored = self
            .backend
            .insert(tables::PARTICIPATIONS, row)
            .await
            .map_err(|e| self.handler.handle(e))?;
        decode_row(stored).map_err(|e| self.handler.handle(e))
    }

    pub async fn participations(&self, user_id: &str) -> Result<Vec<Participation>, AppError> {
        let query = Query::new().eq("user_id", user_id).order("created_at", true);
        let rows = self.select(tables::PARTICIPATIONS, &query).await?;
        decode_rows(rows).map_err(|e| self.handler.handle(e))
    }

    // =========================================================================
    // Rewards & points
    // =========================================================================

    /// Reward catalogue, cheapest first, mirrored into the store.
    pub async fn rewards(&self) -> Result<Vec<Reward>, AppError> {
        self.store.set_path(keys::REWARDS_LOADING, true);
        let query = Query::new().order("cost", false);
        let loaded = match self.backend.select(tables::REWARDS, &query).await {
            Ok(rows) => decode_rows::<Reward>(rows),
            Err(e) => Err(AppError::from(e)),
        };

        match loaded {
            Ok(rewards) => {
                self.store.merge(json!({
                    "rewards": rewards,
                    "rewards_loading": false,
                    "rewards_error": null,
                }));
                Ok(rewards)
            }
            Err(e) => {
                self.store.merge(json!({
                    "rewards_loading": false,
                    "rewards_error": e.message,
                }));
                Err(self.handler.handle(e))
            }
        }
    }

    /// Ledger entries for `user_id`, newest first.
    pub async fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>, AppError> {
        let query = Query::new().eq("user_id", user_id).order("created_at", true);
        let rows = self.select(tables::TRANSACTIONS, &query).await?;
        decode_rows(rows).map_err(|e| self.handler.handle(e))
    }

    /// Earned minus spent over the user's ledger.
    pub async fn points_balance(&self, user_id: &str) -> Result<i64, AppError> {
        Ok(self.transactions(user_id).await?.iter().map(ledger_delta).sum())
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, AppError> {
        self.backend
            .select(table, query)
            .await
            .map_err(|e: BackendError| self.handler.handle(e))
    }
}

fn decode_row<T: DeserializeOwned>(row: Value) -> Result<T, AppError> {
    serde_json::from_value(row)
        .map_err(|e| AppError::new(format!("unexpected row shape: {e}"), ErrorKind::Api))
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, AppError> {
    rows.into_iter().map(decode_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::StoreConfig;
    use crate::demo::DemoDataset;
    use crate::logging::{LogLevel, Logger};
    use crate::navigation::RecordingNavigator;

    struct Fixture {
        service: CampaignService,
        backend: MemoryBackend,
        store: Store,
    }

    fn fixture() -> Fixture {
        let dataset = DemoDataset::builtin().unwrap();
        let backend = MemoryBackend::demo(&dataset);
        let store = Store::new(StoreConfig::default());
        let handler = Arc::new(ErrorHandler::new(
            store.clone(),
            Logger::new(LogLevel::Debug, 100),
            Arc::new(RecordingNavigator::new()),
        ));
        let service = CampaignService::new(
            Arc::new(backend.clone()),
            store.clone(),
            handler,
            Arc::new(Validator::new()),
        );
        Fixture {
            service,
            backend,
            store,
        }
    }

    fn new_campaign(title: &str) -> NewCampaign {
        NewCampaign {
            title: title.to_string(),
            description: "Събиране на боклук около блока".to_string(),
            location_lat: 42.65,
            location_lng: 23.34,
            neighborhood: "Mladost".to_string(),
            before_photo_url: None,
        }
    }

    #[tokio::test]
    async fn list_fills_store_and_cache() {
        let f = fixture();
        let campaigns = f.service.list().await.unwrap();
        assert_eq!(campaigns.len(), 5);
        assert!(campaigns[0].created_at >= campaigns[1].created_at);

        let state = f.store.snapshot();
        assert_eq!(state.campaigns().len(), 5);
        assert_eq!(f.store.get("campaigns_loading"), Some(json!(false)));
        assert!(f.store.get_cache(CAMPAIGNS_CACHE_KEY).is_some());

        f.backend.set_offline(true);
        assert_eq!(f.service.list().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn list_failure_records_error() {
        let f = fixture();
        f.backend.set_offline(true);
        let err = f.service.list().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(f.store.get("campaigns_error"), Some(json!("Failed to fetch")));
        assert_eq!(f.store.get("campaigns_loading"), Some(json!(false)));
        assert_eq!(f.store.snapshot().errors().len(), 1);
    }

    #[tokio::test]
    async fn markers_only_for_active_campaigns() {
        let f = fixture();
        let markers = f.service.active_markers().await;
        assert_eq!(markers.len(), 4);
        assert!(markers.iter().all(|m| m.status == CampaignStatus::Active));

        f.backend.set_offline(true);
        assert!(f.service.active_markers().await.is_empty());
    }

    #[tokio::test]
    async fn get_sets_current_campaign() {
        let f = fixture();
        let campaign = f.service.get("campaign-001").await.unwrap().unwrap();
        assert_eq!(f.store.snapshot().current_campaign(), Some(campaign));
        assert!(f.service.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_validates_then_invalidates_cache() {
        let f = fixture();
        f.service.list().await.unwrap();

        let err = f
            .service
            .create("demo-admin-001", new_campaign("ab"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.field_errors().contains_key("title"));
        assert_eq!(f.backend.rows(tables::CAMPAIGNS).len(), 5);

        let created = f
            .service
            .create("demo-admin-001", new_campaign("Почистване в Младост"))
            .await
            .unwrap();
        assert_eq!(created.status, CampaignStatus::Active);
        assert_eq!(created.created_by.as_deref(), Some("demo-admin-001"));
        assert!(f.store.get_cache(CAMPAIGNS_CACHE_KEY).is_none());
        assert_eq!(f.service.list().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn participate_once() {
        let f = fixture();
        let joined = f.service.participate("campaign-004", "u9").await.unwrap();
        assert_eq!(joined.status, clean_quarter_types::ParticipationStatus::Pending);

        let err = f.service.participate("campaign-004", "u9").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(f.service.participations("u9").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rewards_and_balance() {
        let f = fixture();
        let rewards = f.service.rewards().await.unwrap();
        assert_eq!(rewards.len(), 10);
        assert!(rewards.windows(2).all(|w| w[0].cost <= w[1].cost));
        assert_eq!(f.store.snapshot().rewards().len(), 10);

        assert_eq!(f.service.points_balance("demo-admin-001").await.unwrap(), 450);
        assert_eq!(f.service.points_balance("nobody").await.unwrap(), 0);
    }
}
