//! Shared Types for Clean Quarter
//!
//! Every record that crosses the backend boundary or lands in local storage
//! is defined here, so the client core and its tests agree on one JSON shape.
//!
//! ## Rules
//!
//! 1. Row types mirror the backend tables column-for-column (snake_case)
//! 2. IDs stay strings; the backend hands out UUIDs, demo mode uses slugs
//! 3. Unknown columns are tolerated via `#[serde(default)]`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Authenticated account as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub points_balance: Option<i64>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Bare account with only an id, as the auth service returns on sign-in.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            username: None,
            role: None,
            points_balance: None,
            neighborhood: None,
            avatar_url: None,
            created_at: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Some(Role::Admin))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// Row in the `profiles` table, created right after sign-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub points_balance: i64,
    #[serde(default)]
    pub neighborhood: Option<String>,
}

/// Result of a successful sign-up or sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user: User,
    #[serde(default)]
    pub access_token: Option<String>,
}

// ============================================================================
// CAMPAIGNS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Completed,
    Cancelled,
}

/// Row in the `campaigns` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub location_lat: f64,
    pub location_lng: f64,
    pub status: CampaignStatus,
    #[serde(default)]
    pub before_photo_url: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for creating a campaign; the backend fills id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub title: String,
    pub description: String,
    pub location_lat: f64,
    pub location_lng: f64,
    pub neighborhood: String,
    #[serde(default)]
    pub before_photo_url: Option<String>,
}

/// The subset of a campaign the map layer needs to place a marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignMarker {
    pub id: String,
    pub title: String,
    pub location_lat: f64,
    pub location_lng: f64,
    pub status: CampaignStatus,
}

impl From<&Campaign> for CampaignMarker {
    fn from(c: &Campaign) -> Self {
        Self {
            id: c.id.clone(),
            title: c.title.clone(),
            location_lat: c.location_lat,
            location_lng: c.location_lng,
            status: c.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationStatus {
    Pending,
    Approved,
    Rejected,
}

/// Row in the `participations` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub id: String,
    pub campaign_id: String,
    pub user_id: String,
    pub status: ParticipationStatus,
    #[serde(default)]
    pub after_photo_url: Option<String>,
    #[serde(default)]
    pub points_earned: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// REWARDS & POINTS
// ============================================================================

/// Row in the `rewards` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cost: i64,
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub quantity_available: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Earned,
    Spent,
}

/// Row in the `transactions` table (points ledger).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub description: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub reward_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Signed contribution of a ledger entry to a points balance.
pub fn ledger_delta(tx: &Transaction) -> i64 {
    match tx.kind {
        TransactionType::Earned => tx.amount,
        TransactionType::Spent => -tx.amount,
    }
}

// ============================================================================
// UI RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
    Warning,
}

/// Transient toast shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
}

/// Error recorded in the state store's bounded error list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: u64,
    pub message: String,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}
