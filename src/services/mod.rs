//! Page-facing services over the backend seams.

pub mod alerts;
pub mod auth;
pub mod campaigns;
pub mod photos;

pub use alerts::{Alert, AlertKind, Alerts, RecordingAlerts, StoreAlerts};
pub use auth::{AuthService, RegisterMeta};
pub use campaigns::CampaignService;
pub use photos::PhotoService;
