//! Demo mode
//!
//! A fixed dataset (one admin, five campaigns, a few participations, ten
//! rewards and a short points ledger) that lets the app run without a
//! backend. The dataset ships with the crate; [`init_demo_mode`] copies it
//! into local storage where the pages read it back.

use clean_quarter_types::{Campaign, Participation, Reward, Transaction, User};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persistence::{get_json, set_json, LocalStore, PersistenceError};

pub const DEMO_EMAIL: &str = "admin@demo.com";
pub const DEMO_PASSWORD: &str = "demo123";

const DATASET: &str = include_str!("../data/demo.json");

pub mod keys {
    pub const MODE: &str = "CLEAN_QUARTER_DEMO_MODE";
    pub const USER: &str = "CLEAN_QUARTER_DEMO_USER";
    pub const CAMPAIGNS: &str = "CLEAN_QUARTER_DEMO_CAMPAIGNS";
    pub const PARTICIPATIONS: &str = "CLEAN_QUARTER_DEMO_PARTICIPATIONS";
    pub const REWARDS: &str = "CLEAN_QUARTER_DEMO_REWARDS";
    pub const TRANSACTIONS: &str = "CLEAN_QUARTER_DEMO_TRANSACTIONS";

    pub const ALL: [&str; 6] = [MODE, USER, CAMPAIGNS, PARTICIPATIONS, REWARDS, TRANSACTIONS];
}

#[derive(Debug, Error)]
pub enum DemoError {
    #[error("demo dataset is malformed: {0}")]
    Dataset(#[from] serde_json::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoDataset {
    pub user: User,
    pub campaigns: Vec<Campaign>,
    pub participations: Vec<Participation>,
    pub rewards: Vec<Reward>,
    pub transactions: Vec<Transaction>,
}

impl DemoDataset {
    /// The dataset bundled with the crate.
    pub fn builtin() -> Result<Self, DemoError> {
        Ok(serde_json::from_str(DATASET)?)
    }
}

pub fn is_demo_credentials(email: &str, password: &str) -> bool {
    email.trim().eq_ignore_ascii_case(DEMO_EMAIL) && password == DEMO_PASSWORD
}

/// Write the bundled dataset to `local` and switch demo mode on.
pub fn init_demo_mode(local: &dyn LocalStore) -> Result<DemoDataset, DemoError> {
    let dataset = DemoDataset::builtin()?;

    local.set(keys::MODE, "true")?;
    set_json(local, keys::USER, &dataset.user)?;
    set_json(local, keys::CAMPAIGNS, &dataset.campaigns)?;
    set_json(local, keys::PARTICIPATIONS, &dataset.participations)?;
    set_json(local, keys::REWARDS, &dataset.rewards)?;
    set_json(local, keys::TRANSACTIONS, &dataset.transactions)?;

    tracing::info!(
        campaigns = dataset.campaigns.len(),
        rewards = dataset.rewards.len(),
        "demo mode initialized"
    );
    Ok(dataset)
}

/// Initialize demo mode and remember the demo admin as the signed-in user.
pub fn demo_login(local: &dyn LocalStore) -> Result<User, DemoError> {
    let dataset = init_demo_mode(local)?;
    set_json(local, crate::persistence::keys::USER, &dataset.user)?;
    Ok(dataset.user)
}

pub fn is_demo_mode(local: &dyn LocalStore) -> bool {
    local.get(keys::MODE).as_deref() == Some("true")
}

pub fn demo_user(local: &dyn LocalStore) -> Option<User> {
    get_json(local, keys::USER)
}

pub fn demo_campaigns(local: &dyn LocalStore) -> Vec<Campaign> {
    get_json(local, keys::CAMPAIGNS).unwrap_or_default()
}

pub fn campaign_by_id(local: &dyn LocalStore, id: &str) -> Option<Campaign> {
    demo_campaigns(local).into_iter().find(|c| c.id == id)
}

pub fn demo_participations(local: &dyn LocalStore) -> Vec<Participation> {
    get_json(local, keys::PARTICIPATIONS).unwrap_or_default()
}

pub fn demo_rewards(local: &dyn LocalStore) -> Vec<Reward> {
    get_json(local, keys::REWARDS).unwrap_or_default()
}

pub fn demo_transactions(local: &dyn LocalStore) -> Vec<Transaction> {
    get_json(local, keys::TRANSACTIONS).unwrap_or_default()
}

/// Remove every demo key. The remembered user is left alone.
pub fn clear_demo_mode(local: &dyn LocalStore) {
    for key in keys::ALL {
        if let Err(e) = local.remove(key) {
            tracing::warn!(key, error = %e, "failed to clear demo key");
        }
    }
}
