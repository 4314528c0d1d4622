//! Application state record
//!
//! The state is a single JSON object. Well-known slices have typed
//! accessors; anything else is reachable through dot paths so page code can
//! park ad-hoc UI state (`"filters.neighborhood"`) without touching this file.

use clean_quarter_types::{Campaign, ErrorRecord, Notification, Reward, User};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// =============================================================================
// SLICE KEYS
// =============================================================================

pub mod keys {
    pub const USER: &str = "user";
    pub const IS_AUTHENTICATED: &str = "is_authenticated";
    pub const IS_LOADING: &str = "is_loading";
    pub const CAMPAIGNS: &str = "campaigns";
    pub const CURRENT_CAMPAIGN: &str = "current_campaign";
    pub const CAMPAIGNS_LOADING: &str = "campaigns_loading";
    pub const CAMPAIGNS_ERROR: &str = "campaigns_error";
    pub const USER_PROFILE: &str = "user_profile";
    pub const PROFILE_LOADING: &str = "profile_loading";
    pub const PROFILE_ERROR: &str = "profile_error";
    pub const REWARDS: &str = "rewards";
    pub const REWARDS_LOADING: &str = "rewards_loading";
    pub const REWARDS_ERROR: &str = "rewards_error";
    pub const CURRENT_LANGUAGE: &str = "current_language";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const ERRORS: &str = "errors";
}

/// Pending change to the state, as seen by middleware.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    /// Shallow merge of top-level keys.
    Merge(Map<String, Value>),
    /// Assignment at a dot path, creating intermediate objects.
    Path { path: String, value: Value },
}

impl StateUpdate {
    pub fn path(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Path {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Build a merge from a `json!({...})` literal. Non-objects yield an empty merge.
    pub fn merge(partial: Value) -> Self {
        match partial {
            Value::Object(map) => Self::Merge(map),
            _ => Self::Merge(Map::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppState(Map<String, Value>);

impl AppState {
    pub fn initial(language: &str) -> Self {
        let mut map = Map::new();
        let mut put = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };

        put(keys::USER, Value::Null);
        put(keys::IS_AUTHENTICATED, json!(false));
        put(keys::IS_LOADING, json!(false));

        put(keys::CAMPAIGNS, json!([]));
        put(keys::CURRENT_CAMPAIGN, Value::Null);
        put(keys::CAMPAIGNS_LOADING, json!(false));
        put(keys::CAMPAIGNS_ERROR, Value::Null);

        put(keys::USER_PROFILE, Value::Null);
        put(keys::PROFILE_LOADING, json!(false));
        put(keys::PROFILE_ERROR, Value::Null);

        put(keys::REWARDS, json!([]));
        put(keys::REWARDS_LOADING, json!(false));
        put(keys::REWARDS_ERROR, Value::Null);

        put(keys::CURRENT_LANGUAGE, json!(language));
        put(keys::NOTIFICATIONS, json!([]));
        put(keys::ERRORS, json!([]));

        Self(map)
    }

    /// Dot-path lookup. Array segments accept numeric indices.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn merge(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.0.insert(key, value);
        }
    }

    /// Assign at a dot path. Missing or non-object intermediates become
    /// empty objects. Returns `false` for an empty path.
    pub fn set_path(&mut self, path: &str, value: Value) -> bool {
        if path.is_empty() {
            return false;
        }
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = segments.pop().unwrap_or(path);

        let mut current = &mut self.0;
        for segment in segments {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = match slot {
                Value::Object(map) => map,
                _ => unreachable!("slot was just made an object"),
            };
        }
        current.insert(last.to_string(), value);
        true
    }

    pub(crate) fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Merge(partial) => self.merge(partial),
            StateUpdate::Path { path, value } => {
                if !self.set_path(&path, value) {
                    tracing::warn!("ignoring state update with empty path");
                }
            }
        }
    }

    pub(crate) fn list_mut(&mut self, key: &str) -> &mut Vec<Value> {
        let slot = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => items,
            _ => unreachable!("slot was just made an array"),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    fn typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn flag(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    // -------------------------------------------------------------------------
    // Typed accessors
    // -------------------------------------------------------------------------

    pub fn user(&self) -> Option<User> {
        self.typed(keys::USER)
    }

    pub fn is_authenticated(&self) -> bool {
        self.flag(keys::IS_AUTHENTICATED)
    }

    pub fn is_loading(&self) -> bool {
        self.flag(keys::IS_LOADING)
    }

    pub fn campaigns(&self) -> Vec<Campaign> {
        self.typed(keys::CAMPAIGNS).unwrap_or_default()
    }

    pub fn current_campaign(&self) -> Option<Campaign> {
        self.typed(keys::CURRENT_CAMPAIGN)
    }

    pub fn rewards(&self) -> Vec<Reward> {
        self.typed(keys::REWARDS).unwrap_or_default()
    }

    pub fn current_language(&self) -> &str {
        self.0
            .get(keys::CURRENT_LANGUAGE)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.typed(keys::NOTIFICATIONS).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.typed(keys::ERRORS).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_has_every_slice() {
        let state = AppState::initial("bg");
        assert_eq!(state.current_language(), "bg");
        assert!(!state.is_authenticated());
        assert!(state.user().is_none());
        assert!(state.campaigns().is_empty());
        assert_eq!(state.get("notifications"), Some(&json!([])));
    }

    #[test]
    fn get_walks_objects_and_arrays() {
        let mut state = AppState::initial("en");
        state.merge(
            json!({"campaigns": [{"id": "c1"}, {"id": "c2"}]})
                .as_object()
                .unwrap()
                .clone(),
        );
        assert_eq!(state.get("campaigns.1.id"), Some(&json!("c2")));
        assert_eq!(state.get("campaigns.9.id"), None);
        assert_eq!(state.get("user.id"), None);
        assert_eq!(state.get("nope"), None);
        assert_eq!(state.get(""), None);
    }

    #[test]
    fn set_path_creates_intermediates() {
        let mut state = AppState::initial("en");
        assert!(state.set_path("a.b.c", json!(1)));
        assert_eq!(state.get("a.b.c"), Some(&json!(1)));
        assert!(state.get("a.b").unwrap().is_object());
    }

    #[test]
    fn set_path_replaces_scalar_intermediate() {
        let mut state = AppState::initial("en");
        state.set_path("a", json!(5));
        state.set_path("a.b", json!(true));
        assert_eq!(state.get("a"), Some(&json!({"b": true})));
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut state = AppState::initial("en");
        let before = state.clone();
        assert!(!state.set_path("", json!(1)));
        assert_eq!(state, before);
    }

    #[test]
    fn merge_is_shallow() {
        let mut state = AppState::initial("en");
        state.set_path("prefs.theme", json!("dark"));
        state.apply(StateUpdate::merge(json!({"prefs": {"font": "big"}})));
        assert_eq!(state.get("prefs.theme"), None);
        assert_eq!(state.get("prefs.font"), Some(&json!("big")));
    }
}
