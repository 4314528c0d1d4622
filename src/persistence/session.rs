//! The signed-in user as remembered between page loads.

use clean_quarter_types::User;

use super::{get_json, keys, set_json, LocalStore};
use crate::navigation::Navigator;

/// Failures are logged; a page load never breaks over local storage.
pub fn save_user(store: &dyn LocalStore, user: &User) {
    if let Err(e) = set_json(store, keys::USER, user) {
        tracing::error!(error = %e, "failed to save user");
    }
}

pub fn current_user(store: &dyn LocalStore) -> Option<User> {
    get_json(store, keys::USER)
}

pub fn remove_user(store: &dyn LocalStore) {
    if let Err(e) = store.remove(keys::USER) {
        tracing::error!(error = %e, "failed to remove user");
    }
}

/// `true` when a user is remembered; otherwise navigates to `redirect`.
pub fn require_auth(store: &dyn LocalStore, navigator: &dyn Navigator, redirect: &str) -> bool {
    if current_user(store).is_some() {
        return true;
    }
    navigator.navigate(redirect);
    false
}
