//! Registration, sign-in and sign-out.

use std::sync::Arc;

use clean_quarter_types::User;
use serde_json::json;

use super::alerts::{Alert, Alerts};
use crate::backend::{tables, Backend, BackendError};
use crate::errors::{AppError, ErrorHandler};
use crate::persistence::{session, LocalStore};
use crate::state::Store;

/// Extra sign-up fields stored on the profile row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterMeta {
    pub neighborhood: Option<String>,
}

pub struct AuthService {
    backend: Arc<dyn Backend>,
    store: Store,
    handler: Arc<ErrorHandler>,
    alerts: Arc<dyn Alerts>,
    local: Arc<dyn LocalStore>,
}

impl AuthService {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Store,
        handler: Arc<ErrorHandler>,
        alerts: Arc<dyn Alerts>,
        local: Arc<dyn LocalStore>,
    ) -> Self {
        Self {
            backend,
            store,
            handler,
            alerts,
            local,
        }
    }

    /// Show `title` with the backend's message, then hand the failure to the
    /// error handler.
    fn fail(&self, title: &str, error: BackendError) -> AppError {
        tracing::warn!(title, error = %error, "auth operation failed");
        self.alerts.show(Alert::error(title, error.message()));
        self.handler.handle(error)
    }

    /// Create the account and its `profiles` row.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        meta: RegisterMeta,
    ) -> Result<User, AppError> {
        let auth = self
            .backend
            .sign_up(email, password)
            .await
            .map_err(|e| self.fail("Грешка при регистрация", e))?;

        let profile = json!({
            "id": auth.user.id,
            "username": username_for(email),
            "role": "user",
            "points_balance": 0,
            "neighborhood": meta.neighborhood,
        });
        self.backend
            .insert(tables::PROFILES, profile)
            .await
            .map_err(|e| self.fail("Грешка при създаване на профил", e))?;

        self.alerts
            .show(Alert::success("Успешна регистрация!", "Вашият акаунт е създаден."));
        tracing::info!(user_id = %auth.user.id, "registered");
        Ok(auth.user)
    }

    /// Sign in, publish the user to the store and remember it locally.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let auth = self
            .backend
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| self.fail("Грешка при влизане", e))?;

        self.alerts.show(Alert::success(
            "Успешно влизане!",
            format!("Добре дошли, {email}"),
        ));

        self.store.merge(json!({
            "user": auth.user,
            "is_authenticated": true,
        }));
        session::save_user(self.local.as_ref(), &auth.user);

        tracing::info!(user_id = %auth.user.id, "logged in");
        Ok(auth.user)
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        self.backend
            .sign_out()
            .await
            .map_err(|e| self.fail("Грешка при излизане", e))?;

        self.alerts.show(Alert::success("Излязохте успешно", "До скоро!"));

        self.store.merge(json!({
            "user": null,
            "is_authenticated": false,
        }));
        session::remove_user(self.local.as_ref());
        Ok(())
    }

    /// The signed-in user; lookup failures are logged and read as signed out.
    pub async fn current_user(&self) -> Option<User> {
        match self.backend.get_user().await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(error = %e, "get user failed");
                None
            }
        }
    }
}

/// Part of the address before `@`.
fn username_for(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}
