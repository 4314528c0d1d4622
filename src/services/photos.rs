//! Campaign photos in object storage.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;

use super::alerts::{Alert, Alerts};
use crate::backend::{Backend, FileUpload, CAMPAIGN_PHOTOS_BUCKET};
use crate::errors::{AppError, ErrorKind};

pub const DEFAULT_FOLDER: &str = "photos";

const SUFFIX_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

pub struct PhotoService {
    backend: Arc<dyn Backend>,
    alerts: Arc<dyn Alerts>,
}

impl PhotoService {
    pub fn new(backend: Arc<dyn Backend>, alerts: Arc<dyn Alerts>) -> Self {
        Self { backend, alerts }
    }

    fn fail(&self, context: &str, user_message: &str, error: AppError) -> AppError {
        tracing::error!(context, error = %error, "photo operation failed");
        self.alerts.show(Alert::error("Error", user_message));
        error
    }

    /// Store `file` as `<folder>/<millis>-<suffix>-<name>` and return its
    /// public URL.
    pub async fn upload_campaign_photo(
        &self,
        file: &FileUpload,
        folder: Option<&str>,
    ) -> Result<String, AppError> {
        const USER_MESSAGE: &str = "Failed to upload photo. Please try again.";

        if file.name.trim().is_empty() {
            let error = AppError::new("No file provided", ErrorKind::Validation);
            return Err(self.fail("upload_campaign_photo", USER_MESSAGE, error));
        }

        let path = object_path(folder.unwrap_or(DEFAULT_FOLDER), &file.name);
        let stored = self
            .backend
            .upload(CAMPAIGN_PHOTOS_BUCKET, &path, file)
            .await
            .map_err(|e| {
                let error = AppError::from(e.clone())
                    .with_message(format!("Upload failed: {}", e.message()));
                self.fail("upload_campaign_photo", USER_MESSAGE, error)
            })?;

        tracing::info!(path = %stored, bytes = file.bytes.len(), "photo uploaded");
        Ok(self.backend.public_url(CAMPAIGN_PHOTOS_BUCKET, &stored))
    }

    pub async fn delete_campaign_photo(&self, path: &str) -> Result<(), AppError> {
        self.backend
            .remove(CAMPAIGN_PHOTOS_BUCKET, &[path.to_string()])
            .await
            .map_err(|e| {
                let error = AppError::from(e.clone())
                    .with_message(format!("Delete failed: {}", e.message()));
                self.fail(
                    "delete_campaign_photo",
                    "Failed to delete photo. Please try again.",
                    error,
                )
            })
    }
}

/// Collision-resistant object path for an uploaded file.
pub fn object_path(folder: &str, name: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())] as char)
        .collect();
    format!("{folder}/{}-{suffix}-{name}", Utc::now().timestamp_millis())
}
