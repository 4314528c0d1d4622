//! Translations
//!
//! One JSON tree per language, looked up with dot-separated keys
//! (`nav.dashboard`). A key without a translation renders as itself. The
//! chosen language is persisted locally and mirrored into the store's
//! `current_language`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;

use crate::persistence::{keys, LocalStore};
use crate::state::{keys as state_keys, Store};

pub const DEFAULT_LANGUAGE: &str = "bg";

const BUNDLED: [(&str, &str); 2] = [
    ("bg", include_str!("../data/i18n/bg.json")),
    ("en", include_str!("../data/i18n/en.json")),
];

#[derive(Debug, Error)]
pub enum I18nError {
    #[error("language not supported: {0}")]
    Unsupported(String),

    #[error("failed to read translations from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid translation file {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct I18n {
    translations: RwLock<BTreeMap<String, Value>>,
    current: RwLock<String>,
    local: Arc<dyn LocalStore>,
    store: Option<Store>,
}

impl I18n {
    /// No translations yet; the language comes from local storage or
    /// `default_language`.
    pub fn new(local: Arc<dyn LocalStore>, default_language: &str) -> Self {
        let current = local
            .get(keys::LANGUAGE)
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| default_language.to_string());
        Self {
            translations: RwLock::new(BTreeMap::new()),
            current: RwLock::new(current),
            local,
            store: None,
        }
    }

    /// Mirror language changes into `store`.
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Load the Bulgarian and English trees shipped with the crate.
    pub fn load_bundled(&self) -> Result<(), I18nError> {
        for (lang, text) in BUNDLED {
            let tree = serde_json::from_str(text).map_err(|source| I18nError::Parse {
                origin: format!("bundled {lang}"),
                source,
            })?;
            self.insert(lang, tree);
        }
        tracing::info!(languages = ?self.available_languages(), "i18n initialized");
        Ok(())
    }

    /// Load every `<lang>.json` in `dir`. Returns how many languages were read.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize, I18nError> {
        let dir = dir.as_ref();
        let io = |source| I18nError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut loaded = 0;
        for entry in std::fs::read_dir(dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path).map_err(|source| I18nError::Io {
                path: path.clone(),
                source,
            })?;
            let tree = serde_json::from_str(&text).map_err(|source| I18nError::Parse {
                origin: path.display().to_string(),
                source,
            })?;
            self.insert(lang, tree);
            loaded += 1;
        }
        tracing::info!(dir = %dir.display(), loaded, "translations loaded");
        Ok(loaded)
    }

    pub fn insert(&self, lang: impl Into<String>, tree: Value) {
        self.translations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(lang.into(), tree);
    }

    /// Translation of `key` in the current language.
    pub fn t(&self, key: &str) -> String {
        self.t_in(key, &self.current_language())
    }

    /// Translation of `key` in `lang`; the key itself when missing.
    pub fn t_in(&self, key: &str, lang: &str) -> String {
        let translations = self.translations.read().unwrap_or_else(PoisonError::into_inner);
        let mut node = translations.get(lang);
        for part in key.split('.') {
            node = node.and_then(|n| n.get(part));
        }
        match node.and_then(Value::as_str) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => key.to_string(),
        }
    }

    pub fn set_language(&self, lang: &str) -> Result<(), I18nError> {
        let supported = self
            .translations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(lang);
        if !supported {
            tracing::error!(lang, "language not supported");
            return Err(I18nError::Unsupported(lang.to_string()));
        }

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = lang.to_string();
        if let Err(e) = self.local.set(keys::LANGUAGE, lang) {
            tracing::warn!(error = %e, "failed to persist language");
        }
        if let Some(store) = &self.store {
            store.set_path(state_keys::CURRENT_LANGUAGE, lang);
        }
        tracing::info!(lang, "language changed");
        Ok(())
    }

    pub fn current_language(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn available_languages(&self) -> Vec<String> {
        self.translations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for I18n {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I18n")
            .field("current", &self.current_language())
            .field("languages", &self.available_languages())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::persistence::MemoryLocalStore;
    use serde_json::json;

    fn bundled() -> (I18n, Arc<MemoryLocalStore>) {
        let local = Arc::new(MemoryLocalStore::new());
        let i18n = I18n::new(local.clone(), DEFAULT_LANGUAGE);
        i18n.load_bundled().unwrap();
        (i18n, local)
    }

    #[test]
    fn lookup_with_fallback_to_key() {
        let (i18n, _) = bundled();
        assert_eq!(i18n.current_language(), "bg");
        assert_eq!(i18n.t("nav.dashboard"), "Табло");
        assert_eq!(i18n.t_in("nav.dashboard", "en"), "Dashboard");
        assert_eq!(i18n.t_in("campaign.status.completed", "en"), "Completed");
        assert_eq!(i18n.t("nonexistent_key"), "nonexistent_key");
        assert_eq!(i18n.t("nav"), "nav");
        assert_eq!(i18n.t_in("nav.dashboard", "de"), "nav.dashboard");
        assert_eq!(i18n.available_languages(), vec!["bg", "en"]);
    }

    #[test]
    fn set_language_persists_and_mirrors() {
        let store = Store::new(StoreConfig::default());
        let local = Arc::new(MemoryLocalStore::new());
        let i18n = I18n::new(local.clone(), DEFAULT_LANGUAGE).with_store(store.clone());
        i18n.load_bundled().unwrap();

        i18n.set_language("en").unwrap();
        assert_eq!(i18n.t("nav.logout"), "Logout");
        assert_eq!(local.get(keys::LANGUAGE).as_deref(), Some("en"));
        assert_eq!(store.snapshot().current_language(), "en");

        assert!(matches!(
            i18n.set_language("fr"),
            Err(I18nError::Unsupported(lang)) if lang == "fr"
        ));
        assert_eq!(i18n.current_language(), "en");
    }

    #[test]
    fn persisted_language_wins_over_default() {
        let local = Arc::new(MemoryLocalStore::new());
        local.set(keys::LANGUAGE, "en").unwrap();
        assert_eq!(I18n::new(local, DEFAULT_LANGUAGE).current_language(), "en");
    }

    #[test]
    fn load_dir_reads_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("de.json"), json!({"nav": {"rewards": "Prämien"}}).to_string()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (i18n, _) = bundled();
        assert_eq!(i18n.load_dir(dir.path()).unwrap(), 1);
        i18n.set_language("de").unwrap();
        assert_eq!(i18n.t("nav.rewards"), "Prämien");
    }

    #[test]
    fn broken_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bg.json"), "{").unwrap();
        let (i18n, _) = bundled();
        assert!(matches!(i18n.load_dir(dir.path()), Err(I18nError::Parse { .. })));
    }
}
