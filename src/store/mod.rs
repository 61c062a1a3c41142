//! Config store: site records and key/value settings in SQLite.
//!
//! All values are bound parameters, so keys and values may contain any
//! characters (quotes included) without escaping.
//!
//! | Module   | Responsibility                                          |
//! |----------|---------------------------------------------------------|
//! | `models` | `Site`, `Multisite`, `MultisiteType`, `Setting`         |
//! | `db`     | `ConfigDb` (sync rusqlite) and `StoreHandle` (async)    |

pub mod db;
pub mod models;

use std::path::PathBuf;

pub use db::{ConfigDb, StoreHandle};
pub use models::{Multisite, MultisiteType, Setting, Site};

use crate::config::DevwpConfig;

pub const WEBROOT_PATH_KEY: &str = "webroot_path";
pub const XDEBUG_ENABLED_KEY: &str = "xdebug_enabled";

/// Reads of the well-known settings. Store failures on these paths are not
/// fatal: they are logged and the default is returned.
#[derive(Clone)]
pub struct Settings {
    store: StoreHandle,
    /// Used when no `webroot_path` setting exists
    default_webroot: PathBuf,
}

impl Settings {
    pub fn new(store: StoreHandle, config: &DevwpConfig) -> Self {
        Self {
            store,
            default_webroot: config
                .paths
                .webroot
                .clone()
                .unwrap_or_else(DevwpConfig::default_webroot),
        }
    }

    pub async fn webroot_path(&self) -> PathBuf {
        match self.store.get_setting(WEBROOT_PATH_KEY).await {
            Ok(Some(value)) if !value.trim().is_empty() => PathBuf::from(value),
            Ok(_) => self.default_webroot.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read webroot_path, using default");
                self.default_webroot.clone()
            }
        }
    }

    /// `None` when the store could not be read, so callers can fall back to
    /// a cached value.
    pub async fn xdebug_enabled(&self) -> Option<bool> {
        match self.store.get_setting(XDEBUG_ENABLED_KEY).await {
            Ok(Some(value)) => Some(parse_bool(&value)),
            Ok(None) => Some(false),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read xdebug_enabled");
                None
            }
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        let mut config = DevwpConfig::default();
        config.paths.webroot = Some(PathBuf::from("/home/dev/www"));
        Settings::new(StoreHandle::open_in_memory().unwrap(), &config)
    }

    #[tokio::test]
    async fn webroot_defaults_when_unset() {
        let s = settings();
        assert_eq!(s.webroot_path().await, PathBuf::from("/home/dev/www"));
    }

    #[tokio::test]
    async fn webroot_reads_setting() {
        let s = settings();
        s.store().save_setting(WEBROOT_PATH_KEY, "/srv/sites").await.unwrap();
        assert_eq!(s.webroot_path().await, PathBuf::from("/srv/sites"));
    }

    #[tokio::test]
    async fn xdebug_defaults_false_and_parses() {
        let s = settings();
        assert_eq!(s.xdebug_enabled().await, Some(false));
        s.store().save_setting(XDEBUG_ENABLED_KEY, "true").await.unwrap();
        assert_eq!(s.xdebug_enabled().await, Some(true));
        s.store().save_setting(XDEBUG_ENABLED_KEY, "0").await.unwrap();
        assert_eq!(s.xdebug_enabled().await, Some(false));
    }

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }
}
