use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::*;
use crate::errors::DevwpError;

/// Async-safe handle to the config store.
///
/// Wraps `ConfigDb` behind `Arc<Mutex>` and runs every query on tokio's
/// blocking pool. Failures surface as `DevwpError::Store` with the full
/// context chain as the diagnostic.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<std::sync::Mutex<ConfigDb>>,
}

impl StoreHandle {
    pub fn new(db: ConfigDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> crate::errors::Result<Self> {
        let db = ConfigDb::new(path).map_err(store_error)?;
        Ok(Self::new(db))
    }

    pub fn open_in_memory() -> crate::errors::Result<Self> {
        let db = ConfigDb::new_in_memory().map_err(store_error)?;
        Ok(Self::new(db))
    }

    /// Run a closure with access to the database on a blocking thread.
    pub async fn call<F, R>(&self, f: F) -> crate::errors::Result<R>
    where
        F: FnOnce(&ConfigDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("Store lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .map_err(|e| DevwpError::Store(format!("Store task panicked: {}", e)))?
        .map_err(store_error)
    }

    pub async fn save_site(&self, site: Site) -> crate::errors::Result<Site> {
        self.call(move |db| db.save_site(&site)).await
    }

    pub async fn get_site(&self, domain: &str) -> crate::errors::Result<Option<Site>> {
        let domain = domain.to_string();
        self.call(move |db| db.get_site(&domain)).await
    }

    pub async fn list_sites(&self) -> crate::errors::Result<Vec<Site>> {
        self.call(|db| db.list_sites()).await
    }

    pub async fn delete_site(&self, domain: &str) -> crate::errors::Result<()> {
        let domain = domain.to_string();
        self.call(move |db| db.delete_site(&domain)).await
    }

    pub async fn save_setting(&self, key: &str, value: &str) -> crate::errors::Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.call(move |db| db.save_setting(&key, &value)).await
    }

    pub async fn get_setting(&self, key: &str) -> crate::errors::Result<Option<String>> {
        let key = key.to_string();
        self.call(move |db| db.get_setting(&key)).await
    }

    pub async fn list_settings(&self) -> crate::errors::Result<BTreeMap<String, String>> {
        self.call(|db| db.list_settings()).await
    }

    pub async fn setting_record(&self, key: &str) -> crate::errors::Result<Option<Setting>> {
        let key = key.to_string();
        self.call(move |db| db.setting_record(&key)).await
    }

    pub async fn delete_setting(&self, key: &str) -> crate::errors::Result<()> {
        let key = key.to_string();
        self.call(move |db| db.delete_setting(&key)).await
    }
}

fn store_error(e: anyhow::Error) -> DevwpError {
    DevwpError::Store(format!("{:#}", e))
}

pub struct ConfigDb {
    conn: Connection,
}

impl ConfigDb {
    /// Open (or create) the SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.run_migrations().context("Failed to run migrations")?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS sites (
                    domain TEXT PRIMARY KEY,
                    aliases TEXT,
                    web_root TEXT,
                    multisite_enabled INTEGER NOT NULL DEFAULT 0,
                    multisite_type TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS settings (
                    key_name TEXT PRIMARY KEY,
                    value_text TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Sites ─────────────────────────────────────────────────────────

    /// Insert or update a site keyed by domain. `created_at` survives updates.
    pub fn save_site(&self, site: &Site) -> Result<Site> {
        let (enabled, kind) = match site.multisite_kind() {
            Some(kind) => (1, Some(kind.as_str())),
            None => (0, None),
        };
        self.conn
            .execute(
                "INSERT INTO sites (domain, aliases, web_root, multisite_enabled, multisite_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'), datetime('now'))
                 ON CONFLICT(domain) DO UPDATE SET
                    aliases = excluded.aliases,
                    web_root = excluded.web_root,
                    multisite_enabled = excluded.multisite_enabled,
                    multisite_type = excluded.multisite_type,
                    updated_at = datetime('now')",
                params![site.domain, site.aliases, site.web_root, enabled, kind],
            )
            .context("Failed to upsert site")?;
        self.get_site(&site.domain)?
            .ok_or_else(|| anyhow::anyhow!("Site {} vanished after save", site.domain))
    }

    pub fn get_site(&self, domain: &str) -> Result<Option<Site>> {
        self.conn
            .query_row(
                "SELECT domain, aliases, web_root, multisite_enabled, multisite_type, created_at, updated_at
                 FROM sites WHERE domain = ?1",
                params![domain],
                Self::row_to_site,
            )
            .optional()
            .context("Failed to query site")
    }

    pub fn list_sites(&self) -> Result<Vec<Site>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT domain, aliases, web_root, multisite_enabled, multisite_type, created_at, updated_at
                 FROM sites ORDER BY domain",
            )
            .context("Failed to prepare list_sites")?;
        let rows = stmt
            .query_map([], Self::row_to_site)
            .context("Failed to query sites")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read site row")
    }

    pub fn delete_site(&self, domain: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sites WHERE domain = ?1", params![domain])
            .context("Failed to delete site")?;
        Ok(())
    }

    fn row_to_site(row: &rusqlite::Row<'_>) -> rusqlite::Result<Site> {
        let enabled: i64 = row.get(3)?;
        let kind: Option<String> = row.get(4)?;
        let multisite = match (enabled, kind) {
            (0, _) | (_, None) => None,
            (_, Some(k)) => MultisiteType::from_str(&k).ok().map(|kind| Multisite {
                enabled: true,
                kind,
            }),
        };
        Ok(Site {
            domain: row.get(0)?,
            aliases: row.get(1)?,
            web_root: row.get(2)?,
            multisite,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    // ── Settings ──────────────────────────────────────────────────────

    pub fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key_name, value_text, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key_name) DO UPDATE SET value_text = excluded.value_text, updated_at = datetime('now')",
                params![key, value],
            )
            .context("Failed to upsert setting")?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value_text FROM settings WHERE key_name = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("Failed to query setting")
    }

    pub fn list_settings(&self) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key_name, value_text FROM settings")
            .context("Failed to prepare list_settings")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("Failed to query settings")?;
        rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .context("Failed to read setting row")
    }

    pub fn setting_record(&self, key: &str) -> Result<Option<Setting>> {
        self.conn
            .query_row(
                "SELECT key_name, value_text, updated_at FROM settings WHERE key_name = ?1",
                params![key],
                |row| {
                    Ok(Setting {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query setting")
    }

    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key_name = ?1", params![key])
            .context("Failed to delete setting")?;
        Ok(())
    }
}
