//! Request surface consumed by a front end (the bundled CLI, or a GUI shell).
//!
//! Each method maps to one user-facing operation. Streaming operations take
//! an `mpsc::Sender` and push events as they happen; the caller owns the
//! receiving side and cancels by dropping it.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::containers::{Container, ContainerSupervisor};
use crate::context::AppContext;
use crate::errors::{DevwpError, Result};
use crate::events::{CommandEvent, ProgressEvent, StatusUpdate};
use crate::poller::StatusPoller;
use crate::site::{CreateOutcome, DeleteOutcome, SiteEntry, SiteManager};
use crate::store::{Setting, Site};
use crate::xdebug::XdebugController;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub version: String,
    pub log_dir: PathBuf,
    pub webroot: PathBuf,
    pub database: PathBuf,
}

pub struct DevwpApi {
    ctx: Arc<AppContext>,
    sites: SiteManager,
    containers: Arc<ContainerSupervisor>,
    poller: StatusPoller,
    xdebug: XdebugController,
}

impl DevwpApi {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let containers = Arc::new(ContainerSupervisor::new(
            ctx.config.clone(),
            ctx.runner.clone(),
        ));
        Self {
            sites: SiteManager::new(ctx.clone()),
            poller: StatusPoller::new(containers.clone()),
            xdebug: XdebugController::new(ctx.clone()),
            containers,
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    // Sites

    pub async fn list_sites(&self) -> Result<Vec<SiteEntry>> {
        self.sites.list_sites().await
    }

    pub async fn get_site(&self, domain: &str) -> Result<Option<Site>> {
        self.ctx.store.get_site(domain).await
    }

    /// Stored site records, independent of what is on disk.
    pub async fn site_records(&self) -> Result<Vec<Site>> {
        self.ctx.store.list_sites().await
    }

    pub async fn create_site(
        &self,
        site: Site,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<CreateOutcome> {
        self.sites.create_site(site, progress).await
    }

    pub async fn update_site(&self, site: Site) -> Result<Site> {
        self.sites.update_site(site).await
    }

    pub async fn delete_site(&self, domain: &str) -> Result<DeleteOutcome> {
        self.sites.delete_site(domain).await
    }

    pub async fn run_wp_cli(
        &self,
        domain: &str,
        args: Vec<String>,
        tx: mpsc::Sender<CommandEvent>,
    ) -> Result<i32> {
        self.sites.run_wp_cli(domain, args, tx).await
    }

    // Settings

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.ctx.store.get_setting(key).await
    }

    pub async fn setting_record(&self, key: &str) -> Result<Option<Setting>> {
        self.ctx.store.setting_record(key).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(DevwpError::Validation("setting key must not be empty".to_string()));
        }
        self.ctx.store.save_setting(key, value).await
    }

    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        self.ctx.store.delete_setting(key).await
    }

    pub async fn list_settings(&self) -> Result<BTreeMap<String, String>> {
        self.ctx.store.list_settings().await
    }

    // Containers

    pub async fn list_containers(&self) -> Result<Vec<Container>> {
        self.containers.list_containers().await
    }

    pub async fn restart_container(&self, id: &str) -> bool {
        self.containers.restart(id).await
    }

    pub async fn start_containers(&self, tx: &mpsc::Sender<ProgressEvent>) -> Result<()> {
        self.containers.start_group(tx).await
    }

    pub async fn stop_containers(&self) -> Result<()> {
        self.containers.stop_group().await
    }

    /// Begin polling container status at the configured interval. Calling
    /// again replaces the previous subscription.
    pub fn watch_containers(&self) -> mpsc::Receiver<StatusUpdate> {
        self.poller.start(self.ctx.config.containers.poll_interval())
    }

    pub fn stop_watching(&self) {
        self.poller.stop();
    }

    pub fn latest_status(&self) -> StatusUpdate {
        self.poller.latest()
    }

    // Debug mode

    pub async fn xdebug_status(&self) -> bool {
        self.xdebug.status().await
    }

    pub async fn toggle_xdebug(&self, tx: &mpsc::Sender<ProgressEvent>) -> Result<bool> {
        self.xdebug.toggle(tx).await
    }

    pub async fn set_xdebug(&self, enabled: bool, tx: &mpsc::Sender<ProgressEvent>) -> Result<()> {
        self.xdebug.set_enabled(enabled, tx).await
    }

    // Desktop

    /// Open a local path or an http(s) URL with the system handler.
    pub fn open_target(&self, target: &str) -> Result<()> {
        let target = resolve_open_target(target)?;
        open::that(&target).map_err(|e| DevwpError::Spawn {
            program: "open".to_string(),
            source: e,
        })?;
        tracing::debug!(target = %target, "opened");
        Ok(())
    }

    pub async fn app_info(&self) -> AppInfo {
        AppInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_dir: self.ctx.config.log_dir(),
            webroot: self.ctx.settings.webroot_path().await,
            database: self.ctx.config.database_path(),
        }
    }
}

/// URLs pass through; anything else must be an existing path.
pub fn resolve_open_target(target: &str) -> Result<String> {
    let target = target.trim();
    if target.starts_with("https://") || target.starts_with("http://") {
        return Ok(target.to_string());
    }
    if target.is_empty() {
        return Err(DevwpError::Validation("nothing to open".to_string()));
    }
    let path = Path::new(target);
    if !path.exists() {
        return Err(DevwpError::NotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(target.to_string())
}
