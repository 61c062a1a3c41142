//! Site lifecycle: create, update, delete and list local WordPress sites.
//!
//! | Module     | Responsibility                                         |
//! |------------|--------------------------------------------------------|
//! | `validate` | Domain, alias and web-root checks before side effects |
//! | `steps`    | Creation stages and the compensating rollback stack   |
//! | `database` | Per-site schema create/drop and readiness wait        |
//! | `install`  | wp-cli payload install, fallback page, cache purge    |
//!
//! Creation runs directory, hosts, proxy, database, record and payload in
//! that order. A failure unwinds every completed step before the error is
//! returned. A failed payload install is not a failure: a placeholder page is
//! written instead. A failed multisite conversion is reported as a warning.

pub mod database;
pub mod install;
pub mod steps;
pub mod validate;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::context::AppContext;
use crate::errors::{DevwpError, Result};
use crate::events::{CommandEvent, ProgressEvent, emit};
use crate::hosts::{HostsAction, HostsEditor};
use crate::proxy::ProxyConfigGenerator;
use crate::store::Site;

pub use database::{SiteDatabase, database_name};
pub use install::Installer;
pub use steps::{CreateStep, Rollback, Undo, UndoTargets};
pub use validate::{validate_domain, validate_site};

/// One directory under the webroot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteEntry {
    pub name: String,
    pub path: PathBuf,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub site: Site,
    pub path: PathBuf,
    pub url: String,
    /// False when the payload install failed and a placeholder page was written
    pub installed: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteOutcome {
    pub warnings: Vec<String>,
}

pub struct SiteManager {
    ctx: Arc<AppContext>,
    hosts: HostsEditor,
    proxy: ProxyConfigGenerator,
    database: SiteDatabase,
    installer: Installer,
}

impl SiteManager {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let config = &ctx.config;
        Self {
            hosts: HostsEditor::new(
                config.hosts_file(),
                ctx.runner.clone(),
                config.privilege.elevate.clone(),
            ),
            proxy: ProxyConfigGenerator::new(config.clone(), ctx.runner.clone()),
            database: SiteDatabase::new(config.clone(), ctx.runner.clone()),
            installer: Installer::new(config.clone(), ctx.runner.clone()),
            ctx,
        }
    }

    pub async fn site_dir(&self, domain: &str) -> PathBuf {
        self.ctx.settings.webroot_path().await.join(domain)
    }

    fn targets(&self) -> UndoTargets<'_> {
        UndoTargets {
            hosts: &self.hosts,
            proxy: &self.proxy,
            database: &self.database,
            store: &self.ctx.store,
        }
    }

    pub async fn create_site(
        &self,
        site: Site,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<CreateOutcome> {
        validate_site(&site)?;
        let site_dir = self.site_dir(&site.domain).await;

        report(progress, CreateStep::ValidateDirectoryAbsent, &site.domain).await;
        if tokio::fs::try_exists(&site_dir)
            .await
            .map_err(|e| DevwpError::from_io(&site_dir, e))?
        {
            return Err(DevwpError::AlreadyExists { path: site_dir });
        }

        tracing::info!(domain = %site.domain, path = %site_dir.display(), "creating site");
        let mut rollback = Rollback::new();
        match self.run_create(site, &site_dir, &mut rollback, progress).await {
            Ok(outcome) => {
                rollback.commit();
                if let Some(tx) = progress {
                    emit(tx, ProgressEvent::Done).await;
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, steps = rollback.len(), "site creation failed, rolling back");
                let failed = rollback.unwind(&self.targets()).await;
                if !failed.is_empty() {
                    tracing::warn!(?failed, "some changes could not be rolled back");
                }
                if let Some(tx) = progress {
                    emit(tx, ProgressEvent::Failed(e.to_string())).await;
                }
                Err(e)
            }
        }
    }

    async fn run_create(
        &self,
        site: Site,
        site_dir: &Path,
        rollback: &mut Rollback,
        progress: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> Result<CreateOutcome> {
        let domain = site.domain.clone();
        let mut warnings = Vec::new();

        report(progress, CreateStep::CreateDirectory, &domain).await;
        tokio::fs::create_dir_all(site_dir)
            .await
            .map_err(|e| DevwpError::from_io(site_dir, e))?;
        rollback.push(Undo::RemoveDirectory(site_dir.to_path_buf()));

        report(progress, CreateStep::RegisterHosts, &domain).await;
        self.hosts
            .apply(&site.hostnames().join(" "), HostsAction::Add)
            .await?;
        rollback.push(Undo::RemoveHostsEntry(domain.clone()));

        report(progress, CreateStep::WriteProxyConfig, &domain).await;
        self.proxy
            .write_config(
                &domain,
                site.web_root.as_deref(),
                site.aliases.as_deref(),
                site.multisite_kind(),
            )
            .await?;
        rollback.push(Undo::RemoveProxyConfig(domain.clone()));
        self.proxy.reload().await?;

        report(progress, CreateStep::CreateDatabase, &domain).await;
        let db_name = database_name(&domain);
        self.database.wait_ready().await?;
        if self.database.create(&db_name).await? {
            rollback.push(Undo::DropDatabase(db_name.clone()));
        } else {
            warnings.push(format!("Database {} already existed and was reused", db_name));
        }

        let saved = self.ctx.store.save_site(site).await?;
        rollback.push(Undo::DeleteRecord(domain.clone()));

        report(progress, CreateStep::InstallPayload, &domain).await;
        let container_dir = self.proxy.container_root(&domain, saved.web_root.as_deref());
        let document_root = document_root(site_dir, saved.web_root.as_deref());
        let installed = match self.installer.install(&domain, &container_dir, &db_name).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "WordPress install failed, writing placeholder page");
                report(progress, CreateStep::GenerateFallbackPage, &domain).await;
                self.installer.write_fallback_page(&document_root, &domain).await?;
                warnings.push(format!("WordPress install failed: {}", e));
                false
            }
        };

        if let Some(kind) = saved.multisite_kind() {
            if installed {
                report(progress, CreateStep::ConvertMultisite, &domain).await;
                if let Err(e) = self.installer.convert_multisite(&container_dir, kind).await {
                    tracing::warn!(domain = %domain, error = %e, "multisite conversion failed");
                    warnings.push(format!("Multisite conversion failed: {}", e));
                }
            } else {
                warnings.push("Multisite conversion skipped because WordPress is not installed".to_string());
            }
        }

        report(progress, CreateStep::Done, &domain).await;
        tracing::info!(domain = %domain, installed, warnings = warnings.len(), "site created");
        Ok(CreateOutcome {
            url: format!("https://{}", domain),
            path: site_dir.to_path_buf(),
            site: saved,
            installed,
            warnings,
        })
    }

    /// Rewrite the hosts entry, proxy config and record of an existing site.
    pub async fn update_site(&self, site: Site) -> Result<Site> {
        validate_site(&site)?;
        let site_dir = self.site_dir(&site.domain).await;
        if !tokio::fs::try_exists(&site_dir)
            .await
            .map_err(|e| DevwpError::from_io(&site_dir, e))?
        {
            return Err(DevwpError::NotFound { path: site_dir });
        }

        self.hosts
            .apply(&site.hostnames().join(" "), HostsAction::Add)
            .await?;
        self.proxy
            .write_config(
                &site.domain,
                site.web_root.as_deref(),
                site.aliases.as_deref(),
                site.multisite_kind(),
            )
            .await?;
        self.proxy.reload().await?;

        let saved = self.ctx.store.save_site(site).await?;
        tracing::info!(domain = %saved.domain, "site updated");
        Ok(saved)
    }

    /// Remove a site. Only the directory removal is fatal; everything after
    /// it is best effort and reported as warnings.
    pub async fn delete_site(&self, domain: &str) -> Result<DeleteOutcome> {
        validate_domain(domain)?;
        let site_dir = self.site_dir(domain).await;

        match tokio::fs::remove_dir_all(&site_dir).await {
            Ok(()) => tracing::info!(domain, path = %site_dir.display(), "removed site directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(domain, path = %site_dir.display(), "site directory already gone");
            }
            Err(e) => return Err(DevwpError::from_io(&site_dir, e)),
        }

        let mut outcome = DeleteOutcome::default();
        let mut note = |what: &str, e: DevwpError| {
            tracing::warn!(domain, error = %e, "failed to {}", what);
            outcome.warnings.push(format!("Failed to {}: {}", what, e));
        };

        if let Err(e) = self.hosts.apply(domain, HostsAction::Remove).await {
            note("remove hosts entry", e);
        }
        match self.proxy.remove_config(domain).await {
            Ok(true) => {
                if let Err(e) = self.proxy.reload().await {
                    note("reload proxy", e);
                }
            }
            Ok(false) => {}
            Err(e) => note("remove proxy config", e),
        }
        if let Err(e) = self.database.drop(&database_name(domain)).await {
            note("drop database", e);
        }
        if let Err(e) = self.installer.purge_cache(domain).await {
            note("clear cache", e);
        }
        if let Err(e) = self.ctx.store.delete_site(domain).await {
            note("delete site record", e);
        }

        tracing::info!(domain, warnings = outcome.warnings.len(), "site deleted");
        Ok(outcome)
    }

    /// Subdirectories of the webroot, sorted by name. Hidden entries are
    /// skipped; a missing webroot lists nothing.
    pub async fn list_sites(&self) -> Result<Vec<SiteEntry>> {
        let webroot = self.ctx.settings.webroot_path().await;
        let mut dir = match tokio::fs::read_dir(&webroot).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DevwpError::from_io(&webroot, e)),
        };

        let mut sites = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| DevwpError::from_io(&webroot, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            sites.push(SiteEntry {
                url: format!("https://{}", name),
                path: entry.path(),
                name,
            });
        }
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    /// Stream a wp-cli invocation inside the site's document root.
    pub async fn run_wp_cli(
        &self,
        domain: &str,
        args: Vec<String>,
        tx: mpsc::Sender<CommandEvent>,
    ) -> Result<i32> {
        validate_domain(domain)?;
        let web_root = match self.ctx.store.get_site(domain).await {
            Ok(site) => site.and_then(|s| s.web_root),
            Err(e) => {
                tracing::warn!(domain, error = %e, "Failed to read site record, using default root");
                None
            }
        };
        let container_dir = self.proxy.container_root(domain, web_root.as_deref());
        tracing::info!(domain, args = %args.join(" "), "running wp-cli");
        self.installer.stream(&container_dir, args, tx).await
    }
}

fn document_root(site_dir: &Path, web_root: Option<&str>) -> PathBuf {
    match web_root.map(|w| w.trim_matches('/')).filter(|w| !w.is_empty()) {
        Some(sub) => site_dir.join(sub),
        None => site_dir.to_path_buf(),
    }
}

async fn report(progress: Option<&mpsc::Sender<ProgressEvent>>, step: CreateStep, domain: &str) {
    tracing::debug!(domain, %step, "create step");
    if let Some(tx) = progress {
        let message = match step {
            CreateStep::ValidateDirectoryAbsent => format!("Checking {} is free", domain),
            CreateStep::CreateDirectory => "Creating site directory".to_string(),
            CreateStep::RegisterHosts => "Updating hosts file".to_string(),
            CreateStep::WriteProxyConfig => "Writing proxy config".to_string(),
            CreateStep::CreateDatabase => "Creating database".to_string(),
            CreateStep::InstallPayload => "Installing WordPress".to_string(),
            CreateStep::GenerateFallbackPage => "Writing placeholder page".to_string(),
            CreateStep::ConvertMultisite => "Converting to multisite".to_string(),
            CreateStep::Done => format!("https://{} is ready", domain),
        };
        emit(
            tx,
            ProgressEvent::Step {
                step: step.to_string(),
                message,
            },
        )
        .await;
    }
}
