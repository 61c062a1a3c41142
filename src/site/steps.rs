//! Creation steps and their compensations.
//!
//! Every side effect performed while creating a site pushes an `Undo` onto a
//! `Rollback` stack. On failure the stack is unwound newest-first; each
//! compensation is best effort and only logged when it fails.

use std::fmt;
use std::path::PathBuf;

use crate::hosts::{HostsAction, HostsEditor};
use crate::proxy::ProxyConfigGenerator;
use crate::store::StoreHandle;

use super::database::SiteDatabase;

/// Stages of site creation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStep {
    ValidateDirectoryAbsent,
    CreateDirectory,
    RegisterHosts,
    WriteProxyConfig,
    CreateDatabase,
    InstallPayload,
    GenerateFallbackPage,
    ConvertMultisite,
    Done,
}

impl CreateStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreateStep::ValidateDirectoryAbsent => "validate",
            CreateStep::CreateDirectory => "directory",
            CreateStep::RegisterHosts => "hosts",
            CreateStep::WriteProxyConfig => "proxy",
            CreateStep::CreateDatabase => "database",
            CreateStep::InstallPayload => "install",
            CreateStep::GenerateFallbackPage => "fallback",
            CreateStep::ConvertMultisite => "multisite",
            CreateStep::Done => "done",
        }
    }
}

impl fmt::Display for CreateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compensating action for one completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    RemoveDirectory(PathBuf),
    RemoveHostsEntry(String),
    RemoveProxyConfig(String),
    DropDatabase(String),
    DeleteRecord(String),
}

/// Collaborators a compensation may need.
pub struct UndoTargets<'a> {
    pub hosts: &'a HostsEditor,
    pub proxy: &'a ProxyConfigGenerator,
    pub database: &'a SiteDatabase,
    pub store: &'a StoreHandle,
}

impl Undo {
    async fn run(&self, targets: &UndoTargets<'_>) -> anyhow::Result<()> {
        match self {
            Undo::RemoveDirectory(path) => match tokio::fs::remove_dir_all(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
            Undo::RemoveHostsEntry(domain) => {
                targets.hosts.apply(domain, HostsAction::Remove).await?;
                Ok(())
            }
            Undo::RemoveProxyConfig(domain) => {
                if targets.proxy.remove_config(domain).await? {
                    targets.proxy.reload().await?;
                }
                Ok(())
            }
            Undo::DropDatabase(name) => {
                targets.database.drop(name).await?;
                Ok(())
            }
            Undo::DeleteRecord(domain) => {
                targets.store.delete_site(domain).await?;
                Ok(())
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Rollback {
    done: Vec<Undo>,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, undo: Undo) {
        self.done.push(undo);
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Run every recorded compensation, newest first. Returns the ones
    /// that failed.
    pub async fn unwind(mut self, targets: &UndoTargets<'_>) -> Vec<Undo> {
        let mut failed = Vec::new();
        while let Some(undo) = self.done.pop() {
            tracing::info!(?undo, "rolling back");
            if let Err(e) = undo.run(targets).await {
                tracing::warn!(?undo, error = %format!("{:#}", e), "rollback step failed");
                failed.push(undo);
            }
        }
        failed
    }

    /// Forget recorded steps once creation has committed.
    pub fn commit(mut self) {
        self.done.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevwpConfig;
    use crate::exec::ScriptedRunner;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        runner: Arc<ScriptedRunner>,
        hosts: HostsEditor,
        proxy: ProxyConfigGenerator,
        database: SiteDatabase,
        store: StoreHandle,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut config = DevwpConfig::default();
        config.paths.sites_enabled = Some(root.join("sites-enabled"));
        config.paths.compose_dir = Some(root.join("compose"));
        let runner = Arc::new(ScriptedRunner::new());
        Fixture {
            hosts: HostsEditor::new(root.join("hosts"), runner.clone(), vec![]),
            proxy: ProxyConfigGenerator::new(config.clone(), runner.clone()),
            database: SiteDatabase::new(config, runner.clone()),
            store: StoreHandle::open_in_memory().unwrap(),
            runner,
            root,
            _dir: dir,
        }
    }

    fn targets(f: &Fixture) -> UndoTargets<'_> {
        UndoTargets {
            hosts: &f.hosts,
            proxy: &f.proxy,
            database: &f.database,
            store: &f.store,
        }
    }

    #[tokio::test]
    async fn unwind_runs_in_reverse_order() {
        let f = fixture();
        let site_dir = f.root.join("www").join("demo.test");
        std::fs::create_dir_all(&site_dir).unwrap();
        f.hosts.apply("demo.test", HostsAction::Add).await.unwrap();
        f.proxy.write_config("demo.test", None, None, None).await.unwrap();

        let mut rollback = Rollback::new();
        rollback.push(Undo::RemoveDirectory(site_dir.clone()));
        rollback.push(Undo::RemoveHostsEntry("demo.test".into()));
        rollback.push(Undo::RemoveProxyConfig("demo.test".into()));
        rollback.push(Undo::DropDatabase("demo_test".into()));
        assert_eq!(rollback.len(), 4);

        let failed = rollback.unwind(&targets(&f)).await;
        assert!(failed.is_empty());
        assert!(!site_dir.exists());
        assert!(!f.proxy.exists("demo.test"));
        let hosts = std::fs::read_to_string(f.root.join("hosts")).unwrap();
        assert!(!hosts.contains("demo.test"));

        // drop runs before the reload triggered by the proxy undo
        let lines = f.runner.command_lines();
        assert!(lines[0].contains("DROP DATABASE"));
        assert!(lines[1].contains("reload"));
    }

    #[tokio::test]
    async fn failed_compensation_does_not_stop_unwind() {
        let f = fixture();
        f.runner.on("DROP DATABASE", 1, "", "access denied");
        let site_dir = f.root.join("demo.test");
        std::fs::create_dir_all(&site_dir).unwrap();

        let mut rollback = Rollback::new();
        rollback.push(Undo::RemoveDirectory(site_dir.clone()));
        rollback.push(Undo::DropDatabase("demo_test".into()));

        let failed = rollback.unwind(&targets(&f)).await;
        assert_eq!(failed, vec![Undo::DropDatabase("demo_test".into())]);
        assert!(!site_dir.exists());
    }

    #[test]
    fn step_labels() {
        assert_eq!(CreateStep::WriteProxyConfig.to_string(), "proxy");
        assert_eq!(CreateStep::Done.as_str(), "done");
    }
}
