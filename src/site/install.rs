//! WordPress payload installation via wp-cli inside the PHP container.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::DevwpConfig;
use crate::errors::{DevwpError, Result};
use crate::events::CommandEvent;
use crate::exec::{self, CommandRunner, CommandSpec};
use crate::store::MultisiteType;

const FALLBACK_PAGE: &str = r#"<?php
// Placeholder written by devwp because the WordPress install did not finish.
?><!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{{DOMAIN}}</title></head>
<body>
<h1>{{DOMAIN}}</h1>
<p>The site is reachable, but WordPress was not installed. Check the devwp
logs, then run <code>wp core download</code> in this directory to retry.</p>
<p>PHP <?php echo PHP_VERSION; ?></p>
</body>
</html>
"#;

pub struct Installer {
    config: DevwpConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Installer {
    pub fn new(config: DevwpConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// `docker compose exec -T -w <dir> <service> wp <args>`
    fn wp<I, S>(&self, container_dir: &str, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut all = vec![
            "exec".to_string(),
            "-T".to_string(),
            "-w".to_string(),
            container_dir.to_string(),
            self.config.install.service.clone(),
            self.config.install.cli.clone(),
        ];
        all.extend(args.into_iter().map(Into::into));
        exec::compose(&self.config, all)
    }

    /// Download, configure and install WordPress into `container_dir`.
    pub async fn install(&self, domain: &str, container_dir: &str, database: &str) -> Result<()> {
        let install = &self.config.install;
        let db_password = self.config.database_password();
        let steps: Vec<Vec<String>> = vec![
            vec!["core".into(), "download".into(), "--allow-root".into()],
            vec![
                "config".into(),
                "create".into(),
                format!("--dbname={}", database),
                format!("--dbuser={}", self.config.database.root_user),
                format!("--dbpass={}", db_password),
                format!("--dbhost={}", self.config.database.service),
                "--allow-root".into(),
            ],
            vec![
                "core".into(),
                "install".into(),
                format!("--url=https://{}", domain),
                format!("--title={}", domain),
                format!("--admin_user={}", install.admin_user),
                format!("--admin_password={}", install.admin_password),
                format!("--admin_email={}", install.admin_email),
                "--skip-email".into(),
                "--allow-root".into(),
            ],
        ];

        for args in steps {
            let label = format!("wp {} {}", args[0], args[1]);
            tracing::info!(domain, step = %label, "installing");
            let spec = self
                .wp(container_dir, args)
                .secret(db_password.clone())
                .secret(install.admin_password.clone());
            self.runner
                .run_checked(spec)
                .await
                .map_err(|e| match e {
                    DevwpError::ExitCode { code, message } => DevwpError::ExitCode {
                        code,
                        message: format!("{} failed: {}", label, message),
                    },
                    other => other,
                })?;
        }
        Ok(())
    }

    pub async fn convert_multisite(&self, container_dir: &str, kind: MultisiteType) -> Result<()> {
        let mut args = vec!["core", "multisite-convert"];
        if kind == MultisiteType::Subdomain {
            args.push("--subdomains");
        }
        args.push("--allow-root");
        self.runner.run_checked(self.wp(container_dir, args)).await?;
        Ok(())
    }

    /// Run arbitrary wp-cli arguments, streaming output to `tx`.
    pub async fn stream(
        &self,
        container_dir: &str,
        args: Vec<String>,
        tx: mpsc::Sender<CommandEvent>,
    ) -> Result<i32> {
        self.runner.stream(self.wp(container_dir, args), tx).await
    }

    /// Write a placeholder `index.php` so the site still serves a page.
    pub async fn write_fallback_page(&self, host_dir: &Path, domain: &str) -> Result<()> {
        tokio::fs::create_dir_all(host_dir)
            .await
            .map_err(|e| DevwpError::from_io(host_dir, e))?;
        let path = host_dir.join("index.php");
        tokio::fs::write(&path, FALLBACK_PAGE.replace("{{DOMAIN}}", domain))
            .await
            .map_err(|e| DevwpError::from_io(&path, e))?;
        Ok(())
    }

    /// Remove cache keys namespaced by the domain.
    pub async fn purge_cache(&self, domain: &str) -> Result<()> {
        let script = format!(
            "redis-cli --scan --pattern '{}:*' | xargs -r redis-cli del",
            domain
        );
        let spec = exec::compose(
            &self.config,
            [
                "exec".to_string(),
                "-T".to_string(),
                self.config.install.cache_service.clone(),
                "sh".to_string(),
                "-c".to_string(),
                script,
            ],
        );
        self.runner.run_checked(spec).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedRunner;

    fn installer(runner: Arc<ScriptedRunner>) -> Installer {
        Installer::new(DevwpConfig::default(), runner)
    }

    #[tokio::test]
    async fn install_runs_three_wp_steps_in_order() {
        let runner = Arc::new(ScriptedRunner::new());
        installer(runner.clone())
            .install("demo.test", "/var/www/html/demo.test", "demo_test")
            .await
            .unwrap();

        let lines = runner.command_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("-w /var/www/html/demo.test frankenphp wp core download"));
        assert!(lines[1].contains("wp config create --dbname=demo_test"));
        assert!(lines[2].contains("--url=https://demo.test"));
    }

    #[tokio::test]
    async fn install_masks_passwords_in_logged_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "MYSQL_ROOT_PASSWORD=dbs3cret\n").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let mut config = DevwpConfig::default();
        config.paths.compose_dir = Some(dir.path().to_path_buf());
        config.install.admin_password = "hunter22".into();
        Installer::new(config, runner.clone())
            .install("demo.test", "/var/www/html/demo.test", "demo_test")
            .await
            .unwrap();

        let calls = runner.calls();
        assert!(calls[2].command_line().contains("--admin_password=hunter22"));
        for call in &calls {
            let logged = call.redacted_line();
            assert!(!logged.contains("hunter22"), "{}", logged);
            assert!(!logged.contains("dbs3cret"), "{}", logged);
        }
        assert!(calls[1].redacted_line().contains("--dbpass=***"));
    }

    #[tokio::test]
    async fn install_stops_at_first_failure() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("config create", 1, "", "Error: Database connection refused");
        let err = installer(runner.clone())
            .install("demo.test", "/var/www/html/demo.test", "demo_test")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("wp config create failed"));
        assert_eq!(runner.count("core install"), 0);
    }

    #[tokio::test]
    async fn multisite_flag_depends_on_kind() {
        let runner = Arc::new(ScriptedRunner::new());
        let i = installer(runner.clone());
        i.convert_multisite("/d", MultisiteType::Subdomain).await.unwrap();
        i.convert_multisite("/d", MultisiteType::Subdirectory).await.unwrap();
        let lines = runner.command_lines();
        assert!(lines[0].ends_with("multisite-convert --subdomains --allow-root"));
        assert!(lines[1].ends_with("multisite-convert --allow-root"));
    }

    #[tokio::test]
    async fn fallback_page_mentions_domain() {
        let dir = tempfile::tempdir().unwrap();
        let i = installer(Arc::new(ScriptedRunner::new()));
        i.write_fallback_page(&dir.path().join("public"), "demo.test").await.unwrap();
        let page = std::fs::read_to_string(dir.path().join("public/index.php")).unwrap();
        assert!(page.contains("<h1>demo.test</h1>"));
    }

    #[tokio::test]
    async fn stream_forwards_events() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("plugin list", 0, "akismet\nhello\n", "");
        let (tx, mut rx) = mpsc::channel(8);
        let code = installer(runner)
            .stream("/var/www/html/demo.test", vec!["plugin".into(), "list".into()], tx)
            .await
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(rx.recv().await, Some(CommandEvent::Stdout("akismet".into())));
        assert_eq!(rx.recv().await, Some(CommandEvent::Stdout("hello".into())));
        assert_eq!(rx.recv().await, Some(CommandEvent::Completed { code: 0 }));
    }
}
