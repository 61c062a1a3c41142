//! Per-site MariaDB schema management through the database container.

use std::sync::Arc;
use std::time::Duration;

use crate::config::DevwpConfig;
use crate::errors::{DevwpError, Result};
use crate::exec::{self, CommandOutput, CommandRunner};

/// Schema name for a domain: `.` becomes `_` and `-` becomes `__`, any other
/// non-alphanumeric `_`.
///
/// Hostname labels never start or end with `-`, so a single `_` always came
/// from a dot and `my-site.test` cannot collide with `my.site.test`.
pub fn database_name(domain: &str) -> String {
    let mut name = String::with_capacity(domain.len());
    for c in domain.chars() {
        match c {
            c if c.is_ascii_alphanumeric() => name.push(c),
            '-' => name.push_str("__"),
            _ => name.push('_'),
        }
    }
    name
}

pub struct SiteDatabase {
    config: DevwpConfig,
    runner: Arc<dyn CommandRunner>,
}

impl SiteDatabase {
    pub fn new(config: DevwpConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Run SQL through the client. The password reaches the container through
    /// compose's environment and never appears on a command line.
    async fn execute(&self, sql: &str, client_flags: &[&str]) -> Result<CommandOutput> {
        let db = &self.config.database;
        let mut args = vec![
            "exec".to_string(),
            "-T".to_string(),
            "-e".to_string(),
            "MYSQL_PWD".to_string(),
            db.service.clone(),
            db.client.clone(),
            format!("-u{}", db.root_user),
        ];
        args.extend(client_flags.iter().map(|f| f.to_string()));
        args.push("-e".to_string());
        args.push(sql.to_string());

        let spec = exec::compose(&self.config, args)
            .env("MYSQL_PWD", self.config.database_password());
        self.runner.run_checked(spec).await
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let out = self
            .execute(
                &format!(
                    "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = '{}'",
                    name
                ),
                &["-N", "-B"],
            )
            .await?;
        Ok(out.stdout.lines().any(|line| line.trim() == name))
    }

    /// Poll until the server answers, a fixed number of attempts apart.
    pub async fn wait_ready(&self) -> Result<()> {
        let attempts = self.config.database.ready_attempts.max(1);
        let delay = Duration::from_millis(self.config.database.ready_delay_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.execute("SELECT 1", &[]).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    tracing::debug!(attempt, attempts, error = %e, "database not ready yet");
                    last_error = e.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        Err(DevwpError::Other(anyhow::anyhow!(
            "Database not ready after {} attempts: {}",
            attempts,
            last_error
        )))
    }

    /// Create the schema unless it exists. Returns `true` only when this
    /// call created it.
    pub async fn create(&self, name: &str) -> Result<bool> {
        if self.exists(name).await? {
            tracing::warn!(database = name, "database already exists, reusing it");
            return Ok(false);
        }
        self.execute(
            &format!(
                "CREATE DATABASE IF NOT EXISTS `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
                name
            ),
            &[],
        )
        .await?;
        tracing::info!(database = name, "created database");
        Ok(true)
    }

    pub async fn drop(&self, name: &str) -> Result<()> {
        self.execute(&format!("DROP DATABASE IF EXISTS `{}`", name), &[])
            .await?;
        tracing::info!(database = name, "dropped database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedRunner;

    fn db(runner: Arc<ScriptedRunner>, attempts: u32) -> SiteDatabase {
        let mut config = DevwpConfig::default();
        config.database.ready_attempts = attempts;
        config.database.ready_delay_ms = 1000;
        SiteDatabase::new(config, runner)
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(database_name("demo.test"), "demo_test");
        assert_eq!(database_name("my-site.local"), "my__site_local");
    }

    #[test]
    fn dots_and_hyphens_map_to_distinct_names() {
        assert_ne!(database_name("my-site.test"), database_name("my.site.test"));
        assert_ne!(database_name("a--b.test"), database_name("a.b.test"));
        assert_eq!(database_name("my.site.test"), "my_site_test");
    }

    #[tokio::test]
    async fn create_and_drop_issue_sql() {
        let runner = Arc::new(ScriptedRunner::new());
        let d = db(runner.clone(), 1);
        assert!(d.create("demo_test").await.unwrap());
        d.drop("demo_test").await.unwrap();

        let lines = runner.command_lines();
        assert!(lines[0].contains("information_schema.SCHEMATA WHERE SCHEMA_NAME = 'demo_test'"));
        assert!(lines[1].contains("CREATE DATABASE IF NOT EXISTS `demo_test`"));
        assert!(lines[1].starts_with("docker compose exec -T -e MYSQL_PWD mariadb "));
        assert!(lines[2].contains("DROP DATABASE IF EXISTS `demo_test`"));
    }

    #[tokio::test]
    async fn password_travels_in_env_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "MYSQL_ROOT_PASSWORD=s3cret\n").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let mut config = DevwpConfig::default();
        config.paths.compose_dir = Some(dir.path().to_path_buf());
        let d = SiteDatabase::new(config, runner.clone());
        d.wait_ready().await.unwrap();

        let call = &runner.calls()[0];
        assert!(!call.command_line().contains("s3cret"));
        assert_eq!(call.env.get("MYSQL_PWD").map(String::as_str), Some("s3cret"));
    }

    #[tokio::test]
    async fn create_reports_existing_schema() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("information_schema", 0, "demo_test\n", "");
        let created = db(runner.clone(), 1).create("demo_test").await.unwrap();
        assert!(!created);
        assert_eq!(runner.count("CREATE DATABASE"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ready_gives_up_after_attempts() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("SELECT 1", 1, "", "Can't connect to server");
        let err = db(runner.clone(), 3).wait_ready().await.unwrap_err();
        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(runner.count("SELECT 1"), 3);
    }

    #[tokio::test]
    async fn wait_ready_succeeds_immediately() {
        let runner = Arc::new(ScriptedRunner::new());
        db(runner.clone(), 5).wait_ready().await.unwrap();
        assert_eq!(runner.count("SELECT 1"), 1);
    }
}
