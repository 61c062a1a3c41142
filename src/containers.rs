//! Container supervisor for the compose group.
//!
//! Status comes from `docker compose ps`; each container's version is then
//! looked up with a service-specific command run inside it. Version lookups
//! never fail the listing: on any error the field is left empty.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tokio::sync::mpsc;

use crate::config::DevwpConfig;
use crate::errors::Result;
use crate::events::{ProgressEvent, emit};
use crate::exec::{self, CommandRunner, CommandSpec};

/// `docker compose ps` row format, one container per line.
const PS_FORMAT: &str = "{{.ID}}|{{.Name}}|{{.Service}}|{{.State}}|{{.Image}}";

static FRANKENPHP_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FrankenPHP v?(\d+\.\d+\.\d+)").unwrap());
static MARIADB_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+)-MariaDB").unwrap());
static REDIS_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v=(\d+\.\d+\.\d+)").unwrap());
static MAILPIT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v(\d+\.\d+\.\d+)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub service: String,
    /// Runtime state as reported: running, exited, restarting, ...
    pub state: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Container {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// How a well-known service reports its version.
#[derive(Debug, Clone, Copy)]
pub enum VersionProbe {
    Exec {
        command: &'static [&'static str],
        pattern: &'static LazyLock<Regex>,
    },
    ImageTag,
}

/// Pick the probe for a container by service or container name.
pub fn version_probe(name: &str) -> VersionProbe {
    let name = name.to_ascii_lowercase();
    if name.contains("frankenphp") {
        VersionProbe::Exec {
            command: &["frankenphp", "version"],
            pattern: &FRANKENPHP_VERSION,
        }
    } else if name.contains("mariadb") {
        VersionProbe::Exec {
            command: &["mariadb", "--version"],
            pattern: &MARIADB_VERSION,
        }
    } else if name.contains("redis") {
        VersionProbe::Exec {
            command: &["redis-server", "--version"],
            pattern: &REDIS_VERSION,
        }
    } else if name.contains("mailpit") {
        VersionProbe::Exec {
            command: &["/mailpit", "version"],
            pattern: &MAILPIT_VERSION,
        }
    } else {
        // sonarqube and anything unrecognised
        VersionProbe::ImageTag
    }
}

/// Tag portion of an image reference, if any (`mariadb:11.4` → `11.4`).
pub fn image_tag(image: &str) -> Option<String> {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    let without_digest = last_segment.split('@').next().unwrap_or(last_segment);
    without_digest
        .split_once(':')
        .map(|(_, tag)| tag.to_string())
        .filter(|t| !t.is_empty())
}

/// Parse `docker compose ps` output in `PS_FORMAT`. Malformed lines are skipped.
pub fn parse_ps_output(output: &str) -> Vec<Container> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.trim().split('|').collect();
            if fields.len() < 5 || fields[0].is_empty() {
                return None;
            }
            Some(Container {
                id: fields[0].to_string(),
                name: fields[1].to_string(),
                service: fields[2].to_string(),
                state: fields[3].to_lowercase(),
                image: fields[4].to_string(),
                version: None,
            })
        })
        .collect()
}

pub struct ContainerSupervisor {
    config: DevwpConfig,
    runner: Arc<dyn CommandRunner>,
}

impl ContainerSupervisor {
    pub fn new(config: DevwpConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub async fn list_containers(&self) -> Result<Vec<Container>> {
        let output = self
            .runner
            .run_checked(exec::compose(
                &self.config,
                ["ps", "--all", "--format", PS_FORMAT],
            ))
            .await?;

        let mut containers = parse_ps_output(&output.stdout);
        for container in &mut containers {
            container.version = self.lookup_version(container).await;
        }
        Ok(containers)
    }

    async fn lookup_version(&self, container: &Container) -> Option<String> {
        let key = if container.service.is_empty() {
            &container.name
        } else {
            &container.service
        };
        match version_probe(key) {
            VersionProbe::ImageTag => image_tag(&container.image),
            VersionProbe::Exec { command, pattern } => {
                if !container.is_running() {
                    return None;
                }
                let spec = CommandSpec::new(self.config.containers.runtime.clone())
                    .arg("exec")
                    .arg(container.id.clone())
                    .args(command.iter().copied());
                match self.runner.run_checked(spec).await {
                    Ok(out) => {
                        let text = format!("{}\n{}", out.stdout, out.stderr);
                        pattern.captures(&text).map(|c| c[1].to_string())
                    }
                    Err(e) => {
                        tracing::debug!(container = %container.name, error = %e, "version lookup failed");
                        None
                    }
                }
            }
        }
    }

    /// Restart one container. Failures are logged and reported as `false`.
    pub async fn restart(&self, id: &str) -> bool {
        let spec = CommandSpec::new(self.config.containers.runtime.clone())
            .arg("restart")
            .arg(id);
        match self.runner.run_checked(spec).await {
            Ok(_) => {
                tracing::info!(container = id, "restarted container");
                true
            }
            Err(e) => {
                tracing::warn!(container = id, error = %e, "failed to restart container");
                false
            }
        }
    }

    /// Bring the whole group up, streaming compose output as progress.
    pub async fn start_group(&self, tx: &mpsc::Sender<ProgressEvent>) -> Result<()> {
        emit(
            tx,
            ProgressEvent::Step {
                step: "start".to_string(),
                message: "Starting containers".to_string(),
            },
        )
        .await;

        let spec = exec::compose(&self.config, ["up", "-d", "--remove-orphans"]);
        match exec::stream_progress(self.runner.as_ref(), spec, tx).await {
            Ok(()) => {
                emit(tx, ProgressEvent::Done).await;
                Ok(())
            }
            Err(e) => {
                emit(tx, ProgressEvent::Failed(e.to_string())).await;
                Err(e)
            }
        }
    }

    pub async fn stop_group(&self) -> Result<()> {
        self.runner
            .run_checked(exec::compose(&self.config, ["down"]))
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(error = %e, "failed to stop containers");
                e
            })
    }
}
