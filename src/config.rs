//! Layered configuration for devwp.
//!
//! Values come from `devwp.toml` (all sections optional), then environment
//! overrides, then CLI flags applied by the binary.
//!
//! # Configuration File Format
//!
//! ```toml
//! [paths]
//! webroot = "/home/dev/www"
//! compose_dir = "/home/dev/devwp"
//! hosts_file = "/etc/hosts"
//! sites_enabled = "/home/dev/devwp/config/frankenphp/sites-enabled"
//!
//! [proxy]
//! service = "frankenphp"
//! extension = "caddy"
//!
//! [containers]
//! poll_interval_ms = 5000
//!
//! [database]
//! ready_attempts = 30
//!
//! [privilege]
//! elevate = ["sudo"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "devwp.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevwpConfig {
    pub paths: PathsConfig,
    pub proxy: ProxyConfig,
    pub containers: ContainersConfig,
    pub database: DatabaseConfig,
    pub install: InstallConfig,
    pub privilege: PrivilegeConfig,
}

/// Filesystem locations. Unset entries are derived from the home and
/// platform directories at load time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Base directory holding one directory per site
    pub webroot: Option<PathBuf>,
    /// Directory containing the compose project
    pub compose_dir: Option<PathBuf>,
    pub hosts_file: Option<PathBuf>,
    /// Where generated proxy configs are written
    pub sites_enabled: Option<PathBuf>,
    /// SQLite file backing the config store
    pub database: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Compose service running the reverse proxy
    pub service: String,
    /// File extension for generated configs
    pub extension: String,
    /// Webroot as mounted inside the proxy container
    pub container_root: String,
    pub reload_command: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            service: "frankenphp".to_string(),
            extension: "caddy".to_string(),
            container_root: "/var/www/html".to_string(),
            reload_command: vec![
                "frankenphp".to_string(),
                "reload".to_string(),
                "--config".to_string(),
                "/etc/caddy/Caddyfile".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    /// Container runtime binary
    pub runtime: String,
    pub poll_interval_ms: u64,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            poll_interval_ms: 5000,
        }
    }
}

impl ContainersConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub service: String,
    pub client: String,
    pub root_user: String,
    /// Variable in the compose `.env` holding the root password
    pub password_env: String,
    pub ready_attempts: u32,
    pub ready_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            service: "mariadb".to_string(),
            client: "mariadb".to_string(),
            root_user: "root".to_string(),
            password_env: "MYSQL_ROOT_PASSWORD".to_string(),
            ready_attempts: 30,
            ready_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Compose service where the installation CLI runs
    pub service: String,
    pub cli: String,
    pub cache_service: String,
    pub admin_user: String,
    pub admin_password: String,
    pub admin_email: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            service: "frankenphp".to_string(),
            cli: "wp".to_string(),
            cache_service: "redis".to_string(),
            admin_user: "admin".to_string(),
            admin_password: "password".to_string(),
            admin_email: "admin@example.test".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeConfig {
    /// Command prefix used when a privileged file cannot be written directly
    pub elevate: Vec<String>,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self {
            elevate: vec!["sudo".to_string()],
        }
    }
}

impl DevwpConfig {
    /// Load configuration from an explicit file, or the default location.
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path(),
        };

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str::<DevwpConfig>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            DevwpConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DEVWP_WEBROOT") {
            self.paths.webroot = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DEVWP_HOSTS_FILE") {
            self.paths.hosts_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DEVWP_COMPOSE_DIR") {
            self.paths.compose_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DEVWP_LOG_DIR") {
            self.paths.log_dir = Some(PathBuf::from(v));
        }
    }

    pub fn default_webroot() -> PathBuf {
        home_dir().join("www")
    }

    pub fn compose_dir(&self) -> PathBuf {
        self.paths
            .compose_dir
            .clone()
            .unwrap_or_else(|| home_dir().join("devwp"))
    }

    pub fn hosts_file(&self) -> PathBuf {
        self.paths.hosts_file.clone().unwrap_or_else(|| {
            if cfg!(windows) {
                PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts")
            } else {
                PathBuf::from("/etc/hosts")
            }
        })
    }

    pub fn sites_enabled(&self) -> PathBuf {
        self.paths.sites_enabled.clone().unwrap_or_else(|| {
            self.compose_dir()
                .join("config")
                .join("frankenphp")
                .join("sites-enabled")
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.paths
            .database
            .clone()
            .unwrap_or_else(|| data_dir().join("devwp.db"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.paths
            .log_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("logs"))
    }

    /// Read the database root password from the compose project's `.env`.
    /// Falls back to the process environment, then to "root".
    pub fn database_password(&self) -> String {
        let env_file = self.compose_dir().join(".env");
        if let Ok(iter) = dotenvy::from_path_iter(&env_file) {
            for item in iter.flatten() {
                if item.0 == self.database.password_env {
                    return item.1;
                }
            }
        }
        std::env::var(&self.database.password_env).unwrap_or_else(|_| "root".to_string())
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| home_dir().join(".config"))
        .join("devwp")
        .join(CONFIG_FILE_NAME)
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| home_dir().join(".local").join("share"))
        .join("devwp")
}
