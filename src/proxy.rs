//! Reverse-proxy (Caddy / FrankenPHP) virtual-host generation.
//!
//! One file per site is written to the sites-enabled directory, named
//! `<domain>.<ext>`, rendered from `templates/site.caddy`. The proxy picks
//! changes up only after `reload`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DevwpConfig;
use crate::errors::{DevwpError, Result};
use crate::exec::{self, CommandRunner};
use crate::store::MultisiteType;

const SITE_TEMPLATE: &str = include_str!("../templates/site.caddy");

/// Hostname suffixes for which the proxy issues its own certificates.
const LOCAL_SUFFIXES: &[&str] = &[".localhost", ".local", ".test"];

/// Inputs for one rendered virtual host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHost {
    pub domain: String,
    pub aliases: Vec<String>,
    /// Absolute document root as seen by the proxy container
    pub root: String,
    pub multisite: Option<MultisiteType>,
}

impl VirtualHost {
    /// Domain, aliases, and `*.<domain>` for subdomain multisite.
    pub fn hostnames(&self) -> Vec<String> {
        let mut hosts = vec![self.domain.clone()];
        hosts.extend(self.aliases.iter().cloned());
        if self.multisite == Some(MultisiteType::Subdomain) {
            hosts.push(format!("*.{}", self.domain));
        }
        hosts
    }
}

/// True when every hostname is local-only (`localhost`, `*.localhost`,
/// `*.local`, `*.test`).
pub fn uses_internal_tls(hostnames: &[String]) -> bool {
    !hostnames.is_empty()
        && hostnames.iter().all(|h| {
            let h = h.to_ascii_lowercase();
            h == "localhost" || LOCAL_SUFFIXES.iter().any(|s| h.ends_with(s))
        })
}

fn multisite_rules(kind: Option<MultisiteType>) -> &'static str {
    match kind {
        Some(MultisiteType::Subdirectory) => concat!(
            "\t@wpadmin path_regexp wpadmin ^(/[_0-9a-zA-Z-]+)?/wp-admin$\n",
            "\tredir @wpadmin {uri}/ 301\n",
            "\t@subsite path_regexp subsite ^/[_0-9a-zA-Z-]+/(wp-(content|admin|includes).*)\n",
            "\trewrite @subsite /{re.subsite.1}\n",
            "\t@subphp path_regexp subphp ^/[_0-9a-zA-Z-]+/(.*\\.php)$\n",
            "\trewrite @subphp /{re.subphp.1}",
        ),
        _ => "",
    }
}

/// Render the virtual-host text. Placeholder lines left empty are dropped.
pub fn render(vhost: &VirtualHost) -> String {
    let hostnames = vhost.hostnames();
    // No tls directive for public names: the proxy's automatic HTTPS applies.
    let tls = if uses_internal_tls(&hostnames) {
        "\ttls internal"
    } else {
        ""
    };

    let rendered = SITE_TEMPLATE
        .replace("{{DOMAIN}}", &vhost.domain)
        .replace("{{HOSTS}}", &hostnames.join(", "))
        .replace("{{TLS}}", tls)
        .replace("{{ROOT}}", &vhost.root)
        .replace("{{MULTISITE_RULES}}", multisite_rules(vhost.multisite));

    let mut out = rendered
        .lines()
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    out.push('\n');
    out
}

pub struct ProxyConfigGenerator {
    config: DevwpConfig,
    runner: Arc<dyn CommandRunner>,
}

impl ProxyConfigGenerator {
    pub fn new(config: DevwpConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config_path(&self, domain: &str) -> PathBuf {
        self.config
            .sites_enabled()
            .join(format!("{}.{}", domain, self.config.proxy.extension))
    }

    /// Document root inside the proxy container.
    pub fn container_root(&self, domain: &str, web_root: Option<&str>) -> String {
        let base = self.config.proxy.container_root.trim_end_matches('/');
        match web_root.map(|w| w.trim_matches('/')).filter(|w| !w.is_empty()) {
            Some(sub) => format!("{}/{}/{}", base, domain, sub),
            None => format!("{}/{}", base, domain),
        }
    }

    pub async fn write_config(
        &self,
        domain: &str,
        web_root: Option<&str>,
        aliases: Option<&str>,
        multisite: Option<MultisiteType>,
    ) -> Result<PathBuf> {
        let vhost = VirtualHost {
            domain: domain.to_string(),
            aliases: aliases
                .unwrap_or("")
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            root: self.container_root(domain, web_root),
            multisite,
        };

        let dir = self.config.sites_enabled();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DevwpError::from_io(&dir, e))?;

        let path = self.config_path(domain);
        tokio::fs::write(&path, render(&vhost))
            .await
            .map_err(|e| DevwpError::from_io(&path, e))?;
        tracing::info!(domain, path = %path.display(), "wrote proxy config");
        Ok(path)
    }

    /// Delete the site's config. A missing file is not an error; returns
    /// whether a file was removed.
    pub async fn remove_config(&self, domain: &str) -> Result<bool> {
        let path = self.config_path(domain);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(domain, path = %path.display(), "removed proxy config");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DevwpError::from_io(&path, e)),
        }
    }

    pub async fn reload(&self) -> Result<()> {
        let mut args = vec!["exec".to_string(), "-T".to_string(), self.config.proxy.service.clone()];
        args.extend(self.config.proxy.reload_command.iter().cloned());
        let output = self.runner.run(exec::compose(&self.config, args)).await?;
        if !output.success() {
            let stderr = output.stderr.trim();
            return Err(DevwpError::Reload(if stderr.is_empty() {
                format!("reload exited with code {}", output.code)
            } else {
                stderr.to_string()
            }));
        }
        tracing::debug!("proxy reloaded");
        Ok(())
    }

    pub fn sites_enabled(&self) -> PathBuf {
        self.config.sites_enabled()
    }

    pub fn exists(&self, domain: &str) -> bool {
        Path::new(&self.config_path(domain)).exists()
    }
}
