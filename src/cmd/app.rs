//! `devwp open` and `devwp info`.

use anyhow::Result;
use console::style;
use std::path::Path;

use devwp::config::{DevwpConfig, default_config_path};
use devwp::{AppContext, DevwpApi};

pub fn cmd_open(api: &DevwpApi, target: &str) -> Result<()> {
    api.open_target(target)?;
    Ok(())
}

pub async fn cmd_info(config: DevwpConfig, config_path: Option<&Path>) -> Result<()> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);
    let info = match AppContext::open(config.clone(), false) {
        Ok(ctx) => Some(DevwpApi::new(ctx).app_info().await),
        Err(e) => {
            tracing::warn!(error = %e, "store unavailable, showing configured paths only");
            None
        }
    };

    println!("{} {}", style("devwp").bold(), env!("CARGO_PKG_VERSION"));
    println!();
    println!("  config    {}", config_path.display());
    match info {
        Some(info) => {
            println!("  webroot   {}", info.webroot.display());
            println!("  database  {}", info.database.display());
            println!("  logs      {}", info.log_dir.display());
        }
        None => {
            let webroot = config
                .paths
                .webroot
                .clone()
                .unwrap_or_else(DevwpConfig::default_webroot);
            println!("  webroot   {}", webroot.display());
            println!("  database  {} {}", config.database_path().display(), style("(unavailable)").red());
            println!("  logs      {}", config.log_dir().display());
        }
    }
    println!("  compose   {}", config.compose_dir().display());
    println!("  hosts     {}", config.hosts_file().display());
    Ok(())
}
