//! Xdebug mode: `devwp xdebug`.

use anyhow::Result;
use console::style;

use devwp::DevwpApi;

use super::output::{self, CHECK};
use super::super::XdebugCommands;

fn label(enabled: bool) -> console::StyledObject<&'static str> {
    if enabled {
        style("enabled").green()
    } else {
        style("disabled").dim()
    }
}

pub async fn cmd_xdebug(api: &DevwpApi, command: Option<XdebugCommands>) -> Result<()> {
    let target = match command.unwrap_or(XdebugCommands::Status) {
        XdebugCommands::Status => {
            println!("Xdebug is {}", label(api.xdebug_status().await));
            return Ok(());
        }
        XdebugCommands::On => Some(true),
        XdebugCommands::Off => Some(false),
        XdebugCommands::Toggle => None,
    };

    let (tx, renderer) = output::render_progress(api.context().verbose);
    let result = match target {
        Some(enabled) => api.set_xdebug(enabled, &tx).await.map(|_| enabled),
        None => api.toggle_xdebug(&tx).await,
    };
    drop(tx);
    let _ = renderer.await;

    let enabled = result?;
    println!("{} Xdebug {}", style(CHECK).green(), label(enabled));
    Ok(())
}
