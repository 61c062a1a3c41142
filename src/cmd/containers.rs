//! Container group commands: `devwp containers`.

use anyhow::Result;
use console::style;

use devwp::DevwpApi;
use devwp::containers::Container;

use super::output::{self, CHECK, CROSS};
use super::super::ContainersCommands;

fn print_containers(containers: &[Container]) {
    if containers.is_empty() {
        println!("No containers. Run `devwp containers start` first.");
        return;
    }
    for c in containers {
        let state = if c.is_running() {
            style(c.state.as_str()).green()
        } else {
            style(c.state.as_str()).red()
        };
        println!(
            "{:<28} {:<10} {:<12} {}",
            style(&c.name).bold(),
            state,
            c.version.as_deref().unwrap_or("-"),
            style(&c.id).dim()
        );
    }
}

pub async fn cmd_containers(api: &DevwpApi, command: Option<ContainersCommands>) -> Result<()> {
    match command {
        None | Some(ContainersCommands::List) => {
            print_containers(&api.list_containers().await?);
        }
        Some(ContainersCommands::Restart { id }) => {
            if api.restart_container(&id).await {
                println!("{} Restarted {}", style(CHECK).green(), id);
            } else {
                anyhow::bail!("Failed to restart {}", id);
            }
        }
        Some(ContainersCommands::Start) => {
            let verbose = api.context().verbose;
            let (tx, renderer) = output::render_progress(verbose);
            let result = api.start_containers(&tx).await;
            drop(tx);
            let _ = renderer.await;
            result?;
            println!("{} Containers started", style(CHECK).green());
        }
        Some(ContainersCommands::Stop) => {
            api.stop_containers().await?;
            println!("{} Containers stopped", style(CHECK).green());
        }
        Some(ContainersCommands::Watch { count }) => {
            let mut updates = api.watch_containers();
            let mut seen = 0usize;
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        let Some(update) = update else { break };
                        println!("{}", style(chrono::Local::now().format("%H:%M:%S")).dim());
                        if let Some(error) = &update.error {
                            eprintln!("{} {}", style(CROSS).red(), error);
                        }
                        print_containers(&update.containers);
                        seen += 1;
                        if count.is_some_and(|n| seen >= n) {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            api.stop_watching();
        }
    }
    Ok(())
}
