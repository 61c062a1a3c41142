//! Site management commands: `devwp sites`.

use anyhow::Result;
use console::style;
use dialoguer::Confirm;
use std::collections::HashSet;

use devwp::DevwpApi;
use devwp::store::Site;

use super::output::{self, CHECK};
use super::super::{Cli, MultisiteArg, SitesCommands};

fn build_site(
    domain: String,
    aliases: Option<String>,
    web_root: Option<String>,
    multisite: Option<MultisiteArg>,
) -> Site {
    let mut site = Site::new(domain);
    if let Some(aliases) = aliases {
        site = site.with_aliases(aliases);
    }
    if let Some(web_root) = web_root.filter(|w| !w.trim().is_empty()) {
        site = site.with_web_root(web_root);
    }
    if let Some(kind) = multisite {
        site = site.with_multisite(kind.into());
    }
    site
}

pub async fn cmd_sites(api: &DevwpApi, cli: &Cli, command: SitesCommands) -> Result<()> {
    match command {
        SitesCommands::List => {
            let sites = api.list_sites().await?;
            if sites.is_empty() {
                println!("No sites found in {}", api.app_info().await.webroot.display());
                return Ok(());
            }
            // directories created outside devwp have no record
            let records: HashSet<String> = match api.site_records().await {
                Ok(records) => records.into_iter().map(|s| s.domain).collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read site records");
                    HashSet::new()
                }
            };
            for site in sites {
                let marker = if records.contains(&site.name) { "" } else { " (unmanaged)" };
                println!(
                    "{:<32} {:<40} {}{}",
                    style(&site.name).bold(),
                    style(&site.url).cyan(),
                    style(site.path.display()).dim(),
                    style(marker).dim()
                );
            }
        }
        SitesCommands::Show { domain } => match api.get_site(&domain).await? {
            Some(site) => println!("{}", serde_json::to_string_pretty(&site)?),
            None => println!("No record for '{}'.", domain),
        },
        SitesCommands::Create {
            domain,
            aliases,
            web_root,
            multisite,
        } => {
            let site = build_site(domain, aliases, web_root, multisite);
            let (tx, renderer) = output::render_progress(cli.verbose);
            let result = api.create_site(site, Some(&tx)).await;
            drop(tx);
            let _ = renderer.await;

            let outcome = result?;
            println!(
                "{} Created {} at {}",
                style(CHECK).green(),
                style(&outcome.url).cyan().bold(),
                outcome.path.display()
            );
            if !outcome.installed {
                println!("  WordPress is not installed; a placeholder page is being served.");
            }
            output::print_warnings(&outcome.warnings);
        }
        SitesCommands::Update {
            domain,
            aliases,
            web_root,
            multisite,
        } => {
            let site = build_site(domain, aliases, web_root, multisite);
            let saved = api.update_site(site).await?;
            println!("{} Updated {}", style(CHECK).green(), saved.domain);
        }
        SitesCommands::Delete { domain } => {
            if !cli.yes {
                let confirm = Confirm::new()
                    .with_prompt(format!(
                        "Delete '{}' including its files and database?",
                        domain
                    ))
                    .default(false)
                    .interact()
                    .unwrap_or(false);

                if !confirm {
                    println!("Deletion cancelled.");
                    return Ok(());
                }
            }

            let outcome = api.delete_site(&domain).await?;
            println!("{} Deleted {}", style(CHECK).green(), domain);
            output::print_warnings(&outcome.warnings);
        }
    }

    Ok(())
}
