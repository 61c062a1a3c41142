//! Stored settings: `devwp settings`.

use anyhow::Result;
use console::style;

use devwp::DevwpApi;

use super::super::SettingsCommands;

pub async fn cmd_settings(api: &DevwpApi, command: Option<SettingsCommands>) -> Result<()> {
    let verbose = api.context().verbose;
    match command {
        None | Some(SettingsCommands::List) => {
            let settings = api.list_settings().await?;
            if settings.is_empty() {
                println!("No settings stored.");
            }
            for (key, value) in settings {
                println!("{} = {}", style(key).bold(), value);
            }
        }
        Some(SettingsCommands::Get { key }) => match api.setting_record(&key).await? {
            Some(record) if verbose => {
                println!("{}", record.value);
                eprintln!("{}", style(format!("updated {}", record.updated_at)).dim());
            }
            Some(record) => println!("{}", record.value),
            None => {
                eprintln!("Setting '{}' is not set.", key);
            }
        },
        Some(SettingsCommands::Set { key, value }) => {
            api.set_setting(&key, &value).await?;
            println!("{} = {}", style(&key).bold(), value);
        }
        Some(SettingsCommands::Delete { key }) => {
            api.delete_setting(&key).await?;
            println!("Deleted '{}'", key);
        }
    }
    Ok(())
}
