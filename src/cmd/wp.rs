//! wp-cli passthrough: `devwp wp <domain> <args>...`.

use anyhow::Result;
use tokio::sync::mpsc;

use devwp::DevwpApi;
use devwp::events::CommandEvent;

/// Returns the wp-cli exit code so the binary can exit with it.
pub async fn cmd_wp(api: &DevwpApi, domain: &str, args: Vec<String>) -> Result<i32> {
    let (tx, mut rx) = mpsc::channel::<CommandEvent>(256);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                CommandEvent::Stdout(line) => println!("{}", line),
                CommandEvent::Stderr(line) => eprintln!("{}", line),
                CommandEvent::Completed { code } => {
                    tracing::debug!(code, "wp-cli finished");
                }
            }
        }
    });

    let code = api.run_wp_cli(domain, args, tx).await;
    let _ = printer.await;
    Ok(code?)
}
