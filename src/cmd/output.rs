//! Terminal rendering of streamed events.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use devwp::events::ProgressEvent;

pub const CHECK: &str = "✓";
pub const CROSS: &str = "✗";
pub const WARN: &str = "!";

fn spinner(verbose: bool) -> ProgressBar {
    if !verbose && console::Term::stderr().is_term() {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    }
}

/// Render progress events until the sender side is dropped. Step messages
/// drive a spinner; command output is only echoed when verbose.
pub fn render_progress(verbose: bool) -> (mpsc::Sender<ProgressEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(64);
    let handle = tokio::spawn(async move {
        let bar = spinner(verbose);
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::Step { message, .. } => {
                    if bar.is_hidden() {
                        println!("{} {}", style("→").dim(), message);
                    }
                    bar.set_message(message);
                }
                ProgressEvent::Output(line) => {
                    if verbose {
                        bar.suspend(|| println!("    {}", style(line).dim()));
                    }
                }
                ProgressEvent::Done => bar.finish_and_clear(),
                ProgressEvent::Failed(message) => {
                    bar.finish_and_clear();
                    eprintln!("{} {}", style(CROSS).red(), message);
                }
            }
        }
        bar.finish_and_clear();
    });
    (tx, handle)
}

pub fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("{} {}", style(WARN).yellow().bold(), style(warning).yellow());
    }
}
