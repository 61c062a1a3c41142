//! Hosts-file block editor.
//!
//! devwp owns a single region of the system hosts file:
//!
//! ```text
//! # Start DevWP
//! 127.0.0.1 demo.test www.demo.test
//! 127.0.0.1 shop.test
//! # End DevWP
//! ```
//!
//! Lines outside the markers are never touched. The block is created on
//! first add and removed, markers included, once its last entry goes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{DevwpError, Result};
use crate::exec::{CommandRunner, CommandSpec};

pub const BLOCK_START: &str = "# Start DevWP";
pub const BLOCK_END: &str = "# End DevWP";
const LOOPBACK: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostsAction {
    Add,
    Remove,
}

/// Apply one add/remove to hosts-file text and return the new text.
///
/// `entry` is the domain optionally followed by space-separated aliases.
/// Existing lines are matched on the first token by substring, so removing
/// `test.com` also drops a `mytest.com` line inside the block.
pub fn apply_entry(content: &str, entry: &str, action: HostsAction) -> String {
    let entry = entry.split_whitespace().collect::<Vec<_>>().join(" ");
    let domain = entry.split_whitespace().next().unwrap_or("");
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let (start, end) = match find_block(&mut lines) {
        Some(bounds) => bounds,
        None => {
            if action == HostsAction::Remove {
                return normalize(lines);
            }
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(BLOCK_START.to_string());
            lines.push(BLOCK_END.to_string());
            (lines.len() - 2, lines.len() - 1)
        }
    };

    let mut block: Vec<String> = lines[start + 1..end]
        .iter()
        .filter(|line| domain.is_empty() || !line.contains(domain))
        .cloned()
        .collect();

    if action == HostsAction::Add && !domain.is_empty() {
        block.retain(|l| !l.trim().is_empty());
        block.push(format!("{} {}", LOOPBACK, entry));
    }

    let tail = lines.split_off(end + 1);
    lines.truncate(start);
    if block.iter().any(|l| !l.trim().is_empty()) {
        lines.push(BLOCK_START.to_string());
        lines.extend(block);
        lines.push(BLOCK_END.to_string());
    }
    lines.extend(tail);

    normalize(lines)
}

/// Locate the marker lines. A start marker without an end runs to the end
/// of the file and gets its end marker back.
fn find_block(lines: &mut Vec<String>) -> Option<(usize, usize)> {
    let start = lines.iter().position(|l| l.trim() == BLOCK_START)?;
    match lines[start + 1..].iter().position(|l| l.trim() == BLOCK_END) {
        Some(offset) => Some((start, start + 1 + offset)),
        None => {
            while lines.last().is_some_and(|l| l.trim().is_empty()) {
                lines.pop();
            }
            lines.push(BLOCK_END.to_string());
            Some((start, lines.len() - 1))
        }
    }
}

/// Collapse runs of blank lines to one, drop trailing blanks, end with a newline.
fn normalize(lines: Vec<String>) -> String {
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        let blank = line.trim().is_empty();
        if blank && out.last().is_some_and(|l: &String| l.trim().is_empty()) {
            continue;
        }
        out.push(if blank { String::new() } else { line });
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    if out.is_empty() {
        return String::new();
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

/// Reads, edits and writes back the system hosts file.
pub struct HostsEditor {
    path: PathBuf,
    runner: Arc<dyn CommandRunner>,
    /// Prefix used when the file is not directly writable
    elevate: Vec<String>,
}

impl HostsEditor {
    pub fn new(path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>, elevate: Vec<String>) -> Self {
        Self {
            path: path.into(),
            runner,
            elevate,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn apply(&self, entry: &str, action: HostsAction) -> Result<()> {
        let current = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(DevwpError::from_io(&self.path, e)),
        };

        let updated = apply_entry(&current, entry, action);
        if updated == current {
            return Ok(());
        }

        tracing::info!(entry, ?action, path = %self.path.display(), "updating hosts file");
        self.write(&updated).await
    }

    async fn write(&self, content: &str) -> Result<()> {
        match tokio::fs::write(&self.path, content).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && !self.elevate.is_empty() => {
                self.write_elevated(content).await
            }
            Err(e) => Err(DevwpError::from_io(&self.path, e)),
        }
    }

    async fn write_elevated(&self, content: &str) -> Result<()> {
        let (program, prefix) = self
            .elevate
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("No elevation command configured"))?;
        let spec = CommandSpec::new(program.clone())
            .args(prefix.iter().cloned())
            .arg("tee")
            .arg(self.path.to_string_lossy().to_string())
            .stdin(content);
        self.runner.run_checked(spec).await?;
        Ok(())
    }
}
