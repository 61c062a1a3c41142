//! Subprocess execution.
//!
//! Everything devwp does to the outside world (docker compose, the database
//! client, the installation CLI, privileged writes) goes through the
//! `CommandRunner` trait so orchestration logic can be exercised against
//! `ScriptedRunner` in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DevwpConfig;
use crate::errors::{DevwpError, Result};
use crate::events::{CommandEvent, ProgressEvent, emit};

/// A fully described command invocation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Bytes written to the child's stdin, which is then closed
    pub stdin: Option<String>,
    /// Values masked whenever the command is logged
    pub secrets: Vec<String>,
}

const REDACTED: &str = "***";

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Mark a value that appears in the arguments as sensitive.
    pub fn secret(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// Space-joined command line, used for scripted matching.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Command line safe to log: secrets are masked.
    pub fn redacted_line(&self) -> String {
        self.secrets
            .iter()
            .fold(self.command_line(), |line, secret| line.replace(secret.as_str(), REDACTED))
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut env_keys: Vec<&String> = self.env.keys().collect();
        env_keys.sort();
        f.debug_struct("CommandSpec")
            .field("command", &self.redacted_line())
            .field("cwd", &self.cwd)
            .field("env", &env_keys)
            .field("stdin_bytes", &self.stdin.as_ref().map(String::len))
            .finish()
    }
}

/// `docker compose <args>` run from the compose project directory.
pub fn compose<I, S>(config: &DevwpConfig, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new(config.containers.runtime.clone())
        .arg("compose")
        .args(args)
        .cwd(config.compose_dir())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero exit into `DevwpError::ExitCode`.
    pub fn check(self, program: &str) -> Result<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(DevwpError::exit_code(program, self.code, &self.stderr))
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. A non-zero exit is NOT an error
    /// here; only a failure to start the process is.
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput>;

    /// Run while forwarding each output line, then a `Completed` event.
    /// Returns the exit code.
    async fn stream(&self, spec: CommandSpec, tx: mpsc::Sender<CommandEvent>) -> Result<i32>;

    async fn run_checked(&self, spec: CommandSpec) -> Result<CommandOutput> {
        let program = spec.program.clone();
        self.run(spec).await?.check(&program)
    }
}

/// Runs real processes with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    fn build(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn spawn(spec: &CommandSpec) -> Result<tokio::process::Child> {
        tracing::debug!(command = %spec.redacted_line(), "spawning");
        Self::build(spec).spawn().map_err(|source| DevwpError::Spawn {
            program: spec.program.clone(),
            source,
        })
    }

    /// Stdin is written from its own task while the caller drains output.
    fn feed_stdin(
        child: &mut tokio::process::Child,
        spec: &CommandSpec,
    ) -> Option<JoinHandle<std::io::Result<()>>> {
        let input = spec.stdin.clone()?;
        let mut stdin = child.stdin.take()?;
        Some(tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        }))
    }

    /// A child may exit without draining stdin; only other write errors count.
    async fn finish_stdin(writer: Option<JoinHandle<std::io::Result<()>>>) -> Result<()> {
        let Some(writer) = writer else {
            return Ok(());
        };
        match writer.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            Ok(Err(e)) => Err(DevwpError::Other(anyhow::anyhow!("Failed to write stdin: {}", e))),
            Err(e) => Err(DevwpError::Other(anyhow::anyhow!("stdin writer panicked: {}", e))),
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        let mut child = Self::spawn(&spec)?;
        let writer = Self::feed_stdin(&mut child, &spec);

        let output = child.wait_with_output().await.map_err(|e| {
            DevwpError::Other(anyhow::anyhow!("Failed to wait for {}: {}", spec.program, e))
        })?;
        Self::finish_stdin(writer).await?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn stream(&self, spec: CommandSpec, tx: mpsc::Sender<CommandEvent>) -> Result<i32> {
        let mut child = Self::spawn(&spec)?;
        let writer = Self::feed_stdin(&mut child, &spec);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("stderr was not captured"))?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut out_done = false;
        let mut err_done = false;

        while !(out_done && err_done) {
            let event = tokio::select! {
                line = out_lines.next_line(), if !out_done => match line {
                    Ok(Some(l)) => Some(CommandEvent::Stdout(l)),
                    _ => { out_done = true; None }
                },
                line = err_lines.next_line(), if !err_done => match line {
                    Ok(Some(l)) => Some(CommandEvent::Stderr(l)),
                    _ => { err_done = true; None }
                },
            };
            if let Some(event) = event {
                if tx.send(event).await.is_err() {
                    // Consumer is gone; release the process.
                    let _ = child.kill().await;
                    return Err(DevwpError::Other(anyhow::anyhow!(
                        "Output consumer closed; {} was killed",
                        spec.program
                    )));
                }
            }
        }

        let status = child.wait().await.map_err(|e| {
            DevwpError::Other(anyhow::anyhow!("Failed to wait for {}: {}", spec.program, e))
        })?;
        Self::finish_stdin(writer).await?;
        let code = status.code().unwrap_or(-1);
        let _ = tx.send(CommandEvent::Completed { code }).await;
        Ok(code)
    }
}

/// Stream a command as `ProgressEvent::Output` lines. A non-zero exit
/// becomes `ExitCode`, using the last stderr line as the message.
pub async fn stream_progress(
    runner: &dyn CommandRunner,
    spec: CommandSpec,
    tx: &mpsc::Sender<ProgressEvent>,
) -> Result<()> {
    let program = spec.program.clone();
    let (line_tx, mut line_rx) = mpsc::channel::<CommandEvent>(64);

    let forward = async {
        let mut last_stderr = String::new();
        while let Some(event) = line_rx.recv().await {
            match event {
                CommandEvent::Stdout(line) => emit(tx, ProgressEvent::Output(line)).await,
                CommandEvent::Stderr(line) => {
                    last_stderr = line.clone();
                    emit(tx, ProgressEvent::Output(line)).await;
                }
                CommandEvent::Completed { .. } => {}
            }
        }
        last_stderr
    };

    let (code, last_stderr) = tokio::join!(runner.stream(spec, line_tx), forward);
    let code = code?;
    if code != 0 {
        return Err(DevwpError::exit_code(&program, code, &last_stderr));
    }
    Ok(())
}

/// Canned reply for `ScriptedRunner`.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Output(CommandOutput),
    SpawnFailure,
}

/// Test double: records every command and answers from rules matched by
/// substring against the command line (first rule wins, default is success
/// with empty output).
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    rules: Arc<Mutex<Vec<(String, ScriptedReply)>>>,
    calls: Arc<Mutex<Vec<CommandSpec>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, pattern: &str, code: i32, stdout: &str, stderr: &str) -> &Self {
        self.push_rule(
            pattern,
            ScriptedReply::Output(CommandOutput {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
        self
    }

    pub fn fail_spawn(&self, pattern: &str) -> &Self {
        self.push_rule(pattern, ScriptedReply::SpawnFailure);
        self
    }

    fn push_rule(&self, pattern: &str, reply: ScriptedReply) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push((pattern.to_string(), reply));
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    /// Number of recorded commands whose command line contains `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }

    fn reply(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        let line = spec.command_line();
        let reply = self.rules.lock().ok().and_then(|rules| {
            rules
                .iter()
                .find(|(pattern, _)| line.contains(pattern.as_str()))
                .map(|(_, reply)| reply.clone())
        });
        match reply {
            Some(ScriptedReply::Output(out)) => Ok(out),
            Some(ScriptedReply::SpawnFailure) => Err(DevwpError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            None => Ok(CommandOutput::default()),
        }
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        self.reply(&spec)
    }

    async fn stream(&self, spec: CommandSpec, tx: mpsc::Sender<CommandEvent>) -> Result<i32> {
        let out = self.reply(&spec)?;
        for line in out.stdout.lines() {
            let _ = tx.send(CommandEvent::Stdout(line.to_string())).await;
        }
        for line in out.stderr.lines() {
            let _ = tx.send(CommandEvent::Stderr(line.to_string())).await;
        }
        let _ = tx.send(CommandEvent::Completed { code: out.code }).await;
        Ok(out.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_program_and_args() {
        let spec = CommandSpec::new("docker").args(["compose", "ps"]);
        assert_eq!(spec.command_line(), "docker compose ps");
    }

    #[test]
    fn compose_runs_in_compose_dir() {
        let mut config = DevwpConfig::default();
        config.paths.compose_dir = Some(PathBuf::from("/opt/devwp"));
        let spec = compose(&config, ["up", "-d"]);
        assert_eq!(spec.command_line(), "docker compose up -d");
        assert_eq!(spec.cwd, Some(PathBuf::from("/opt/devwp")));
    }

    #[test]
    fn check_maps_nonzero_exit() {
        let out = CommandOutput {
            code: 2,
            stdout: String::new(),
            stderr: "boom\n".to_string(),
        };
        let err = out.check("wp").unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn process_runner_captures_output() {
        let out = ProcessRunner
            .run(CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.code, 3);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn process_runner_feeds_stdin() {
        let out = ProcessRunner
            .run(CommandSpec::new("cat").stdin("piped text"))
            .await
            .unwrap();
        assert_eq!(out.stdout, "piped text");
    }

    #[tokio::test]
    async fn process_runner_handles_stdin_larger_than_pipe_buffer() {
        let input = "127.0.0.1 blocked.example\n".repeat(10_000);
        let out = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            ProcessRunner.run(CommandSpec::new("tee").arg("/dev/null").stdin(input.clone())),
        )
        .await
        .expect("tee should not block on a full stdout pipe")
        .unwrap();
        assert_eq!(out.code, 0);
        assert_eq!(out.stdout.len(), input.len());
    }

    #[tokio::test]
    async fn process_runner_streams_large_stdin() {
        let input = "line\n".repeat(50_000);
        let (tx, mut rx) = mpsc::channel(64);
        let counter = tokio::spawn(async move {
            let mut lines = 0usize;
            while let Some(event) = rx.recv().await {
                if matches!(event, CommandEvent::Stdout(_)) {
                    lines += 1;
                }
            }
            lines
        });
        let code = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            ProcessRunner.stream(CommandSpec::new("cat").stdin(input), tx),
        )
        .await
        .expect("stream should not block on a full stdout pipe")
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(counter.await.unwrap(), 50_000);
    }

    #[test]
    fn redacted_line_masks_secrets() {
        let spec = CommandSpec::new("wp")
            .args(["config", "create", "--dbpass=s3cret"])
            .secret("s3cret")
            .secret("");
        assert_eq!(spec.command_line(), "wp config create --dbpass=s3cret");
        assert_eq!(spec.redacted_line(), "wp config create --dbpass=***");
        assert!(!format!("{:?}", spec).contains("s3cret"));
    }

    #[test]
    fn debug_hides_env_values() {
        let spec = CommandSpec::new("docker").env("MYSQL_PWD", "s3cret");
        let rendered = format!("{:?}", spec);
        assert!(rendered.contains("MYSQL_PWD"));
        assert!(!rendered.contains("s3cret"));
    }

    #[tokio::test]
    async fn process_runner_spawn_failure() {
        let err = ProcessRunner
            .run(CommandSpec::new("definitely-not-a-real-binary-devwp"))
            .await
            .unwrap_err();
        assert!(matches!(err, DevwpError::Spawn { .. }));
    }

    #[tokio::test]
    async fn process_runner_streams_lines_then_completion() {
        let (tx, mut rx) = mpsc::channel(16);
        let code = ProcessRunner
            .stream(CommandSpec::new("sh").args(["-c", "echo one; echo two"]), tx)
            .await
            .unwrap();
        assert_eq!(code, 0);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                CommandEvent::Stdout("one".into()),
                CommandEvent::Stdout("two".into()),
                CommandEvent::Completed { code: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn stream_progress_forwards_and_maps_exit() {
        let runner = ScriptedRunner::new();
        runner.on("up", 1, "pulling\n", "Error: port 443 in use\n");
        let (tx, mut rx) = mpsc::channel(16);

        let err = stream_progress(&runner, CommandSpec::new("docker").arg("up"), &tx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: port 443 in use");
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                ProgressEvent::Output("pulling".into()),
                ProgressEvent::Output("Error: port 443 in use".into()),
            ]
        );
    }

    #[tokio::test]
    async fn scripted_runner_matches_first_rule_and_records() {
        let runner = ScriptedRunner::new();
        runner.on("compose ps", 0, "abc|web|running|img:1\n", "");
        runner.on("compose", 1, "", "fallback");

        let out = runner
            .run(CommandSpec::new("docker").args(["compose", "ps"]))
            .await
            .unwrap();
        assert_eq!(out.stdout, "abc|web|running|img:1\n");

        let err = runner
            .run_checked(CommandSpec::new("docker").args(["compose", "down"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "fallback");
        assert_eq!(runner.count("docker compose"), 2);
    }
}
