//! Running external tools
//!
//! Every tool shipyard drives (the Go toolchain, git, fpm, gpg, the aws cli) is invoked
//! through the [`ToolRunner`][] trait with a structured argument list. Nothing is ever
//! handed to a shell. The production implementation is [`ProcessRunner`][], tests swap in
//! a fake that emulates the tools.

use std::{fmt, process::Stdio, sync::Arc, time::Duration};

use axoprocess::{Cmd, LogStrategy};
use camino::Utf8PathBuf;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{DistError, DistResult};

/// How many bytes of stderr to keep in error messages
const STDERR_TAIL: usize = 2048;

/// A secret passed to a tool on stdin
///
/// Has a manual Debug impl so it can't leak into logs.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    /// Get the secret back out
    pub fn expose(&self) -> &str {
        &self.0
    }
}

// manual debug impl to prevent anyone adding derive(Debug) and leaking SECRETS
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<hidden>")
    }
}

/// A single invocation of an external tool
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// program to run
    pub program: String,
    /// what we're trying to do, for logs and errors ("build mytool for linux/amd64")
    pub summary: String,
    /// arguments, passed through verbatim
    pub args: Vec<String>,
    /// extra environment variables
    pub env: Vec<(String, String)>,
    /// working directory
    pub current_dir: Option<Utf8PathBuf>,
    /// written to the tool's stdin, then stdin is closed
    pub stdin: Option<Secret>,
    /// whether a non-zero exit is an error
    pub check: bool,
    /// whether to log the command line
    pub log: bool,
}

impl ToolCommand {
    /// Create a new invocation, with a summary of what it's trying to do
    pub fn new(program: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            summary: summary.into(),
            args: vec![],
            env: vec![],
            current_dir: None,
            stdin: None,
            check: true,
            log: true,
        }
    }

    /// Add an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.env.push((key.into(), val.into()));
        self
    }

    /// Set several environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Feed a secret on stdin (also disables command logging)
    pub fn stdin_secret(mut self, secret: Secret) -> Self {
        self.stdin = Some(secret);
        self.log = false;
        self
    }

    /// Set whether a non-zero exit is an error (defaults to true)
    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Set whether the command line is logged (defaults to true)
    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    /// Find the value following `flag` in the arguments
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|idx| self.args.get(idx + 1))
            .map(|s| s.as_str())
    }

    /// Look up an env var set on this command
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn to_cmd(&self) -> Cmd {
        let mut cmd = Cmd::new(&self.program, &self.summary);
        for arg in &self.args {
            cmd.arg(arg);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        if self.log {
            cmd.log(LogStrategy::Tracing(tracing::Level::INFO));
        } else {
            cmd.log(None::<LogStrategy>);
        }
        cmd
    }
}

/// What a tool printed and how it exited
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// exit code (None if killed by a signal)
    pub code: Option<i32>,
    /// captured stdout
    pub stdout: String,
    /// captured stderr
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the tool exited 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub(crate) fn status_string(&self) -> String {
        match self.code {
            Some(code) => format!("exit status: {code}"),
            None => "killed by signal".to_owned(),
        }
    }
}

/// Something that can run external tools
///
/// Implementors only need [`ToolRunner::execute`][], which must return `Ok` for any tool that
/// ran to completion regardless of its exit code. [`ToolRunner::invoke`][] layers the
/// exit code check on top.
pub trait ToolRunner: Send + Sync {
    /// Run the command and capture its output
    ///
    /// Errors are reserved for "couldn't run it at all": spawn failure, timeout, cancellation.
    fn execute(&self, cmd: &ToolCommand) -> DistResult<ToolOutput>;

    /// Run the command, turning a failed exit into an error if the command is checked
    fn invoke(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        let output = self.execute(cmd)?;
        if cmd.check && !output.success() {
            return Err(DistError::ToolStatus {
                summary: cmd.summary.clone(),
                status: output.status_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(output)
    }
}

pub(crate) fn stderr_tail(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.len() <= STDERR_TAIL {
        return stderr.to_owned();
    }
    let mut start = stderr.len() - STDERR_TAIL;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &stderr[start..])
}

/// Runs tools as real subprocesses
///
/// Each invocation is raced against the configured timeout and the run's cancellation
/// token. Children are killed when either fires.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    handle: tokio::runtime::Handle,
    timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ProcessRunner {
    /// Make a runner bound to the current tokio runtime
    ///
    /// Must be called from within a runtime context. The runner itself must be used from
    /// outside async code (the main thread or a `spawn_blocking` task).
    pub fn new(timeout: Option<Duration>, cancel: CancellationToken) -> Self {
        Self {
            handle: tokio::runtime::Handle::current(),
            timeout,
            cancel,
        }
    }

    async fn run(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        let axo = cmd.to_cmd();
        axo.log_command();

        let mut command = tokio::process::Command::from(axo.inner);
        command
            .kill_on_drop(true)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|cause| axoprocess::AxoprocessError::Exec {
            summary: cmd.summary.clone(),
            cause,
        })?;
        if let (Some(secret), Some(mut stdin)) = (&cmd.stdin, child.stdin.take()) {
            stdin.write_all(secret.expose().as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            // dropping closes the pipe
        }

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::select! {
                res = tokio::time::timeout(limit, wait) => match res {
                    Ok(output) => output?,
                    Err(_) => {
                        return Err(DistError::Timeout {
                            summary: cmd.summary.clone(),
                            seconds: limit.as_secs(),
                        })
                    }
                },
                _ = self.cancel.cancelled() => return Err(DistError::Cancelled),
            },
            None => tokio::select! {
                output = wait => output?,
                _ = self.cancel.cancelled() => return Err(DistError::Cancelled),
            },
        };

        let output = ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!("{} finished with {}", cmd.program, output.status_string());
        Ok(output)
    }
}

impl ToolRunner for ProcessRunner {
    fn execute(&self, cmd: &ToolCommand) -> DistResult<ToolOutput> {
        if self.cancel.is_cancelled() {
            return Err(DistError::Cancelled);
        }
        self.handle.block_on(self.run(cmd))
    }
}

/// An external tool we found
#[derive(Debug, Clone)]
pub struct Tool {
    /// the thing to pass to [`ToolCommand::new`][]
    pub cmd: String,
    /// the first line of its version output
    pub version: String,
}

/// All the external tools shipyard might use, and the runner to run them with
#[derive(Clone)]
pub struct Tools {
    /// how to run things
    pub runner: Arc<dyn ToolRunner>,
    /// the Go toolchain
    pub go: Option<Tool>,
    /// git
    pub git: Option<Tool>,
    /// fpm, for deb/rpm
    pub fpm: Option<Tool>,
    /// gpg, for signing
    pub gpg: Option<Tool>,
    /// the aws cli, for uploads
    pub aws: Option<Tool>,
}

impl fmt::Debug for Tools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tools")
            .field("go", &self.go)
            .field("git", &self.git)
            .field("fpm", &self.fpm)
            .field("gpg", &self.gpg)
            .field("aws", &self.aws)
            .finish_non_exhaustive()
    }
}

impl Tools {
    /// Look for every tool
    pub fn discover(runner: Arc<dyn ToolRunner>) -> Self {
        log_toolchain_env();
        let go = find_tool(runner.as_ref(), "go", "version");
        let git = find_tool(runner.as_ref(), "git", "--version");
        let fpm = find_tool(runner.as_ref(), "fpm", "--version");
        let gpg = find_tool(runner.as_ref(), "gpg", "--version");
        let aws = find_tool(runner.as_ref(), "aws", "--version");
        Self {
            runner,
            go,
            git,
            fpm,
            gpg,
            aws,
        }
    }

    /// Get the Go toolchain or error out
    pub fn go(&self) -> DistResult<&Tool> {
        self.go.as_ref().ok_or_else(|| DistError::ToolMissing {
            tool: "go".to_owned(),
            help: "install Go from https://go.dev/dl/ and make sure it's on your PATH".to_owned(),
        })
    }

    /// Get fpm or error out
    pub fn fpm(&self) -> DistResult<&Tool> {
        self.fpm.as_ref().ok_or_else(|| DistError::ToolMissing {
            tool: "fpm".to_owned(),
            help: "deb/rpm packages need fpm: `gem install fpm`, or skip them with --package-format=tar,zip".to_owned(),
        })
    }
}

fn find_tool(runner: &dyn ToolRunner, name: &str, version_arg: &str) -> Option<Tool> {
    let cmd = ToolCommand::new(name, format!("find {name}"))
        .arg(version_arg)
        .check(false)
        .log(false);
    let output = runner.execute(&cmd).ok()?;
    if !output.success() {
        return None;
    }
    let version = output.stdout.lines().next().unwrap_or_default().trim().to_owned();
    info!("found {name}: {version}");
    Some(Tool {
        cmd: name.to_owned(),
        version,
    })
}

/// Log the toolchain location variables; none of them are required
fn log_toolchain_env() {
    for var in ["GOPATH", "GOBIN", "GOROOT", "GOFLAGS"] {
        match std::env::var(var) {
            Ok(val) => debug!("{var}={val}"),
            Err(_) => debug!("{var} is not set"),
        }
    }
}
