//! Execution contexts: where files live and where commands run.
//!
//! A run is seeded with one or more contexts. Datasources resolve a context
//! at evaluation time and go through it for all path translation and
//! command execution, which is what lets the same declaration collect from
//! a live host on one run and from a pre-collected archive on the next.
//!
//! [`HostContext`] executes commands through `tokio::process` with an
//! optional `tokio::time::timeout`, behind a blocking facade because the
//! evaluation core itself is synchronous. [`ArchiveContext`] never executes
//! anything; it replays command output from the file the collection agent
//! wrote, located via the shared mangling contract.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::{Builder, Runtime};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::core::{ContentError, Result};
use crate::mangle::{COMMAND_DIR, mangle_command};
use crate::provider::Content;

/// Options for one command execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Split output into rstripped lines (`Content::Lines`) instead of
    /// returning one text blob (`Content::Text`).
    pub split: bool,
    /// Capture the exit code instead of treating non-zero exit as failure.
    pub keep_rc: bool,
    /// Give up after this long; expiry is a content failure, not a crash.
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            split: true,
            keep_rc: false,
            timeout: None,
        }
    }
}

/// The outcome of one command execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Exit code, present only when [`RunOptions::keep_rc`] was set and the
    /// context could observe one.
    pub rc: Option<i32>,
    /// Captured stdout.
    pub content: Content,
}

/// Abstraction over where commands run and files live.
pub trait ExecutionContext: Send + Sync + fmt::Debug {
    /// Filesystem root every relative artifact path is resolved under.
    fn root(&self) -> &Path;

    /// Translate a logical path into the concrete path for this context.
    /// The default is the identity translation.
    fn locate_path(&self, logical: &str) -> String {
        logical.to_string()
    }

    /// Execute `cmd` (or replay its collected output) per `opts`.
    fn run(&self, cmd: &str, opts: &RunOptions) -> Result<CommandOutput>;
}

/// Live-host context: files under `/`, commands executed for real.
pub struct HostContext {
    root: PathBuf,
    runtime: Runtime,
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext").field("root", &self.root).finish()
    }
}

impl HostContext {
    /// Create a host context rooted at `/`.
    pub fn new() -> std::io::Result<Self> {
        Self::with_root("/")
    }

    /// Create a host context with a non-standard root, mostly for tests
    /// that stage a fake filesystem under a temporary directory.
    pub fn with_root(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            root: root.into(),
            runtime,
        })
    }
}

impl ExecutionContext for HostContext {
    fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, cmd: &str, opts: &RunOptions) -> Result<CommandOutput> {
        debug!(%cmd, timeout = ?opts.timeout, "executing command");
        let spawn_failed = |err: std::io::Error| ContentError::CommandFailed {
            cmd: cmd.to_string(),
            reason: err.to_string(),
        };

        let output = self.runtime.block_on(async {
            let child = Command::new("sh")
                .arg("-c")
                .arg(cmd)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(spawn_failed)?;

            match opts.timeout {
                Some(limit) => match timeout(limit, child.wait_with_output()).await {
                    Ok(done) => done.map_err(spawn_failed),
                    Err(_) => Err(ContentError::CommandTimeout {
                        cmd: cmd.to_string(),
                        timeout: limit,
                    }),
                },
                None => child.wait_with_output().await.map_err(spawn_failed),
            }
        })?;

        let rc = output.status.code().unwrap_or(-1);
        trace!(%cmd, rc, "command finished");
        if !opts.keep_rc && rc != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContentError::CommandFailed {
                cmd: cmd.to_string(),
                reason: format!("exit status {rc}: {}", stderr.trim()),
            }
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        Ok(CommandOutput {
            rc: opts.keep_rc.then_some(rc),
            content: split_output(stdout, opts.split),
        })
    }
}

/// Snapshot context: files and command output come from a pre-collected
/// archive directory; nothing is ever executed.
#[derive(Debug)]
pub struct ArchiveContext {
    root: PathBuf,
}

impl ArchiveContext {
    /// Create a context over an extracted archive rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ExecutionContext for ArchiveContext {
    fn root(&self) -> &Path {
        &self.root
    }

    fn run(&self, cmd: &str, opts: &RunOptions) -> Result<CommandOutput> {
        let path = self.root.join(COMMAND_DIR).join(mangle_command(cmd));
        debug!(%cmd, path = %path.display(), "replaying collected command output");
        if !path.exists() {
            return Err(ContentError::Missing {
                path: path.display().to_string(),
            }
            .into());
        }
        let text = std::fs::read_to_string(&path).map_err(|err| ContentError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        // An archive carries output, not exit codes.
        Ok(CommandOutput {
            rc: None,
            content: split_output(text, opts.split),
        })
    }
}

fn split_output(stdout: String, split: bool) -> Content {
    if split {
        Content::Lines(stdout.lines().map(|line| line.trim_end().to_string()).collect())
    } else {
        Content::Text(stdout)
    }
}
