//! Command-backed content providers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use crate::context::{CommandOutput, ExecutionContext, RunOptions};
use crate::core::{Result, SondeError};
use crate::mangle::{COMMAND_DIR, mangle_command};
use crate::policy::CollectionPolicy;
use crate::provider::{Content, ContentProvider, MemoCell};

/// Provider over one command's output.
///
/// The provider's path is the archive-relative location the collection
/// agent writes the output to, `sonde_commands/<mangled command>`, so the
/// same declaration addresses the artifact identically on a live host and
/// in a pre-collected archive.
#[derive(Debug)]
pub struct CommandOutputProvider {
    cmd: String,
    args: Option<String>,
    path: PathBuf,
    ctx: Arc<dyn ExecutionContext>,
    opts: RunOptions,
    cell: MemoCell<CommandOutput>,
}

impl CommandOutputProvider {
    /// Build a provider that will run `cmd` through `ctx` on first content
    /// access.
    ///
    /// # Errors
    ///
    /// [`SondeError::Skipped`] when the allow-list policy rejects the
    /// command.
    pub fn new(
        cmd: impl Into<String>,
        ctx: Arc<dyn ExecutionContext>,
        opts: RunOptions,
        policy: &dyn CollectionPolicy,
    ) -> Result<Self> {
        let cmd = cmd.into();
        if !policy.allow_command(&cmd) {
            return Err(SondeError::skipped(format!("command `{cmd}` denied by policy")));
        }
        let path = Path::new(COMMAND_DIR).join(mangle_command(&cmd));
        Ok(Self {
            cmd,
            args: None,
            path,
            ctx,
            opts,
            cell: MemoCell::new(),
        })
    }

    /// Record the fan-out element that was substituted into the command
    /// template. The argument is already interpolated into `cmd`; it is
    /// kept for context.
    #[must_use]
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }

    fn load(&self) -> Result<CommandOutput> {
        trace!(cmd = %self.cmd, "loading command output");
        self.ctx.run(&self.cmd, &self.opts)
    }
}

impl ContentProvider for CommandOutputProvider {
    fn path(&self) -> &Path {
        &self.path
    }

    fn content(&self) -> Result<&Content> {
        self.cell
            .get_or_load(|| self.load())
            .map(|output| &output.content)
    }

    fn cmd(&self) -> Option<&str> {
        Some(&self.cmd)
    }

    fn args(&self) -> Option<&str> {
        self.args.as_deref()
    }

    fn rc(&self) -> Option<i32> {
        match self.cell.get() {
            Some(Ok(output)) => output.rc,
            _ => None,
        }
    }
}
