//! Error handling for the sonde datasource engine.
//!
//! The engine distinguishes three kinds of failure, and callers are expected
//! to branch on the kind rather than the message:
//!
//! - [`SondeError::Skipped`]: a construction-time policy rejection. The
//!   datasource is simply unavailable for this run; nothing is wrong.
//! - [`SondeError::Content`]: a load-time failure, such as a missing or unreadable
//!   path, zero glob matches, an empty fan-out, a failed or timed-out
//!   command. Terminal for the affected provider for the run.
//! - [`SondeError::Structure`]: a violation of the declaration model
//!   (multi-parent chaining, duplicate point names). These are programming
//!   errors in a declaration set and surface immediately at registration.
//!
//! Every variant is `Clone` because the engine memoizes failures: once a
//! provider's load fails, the stored error is replayed verbatim on every
//! later access and the load is never retried.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, SondeError>;

/// The top-level error type for datasource evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SondeError {
    /// The datasource was rejected by policy before any work happened.
    /// Absence, not failure: a skipped component is simply not present in
    /// the broker for this run.
    #[error("datasource skipped: {0}")]
    Skipped(String),

    /// A load-time failure. Cached on the provider and replayed on every
    /// later access.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// A violation of the declaration-set model. Fatal, surfaced at
    /// registration time.
    #[error(transparent)]
    Structure(#[from] StructureError),
}

impl SondeError {
    /// Construct a [`SondeError::Skipped`] with the given reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    /// True for policy skips, which mean "absent this run" rather than
    /// "broken".
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }

    /// True for load-time content failures.
    pub const fn is_content(&self) -> bool {
        matches!(self, Self::Content(_))
    }
}

/// Load-time failures for a single collected artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    /// The resolved path does not exist.
    #[error("{path} does not exist")]
    Missing { path: String },

    /// The resolved path exists but cannot be read.
    #[error("cannot access {path}")]
    Unreadable { path: String },

    /// An io error while reading content.
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    /// No glob pattern produced a usable provider. `reasons` retains why
    /// each match that did exist was rejected.
    #[error("[{patterns}] didn't match: {reasons}")]
    NoMatch { patterns: String, reasons: String },

    /// None of an ordered candidate list could be built.
    #[error("none of [{candidates}] found")]
    NoCandidate { candidates: String },

    /// A directory listing produced nothing.
    #[error("can't list {path} or nothing there")]
    EmptyListing { path: String },

    /// A fan-out produced zero successful results. `reasons` retains the
    /// per-element failures.
    #[error("no results found for [{template}]: {reasons}")]
    EmptyFanOut { template: String, reasons: String },

    /// A command exited unsuccessfully (and the caller did not ask to keep
    /// the return code) or could not be spawned.
    #[error("command `{cmd}` failed: {reason}")]
    CommandFailed { cmd: String, reason: String },

    /// A command exceeded the caller-supplied timeout.
    #[error("command `{cmd}` timed out after {timeout:?}")]
    CommandTimeout { cmd: String, timeout: Duration },

    /// An upstream broker value could not be coerced into fan-out elements.
    #[error("cannot iterate over {found} as fan-out source")]
    NotIterable { found: String },
}

/// Violations of the declaration-set model. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    /// A declaration set tried to chain from more than one parent. The
    /// override history of a point must stay linear.
    #[error("declaration set `{set}` must chain from exactly one parent")]
    MultipleParents { set: String },

    /// A registry point name collided with one already declared in the
    /// chain.
    #[error("registry point `{name}` already declared in set `{set}`")]
    DuplicatePoint { set: String, name: String },

    /// A dependency cycle was hit while evaluating a component.
    #[error("dependency cycle while evaluating `{component}`")]
    DependencyCycle { component: String },
}
