//! Content providers: lazy, memoized wrappers around collected artifacts.
//!
//! A provider represents one artifact (a file's contents, one command's
//! output) without holding the data until someone asks for it. Reading
//! [`ContentProvider::content`] triggers the underlying load at most once
//! per instance; the result, success or failure, is cached for the
//! lifetime of the provider, and a cached failure is replayed verbatim on
//! every later access, never retried.
//!
//! Providers are identified by instance, never compared structurally.

mod command;
mod file;
pub mod record;

pub use command::CommandOutputProvider;
pub use file::{FileKind, FileProvider};
pub use record::{ProviderRecord, StoredProvider};

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::core::Result;

/// Realized artifact content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    /// Line-oriented text, already rstripped and filtered.
    Lines(Vec<String>),
    /// Unsplit text, e.g. command output captured whole.
    Text(String),
    /// Unmodified bytes from a raw file provider.
    Bytes(Vec<u8>),
}

impl Content {
    /// Lines of this content, when it is line-oriented.
    pub fn lines(&self) -> Option<&[String]> {
        match self {
            Content::Lines(lines) => Some(lines),
            _ => None,
        }
    }
}

/// One collected artifact.
pub trait ContentProvider: fmt::Debug + Send + Sync {
    /// Path of the artifact: concrete for file providers,
    /// archive-relative (`sonde_commands/<mangled>`) for command providers.
    fn path(&self) -> &Path;

    /// Realized content, loading it on first access. A failed load is
    /// cached and returned again on every later call.
    fn content(&self) -> Result<&Content>;

    /// The command that produced this artifact, for command providers.
    fn cmd(&self) -> Option<&str> {
        None
    }

    /// The substituted fan-out argument, when this artifact came from a
    /// templated command.
    fn args(&self) -> Option<&str> {
        None
    }

    /// Captured exit code, when requested and already observed.
    fn rc(&self) -> Option<i32> {
        None
    }
}

/// Single-shot memoization cell backing every provider.
///
/// Wraps `OnceLock` so independent providers stay independently evaluable
/// from different threads; a single provider is assumed to have one
/// evaluator at a time.
pub(crate) struct MemoCell<T>(OnceLock<Result<T>>);

impl<T: fmt::Debug> fmt::Debug for MemoCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(state) => write!(f, "MemoCell({state:?})"),
            None => write!(f, "MemoCell(<unloaded>)"),
        }
    }
}

impl<T> MemoCell<T> {
    pub(crate) fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Create a cell already holding `value`, for providers reconstructed
    /// from serialized records.
    pub(crate) fn preset(value: T) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Ok(value));
        Self(cell)
    }

    /// Return the stored result, running `load` only if nothing is stored
    /// yet. A stored error is cloned out on every call.
    pub(crate) fn get_or_load(&self, load: impl FnOnce() -> Result<T>) -> Result<&T> {
        match self.0.get_or_init(load) {
            Ok(value) => Ok(value),
            Err(err) => Err(err.clone()),
        }
    }

    /// The stored result, if a load already happened.
    pub(crate) fn get(&self) -> Option<&Result<T>> {
        self.0.get()
    }
}
