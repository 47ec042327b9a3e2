//! File-backed content providers.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::core::{ContentError, Result, SondeError};
use crate::policy::CollectionPolicy;
use crate::provider::{Content, ContentProvider, MemoCell};

/// How a file's bytes are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileKind {
    /// Decode line-oriented text, rstrip each line, apply filters.
    #[default]
    Text,
    /// Return unmodified bytes.
    Raw,
}

/// Provider over one file under a context's filesystem root.
///
/// Construction validates the artifact up front: a path the policy rejects
/// is a skip, a path that does not exist or cannot be opened is a content
/// failure. The actual read is deferred to the first
/// [`ContentProvider::content`] call and memoized.
#[derive(Debug)]
pub struct FileProvider {
    root: PathBuf,
    relative_path: String,
    path: PathBuf,
    file_name: String,
    kind: FileKind,
    filters: BTreeSet<String>,
    cell: MemoCell<Content>,
}

impl FileProvider {
    /// Build a provider for `relative_path` under `root`.
    ///
    /// # Errors
    ///
    /// - [`SondeError::Skipped`] when the allow-list policy rejects the
    ///   logical path.
    /// - [`ContentError::Missing`] when the resolved path does not exist.
    /// - [`ContentError::Unreadable`] when it exists but cannot be opened.
    pub fn new(
        relative_path: &str,
        root: &Path,
        kind: FileKind,
        filters: BTreeSet<String>,
        policy: &dyn CollectionPolicy,
    ) -> Result<Self> {
        let relative = relative_path.trim_start_matches('/').to_string();
        let path = root.join(&relative);

        if !policy.allow_file(&format!("/{relative}")) {
            return Err(SondeError::skipped(format!("/{relative} denied by policy")));
        }
        if !path.exists() {
            return Err(ContentError::Missing {
                path: path.display().to_string(),
            }
            .into());
        }
        if File::open(&path).is_err() {
            return Err(ContentError::Unreadable {
                path: path.display().to_string(),
            }
            .into());
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            root: root.to_path_buf(),
            relative_path: relative,
            path,
            file_name,
            kind,
            filters,
            cell: MemoCell::new(),
        })
    }

    /// The filesystem root this provider resolves under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `/`-less path relative to the root.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Basename of the collected file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    fn load(&self) -> Result<Content> {
        trace!(path = %self.path.display(), kind = ?self.kind, "loading file");
        let io_error = |err: std::io::Error| ContentError::Io {
            path: self.path.display().to_string(),
            reason: err.to_string(),
        };
        match self.kind {
            FileKind::Raw => Ok(Content::Bytes(std::fs::read(&self.path).map_err(io_error)?)),
            FileKind::Text => {
                let text = std::fs::read_to_string(&self.path).map_err(io_error)?;
                let lines = text
                    .lines()
                    .filter(|line| {
                        self.filters.is_empty()
                            || self.filters.iter().any(|needle| line.contains(needle))
                    })
                    .map(|line| line.trim_end().to_string())
                    .collect();
                Ok(Content::Lines(lines))
            }
        }
    }
}

impl ContentProvider for FileProvider {
    fn path(&self) -> &Path {
        &self.path
    }

    fn content(&self) -> Result<&Content> {
        self.cell.get_or_load(|| self.load())
    }
}
