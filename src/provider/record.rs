//! Serialization bridge between providers and plain records.
//!
//! Archiving a run stores each provider as a [`ProviderRecord`]: the path,
//! command attributes when present, and the realized content. Building the
//! record forces a load if one has not happened yet; a failure there is a
//! save failure, not a silent drop. Reconstruction restores every
//! attribute with content pre-populated: no load runs and no allow-list
//! validation is repeated.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::provider::{Content, ContentProvider, MemoCell};

/// Plain serializable form of one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Artifact path (concrete or archive-relative).
    pub path: String,
    /// Producing command, for command providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    /// Substituted fan-out argument, for templated commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    /// Captured exit code, when the provider kept one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    /// Realized content.
    pub content: Content,
}

impl ProviderRecord {
    /// Capture `provider` into a record, forcing its load if needed.
    ///
    /// # Errors
    ///
    /// The provider's load failure (fresh or cached) surfaces here as the
    /// save failure.
    pub fn from_provider(provider: &dyn ContentProvider) -> Result<Self> {
        let content = provider.content()?.clone();
        Ok(Self {
            path: provider.path().display().to_string(),
            cmd: provider.cmd().map(str::to_string),
            args: provider.args().map(str::to_string),
            rc: provider.rc(),
            content,
        })
    }

    /// Reconstruct a provider with content pre-populated.
    pub fn into_provider(self) -> StoredProvider {
        StoredProvider {
            path: PathBuf::from(self.path),
            cmd: self.cmd,
            args: self.args,
            rc: self.rc,
            cell: MemoCell::preset(self.content),
        }
    }
}

/// A provider reconstructed from a [`ProviderRecord`].
///
/// Content is already realized; access never triggers a load and never
/// re-validates against the allow-list policy.
#[derive(Debug)]
pub struct StoredProvider {
    path: PathBuf,
    cmd: Option<String>,
    args: Option<String>,
    rc: Option<i32>,
    cell: MemoCell<Content>,
}

impl ContentProvider for StoredProvider {
    fn path(&self) -> &Path {
        &self.path
    }

    fn content(&self) -> Result<&Content> {
        self.cell
            .get_or_load(|| unreachable!("stored provider content is preset"))
    }

    fn cmd(&self) -> Option<&str> {
        self.cmd.as_deref()
    }

    fn args(&self) -> Option<&str> {
        self.args.as_deref()
    }

    fn rc(&self) -> Option<i32> {
        self.rc
    }
}
