//! Core types for the sonde datasource engine.
//!
//! This module defines the shared vocabulary the rest of the crate builds
//! on:
//!
//! - [`SondeError`] and its sub-enums: the three-kind error model
//!   (skip / content failure / structural violation), all cloneable so
//!   memoized failures replay verbatim.
//! - [`Value`]: the tagged value a component leaves in the broker, one
//!   artifact, a sequence of artifacts, a raw value, or a seeded context,
//!   with one coercion point, [`Value::elements`], used at every fan-out
//!   boundary.

pub mod error;

pub use error::{ContentError, Result, SondeError, StructureError};

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::provider::{Content, ContentProvider};

/// A value produced by one component and stored in the broker.
#[derive(Debug, Clone)]
pub enum Value {
    /// Exactly one collected artifact.
    Single(Arc<dyn ContentProvider>),
    /// Zero or more collected artifacts from a multi-output datasource.
    /// Callers must treat this as a sequence even when it holds one entry.
    Many(Vec<Arc<dyn ContentProvider>>),
    /// A plain value that is not itself a collected artifact, such as a
    /// directory listing.
    Raw(RawValue),
    /// An execution context seeded into the run.
    Context(Arc<dyn ExecutionContext>),
}

/// Non-artifact broker values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// A single opaque string.
    Text(String),
    /// An ordered list of entries, e.g. directory basenames.
    Entries(Vec<String>),
}

impl Value {
    /// Coerce this value into the element sequence a fan-out combinator
    /// iterates over.
    ///
    /// A single provider contributes its content lines; a multi-output
    /// result contributes the concatenated lines of every artifact; a raw
    /// text value is a one-element sequence; a raw entry list is used as
    /// is. Byte content and contexts do not coerce.
    pub fn elements(&self) -> Result<Vec<String>> {
        match self {
            Value::Single(provider) => provider_lines(provider),
            Value::Many(providers) => {
                let mut out = Vec::new();
                for provider in providers {
                    out.extend(provider_lines(provider)?);
                }
                Ok(out)
            }
            Value::Raw(RawValue::Text(text)) => Ok(vec![text.clone()]),
            Value::Raw(RawValue::Entries(entries)) => Ok(entries.clone()),
            Value::Context(_) => Err(ContentError::NotIterable {
                found: "execution context".into(),
            }
            .into()),
        }
    }

    /// The seeded execution context, if this value holds one.
    pub fn as_context(&self) -> Option<Arc<dyn ExecutionContext>> {
        match self {
            Value::Context(ctx) => Some(Arc::clone(ctx)),
            _ => None,
        }
    }

    /// The single provider, if this value holds exactly one artifact.
    pub fn as_single(&self) -> Option<Arc<dyn ContentProvider>> {
        match self {
            Value::Single(provider) => Some(Arc::clone(provider)),
            _ => None,
        }
    }

    /// All providers held by this value, one for [`Value::Single`].
    pub fn providers(&self) -> Vec<Arc<dyn ContentProvider>> {
        match self {
            Value::Single(provider) => vec![Arc::clone(provider)],
            Value::Many(providers) => providers.clone(),
            _ => Vec::new(),
        }
    }
}

fn provider_lines(provider: &Arc<dyn ContentProvider>) -> Result<Vec<String>> {
    match provider.content()? {
        Content::Lines(lines) => Ok(lines.clone()),
        Content::Text(text) => Ok(vec![text.clone()]),
        Content::Bytes(_) => Err(ContentError::NotIterable {
            found: "raw bytes".into(),
        }
        .into()),
    }
}
