//! File-collection combinators.

use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, trace, warn};

use crate::core::{ContentError, RawValue, Value};
use crate::datasource::{ContextSpec, Datasource};
use crate::engine::{ComponentId, Engine};
use crate::provider::{ContentProvider, FileKind, FileProvider};

/// Collect exactly one file.
///
/// The resolved context translates the logical path and supplies the
/// filesystem root; the provider's skip or content error propagates
/// unmodified.
pub fn simple_file(path: impl Into<String>) -> SimpleFile {
    SimpleFile {
        path: path.into(),
        kind: FileKind::Text,
        context: ContextSpec::Default,
    }
}

/// Builder for [`simple_file`].
#[derive(Debug)]
pub struct SimpleFile {
    path: String,
    kind: FileKind,
    context: ContextSpec,
}

impl SimpleFile {
    /// Collect raw bytes instead of filtered text lines.
    #[must_use]
    pub fn kind(mut self, kind: FileKind) -> Self {
        self.kind = kind;
        self
    }

    /// Evaluate against exactly this context.
    #[must_use]
    pub fn context(mut self, context: ComponentId) -> Self {
        self.context = ContextSpec::One(context);
        self
    }

    /// Evaluate against the first-present of these contexts.
    #[must_use]
    pub fn contexts(mut self, contexts: Vec<ComponentId>) -> Self {
        self.context = ContextSpec::FirstOf(contexts);
        self
    }
}

impl Datasource for SimpleFile {
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
        let deps = self.context.candidates(engine);
        let Self { path, kind, context } = self;
        engine.register(
            name,
            deps,
            false,
            Box::new(move |engine, id, broker| {
                let ctx = context.resolve(engine, broker)?;
                let located = ctx.locate_path(&path);
                let provider = FileProvider::new(
                    &located,
                    ctx.root(),
                    kind,
                    engine.filters_for(id),
                    engine.policy(),
                )?;
                Ok(Value::Single(Arc::new(provider)))
            }),
        )
    }
}

/// Collect every file matching one or more glob patterns.
///
/// Matches that fail to build are logged and skipped; the combinator fails
/// with a content error only when no pattern produced a usable provider.
pub fn glob_file<I, S>(patterns: I) -> GlobFile
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    GlobFile {
        patterns: patterns.into_iter().map(Into::into).collect(),
        ignore: None,
        kind: FileKind::Text,
        context: ContextSpec::Default,
    }
}

/// Builder for [`glob_file`].
#[derive(Debug)]
pub struct GlobFile {
    patterns: Vec<String>,
    ignore: Option<Regex>,
    kind: FileKind,
    context: ContextSpec,
}

impl GlobFile {
    /// Skip matches whose path matches this regular expression. An
    /// invalid expression is dropped with a warning rather than failing
    /// registration.
    #[must_use]
    pub fn ignore(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(regex) => self.ignore = Some(regex),
            Err(err) => warn!(%pattern, %err, "ignoring invalid ignore expression"),
        }
        self
    }

    /// Collect raw bytes instead of filtered text lines.
    #[must_use]
    pub fn kind(mut self, kind: FileKind) -> Self {
        self.kind = kind;
        self
    }

    /// Evaluate against exactly this context.
    #[must_use]
    pub fn context(mut self, context: ComponentId) -> Self {
        self.context = ContextSpec::One(context);
        self
    }
}

impl Datasource for GlobFile {
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
        let deps = self.context.candidates(engine);
        let Self { patterns, ignore, kind, context } = self;
        engine.register(
            name,
            deps,
            true,
            Box::new(move |engine, id, broker| {
                let ctx = context.resolve(engine, broker)?;
                let root = ctx.root();
                let filters = engine.filters_for(id);
                let mut results: Vec<Arc<dyn ContentProvider>> = Vec::new();
                let mut failures: Vec<String> = Vec::new();

                for pattern in &patterns {
                    let located = ctx.locate_path(pattern);
                    let full = root.join(located.trim_start_matches('/'));
                    let entries = match glob::glob(&full.to_string_lossy()) {
                        Ok(entries) => entries,
                        Err(err) => {
                            debug!(%pattern, %err, "bad glob pattern");
                            continue;
                        }
                    };
                    for entry in entries.flatten() {
                        if ignore
                            .as_ref()
                            .is_some_and(|re| re.is_match(&entry.to_string_lossy()))
                        {
                            trace!(path = %entry.display(), "ignored by pattern");
                            continue;
                        }
                        match relative_to(&entry, root)
                            .and_then(|rel| {
                                FileProvider::new(rel, root, kind, filters.clone(), engine.policy())
                            }) {
                            Ok(provider) => results.push(Arc::new(provider)),
                            Err(err) => {
                                debug!(path = %entry.display(), %err, "skipping glob match");
                                failures.push(format!("{}: {err}", entry.display()));
                            }
                        }
                    }
                }

                if results.is_empty() {
                    return Err(ContentError::NoMatch {
                        patterns: patterns.join(", "),
                        reasons: if failures.is_empty() {
                            "nothing matched".to_string()
                        } else {
                            failures.join("; ")
                        },
                    }
                    .into());
                }
                Ok(Value::Many(results))
            }),
        )
    }
}

/// Collect the first of an ordered list of candidate paths that builds.
///
/// Candidates are tried at construction time only; the combinator fails
/// with a content error when every candidate fails.
pub fn first_file<I, S>(paths: I) -> FirstFile
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    FirstFile {
        paths: paths.into_iter().map(Into::into).collect(),
        kind: FileKind::Text,
        context: ContextSpec::Default,
    }
}

/// Builder for [`first_file`].
#[derive(Debug)]
pub struct FirstFile {
    paths: Vec<String>,
    kind: FileKind,
    context: ContextSpec,
}

impl FirstFile {
    /// Collect raw bytes instead of filtered text lines.
    #[must_use]
    pub fn kind(mut self, kind: FileKind) -> Self {
        self.kind = kind;
        self
    }

    /// Evaluate against exactly this context.
    #[must_use]
    pub fn context(mut self, context: ComponentId) -> Self {
        self.context = ContextSpec::One(context);
        self
    }
}

impl Datasource for FirstFile {
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
        let deps = self.context.candidates(engine);
        let Self { paths, kind, context } = self;
        engine.register(
            name,
            deps,
            false,
            Box::new(move |engine, id, broker| {
                let ctx = context.resolve(engine, broker)?;
                for path in &paths {
                    let located = ctx.locate_path(path);
                    match FileProvider::new(
                        &located,
                        ctx.root(),
                        kind,
                        engine.filters_for(id),
                        engine.policy(),
                    ) {
                        Ok(provider) => return Ok(Value::Single(Arc::new(provider))),
                        Err(err) => trace!(%path, %err, "candidate unavailable"),
                    }
                }
                Err(ContentError::NoCandidate {
                    candidates: paths.join(", "),
                }
                .into())
            }),
        )
    }
}

/// List a directory's entries, or the basenames of a glob expansion when
/// the path is not a directory.
pub fn listdir(path: impl Into<String>) -> ListDir {
    ListDir {
        path: path.into(),
        context: ContextSpec::Default,
    }
}

/// Builder for [`listdir`].
#[derive(Debug)]
pub struct ListDir {
    path: String,
    context: ContextSpec,
}

impl ListDir {
    /// Evaluate against exactly this context.
    #[must_use]
    pub fn context(mut self, context: ComponentId) -> Self {
        self.context = ContextSpec::One(context);
        self
    }
}

impl Datasource for ListDir {
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
        let deps = self.context.candidates(engine);
        let Self { path, context } = self;
        engine.register(
            name,
            deps,
            false,
            Box::new(move |engine, _, broker| {
                let ctx = context.resolve(engine, broker)?;
                let located = ctx.locate_path(&path);
                let full = ctx.root().join(located.trim_start_matches('/'));

                if full.is_dir() {
                    let mut entries: Vec<String> = std::fs::read_dir(&full)
                        .map_err(|err| ContentError::Io {
                            path: full.display().to_string(),
                            reason: err.to_string(),
                        })?
                        .filter_map(|entry| entry.ok())
                        .map(|entry| entry.file_name().to_string_lossy().into_owned())
                        .collect();
                    entries.sort();
                    return Ok(Value::Raw(RawValue::Entries(entries)));
                }

                let mut names: Vec<String> = glob::glob(&full.to_string_lossy())
                    .map_err(|err| ContentError::Io {
                        path: full.display().to_string(),
                        reason: err.to_string(),
                    })?
                    .flatten()
                    .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .collect();
                names.sort();
                if names.is_empty() {
                    return Err(ContentError::EmptyListing {
                        path: full.display().to_string(),
                    }
                    .into());
                }
                Ok(Value::Raw(RawValue::Entries(names)))
            }),
        )
    }
}

fn relative_to<'p>(path: &'p Path, root: &Path) -> crate::core::Result<&'p str> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_str().ok_or_else(|| {
        ContentError::Io {
            path: path.display().to_string(),
            reason: "path is not valid UTF-8".into(),
        }
        .into()
    })
}
