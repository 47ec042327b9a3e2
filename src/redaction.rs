//! Content redaction for collected archives.
//!
//! Produces a redacted copy of a directory of collected raw files. Every
//! file gets the fixed secret-stripping rule set (password-style
//! assignments have their values replaced); a deny-pattern configuration
//! additionally drops whole lines, matching either literal substrings or,
//! when flagged, regular expressions.
//!
//! A fixed skip-list of files is never touched regardless of
//! configuration: machine identifiers and branch/version/display/tag
//! metadata are required downstream for service functionality, so they are
//! copied byte for byte.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Files excluded from redaction because their content is required for
/// service functionality.
pub const SKIPLIST: &[&str] = &[
    "etc/sonde/machine-id",
    "etc/machine-id",
    "sonde_commands/subscription-manager_identity",
    "display_name",
    "blacklist_report",
    "tags.json",
    "branch_info", // TODO redact this one
    "version_info",
    "egg_release",
];

/// Secret-stripping rules applied to every redacted file.
static SECRET_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)((?:password|passwd|pwd)[A-Za-z0-9_]*\s*[=:]+\s*)\S+").unwrap(),
            "${1}********",
        ),
        (
            Regex::new(r"(?i)((?:password|passwd|pwd)[A-Za-z0-9_]*\s*--?\S*\s+)\S+").unwrap(),
            "${1}********",
        ),
    ]
});

/// Deny-pattern configuration for a redaction run.
#[derive(Debug, Clone, Default)]
pub struct RedactionConfig {
    /// Lines matching any entry are dropped.
    pub patterns: Vec<String>,
    /// Treat `patterns` as regular expressions instead of literal
    /// substrings.
    pub regex: bool,
}

enum DenyMatcher {
    Literal(Vec<String>),
    Regex(Vec<Regex>),
}

impl DenyMatcher {
    fn compile(config: &RedactionConfig) -> Result<Self> {
        if config.regex {
            let compiled = config
                .patterns
                .iter()
                .map(|pattern| {
                    Regex::new(pattern)
                        .with_context(|| format!("invalid deny pattern `{pattern}`"))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Self::Regex(compiled))
        } else {
            Ok(Self::Literal(config.patterns.clone()))
        }
    }

    fn matches(&self, line: &str) -> bool {
        match self {
            Self::Literal(patterns) => patterns.iter().any(|needle| line.contains(needle)),
            Self::Regex(patterns) => patterns.iter().any(|re| re.is_match(line)),
        }
    }
}

/// Write a redacted copy of `src` under `dst`, creating `dst` as needed.
///
/// Directory structure is preserved. Skip-listed files are copied
/// unchanged; every other text file is rewritten with deny-matching lines
/// dropped and secret values stripped. Files that are not valid UTF-8 are
/// copied unchanged with a log line.
///
/// # Errors
///
/// Fails on an invalid deny regex or on filesystem errors for the source
/// or destination trees.
pub fn redact_directory(src: &Path, dst: &Path, config: &RedactionConfig) -> Result<()> {
    debug!(src = %src.display(), dst = %dst.display(), "running content redaction");
    let deny = DenyMatcher::compile(config)?;
    if config.patterns.is_empty() {
        debug!("deny-pattern configuration is empty");
    }

    for entry in WalkDir::new(src) {
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walked path is under its root");
        let out = dst.join(rel);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        if is_skiplisted(rel) {
            debug!(file = %rel.display(), "skip-listed, copying unchanged");
            fs::copy(entry.path(), &out)
                .with_context(|| format!("copying {}", rel.display()))?;
            continue;
        }

        let raw = fs::read(entry.path())
            .with_context(|| format!("reading {}", rel.display()))?;
        match String::from_utf8(raw) {
            Ok(text) => {
                fs::write(&out, redact_text(&text, &deny))
                    .with_context(|| format!("writing {}", out.display()))?;
            }
            Err(raw) => {
                warn!(file = %rel.display(), "not valid UTF-8, copying unchanged");
                fs::write(&out, raw.into_bytes())
                    .with_context(|| format!("writing {}", out.display()))?;
            }
        }
    }
    Ok(())
}

fn is_skiplisted(rel: &Path) -> bool {
    let rel_str = rel.to_string_lossy();
    let file_name = rel.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    SKIPLIST
        .iter()
        .any(|entry| rel_str == *entry || file_name == *entry)
}

fn redact_text(text: &str, deny: &DenyMatcher) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if deny.matches(line) {
            continue;
        }
        let mut redacted = line.to_string();
        for (rule, replacement) in SECRET_RULES.iter() {
            redacted = rule.replace_all(&redacted, *replacement).into_owned();
        }
        out.push_str(&redacted);
        out.push('\n');
    }
    out
}
