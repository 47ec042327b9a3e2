//! Per-datasource line-filter registry.
//!
//! Parsers that only need a handful of lines from a large file register the
//! substrings they care about against the datasource component. Text file
//! providers apply the filter set at load time, keeping a line when it
//! contains any registered substring. An empty set means the file is
//! collected unfiltered.

use std::collections::{BTreeSet, HashMap};

use crate::engine::ComponentId;

/// Registry of filter substrings keyed by datasource component.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    filters: HashMap<ComponentId, BTreeSet<String>>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter substring for `component`.
    pub fn add(&mut self, component: ComponentId, substring: impl Into<String>) {
        self.filters.entry(component).or_default().insert(substring.into());
    }

    /// The filter set for `component`; empty means unfiltered.
    pub fn filters_for(&self, component: ComponentId) -> BTreeSet<String> {
        self.filters.get(&component).cloned().unwrap_or_default()
    }
}
