//! Datasource combinators: factories for standard collection patterns.
//!
//! Each factory returns a builder that, on [`Datasource::register`],
//! becomes a graph component producing one or more content providers. The
//! combinators implement the collection patterns a declaration set needs:
//!
//! - [`simple_file`]: one file, one provider.
//! - [`glob_file`]: every file matching one or more patterns.
//! - [`first_file`]: the first of an ordered candidate list that builds.
//! - [`listdir`]: the entries of a directory (or glob basenames).
//! - [`simple_command`]: one command, executed through the resolved
//!   context.
//! - [`foreach_execute`]: a command template fanned out over an upstream
//!   value's elements.
//! - [`foreach_collect`]: a path template fanned out the same way and
//!   glob-expanded instead of executed.
//! - [`first_of`]: the first of several datasources present in the
//!   broker.
//!
//! Single-result combinators propagate a provider's skip or content error
//! unmodified. Multi-result combinators isolate per-element failures,
//! logging and recording them, and fail only when the aggregate result is
//! empty.

mod commands;
mod files;

pub use commands::{ForeachCollect, ForeachExecute, SimpleCommand, foreach_collect, foreach_execute, simple_command};
pub use files::{FirstFile, GlobFile, ListDir, SimpleFile, first_file, glob_file, listdir, simple_file};

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::core::{Result, SondeError, Value};
use crate::engine::{Broker, ComponentId, Engine};

/// Anything that can be registered into the engine as a named datasource
/// component.
pub trait Datasource {
    /// Register with the engine under `name`, returning the component id.
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId;
}

/// Which execution context a datasource evaluates against.
#[derive(Debug, Clone, Default)]
pub enum ContextSpec {
    /// First-present of the engine's filesystem-root contexts, in
    /// declaration order.
    #[default]
    Default,
    /// Exactly this context.
    One(ComponentId),
    /// First-present of this explicit ordered list.
    FirstOf(Vec<ComponentId>),
}

impl ContextSpec {
    /// The candidate context components this spec can resolve to, used
    /// both as the datasource's dependency list and as the lookup order.
    pub(crate) fn candidates(&self, engine: &Engine) -> Vec<ComponentId> {
        match self {
            ContextSpec::Default => engine.fs_roots(),
            ContextSpec::One(id) => vec![*id],
            ContextSpec::FirstOf(ids) => ids.clone(),
        }
    }

    /// Resolve the first seeded context this run, or a skip when none of
    /// the candidates is present.
    pub(crate) fn resolve(
        &self,
        engine: &Engine,
        broker: &Broker,
    ) -> Result<Arc<dyn ExecutionContext>> {
        self.candidates(engine)
            .into_iter()
            .find_map(|id| broker.get(id).and_then(Value::as_context))
            .ok_or_else(|| SondeError::skipped("no execution context seeded for this run"))
    }
}

/// Substitute a fan-out element into a command or path template.
///
/// Templates use a single `%s` placeholder; a template without one is
/// returned unchanged.
pub(crate) fn substitute(template: &str, element: &str) -> String {
    template.replacen("%s", element, 1)
}

/// The first of `candidates` present in the broker at lookup time.
///
/// The candidates are hidden from top-level discovery at registration;
/// they remain reachable through this component. When none is present the
/// component is absent for the run, which is not a failure.
pub fn first_of(candidates: Vec<ComponentId>) -> FirstOf {
    FirstOf { candidates }
}

/// Builder for [`first_of`].
#[derive(Debug)]
pub struct FirstOf {
    candidates: Vec<ComponentId>,
}

impl Datasource for FirstOf {
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
        for candidate in &self.candidates {
            engine.mark_hidden(*candidate);
        }
        let candidates = self.candidates.clone();
        engine.register(
            name,
            self.candidates,
            false,
            Box::new(move |engine, _, broker| {
                engine
                    .resolve_first(&candidates, broker)
                    .ok_or_else(|| SondeError::skipped("no candidate present"))
            }),
        )
    }
}
