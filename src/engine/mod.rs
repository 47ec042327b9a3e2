//! Component registration and evaluation substrate.
//!
//! The engine is the run-independent side of the system: a table of
//! component descriptors: name, evaluation function, dependency edges,
//! and the metadata the registry resolver relies on (`multi_output`,
//! `hidden`, `superseded_by`). A [`Broker`] is the run-scoped side: the
//! key/value store of evaluated results, including recorded failures so a
//! component is evaluated at most once per run no matter how often it is
//! asked for.
//!
//! Scheduling is deliberately simple: [`Engine::evaluate`] resolves a
//! component's dependencies depth-first and then runs it; [`Engine::run_all`]
//! evaluates every non-hidden component in registration order. A parallel
//! scheduler can sit on top, since the only shared mutable state is the broker
//! it owns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::context::ExecutionContext;
use crate::core::{Result, SondeError, StructureError, Value};
use crate::filters::FilterRegistry;
use crate::policy::{AllowAll, CollectionPolicy};

/// Handle to one registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub usize);

/// Evaluation function of a component. Receives the engine (for dependency
/// and metadata lookups), the component's own id, and the current broker.
pub type EvalFn = Box<dyn Fn(&Engine, ComponentId, &Broker) -> Result<Value> + Send + Sync>;

struct Component {
    name: String,
    eval: Option<EvalFn>,
    deps: Vec<ComponentId>,
    multi_output: bool,
    hidden: bool,
    superseded_by: Option<ComponentId>,
    is_context: bool,
    fs_root: bool,
    metadata: Option<serde_json::Value>,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("multi_output", &self.multi_output)
            .field("hidden", &self.hidden)
            .field("superseded_by", &self.superseded_by)
            .field("is_context", &self.is_context)
            .finish()
    }
}

/// Registration table plus evaluation driver.
#[derive(Debug)]
pub struct Engine {
    components: Vec<Component>,
    filters: FilterRegistry,
    policy: Arc<dyn CollectionPolicy>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with the allow-everything policy.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            filters: FilterRegistry::new(),
            policy: Arc::new(AllowAll),
        }
    }

    /// Replace the allow-list policy consulted by provider construction.
    pub fn set_policy(&mut self, policy: Arc<dyn CollectionPolicy>) {
        self.policy = policy;
    }

    /// The active allow-list policy.
    pub fn policy(&self) -> &dyn CollectionPolicy {
        self.policy.as_ref()
    }

    /// Register a filter substring for `component`'s text loads.
    pub fn add_filter(&mut self, component: ComponentId, substring: impl Into<String>) {
        self.filters.add(component, substring);
    }

    /// Filter substrings registered for `component`; empty means
    /// unfiltered.
    pub fn filters_for(&self, component: ComponentId) -> std::collections::BTreeSet<String> {
        self.filters.filters_for(component)
    }

    /// Register an evaluable component.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        deps: Vec<ComponentId>,
        multi_output: bool,
        eval: EvalFn,
    ) -> ComponentId {
        self.push(Component {
            name: name.into(),
            eval: Some(eval),
            deps,
            multi_output,
            hidden: false,
            superseded_by: None,
            is_context: false,
            fs_root: false,
            metadata: None,
        })
    }

    /// Declare an execution-context component. Contexts have no evaluation
    /// function; a run seeds the broker with the contexts that apply
    /// ([`Broker::seed_context`]). `fs_root` marks contexts that expose a
    /// filesystem root and therefore participate in default context
    /// resolution, in declaration order.
    pub fn declare_context(&mut self, name: impl Into<String>, fs_root: bool) -> ComponentId {
        self.push(Component {
            name: name.into(),
            eval: None,
            deps: Vec::new(),
            multi_output: false,
            hidden: false,
            superseded_by: None,
            is_context: true,
            fs_root,
            metadata: None,
        })
    }

    fn push(&mut self, component: Component) -> ComponentId {
        let id = ComponentId(self.components.len());
        trace!(name = %component.name, ?id, "registered component");
        self.components.push(component);
        id
    }

    /// Append `dep` to `component`'s dependency list.
    pub fn add_dependency(&mut self, component: ComponentId, dep: ComponentId) {
        self.components[component.0].deps.push(dep);
    }

    /// Hide `component` from top-level discovery. Hidden components still
    /// evaluate when something depends on them.
    pub fn mark_hidden(&mut self, component: ComponentId) {
        self.components[component.0].hidden = true;
    }

    /// Permanently suppress `old` in favor of `new`. A superseded
    /// component is never evaluated again.
    pub fn supersede(&mut self, old: ComponentId, new: ComponentId) {
        debug!(
            old = %self.name(old),
            new = %self.name(new),
            "superseding component"
        );
        self.components[old.0].superseded_by = Some(new);
    }

    /// Attach registry-point metadata to a component.
    pub fn set_metadata(&mut self, component: ComponentId, metadata: serde_json::Value) {
        self.components[component.0].metadata = Some(metadata);
    }

    /// The component's registered name.
    pub fn name(&self, component: ComponentId) -> &str {
        &self.components[component.0].name
    }

    /// Current dependency list, in registration order.
    pub fn dependencies(&self, component: ComponentId) -> &[ComponentId] {
        &self.components[component.0].deps
    }

    /// Components that currently list `component` as a dependency.
    pub fn dependents(&self, component: ComponentId) -> Vec<ComponentId> {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.deps.contains(&component))
            .map(|(i, _)| ComponentId(i))
            .collect()
    }

    /// True if the component was marked hidden.
    pub fn is_hidden(&self, component: ComponentId) -> bool {
        self.components[component.0].hidden
    }

    /// True if the component yields a sequence of artifacts.
    pub fn is_multi_output(&self, component: ComponentId) -> bool {
        self.components[component.0].multi_output
    }

    /// True if the component is an execution context declaration.
    pub fn is_context(&self, component: ComponentId) -> bool {
        self.components[component.0].is_context
    }

    /// The component that superseded this one, if any.
    pub fn superseded_by(&self, component: ComponentId) -> Option<ComponentId> {
        self.components[component.0].superseded_by
    }

    /// Registry-point metadata attached to the component, if any.
    pub fn metadata(&self, component: ComponentId) -> Option<&serde_json::Value> {
        self.components[component.0].metadata.as_ref()
    }

    /// Declared filesystem-root contexts, in declaration order.
    pub fn fs_roots(&self) -> Vec<ComponentId> {
        self.components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.fs_root)
            .map(|(i, _)| ComponentId(i))
            .collect()
    }

    /// First broker-present value among `candidates`, in order.
    pub fn resolve_first(&self, candidates: &[ComponentId], broker: &Broker) -> Option<Value> {
        candidates.iter().find_map(|id| broker.get(*id).cloned())
    }

    /// Evaluate `component` into `broker`, resolving dependencies first.
    ///
    /// The result (value, skip, or content failure) is recorded in the
    /// broker, and a component already recorded is never evaluated again
    /// this run. Only a dependency cycle escapes as an error.
    pub fn evaluate(&self, component: ComponentId, broker: &mut Broker) -> Result<()> {
        if broker.is_recorded(component) {
            return Ok(());
        }
        if !broker.in_flight.insert(component) {
            return Err(StructureError::DependencyCycle {
                component: self.name(component).to_string(),
            }
            .into());
        }

        let deps = self.components[component.0].deps.clone();
        for dep in deps {
            self.evaluate(dep, broker)?;
        }

        let entry = &self.components[component.0];
        let outcome = if entry.superseded_by.is_some() {
            Err(SondeError::skipped(format!(
                "`{}` superseded by a later implementation",
                entry.name
            )))
        } else {
            match &entry.eval {
                Some(eval) => eval(self, component, broker),
                // Contexts are seeded, never computed.
                None => Err(SondeError::skipped(format!(
                    "context `{}` not seeded for this run",
                    entry.name
                ))),
            }
        };

        broker.in_flight.remove(&component);
        match outcome {
            Ok(value) => {
                trace!(name = %entry.name, "component evaluated");
                broker.values.insert(component, value);
            }
            Err(err) => {
                debug!(name = %entry.name, %err, "component unavailable");
                broker.failures.insert(component, err);
            }
        }
        Ok(())
    }

    /// Evaluate every non-hidden component in registration order.
    pub fn run_all(&self, broker: &mut Broker) -> Result<()> {
        for index in 0..self.components.len() {
            let id = ComponentId(index);
            if !self.is_hidden(id) {
                self.evaluate(id, broker)?;
            }
        }
        Ok(())
    }
}

/// Run-scoped store of evaluated component values and failures.
#[derive(Debug, Default)]
pub struct Broker {
    values: HashMap<ComponentId, Value>,
    failures: HashMap<ComponentId, SondeError>,
    in_flight: HashSet<ComponentId>,
}

impl Broker {
    /// Create an empty broker for a new run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an execution context into the run. Which contexts are seeded
    /// is what distinguishes a live-host run from an archive run.
    pub fn seed_context(&mut self, component: ComponentId, ctx: Arc<dyn ExecutionContext>) {
        self.values.insert(component, Value::Context(ctx));
    }

    /// True if the component has a value this run.
    pub fn contains(&self, component: ComponentId) -> bool {
        self.values.contains_key(&component)
    }

    /// The component's value, if present.
    pub fn get(&self, component: ComponentId) -> Option<&Value> {
        self.values.get(&component)
    }

    /// The recorded failure (or skip) for a component that evaluated but
    /// produced no value.
    pub fn failure(&self, component: ComponentId) -> Option<&SondeError> {
        self.failures.get(&component)
    }

    fn is_recorded(&self, component: ComponentId) -> bool {
        self.values.contains_key(&component) || self.failures.contains_key(&component)
    }
}
