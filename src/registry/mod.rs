//! Declaration sets and the registry-point override resolver.
//!
//! A base declaration set declares *registry points*: abstract, named data
//! points with no implementation of their own. Derived sets chain from
//! exactly one parent and register concrete implementations under an
//! inherited point's name, which:
//!
//! 1. adds the implementation to the point's try-order list,
//! 2. hides it from top-level discovery (it is reachable only through the
//!    point), and
//! 3. records it in the declaring set's context-handler table under each
//!    execution-context component it depends on, where a second
//!    implementation for the same (point, context) pair permanently
//!    supersedes the first.
//!
//! Evaluating a point walks its implementations most-recently-registered
//! first and yields the first value present in the broker; a point with no
//! satisfiable implementation is absent for the run, never a hard failure.
//!
//! Sets are plain records in an arena ([`SpecChain`]) behind an explicit
//! registration API, so the override history of every point stays linear
//! and auditable.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::{Result, SondeError, StructureError};
use crate::datasource::Datasource;
use crate::engine::{ComponentId, Engine};

/// Declaration of an abstract, overridable data point.
#[derive(Debug, Clone, Default)]
pub struct RegistryPoint {
    /// Free-form metadata carried on the point's component.
    pub metadata: Option<serde_json::Value>,
    /// Whether implementations yield a sequence of artifacts.
    pub multi_output: bool,
}

impl RegistryPoint {
    /// A point whose implementations each yield one artifact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the point multi-output.
    #[must_use]
    pub fn multi_output(mut self) -> Self {
        self.multi_output = true;
        self
    }

    /// Attach metadata to the point.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Handle to one declaration set in a [`SpecChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecSetId(usize);

#[derive(Debug)]
struct SpecSet {
    name: String,
    parent: Option<SpecSetId>,
    /// Points this set itself declares.
    registry: BTreeMap<String, ComponentId>,
    /// Implementations registered in this set, in declaration order.
    members: BTreeMap<String, Vec<ComponentId>>,
    /// point name -> context component -> implementations, kept on the
    /// declaring set so same-context collisions are visible across every
    /// derived set.
    context_handlers: BTreeMap<String, BTreeMap<ComponentId, Vec<ComponentId>>>,
}

/// Arena of declaration sets forming override chains.
#[derive(Debug, Default)]
pub struct SpecChain {
    sets: Vec<SpecSet>,
}

impl SpecChain {
    /// Create an empty chain store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root declaration set with no parent.
    pub fn create(&mut self, name: impl Into<String>) -> SpecSetId {
        self.push(name.into(), None)
    }

    /// Derive a declaration set from exactly one parent.
    ///
    /// # Errors
    ///
    /// [`StructureError::MultipleParents`] unless `parents` holds exactly
    /// one set: a modeling constraint that keeps every point's override
    /// history linear.
    pub fn derive(&mut self, name: impl Into<String>, parents: &[SpecSetId]) -> Result<SpecSetId> {
        let name = name.into();
        match parents {
            [parent] => Ok(self.push(name, Some(*parent))),
            _ => Err(StructureError::MultipleParents { set: name }.into()),
        }
    }

    fn push(&mut self, name: String, parent: Option<SpecSetId>) -> SpecSetId {
        let id = SpecSetId(self.sets.len());
        self.sets.push(SpecSet {
            name,
            parent,
            registry: BTreeMap::new(),
            members: BTreeMap::new(),
            context_handlers: BTreeMap::new(),
        });
        id
    }

    /// The set's name.
    pub fn name(&self, set: SpecSetId) -> &str {
        &self.sets[set.0].name
    }

    /// The set's parent, if it is not a root.
    pub fn parent(&self, set: SpecSetId) -> Option<SpecSetId> {
        self.sets[set.0].parent
    }

    /// Declare a registry point in `set`.
    ///
    /// The point becomes an abstract component: evaluating it walks its
    /// registered implementations most-recently-added first and returns
    /// the first value present in the broker, or reports itself absent.
    ///
    /// # Errors
    ///
    /// [`StructureError::DuplicatePoint`] when the name is already
    /// declared anywhere in this set's chain.
    pub fn declare(
        &mut self,
        engine: &mut Engine,
        set: SpecSetId,
        name: &str,
        point: RegistryPoint,
    ) -> Result<ComponentId> {
        if let Some(owner) = self.declaring_set(set, name) {
            return Err(StructureError::DuplicatePoint {
                set: self.sets[owner.0].name.clone(),
                name: name.to_string(),
            }
            .into());
        }

        let qualified = format!("{}.{name}", self.sets[set.0].name);
        let id = engine.register(
            qualified,
            Vec::new(),
            point.multi_output,
            Box::new(|engine, id, broker| {
                for dep in engine.dependencies(id).iter().rev() {
                    if let Some(value) = broker.get(*dep) {
                        return Ok(value.clone());
                    }
                }
                Err(SondeError::skipped("no implementation available"))
            }),
        );
        if let Some(metadata) = point.metadata {
            engine.set_metadata(id, metadata);
        }
        self.sets[set.0].registry.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register a concrete implementation in `set` under `name`.
    ///
    /// When an ancestor declares a point with that name, the
    /// implementation is hooked into the point's try-order, hidden from
    /// direct discovery, and recorded in the declaring set's
    /// context-handler table; an earlier implementation for the same
    /// (point, context) pair is permanently superseded. Without a matching
    /// point the component is just an ordinary member of the set.
    pub fn provide<D: Datasource>(
        &mut self,
        engine: &mut Engine,
        set: SpecSetId,
        name: &str,
        datasource: D,
    ) -> Result<ComponentId> {
        let qualified = format!("{}.{name}", self.sets[set.0].name);
        let id = datasource.register(engine, &qualified);
        self.sets[set.0]
            .members
            .entry(name.to_string())
            .or_default()
            .push(id);

        let Some(declaring) = self
            .sets[set.0]
            .parent
            .and_then(|parent| self.declaring_set(parent, name))
        else {
            return Ok(id);
        };
        let point = self.sets[declaring.0].registry[name];

        engine.add_dependency(point, id);
        engine.mark_hidden(id);
        debug!(
            point = %engine.name(point),
            implementation = %engine.name(id),
            "registered override"
        );

        let contexts: Vec<ComponentId> = engine
            .dependencies(id)
            .iter()
            .copied()
            .filter(|dep| engine.is_context(*dep))
            .collect();
        for ctx in contexts {
            let handlers = self.sets[declaring.0]
                .context_handlers
                .entry(name.to_string())
                .or_default()
                .entry(ctx)
                .or_default();
            for old in handlers.iter() {
                engine.supersede(*old, id);
            }
            handlers.push(id);
        }
        Ok(id)
    }

    /// The point component for `name`, looked up in `set` and its
    /// ancestors.
    pub fn point(&self, set: SpecSetId, name: &str) -> Option<ComponentId> {
        self.declaring_set(set, name)
            .map(|owner| self.sets[owner.0].registry[name])
    }

    /// Implementations registered for `name` directly in `set`.
    pub fn members(&self, set: SpecSetId, name: &str) -> &[ComponentId] {
        self.sets[set.0]
            .members
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Nearest set, starting at `set` and walking parents, whose own
    /// registry declares `name`.
    fn declaring_set(&self, set: SpecSetId, name: &str) -> Option<SpecSetId> {
        let mut cursor = Some(set);
        while let Some(current) = cursor {
            if self.sets[current.0].registry.contains_key(name) {
                return Some(current);
            }
            cursor = self.sets[current.0].parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RawValue, Value};
    use crate::engine::Broker;

    /// Test datasource yielding a fixed value, requiring `ctx` to be
    /// seeded when one is given.
    struct Fixed {
        value: &'static str,
        ctx: Option<ComponentId>,
        fail: bool,
    }

    fn fixed(value: &'static str) -> Fixed {
        Fixed {
            value,
            ctx: None,
            fail: false,
        }
    }

    fn fixed_in(value: &'static str, ctx: ComponentId) -> Fixed {
        Fixed {
            value,
            ctx: Some(ctx),
            fail: false,
        }
    }

    fn failing() -> Fixed {
        Fixed {
            value: "",
            ctx: None,
            fail: true,
        }
    }

    impl Datasource for Fixed {
        fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
            let deps = self.ctx.into_iter().collect();
            engine.register(
                name,
                deps,
                false,
                Box::new(move |_, _, broker| {
                    if self.fail {
                        return Err(SondeError::skipped("configured to fail"));
                    }
                    if let Some(ctx) = self.ctx {
                        if !broker.contains(ctx) {
                            return Err(SondeError::skipped("context absent"));
                        }
                    }
                    Ok(Value::Raw(RawValue::Text(self.value.to_string())))
                }),
            )
        }
    }

    fn text_of(value: &Value) -> &str {
        match value {
            Value::Raw(RawValue::Text(text)) => text,
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_multi_parent_chain_rejected() {
        let mut chain = SpecChain::new();
        let a = chain.create("a");
        let b = chain.create("b");
        let err = chain.derive("c", &[a, b]).unwrap_err();
        assert!(matches!(
            err,
            SondeError::Structure(StructureError::MultipleParents { .. })
        ));
        assert!(chain.derive("d", &[]).is_err());
        assert!(chain.derive("e", &[a]).is_ok());
    }

    #[test]
    fn test_duplicate_point_rejected_across_chain() {
        let mut engine = Engine::new();
        let mut chain = SpecChain::new();
        let base = chain.create("base");
        let derived = chain.derive("derived", &[base]).unwrap();
        chain
            .declare(&mut engine, base, "hostname", RegistryPoint::new())
            .unwrap();

        let same_set = chain
            .declare(&mut engine, base, "hostname", RegistryPoint::new())
            .unwrap_err();
        assert!(matches!(
            same_set,
            SondeError::Structure(StructureError::DuplicatePoint { .. })
        ));
        let in_child = chain
            .declare(&mut engine, derived, "hostname", RegistryPoint::new())
            .unwrap_err();
        assert!(matches!(
            in_child,
            SondeError::Structure(StructureError::DuplicatePoint { .. })
        ));
    }

    #[test]
    fn test_point_with_no_implementation_is_absent() {
        let mut engine = Engine::new();
        let mut chain = SpecChain::new();
        let base = chain.create("base");
        let point = chain
            .declare(&mut engine, base, "lonely", RegistryPoint::new())
            .unwrap();

        let mut broker = Broker::new();
        engine.run_all(&mut broker).unwrap();
        assert!(!broker.contains(point));
        assert!(broker.failure(point).unwrap().is_skip());
    }

    #[test]
    fn test_derived_implementation_wins_over_earlier() {
        let mut engine = Engine::new();
        let mut chain = SpecChain::new();
        let base = chain.create("base");
        let defaults = chain.derive("defaults", &[base]).unwrap();
        let derived = chain.derive("derived", &[defaults]).unwrap();

        let point = chain
            .declare(&mut engine, base, "release", RegistryPoint::new())
            .unwrap();
        chain
            .provide(&mut engine, defaults, "release", fixed("default"))
            .unwrap();
        let override_id = chain
            .provide(&mut engine, derived, "release", fixed("override"))
            .unwrap();
        assert!(engine.is_hidden(override_id));

        let mut broker = Broker::new();
        engine.run_all(&mut broker).unwrap();
        assert_eq!(text_of(broker.get(point).unwrap()), "override");
    }

    #[test]
    fn test_point_falls_back_when_override_fails() {
        let mut engine = Engine::new();
        let mut chain = SpecChain::new();
        let base = chain.create("base");
        let defaults = chain.derive("defaults", &[base]).unwrap();
        let derived = chain.derive("derived", &[defaults]).unwrap();

        let point = chain
            .declare(&mut engine, base, "release", RegistryPoint::new())
            .unwrap();
        chain
            .provide(&mut engine, defaults, "release", fixed("default"))
            .unwrap();
        chain
            .provide(&mut engine, derived, "release", failing())
            .unwrap();

        let mut broker = Broker::new();
        engine.run_all(&mut broker).unwrap();
        assert_eq!(text_of(broker.get(point).unwrap()), "default");
    }

    #[test]
    fn test_same_context_conflict_suppresses_earlier() {
        let mut engine = Engine::new();
        let host = engine.declare_context("host", true);
        let mut chain = SpecChain::new();
        let base = chain.create("base");
        let first_set = chain.derive("first", &[base]).unwrap();
        let second_set = chain.derive("second", &[first_set]).unwrap();

        let point = chain
            .declare(&mut engine, base, "uptime", RegistryPoint::new())
            .unwrap();
        let earlier = chain
            .provide(&mut engine, first_set, "uptime", fixed_in("earlier", host))
            .unwrap();
        let later = chain
            .provide(&mut engine, second_set, "uptime", fixed_in("later", host))
            .unwrap();

        assert_eq!(engine.superseded_by(earlier), Some(later));

        let mut broker = Broker::new();
        broker.seed_context(host, std::sync::Arc::new(
            crate::context::HostContext::new().unwrap(),
        ));
        engine.run_all(&mut broker).unwrap();
        // The earlier implementation never ran; the point resolves to the
        // later one.
        assert!(!broker.contains(earlier));
        assert_eq!(text_of(broker.get(point).unwrap()), "later");
    }

    #[test]
    fn test_different_contexts_coexist() {
        let mut engine = Engine::new();
        let host = engine.declare_context("host", true);
        let archive = engine.declare_context("archive", true);
        let mut chain = SpecChain::new();
        let base = chain.create("base");
        let derived = chain.derive("derived", &[base]).unwrap();

        let point = chain
            .declare(&mut engine, base, "osinfo", RegistryPoint::new())
            .unwrap();
        let host_impl = chain
            .provide(&mut engine, derived, "osinfo", fixed_in("from-host", host))
            .unwrap();
        let archive_impl = chain
            .provide(&mut engine, derived, "osinfo", fixed_in("from-archive", archive))
            .unwrap();
        assert!(engine.superseded_by(host_impl).is_none());
        assert!(engine.superseded_by(archive_impl).is_none());

        // Archive-only run resolves through the archive implementation.
        let mut broker = Broker::new();
        broker.seed_context(
            archive,
            std::sync::Arc::new(crate::context::ArchiveContext::new("/tmp")),
        );
        engine.run_all(&mut broker).unwrap();
        assert_eq!(text_of(broker.get(point).unwrap()), "from-archive");
    }

    #[test]
    fn test_member_without_point_is_plain_component() {
        let mut engine = Engine::new();
        let mut chain = SpecChain::new();
        let base = chain.create("base");
        let derived = chain.derive("derived", &[base]).unwrap();
        let id = chain
            .provide(&mut engine, derived, "extra", fixed("standalone"))
            .unwrap();

        assert!(!engine.is_hidden(id));
        assert!(chain.point(derived, "extra").is_none());
        assert_eq!(chain.members(derived, "extra"), &[id]);
    }
}
