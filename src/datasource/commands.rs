//! Command-execution combinators.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, trace, warn};

use crate::context::RunOptions;
use crate::core::{ContentError, SondeError, Value};
use crate::datasource::{ContextSpec, Datasource, substitute};
use crate::engine::{ComponentId, Engine};
use crate::provider::{CommandOutputProvider, ContentProvider, FileKind, FileProvider};

/// Run one command through the resolved context and collect its output.
///
/// The command executes at evaluation time; an execution failure or
/// timeout propagates unmodified as the combinator's failure.
pub fn simple_command(cmd: impl Into<String>) -> SimpleCommand {
    SimpleCommand {
        cmd: cmd.into(),
        opts: RunOptions::default(),
        context: ContextSpec::Default,
    }
}

/// Builder for [`simple_command`].
#[derive(Debug)]
pub struct SimpleCommand {
    cmd: String,
    opts: RunOptions,
    context: ContextSpec,
}

impl SimpleCommand {
    /// Keep output as one text blob instead of splitting into lines.
    #[must_use]
    pub fn unsplit(mut self) -> Self {
        self.opts.split = false;
        self
    }

    /// Capture the exit code instead of failing on non-zero exit.
    #[must_use]
    pub fn keep_rc(mut self) -> Self {
        self.opts.keep_rc = true;
        self
    }

    /// Give up after this long; expiry is a content failure.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = Some(timeout);
        self
    }

    /// Evaluate against exactly this context.
    #[must_use]
    pub fn context(mut self, context: ComponentId) -> Self {
        self.context = ContextSpec::One(context);
        self
    }
}

impl Datasource for SimpleCommand {
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
        let deps = self.context.candidates(engine);
        let Self { cmd, opts, context } = self;
        engine.register(
            name,
            deps,
            false,
            Box::new(move |engine, _, broker| {
                let ctx = context.resolve(engine, broker)?;
                let provider =
                    CommandOutputProvider::new(cmd.clone(), ctx, opts.clone(), engine.policy())?;
                // Execute now so a failure belongs to this evaluation.
                provider.content()?;
                Ok(Value::Single(Arc::new(provider)))
            }),
        )
    }
}

/// Fan a command template out over the elements of an upstream value.
///
/// The upstream value is coerced to a sequence (a single artifact
/// contributes its lines, a plain value becomes a one-element sequence);
/// each element is substituted into the template and executed once.
/// Per-element failures are logged and skipped; the combinator fails only
/// when no element produced output.
pub fn foreach_execute(source: ComponentId, template: impl Into<String>) -> ForeachExecute {
    ForeachExecute {
        source,
        template: template.into(),
        opts: RunOptions::default(),
        context: ContextSpec::Default,
    }
}

/// Builder for [`foreach_execute`].
#[derive(Debug)]
pub struct ForeachExecute {
    source: ComponentId,
    template: String,
    opts: RunOptions,
    context: ContextSpec,
}

impl ForeachExecute {
    /// Keep output as one text blob instead of splitting into lines.
    #[must_use]
    pub fn unsplit(mut self) -> Self {
        self.opts.split = false;
        self
    }

    /// Capture each command's exit code instead of failing on non-zero
    /// exit.
    #[must_use]
    pub fn keep_rc(mut self) -> Self {
        self.opts.keep_rc = true;
        self
    }

    /// Per-command timeout; expiry fails that element only.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = Some(timeout);
        self
    }

    /// Evaluate against exactly this context.
    #[must_use]
    pub fn context(mut self, context: ComponentId) -> Self {
        self.context = ContextSpec::One(context);
        self
    }
}

impl Datasource for ForeachExecute {
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
        let mut deps = vec![self.source];
        deps.extend(self.context.candidates(engine));
        let Self { source, template, opts, context } = self;
        engine.register(
            name,
            deps,
            true,
            Box::new(move |engine, _, broker| {
                let upstream = broker
                    .get(source)
                    .ok_or_else(|| SondeError::skipped("fan-out source absent"))?;
                let elements = upstream.elements()?;
                let ctx = context.resolve(engine, broker)?;

                let mut results: Vec<Arc<dyn ContentProvider>> = Vec::new();
                let mut failures: Vec<String> = Vec::new();
                for element in &elements {
                    let cmd = substitute(&template, element);
                    let built = CommandOutputProvider::new(
                        cmd.clone(),
                        Arc::clone(&ctx),
                        opts.clone(),
                        engine.policy(),
                    )
                    .map(|provider| provider.with_args(element.clone()));
                    match built {
                        Ok(provider) => match provider.content() {
                            Ok(_) => results.push(Arc::new(provider)),
                            Err(err) => {
                                debug!(%cmd, %err, "fan-out element failed");
                                failures.push(format!("{element}: {err}"));
                            }
                        },
                        Err(err) => {
                            debug!(%cmd, %err, "fan-out element rejected");
                            failures.push(format!("{element}: {err}"));
                        }
                    }
                }

                if results.is_empty() {
                    return Err(ContentError::EmptyFanOut {
                        template: template.clone(),
                        reasons: if failures.is_empty() {
                            "no elements".to_string()
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

/// Fan a path template out over the elements of an upstream value and
/// glob-expand each substitution instead of executing it.
///
/// Failure isolation matches [`foreach_execute`]: per-element and
/// per-match failures are logged and skipped, and only an empty aggregate
/// fails the combinator.
pub fn foreach_collect(source: ComponentId, template: impl Into<String>) -> ForeachCollect {
    ForeachCollect {
        source,
        template: template.into(),
        ignore: None,
        kind: FileKind::Text,
        context: ContextSpec::Default,
    }
}

/// Builder for [`foreach_collect`].
#[derive(Debug)]
pub struct ForeachCollect {
    source: ComponentId,
    template: String,
    ignore: Option<Regex>,
    kind: FileKind,
    context: ContextSpec,
}

impl ForeachCollect {
    /// Skip expanded matches whose path matches this regular expression.
    /// An invalid expression is dropped with a warning rather than failing
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

impl Datasource for ForeachCollect {
    fn register(self, engine: &mut Engine, name: &str) -> ComponentId {
        let mut deps = vec![self.source];
        deps.extend(self.context.candidates(engine));
        let Self { source, template, ignore, kind, context } = self;
        engine.register(
            name,
            deps,
            true,
            Box::new(move |engine, id, broker| {
                let upstream = broker
                    .get(source)
                    .ok_or_else(|| SondeError::skipped("fan-out source absent"))?;
                let elements = upstream.elements()?;
                let ctx = context.resolve(engine, broker)?;
                let root = ctx.root();
                let filters = engine.filters_for(id);

                let mut results: Vec<Arc<dyn ContentProvider>> = Vec::new();
                let mut failures: Vec<String> = Vec::new();
                for element in &elements {
                    let located = ctx.locate_path(&substitute(&template, element));
                    let full = root.join(located.trim_start_matches('/'));
                    let entries = match glob::glob(&full.to_string_lossy()) {
                        Ok(entries) => entries,
                        Err(err) => {
                            debug!(%element, %err, "bad expanded pattern");
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
                        let rel = entry.strip_prefix(root).unwrap_or(&entry);
                        let Some(rel) = rel.to_str() else { continue };
                        match FileProvider::new(rel, root, kind, filters.clone(), engine.policy())
                        {
                            Ok(provider) => results.push(Arc::new(provider)),
                            Err(err) => {
                                debug!(path = %entry.display(), %err, "skipping fan-out match");
                                failures.push(format!("{}: {err}", entry.display()));
                            }
                        }
                    }
                }

                if results.is_empty() {
                    return Err(ContentError::EmptyFanOut {
                        template: template.clone(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HostContext;
    use crate::core::RawValue;
    use crate::engine::Broker;
    use tempfile::TempDir;

    fn engine_with_host(dir: &TempDir) -> (Engine, Broker) {
        let mut engine = Engine::new();
        let host = engine.declare_context("host", true);
        let mut broker = Broker::new();
        broker.seed_context(host, Arc::new(HostContext::with_root(dir.path()).unwrap()));
        (engine, broker)
    }

    fn raw_entries(entries: &[&str]) -> Value {
        Value::Raw(RawValue::Entries(entries.iter().map(|s| s.to_string()).collect()))
    }

    #[test]
    fn test_simple_command_collects_output() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let id = simple_command("echo collected").register(&mut engine, "echo");

        engine.evaluate(id, &mut broker).unwrap();
        let provider = broker.get(id).unwrap().as_single().unwrap();
        assert_eq!(provider.content().unwrap().lines().unwrap(), ["collected"]);
        assert_eq!(provider.cmd(), Some("echo collected"));
    }

    #[test]
    fn test_simple_command_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let id = simple_command("exit 2").register(&mut engine, "bad");

        engine.evaluate(id, &mut broker).unwrap();
        assert!(matches!(
            broker.failure(id).unwrap(),
            SondeError::Content(ContentError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_simple_command_keep_rc() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let id = simple_command("exit 2").keep_rc().register(&mut engine, "rc");

        engine.evaluate(id, &mut broker).unwrap();
        let provider = broker.get(id).unwrap().as_single().unwrap();
        assert_eq!(provider.rc(), Some(2));
    }

    #[test]
    fn test_simple_command_timeout_is_content_error() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let id = simple_command("sleep 5")
            .timeout(Duration::from_millis(50))
            .register(&mut engine, "slow");

        engine.evaluate(id, &mut broker).unwrap();
        assert!(matches!(
            broker.failure(id).unwrap(),
            SondeError::Content(ContentError::CommandTimeout { .. })
        ));
    }

    #[test]
    fn test_foreach_execute_one_result_per_element() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let source = engine.register(
            "units",
            vec![],
            false,
            Box::new(|_, _, _| Ok(raw_entries(&["alpha", "beta"]))),
        );
        let id = foreach_execute(source, "echo unit %s").register(&mut engine, "unit_status");

        engine.evaluate(id, &mut broker).unwrap();
        let providers = broker.get(id).unwrap().providers();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].args(), Some("alpha"));
        assert_eq!(
            providers[1].content().unwrap().lines().unwrap(),
            ["unit beta"]
        );
    }

    #[test]
    fn test_foreach_execute_isolates_element_failures() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let source = engine.register(
            "elems",
            vec![],
            false,
            Box::new(|_, _, _| Ok(raw_entries(&["zero", "one"]))),
        );
        // Only the `zero` element exits successfully.
        let id = foreach_execute(source, "test %s = zero && echo ok")
            .register(&mut engine, "mixed");

        engine.evaluate(id, &mut broker).unwrap();
        let providers = broker.get(id).unwrap().providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].args(), Some("zero"));
    }

    #[test]
    fn test_foreach_execute_all_fail_is_content_error() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let source = engine.register(
            "elems",
            vec![],
            false,
            Box::new(|_, _, _| Ok(raw_entries(&["a", "b"]))),
        );
        let id = foreach_execute(source, "exit 1 # %s").register(&mut engine, "allfail");

        engine.evaluate(id, &mut broker).unwrap();
        let err = broker.failure(id).unwrap();
        assert!(matches!(
            err,
            SondeError::Content(ContentError::EmptyFanOut { .. })
        ));
        // The aggregate failure retains why each element failed.
        let rendered = err.to_string();
        assert!(rendered.contains("a:"));
        assert!(rendered.contains("b:"));
    }

    #[test]
    fn test_foreach_execute_coerces_single_text_to_one_element() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let source = engine.register(
            "one",
            vec![],
            false,
            Box::new(|_, _, _| Ok(Value::Raw(RawValue::Text("solo".into())))),
        );
        let id = foreach_execute(source, "echo %s").register(&mut engine, "solo_echo");

        engine.evaluate(id, &mut broker).unwrap();
        assert_eq!(broker.get(id).unwrap().providers().len(), 1);
    }

    #[test]
    fn test_foreach_collect_expands_per_element() {
        let dir = TempDir::new().unwrap();
        for unit in ["web", "db"] {
            let path = dir.path().join(format!("etc/app/{unit}/app.conf"));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, format!("name={unit}\n")).unwrap();
        }
        let (mut engine, mut broker) = engine_with_host(&dir);
        let source = engine.register(
            "units",
            vec![],
            false,
            Box::new(|_, _, _| Ok(raw_entries(&["web", "db", "cache"]))),
        );
        let id = foreach_collect(source, "/etc/app/%s/*.conf").register(&mut engine, "app_confs");

        engine.evaluate(id, &mut broker).unwrap();
        // `cache` has no files; the other two each match one.
        assert_eq!(broker.get(id).unwrap().providers().len(), 2);
    }

    #[test]
    fn test_foreach_collect_ignore_pattern() {
        let dir = TempDir::new().unwrap();
        for name in ["app.conf", "app.conf.bak"] {
            let path = dir.path().join(format!("etc/app/web/{name}"));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "x\n").unwrap();
        }
        let (mut engine, mut broker) = engine_with_host(&dir);
        let source = engine.register(
            "units",
            vec![],
            false,
            Box::new(|_, _, _| Ok(raw_entries(&["web"]))),
        );
        let id = foreach_collect(source, "/etc/app/%s/*")
            .ignore(r"\.bak$")
            .register(&mut engine, "app_confs");

        engine.evaluate(id, &mut broker).unwrap();
        let providers = broker.get(id).unwrap().providers();
        assert_eq!(providers.len(), 1);
        assert!(providers[0].path().ends_with("app.conf"));
    }

    #[test]
    fn test_foreach_collect_empty_is_content_error() {
        let dir = TempDir::new().unwrap();
        let (mut engine, mut broker) = engine_with_host(&dir);
        let source = engine.register(
            "units",
            vec![],
            false,
            Box::new(|_, _, _| Ok(raw_entries(&["nope"]))),
        );
        let id = foreach_collect(source, "/etc/app/%s/*.conf").register(&mut engine, "app_confs");

        engine.evaluate(id, &mut broker).unwrap();
        assert!(matches!(
            broker.failure(id).unwrap(),
            SondeError::Content(ContentError::EmptyFanOut { .. })
        ));
    }
}
