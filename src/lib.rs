//! Sonde - declarative diagnostic-data collection
//!
//! A datasource evaluation engine for collecting diagnostic data from a
//! live host or a previously collected archive. Collection targets are
//! declared once, as named registry points grouped into declaration sets,
//! and evaluated lazily against whichever execution context is present at
//! run time.
//!
//! # Architecture Overview
//!
//! Sonde follows a declare/evaluate model where:
//! - Registry points name *what* to collect (`sos.uptime`, `sos.messages`)
//! - Datasource combinators describe *how* (`simple_file`, `simple_command`,
//!   glob and fan-out variants)
//! - An execution context supplies *where*: the live host or an extracted
//!   archive replaying earlier command output
//! - A broker memoizes each component's value, or its failure, so every
//!   component evaluates at most once per run
//!
//! ## Key Features
//!
//! - **Lazy**: nothing touches the filesystem or runs a command until a
//!   value is asked for; results and failures are both cached
//! - **Context-portable**: the same declarations evaluate on a host or
//!   against an archive without change
//! - **Overridable**: a derived declaration set replaces a point's
//!   implementation without touching the base set
//! - **Guarded**: a collection policy can deny files and commands, and a
//!   redaction pass scrubs collected content before it leaves the machine
//!
//! # Core Modules
//!
//! ## Evaluation
//! - [`engine`] - Component graph, broker, and memoized evaluation
//! - [`registry`] - Declaration sets, registry points, and overrides
//! - [`datasource`] - Combinator factories for files, commands, and fan-out
//! - [`context`] - Host and archive execution contexts
//!
//! ## Content
//! - [`provider`] - Lazy content providers and their serialized records
//! - [`core`] - Value model and error types
//!
//! ## Collection Control
//! - [`policy`] - Allow/deny policy for files and commands
//! - [`filters`] - Per-component line filters
//! - [`mangle`] - Command-to-filename mangling for archive layout
//! - [`redaction`] - Redacted directory copies of collected output
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sonde::context::HostContext;
//! use sonde::datasource::{Datasource, simple_file};
//! use sonde::engine::{Broker, Engine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut engine = Engine::new();
//! let host = engine.declare_context("host", true);
//! let release = simple_file("/etc/os-release").register(&mut engine, "os_release");
//!
//! let mut broker = Broker::new();
//! broker.seed_context(host, Arc::new(HostContext::new()?));
//! engine.run_all(&mut broker)?;
//!
//! if let Some(value) = broker.get(release) {
//!     println!("{value:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod core;
pub mod datasource;
pub mod engine;
pub mod filters;
pub mod mangle;
pub mod policy;
pub mod provider;
pub mod redaction;
pub mod registry;

pub use crate::core::{ContentError, RawValue, Result, SondeError, StructureError, Value};
pub use crate::engine::{Broker, ComponentId, Engine};
pub use crate::provider::{Content, ContentProvider};
pub use crate::registry::{RegistryPoint, SpecChain, SpecSetId};
