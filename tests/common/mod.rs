//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sonde::context::HostContext;
use sonde::engine::{Broker, ComponentId, Engine};
use tempfile::TempDir;

/// Route engine logs through `RUST_LOG` for debugging a failing test.
/// Safe to call from every test; only the first call installs.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A staged filesystem root a context can collect from.
pub struct TestRoot {
    dir: TempDir,
}

impl TestRoot {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp root"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Stage a file under the root, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().expect("staged path has a parent"))
            .expect("create staged directories");
        fs::write(&path, contents).expect("write staged file");
        path
    }

    /// An engine with one host context declared, and a broker already
    /// seeded with a host context rooted here.
    pub fn host_engine(&self) -> (Engine, Broker, ComponentId) {
        let mut engine = Engine::new();
        let host = engine.declare_context("host", true);
        let mut broker = Broker::new();
        broker.seed_context(
            host,
            Arc::new(HostContext::with_root(self.path()).expect("build host context")),
        );
        (engine, broker, host)
    }
}
