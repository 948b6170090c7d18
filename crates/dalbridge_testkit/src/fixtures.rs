//! Test fixtures.
//!
//! Provides a registry bound to the stub library, operator helpers and
//! logging setup for tests.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use dalbridge_core::{default_file_name, Operator, OperatorOptions, Registry};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::stub::{self, Counters, ResolutionLog, StubLibrary, SCHEME};

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG`, defaulting to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A registry bound to a fresh [`StubLibrary`].
pub struct StubFixture {
    /// The registry.
    pub registry: Registry,
    counters: Arc<Counters>,
    log: ResolutionLog,
}

impl StubFixture {
    /// Binds a registry to a stub exporting every operation.
    pub fn new() -> Self {
        Self::from_stub(StubLibrary::new())
    }

    /// Binds a registry to `stub`.
    pub fn from_stub(stub: StubLibrary) -> Self {
        init_tracing();
        let counters = stub.counters();
        let log = stub.log();
        let registry = Registry::build(stub).expect("Failed to bind stub library");
        Self {
            registry,
            counters,
            log,
        }
    }

    /// Opens a `memory` operator with default options.
    pub fn operator(&self) -> Operator {
        self.operator_with(&OperatorOptions::new())
    }

    /// Opens a `memory` operator with `options`.
    pub fn operator_with(&self, options: &OperatorOptions) -> Operator {
        self.activate();
        Operator::new(&self.registry, SCHEME, options).expect("Failed to open stub operator")
    }

    /// Charges option allocations made on the current thread to this
    /// fixture.
    pub fn activate(&self) {
        stub::activate(&self.counters);
    }

    /// The stub's allocation counters.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// The stub's resolution log.
    pub fn log(&self) -> &ResolutionLog {
        &self.log
    }

    /// Panics unless every allocation the stub handed out came back.
    pub fn assert_all_released(&self) {
        assert_eq!(
            self.counters.total_live(),
            0,
            "Native allocations still live: {:?}",
            self.counters
        );
    }
}

impl Default for StubFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs `f` against a fresh stub operator, then closes it and checks that
/// nothing leaked.
///
/// # Example
///
/// ```rust,ignore
/// use dalbridge_testkit::with_operator;
///
/// #[test]
/// fn my_test() {
///     with_operator(|op, _| {
///         op.write("a.txt", b"hello").unwrap();
///     });
/// }
/// ```
pub fn with_operator<F>(f: F)
where
    F: FnOnce(&Operator, &Counters),
{
    let fixture = StubFixture::new();
    let op = fixture.operator();
    f(&op, fixture.counters());
    op.close();
    fixture.assert_all_released();
}

/// Writes a file that has the library's platform file name but is not a
/// loadable shared object.
///
/// Returns the directory (kept alive to prevent cleanup) and the file
/// path.
pub fn garbage_library() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join(default_file_name());
    fs::write(&path, b"\x7fNOT A SHARED OBJECT").expect("Failed to write garbage library");
    (dir, path)
}
