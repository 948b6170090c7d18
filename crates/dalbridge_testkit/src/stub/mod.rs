//! An in-process stand-in for `libopendal_c`.
//!
//! [`StubLibrary`] is a [`SymbolSource`] whose symbols point at Rust
//! functions with the C signatures of the real entry points. Building a
//! [`dalbridge_core::Registry`] from it exercises the whole binding path
//! (resolution, call descriptors, libffi calls, envelope decoding and
//! release) without a shared object on disk.

mod counters;
mod native;

use std::collections::BTreeMap;
use std::ffi::c_void;
use std::sync::Arc;

use dalbridge_core::{BindError, BindResult, Symbol, SymbolSource};
use parking_lot::Mutex;
use tracing::trace;

pub use counters::{invalid_calls, Counters, NativeKind};
pub use native::{default_capability, CAPABILITY_PREFIX, FAIL_MESSAGE, FAIL_PREFIX, SCHEME};

/// Makes `counters` the ones charged for operator options created on the
/// current thread.
pub fn activate(counters: &Arc<Counters>) {
    counters::activate(counters);
}

/// Names resolved through a [`StubLibrary`], in resolution order.
#[derive(Debug, Clone, Default)]
pub struct ResolutionLog(Arc<Mutex<Vec<String>>>);

impl ResolutionLog {
    /// Every name resolved so far, including ones that failed.
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn push(&self, name: &str) {
        self.0.lock().push(name.to_string());
    }
}

/// The stub library.
///
/// Creating one makes its counters the active ones on the current
/// thread; see [`StubLibrary::activate`].
#[derive(Debug)]
pub struct StubLibrary {
    symbols: BTreeMap<&'static str, usize>,
    counters: Arc<Counters>,
    log: ResolutionLog,
}

impl StubLibrary {
    /// Creates a stub exporting every operation.
    pub fn new() -> Self {
        let stub = Self {
            symbols: native::symbols().into_iter().collect(),
            counters: Counters::new(),
            log: ResolutionLog::default(),
        };
        stub.activate();
        stub
    }

    /// Removes `symbol` from the exports, as if the library were built
    /// without it.
    #[must_use]
    pub fn without(mut self, symbol: &str) -> Self {
        self.symbols.remove(symbol);
        self
    }

    /// Allocation counters for everything this stub hands out.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// The resolution log, shared with every clone.
    pub fn log(&self) -> ResolutionLog {
        self.log.clone()
    }

    /// Charges allocations with no parent handle made on the current
    /// thread (operator options) to this stub's counters.
    ///
    /// Everything else is charged to the counters of the handle it was
    /// obtained through, whichever thread makes the call.
    pub fn activate(&self) {
        activate(&self.counters);
    }
}

impl Default for StubLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolSource for StubLibrary {
    fn resolve(&self, name: &str) -> BindResult<Symbol> {
        self.log.push(name);
        trace!(symbol = name, "resolving stub symbol");
        match self.symbols.get(name) {
            Some(address) => Symbol::new(name, *address as *const c_void),
            None => Err(BindError::symbol(name, "undefined symbol in stub library")),
        }
    }

    fn origin(&self) -> String {
        String::from("stub")
    }
}
