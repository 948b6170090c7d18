//! Allocation accounting for the stub library.
//!
//! Every handle, buffer and error envelope the stub hands out is counted
//! when it is allocated and when it comes back through its release
//! operation. A test asserts on the counters of its own stub; the global
//! live table catches pointers the stub never handed out or already took
//! back.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// The kinds of native allocation the stub tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NativeKind {
    /// `opendal_bytes`, released by `opendal_bytes_free`.
    Bytes,
    /// `opendal_error`, released by `opendal_error_free`.
    Error,
    /// Operator options.
    Options,
    /// Operator.
    Operator,
    /// Operator info.
    Info,
    /// Metadata.
    Metadata,
    /// Lister.
    Lister,
    /// Directory entry.
    Entry,
    /// Stream reader.
    Reader,
}

impl NativeKind {
    /// Every kind, in declaration order.
    pub const ALL: [NativeKind; 9] = [
        NativeKind::Bytes,
        NativeKind::Error,
        NativeKind::Options,
        NativeKind::Operator,
        NativeKind::Info,
        NativeKind::Metadata,
        NativeKind::Lister,
        NativeKind::Entry,
        NativeKind::Reader,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Allocation and release counts per [`NativeKind`].
#[derive(Default)]
pub struct Counters {
    allocated: [AtomicUsize; 9],
    released: [AtomicUsize; 9],
}

impl Counters {
    /// Creates zeroed counters.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// How many `kind` allocations were handed out.
    pub fn allocated(&self, kind: NativeKind) -> usize {
        self.allocated[kind.index()].load(Ordering::SeqCst)
    }

    /// How many `kind` allocations came back.
    pub fn released(&self, kind: NativeKind) -> usize {
        self.released[kind.index()].load(Ordering::SeqCst)
    }

    /// Allocations of `kind` not released yet.
    pub fn live(&self, kind: NativeKind) -> usize {
        self.allocated(kind).saturating_sub(self.released(kind))
    }

    /// Allocations of any kind not released yet.
    pub fn total_live(&self) -> usize {
        NativeKind::ALL.iter().map(|kind| self.live(*kind)).sum()
    }

    pub(crate) fn record_alloc(&self, kind: NativeKind) {
        self.allocated[kind.index()].fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_release(&self, kind: NativeKind) {
        self.released[kind.index()].fetch_add(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in NativeKind::ALL {
            map.entry(&kind, &(self.allocated(kind), self.released(kind)));
        }
        map.finish()
    }
}

thread_local! {
    static ACTIVE: RefCell<Option<Arc<Counters>>> = const { RefCell::new(None) };
}

/// Makes `counters` the ones charged for allocations that have no parent
/// handle on this thread (operator options).
pub(crate) fn activate(counters: &Arc<Counters>) {
    ACTIVE.with(|active| *active.borrow_mut() = Some(Arc::clone(counters)));
}

/// The counters active on this thread, or fresh ones nobody observes.
pub(crate) fn active() -> Arc<Counters> {
    ACTIVE.with(|active| active.borrow().clone()).unwrap_or_default()
}

static LIVE: Mutex<BTreeMap<usize, NativeKind>> = parking_lot::const_mutex(BTreeMap::new());
static INVALID_CALLS: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn track(address: usize, kind: NativeKind) {
    LIVE.lock().insert(address, kind);
}

/// Removes `address` from the live table. Returns false, and counts an
/// invalid call, when it is not live or was handed out as another kind.
pub(crate) fn untrack(address: usize, kind: NativeKind) -> bool {
    let mut live = LIVE.lock();
    if live.get(&address) == Some(&kind) {
        live.remove(&address);
        return true;
    }
    drop(live);
    record_invalid();
    false
}

/// Whether `address` is a live allocation of `kind`.
pub(crate) fn is_live(address: usize, kind: NativeKind) -> bool {
    LIVE.lock().get(&address) == Some(&kind)
}

pub(crate) fn record_invalid() {
    INVALID_CALLS.fetch_add(1, Ordering::SeqCst);
}

/// Calls, across every stub in the process, that passed a pointer which
/// was not live: double frees, use after release, foreign pointers, or a
/// handle of the wrong kind.
pub fn invalid_calls() -> usize {
    INVALID_CALLS.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_counts_follow_allocations() {
        let counters = Counters::new();
        counters.record_alloc(NativeKind::Operator);
        counters.record_alloc(NativeKind::Error);
        counters.record_alloc(NativeKind::Error);
        counters.record_release(NativeKind::Error);

        assert_eq!(counters.allocated(NativeKind::Error), 2);
        assert_eq!(counters.live(NativeKind::Error), 1);
        assert_eq!(counters.live(NativeKind::Operator), 1);
        assert_eq!(counters.total_live(), 2);
    }

    #[test]
    fn active_counters_are_per_thread() {
        let counters = Counters::new();
        activate(&counters);
        assert!(Arc::ptr_eq(&active(), &counters));

        let other = std::thread::spawn(|| active().total_live()).join().unwrap();
        assert_eq!(other, 0);
    }

    #[test]
    fn tracking_checks_kind() {
        let boxed = Box::new(0u64);
        let address = &*boxed as *const u64 as usize;

        track(address, NativeKind::Metadata);
        assert!(is_live(address, NativeKind::Metadata));
        assert!(!is_live(address, NativeKind::Entry));
        assert!(untrack(address, NativeKind::Metadata));
        assert!(!is_live(address, NativeKind::Metadata));
    }
}
