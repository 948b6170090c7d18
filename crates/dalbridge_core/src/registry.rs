//! The binding registry: every native operation, bound once, in an order
//! that guarantees release operations exist before anything that
//! allocates what they release.

use std::collections::BTreeSet;
use std::ffi::c_char;
use std::fmt;
use std::sync::Arc;

use dalbridge_abi::{
    AbiType, ExistsResult, ListResult, ListerNextResult, NativeBytes, NativeCapability,
    NativeError, OperatorNewResult, RawEntry, RawLister, RawMetadata, RawOperator,
    RawOperatorInfo, RawOptions, RawReader, ReadResult, ReaderReadResult, ReaderResult,
    StatResult,
};
use tracing::{debug, info};

use crate::callable::{AbiArgs, BoundCallable};
use crate::config::LoadConfig;
use crate::error::{BindError, BindResult};
use crate::library::LibraryHandle;
use crate::symbol::SymbolSource;

/// What an operation does to native resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Releases a resource.
    Release,
    /// May hand out a resource (a handle, buffer or error envelope) that a
    /// release operation must later take back.
    Allocate,
    /// Reads from a resource without transferring ownership.
    Access,
}

/// One entry of the operation table.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    /// The exported symbol name.
    pub symbol: &'static str,
    /// What the operation does to resources.
    pub role: Role,
    /// Release operations that must already be bound.
    pub releases: &'static [&'static str],
}

const fn release(symbol: &'static str) -> Operation {
    Operation {
        symbol,
        role: Role::Release,
        releases: &[],
    }
}

const fn access(symbol: &'static str) -> Operation {
    Operation {
        symbol,
        role: Role::Access,
        releases: &[],
    }
}

const fn allocate(symbol: &'static str, releases: &'static [&'static str]) -> Operation {
    Operation {
        symbol,
        role: Role::Allocate,
        releases,
    }
}

const BYTES_FREE: &str = "opendal_bytes_free";
const ERROR_FREE: &str = "opendal_error_free";
const OPTIONS_FREE: &str = "opendal_operator_options_free";
const OPERATOR_FREE: &str = "opendal_operator_free";
const INFO_FREE: &str = "opendal_operator_info_free";
const METADATA_FREE: &str = "opendal_metadata_free";
const ENTRY_FREE: &str = "opendal_entry_free";
const LISTER_FREE: &str = "opendal_lister_free";
const READER_FREE: &str = "opendal_reader_free";

/// Every native operation, in build order.
pub const OPERATIONS: [Operation; 36] = [
    release(BYTES_FREE),
    release(ERROR_FREE),
    release(OPTIONS_FREE),
    allocate("opendal_operator_options_new", &[OPTIONS_FREE]),
    access("opendal_operator_options_set"),
    release(OPERATOR_FREE),
    allocate("opendal_operator_new", &[OPERATOR_FREE, ERROR_FREE]),
    release(INFO_FREE),
    allocate("opendal_operator_info_new", &[INFO_FREE]),
    access("opendal_operator_info_get_full_capability"),
    access("opendal_operator_info_get_native_capability"),
    access("opendal_operator_info_get_scheme"),
    access("opendal_operator_info_get_root"),
    access("opendal_operator_info_get_name"),
    release(METADATA_FREE),
    access("opendal_metadata_content_length"),
    access("opendal_metadata_is_file"),
    access("opendal_metadata_is_dir"),
    access("opendal_metadata_last_modified_ms"),
    allocate("opendal_operator_stat", &[METADATA_FREE, ERROR_FREE]),
    allocate("opendal_operator_is_exist", &[ERROR_FREE]),
    allocate("opendal_operator_read", &[BYTES_FREE, ERROR_FREE]),
    allocate("opendal_operator_write", &[ERROR_FREE]),
    allocate("opendal_operator_delete", &[ERROR_FREE]),
    allocate("opendal_operator_copy", &[ERROR_FREE]),
    allocate("opendal_operator_rename", &[ERROR_FREE]),
    allocate("opendal_operator_create_dir", &[ERROR_FREE]),
    release(ENTRY_FREE),
    access("opendal_entry_name"),
    access("opendal_entry_path"),
    release(LISTER_FREE),
    allocate("opendal_lister_next", &[ENTRY_FREE, ERROR_FREE]),
    allocate("opendal_operator_list", &[LISTER_FREE, ERROR_FREE]),
    release(READER_FREE),
    allocate("opendal_reader_read", &[ERROR_FREE]),
    allocate("opendal_operator_reader", &[READER_FREE, ERROR_FREE]),
];

/// Looks up an operation by symbol name.
pub fn operation(symbol: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.symbol == symbol)
}

type Release<T> = BoundCallable<(*mut T,), ()>;
type Getter<H, R> = BoundCallable<(*const H,), R>;
type PathCall<R> = BoundCallable<(*const RawOperator, *const c_char), R>;
type TwoPathCall<R> = BoundCallable<(*const RawOperator, *const c_char, *const c_char), R>;

/// One bound callable per native operation.
///
/// Field order is build order; it must follow [`OPERATIONS`].
pub(crate) struct Bindings {
    pub(crate) bytes_free: Release<NativeBytes>,
    pub(crate) error_free: Release<NativeError>,
    pub(crate) options_free: Release<RawOptions>,
    pub(crate) options_new: BoundCallable<(), *mut RawOptions>,
    pub(crate) options_set: BoundCallable<(*mut RawOptions, *const c_char, *const c_char), ()>,
    pub(crate) operator_free: Release<RawOperator>,
    pub(crate) operator_new: BoundCallable<(*const c_char, *const RawOptions), OperatorNewResult>,
    pub(crate) info_free: Release<RawOperatorInfo>,
    pub(crate) info_new: Getter<RawOperator, *mut RawOperatorInfo>,
    pub(crate) info_full_capability: Getter<RawOperatorInfo, NativeCapability>,
    pub(crate) info_native_capability: Getter<RawOperatorInfo, NativeCapability>,
    pub(crate) info_scheme: Getter<RawOperatorInfo, *const c_char>,
    pub(crate) info_root: Getter<RawOperatorInfo, *const c_char>,
    pub(crate) info_name: Getter<RawOperatorInfo, *const c_char>,
    pub(crate) metadata_free: Release<RawMetadata>,
    pub(crate) metadata_content_length: Getter<RawMetadata, u64>,
    pub(crate) metadata_is_file: Getter<RawMetadata, u8>,
    pub(crate) metadata_is_dir: Getter<RawMetadata, u8>,
    pub(crate) metadata_last_modified_ms: Getter<RawMetadata, i64>,
    pub(crate) stat: PathCall<StatResult>,
    pub(crate) is_exist: PathCall<ExistsResult>,
    pub(crate) read: PathCall<ReadResult>,
    pub(crate) write:
        BoundCallable<(*const RawOperator, *const c_char, NativeBytes), *mut NativeError>,
    pub(crate) delete: PathCall<*mut NativeError>,
    pub(crate) copy: TwoPathCall<*mut NativeError>,
    pub(crate) rename: TwoPathCall<*mut NativeError>,
    pub(crate) create_dir: PathCall<*mut NativeError>,
    pub(crate) entry_free: Release<RawEntry>,
    pub(crate) entry_name: Getter<RawEntry, *const c_char>,
    pub(crate) entry_path: Getter<RawEntry, *const c_char>,
    pub(crate) lister_free: Release<RawLister>,
    pub(crate) lister_next: BoundCallable<(*mut RawLister,), ListerNextResult>,
    pub(crate) list: PathCall<ListResult>,
    pub(crate) reader_free: Release<RawReader>,
    pub(crate) reader_read: BoundCallable<(*mut RawReader, *mut u8, usize), ReaderReadResult>,
    pub(crate) reader: PathCall<ReaderResult>,
}

impl Bindings {
    fn build(source: &dyn SymbolSource) -> BindResult<Self> {
        let mut b = Binder::new(source);
        Ok(Self {
            bytes_free: b.bind(BYTES_FREE)?,
            error_free: b.bind(ERROR_FREE)?,
            options_free: b.bind(OPTIONS_FREE)?,
            options_new: b.bind("opendal_operator_options_new")?,
            options_set: b.bind("opendal_operator_options_set")?,
            operator_free: b.bind(OPERATOR_FREE)?,
            operator_new: b.bind("opendal_operator_new")?,
            info_free: b.bind(INFO_FREE)?,
            info_new: b.bind("opendal_operator_info_new")?,
            info_full_capability: b.bind("opendal_operator_info_get_full_capability")?,
            info_native_capability: b.bind("opendal_operator_info_get_native_capability")?,
            info_scheme: b.bind("opendal_operator_info_get_scheme")?,
            info_root: b.bind("opendal_operator_info_get_root")?,
            info_name: b.bind("opendal_operator_info_get_name")?,
            metadata_free: b.bind(METADATA_FREE)?,
            metadata_content_length: b.bind("opendal_metadata_content_length")?,
            metadata_is_file: b.bind("opendal_metadata_is_file")?,
            metadata_is_dir: b.bind("opendal_metadata_is_dir")?,
            metadata_last_modified_ms: b.bind("opendal_metadata_last_modified_ms")?,
            stat: b.bind("opendal_operator_stat")?,
            is_exist: b.bind("opendal_operator_is_exist")?,
            read: b.bind("opendal_operator_read")?,
            write: b.bind("opendal_operator_write")?,
            delete: b.bind("opendal_operator_delete")?,
            copy: b.bind("opendal_operator_copy")?,
            rename: b.bind("opendal_operator_rename")?,
            create_dir: b.bind("opendal_operator_create_dir")?,
            entry_free: b.bind(ENTRY_FREE)?,
            entry_name: b.bind("opendal_entry_name")?,
            entry_path: b.bind("opendal_entry_path")?,
            lister_free: b.bind(LISTER_FREE)?,
            lister_next: b.bind("opendal_lister_next")?,
            list: b.bind("opendal_operator_list")?,
            reader_free: b.bind(READER_FREE)?,
            reader_read: b.bind("opendal_reader_read")?,
            reader: b.bind("opendal_operator_reader")?,
        })
    }
}

/// Binds operations one at a time, refusing any allocator whose release
/// operations are not bound yet.
struct Binder<'a> {
    source: &'a dyn SymbolSource,
    bound: BTreeSet<&'static str>,
}

impl<'a> Binder<'a> {
    fn new(source: &'a dyn SymbolSource) -> Self {
        Self {
            source,
            bound: BTreeSet::new(),
        }
    }

    fn bind<A: AbiArgs, R: AbiType>(&mut self, symbol: &str) -> BindResult<BoundCallable<A, R>> {
        let entry = operation(symbol)
            .ok_or_else(|| BindError::symbol(symbol, "not a known native operation"))?;

        if let Some(missing) = entry.releases.iter().copied().find(|r| !self.bound.contains(r)) {
            return Err(BindError::BindOrder {
                symbol: entry.symbol,
                missing,
            });
        }

        let callable = BoundCallable::<A, R>::resolve(self.source, entry.symbol)?;
        debug!(
            symbol = entry.symbol,
            signature = %callable.descriptor(),
            "bound native symbol"
        );
        self.bound.insert(entry.symbol);
        Ok(callable)
    }
}

pub(crate) struct Scope {
    // Declared before `source` so every callable is dropped before the
    // library it points into.
    bindings: Bindings,
    source: Box<dyn SymbolSource>,
}

/// A loaded library together with all of its bound operations.
///
/// Built once and immutable afterwards. Cloning is cheap and shares the
/// same bindings; the library is unloaded when the last clone, and the
/// last resource wrapper created through it, is gone.
#[derive(Clone)]
pub struct Registry {
    scope: Arc<Scope>,
}

impl Registry {
    /// Binds every operation from `source`.
    ///
    /// Any failure aborts the whole build; no partial registry is
    /// returned.
    pub fn build(source: impl SymbolSource + 'static) -> BindResult<Self> {
        let source: Box<dyn SymbolSource> = Box::new(source);
        let bindings = Bindings::build(source.as_ref())?;
        info!(
            origin = %source.origin(),
            operations = OPERATIONS.len(),
            "binding registry ready"
        );
        Ok(Self {
            scope: Arc::new(Scope { bindings, source }),
        })
    }

    /// Opens the library described by `config` and binds every operation.
    pub fn load(config: &LoadConfig) -> BindResult<Self> {
        Self::build(LibraryHandle::open_with(config)?)
    }

    /// Where the bound symbols came from.
    pub fn origin(&self) -> String {
        self.scope.source.origin()
    }

    /// Number of live clones of this registry, including the ones held by
    /// resource wrappers.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.scope)
    }

    pub(crate) fn bindings(&self) -> &Bindings {
        &self.scope.bindings
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("origin", &self.origin())
            .field("operations", &OPERATIONS.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;
    use std::collections::BTreeMap;
    use std::ffi::c_void;
    use std::sync::Mutex;

    extern "C" fn placeholder() {}

    /// Resolves every name to the same address; nothing is ever called.
    #[derive(Default)]
    struct AddressBook {
        missing: Vec<&'static str>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl SymbolSource for AddressBook {
        fn resolve(&self, name: &str) -> BindResult<Symbol> {
            self.log.lock().unwrap().push(name.to_string());
            if self.missing.iter().any(|missing| *missing == name) {
                return Err(BindError::symbol(name, "undefined symbol"));
            }
            Symbol::new(name, placeholder as *const c_void)
        }
    }

    #[test]
    fn releasers_precede_allocators() {
        for (index, op) in OPERATIONS.iter().enumerate() {
            for release in op.releases {
                let position = OPERATIONS
                    .iter()
                    .position(|other| other.symbol == *release)
                    .unwrap();
                assert!(position < index, "{} listed before {}", op.symbol, release);
                assert_eq!(OPERATIONS[position].role, Role::Release);
            }
        }
    }

    #[test]
    fn symbols_are_unique() {
        let unique: BTreeSet<_> = OPERATIONS.iter().map(|op| op.symbol).collect();
        assert_eq!(unique.len(), OPERATIONS.len());
    }

    #[test]
    fn build_follows_operation_table() {
        let source = AddressBook::default();
        let log = Arc::clone(&source.log);
        let registry = Registry::build(source).unwrap();

        let expected: Vec<_> = OPERATIONS.iter().map(|op| op.symbol.to_string()).collect();
        assert_eq!(*log.lock().unwrap(), expected);
        assert_eq!(registry.handle_count(), 1);
    }

    #[test]
    fn missing_symbol_aborts_build() {
        let source = AddressBook {
            missing: vec!["opendal_reader_read"],
            ..AddressBook::default()
        };
        let err = Registry::build(source).unwrap_err();
        match err {
            BindError::Symbol { name, .. } => assert_eq!(name, "opendal_reader_read"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn allocator_before_releaser_is_refused() {
        let source = AddressBook::default();
        let mut binder = Binder::new(&source);
        binder
            .bind::<(*mut NativeError,), ()>(ERROR_FREE)
            .unwrap();

        let err = binder
            .bind::<(*const c_char, *const RawOptions), OperatorNewResult>("opendal_operator_new")
            .unwrap_err();
        match err {
            BindError::BindOrder { symbol, missing } => {
                assert_eq!(symbol, "opendal_operator_new");
                assert_eq!(missing, OPERATOR_FREE);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!source.log.lock().unwrap().contains(&"opendal_operator_new".to_string()));
    }

    #[test]
    fn unknown_operation_is_refused() {
        let source = AddressBook::default();
        let mut binder = Binder::new(&source);
        let err = binder.bind::<(), ()>("opendal_operator_presign").unwrap_err();
        assert!(matches!(err, BindError::Symbol { .. }));
    }

    #[test]
    fn registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();

        let registry = Registry::build(AddressBook::default()).unwrap();
        let names: BTreeMap<_, _> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                (i, std::thread::spawn(move || registry.origin()).join().unwrap())
            })
            .collect();
        assert!(names.values().all(|origin| origin == "<anonymous>"));
    }
}
