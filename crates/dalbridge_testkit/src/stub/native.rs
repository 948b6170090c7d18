//! The native side of the stub.
//!
//! Every function here has the C signature of the OpenDAL entry point it
//! stands in for and is only ever reached through a bound callable, so
//! arguments and results cross a real libffi call. Storage is an
//! in-memory tree of files and directories.
//!
//! When a call fails, the payload slot of its envelope is deliberately
//! filled with a stale value (a dangling pointer, `exists = 1`, an
//! oversized count). A caller that reads it anyway shows up as an
//! invalid call or a wrong answer.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::{c_char, CStr, CString};
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dalbridge_abi::{
    ErrorCode, ExistsResult, ListResult, ListerNextResult, NativeBytes, NativeCapability,
    NativeError, OperatorNewResult, RawEntry, RawLister, RawMetadata, RawOperator,
    RawOperatorInfo, RawOptions, RawReader, ReadResult, ReaderReadResult, ReaderResult,
    StatResult,
};
use parking_lot::Mutex;

use super::counters::{self, Counters, NativeKind};

/// The only scheme the stub serves.
pub const SCHEME: &str = "memory";

/// Option key prefix overriding one native capability field,
/// e.g. `capability.write_can_empty = 0`.
pub const CAPABILITY_PREFIX: &str = "capability.";

/// Option key prefix making one operation fail with a raw error code,
/// e.g. `fail.stat = 4`.
pub const FAIL_PREFIX: &str = "fail.";

/// Option key that, set to `garbled`, makes every error message invalid
/// UTF-8.
pub const FAIL_MESSAGE: &str = "fail_message";

#[repr(C)]
struct Handle<T> {
    value: T,
    counters: Arc<Counters>,
}

fn alloc<T, R>(counters: &Arc<Counters>, kind: NativeKind, value: T) -> *mut R {
    let raw = Box::into_raw(Box::new(Handle {
        value,
        counters: Arc::clone(counters),
    }));
    counters::track(raw as usize, kind);
    counters.record_alloc(kind);
    raw.cast()
}

unsafe fn free<T, R>(raw: *mut R, kind: NativeKind) {
    if counters::untrack(raw as usize, kind) {
        let handle = Box::from_raw(raw.cast::<Handle<T>>());
        handle.counters.record_release(kind);
    }
}

unsafe fn lookup<'a, T, R>(raw: *const R, kind: NativeKind) -> Option<&'a Handle<T>> {
    if !counters::is_live(raw as usize, kind) {
        counters::record_invalid();
        return None;
    }
    Some(&*raw.cast::<Handle<T>>())
}

fn stale<T>() -> *mut T {
    NonNull::dangling().as_ptr()
}

unsafe fn c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}

fn c_string(value: &str) -> CString {
    CString::new(value).unwrap_or_default()
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

// ---- errors and buffers ----

#[repr(transparent)]
struct ErrorValue(NativeError);

impl Drop for ErrorValue {
    fn drop(&mut self) {
        // SAFETY: the message was leaked when the error was raised.
        unsafe { self.0.message.reclaim() }
    }
}

#[repr(transparent)]
struct BytesValue(NativeBytes);

impl Drop for BytesValue {
    fn drop(&mut self) {
        // SAFETY: the buffer was leaked when it was handed out.
        unsafe { self.0.reclaim() }
    }
}

struct Failure {
    code: ErrorCode,
    message: String,
}

impl Failure {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(ErrorCode::NotFound, "file not found")
    }
}

fn raise(counters: &Arc<Counters>, failure: Failure, garbled: bool) -> *mut NativeError {
    let message = if garbled {
        vec![0xff, 0xfe, 0xfd]
    } else {
        failure.message.into_bytes()
    };
    alloc(
        counters,
        NativeKind::Error,
        ErrorValue(NativeError {
            code: failure.code.code(),
            message: NativeBytes::leak(message),
        }),
    )
}

unsafe extern "C" fn bytes_free(bytes: *mut NativeBytes) {
    free::<BytesValue, _>(bytes, NativeKind::Bytes);
}

unsafe extern "C" fn error_free(error: *mut NativeError) {
    free::<ErrorValue, _>(error, NativeKind::Error);
}

// ---- options ----

#[derive(Default)]
struct OptionsState {
    entries: Mutex<BTreeMap<String, String>>,
}

unsafe extern "C" fn options_new() -> *mut RawOptions {
    alloc(&counters::active(), NativeKind::Options, OptionsState::default())
}

unsafe extern "C" fn options_set(options: *mut RawOptions, key: *const c_char, value: *const c_char) {
    let Some(handle) = lookup::<OptionsState, _>(options.cast_const(), NativeKind::Options) else {
        return;
    };
    if let (Some(key), Some(value)) = (c_str(key), c_str(value)) {
        handle.value.entries.lock().insert(key, value);
    }
}

unsafe extern "C" fn options_free(options: *mut RawOptions) {
    free::<OptionsState, _>(options, NativeKind::Options);
}

// ---- operator ----

enum Node {
    File { data: Vec<u8>, modified_ms: i64 },
    Dir,
}

fn is_dir_path(path: &str) -> bool {
    path.is_empty() || path.ends_with('/')
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

fn require(flag: u8, operation: &str) -> Result<(), Failure> {
    if flag == 1 {
        Ok(())
    } else {
        Err(Failure::new(
            ErrorCode::Unsupported,
            format!("{operation} is not supported by this operator"),
        ))
    }
}

macro_rules! capability_fields {
    (flags: [$($flag:ident),* $(,)?], limits: [$($limit:ident),* $(,)?] $(,)?) => {
        fn set_capability(
            capability: &mut NativeCapability,
            field: &str,
            value: usize,
        ) -> Result<(), String> {
            $(
                if field == stringify!($flag) {
                    capability.$flag = u8::try_from(value)
                        .map_err(|_| format!("{field} is a flag, got {value}"))?;
                    return Ok(());
                }
            )*
            $(
                if field == stringify!($limit) {
                    capability.$limit = value;
                    return Ok(());
                }
            )*
            Err(format!("unknown capability {field}"))
        }
    };
}

capability_fields! {
    flags: [
        stat, stat_with_if_match, stat_with_if_none_match,
        read, read_with_if_match, read_with_if_none_match,
        read_with_override_cache_control, read_with_override_content_disposition,
        read_with_override_content_type,
        write, write_can_multi, write_can_empty, write_can_append,
        write_with_content_type, write_with_content_disposition, write_with_cache_control,
        create_dir, delete, copy, rename,
        list, list_with_limit, list_with_start_after, list_with_recursive,
        presign, presign_read, presign_stat, presign_write,
        batch, batch_delete, blocking,
    ],
    limits: [
        write_multi_max_size, write_multi_min_size, write_multi_align_size,
        write_total_max_size, batch_max_operations,
    ],
}

/// The native capability a fresh stub operator reports.
pub fn default_capability() -> NativeCapability {
    NativeCapability {
        stat: 1,
        read: 1,
        write: 1,
        write_can_empty: 1,
        create_dir: 1,
        delete: 1,
        copy: 1,
        rename: 1,
        list: 1,
        blocking: 1,
        ..NativeCapability::default()
    }
}

struct OperatorState {
    root: String,
    name: String,
    capability: NativeCapability,
    failures: BTreeMap<String, i32>,
    garbled: bool,
    store: Mutex<BTreeMap<String, Node>>,
}

impl OperatorState {
    fn configure(scheme: Option<String>, entries: &BTreeMap<String, String>) -> Result<Self, Failure> {
        let scheme = scheme.ok_or_else(|| {
            Failure::new(ErrorCode::ConfigInvalid, "scheme is not a valid string")
        })?;
        if scheme != SCHEME {
            return Err(Failure::new(
                ErrorCode::Unsupported,
                format!("scheme {scheme} is not supported"),
            ));
        }

        let mut state = Self {
            root: "/".to_string(),
            name: "stub".to_string(),
            capability: default_capability(),
            failures: BTreeMap::new(),
            garbled: false,
            store: Mutex::new(BTreeMap::new()),
        };

        for (key, value) in entries {
            if let Some(field) = key.strip_prefix(CAPABILITY_PREFIX) {
                let value = value.parse::<usize>().map_err(|e| {
                    Failure::new(ErrorCode::ConfigInvalid, format!("{key}: {e}"))
                })?;
                set_capability(&mut state.capability, field, value)
                    .map_err(|message| Failure::new(ErrorCode::ConfigInvalid, message))?;
            } else if let Some(operation) = key.strip_prefix(FAIL_PREFIX) {
                let code = value.parse::<i32>().map_err(|e| {
                    Failure::new(ErrorCode::ConfigInvalid, format!("{key}: {e}"))
                })?;
                state.failures.insert(operation.to_string(), code);
            } else if key == FAIL_MESSAGE {
                state.garbled = value == "garbled";
            } else if key == "root" {
                if !value.starts_with('/') {
                    return Err(Failure::new(
                        ErrorCode::ConfigInvalid,
                        format!("root must be absolute, got {value}"),
                    ));
                }
                state.root.clone_from(value);
            } else if key == "name" {
                state.name.clone_from(value);
            }
        }
        Ok(state)
    }

    fn injected(&self, operation: &str) -> Result<(), Failure> {
        match self.failures.get(operation) {
            Some(code) => Err(Failure::new(
                ErrorCode::from(*code),
                format!("injected failure in {operation}"),
            )),
            None => Ok(()),
        }
    }

    fn stat(&self, path: &str) -> Result<MetadataState, Failure> {
        require(self.capability.stat, "stat")?;
        let store = self.store.lock();
        if is_dir_path(path) {
            let exists = path.is_empty() || store.keys().any(|key| key.starts_with(path));
            return if exists {
                Ok(MetadataState::dir())
            } else {
                Err(Failure::not_found())
            };
        }
        match store.get(path) {
            Some(Node::File { data, modified_ms }) => Ok(MetadataState {
                content_length: data.len() as u64,
                is_file: true,
                is_dir: false,
                last_modified_ms: *modified_ms,
            }),
            _ => Err(Failure::not_found()),
        }
    }

    fn file(&self, path: &str) -> Result<Vec<u8>, Failure> {
        if is_dir_path(path) {
            return Err(Failure::new(
                ErrorCode::IsADirectory,
                format!("cannot read directory {path}"),
            ));
        }
        match self.store.lock().get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            _ => Err(Failure::not_found()),
        }
    }

    fn write(&self, path: &str, data: Vec<u8>) -> Result<(), Failure> {
        require(self.capability.write, "write")?;
        if is_dir_path(path) {
            return Err(Failure::new(
                ErrorCode::IsADirectory,
                format!("cannot write to directory {path}"),
            ));
        }
        if data.is_empty() {
            require(self.capability.write_can_empty, "writing empty content")?;
        }
        self.store.lock().insert(
            path.to_string(),
            Node::File {
                data,
                modified_ms: now_ms(),
            },
        );
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), Failure> {
        require(self.capability.delete, "delete")?;
        self.store.lock().remove(path);
        Ok(())
    }

    fn transfer(&self, src: &str, dest: &str, keep_source: bool) -> Result<(), Failure> {
        if src == dest {
            return Err(Failure::new(
                ErrorCode::IsSameFile,
                format!("source and destination are both {src}"),
            ));
        }
        if is_dir_path(src) || is_dir_path(dest) {
            return Err(Failure::new(
                ErrorCode::IsADirectory,
                "only files can be copied or renamed",
            ));
        }

        let mut store = self.store.lock();
        let data = match store.get(src) {
            Some(Node::File { data, .. }) => data.clone(),
            _ => return Err(Failure::not_found()),
        };
        if !keep_source {
            store.remove(src);
        }
        store.insert(
            dest.to_string(),
            Node::File {
                data,
                modified_ms: now_ms(),
            },
        );
        Ok(())
    }

    fn create_dir(&self, path: &str) -> Result<(), Failure> {
        require(self.capability.create_dir, "create_dir")?;
        if !path.ends_with('/') {
            return Err(Failure::new(
                ErrorCode::NotADirectory,
                format!("directory path must end with '/': {path}"),
            ));
        }
        self.store.lock().insert(path.to_string(), Node::Dir);
        Ok(())
    }

    fn list(&self, path: &str) -> Result<VecDeque<EntryState>, Failure> {
        require(self.capability.list, "list")?;
        if !is_dir_path(path) {
            return Err(Failure::new(
                ErrorCode::NotADirectory,
                format!("cannot list file {path}"),
            ));
        }

        let store = self.store.lock();
        let children: BTreeSet<String> = store
            .keys()
            .filter_map(|key| key.strip_prefix(path))
            .filter(|rest| !rest.is_empty())
            .map(|rest| match rest.find('/') {
                Some(end) => rest[..=end].to_string(),
                None => rest.to_string(),
            })
            .collect();

        Ok(children
            .into_iter()
            .map(|child| EntryState {
                path: c_string(&format!("{path}{child}")),
                name: c_string(&child),
            })
            .collect())
    }

    fn info(&self) -> InfoState {
        let mut full = self.capability;
        full.list_with_recursive = 1;
        InfoState {
            scheme: c_string(SCHEME),
            root: c_string(&self.root),
            name: c_string(&self.name),
            full,
            native: self.capability,
        }
    }
}

unsafe extern "C" fn operator_new(scheme: *const c_char, options: *const RawOptions) -> OperatorNewResult {
    let (counters, entries) = if options.is_null() {
        (counters::active(), BTreeMap::new())
    } else {
        match lookup::<OptionsState, _>(options, NativeKind::Options) {
            Some(handle) => (Arc::clone(&handle.counters), handle.value.entries.lock().clone()),
            None => (counters::active(), BTreeMap::new()),
        }
    };

    match OperatorState::configure(c_str(scheme), &entries) {
        Ok(state) => OperatorNewResult {
            op: alloc(&counters, NativeKind::Operator, state),
            error: ptr::null_mut(),
        },
        Err(failure) => {
            let garbled = entries.get(FAIL_MESSAGE).is_some_and(|v| v == "garbled");
            OperatorNewResult {
                op: stale(),
                error: raise(&counters, failure, garbled),
            }
        }
    }
}

unsafe extern "C" fn operator_free(op: *mut RawOperator) {
    free::<OperatorState, _>(op, NativeKind::Operator);
}

/// Runs `f` against a live operator. Failures, including injected ones,
/// come back as a freshly raised error envelope.
unsafe fn operate<T>(
    op: *const RawOperator,
    operation: &str,
    f: impl FnOnce(&Handle<OperatorState>) -> Result<T, Failure>,
) -> Result<T, *mut NativeError> {
    let Some(handle) = lookup::<OperatorState, _>(op, NativeKind::Operator) else {
        return Err(raise(
            &counters::active(),
            Failure::new(ErrorCode::Unexpected, "invalid operator handle"),
            false,
        ));
    };
    handle
        .value
        .injected(operation)
        .and_then(|()| f(handle))
        .map_err(|failure| raise(&handle.counters, failure, handle.value.garbled))
}

unsafe fn path_arg(path: *const c_char) -> Result<String, Failure> {
    c_str(path)
        .map(|path| normalize(&path))
        .ok_or_else(|| Failure::new(ErrorCode::Unexpected, "path is not a valid string"))
}

fn into_error(result: Result<(), *mut NativeError>) -> *mut NativeError {
    result.err().unwrap_or(ptr::null_mut())
}

unsafe extern "C" fn operator_stat(op: *const RawOperator, path: *const c_char) -> StatResult {
    let result = operate(op, "stat", |handle| {
        let meta = handle.value.stat(&path_arg(path)?)?;
        Ok(alloc(&handle.counters, NativeKind::Metadata, meta))
    });
    match result {
        Ok(meta) => StatResult {
            meta,
            error: ptr::null_mut(),
        },
        Err(error) => StatResult { meta: stale(), error },
    }
}

unsafe extern "C" fn operator_is_exist(op: *const RawOperator, path: *const c_char) -> ExistsResult {
    let result = operate(op, "is_exist", |handle| match handle.value.stat(&path_arg(path)?) {
        Ok(_) => Ok(1),
        Err(failure) if failure.code == ErrorCode::NotFound => Ok(0),
        Err(failure) => Err(failure),
    });
    match result {
        Ok(exists) => ExistsResult {
            exists,
            error: ptr::null_mut(),
        },
        Err(error) => ExistsResult { exists: 1, error },
    }
}

unsafe extern "C" fn operator_read(op: *const RawOperator, path: *const c_char) -> ReadResult {
    let result = operate(op, "read", |handle| {
        require(handle.value.capability.read, "read")?;
        let data = handle.value.file(&path_arg(path)?)?;
        let bytes = BytesValue(NativeBytes::leak(data));
        Ok(alloc(&handle.counters, NativeKind::Bytes, bytes))
    });
    match result {
        Ok(data) => ReadResult {
            data,
            error: ptr::null_mut(),
        },
        Err(error) => ReadResult { data: stale(), error },
    }
}

unsafe extern "C" fn operator_write(
    op: *const RawOperator,
    path: *const c_char,
    bytes: NativeBytes,
) -> *mut NativeError {
    into_error(operate(op, "write", |handle| {
        let path = path_arg(path)?;
        handle.value.write(&path, bytes.to_vec())
    }))
}

unsafe extern "C" fn operator_delete(op: *const RawOperator, path: *const c_char) -> *mut NativeError {
    into_error(operate(op, "delete", |handle| handle.value.delete(&path_arg(path)?)))
}

unsafe extern "C" fn operator_copy(
    op: *const RawOperator,
    src: *const c_char,
    dest: *const c_char,
) -> *mut NativeError {
    into_error(operate(op, "copy", |handle| {
        require(handle.value.capability.copy, "copy")?;
        handle.value.transfer(&path_arg(src)?, &path_arg(dest)?, true)
    }))
}

unsafe extern "C" fn operator_rename(
    op: *const RawOperator,
    src: *const c_char,
    dest: *const c_char,
) -> *mut NativeError {
    into_error(operate(op, "rename", |handle| {
        require(handle.value.capability.rename, "rename")?;
        handle.value.transfer(&path_arg(src)?, &path_arg(dest)?, false)
    }))
}

unsafe extern "C" fn operator_create_dir(op: *const RawOperator, path: *const c_char) -> *mut NativeError {
    into_error(operate(op, "create_dir", |handle| {
        handle.value.create_dir(&path_arg(path)?)
    }))
}

// ---- info ----

struct InfoState {
    scheme: CString,
    root: CString,
    name: CString,
    full: NativeCapability,
    native: NativeCapability,
}

unsafe extern "C" fn info_new(op: *const RawOperator) -> *mut RawOperatorInfo {
    match lookup::<OperatorState, _>(op, NativeKind::Operator) {
        Some(handle) => alloc(&handle.counters, NativeKind::Info, handle.value.info()),
        None => ptr::null_mut(),
    }
}

unsafe extern "C" fn info_free(info: *mut RawOperatorInfo) {
    free::<InfoState, _>(info, NativeKind::Info);
}

unsafe fn info<'a>(info: *const RawOperatorInfo) -> Option<&'a InfoState> {
    lookup::<InfoState, _>(info, NativeKind::Info).map(|handle| &handle.value)
}

unsafe extern "C" fn info_full_capability(raw: *const RawOperatorInfo) -> NativeCapability {
    info(raw).map(|info| info.full).unwrap_or_default()
}

unsafe extern "C" fn info_native_capability(raw: *const RawOperatorInfo) -> NativeCapability {
    info(raw).map(|info| info.native).unwrap_or_default()
}

unsafe extern "C" fn info_scheme(raw: *const RawOperatorInfo) -> *const c_char {
    info(raw).map_or(ptr::null(), |info| info.scheme.as_ptr())
}

unsafe extern "C" fn info_root(raw: *const RawOperatorInfo) -> *const c_char {
    info(raw).map_or(ptr::null(), |info| info.root.as_ptr())
}

unsafe extern "C" fn info_name(raw: *const RawOperatorInfo) -> *const c_char {
    info(raw).map_or(ptr::null(), |info| info.name.as_ptr())
}

// ---- metadata ----

struct MetadataState {
    content_length: u64,
    is_file: bool,
    is_dir: bool,
    last_modified_ms: i64,
}

impl MetadataState {
    fn dir() -> Self {
        Self {
            content_length: 0,
            is_file: false,
            is_dir: true,
            last_modified_ms: -1,
        }
    }
}

unsafe fn metadata<'a>(meta: *const RawMetadata) -> Option<&'a MetadataState> {
    lookup::<MetadataState, _>(meta, NativeKind::Metadata).map(|handle| &handle.value)
}

unsafe extern "C" fn metadata_free(meta: *mut RawMetadata) {
    free::<MetadataState, _>(meta, NativeKind::Metadata);
}

unsafe extern "C" fn metadata_content_length(meta: *const RawMetadata) -> u64 {
    metadata(meta).map_or(0, |meta| meta.content_length)
}

unsafe extern "C" fn metadata_is_file(meta: *const RawMetadata) -> u8 {
    metadata(meta).map_or(0, |meta| u8::from(meta.is_file))
}

unsafe extern "C" fn metadata_is_dir(meta: *const RawMetadata) -> u8 {
    metadata(meta).map_or(0, |meta| u8::from(meta.is_dir))
}

unsafe extern "C" fn metadata_last_modified_ms(meta: *const RawMetadata) -> i64 {
    metadata(meta).map_or(-1, |meta| meta.last_modified_ms)
}

// ---- listing ----

struct EntryState {
    name: CString,
    path: CString,
}

struct ListerState {
    entries: Mutex<VecDeque<EntryState>>,
    failure: Option<i32>,
    garbled: bool,
}

unsafe extern "C" fn operator_list(op: *const RawOperator, path: *const c_char) -> ListResult {
    let result = operate(op, "list", |handle| {
        let entries = handle.value.list(&path_arg(path)?)?;
        let lister = ListerState {
            entries: Mutex::new(entries),
            failure: handle.value.failures.get("lister_next").copied(),
            garbled: handle.value.garbled,
        };
        Ok(alloc(&handle.counters, NativeKind::Lister, lister))
    });
    match result {
        Ok(lister) => ListResult {
            lister,
            error: ptr::null_mut(),
        },
        Err(error) => ListResult {
            lister: stale(),
            error,
        },
    }
}

unsafe extern "C" fn lister_next(lister: *mut RawLister) -> ListerNextResult {
    let Some(handle) = lookup::<ListerState, _>(lister.cast_const(), NativeKind::Lister) else {
        return ListerNextResult {
            entry: stale(),
            error: raise(
                &counters::active(),
                Failure::new(ErrorCode::Unexpected, "invalid lister handle"),
                false,
            ),
        };
    };

    if let Some(code) = handle.value.failure {
        let failure = Failure::new(ErrorCode::from(code), "injected failure in lister_next");
        return ListerNextResult {
            entry: stale(),
            error: raise(&handle.counters, failure, handle.value.garbled),
        };
    }

    let entry = match handle.value.entries.lock().pop_front() {
        Some(entry) => alloc(&handle.counters, NativeKind::Entry, entry),
        None => ptr::null_mut(),
    };
    ListerNextResult {
        entry,
        error: ptr::null_mut(),
    }
}

unsafe extern "C" fn lister_free(lister: *mut RawLister) {
    free::<ListerState, _>(lister, NativeKind::Lister);
}

unsafe extern "C" fn entry_name(entry: *const RawEntry) -> *const c_char {
    lookup::<EntryState, _>(entry, NativeKind::Entry)
        .map_or(ptr::null(), |handle| handle.value.name.as_ptr())
}

unsafe extern "C" fn entry_path(entry: *const RawEntry) -> *const c_char {
    lookup::<EntryState, _>(entry, NativeKind::Entry)
        .map_or(ptr::null(), |handle| handle.value.path.as_ptr())
}

unsafe extern "C" fn entry_free(entry: *mut RawEntry) {
    free::<EntryState, _>(entry, NativeKind::Entry);
}

// ---- streaming reads ----

struct Cursor {
    data: Vec<u8>,
    position: usize,
}

struct ReaderState {
    cursor: Mutex<Cursor>,
    failure: Option<i32>,
    garbled: bool,
}

unsafe extern "C" fn operator_reader(op: *const RawOperator, path: *const c_char) -> ReaderResult {
    let result = operate(op, "reader", |handle| {
        require(handle.value.capability.read, "read")?;
        let data = handle.value.file(&path_arg(path)?)?;
        let reader = ReaderState {
            cursor: Mutex::new(Cursor { data, position: 0 }),
            failure: handle.value.failures.get("reader_read").copied(),
            garbled: handle.value.garbled,
        };
        Ok(alloc(&handle.counters, NativeKind::Reader, reader))
    });
    match result {
        Ok(reader) => ReaderResult {
            reader,
            error: ptr::null_mut(),
        },
        Err(error) => ReaderResult {
            reader: stale(),
            error,
        },
    }
}

unsafe extern "C" fn reader_read(reader: *mut RawReader, buf: *mut u8, len: usize) -> ReaderReadResult {
    let Some(handle) = lookup::<ReaderState, _>(reader.cast_const(), NativeKind::Reader) else {
        return ReaderReadResult {
            size: usize::MAX,
            error: raise(
                &counters::active(),
                Failure::new(ErrorCode::Unexpected, "invalid reader handle"),
                false,
            ),
        };
    };

    let failure = match handle.value.failure {
        Some(code) => Some(Failure::new(ErrorCode::from(code), "injected failure in reader_read")),
        None if buf.is_null() && len > 0 => {
            Some(Failure::new(ErrorCode::Unexpected, "null read buffer"))
        }
        None => None,
    };
    if let Some(failure) = failure {
        return ReaderReadResult {
            size: usize::MAX,
            error: raise(&handle.counters, failure, handle.value.garbled),
        };
    }

    let mut cursor = handle.value.cursor.lock();
    let remaining = &cursor.data[cursor.position..];
    let size = remaining.len().min(len);
    if size > 0 {
        ptr::copy_nonoverlapping(remaining.as_ptr(), buf, size);
    }
    cursor.position += size;
    ReaderReadResult {
        size,
        error: ptr::null_mut(),
    }
}

unsafe extern "C" fn reader_free(reader: *mut RawReader) {
    free::<ReaderState, _>(reader, NativeKind::Reader);
}

/// Every exported entry point with its address.
pub(crate) fn symbols() -> Vec<(&'static str, usize)> {
    vec![
        ("opendal_bytes_free", bytes_free as *const () as usize),
        ("opendal_error_free", error_free as *const () as usize),
        ("opendal_operator_options_free", options_free as *const () as usize),
        ("opendal_operator_options_new", options_new as *const () as usize),
        ("opendal_operator_options_set", options_set as *const () as usize),
        ("opendal_operator_free", operator_free as *const () as usize),
        ("opendal_operator_new", operator_new as *const () as usize),
        ("opendal_operator_info_free", info_free as *const () as usize),
        ("opendal_operator_info_new", info_new as *const () as usize),
        ("opendal_operator_info_get_full_capability", info_full_capability as *const () as usize),
        ("opendal_operator_info_get_native_capability", info_native_capability as *const () as usize),
        ("opendal_operator_info_get_scheme", info_scheme as *const () as usize),
        ("opendal_operator_info_get_root", info_root as *const () as usize),
        ("opendal_operator_info_get_name", info_name as *const () as usize),
        ("opendal_metadata_free", metadata_free as *const () as usize),
        ("opendal_metadata_content_length", metadata_content_length as *const () as usize),
        ("opendal_metadata_is_file", metadata_is_file as *const () as usize),
        ("opendal_metadata_is_dir", metadata_is_dir as *const () as usize),
        ("opendal_metadata_last_modified_ms", metadata_last_modified_ms as *const () as usize),
        ("opendal_operator_stat", operator_stat as *const () as usize),
        ("opendal_operator_is_exist", operator_is_exist as *const () as usize),
        ("opendal_operator_read", operator_read as *const () as usize),
        ("opendal_operator_write", operator_write as *const () as usize),
        ("opendal_operator_delete", operator_delete as *const () as usize),
        ("opendal_operator_copy", operator_copy as *const () as usize),
        ("opendal_operator_rename", operator_rename as *const () as usize),
        ("opendal_operator_create_dir", operator_create_dir as *const () as usize),
        ("opendal_entry_free", entry_free as *const () as usize),
        ("opendal_entry_name", entry_name as *const () as usize),
        ("opendal_entry_path", entry_path as *const () as usize),
        ("opendal_lister_free", lister_free as *const () as usize),
        ("opendal_lister_next", lister_next as *const () as usize),
        ("opendal_operator_list", operator_list as *const () as usize),
        ("opendal_reader_free", reader_free as *const () as usize),
        ("opendal_reader_read", reader_read as *const () as usize),
        ("opendal_operator_reader", operator_reader as *const () as usize),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn memory(pairs: &[(&str, &str)]) -> OperatorState {
        OperatorState::configure(Some(SCHEME.to_string()), &entries(pairs))
            .unwrap_or_else(|f| panic!("configure failed: {}", f.message))
    }

    #[test]
    fn exports_every_operation() {
        let names: Vec<_> = symbols().into_iter().map(|(name, _)| name).collect();
        let expected: Vec<_> = dalbridge_core::OPERATIONS.iter().map(|op| op.symbol).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn unknown_scheme_is_unsupported() {
        let err = OperatorState::configure(Some("s3".to_string()), &BTreeMap::new())
            .err()
            .unwrap();
        assert_eq!(err.code, ErrorCode::Unsupported);
    }

    #[test]
    fn capability_overrides() {
        let state = memory(&[
            ("capability.write_can_empty", "0"),
            ("capability.batch_max_operations", "64"),
            ("capability.presign", "2"),
        ]);
        assert_eq!(state.capability.write_can_empty, 0);
        assert_eq!(state.capability.batch_max_operations, 64);
        assert_eq!(state.capability.presign, 2);

        let err = OperatorState::configure(
            Some(SCHEME.to_string()),
            &entries(&[("capability.stat", "300")]),
        )
        .err()
        .unwrap();
        assert_eq!(err.code, ErrorCode::ConfigInvalid);
    }

    #[test]
    fn every_capability_field_is_settable() {
        for (field, kind) in dalbridge_abi::CAPABILITY_FIELDS {
            let mut capability = NativeCapability::default();
            set_capability(&mut capability, field, 1)
                .unwrap_or_else(|e| panic!("{field}: {e}"));
            let oversized = set_capability(&mut capability, field, 256);
            match kind {
                dalbridge_abi::FieldKind::Flag => assert!(oversized.is_err(), "{field}"),
                dalbridge_abi::FieldKind::Limit => assert!(oversized.is_ok(), "{field}"),
            }
        }
        assert!(set_capability(&mut NativeCapability::default(), "teleport", 1).is_err());
    }

    #[test]
    fn listing_yields_direct_children() {
        let state = memory(&[]);
        state.write("dir/a.txt", b"a".to_vec()).ok().unwrap();
        state.write("dir/sub/b.txt", b"b".to_vec()).ok().unwrap();
        state.create_dir("dir/empty/").ok().unwrap();
        state.write("other.txt", b"c".to_vec()).ok().unwrap();

        let names: Vec<_> = state
            .list("dir/")
            .ok()
            .unwrap()
            .into_iter()
            .map(|entry| entry.path.into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["dir/a.txt", "dir/empty/", "dir/sub/"]);
    }

    #[test]
    fn directories_stat_without_timestamp() {
        let state = memory(&[]);
        state.create_dir("logs/").ok().unwrap();
        let meta = state.stat("logs/").ok().unwrap();
        assert!(meta.is_dir);
        assert_eq!(meta.last_modified_ms, -1);
        assert!(state.stat("missing/").is_err());
    }
}
