//! The operator: the root storage handle every other native resource is
//! obtained through.

use std::fmt;

use dalbridge_abi::{NativeBytes, NativeError, RawOperator};
use tracing::{debug, info};

use crate::error::BindResult;
use crate::info::OperatorInfo;
use crate::lister::Lister;
use crate::marshal::{c_string, check, flag, open, take_bytes};
use crate::metadata::Metadata;
use crate::options::{NativeOptions, OperatorOptions};
use crate::reader::Reader;
use crate::registry::{Bindings, Registry};
use crate::resource::{OperatorKind, Owned};

/// An open storage operator.
///
/// Every method maps to exactly one native operation. Handles obtained
/// from an operator ([`Metadata`], [`Lister`], [`Reader`],
/// [`OperatorInfo`]) borrow it, so it cannot be closed while any of them
/// is alive.
///
/// The native operator is thread-safe, so `Operator` is `Send + Sync` and
/// may be shared across threads by reference.
pub struct Operator {
    owned: Owned<OperatorKind>,
    scheme: String,
}

// The native operator tolerates concurrent calls from multiple threads.
unsafe impl Send for Operator {}
unsafe impl Sync for Operator {}

impl Operator {
    /// Creates an operator for the backend `scheme` (e.g. `"memory"`,
    /// `"fs"`), configured with `options`.
    pub fn new(registry: &Registry, scheme: &str, options: &OperatorOptions) -> BindResult<Self> {
        let c_scheme = c_string(scheme, "scheme")?;
        let native_options = NativeOptions::new(registry, options)?;
        let bindings = registry.bindings();

        // SAFETY: both pointers are live for the call; the options handle
        // is only read and is released afterwards by `native_options`.
        let raw = unsafe {
            let result = bindings
                .operator_new
                .call((c_scheme.as_ptr(), native_options.as_ptr()));
            open(bindings, result)?
        };
        // SAFETY: a fresh handle from `opendal_operator_new`.
        let owned = unsafe { Owned::new(registry, raw, "opendal_operator_new") }?;
        drop(native_options);

        info!(scheme, options = options.len(), "created operator");
        Ok(Self {
            owned,
            scheme: scheme.to_string(),
        })
    }

    /// The scheme this operator was created with.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns metadata for `path`.
    pub fn stat(&self, path: &str) -> BindResult<Metadata<'_>> {
        let path = c_string(path, "path")?;
        // SAFETY: live operator handle and path for the duration of the call.
        let raw = unsafe {
            let result = self.bindings().stat.call((self.as_raw(), path.as_ptr()));
            open(self.bindings(), result)?
        };
        // SAFETY: a fresh handle from `opendal_operator_stat`.
        unsafe { Metadata::from_raw(self, raw) }
    }

    /// Returns true if `path` exists.
    pub fn is_exist(&self, path: &str) -> BindResult<bool> {
        let path = c_string(path, "path")?;
        // SAFETY: live operator handle and path for the duration of the call.
        let exists = unsafe {
            let result = self.bindings().is_exist.call((self.as_raw(), path.as_ptr()));
            open(self.bindings(), result)?
        };
        Ok(flag(exists))
    }

    /// Reads the whole object at `path`.
    pub fn read(&self, path: &str) -> BindResult<Vec<u8>> {
        let path = c_string(path, "path")?;
        // SAFETY: live operator handle and path; the returned buffer is
        // copied and released once.
        unsafe {
            let result = self.bindings().read.call((self.as_raw(), path.as_ptr()));
            let bytes = open(self.bindings(), result)?;
            Ok(take_bytes(self.bindings(), bytes))
        }
    }

    /// Writes `data` to `path`, replacing any existing object.
    ///
    /// Writing zero bytes is only supported by backends that report
    /// `write_can_empty`.
    pub fn write(&self, path: &str, data: &[u8]) -> BindResult<()> {
        let path = c_string(path, "path")?;
        let bytes = NativeBytes::borrowed(data);
        // SAFETY: `data` outlives the call and is only read by the library.
        let error = unsafe {
            self.bindings()
                .write
                .call((self.as_raw(), path.as_ptr(), bytes))
        };
        self.check(error)
    }

    /// Deletes `path`. Deleting a missing path succeeds.
    pub fn delete(&self, path: &str) -> BindResult<()> {
        let path = c_string(path, "path")?;
        // SAFETY: live operator handle and path for the duration of the call.
        let error = unsafe { self.bindings().delete.call((self.as_raw(), path.as_ptr())) };
        self.check(error)
    }

    /// Copies the object at `src` to `dest`.
    pub fn copy(&self, src: &str, dest: &str) -> BindResult<()> {
        let src = c_string(src, "source path")?;
        let dest = c_string(dest, "destination path")?;
        // SAFETY: live operator handle and paths for the duration of the call.
        let error = unsafe {
            self.bindings()
                .copy
                .call((self.as_raw(), src.as_ptr(), dest.as_ptr()))
        };
        self.check(error)
    }

    /// Renames the object at `src` to `dest`.
    pub fn rename(&self, src: &str, dest: &str) -> BindResult<()> {
        let src = c_string(src, "source path")?;
        let dest = c_string(dest, "destination path")?;
        // SAFETY: live operator handle and paths for the duration of the call.
        let error = unsafe {
            self.bindings()
                .rename
                .call((self.as_raw(), src.as_ptr(), dest.as_ptr()))
        };
        self.check(error)
    }

    /// Creates the directory `path`, which must end with `/`.
    pub fn create_dir(&self, path: &str) -> BindResult<()> {
        let path = c_string(path, "path")?;
        // SAFETY: live operator handle and path for the duration of the call.
        let error = unsafe { self.bindings().create_dir.call((self.as_raw(), path.as_ptr())) };
        self.check(error)
    }

    /// Lists the entries directly under the directory `path`.
    pub fn list(&self, path: &str) -> BindResult<Lister<'_>> {
        let path = c_string(path, "path")?;
        // SAFETY: live operator handle and path for the duration of the call.
        let raw = unsafe {
            let result = self.bindings().list.call((self.as_raw(), path.as_ptr()));
            open(self.bindings(), result)?
        };
        // SAFETY: a fresh handle from `opendal_operator_list`.
        unsafe { Lister::from_raw(self, raw) }
    }

    /// Opens a streaming reader over the object at `path`.
    pub fn reader(&self, path: &str) -> BindResult<Reader<'_>> {
        let path = c_string(path, "path")?;
        // SAFETY: live operator handle and path for the duration of the call.
        let raw = unsafe {
            let result = self.bindings().reader.call((self.as_raw(), path.as_ptr()));
            open(self.bindings(), result)?
        };
        // SAFETY: a fresh handle from `opendal_operator_reader`.
        unsafe { Reader::from_raw(self, raw) }
    }

    /// Returns information about this operator and its backend.
    pub fn info(&self) -> BindResult<OperatorInfo<'_>> {
        // SAFETY: live operator handle.
        let raw = unsafe { self.bindings().info_new.call((self.as_raw(),)) };
        // SAFETY: a fresh handle from `opendal_operator_info_new`.
        unsafe { OperatorInfo::from_raw(self, raw) }
    }

    /// Releases the native operator.
    ///
    /// Dropping the operator does the same; the release happens once
    /// either way.
    pub fn close(mut self) {
        self.owned.release();
        debug!(scheme = %self.scheme, "closed operator");
    }

    pub(crate) fn registry(&self) -> &Registry {
        self.owned.registry()
    }

    pub(crate) fn bindings(&self) -> &Bindings {
        self.owned.bindings()
    }

    pub(crate) fn as_raw(&self) -> *const RawOperator {
        self.owned.as_const_ptr()
    }

    fn check(&self, error: *mut NativeError) -> BindResult<()> {
        // SAFETY: `error` was just returned by a call on this registry.
        unsafe { check(self.bindings(), error) }
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("scheme", &self.scheme)
            .field("handle", &self.owned)
            .finish()
    }
}
