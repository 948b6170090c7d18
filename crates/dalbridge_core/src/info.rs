//! Operator information and capabilities.

use std::fmt;
use std::marker::PhantomData;

use dalbridge_abi::{NativeCapability, RawOperatorInfo};

use crate::error::BindResult;
use crate::marshal::{copy_c_str, flag};
use crate::operator::Operator;
use crate::resource::{InfoKind, Owned};

/// What a backend supports.
///
/// Decoded from the native capability struct by value. A flag is only
/// true when the native value is exactly 1; limits are 0 when the backend
/// sets none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs, clippy::struct_excessive_bools)]
pub struct Capability {
    pub stat: bool,
    pub stat_with_if_match: bool,
    pub stat_with_if_none_match: bool,
    pub read: bool,
    pub read_with_if_match: bool,
    pub read_with_if_none_match: bool,
    pub read_with_override_cache_control: bool,
    pub read_with_override_content_disposition: bool,
    pub read_with_override_content_type: bool,
    pub write: bool,
    pub write_can_multi: bool,
    pub write_can_empty: bool,
    pub write_can_append: bool,
    pub write_with_content_type: bool,
    pub write_with_content_disposition: bool,
    pub write_with_cache_control: bool,
    pub write_multi_max_size: usize,
    pub write_multi_min_size: usize,
    pub write_multi_align_size: usize,
    pub write_total_max_size: usize,
    pub create_dir: bool,
    pub delete: bool,
    pub copy: bool,
    pub rename: bool,
    pub list: bool,
    pub list_with_limit: bool,
    pub list_with_start_after: bool,
    pub list_with_recursive: bool,
    pub presign: bool,
    pub presign_read: bool,
    pub presign_stat: bool,
    pub presign_write: bool,
    pub batch: bool,
    pub batch_delete: bool,
    pub batch_max_operations: usize,
    pub blocking: bool,
}

impl From<NativeCapability> for Capability {
    fn from(raw: NativeCapability) -> Self {
        Self {
            stat: flag(raw.stat),
            stat_with_if_match: flag(raw.stat_with_if_match),
            stat_with_if_none_match: flag(raw.stat_with_if_none_match),
            read: flag(raw.read),
            read_with_if_match: flag(raw.read_with_if_match),
            read_with_if_none_match: flag(raw.read_with_if_none_match),
            read_with_override_cache_control: flag(raw.read_with_override_cache_control),
            read_with_override_content_disposition: flag(
                raw.read_with_override_content_disposition,
            ),
            read_with_override_content_type: flag(raw.read_with_override_content_type),
            write: flag(raw.write),
            write_can_multi: flag(raw.write_can_multi),
            write_can_empty: flag(raw.write_can_empty),
            write_can_append: flag(raw.write_can_append),
            write_with_content_type: flag(raw.write_with_content_type),
            write_with_content_disposition: flag(raw.write_with_content_disposition),
            write_with_cache_control: flag(raw.write_with_cache_control),
            write_multi_max_size: raw.write_multi_max_size,
            write_multi_min_size: raw.write_multi_min_size,
            write_multi_align_size: raw.write_multi_align_size,
            write_total_max_size: raw.write_total_max_size,
            create_dir: flag(raw.create_dir),
            delete: flag(raw.delete),
            copy: flag(raw.copy),
            rename: flag(raw.rename),
            list: flag(raw.list),
            list_with_limit: flag(raw.list_with_limit),
            list_with_start_after: flag(raw.list_with_start_after),
            list_with_recursive: flag(raw.list_with_recursive),
            presign: flag(raw.presign),
            presign_read: flag(raw.presign_read),
            presign_stat: flag(raw.presign_stat),
            presign_write: flag(raw.presign_write),
            batch: flag(raw.batch),
            batch_delete: flag(raw.batch_delete),
            batch_max_operations: raw.batch_max_operations,
            blocking: flag(raw.blocking),
        }
    }
}

/// Information about an operator: its scheme, root, name and
/// capabilities.
pub struct OperatorInfo<'op> {
    owned: Owned<InfoKind>,
    _operator: PhantomData<&'op Operator>,
}

// Accessors only read the native info.
unsafe impl Send for OperatorInfo<'_> {}
unsafe impl Sync for OperatorInfo<'_> {}

impl<'op> OperatorInfo<'op> {
    /// # Safety
    ///
    /// A non-null `raw` must be a fresh info handle from `operator`'s
    /// library.
    pub(crate) unsafe fn from_raw(
        operator: &'op Operator,
        raw: *mut RawOperatorInfo,
    ) -> BindResult<Self> {
        Ok(Self {
            owned: Owned::new(operator.registry(), raw, "opendal_operator_info_new")?,
            _operator: PhantomData,
        })
    }

    /// The backend scheme, e.g. `"memory"`.
    pub fn scheme(&self) -> BindResult<String> {
        // SAFETY: live info handle; the string belongs to it.
        unsafe {
            let ptr = self.owned.bindings().info_scheme.call((self.owned.as_const_ptr(),));
            copy_c_str(ptr, "scheme")
        }
    }

    /// The operator's root path.
    pub fn root(&self) -> BindResult<String> {
        // SAFETY: live info handle; the string belongs to it.
        unsafe {
            let ptr = self.owned.bindings().info_root.call((self.owned.as_const_ptr(),));
            copy_c_str(ptr, "root")
        }
    }

    /// The operator's name, e.g. a bucket name.
    pub fn name(&self) -> BindResult<String> {
        // SAFETY: live info handle; the string belongs to it.
        unsafe {
            let ptr = self.owned.bindings().info_name.call((self.owned.as_const_ptr(),));
            copy_c_str(ptr, "name")
        }
    }

    /// Everything the operator supports, including emulated features.
    pub fn full_capability(&self) -> Capability {
        // SAFETY: live info handle; the struct is returned by value.
        let raw = unsafe {
            self.owned
                .bindings()
                .info_full_capability
                .call((self.owned.as_const_ptr(),))
        };
        Capability::from(raw)
    }

    /// What the backend supports natively.
    pub fn native_capability(&self) -> Capability {
        // SAFETY: live info handle; the struct is returned by value.
        let raw = unsafe {
            self.owned
                .bindings()
                .info_native_capability
                .call((self.owned.as_const_ptr(),))
        };
        Capability::from(raw)
    }

    /// Releases the native info.
    pub fn close(mut self) {
        self.owned.release();
    }
}

impl fmt::Debug for OperatorInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorInfo")
            .field("scheme", &self.scheme().ok())
            .field("root", &self.root().ok())
            .field("name", &self.name().ok())
            .finish()
    }
}
