//! Object metadata.

use std::fmt;
use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dalbridge_abi::RawMetadata;

use crate::error::BindResult;
use crate::marshal::flag;
use crate::operator::Operator;
use crate::resource::{MetadataKind, Owned};

/// Metadata of one object, as returned by [`Operator::stat`].
pub struct Metadata<'op> {
    owned: Owned<MetadataKind>,
    _operator: PhantomData<&'op Operator>,
}

// Accessors only read the native metadata.
unsafe impl Send for Metadata<'_> {}
unsafe impl Sync for Metadata<'_> {}

impl<'op> Metadata<'op> {
    /// # Safety
    ///
    /// A non-null `raw` must be a fresh metadata handle from `operator`'s
    /// library.
    pub(crate) unsafe fn from_raw(operator: &'op Operator, raw: *mut RawMetadata) -> BindResult<Self> {
        Ok(Self {
            owned: Owned::new(operator.registry(), raw, "opendal_operator_stat")?,
            _operator: PhantomData,
        })
    }

    /// Size of the object in bytes.
    pub fn content_length(&self) -> u64 {
        // SAFETY: live metadata handle.
        unsafe {
            self.owned
                .bindings()
                .metadata_content_length
                .call((self.owned.as_const_ptr(),))
        }
    }

    /// Returns true if the object is a file.
    pub fn is_file(&self) -> bool {
        // SAFETY: live metadata handle.
        flag(unsafe { self.owned.bindings().metadata_is_file.call((self.owned.as_const_ptr(),)) })
    }

    /// Returns true if the object is a directory.
    pub fn is_dir(&self) -> bool {
        // SAFETY: live metadata handle.
        flag(unsafe { self.owned.bindings().metadata_is_dir.call((self.owned.as_const_ptr(),)) })
    }

    /// Last modification time in milliseconds since the Unix epoch, if the
    /// backend reports one.
    pub fn last_modified_ms(&self) -> Option<i64> {
        // SAFETY: live metadata handle.
        let ms = unsafe {
            self.owned
                .bindings()
                .metadata_last_modified_ms
                .call((self.owned.as_const_ptr(),))
        };
        (ms >= 0).then_some(ms)
    }

    /// Last modification time, if the backend reports one.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified_ms()
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms.unsigned_abs()))
    }

    /// Releases the native metadata.
    pub fn close(mut self) {
        self.owned.release();
    }
}

impl fmt::Debug for Metadata<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("content_length", &self.content_length())
            .field("is_file", &self.is_file())
            .field("is_dir", &self.is_dir())
            .field("last_modified_ms", &self.last_modified_ms())
            .finish()
    }
}
