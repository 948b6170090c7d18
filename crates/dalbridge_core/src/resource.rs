//! Exclusive ownership of native handles.
//!
//! A handle moves `Allocated -> InUse -> Released`. [`Owned`] takes the
//! pointer out of its slot before calling the release operation, so the
//! release runs at most once whether it is triggered by an explicit close
//! or by `Drop`.

use std::fmt;
use std::ptr::NonNull;

use dalbridge_abi::{
    RawEntry, RawLister, RawMetadata, RawOperator, RawOperatorInfo, RawOptions, RawReader,
};
use tracing::debug;

use crate::error::{BindError, BindResult};
use crate::registry::{Bindings, Registry};

/// A kind of native handle and the operation that releases it.
pub(crate) trait ResourceKind {
    /// The opaque native type.
    type Raw;

    /// Name used in logs.
    const NAME: &'static str;

    /// Releases `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must be a live handle of this kind from the library bound in
    /// `bindings`, released exactly once.
    unsafe fn release(bindings: &Bindings, raw: *mut Self::Raw);
}

macro_rules! resource_kind {
    ($kind:ident, $raw:ty, $name:literal, $free:ident) => {
        pub(crate) enum $kind {}

        impl ResourceKind for $kind {
            type Raw = $raw;
            const NAME: &'static str = $name;

            unsafe fn release(bindings: &Bindings, raw: *mut $raw) {
                bindings.$free.call((raw,));
            }
        }
    };
}

resource_kind!(OptionsKind, RawOptions, "operator options", options_free);
resource_kind!(OperatorKind, RawOperator, "operator", operator_free);
resource_kind!(InfoKind, RawOperatorInfo, "operator info", info_free);
resource_kind!(MetadataKind, RawMetadata, "metadata", metadata_free);
resource_kind!(ListerKind, RawLister, "lister", lister_free);
resource_kind!(EntryKind, RawEntry, "entry", entry_free);
resource_kind!(ReaderKind, RawReader, "reader", reader_free);

/// Owns one native handle of kind `K`.
///
/// Holds a registry clone, so the library stays loaded for as long as the
/// handle does.
pub(crate) struct Owned<K: ResourceKind> {
    raw: Option<NonNull<K::Raw>>,
    registry: Registry,
}

impl<K: ResourceKind> Owned<K> {
    /// Takes ownership of a handle returned by `operation`.
    ///
    /// A null handle is reported as [`BindError::NullHandle`].
    ///
    /// # Safety
    ///
    /// A non-null `raw` must be a live handle of kind `K`, allocated by the
    /// library behind `registry`, that nothing else will release.
    pub(crate) unsafe fn new(
        registry: &Registry,
        raw: *mut K::Raw,
        operation: &'static str,
    ) -> BindResult<Self> {
        let raw = NonNull::new(raw).ok_or(BindError::NullHandle { operation })?;
        Ok(Self {
            raw: Some(raw),
            registry: registry.clone(),
        })
    }

    /// The handle, for passing to native operations.
    ///
    /// Null once released.
    pub(crate) fn as_ptr(&self) -> *mut K::Raw {
        self.raw.map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    pub(crate) fn as_const_ptr(&self) -> *const K::Raw {
        self.as_ptr().cast_const()
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn bindings(&self) -> &Bindings {
        self.registry.bindings()
    }

    /// Releases the handle if it is still held.
    pub(crate) fn release(&mut self) {
        if let Some(raw) = self.raw.take() {
            debug!(kind = K::NAME, "releasing native handle");
            // SAFETY: `take` guarantees this is the only release of a
            // handle we exclusively own.
            unsafe { K::release(self.registry.bindings(), raw.as_ptr()) };
        }
    }
}

impl<K: ResourceKind> Drop for Owned<K> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<K: ResourceKind> fmt::Debug for Owned<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owned")
            .field("kind", &K::NAME)
            .field("raw", &self.raw)
            .finish()
    }
}
