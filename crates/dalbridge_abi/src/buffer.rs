//! Byte buffers crossing the ABI.

use crate::layout::{AbiType, Layout};

/// A contiguous byte range: `struct { uint8_t *data; uint64_t len; }`.
///
/// An empty buffer is always a null pointer with length 0. Buffers
/// returned by the native library are owned by it and go back through
/// `opendal_bytes_free`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeBytes {
    /// Pointer to the first byte, null when empty.
    pub data: *mut u8,
    /// Length in bytes.
    pub len: u64,
}

impl NativeBytes {
    /// Creates an empty buffer.
    pub const fn empty() -> Self {
        Self {
            data: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Describes a borrowed slice for the duration of one call.
    ///
    /// The native side only reads through the pointer; the slice must
    /// outlive the call it is passed to.
    pub fn borrowed(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        Self {
            data: bytes.as_ptr().cast_mut(),
            len: bytes.len() as u64,
        }
    }

    /// Hands ownership of `bytes` to a raw buffer.
    ///
    /// Release with [`NativeBytes::reclaim`].
    pub fn leak(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        let boxed = bytes.into_boxed_slice();
        let len = boxed.len() as u64;
        let data = Box::into_raw(boxed).cast::<u8>();
        Self { data, len }
    }

    /// Frees a buffer created by [`NativeBytes::leak`].
    ///
    /// # Safety
    ///
    /// The buffer must come from `leak` and must not be reclaimed twice.
    pub unsafe fn reclaim(self) {
        if self.data.is_null() {
            return;
        }
        let slice = std::ptr::slice_from_raw_parts_mut(self.data, self.len as usize);
        drop(Box::from_raw(slice));
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0 || self.data.is_null()
    }

    /// Copies the described bytes into a fresh vector.
    ///
    /// Never reads past `len`; an empty or null buffer yields an empty
    /// vector.
    ///
    /// # Safety
    ///
    /// `data` must be valid for reads of `len` bytes.
    pub unsafe fn to_vec(&self) -> Vec<u8> {
        if self.is_empty() {
            return Vec::new();
        }
        std::slice::from_raw_parts(self.data, self.len as usize).to_vec()
    }
}

impl Default for NativeBytes {
    fn default() -> Self {
        Self::empty()
    }
}

unsafe impl AbiType for NativeBytes {
    fn layout() -> Layout {
        Layout::structure([Layout::Pointer, Layout::U64])
    }
}
