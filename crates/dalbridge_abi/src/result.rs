//! Result envelopes: a payload slot paired with an error slot.
//!
//! When the error slot is non-null the payload slot is unspecified and
//! must not be read. When it is null the payload is authoritative; a null
//! payload with a null error is the end-of-iteration signal for
//! `opendal_lister_next`.

use crate::buffer::NativeBytes;
use crate::error::NativeError;
use crate::layout::{AbiType, Layout};
use crate::types::{RawEntry, RawLister, RawMetadata, RawOperator, RawReader};

/// A `{payload, error*}` pair returned by value from a fallible call.
pub trait Envelope: AbiType {
    /// The payload carried on success.
    type Payload: Copy;

    /// The error slot.
    fn error(&self) -> *mut NativeError;

    /// The payload slot. Only meaningful when [`Envelope::error`] is null.
    fn payload(&self) -> Self::Payload;
}

macro_rules! envelope {
    (
        $(#[$meta:meta])*
        $name:ident { $field:ident: $payload:ty, $payload_layout:expr }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            #[doc = concat!("Payload slot (`", stringify!($field), "`).")]
            pub $field: $payload,
            /// Error slot, null on success.
            pub error: *mut NativeError,
        }

        unsafe impl AbiType for $name {
            fn layout() -> Layout {
                Layout::structure([$payload_layout, Layout::Pointer])
            }
        }

        impl Envelope for $name {
            type Payload = $payload;

            fn error(&self) -> *mut NativeError {
                self.error
            }

            fn payload(&self) -> $payload {
                self.$field
            }
        }
    };
}

envelope! {
    /// Returned by `opendal_operator_new`.
    OperatorNewResult { op: *mut RawOperator, Layout::Pointer }
}

envelope! {
    /// Returned by `opendal_operator_read`; the buffer is owned by the
    /// native side and goes back through `opendal_bytes_free`.
    ReadResult { data: *mut NativeBytes, Layout::Pointer }
}

envelope! {
    /// Returned by `opendal_operator_stat`.
    StatResult { meta: *mut RawMetadata, Layout::Pointer }
}

envelope! {
    /// Returned by `opendal_operator_list`.
    ListResult { lister: *mut RawLister, Layout::Pointer }
}

envelope! {
    /// Returned by `opendal_lister_next`. Both slots null means the
    /// listing is exhausted.
    ListerNextResult { entry: *mut RawEntry, Layout::Pointer }
}

envelope! {
    /// Returned by `opendal_operator_is_exist`; `exists` is 1 for true.
    ExistsResult { exists: u8, Layout::U8 }
}

envelope! {
    /// Returned by `opendal_operator_reader`.
    ReaderResult { reader: *mut RawReader, Layout::Pointer }
}

envelope! {
    /// Returned by `opendal_reader_read`; `size` is the number of bytes
    /// written into the caller's buffer, 0 at end of stream.
    ReaderReadResult { size: usize, Layout::Usize }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::verify;
    use std::mem::{offset_of, size_of};

    #[test]
    fn envelopes_match_repr_c() {
        verify::<OperatorNewResult>().unwrap();
        verify::<ReadResult>().unwrap();
        verify::<StatResult>().unwrap();
        verify::<ListResult>().unwrap();
        verify::<ListerNextResult>().unwrap();
        verify::<ExistsResult>().unwrap();
        verify::<ReaderResult>().unwrap();
        verify::<ReaderReadResult>().unwrap();
    }

    #[test]
    fn exists_result_pads_flag() {
        let shape = ExistsResult::layout().shape().unwrap();
        assert_eq!(shape.offsets, vec![0, offset_of!(ExistsResult, error)]);
        assert_eq!(shape.offsets[1], size_of::<usize>());
    }

    #[test]
    fn payload_and_error_slots() {
        let result = ExistsResult {
            exists: 1,
            error: std::ptr::null_mut(),
        };
        assert_eq!(result.payload(), 1);
        assert!(result.error().is_null());
    }
}
