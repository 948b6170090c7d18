//! Marshaling conventions for values crossing the native boundary.
//!
//! Everything coming back from the library is copied into Rust-owned
//! values before the native storage is released, and every native
//! allocation is released exactly once.

use std::ffi::{c_char, CStr, CString};

use dalbridge_abi::{Envelope, NativeBytes, NativeError};

use crate::error::{BindError, BindResult, NativeFailure};
use crate::registry::Bindings;

/// Converts a string for passing to the library.
///
/// Fails before any native call if `value` contains a NUL byte.
pub(crate) fn c_string(value: &str, what: &str) -> BindResult<CString> {
    CString::new(value).map_err(|e| {
        BindError::marshal(format!(
            "{what} contains a NUL byte at position {}",
            e.nul_position()
        ))
    })
}

/// Copies a NUL-terminated string returned by the library.
///
/// The native storage is not released; strings handed out by accessors
/// belong to the handle they were read from.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays
/// valid for the duration of this call.
pub(crate) unsafe fn copy_c_str(ptr: *const c_char, what: &str) -> BindResult<String> {
    if ptr.is_null() {
        return Err(BindError::marshal(format!("{what} is a null string")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|e| BindError::marshal(format!("{what} is not valid UTF-8: {e}")))
}

/// Decodes a native boolean. Only exactly 1 is true.
pub(crate) const fn flag(value: u8) -> bool {
    value == 1
}

/// Decodes and releases an error envelope.
///
/// A null envelope means success. Otherwise the code and message are
/// copied and the envelope goes back through `opendal_error_free` once.
/// The code always survives: bytes in the message that are not UTF-8 are
/// replaced rather than failing the decode.
///
/// # Safety
///
/// `error` must be null or an envelope from the library bound in
/// `bindings` that has not been released yet.
pub(crate) unsafe fn check(bindings: &Bindings, error: *mut NativeError) -> BindResult<()> {
    if error.is_null() {
        return Ok(());
    }

    let NativeError { code, message } = *error;
    let message = String::from_utf8_lossy(&message.to_vec()).into_owned();
    bindings.error_free.call((error,));

    Err(BindError::Native(NativeFailure::new(code, message)))
}

/// Opens a result envelope: the error slot is checked first and the
/// payload is only read when it is empty.
///
/// # Safety
///
/// As for [`check`].
pub(crate) unsafe fn open<E: Envelope>(bindings: &Bindings, envelope: E) -> BindResult<E::Payload> {
    check(bindings, envelope.error())?;
    Ok(envelope.payload())
}

/// Copies and releases a byte buffer owned by the library.
///
/// A null buffer decodes as empty.
///
/// # Safety
///
/// `bytes` must be null or a buffer from the library bound in `bindings`
/// that has not been released yet.
pub(crate) unsafe fn take_bytes(bindings: &Bindings, bytes: *mut NativeBytes) -> Vec<u8> {
    if bytes.is_null() {
        return Vec::new();
    }
    let data = (*bytes).to_vec();
    bindings.bytes_free.call((bytes,));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn nul_in_string_is_rejected() {
        let err = c_string("a\0b", "path").unwrap_err();
        match err {
            BindError::Marshal { message } => {
                assert!(message.contains("path"));
                assert!(message.contains("position 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn copies_c_strings() {
        let owned = CString::new("dir/file.txt").unwrap();
        let copied = unsafe { copy_c_str(owned.as_ptr(), "path") }.unwrap();
        drop(owned);
        assert_eq!(copied, "dir/file.txt");
    }

    #[test]
    fn null_string_is_an_error() {
        let err = unsafe { copy_c_str(std::ptr::null(), "entry name") }.unwrap_err();
        assert!(matches!(err, BindError::Marshal { .. }));
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let bytes = [0xFFu8, 0xFE, 0x00];
        let err = unsafe { copy_c_str(bytes.as_ptr().cast(), "scheme") }.unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn flags_are_exact() {
        assert!(!flag(0));
        assert!(flag(1));
        assert!(!flag(2));
        assert!(!flag(255));
    }

    proptest! {
        #[test]
        fn strings_without_nul_round_trip(value in "[^\\x00]{0,64}") {
            let c = c_string(&value, "value").unwrap();
            let back = unsafe { copy_c_str(c.as_ptr(), "value") }.unwrap();
            prop_assert_eq!(back, value);
        }

        #[test]
        fn flag_is_true_only_for_one(value in any::<u8>()) {
            prop_assert_eq!(flag(value), value == 1);
        }
    }
}
