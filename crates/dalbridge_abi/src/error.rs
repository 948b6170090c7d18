//! Error envelopes and error codes.

use std::fmt;

use crate::buffer::NativeBytes;
use crate::layout::{AbiType, Layout};

/// The native error envelope: `struct { int32_t code; opendal_bytes message; }`.
///
/// Always passed by pointer; a null pointer means "no error". Every
/// non-null envelope must go back through `opendal_error_free` once.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NativeError {
    /// Raw error code, see [`ErrorCode`].
    pub code: i32,
    /// UTF-8 message owned by the envelope.
    pub message: NativeBytes,
}

unsafe impl AbiType for NativeError {
    fn layout() -> Layout {
        Layout::structure([Layout::I32, NativeBytes::layout()])
    }
}

/// Error code reported by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The backend failed in a way it cannot describe further.
    Unexpected,
    /// The backend does not support the operation.
    Unsupported,
    /// The operator configuration is invalid.
    ConfigInvalid,
    /// The path does not exist.
    NotFound,
    /// The caller lacks permission for the path.
    PermissionDenied,
    /// The path is a directory.
    IsADirectory,
    /// The path is not a directory.
    NotADirectory,
    /// The path already exists.
    AlreadyExists,
    /// The backend asked the caller to slow down.
    RateLimited,
    /// Source and destination are the same file.
    IsSameFile,
    /// A conditional request did not match.
    ConditionNotMatch,
    /// The requested byte range cannot be satisfied.
    RangeNotSatisfied,
    /// A code this binding does not know about.
    Other(i32),
}

impl ErrorCode {
    /// Returns the raw integer code.
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::Unexpected => 0,
            ErrorCode::Unsupported => 1,
            ErrorCode::ConfigInvalid => 2,
            ErrorCode::NotFound => 3,
            ErrorCode::PermissionDenied => 4,
            ErrorCode::IsADirectory => 5,
            ErrorCode::NotADirectory => 6,
            ErrorCode::AlreadyExists => 7,
            ErrorCode::RateLimited => 8,
            ErrorCode::IsSameFile => 9,
            ErrorCode::ConditionNotMatch => 10,
            ErrorCode::RangeNotSatisfied => 11,
            ErrorCode::Other(code) => code,
        }
    }

    /// Returns the stable name of this code.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Unexpected => "Unexpected",
            ErrorCode::Unsupported => "Unsupported",
            ErrorCode::ConfigInvalid => "ConfigInvalid",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::PermissionDenied => "PermissionDenied",
            ErrorCode::IsADirectory => "IsADirectory",
            ErrorCode::NotADirectory => "NotADirectory",
            ErrorCode::AlreadyExists => "AlreadyExists",
            ErrorCode::RateLimited => "RateLimited",
            ErrorCode::IsSameFile => "IsSameFile",
            ErrorCode::ConditionNotMatch => "ConditionNotMatch",
            ErrorCode::RangeNotSatisfied => "RangeNotSatisfied",
            ErrorCode::Other(_) => "Other",
        }
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        match code {
            0 => ErrorCode::Unexpected,
            1 => ErrorCode::Unsupported,
            2 => ErrorCode::ConfigInvalid,
            3 => ErrorCode::NotFound,
            4 => ErrorCode::PermissionDenied,
            5 => ErrorCode::IsADirectory,
            6 => ErrorCode::NotADirectory,
            7 => ErrorCode::AlreadyExists,
            8 => ErrorCode::RateLimited,
            9 => ErrorCode::IsSameFile,
            10 => ErrorCode::ConditionNotMatch,
            11 => ErrorCode::RangeNotSatisfied,
            other => ErrorCode::Other(other),
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Other(code) => write!(f, "Other({code})"),
            known => f.write_str(known.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::verify;
    use std::mem::offset_of;

    #[test]
    fn layout_matches_repr_c() {
        verify::<NativeError>().unwrap();
        let shape = NativeError::layout().shape().unwrap();
        assert_eq!(
            shape.offsets,
            vec![offset_of!(NativeError, code), offset_of!(NativeError, message)]
        );
    }

    #[test]
    fn code_conversion() {
        let code = ErrorCode::from(3);
        assert_eq!(code, ErrorCode::NotFound);
        assert_eq!(i32::from(code), 3);

        for raw in 0..12 {
            assert_eq!(ErrorCode::from(raw).code(), raw);
        }
    }

    #[test]
    fn unknown_codes_are_preserved() {
        let code = ErrorCode::from(42);
        assert_eq!(code, ErrorCode::Other(42));
        assert_eq!(code.code(), 42);
        assert_eq!(code.to_string(), "Other(42)");
    }
}
