//! Opaque handle types.
//!
//! These are only ever used behind pointers. Never dereference or modify
//! them directly.

/// An opaque operator handle (`opendal_operator`).
#[repr(C)]
pub struct RawOperator {
    _private: [u8; 0],
}

/// An opaque operator options handle (`opendal_operator_options`).
#[repr(C)]
pub struct RawOptions {
    _private: [u8; 0],
}

/// An opaque operator info handle (`opendal_operator_info`).
#[repr(C)]
pub struct RawOperatorInfo {
    _private: [u8; 0],
}

/// An opaque metadata handle (`opendal_metadata`).
#[repr(C)]
pub struct RawMetadata {
    _private: [u8; 0],
}

/// An opaque directory lister handle (`opendal_lister`).
#[repr(C)]
pub struct RawLister {
    _private: [u8; 0],
}

/// An opaque directory entry handle (`opendal_entry`).
#[repr(C)]
pub struct RawEntry {
    _private: [u8; 0],
}

/// An opaque stream reader handle (`opendal_reader`).
#[repr(C)]
pub struct RawReader {
    _private: [u8; 0],
}
