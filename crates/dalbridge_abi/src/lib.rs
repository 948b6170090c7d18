//! # dalbridge ABI
//!
//! C ABI types shared by the dalbridge binding and anything that
//! implements the native side of it (including the test stub).
//!
//! This crate provides:
//! - The [`Layout`] model and the C placement rules behind it
//! - `#[repr(C)]` byte buffers, error envelopes and result envelopes
//! - Opaque handle types
//! - The raw capability struct
//!
//! Every composite type implements [`AbiType`], declaring the layout it
//! must agree with byte for byte.

#![warn(missing_docs)]

mod buffer;
mod capability;
mod error;
mod layout;
mod result;
mod types;

pub use buffer::NativeBytes;
pub use capability::{FieldKind, NativeCapability, CAPABILITY_FIELDS};
pub use error::{ErrorCode, NativeError};
pub use layout::{align_up, verify, AbiType, Layout, LayoutError, Shape};
pub use result::{
    Envelope, ExistsResult, ListResult, ListerNextResult, OperatorNewResult, ReadResult,
    ReaderReadResult, ReaderResult, StatResult,
};
pub use types::{
    RawEntry, RawLister, RawMetadata, RawOperator, RawOperatorInfo, RawOptions, RawReader,
};
