//! # dalbridge testkit
//!
//! Test utilities for dalbridge.
//!
//! This crate provides:
//! - An in-process stub of `libopendal_c` with allocation accounting
//! - Fixtures binding a registry to the stub
//! - Property-based test generators using proptest
//! - Golden layout vectors for the ABI types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dalbridge_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_operator() {
//!     with_operator(|op, counters| {
//!         op.write("a.txt", b"hello").unwrap();
//!         assert_eq!(counters.live(NativeKind::Operator), 1);
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod golden;
#[allow(unsafe_code)]
pub mod stub;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stub::{invalid_calls, Counters, NativeKind, StubLibrary};
}

pub use fixtures::*;
pub use generators::*;
pub use golden::*;
pub use stub::{invalid_calls, Counters, NativeKind, ResolutionLog, StubLibrary};
