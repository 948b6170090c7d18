//! # dalbridge core
//!
//! Runtime binding to the OpenDAL C library (`libopendal_c`).
//!
//! The library is loaded at runtime, every entry point is resolved by name
//! and described by a libffi call interface, and the opaque handles it
//! hands out are wrapped in owners that release them exactly once.
//!
//! This crate provides:
//! - [`LibraryHandle`] and [`LoadConfig`] for opening the library
//! - [`SymbolSource`], [`CallDescriptor`] and [`BoundCallable`], the
//!   generic call-by-symbol machinery
//! - [`Registry`], every native operation bound once in a fixed order
//! - [`Operator`] and the handles obtained through it
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dalbridge_core::{LoadConfig, Operator, OperatorOptions, Registry};
//!
//! let registry = Registry::load(&LoadConfig::default())?;
//! let op = Operator::new(&registry, "memory", &OperatorOptions::new())?;
//! op.write("hello.txt", b"world")?;
//! assert_eq!(op.read("hello.txt")?, b"world");
//! ```

#![warn(missing_docs)]

mod callable;
mod config;
mod descriptor;
mod error;
mod info;
mod library;
mod lister;
mod marshal;
mod metadata;
mod operator;
mod options;
mod reader;
mod registry;
mod resource;
mod symbol;

pub use callable::{AbiArgs, BoundCallable};
pub use config::{default_file_name, LoadConfig, LIBRARY_ENV, LIBRARY_NAME};
pub use descriptor::CallDescriptor;
pub use error::{BindError, BindResult, NativeFailure};
pub use info::{Capability, OperatorInfo};
pub use library::LibraryHandle;
pub use lister::{Entry, Lister};
pub use metadata::Metadata;
pub use operator::Operator;
pub use options::OperatorOptions;
pub use reader::Reader;
pub use registry::{operation, Operation, Registry, Role, OPERATIONS};
pub use symbol::{Symbol, SymbolSource};

pub use dalbridge_abi::{ErrorCode, Layout};
