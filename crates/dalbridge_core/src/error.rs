//! Error types for the binding layer.

use std::fmt;
use std::path::{Path, PathBuf};

use dalbridge_abi::{ErrorCode, LayoutError};
use thiserror::Error;

/// Result type for binding operations.
pub type BindResult<T> = Result<T, BindError>;

/// Errors that can occur while loading, binding or calling into the
/// native library.
#[derive(Debug, Error)]
pub enum BindError {
    /// An explicit library path does not exist.
    #[error("native library not found: {}", path.display())]
    LibraryNotFound {
        /// The path that was tried.
        path: PathBuf,
    },

    /// The dynamic loader rejected the library.
    #[error("failed to load native library {}: {message}", path.display())]
    Load {
        /// The path handed to the loader.
        path: PathBuf,
        /// The loader's message.
        message: String,
    },

    /// A required entry point could not be resolved.
    #[error("symbol {name} unavailable: {message}")]
    Symbol {
        /// The symbol that was requested.
        name: String,
        /// Why resolution failed.
        message: String,
    },

    /// A call shape or struct layout was rejected.
    #[error("invalid layout for {context}: {message}")]
    Layout {
        /// What was being described.
        context: String,
        /// Description of the problem.
        message: String,
    },

    /// An allocating operation was bound before one of its release
    /// operations.
    #[error("{symbol} bound before its release operation {missing}")]
    BindOrder {
        /// The allocating operation.
        symbol: &'static str,
        /// The release operation that was not yet bound.
        missing: &'static str,
    },

    /// A value cannot be represented on the other side of the ABI.
    #[error("cannot marshal value: {message}")]
    Marshal {
        /// Description of the value.
        message: String,
    },

    /// The native library reported an error.
    #[error(transparent)]
    Native(#[from] NativeFailure),

    /// A native allocator returned null without reporting an error.
    #[error("{operation} returned a null handle without an error")]
    NullHandle {
        /// The operation that returned null.
        operation: &'static str,
    },
}

impl BindError {
    /// Creates a load error.
    pub fn load(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Creates a symbol resolution error.
    pub fn symbol(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Symbol {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a layout error.
    pub fn layout(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Layout {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Creates a marshaling error.
    pub fn marshal(message: impl Into<String>) -> Self {
        Self::Marshal {
            message: message.into(),
        }
    }

    /// Returns true for errors that make the library or registry unusable.
    ///
    /// Everything else is scoped to a single call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LibraryNotFound { .. }
                | Self::Load { .. }
                | Self::Symbol { .. }
                | Self::Layout { .. }
                | Self::BindOrder { .. }
        )
    }

    /// Returns the native failure, if this error came from the library.
    pub fn native(&self) -> Option<&NativeFailure> {
        match self {
            Self::Native(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<LayoutError> for BindError {
    fn from(err: LayoutError) -> Self {
        Self::layout("type", err)
    }
}

/// An error reported by the native library, already copied out of its
/// envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct NativeFailure {
    code: ErrorCode,
    message: String,
}

impl NativeFailure {
    /// Creates a failure from a decoded envelope.
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The raw integer code as reported.
    pub fn raw_code(&self) -> i32 {
        self.code.code()
    }

    /// The message as reported.
    pub fn message(&self) -> &str {
        &self.message
    }
}
