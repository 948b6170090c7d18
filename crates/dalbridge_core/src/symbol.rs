//! Symbol resolution.

use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{BindError, BindResult};

/// The address of a resolved entry point.
///
/// Never null. Only meaningful while the library it came from stays
/// loaded.
#[derive(Clone, PartialEq, Eq)]
pub struct Symbol {
    name: String,
    address: NonNull<c_void>,
}

// Only an address. Calls go through `BoundCallable::call`.
unsafe impl Send for Symbol {}
unsafe impl Sync for Symbol {}

impl Symbol {
    /// Wraps a resolved address, failing closed on null.
    pub fn new(name: impl Into<String>, address: *const c_void) -> BindResult<Self> {
        let name = name.into();
        match NonNull::new(address.cast_mut()) {
            Some(address) => Ok(Self { name, address }),
            None => Err(BindError::symbol(name, "resolved to a null address")),
        }
    }

    /// The symbol name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entry point address.
    pub fn address(&self) -> *const c_void {
        self.address.as_ptr()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish()
    }
}

/// Anything that can look up entry points by name.
///
/// Implemented by [`crate::LibraryHandle`] for real shared objects. A
/// source is moved into the registry and kept alive until every callable
/// bound from it is gone.
pub trait SymbolSource: Send + Sync {
    /// Resolves `name` to an entry point.
    ///
    /// Fails with [`BindError::Symbol`] when the name is missing or
    /// resolves to null.
    fn resolve(&self, name: &str) -> BindResult<Symbol>;

    /// A short description of where symbols come from, for logs.
    fn origin(&self) -> String {
        String::from("<anonymous>")
    }
}

impl<S: SymbolSource + ?Sized> SymbolSource for Box<S> {
    fn resolve(&self, name: &str) -> BindResult<Symbol> {
        (**self).resolve(name)
    }

    fn origin(&self) -> String {
        (**self).origin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn entry() {}

    #[test]
    fn null_address_fails_closed() {
        let err = Symbol::new("opendal_operator_new", std::ptr::null()).unwrap_err();
        match err {
            BindError::Symbol { name, .. } => assert_eq!(name, "opendal_operator_new"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolved_address_is_kept() {
        let address = entry as *const c_void;
        let symbol = Symbol::new("entry", address).unwrap();
        assert_eq!(symbol.name(), "entry");
        assert_eq!(symbol.address(), address);
    }
}
