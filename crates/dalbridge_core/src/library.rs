//! Loading the native library.

use std::ffi::{c_void, CString};
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{is_explicit_location, LoadConfig};
use crate::error::{BindError, BindResult};
use crate::symbol::{Symbol, SymbolSource};

/// An open native library.
///
/// The root resource: every callable bound from it borrows its code, so it
/// is released last. Once moved into a [`crate::Registry`] the registry
/// decides when that is.
pub struct LibraryHandle {
    path: PathBuf,
    library: libloading::Library,
}

impl LibraryHandle {
    /// Opens the library at `path` with default flags.
    ///
    /// A bare file name is searched for by the platform loader.
    pub fn open(path: impl AsRef<Path>) -> BindResult<Self> {
        Self::open_with(&LoadConfig::new().path(path.as_ref()))
    }

    /// Opens the library described by `config`.
    pub fn open_with(config: &LoadConfig) -> BindResult<Self> {
        let path = config.resolve_path();

        if is_explicit_location(&path) && !path.exists() {
            warn!(path = %path.display(), "native library not found");
            return Err(BindError::LibraryNotFound { path });
        }

        // SAFETY: loading runs the library's initializers. The caller picks
        // which library that is.
        let library = unsafe { load(&path, config) }.map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to load native library");
            BindError::load(&path, e.to_string())
        })?;

        info!(path = %path.display(), "opened native library");
        Ok(Self { path, library })
    }

    /// The path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unloads the library, reporting loader errors.
    ///
    /// Dropping the handle unloads it too, ignoring errors.
    pub fn close(self) -> BindResult<()> {
        let path = self.path;
        self.library
            .close()
            .map_err(|e| BindError::load(&path, e.to_string()))?;
        debug!(path = %path.display(), "closed native library");
        Ok(())
    }
}

#[cfg(unix)]
unsafe fn load(path: &Path, config: &LoadConfig) -> Result<libloading::Library, libloading::Error> {
    use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_LAZY, RTLD_LOCAL, RTLD_NOW};

    let binding = if config.lazy_binding { RTLD_LAZY } else { RTLD_NOW };
    let visibility = if config.global_symbols {
        RTLD_GLOBAL
    } else {
        RTLD_LOCAL
    };
    Library::open(Some(path), binding | visibility).map(Into::into)
}

#[cfg(not(unix))]
unsafe fn load(path: &Path, _config: &LoadConfig) -> Result<libloading::Library, libloading::Error> {
    libloading::Library::new(path)
}

impl SymbolSource for LibraryHandle {
    fn resolve(&self, name: &str) -> BindResult<Symbol> {
        let c_name = CString::new(name)
            .map_err(|_| BindError::symbol(name, "symbol name contains a NUL byte"))?;

        // SAFETY: the address is only ever called through a descriptor that
        // was checked against the declared signature.
        let symbol: libloading::Symbol<'_, *const c_void> =
            unsafe { self.library.get(c_name.as_bytes_with_nul()) }.map_err(|e| {
                BindError::symbol(name, format!("not found in {}: {e}", self.path.display()))
            })?;

        Symbol::new(name, *symbol)
    }

    fn origin(&self) -> String {
        self.path.display().to_string()
    }
}

impl fmt::Debug for LibraryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libmissing.so");

        let err = LibraryHandle::open(&path).unwrap_err();
        match err {
            BindError::LibraryNotFound { path: reported } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn not_a_shared_object() {
        let mut file = tempfile::Builder::new()
            .prefix("libgarbage")
            .suffix(".so")
            .tempfile()
            .unwrap();
        file.write_all(b"definitely not an ELF, Mach-O or PE image")
            .unwrap();
        file.flush().unwrap();

        let err = LibraryHandle::open(file.path()).unwrap_err();
        assert!(matches!(err, BindError::Load { .. }), "got {err}");
        assert!(err.is_fatal());
    }

    #[test]
    fn unknown_bare_name_reaches_loader() {
        let err = LibraryHandle::open("libdalbridge_does_not_exist_anywhere.so").unwrap_err();
        assert!(matches!(err, BindError::Load { .. }), "got {err}");
    }
}
