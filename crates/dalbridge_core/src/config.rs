//! Library loading configuration.

use std::path::{Path, PathBuf};

/// Environment variable consulted when no explicit library path is set.
pub const LIBRARY_ENV: &str = "DALBRIDGE_LIBRARY";

/// Base name of the native library, without platform prefix or suffix.
pub const LIBRARY_NAME: &str = "opendal_c";

/// Configuration for opening the native library.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Explicit path or file name of the library.
    pub path: Option<PathBuf>,

    /// Resolve function symbols on first call rather than at load time
    /// (`RTLD_LAZY`). Unix only.
    pub lazy_binding: bool,

    /// Make the library's symbols available to libraries loaded later
    /// (`RTLD_GLOBAL`). Unix only.
    pub global_symbols: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            path: None,
            lazy_binding: true,
            global_symbols: true,
        }
    }
}

impl LoadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the library path.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets whether symbol binding is deferred to first use.
    #[must_use]
    pub const fn lazy_binding(mut self, value: bool) -> Self {
        self.lazy_binding = value;
        self
    }

    /// Sets whether the library's symbols are made globally available.
    #[must_use]
    pub const fn global_symbols(mut self, value: bool) -> Self {
        self.global_symbols = value;
        self
    }

    /// Returns the path that will be handed to the dynamic loader.
    ///
    /// An explicit path wins, then [`LIBRARY_ENV`], then the platform file
    /// name of [`LIBRARY_NAME`] resolved through the loader's search path.
    pub fn resolve_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match std::env::var_os(LIBRARY_ENV) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => default_file_name(),
        }
    }
}

/// Platform file name of the native library, e.g. `libopendal_c.so`.
pub fn default_file_name() -> PathBuf {
    PathBuf::from(libloading::library_filename(LIBRARY_NAME))
}

/// Returns true if `path` names a location rather than a bare file name
/// for the loader to search.
pub(crate) fn is_explicit_location(path: &Path) -> bool {
    path.is_absolute() || path.parent().is_some_and(|p| !p.as_os_str().is_empty())
}
