//! Operator options.

use std::collections::BTreeMap;
use std::ffi::CString;

use dalbridge_abi::RawOptions;

use crate::error::BindResult;
use crate::marshal::c_string;
use crate::registry::Registry;
use crate::resource::{OptionsKind, Owned};

/// Backend configuration passed to the native library when an operator
/// is created, e.g. `root` for a filesystem backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorOptions {
    values: BTreeMap<String, String>,
}

impl OperatorOptions {
    /// Creates an empty option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Iterates over the options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no options are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OperatorOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}

/// A native option set, filled from [`OperatorOptions`] and released
/// once the operator has been created.
pub(crate) struct NativeOptions {
    owned: Owned<OptionsKind>,
}

impl NativeOptions {
    pub(crate) fn new(registry: &Registry, options: &OperatorOptions) -> BindResult<Self> {
        // Convert everything first so a bad value fails before any
        // native allocation.
        let pairs = options
            .iter()
            .map(|(key, value)| Ok((c_string(key, "option key")?, c_string(value, "option value")?)))
            .collect::<BindResult<Vec<(CString, CString)>>>()?;

        let bindings = registry.bindings();
        // SAFETY: takes no arguments.
        let raw = unsafe { bindings.options_new.call(()) };
        // SAFETY: a fresh handle from `opendal_operator_options_new`.
        let owned = unsafe { Owned::<OptionsKind>::new(registry, raw, "opendal_operator_options_new") }?;

        for (key, value) in &pairs {
            // SAFETY: live handle; both strings outlive the call and are
            // copied by the library.
            unsafe {
                bindings
                    .options_set
                    .call((owned.as_ptr(), key.as_ptr(), value.as_ptr()));
            }
        }
        Ok(Self { owned })
    }

    pub(crate) fn as_ptr(&self) -> *const RawOptions {
        self.owned.as_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_pattern() {
        let options = OperatorOptions::new()
            .with("root", "/tmp")
            .with("name", "scratch")
            .with("root", "/data");

        assert_eq!(options.len(), 2);
        assert_eq!(options.get("root"), Some("/data"));
        assert_eq!(options.get("name"), Some("scratch"));
        assert_eq!(options.get("bucket"), None);
    }

    #[test]
    fn iterates_in_key_order() {
        let options: OperatorOptions = [("b", "2"), ("a", "1"), ("c", "3")].into_iter().collect();
        let keys: Vec<_> = options.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_options() {
        let options = OperatorOptions::default();
        assert!(options.is_empty());
        assert_eq!(options.iter().count(), 0);
    }
}
