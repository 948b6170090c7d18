//! Directory listing.

use std::fmt;
use std::marker::PhantomData;

use dalbridge_abi::{RawEntry, RawLister};

use crate::error::BindResult;
use crate::marshal::{copy_c_str, open};
use crate::operator::Operator;
use crate::resource::{EntryKind, ListerKind, Owned};

/// Iterates over the entries of one directory.
///
/// The native lister must not be advanced from two threads at once, so a
/// `Lister` can move between threads but is not `Sync`. Once the listing
/// is exhausted or has failed, it stays finished.
pub struct Lister<'op> {
    owned: Owned<ListerKind>,
    operator: &'op Operator,
    done: bool,
}

unsafe impl Send for Lister<'_> {}

impl<'op> Lister<'op> {
    /// # Safety
    ///
    /// A non-null `raw` must be a fresh lister handle from `operator`'s
    /// library.
    pub(crate) unsafe fn from_raw(operator: &'op Operator, raw: *mut RawLister) -> BindResult<Self> {
        Ok(Self {
            owned: Owned::new(operator.registry(), raw, "opendal_operator_list")?,
            operator,
            done: false,
        })
    }

    /// Returns the next entry, or `None` once the listing is exhausted.
    pub fn next_entry(&mut self) -> BindResult<Option<Entry<'op>>> {
        if self.done {
            return Ok(None);
        }

        let bindings = self.owned.bindings();
        // SAFETY: live lister handle, advanced by one thread at a time.
        let result = unsafe {
            let result = bindings.lister_next.call((self.owned.as_ptr(),));
            open(bindings, result)
        };

        match result {
            // Both slots empty: end of iteration.
            Ok(raw) if raw.is_null() => {
                self.done = true;
                Ok(None)
            }
            // SAFETY: a fresh entry handle from `opendal_lister_next`.
            Ok(raw) => unsafe { Entry::from_raw(self.operator, raw) }.map(Some),
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Releases the native lister.
    pub fn close(mut self) {
        self.owned.release();
    }
}

impl<'op> Iterator for Lister<'op> {
    type Item = BindResult<Entry<'op>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

impl fmt::Debug for Lister<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lister")
            .field("handle", &self.owned)
            .field("done", &self.done)
            .finish()
    }
}

/// One directory entry.
///
/// Directory paths end with `/`.
pub struct Entry<'op> {
    owned: Owned<EntryKind>,
    _operator: PhantomData<&'op Operator>,
}

// Accessors only read the native entry.
unsafe impl Send for Entry<'_> {}
unsafe impl Sync for Entry<'_> {}

impl<'op> Entry<'op> {
    /// # Safety
    ///
    /// `raw` must be a fresh entry handle from `operator`'s library.
    unsafe fn from_raw(operator: &'op Operator, raw: *mut RawEntry) -> BindResult<Self> {
        Ok(Self {
            owned: Owned::new(operator.registry(), raw, "opendal_lister_next")?,
            _operator: PhantomData,
        })
    }

    /// The entry's name: the last path segment.
    pub fn name(&self) -> BindResult<String> {
        // SAFETY: live entry handle; the string belongs to the entry and is
        // copied before the entry can be released.
        unsafe {
            let ptr = self
                .owned
                .bindings()
                .entry_name
                .call((self.owned.as_const_ptr(),));
            copy_c_str(ptr, "entry name")
        }
    }

    /// The entry's full path relative to the operator root.
    pub fn path(&self) -> BindResult<String> {
        // SAFETY: as for `name`.
        unsafe {
            let ptr = self
                .owned
                .bindings()
                .entry_path
                .call((self.owned.as_const_ptr(),));
            copy_c_str(ptr, "entry path")
        }
    }

    /// Releases the native entry.
    pub fn close(mut self) {
        self.owned.release();
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("path", &self.path().ok())
            .finish()
    }
}
