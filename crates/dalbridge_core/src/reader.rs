//! Streaming reads.

use std::fmt;
use std::io;
use std::marker::PhantomData;

use dalbridge_abi::RawReader;

use crate::error::{BindError, BindResult};
use crate::marshal::open;
use crate::operator::Operator;
use crate::resource::{Owned, ReaderKind};

/// A streaming reader over one object.
///
/// Like [`crate::Lister`], a reader can move between threads but is not
/// `Sync`.
pub struct Reader<'op> {
    owned: Owned<ReaderKind>,
    _operator: PhantomData<&'op Operator>,
}

unsafe impl Send for Reader<'_> {}

impl<'op> Reader<'op> {
    /// # Safety
    ///
    /// A non-null `raw` must be a fresh reader handle from `operator`'s
    /// library.
    pub(crate) unsafe fn from_raw(operator: &'op Operator, raw: *mut RawReader) -> BindResult<Self> {
        Ok(Self {
            owned: Owned::new(operator.registry(), raw, "opendal_operator_reader")?,
            _operator: PhantomData,
        })
    }

    /// Reads up to `buf.len()` bytes, returning how many were read. Zero
    /// means end of stream.
    pub fn read_into(&mut self, buf: &mut [u8]) -> BindResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let bindings = self.owned.bindings();
        // SAFETY: live reader handle and a writable buffer of `buf.len()`
        // bytes for the duration of the call.
        let size = unsafe {
            let result = bindings
                .reader_read
                .call((self.owned.as_ptr(), buf.as_mut_ptr(), buf.len()));
            open(bindings, result)?
        };

        if size > buf.len() {
            return Err(BindError::marshal(format!(
                "reader reported {size} bytes for a {} byte buffer",
                buf.len()
            )));
        }
        Ok(size)
    }

    /// Releases the native reader.
    pub fn close(mut self) {
        self.owned.release();
    }
}

impl io::Read for Reader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").field("handle", &self.owned).finish()
    }
}
