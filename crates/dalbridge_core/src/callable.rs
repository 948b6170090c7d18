//! Bound callables: a resolved entry point plus its call descriptor,
//! invocable as a typed Rust function.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::addr_of_mut;

use dalbridge_abi::{verify, AbiType, Layout, LayoutError};
use libffi::middle::CodePtr;
use libffi::raw;

use crate::descriptor::CallDescriptor;
use crate::error::{BindError, BindResult};
use crate::symbol::{Symbol, SymbolSource};

/// A tuple of ABI values passed as call arguments.
///
/// # Safety
///
/// `slots` must return one pointer per tuple element, in order, each
/// pointing into `self`.
pub unsafe trait AbiArgs: Copy + 'static {
    /// One argument pointer per element.
    type Slots: AsMut<[*mut c_void]>;

    /// The layout of each element, in order.
    fn layouts() -> Vec<Layout>;

    /// Checks every element type against its declared layout.
    fn verify() -> Result<(), LayoutError>;

    /// Pointers to each element of `self`, as `ffi_call` expects them.
    fn slots(&mut self) -> Self::Slots;
}

macro_rules! abi_args {
    ($len:expr; $($name:ident . $index:tt),*) => {
        unsafe impl<$($name: AbiType),*> AbiArgs for ($($name,)*) {
            type Slots = [*mut c_void; $len];

            fn layouts() -> Vec<Layout> {
                vec![$($name::layout()),*]
            }

            fn verify() -> Result<(), LayoutError> {
                $(verify::<$name>()?;)*
                Ok(())
            }

            fn slots(&mut self) -> Self::Slots {
                [$(addr_of_mut!(self.$index).cast::<c_void>()),*]
            }
        }
    };
}

abi_args!(0;);
abi_args!(1; A.0);
abi_args!(2; A.0, B.1);
abi_args!(3; A.0, B.1, C.2);
abi_args!(4; A.0, B.1, C.2, D.3);

/// Return storage for one call.
///
/// libffi writes integer returns narrower than a register as a full
/// `ffi_arg`, so the slot is never smaller than one.
#[repr(C)]
union ReturnSlot<R: Copy> {
    value: R,
    word: raw::ffi_arg,
}

/// A native function bound to a fixed Rust signature `fn(A) -> R`.
///
/// Stateless: each call uses its own stack storage for arguments and the
/// return value, so one callable may be shared across threads.
pub struct BoundCallable<A: AbiArgs, R: AbiType> {
    symbol: Symbol,
    descriptor: CallDescriptor,
    _signature: PhantomData<fn(A) -> R>,
}

impl<A: AbiArgs, R: AbiType> BoundCallable<A, R> {
    /// Binds `symbol` with `descriptor`.
    ///
    /// Fails if the descriptor does not describe `fn(A) -> R` exactly, or
    /// if any of those Rust types disagrees with its declared layout.
    pub fn bind(symbol: Symbol, descriptor: CallDescriptor) -> BindResult<Self> {
        let context = || symbol.name().to_string();
        verify::<R>().map_err(|e| BindError::layout(context(), e))?;
        A::verify().map_err(|e| BindError::layout(context(), e))?;

        let (ret, args) = (R::layout(), A::layouts());
        if !descriptor.matches(&ret, &args) {
            return Err(BindError::layout(
                context(),
                format!(
                    "descriptor {descriptor} does not match the bound signature {}",
                    crate::descriptor::signature(&ret, &args)
                ),
            ));
        }

        Ok(Self {
            symbol,
            descriptor,
            _signature: PhantomData,
        })
    }

    /// Resolves `name` from `source` and binds it with the descriptor
    /// derived from `fn(A) -> R`.
    pub fn resolve(source: &dyn SymbolSource, name: &str) -> BindResult<Self> {
        let symbol = source.resolve(name)?;
        let descriptor = CallDescriptor::describe(R::layout(), A::layouts())
            .map_err(|e| BindError::layout(name, e))?;
        Self::bind(symbol, descriptor)
    }

    /// The bound symbol.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// The call descriptor.
    pub fn descriptor(&self) -> &CallDescriptor {
        &self.descriptor
    }

    /// Calls the native function.
    ///
    /// # Safety
    ///
    /// The library the symbol came from must still be loaded, the native
    /// function must really have the signature `fn(A) -> R`, and every
    /// pointer in `args` must satisfy that function's contract.
    pub unsafe fn call(&self, mut args: A) -> R {
        let mut slots = args.slots();
        let mut ret = ReturnSlot::<R> { word: 0 };
        let code = CodePtr(self.symbol.address().cast_mut());

        raw::ffi_call(
            self.descriptor.cif().as_raw_ptr(),
            Some(*code.as_safe_fun()),
            addr_of_mut!(ret).cast::<c_void>(),
            slots.as_mut().as_mut_ptr(),
        );

        match R::from_widened(ret.word as u64) {
            Some(value) => value,
            None => ret.value,
        }
    }
}

// Holds only an address and a read-only descriptor.
unsafe impl<A: AbiArgs, R: AbiType> Send for BoundCallable<A, R> {}
unsafe impl<A: AbiArgs, R: AbiType> Sync for BoundCallable<A, R> {}

impl<A: AbiArgs, R: AbiType> fmt::Debug for BoundCallable<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundCallable")
            .field("symbol", &self.symbol.name())
            .field("signature", &self.descriptor.to_string())
            .finish()
    }
}
