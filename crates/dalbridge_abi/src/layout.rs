//! Layout model for values crossing the C ABI.
//!
//! A [`Layout`] is the language-independent shape of one argument, return
//! value or struct field. [`Layout::shape`] reproduces the C compiler's
//! placement rules so that composite layouts can be checked against both
//! the Rust `#[repr(C)]` definitions and libffi's own computation.

use std::ffi::c_void;
use std::fmt;
use std::mem::{align_of, size_of};

use thiserror::Error;

/// Errors raised while describing or verifying a layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// A struct layout with no fields.
    #[error("struct layout has no fields")]
    EmptyStruct,

    /// `void` used as a struct field.
    #[error("struct field {index} is void")]
    VoidField {
        /// Position of the offending field.
        index: usize,
    },

    /// `void` used as a call argument.
    #[error("argument {index} is void")]
    VoidArgument {
        /// Position of the offending argument.
        index: usize,
    },

    /// A Rust type disagrees with the layout it declares.
    #[error(
        "{type_name} declares size {declared_size}/align {declared_align} \
         but is {actual_size}/{actual_align}"
    )]
    Mismatch {
        /// The Rust type being checked.
        type_name: &'static str,
        /// Size computed from the declared layout.
        declared_size: usize,
        /// Alignment computed from the declared layout.
        declared_align: usize,
        /// `size_of` the Rust type.
        actual_size: usize,
        /// `align_of` the Rust type.
        actual_align: usize,
    },
}

/// The ABI shape of a single value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Layout {
    /// No value (return position only).
    Void,
    /// `uint8_t`, also used for C `bool`.
    U8,
    /// `int32_t`
    I32,
    /// `uint32_t`
    U32,
    /// `uint64_t`
    U64,
    /// `int64_t`
    I64,
    /// `uintptr_t` / `size_t`
    Usize,
    /// Any data pointer, including opaque handles and `const char*`.
    Pointer,
    /// A struct with fields in declaration order.
    Struct(Vec<Layout>),
}

/// Size, alignment and field offsets of a layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    /// Size in bytes, including trailing padding.
    pub size: usize,
    /// Required alignment in bytes.
    pub align: usize,
    /// Byte offset of each field; empty for primitives.
    pub offsets: Vec<usize>,
}

impl Shape {
    fn primitive<T>() -> Self {
        Self {
            size: size_of::<T>(),
            align: align_of::<T>(),
            offsets: Vec::new(),
        }
    }
}

impl Layout {
    /// Builds a struct layout from its fields.
    pub fn structure(fields: impl IntoIterator<Item = Layout>) -> Self {
        Layout::Struct(fields.into_iter().collect())
    }

    /// Returns true for `Layout::Void`.
    pub fn is_void(&self) -> bool {
        matches!(self, Layout::Void)
    }

    /// Computes the size, alignment and field offsets the C compiler
    /// would assign to this layout on the current target.
    pub fn shape(&self) -> Result<Shape, LayoutError> {
        match self {
            Layout::Void => Ok(Shape {
                size: 0,
                align: 1,
                offsets: Vec::new(),
            }),
            Layout::U8 => Ok(Shape::primitive::<u8>()),
            Layout::I32 => Ok(Shape::primitive::<i32>()),
            Layout::U32 => Ok(Shape::primitive::<u32>()),
            Layout::U64 => Ok(Shape::primitive::<u64>()),
            Layout::I64 => Ok(Shape::primitive::<i64>()),
            Layout::Usize => Ok(Shape::primitive::<usize>()),
            Layout::Pointer => Ok(Shape::primitive::<*const c_void>()),
            Layout::Struct(fields) => struct_shape(fields),
        }
    }
}

fn struct_shape(fields: &[Layout]) -> Result<Shape, LayoutError> {
    if fields.is_empty() {
        return Err(LayoutError::EmptyStruct);
    }

    let mut offset = 0usize;
    let mut align = 1usize;
    let mut offsets = Vec::with_capacity(fields.len());

    for (index, field) in fields.iter().enumerate() {
        if field.is_void() {
            return Err(LayoutError::VoidField { index });
        }
        let field_shape = field.shape()?;
        offset = align_up(offset, field_shape.align);
        offsets.push(offset);
        offset += field_shape.size;
        align = align.max(field_shape.align);
    }

    Ok(Shape {
        size: align_up(offset, align),
        align,
        offsets,
    })
}

/// Rounds `offset` up to the next multiple of `align` (a power of two).
pub const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Void => write!(f, "void"),
            Layout::U8 => write!(f, "uint8_t"),
            Layout::I32 => write!(f, "int32_t"),
            Layout::U32 => write!(f, "uint32_t"),
            Layout::U64 => write!(f, "uint64_t"),
            Layout::I64 => write!(f, "int64_t"),
            Layout::Usize => write!(f, "uintptr_t"),
            Layout::Pointer => write!(f, "void*"),
            Layout::Struct(fields) => {
                write!(f, "struct {{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// A Rust type with a known C layout.
///
/// # Safety
///
/// `layout()` must describe `Self` exactly as the C compiler lays out the
/// corresponding native type: same field order, widths and signedness.
/// Bound callables trust this to size their argument and return slots.
pub unsafe trait AbiType: Copy + 'static {
    /// The declared layout of `Self`.
    fn layout() -> Layout;

    /// Recovers a value from a return register that libffi widened to a
    /// full `ffi_arg`. Only integers narrower than a register return `Some`.
    fn from_widened(_word: u64) -> Option<Self> {
        None
    }
}

/// Checks a Rust type's size and alignment against its declared layout.
pub fn verify<T: AbiType>() -> Result<(), LayoutError> {
    let layout = T::layout();
    if layout.is_void() {
        return Ok(());
    }
    let shape = layout.shape()?;
    let (actual_size, actual_align) = (size_of::<T>(), align_of::<T>());
    if shape.size != actual_size || shape.align != actual_align {
        return Err(LayoutError::Mismatch {
            type_name: std::any::type_name::<T>(),
            declared_size: shape.size,
            declared_align: shape.align,
            actual_size,
            actual_align,
        });
    }
    Ok(())
}

unsafe impl AbiType for () {
    fn layout() -> Layout {
        Layout::Void
    }
}

macro_rules! narrow_integer {
    ($ty:ty, $layout:expr) => {
        unsafe impl AbiType for $ty {
            fn layout() -> Layout {
                $layout
            }

            fn from_widened(word: u64) -> Option<Self> {
                Some(word as $ty)
            }
        }
    };
}

narrow_integer!(u8, Layout::U8);
narrow_integer!(i32, Layout::I32);
narrow_integer!(u32, Layout::U32);

unsafe impl AbiType for u64 {
    fn layout() -> Layout {
        Layout::U64
    }
}

unsafe impl AbiType for i64 {
    fn layout() -> Layout {
        Layout::I64
    }
}

unsafe impl AbiType for usize {
    fn layout() -> Layout {
        Layout::Usize
    }
}

unsafe impl<T: 'static> AbiType for *mut T {
    fn layout() -> Layout {
        Layout::Pointer
    }
}

unsafe impl<T: 'static> AbiType for *const T {
    fn layout() -> Layout {
        Layout::Pointer
    }
}
