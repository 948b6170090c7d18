//! Call descriptors: the prepared calling convention of one entry point.

use std::fmt;

use dalbridge_abi::{Layout, LayoutError};
use libffi::middle::{Cif, Type};
use libffi::raw;

use crate::error::{BindError, BindResult};

/// The argument and return layout of a native function, prepared for
/// calling through libffi.
///
/// Built once per operation and never mutated afterwards.
pub struct CallDescriptor {
    ret: Layout,
    args: Vec<Layout>,
    cif: Cif,
}

// The prepared cif is read-only after construction; libffi only reads it
// during `ffi_call`.
unsafe impl Send for CallDescriptor {}
unsafe impl Sync for CallDescriptor {}

impl CallDescriptor {
    /// Describes a function returning `ret` and taking `args` in order,
    /// using the platform's default calling convention.
    ///
    /// Rejects `void` arguments, empty structs, and any composite whose
    /// size, alignment or field offsets libffi computes differently from
    /// the C layout rules.
    pub fn describe(ret: Layout, args: Vec<Layout>) -> BindResult<Self> {
        let context = signature(&ret, &args);

        for (index, arg) in args.iter().enumerate() {
            if arg.is_void() {
                return Err(BindError::layout(context, LayoutError::VoidArgument { index }));
            }
        }

        let ret_type = ffi_type(&ret).map_err(|e| BindError::layout(&context, e))?;
        let arg_types = args
            .iter()
            .map(ffi_type)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BindError::layout(&context, e))?;

        let cif = Cif::new(arg_types, ret_type);
        Ok(Self { ret, args, cif })
    }

    /// The return layout.
    pub fn ret(&self) -> &Layout {
        &self.ret
    }

    /// The argument layouts, in order.
    pub fn args(&self) -> &[Layout] {
        &self.args
    }

    /// Returns true if this descriptor has exactly the given shape.
    pub fn matches(&self, ret: &Layout, args: &[Layout]) -> bool {
        self.ret == *ret && self.args == args
    }

    pub(crate) fn cif(&self) -> &Cif {
        &self.cif
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&signature(&self.ret, &self.args))
    }
}

impl fmt::Debug for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("ret", &self.ret)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Renders a C-like signature such as `int32_t (void*, uint64_t)`.
pub(crate) fn signature(ret: &Layout, args: &[Layout]) -> String {
    let args = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{ret} ({args})")
}

/// Layout problems found while mapping to libffi types.
#[derive(Debug)]
enum TypeError {
    Layout(LayoutError),
    Offsets,
    Disagree {
        ours: (usize, usize, Vec<usize>),
        ffi: (usize, usize, Vec<usize>),
    },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layout(e) => write!(f, "{e}"),
            Self::Offsets => f.write_str("libffi could not compute struct offsets"),
            Self::Disagree { ours, ffi } => write!(
                f,
                "computed size {}/align {}/offsets {:?} but libffi reports {}/{}/{:?}",
                ours.0, ours.1, ours.2, ffi.0, ffi.1, ffi.2
            ),
        }
    }
}

fn ffi_type(layout: &Layout) -> Result<Type, TypeError> {
    Ok(match layout {
        Layout::Void => Type::void(),
        Layout::U8 => Type::u8(),
        Layout::I32 => Type::i32(),
        Layout::U32 => Type::u32(),
        Layout::U64 => Type::u64(),
        Layout::I64 => Type::i64(),
        Layout::Usize => Type::usize(),
        Layout::Pointer => Type::pointer(),
        Layout::Struct(fields) => struct_type(layout, fields)?,
    })
}

/// Builds a libffi struct type and cross-checks its placement against
/// [`Layout::shape`].
fn struct_type(layout: &Layout, fields: &[Layout]) -> Result<Type, TypeError> {
    let shape = layout.shape().map_err(TypeError::Layout)?;
    let field_types = fields.iter().map(ffi_type).collect::<Result<Vec<_>, _>>()?;

    let ty = Type::structure(field_types);
    let raw_type = ty.as_raw_ptr();
    let mut offsets = vec![0usize; fields.len()];
    // SAFETY: `raw_type` is a live struct type with exactly `fields.len()`
    // elements, and `offsets` has room for each of them.
    let status = unsafe {
        raw::ffi_get_struct_offsets(raw::ffi_abi_FFI_DEFAULT_ABI, raw_type, offsets.as_mut_ptr())
    };
    if status != raw::ffi_status_FFI_OK {
        return Err(TypeError::Offsets);
    }
    // SAFETY: initialized by the successful call above.
    let (size, align) = unsafe { ((*raw_type).size, usize::from((*raw_type).alignment)) };

    if size != shape.size || align != shape.align || offsets != shape.offsets {
        return Err(TypeError::Disagree {
            ours: (shape.size, shape.align, shape.offsets),
            ffi: (size, align, offsets),
        });
    }
    Ok(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dalbridge_abi::{AbiType, NativeBytes, NativeCapability, NativeError, ReadResult};

    #[test]
    fn primitive_signature() {
        let descriptor = CallDescriptor::describe(Layout::I32, vec![Layout::I32, Layout::I32]).unwrap();
        assert_eq!(descriptor.to_string(), "int32_t (int32_t, int32_t)");
        assert!(descriptor.matches(&Layout::I32, &[Layout::I32, Layout::I32]));
        assert!(!descriptor.matches(&Layout::U32, &[Layout::I32, Layout::I32]));
    }

    #[test]
    fn void_argument_rejected() {
        let err = CallDescriptor::describe(Layout::Void, vec![Layout::Pointer, Layout::Void]).unwrap_err();
        match err {
            BindError::Layout { message, .. } => assert!(message.contains("argument 1")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_struct_rejected() {
        let err = CallDescriptor::describe(Layout::Struct(Vec::new()), Vec::new()).unwrap_err();
        assert!(matches!(err, BindError::Layout { .. }));
    }

    #[test]
    fn void_field_rejected() {
        let err = CallDescriptor::describe(
            Layout::Void,
            vec![Layout::structure([Layout::U8, Layout::Void])],
        )
        .unwrap_err();
        assert!(matches!(err, BindError::Layout { .. }));
    }

    #[test]
    fn envelope_layouts_agree_with_libffi() {
        CallDescriptor::describe(Layout::Void, vec![NativeBytes::layout()]).unwrap();
        CallDescriptor::describe(ReadResult::layout(), vec![Layout::Pointer, Layout::Pointer]).unwrap();
        CallDescriptor::describe(Layout::Pointer, vec![NativeError::layout()]).unwrap();
        CallDescriptor::describe(NativeCapability::layout(), vec![Layout::Pointer]).unwrap();
    }

    #[test]
    fn nested_struct_agrees_with_libffi() {
        let nested = Layout::structure([
            Layout::U8,
            Layout::structure([Layout::I32, Layout::U64]),
            Layout::U8,
        ]);
        CallDescriptor::describe(nested.clone(), vec![nested]).unwrap();
    }
}
