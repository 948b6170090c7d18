//! The capability struct returned by value from operator info queries.

use crate::layout::{AbiType, Layout};

/// Kind of a capability field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A `uint8_t` flag, true only when exactly 1.
    Flag,
    /// A `uintptr_t` limit, 0 when the backend sets none.
    Limit,
}

/// Capability fields in declaration order.
pub const CAPABILITY_FIELDS: [(&str, FieldKind); 36] = [
    ("stat", FieldKind::Flag),
    ("stat_with_if_match", FieldKind::Flag),
    ("stat_with_if_none_match", FieldKind::Flag),
    ("read", FieldKind::Flag),
    ("read_with_if_match", FieldKind::Flag),
    ("read_with_if_none_match", FieldKind::Flag),
    ("read_with_override_cache_control", FieldKind::Flag),
    ("read_with_override_content_disposition", FieldKind::Flag),
    ("read_with_override_content_type", FieldKind::Flag),
    ("write", FieldKind::Flag),
    ("write_can_multi", FieldKind::Flag),
    ("write_can_empty", FieldKind::Flag),
    ("write_can_append", FieldKind::Flag),
    ("write_with_content_type", FieldKind::Flag),
    ("write_with_content_disposition", FieldKind::Flag),
    ("write_with_cache_control", FieldKind::Flag),
    ("write_multi_max_size", FieldKind::Limit),
    ("write_multi_min_size", FieldKind::Limit),
    ("write_multi_align_size", FieldKind::Limit),
    ("write_total_max_size", FieldKind::Limit),
    ("create_dir", FieldKind::Flag),
    ("delete", FieldKind::Flag),
    ("copy", FieldKind::Flag),
    ("rename", FieldKind::Flag),
    ("list", FieldKind::Flag),
    ("list_with_limit", FieldKind::Flag),
    ("list_with_start_after", FieldKind::Flag),
    ("list_with_recursive", FieldKind::Flag),
    ("presign", FieldKind::Flag),
    ("presign_read", FieldKind::Flag),
    ("presign_stat", FieldKind::Flag),
    ("presign_write", FieldKind::Flag),
    ("batch", FieldKind::Flag),
    ("batch_delete", FieldKind::Flag),
    ("batch_max_operations", FieldKind::Limit),
    ("blocking", FieldKind::Flag),
];

/// Raw capability flags (`opendal_capability`).
///
/// Flags are small integers that are only meaningful when exactly 1; the
/// decoded view lives in the core crate.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct NativeCapability {
    pub stat: u8,
    pub stat_with_if_match: u8,
    pub stat_with_if_none_match: u8,
    pub read: u8,
    pub read_with_if_match: u8,
    pub read_with_if_none_match: u8,
    pub read_with_override_cache_control: u8,
    pub read_with_override_content_disposition: u8,
    pub read_with_override_content_type: u8,
    pub write: u8,
    pub write_can_multi: u8,
    pub write_can_empty: u8,
    pub write_can_append: u8,
    pub write_with_content_type: u8,
    pub write_with_content_disposition: u8,
    pub write_with_cache_control: u8,
    pub write_multi_max_size: usize,
    pub write_multi_min_size: usize,
    pub write_multi_align_size: usize,
    pub write_total_max_size: usize,
    pub create_dir: u8,
    pub delete: u8,
    pub copy: u8,
    pub rename: u8,
    pub list: u8,
    pub list_with_limit: u8,
    pub list_with_start_after: u8,
    pub list_with_recursive: u8,
    pub presign: u8,
    pub presign_read: u8,
    pub presign_stat: u8,
    pub presign_write: u8,
    pub batch: u8,
    pub batch_delete: u8,
    pub batch_max_operations: usize,
    pub blocking: u8,
}

unsafe impl AbiType for NativeCapability {
    fn layout() -> Layout {
        Layout::structure(CAPABILITY_FIELDS.iter().map(|(_, kind)| match kind {
            FieldKind::Flag => Layout::U8,
            FieldKind::Limit => Layout::Usize,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::verify;
    use std::mem::offset_of;

    #[test]
    fn layout_matches_repr_c() {
        verify::<NativeCapability>().unwrap();
    }

    #[test]
    fn limit_offsets_match_repr_c() {
        let shape = NativeCapability::layout().shape().unwrap();
        let index = |name: &str| {
            CAPABILITY_FIELDS
                .iter()
                .position(|(field, _)| *field == name)
                .unwrap()
        };
        assert_eq!(
            shape.offsets[index("write_multi_max_size")],
            offset_of!(NativeCapability, write_multi_max_size)
        );
        assert_eq!(
            shape.offsets[index("create_dir")],
            offset_of!(NativeCapability, create_dir)
        );
        assert_eq!(
            shape.offsets[index("batch_max_operations")],
            offset_of!(NativeCapability, batch_max_operations)
        );
        assert_eq!(
            shape.offsets[index("blocking")],
            offset_of!(NativeCapability, blocking)
        );
    }

    #[test]
    fn field_table_is_complete() {
        let limits = CAPABILITY_FIELDS
            .iter()
            .filter(|(_, kind)| *kind == FieldKind::Limit)
            .count();
        assert_eq!(limits, 5);
        assert_eq!(CAPABILITY_FIELDS.len(), 36);
    }
}
