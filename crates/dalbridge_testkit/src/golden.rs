//! Golden layout vectors.
//!
//! The expected size, alignment and field offsets of every composite ABI
//! type on 64-bit targets, as laid out by a C compiler. Declared layouts
//! are checked against these so that a change to a layout declaration
//! cannot silently drift from the native library.

use dalbridge_abi::{
    AbiType, ExistsResult, ListResult, ListerNextResult, NativeBytes, NativeCapability,
    NativeError, OperatorNewResult, ReadResult, ReaderReadResult, ReaderResult, StatResult,
};
use serde::{Deserialize, Serialize};

/// One type's expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutVector {
    /// Type name.
    pub name: String,
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub align: usize,
    /// Field offsets in declaration order.
    pub offsets: Vec<usize>,
}

const LAYOUTS_64: &str = include_str!("../vectors/layouts_64.json");

/// The golden vectors for 64-bit targets.
pub fn golden_layouts() -> Vec<LayoutVector> {
    serde_json::from_str(LAYOUTS_64).expect("Invalid layout vectors")
}

fn vector<T: AbiType>(name: &str) -> LayoutVector {
    let shape = T::layout()
        .shape()
        .unwrap_or_else(|e| panic!("{name} has no shape: {e}"));
    LayoutVector {
        name: name.to_string(),
        size: shape.size,
        align: shape.align,
        offsets: shape.offsets,
    }
}

/// Shapes computed from the declared layouts, in golden file order.
pub fn declared_layouts() -> Vec<LayoutVector> {
    vec![
        vector::<NativeBytes>("NativeBytes"),
        vector::<NativeError>("NativeError"),
        vector::<OperatorNewResult>("OperatorNewResult"),
        vector::<ReadResult>("ReadResult"),
        vector::<StatResult>("StatResult"),
        vector::<ListResult>("ListResult"),
        vector::<ListerNextResult>("ListerNextResult"),
        vector::<ExistsResult>("ExistsResult"),
        vector::<ReaderResult>("ReaderResult"),
        vector::<ReaderReadResult>("ReaderReadResult"),
        vector::<NativeCapability>("NativeCapability"),
    ]
}

/// Asserts the declared layouts match the golden vectors.
///
/// Only meaningful on 64-bit targets; does nothing elsewhere.
pub fn assert_golden_layouts() {
    if cfg!(not(target_pointer_width = "64")) {
        return;
    }
    let golden = golden_layouts();
    let declared = declared_layouts();
    assert_eq!(golden.len(), declared.len(), "Layout vector count differs");
    for (expected, actual) in golden.iter().zip(&declared) {
        assert_eq!(expected, actual, "Layout of {} differs", expected.name);
    }
}
