//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for file paths: one to three lowercase segments with an
/// extension, never ending in `/`.
pub fn file_path_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}(/[a-z][a-z0-9_]{0,7}){0,2}\\.[a-z]{1,3}")
        .expect("Invalid regex")
}

/// Strategy for directory paths ending in `/`.
pub fn dir_path_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,7}(/[a-z][a-z0-9_]{0,7}){0,1}/")
        .expect("Invalid regex")
}

/// Strategy for non-empty object content.
pub fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..2048)
}

/// Strategy for strings that are safe to pass to the library (no NUL).
pub fn c_safe_string_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\\x00]{0,32}").expect("Invalid regex")
}

/// Strategy for raw capability flag values, weighted towards the
/// interesting ones: 0, 1 and anything else.
pub fn flag_value_strategy() -> impl Strategy<Value = u8> {
    prop_oneof![Just(0u8), Just(1u8), 2u8..=255]
}

/// Strategy for read buffer sizes used to drain a reader.
pub fn chunk_size_strategy() -> impl Strategy<Value = usize> {
    1usize..512
}
