//! Loading and binding: library errors, symbol resolution and the build
//! order of the registry.

use dalbridge_core::{
    BindError, BoundCallable, LibraryHandle, LoadConfig, Registry, Role, SymbolSource, OPERATIONS,
};
use dalbridge_testkit::{assert_golden_layouts, garbage_library, StubFixture, StubLibrary};

#[test]
fn registry_binds_in_table_order() {
    let fixture = StubFixture::new();
    let expected: Vec<String> = OPERATIONS.iter().map(|op| op.symbol.to_string()).collect();
    assert_eq!(fixture.log().entries(), expected);
}

#[test]
fn every_release_is_resolved_before_its_allocators() {
    let fixture = StubFixture::new();
    let log = fixture.log().entries();
    let position = |symbol: &str| log.iter().position(|name| name == symbol).unwrap();

    for op in OPERATIONS.iter().filter(|op| op.role == Role::Allocate) {
        for release in op.releases {
            assert!(
                position(*release) < position(op.symbol),
                "{} resolved before {}",
                op.symbol,
                release
            );
        }
    }
}

#[test]
fn missing_symbol_fails_the_whole_build() {
    for symbol in [
        "opendal_error_free",
        "opendal_operator_new",
        "opendal_operator_info_get_native_capability",
        "opendal_operator_reader",
    ] {
        let stub = StubLibrary::new().without(symbol);
        let log = stub.log();
        let err = Registry::build(stub).unwrap_err();
        match &err {
            BindError::Symbol { name, .. } => assert_eq!(name, symbol),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_fatal());
        assert_eq!(log.entries().last().map(String::as_str), Some(symbol));
    }
}

#[test]
fn stub_reports_its_origin() {
    let stub = StubLibrary::new();
    assert_eq!(stub.origin(), "stub");
    let registry = Registry::build(stub).unwrap();
    assert_eq!(registry.origin(), "stub");
    assert!(format!("{registry:?}").contains("stub"));
}

#[test]
fn missing_library_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libopendal_c_missing.so");
    let err = LibraryHandle::open(&path).unwrap_err();
    match &err {
        BindError::LibraryNotFound { path: reported } => assert_eq!(reported, &path),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_fatal());
}

#[test]
fn garbage_library_fails_to_load() {
    let (_dir, path) = garbage_library();
    let err = Registry::load(&LoadConfig::new().path(&path)).unwrap_err();
    assert!(matches!(err, BindError::Load { .. }), "got {err}");
    assert!(err.to_string().contains(&*path.to_string_lossy()));
}

#[test]
fn eager_binding_flags_still_report_load_errors() {
    let (_dir, path) = garbage_library();
    let config = LoadConfig::new()
        .path(&path)
        .lazy_binding(false)
        .global_symbols(false);
    let err = LibraryHandle::open_with(&config).unwrap_err();
    assert!(matches!(err, BindError::Load { .. }));
}

#[cfg(target_os = "linux")]
#[test]
fn system_library_resolves_and_calls() {
    use std::ffi::{c_char, CString};

    let library = LibraryHandle::open("libc.so.6").unwrap();
    assert_eq!(library.origin(), "libc.so.6");

    let err = library.resolve("opendal_operator_new").unwrap_err();
    match &err {
        BindError::Symbol { name, .. } => assert_eq!(name, "opendal_operator_new"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_fatal());

    let strlen = BoundCallable::<(*const c_char,), usize>::resolve(&library, "strlen").unwrap();
    assert_eq!(strlen.symbol().name(), "strlen");
    assert!(!strlen.symbol().address().is_null());

    let text = CString::new("hello").unwrap();
    assert_eq!(unsafe { strlen.call((text.as_ptr(),)) }, 5);
    let empty = CString::new("").unwrap();
    assert_eq!(unsafe { strlen.call((empty.as_ptr(),)) }, 0);

    drop(strlen);
    library.close().unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn registry_over_a_foreign_library_names_the_first_missing_symbol() {
    let err = Registry::load(&LoadConfig::new().path("libc.so.6")).unwrap_err();
    match &err {
        BindError::Symbol { name, .. } => assert_eq!(name, OPERATIONS[0].symbol),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_fatal());
}

#[test]
fn abi_layouts_match_golden_vectors() {
    assert_golden_layouts();
}
