//! Operator calls through a registry bound to the stub library.

use std::io::Read;

use dalbridge_core::{BindError, ErrorCode, OperatorOptions};
use dalbridge_testkit::{invalid_calls, with_operator, NativeKind, StubFixture};

fn native_code(err: &BindError) -> ErrorCode {
    err.native()
        .unwrap_or_else(|| panic!("expected a native failure, got {err}"))
        .code()
}

#[test]
fn write_then_read() {
    with_operator(|op, counters| {
        op.write("greeting.txt", b"hello world").unwrap();
        assert_eq!(op.read("greeting.txt").unwrap(), b"hello world");
        assert_eq!(op.read("/greeting.txt").unwrap(), b"hello world");

        assert_eq!(counters.allocated(NativeKind::Bytes), 2);
        assert_eq!(counters.live(NativeKind::Bytes), 0);
    });
}

#[test]
fn overwrite_replaces_content() {
    with_operator(|op, _| {
        op.write("a.txt", b"first").unwrap();
        op.write("a.txt", b"second, longer").unwrap();
        assert_eq!(op.read("a.txt").unwrap(), b"second, longer");
    });
}

#[test]
fn empty_write_follows_capability() {
    with_operator(|op, _| {
        op.write("empty.txt", b"").unwrap();
        assert!(op.read("empty.txt").unwrap().is_empty());
        let meta = op.stat("empty.txt").unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.content_length(), 0);
    });

    let fixture = StubFixture::new();
    let op = fixture
        .operator_with(&OperatorOptions::new().with("capability.write_can_empty", "0"));
    let err = op.write("empty.txt", b"").unwrap_err();
    assert_eq!(native_code(&err), ErrorCode::Unsupported);
    assert!(!op.is_exist("empty.txt").unwrap());
    op.close();
    fixture.assert_all_released();
}

#[test]
fn stat_file_and_directory() {
    with_operator(|op, _| {
        op.write("docs/readme.md", b"# title").unwrap();

        let meta = op.stat("docs/readme.md").unwrap();
        assert!(meta.is_file());
        assert!(!meta.is_dir());
        assert_eq!(meta.content_length(), 7);
        assert!(meta.last_modified_ms().is_some());
        assert!(meta.last_modified().is_some());
        meta.close();

        let dir = op.stat("docs/").unwrap();
        assert!(dir.is_dir());
        assert!(!dir.is_file());
        assert_eq!(dir.last_modified_ms(), None);
    });
}

#[test]
fn stat_missing_is_not_found() {
    with_operator(|op, counters| {
        let err = op.stat("missing.txt").unwrap_err();
        let failure = err.native().unwrap();
        assert_eq!(failure.raw_code(), 3);
        assert_eq!(failure.code(), ErrorCode::NotFound);
        assert_eq!(failure.message(), "file not found");
        assert_eq!(err.to_string(), "NotFound: file not found");
        assert!(!err.is_fatal());

        assert_eq!(counters.allocated(NativeKind::Error), 1);
        assert_eq!(counters.released(NativeKind::Error), 1);
        assert_eq!(counters.allocated(NativeKind::Metadata), 0);
    });
}

#[test]
fn is_exist_tracks_writes_and_deletes() {
    with_operator(|op, _| {
        assert!(!op.is_exist("a.txt").unwrap());
        op.write("a.txt", b"x").unwrap();
        assert!(op.is_exist("a.txt").unwrap());
        op.delete("a.txt").unwrap();
        assert!(!op.is_exist("a.txt").unwrap());
    });
}

#[test]
fn delete_missing_succeeds() {
    with_operator(|op, counters| {
        op.delete("never-written.txt").unwrap();
        assert_eq!(counters.allocated(NativeKind::Error), 0);
    });
}

#[test]
fn copy_and_rename() {
    with_operator(|op, _| {
        op.write("src.txt", b"payload").unwrap();

        op.copy("src.txt", "copy.txt").unwrap();
        assert_eq!(op.read("copy.txt").unwrap(), b"payload");
        assert!(op.is_exist("src.txt").unwrap());

        op.rename("src.txt", "moved.txt").unwrap();
        assert_eq!(op.read("moved.txt").unwrap(), b"payload");
        assert!(!op.is_exist("src.txt").unwrap());
    });
}

#[test]
fn copy_errors() {
    with_operator(|op, _| {
        op.write("a.txt", b"a").unwrap();

        let err = op.copy("a.txt", "a.txt").unwrap_err();
        assert_eq!(native_code(&err), ErrorCode::IsSameFile);

        let err = op.rename("missing.txt", "b.txt").unwrap_err();
        assert_eq!(native_code(&err), ErrorCode::NotFound);
    });
}

#[test]
fn create_dir_requires_trailing_slash() {
    with_operator(|op, _| {
        op.create_dir("logs/").unwrap();
        assert!(op.stat("logs/").unwrap().is_dir());

        let err = op.create_dir("logs").unwrap_err();
        assert_eq!(native_code(&err), ErrorCode::NotADirectory);
    });
}

#[test]
fn reading_a_directory_fails() {
    with_operator(|op, _| {
        op.create_dir("dir/").unwrap();
        let err = op.read("dir/").unwrap_err();
        assert_eq!(native_code(&err), ErrorCode::IsADirectory);
    });
}

#[test]
fn list_direct_children() {
    with_operator(|op, counters| {
        op.write("data/a.txt", b"a").unwrap();
        op.write("data/b.txt", b"bb").unwrap();
        op.write("data/nested/c.txt", b"ccc").unwrap();
        op.create_dir("data/empty/").unwrap();
        op.write("elsewhere.txt", b"z").unwrap();

        let mut names = Vec::new();
        let mut paths = Vec::new();
        for entry in op.list("data/").unwrap() {
            let entry = entry.unwrap();
            names.push(entry.name().unwrap());
            paths.push(entry.path().unwrap());
        }

        assert_eq!(names, vec!["a.txt", "b.txt", "empty/", "nested/"]);
        assert_eq!(
            paths,
            vec!["data/a.txt", "data/b.txt", "data/empty/", "data/nested/"]
        );
        assert_eq!(counters.allocated(NativeKind::Entry), 4);
        assert_eq!(counters.live(NativeKind::Entry), 0);
        assert_eq!(counters.live(NativeKind::Lister), 0);
    });
}

#[test]
fn exhausted_lister_stays_finished() {
    with_operator(|op, _| {
        op.write("one/only.txt", b"1").unwrap();
        let mut lister = op.list("one/").unwrap();
        assert!(lister.next_entry().unwrap().is_some());
        assert!(lister.next_entry().unwrap().is_none());
        assert!(lister.next_entry().unwrap().is_none());
        lister.close();
    });
}

#[test]
fn listing_a_file_fails() {
    with_operator(|op, _| {
        op.write("file.txt", b"x").unwrap();
        let err = op.list("file.txt").unwrap_err();
        assert_eq!(native_code(&err), ErrorCode::NotADirectory);
    });
}

#[test]
fn reader_streams_content() {
    with_operator(|op, counters| {
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        op.write("big.bin", &content).unwrap();

        let mut reader = op.reader("big.bin").unwrap();
        let mut chunk = [0u8; 333];
        let mut collected = Vec::new();
        loop {
            let n = reader.read_into(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(collected, content);
        assert_eq!(reader.read_into(&mut []).unwrap(), 0);
        reader.close();

        let mut via_io = Vec::new();
        op.reader("big.bin").unwrap().read_to_end(&mut via_io).unwrap();
        assert_eq!(via_io, content);

        assert_eq!(counters.allocated(NativeKind::Reader), 2);
        assert_eq!(counters.live(NativeKind::Reader), 0);
    });
}

#[test]
fn reader_on_missing_path() {
    with_operator(|op, counters| {
        let err = op.reader("nope.bin").unwrap_err();
        assert_eq!(native_code(&err), ErrorCode::NotFound);
        assert_eq!(counters.allocated(NativeKind::Reader), 0);
    });
}

#[test]
fn info_reports_configuration() {
    let fixture = StubFixture::new();
    let options = OperatorOptions::new()
        .with("root", "/data")
        .with("name", "bucket")
        .with("capability.presign", "2")
        .with("capability.batch", "1")
        .with("capability.batch_max_operations", "128");
    let op = fixture.operator_with(&options);

    let info = op.info().unwrap();
    assert_eq!(info.scheme().unwrap(), "memory");
    assert_eq!(info.root().unwrap(), "/data");
    assert_eq!(info.name().unwrap(), "bucket");

    let native = info.native_capability();
    assert!(native.stat);
    assert!(native.write);
    assert!(native.batch);
    assert!(!native.presign);
    assert_eq!(native.batch_max_operations, 128);
    assert!(!native.list_with_recursive);

    let full = info.full_capability();
    assert!(full.list_with_recursive);
    assert_eq!(full.batch_max_operations, 128);

    info.close();
    op.close();
    fixture.assert_all_released();
}

#[test]
fn unknown_scheme_is_rejected() {
    let fixture = StubFixture::new();
    fixture.activate();
    let err = dalbridge_core::Operator::new(&fixture.registry, "s3", &OperatorOptions::new())
        .unwrap_err();
    assert_eq!(native_code(&err), ErrorCode::Unsupported);
    assert!(err.to_string().contains("s3"));

    assert_eq!(fixture.counters().allocated(NativeKind::Options), 1);
    assert_eq!(fixture.counters().allocated(NativeKind::Operator), 0);
    fixture.assert_all_released();
}

#[test]
fn invalid_option_value_is_config_invalid() {
    let fixture = StubFixture::new();
    fixture.activate();
    let options = OperatorOptions::new().with("root", "relative/path");
    let err = dalbridge_core::Operator::new(&fixture.registry, "memory", &options).unwrap_err();
    assert_eq!(native_code(&err), ErrorCode::ConfigInvalid);
    fixture.assert_all_released();
}

#[test]
fn nul_in_path_never_reaches_the_library() {
    with_operator(|op, counters| {
        let err = op.write("bad\0path", b"x").unwrap_err();
        assert!(matches!(err, BindError::Marshal { .. }));
        let err = op.stat("bad\0path").unwrap_err();
        assert!(matches!(err, BindError::Marshal { .. }));

        assert_eq!(counters.allocated(NativeKind::Error), 0);
        assert_eq!(counters.allocated(NativeKind::Metadata), 0);
    });
}

#[test]
fn nul_in_option_fails_before_allocation() {
    let fixture = StubFixture::new();
    fixture.activate();
    let options = OperatorOptions::new().with("name", "a\0b");
    let err = dalbridge_core::Operator::new(&fixture.registry, "memory", &options).unwrap_err();
    assert!(matches!(err, BindError::Marshal { .. }));
    assert_eq!(fixture.counters().allocated(NativeKind::Options), 0);
}

#[test]
fn shared_operator_across_threads() {
    let before = invalid_calls();
    with_operator(|op, counters| {
        std::thread::scope(|scope| {
            for worker in 0..8 {
                scope.spawn(move || {
                    for i in 0..25 {
                        let path = format!("worker-{worker}/file-{i}.txt");
                        let body = format!("{worker}:{i}");
                        op.write(&path, body.as_bytes()).unwrap();
                        assert_eq!(op.read(&path).unwrap(), body.as_bytes());
                        assert!(op.stat(&path).unwrap().is_file());
                    }
                    let count = op.list(&format!("worker-{worker}/")).unwrap().count();
                    assert_eq!(count, 25);
                });
            }
        });
        assert_eq!(counters.allocated(NativeKind::Metadata), 200);
        assert_eq!(counters.allocated(NativeKind::Entry), 200);
    });
    assert_eq!(invalid_calls(), before);
}
