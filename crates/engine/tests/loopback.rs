//! Full-session tests: both role drivers wired over a local socket pair,
//! exactly as they would be over a transport's descriptor pair.

use std::fs;
use std::os::unix::fs::{MetadataExt, symlink};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;

use engine::{EngineError, Options, SessionStats, run_receiver, run_sender};
use filetime::FileTime;
use logging::Logger;

fn transfer(options: &Options, sources: Vec<PathBuf>, dest: &Path) -> (SessionStats, SessionStats) {
    let (sender_stream, receiver_stream) = UnixStream::pair().expect("socketpair");

    let sender_options = options.clone();
    let sender = thread::spawn(move || {
        let reader = sender_stream.try_clone().expect("clone stream");
        run_sender(&sender_options, &sources, reader, sender_stream, Logger::quiet())
    });

    let reader = receiver_stream.try_clone().expect("clone stream");
    let receiver_stats = run_receiver(options, dest, reader, receiver_stream, Logger::quiet())
        .expect("receiver succeeds");
    let sender_stats = sender
        .join()
        .expect("sender thread")
        .expect("sender succeeds");
    (sender_stats, receiver_stats)
}

fn slash(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push("/");
    PathBuf::from(os)
}

fn write_with_mtime(path: &Path, contents: &[u8], mtime: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

#[test]
fn fresh_tree_transfers_completely() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_with_mtime(&src.path().join("a"), b"hello\n", 1_600_000_000);
    write_with_mtime(&src.path().join("b/c"), b"world\n", 1_600_000_001);

    let options = Options {
        recursive: true,
        preserve_times: true,
        ..Options::default()
    };
    let (sender_stats, receiver_stats) =
        transfer(&options, vec![slash(src.path())], dst.path());

    assert_eq!(fs::read(dst.path().join("a")).unwrap(), b"hello\n");
    assert_eq!(fs::read(dst.path().join("b/c")).unwrap(), b"world\n");
    assert_eq!(sender_stats.total_size, 12);
    assert_eq!(receiver_stats.total_size, 12);
    // Opposite ends of the same stream must agree byte-for-byte.
    assert_eq!(sender_stats.bytes_written, receiver_stats.bytes_read);
    assert_eq!(sender_stats.bytes_read, receiver_stats.bytes_written);
}

#[test]
fn preserved_times_make_the_second_run_a_no_op() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_with_mtime(&src.path().join("data"), &vec![7u8; 10_000], 1_600_000_000);

    let options = Options {
        recursive: true,
        preserve_times: true,
        ..Options::default()
    };
    transfer(&options, vec![slash(src.path())], dst.path());

    let before = fs::metadata(dst.path().join("data")).unwrap();
    let (_, second) = transfer(&options, vec![slash(src.path())], dst.path());
    let after = fs::metadata(dst.path().join("data")).unwrap();

    // The quick check skipped the file: same inode, nothing renamed over it.
    assert_eq!(before.ino(), after.ino());
    // Only list, phase markers, and stats crossed the wire.
    assert!(second.bytes_read < 200, "read {} bytes", second.bytes_read);
}

#[test]
fn identical_content_moves_no_literal_data() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let payload: Vec<u8> = b"0123456789".repeat(1000);
    // Different mtimes force a transfer; identical content keeps it all
    // block matches.
    write_with_mtime(&src.path().join("a"), &payload, 1_600_000_000);
    write_with_mtime(&dst.path().join("a"), &payload, 1_500_000_000);

    let options = Options {
        recursive: true,
        preserve_times: true,
        ..Options::default()
    };
    let (sender_stats, _) = transfer(&options, vec![slash(src.path())], dst.path());

    assert_eq!(fs::read(dst.path().join("a")).unwrap(), payload);
    // 10k of payload collapses into match tokens; the stream is dominated
    // by the file list and block set instead.
    assert!(
        sender_stats.bytes_written < 2000,
        "wrote {} bytes",
        sender_stats.bytes_written
    );
}

#[test]
fn changed_prefix_reuses_the_shared_payload() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let payload: Vec<u8> = (0..1_048_576u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8)
        .collect();
    let mut ours = b"AAAA".to_vec();
    ours.extend_from_slice(&payload);
    let mut theirs = b"BBBB".to_vec();
    theirs.extend_from_slice(&payload);

    write_with_mtime(&dst.path().join("a"), &ours, 1_500_000_000);
    write_with_mtime(&src.path().join("a"), &theirs, 1_600_000_000);

    let options = Options {
        recursive: true,
        preserve_times: true,
        ..Options::default()
    };
    let (sender_stats, _) = transfer(&options, vec![slash(src.path())], dst.path());

    assert_eq!(fs::read(dst.path().join("a")).unwrap(), theirs);
    // Only the block containing the changed prefix travels as literal
    // data; the remaining megabyte is reproduced from the basis.
    assert!(
        sender_stats.bytes_written < 60_000,
        "wrote {} bytes",
        sender_stats.bytes_written
    );
}

#[test]
fn delete_removes_extraneous_entries() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_with_mtime(&src.path().join("keep"), b"keep\n", 1_600_000_000);
    write_with_mtime(&dst.path().join("x"), b"extraneous\n", 1_600_000_000);
    fs::create_dir_all(dst.path().join("old/deep")).unwrap();
    write_with_mtime(&dst.path().join("old/deep/y"), b"also\n", 1_600_000_000);

    let options = Options {
        recursive: true,
        preserve_times: true,
        delete: true,
        ..Options::default()
    };
    transfer(&options, vec![slash(src.path())], dst.path());

    assert!(dst.path().join("keep").exists());
    assert!(!dst.path().join("x").exists());
    assert!(!dst.path().join("old").exists(), "extraneous tree removed bottom-up");
}

#[test]
fn symlinks_are_recreated_not_followed() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_with_mtime(&src.path().join("target"), b"pointee\n", 1_600_000_000);
    fs::create_dir_all(src.path().join("sub")).unwrap();
    symlink("../target", src.path().join("sub/link")).unwrap();

    let options = Options {
        recursive: true,
        preserve_times: true,
        preserve_links: true,
        ..Options::default()
    };
    transfer(&options, vec![slash(src.path())], dst.path());

    let link = dst.path().join("sub/link");
    let meta = fs::symlink_metadata(&link).unwrap();
    assert!(meta.file_type().is_symlink(), "a symlink, not a regular file");
    assert_eq!(fs::read_link(&link).unwrap(), Path::new("../target"));
}

#[test]
fn dry_run_touches_nothing_but_matches_real_wire_traffic() {
    let src = tempfile::tempdir().unwrap();
    write_with_mtime(&src.path().join("a"), b"hello\n", 1_600_000_000);
    write_with_mtime(&src.path().join("b/c"), b"world\n", 1_600_000_001);

    let dry_dst = tempfile::tempdir().unwrap();
    let dry = Options {
        recursive: true,
        preserve_times: true,
        dry_run: true,
        ..Options::default()
    };
    let (dry_sender, _) = transfer(&dry, vec![slash(src.path())], dry_dst.path());
    assert_eq!(
        fs::read_dir(dry_dst.path()).unwrap().count(),
        0,
        "dry run must not create anything"
    );

    let real_dst = tempfile::tempdir().unwrap();
    let real = Options {
        recursive: true,
        preserve_times: true,
        ..Options::default()
    };
    let (real_sender, _) = transfer(&real, vec![slash(src.path())], real_dst.path());

    assert_eq!(dry_sender.bytes_written, real_sender.bytes_written);
    assert_eq!(dry_sender.bytes_read, real_sender.bytes_read);
}

#[test]
fn single_file_to_file_destination() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write_with_mtime(&src.path().join("one"), b"single\n", 1_600_000_000);

    let options = Options {
        preserve_times: true,
        ..Options::default()
    };
    let dest_file = dst.path().join("renamed");
    transfer(&options, vec![src.path().join("one")], &dest_file);

    assert_eq!(fs::read(&dest_file).unwrap(), b"single\n");
}

#[test]
fn non_directory_destination_is_a_fatal_local_error() {
    let src = tempfile::tempdir().unwrap();
    write_with_mtime(&src.path().join("a"), b"one\n", 1_600_000_000);
    write_with_mtime(&src.path().join("b"), b"two\n", 1_600_000_000);

    let dst = tempfile::tempdir().unwrap();
    let blocker = dst.path().join("blocker");
    fs::write(&blocker, b"in the way").unwrap();

    let (sender_stream, receiver_stream) = UnixStream::pair().expect("socketpair");
    let options = Options {
        recursive: true,
        preserve_times: true,
        ..Options::default()
    };

    let sender_options = options.clone();
    let sources = vec![slash(src.path())];
    let sender = thread::spawn(move || {
        let reader = sender_stream.try_clone().expect("clone stream");
        run_sender(&sender_options, &sources, reader, sender_stream, Logger::quiet())
    });

    let reader = receiver_stream.try_clone().expect("clone stream");
    let err = run_receiver(&options, &blocker, reader, receiver_stream, Logger::quiet())
        .expect_err("a file cannot hold a multi-entry transfer");
    assert!(matches!(err, EngineError::Io(_)), "got {err:?}");

    // The receiver hung up before phase 1; the sender sees the broken
    // stream as a protocol failure.
    assert!(sender.join().expect("sender thread").is_err());
    assert_eq!(fs::read(&blocker).unwrap(), b"in the way");
}

#[test]
fn boundary_sizes_survive_a_session() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();

    let sizes = [0usize, 1, 699, 700, 701, 2100, 2101, 2799];
    for (i, size) in sizes.iter().enumerate() {
        let data: Vec<u8> = (0..*size).map(|b| (b * 37 % 256) as u8).collect();
        write_with_mtime(&src.path().join(format!("f{i}")), &data, 1_600_000_000);
    }

    let options = Options {
        recursive: true,
        preserve_times: true,
        ..Options::default()
    };
    transfer(&options, vec![slash(src.path())], dst.path());

    for (i, size) in sizes.iter().enumerate() {
        let data = fs::read(dst.path().join(format!("f{i}"))).unwrap();
        assert_eq!(data.len(), *size, "file f{i}");
    }
}
