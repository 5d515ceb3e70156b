//! End-to-end tests driving the real binary for local transfers.
//!
//! Each client invocation re-execs the binary as its `--server` peer, so
//! these exercise the full path: argument parsing, peer spawning, the
//! handshake, and both role drivers.

use std::fs;
use std::os::unix::fs::{MetadataExt, symlink};
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;

fn oxsync() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("oxsync").expect("binary builds")
}

fn slash(path: &Path) -> String {
    format!("{}/", path.display())
}

#[test]
fn fresh_tree_is_copied() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a"), b"hello\n").unwrap();
    fs::create_dir(src.path().join("b")).unwrap();
    fs::write(src.path().join("b/c"), b"world\n").unwrap();

    oxsync()
        .args(["-rt", &slash(src.path()), &dst.path().display().to_string()])
        .assert()
        .success();

    assert_eq!(fs::read(dst.path().join("a")).unwrap(), b"hello\n");
    assert_eq!(fs::read(dst.path().join("b/c")).unwrap(), b"world\n");
}

#[test]
fn second_run_leaves_files_in_place() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("data"), vec![9u8; 4096]).unwrap();

    let dest = dst.path().display().to_string();
    oxsync().args(["-rt", &slash(src.path()), &dest]).assert().success();
    let first = fs::metadata(dst.path().join("data")).unwrap();

    oxsync().args(["-rt", &slash(src.path()), &dest]).assert().success();
    let second = fs::metadata(dst.path().join("data")).unwrap();

    assert_eq!(first.ino(), second.ino(), "up-to-date file must not be replaced");
}

#[test]
fn delete_sweeps_extraneous_entries() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("keep"), b"keep").unwrap();
    fs::write(dst.path().join("x"), b"extraneous").unwrap();

    oxsync()
        .args([
            "-rt",
            "--delete",
            &slash(src.path()),
            &dst.path().display().to_string(),
        ])
        .assert()
        .success();

    assert!(dst.path().join("keep").exists());
    assert!(!dst.path().join("x").exists());
}

#[test]
fn symlinks_arrive_as_symlinks() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("target"), b"pointee").unwrap();
    symlink("../target", src.path().join("link")).unwrap();

    oxsync()
        .args(["-rtl", &slash(src.path()), &dst.path().display().to_string()])
        .assert()
        .success();

    let link = dst.path().join("link");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&link).unwrap(), Path::new("../target"));
}

#[test]
fn dry_run_creates_nothing() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a"), b"data").unwrap();

    oxsync()
        .args(["-rtn", &slash(src.path()), &dst.path().display().to_string()])
        .assert()
        .success();

    assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 0);
}

#[test]
fn verbose_run_reports_a_summary() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a"), b"summary test").unwrap();

    let assert = oxsync()
        .args(["-rtv", &slash(src.path()), &dst.path().display().to_string()])
        .assert()
        .success();

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("sent"), "summary missing from: {stderr}");
    assert!(stderr.contains("total size"), "summary missing from: {stderr}");
}

#[test]
fn missing_operands_exit_with_usage_error() {
    oxsync().assert().failure().code(1);
}

#[test]
fn daemon_operands_are_rejected() {
    let dst = tempfile::tempdir().unwrap();
    oxsync()
        .args(["rsync://mirror/pub/x", &dst.path().display().to_string()])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn single_file_copy_to_new_name() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    fs::write(src.path().join("one"), b"single file\n").unwrap();

    let dest = dst.path().join("copy");
    oxsync()
        .args([
            "-t",
            &src.path().join("one").display().to_string(),
            &dest.display().to_string(),
        ])
        .assert()
        .success();

    assert_eq!(fs::read(&dest).unwrap(), b"single file\n");
}
