use std::env;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use engine::Options;

/// Executable invoked on the remote side when `--rsync-path` is not given.
const DEFAULT_REMOTE_PROGRAM: &str = "rsync";

/// Shell used to reach `host:path` operands.
const REMOTE_SHELL: &str = "ssh";

/// Composes the argument vector for a spawned server.
///
/// The server re-derives its option record from these flags, so every flag
/// that changes engine behavior must be forwarded. The lone `.` separates
/// options from paths, matching the convention the original tooling uses
/// for its server command lines.
pub(crate) fn server_args(options: &Options, sender: bool, paths: &[String]) -> Vec<String> {
    let mut args = vec!["--server".to_string()];
    if sender {
        args.push("--sender".to_string());
    }
    for _ in 0..options.verbosity {
        args.push("-v".to_string());
    }
    if options.recursive {
        args.push("-r".to_string());
    }
    if options.dry_run {
        args.push("-n".to_string());
    }
    if options.preserve_times {
        args.push("-t".to_string());
    }
    if options.preserve_perms {
        args.push("-p".to_string());
    }
    if options.preserve_links {
        args.push("-l".to_string());
    }
    if options.delete {
        args.push("--delete".to_string());
    }
    args.push(".".to_string());
    args.extend(paths.iter().cloned());
    args
}

/// Spawns the peer for a local↔local transfer: this executable again, in
/// server mode, wired up through its stdio.
pub(crate) fn spawn_local_server(
    options: &Options,
    sender: bool,
    paths: &[String],
) -> io::Result<Child> {
    let exe = env::current_exe()?;
    Command::new(exe)
        .args(server_args(options, sender, paths))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
}

/// Spawns the peer on `host` over the remote shell.
pub(crate) fn spawn_remote_server(
    host: &str,
    options: &Options,
    sender: bool,
    paths: &[String],
) -> io::Result<Child> {
    let program = options
        .rsync_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_REMOTE_PROGRAM));

    let mut command = Command::new(REMOTE_SHELL);
    command.arg(host).arg(program);
    command.args(server_args(options, sender, paths));
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
}
