//! Command-line frontend for the oxsync client and its spawned servers.
//!
//! The same binary serves three invocations: the interactive client, the
//! `--server` receiver, and the `--server --sender` generator. The client
//! parses operands into file arguments, spawns the matching peer (over
//! `ssh` for remote operands, a re-exec of itself for local ones), and
//! drives its role of the session over the peer's stdio.

mod args;
mod client;
mod command;
mod exit_code;
mod server;
mod spawn;

use std::ffi::OsString;
use std::io::Write;

pub use args::{ArgsError, FileArgs, Role, parse_file_args};
pub use exit_code::ExitCode;

/// Parses arguments and runs the requested role to completion.
///
/// Returns the process exit status; help and version output go to
/// `stdout`, argument errors to `stderr`. All transfer-time diagnostics
/// flow through the session logger onto the process stderr.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let mut matches = match command::clap_command().try_get_matches_from(arguments) {
        Ok(matches) => matches,
        Err(err) => {
            use clap::error::ErrorKind;

            let rendered = err.render();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    let _ = write!(stdout, "{rendered}");
                    ExitCode::Ok.as_i32()
                }
                _ => {
                    let _ = write!(stderr, "{rendered}");
                    ExitCode::Usage.as_i32()
                }
            };
        }
    };

    let (options, operands) = command::split_matches(&mut matches);
    let code = if options.server {
        server::run_server(&options, &operands)
    } else {
        client::run_client(&options, &operands)
    };
    code.as_i32()
}
