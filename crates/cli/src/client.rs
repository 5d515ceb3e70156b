use std::io;
use std::path::{Path, PathBuf};

use engine::{EngineError, Options, SessionStats, run_receiver, run_sender};
use logging::{Logger, error_log, info_log};

use crate::args::{Role, parse_file_args};
use crate::exit_code::ExitCode;
use crate::spawn::{spawn_local_server, spawn_remote_server};

/// Runs the client half: parse the operands, spawn the matching peer, and
/// drive our role of the session over the peer's stdio.
pub(crate) fn run_client(options: &Options, operands: &[String]) -> ExitCode {
    let logger = Logger::new(options.verbosity);

    let file_args = match parse_file_args(operands) {
        Ok(args) => args,
        Err(err) => {
            error_log!(logger, "{err}");
            return ExitCode::Usage;
        }
    };
    if file_args.module.is_some() {
        error_log!(
            logger,
            "daemon transfers (rsync:// and host::module operands) are not supported"
        );
        return ExitCode::Usage;
    }

    let spawned = match (&file_args.role, file_args.host.as_deref()) {
        (Role::Local, _) => spawn_local_server(options, false, &[file_args.sink.clone()]),
        (Role::Sender, Some(host)) => {
            spawn_remote_server(host, options, false, &[file_args.sink.clone()])
        }
        (Role::Receiver, Some(host)) => {
            spawn_remote_server(host, options, true, &file_args.sources)
        }
        (_, None) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "remote operand without a host",
        )),
    };
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            error_log!(logger, "failed to start transfer peer: {err}");
            return ExitCode::Io;
        }
    };
    let (Some(child_in), Some(child_out)) = (child.stdin.take(), child.stdout.take()) else {
        error_log!(logger, "transfer peer has no usable stdio");
        let _ = child.kill();
        let _ = child.wait();
        return ExitCode::Io;
    };

    let result = match file_args.role {
        Role::Local | Role::Sender => {
            let sources: Vec<PathBuf> = file_args.sources.iter().map(PathBuf::from).collect();
            run_sender(options, &sources, child_out, child_in, logger)
        }
        Role::Receiver => {
            run_receiver(options, Path::new(&file_args.sink), child_out, child_in, logger)
        }
    };

    match result {
        Ok(stats) => {
            report(logger, &stats);
            match child.wait() {
                Ok(status) if status.success() => ExitCode::Ok,
                Ok(status) => {
                    error_log!(logger, "transfer peer exited with {status}");
                    ExitCode::Protocol
                }
                Err(err) => {
                    error_log!(logger, "cannot collect transfer peer: {err}");
                    ExitCode::Io
                }
            }
        }
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            error_log!(logger, "{err}");
            match err {
                EngineError::Protocol(_) => ExitCode::Protocol,
                EngineError::Io(_) => ExitCode::Io,
            }
        }
    }
}

fn report(logger: Logger, stats: &SessionStats) {
    info_log!(
        logger,
        1,
        "sent {} bytes  received {} bytes  {} files  total size {}",
        stats.bytes_written,
        stats.bytes_read,
        stats.files_transferred,
        stats.total_size
    );
}
