use std::io;
use std::path::{Path, PathBuf};

use engine::{EngineError, Options, run_receiver, run_sender};
use logging::{Logger, error_log};

use crate::exit_code::ExitCode;

/// Runs this process as the spawned server half of a transfer.
///
/// The client composed our command line: options first, then the `.`
/// separator, then the transfer paths. The roles are inverted relative to
/// the client: `--sender` means the client receives.
pub(crate) fn run_server(options: &Options, operands: &[String]) -> ExitCode {
    let logger = Logger::new(options.verbosity);

    let paths: &[String] = match operands.first() {
        Some(dot) if dot == "." => &operands[1..],
        _ => operands,
    };

    let result = if options.sender {
        if paths.is_empty() {
            error_log!(logger, "server invoked without source paths");
            return ExitCode::Usage;
        }
        let sources: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        run_sender(options, &sources, io::stdin(), io::stdout(), logger)
    } else {
        let Some(dest) = paths.first() else {
            error_log!(logger, "server invoked without a destination path");
            return ExitCode::Usage;
        };
        run_receiver(options, Path::new(dest), io::stdin(), io::stdout(), logger)
    };

    match result {
        Ok(_) => ExitCode::Ok,
        Err(err) => {
            error_log!(logger, "{err}");
            match err {
                EngineError::Protocol(_) => ExitCode::Protocol,
                EngineError::Io(_) => ExitCode::Io,
            }
        }
    }
}
