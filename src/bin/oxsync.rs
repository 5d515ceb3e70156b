#![deny(unsafe_code)]

use std::io::Write;
use std::{env, io, process::ExitCode};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();
    let status = run_with(env::args_os(), &mut stdout, &mut stderr);
    ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX))
}

fn run_with<I, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
    Out: Write,
    Err: Write,
{
    cli::run(args, stdout, stderr)
}
