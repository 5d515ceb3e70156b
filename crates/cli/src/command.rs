use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};
use engine::Options;

/// Builds the clap command for the client binary.
///
/// `--server` and `--sender` are internal: the client embeds them in the
/// command line it composes for the spawned peer, so they are hidden from
/// the help text but always accepted.
pub(crate) fn clap_command() -> Command {
    Command::new("oxsync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Synchronizes file trees over the legacy rsync wire protocol (version 27)")
        .arg(
            Arg::new("recursive")
                .short('r')
                .long("recursive")
                .help("recurse into directories")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("increase verbosity (repeatable)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("dry-run")
                .short('n')
                .long("dry-run")
                .help("show what would be transferred without changing the destination")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("times")
                .short('t')
                .long("times")
                .help("preserve modification times")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("perms")
                .short('p')
                .long("perms")
                .help("preserve permissions")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("links")
                .short('l')
                .long("links")
                .help("copy symlinks as symlinks")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("delete")
                .long("delete")
                .help("delete destination entries that are missing from the source")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("rsync-path")
                .long("rsync-path")
                .value_name("PROGRAM")
                .help("program to run on the remote machine"),
        )
        .arg(
            Arg::new("sender")
                .long("sender")
                .hide(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("server")
                .long("server")
                .hide(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("paths")
                .value_name("PATH")
                .num_args(0..)
                .action(ArgAction::Append),
        )
}

/// Extracts the engine option record and the positional operands.
pub(crate) fn split_matches(matches: &mut ArgMatches) -> (Options, Vec<String>) {
    let options = Options {
        sender: matches.get_flag("sender"),
        server: matches.get_flag("server"),
        recursive: matches.get_flag("recursive"),
        verbosity: matches.get_count("verbose"),
        dry_run: matches.get_flag("dry-run"),
        preserve_times: matches.get_flag("times"),
        preserve_perms: matches.get_flag("perms"),
        preserve_links: matches.get_flag("links"),
        delete: matches.get_flag("delete"),
        rsync_path: matches.remove_one::<String>("rsync-path").map(PathBuf::from),
    };
    let operands = matches
        .remove_many::<String>("paths")
        .map(Iterator::collect)
        .unwrap_or_default();
    (options, operands)
}
