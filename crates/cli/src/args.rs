use thiserror::Error;

/// Which role this process plays for the parsed operands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Both sides are local paths; the transfer runs against a spawned
    /// local peer.
    Local,
    /// The sink is remote: we read local sources and send.
    Sender,
    /// A source is remote: we receive into a local sink.
    Receiver,
}

/// Parsed command-line target selection.
///
/// `sources` and `sink` carry bare paths: for remote operands the
/// `host:`/URL prefix is already stripped into `host`/`module`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileArgs {
    /// Remote host (with optional `user@`), if any operand was remote.
    pub host: Option<String>,
    /// Daemon module name for `rsync://` or `host::module` operands.
    pub module: Option<String>,
    /// `true` for the `rsync://` URL form, `false` for `host:path` forms.
    pub url_style: bool,
    /// Transfer sources, in command-line order.
    pub sources: Vec<String>,
    /// Transfer destination.
    pub sink: String,
    /// Our role for this invocation.
    pub role: Role,
}

/// Operand problems that make the invocation unusable.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ArgsError {
    /// Fewer than two operands.
    #[error("missing source or destination operand")]
    MissingOperands,
    /// Remote operands on both ends.
    #[error("source and destination cannot both be remote")]
    BothRemote,
    /// Remote sources naming different hosts or modules.
    #[error("all source operands must name the same remote")]
    MixedRemotes,
    /// A malformed `rsync://` operand.
    #[error("cannot parse {0:?} as an rsync:// operand")]
    BadUrl(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct RemoteSpec {
    host: String,
    module: Option<String>,
    url_style: bool,
    path: String,
}

/// Splits a single operand into its remote components, if it has any.
///
/// Recognized forms: `rsync://host/module/path`, `host::module/path`,
/// `user@host:path`. A colon preceded by a slash is part of a local path.
fn split_operand(operand: &str) -> Result<Option<RemoteSpec>, ArgsError> {
    if let Some(rest) = operand.strip_prefix("rsync://") {
        let (host, tail) = rest
            .split_once('/')
            .ok_or_else(|| ArgsError::BadUrl(operand.to_string()))?;
        if host.is_empty() {
            return Err(ArgsError::BadUrl(operand.to_string()));
        }
        let (module, path) = match tail.split_once('/') {
            Some((module, path)) => (module, path),
            None => (tail, ""),
        };
        if module.is_empty() {
            return Err(ArgsError::BadUrl(operand.to_string()));
        }
        return Ok(Some(RemoteSpec {
            host: host.to_string(),
            module: Some(module.to_string()),
            url_style: true,
            path: path.to_string(),
        }));
    }

    let Some(colon) = operand.find(':') else {
        return Ok(None);
    };
    if operand[..colon].contains('/') {
        return Ok(None);
    }

    let host = operand[..colon].to_string();
    let rest = &operand[colon + 1..];
    if let Some(rest) = rest.strip_prefix(':') {
        let (module, path) = match rest.split_once('/') {
            Some((module, path)) => (module, path),
            None => (rest, ""),
        };
        return Ok(Some(RemoteSpec {
            host,
            module: Some(module.to_string()),
            url_style: false,
            path: path.to_string(),
        }));
    }
    Ok(Some(RemoteSpec {
        host,
        module: None,
        url_style: false,
        path: rest.to_string(),
    }))
}

/// Parses the positional operands into the transfer's file arguments.
pub fn parse_file_args(operands: &[String]) -> Result<FileArgs, ArgsError> {
    let Some((sink_operand, source_operands)) = operands.split_last() else {
        return Err(ArgsError::MissingOperands);
    };
    if source_operands.is_empty() {
        return Err(ArgsError::MissingOperands);
    }

    let sink_remote = split_operand(sink_operand)?;
    let mut source_remote: Option<RemoteSpec> = None;
    let mut sources = Vec::with_capacity(source_operands.len());

    for operand in source_operands {
        match split_operand(operand)? {
            Some(spec) => {
                if let Some(seen) = &source_remote {
                    if seen.host != spec.host || seen.module != spec.module {
                        return Err(ArgsError::MixedRemotes);
                    }
                } else {
                    source_remote = Some(spec.clone());
                }
                sources.push(spec.path);
            }
            None => sources.push(operand.clone()),
        }
    }

    match (source_remote, sink_remote) {
        (Some(_), Some(_)) => Err(ArgsError::BothRemote),
        (Some(spec), None) => {
            if sources.len() != source_operands.len() {
                // Local paths mixed into a remote source set would silently
                // resolve on the wrong machine.
                return Err(ArgsError::MixedRemotes);
            }
            Ok(FileArgs {
                host: Some(spec.host),
                module: spec.module,
                url_style: spec.url_style,
                sources,
                sink: sink_operand.clone(),
                role: Role::Receiver,
            })
        }
        (None, Some(spec)) => Ok(FileArgs {
            host: Some(spec.host),
            module: spec.module,
            url_style: spec.url_style,
            sources,
            sink: spec.path,
            role: Role::Sender,
        }),
        (None, None) => Ok(FileArgs {
            host: None,
            module: None,
            url_style: false,
            sources,
            sink: sink_operand.clone(),
            role: Role::Local,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn local_operands_stay_local() {
        let args = parse_file_args(&strings(&["a", "b/", "dest"])).unwrap();
        assert_eq!(args.role, Role::Local);
        assert_eq!(args.host, None);
        assert_eq!(args.sources, ["a", "b/"]);
        assert_eq!(args.sink, "dest");
    }

    #[test]
    fn remote_sink_makes_us_the_sender() {
        let args = parse_file_args(&strings(&["src", "user@example.com:backup/dir"])).unwrap();
        assert_eq!(args.role, Role::Sender);
        assert_eq!(args.host.as_deref(), Some("user@example.com"));
        assert_eq!(args.sink, "backup/dir");
        assert!(!args.url_style);
    }

    #[test]
    fn remote_source_makes_us_the_receiver() {
        let args = parse_file_args(&strings(&["example.com:data", "out"])).unwrap();
        assert_eq!(args.role, Role::Receiver);
        assert_eq!(args.host.as_deref(), Some("example.com"));
        assert_eq!(args.sources, ["data"]);
        assert_eq!(args.sink, "out");
    }

    #[test]
    fn url_operand_parses_host_module_and_path() {
        let args = parse_file_args(&strings(&["rsync://mirror/pub/file.txt", "out"])).unwrap();
        assert_eq!(args.host.as_deref(), Some("mirror"));
        assert_eq!(args.module.as_deref(), Some("pub"));
        assert!(args.url_style);
        assert_eq!(args.sources, ["file.txt"]);
    }

    #[test]
    fn double_colon_is_the_module_form() {
        let args = parse_file_args(&strings(&["mirror::pub/file.txt", "out"])).unwrap();
        assert_eq!(args.module.as_deref(), Some("pub"));
        assert!(!args.url_style);
    }

    #[test]
    fn colon_after_slash_is_a_local_path() {
        let args = parse_file_args(&strings(&["./odd:name", "out"])).unwrap();
        assert_eq!(args.role, Role::Local);
        assert_eq!(args.sources, ["./odd:name"]);
    }

    #[test]
    fn both_remote_is_rejected() {
        let err = parse_file_args(&strings(&["a.com:x", "b.com:y"])).unwrap_err();
        assert_eq!(err, ArgsError::BothRemote);
    }

    #[test]
    fn mixed_remote_hosts_are_rejected() {
        let err = parse_file_args(&strings(&["a.com:x", "b.com:y", "out"])).unwrap_err();
        assert_eq!(err, ArgsError::MixedRemotes);

        let err = parse_file_args(&strings(&["a.com:x", "local", "out"])).unwrap_err();
        assert_eq!(err, ArgsError::MixedRemotes);
    }

    #[test]
    fn single_operand_is_rejected() {
        let err = parse_file_args(&strings(&["only"])).unwrap_err();
        assert_eq!(err, ArgsError::MissingOperands);
    }

    #[test]
    fn malformed_url_is_rejected() {
        let err = parse_file_args(&strings(&["rsync://hostonly", "out"])).unwrap_err();
        assert_eq!(err, ArgsError::BadUrl("rsync://hostonly".to_string()));
    }
}
