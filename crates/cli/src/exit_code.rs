/// Process exit codes of the client and server binaries.
///
/// The numbering is part of the CLI contract: scripts branch on it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitCode {
    /// Transfer completed (per-file errors may still have been logged).
    Ok,
    /// Bad usage: unknown flag, missing operand, unsupported operand form.
    Usage,
    /// Protocol violation or remote-side failure.
    Protocol,
    /// Fatal local I/O failure.
    Io,
}

impl ExitCode {
    /// Numeric value handed to the operating system.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Usage => 1,
            Self::Protocol => 2,
            Self::Io => 3,
        }
    }

    /// Short human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::Usage => "usage error",
            Self::Protocol => "protocol or remote error",
            Self::Io => "local I/O error",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_matches_the_contract() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::Usage.as_i32(), 1);
        assert_eq!(ExitCode::Protocol.as_i32(), 2);
        assert_eq!(ExitCode::Io.as_i32(), 3);
    }

    #[test]
    fn descriptions_are_stable() {
        assert_eq!(ExitCode::Ok.description(), "success");
        assert_eq!(ExitCode::Protocol.description(), "protocol or remote error");
    }
}
