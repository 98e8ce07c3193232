//! Command outcomes and their wire encoding.
//!
//! The result channel carries an `i32` exit field. Real process exit
//! statuses occupy 0..=255; three reserved negative values signal
//! out-of-band conditions. In-process code never branches on the raw
//! integers, only on [`CommandOutcome`].

use serde::{Deserialize, Serialize};

/// Wire value for a command that never returned to the shell prompt.
pub const WIRE_INTERACTIVE: i32 = -103;

/// Wire value for a failed command of three or more tokens.
pub const WIRE_INVALID_LONG: i32 = -113;

/// Wire value for a failed command of one or two tokens.
pub const WIRE_INVALID_SHORT: i32 = -109;

/// Classification of a single command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// The command ran to completion with this exit status.
    Exited(i32),

    /// No terminating prompt was observed; the program needs a real TTY.
    Interactive,

    /// Failed and looks like natural language; route to the AI backend.
    InvalidLong,

    /// Failed and looks like a typo; surface a plain error.
    InvalidShort,
}

impl CommandOutcome {
    /// Integer written into the result-channel record.
    pub fn wire_code(self) -> i32 {
        match self {
            CommandOutcome::Exited(code) => code,
            CommandOutcome::Interactive => WIRE_INTERACTIVE,
            CommandOutcome::InvalidLong => WIRE_INVALID_LONG,
            CommandOutcome::InvalidShort => WIRE_INVALID_SHORT,
        }
    }

    /// Inverse of [`wire_code`](Self::wire_code). Any non-reserved value is a
    /// literal exit status.
    pub fn from_wire_code(code: i32) -> Self {
        match code {
            WIRE_INTERACTIVE => CommandOutcome::Interactive,
            WIRE_INVALID_LONG => CommandOutcome::InvalidLong,
            WIRE_INVALID_SHORT => CommandOutcome::InvalidShort,
            code => CommandOutcome::Exited(code),
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, CommandOutcome::Exited(0))
    }
}

impl std::fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandOutcome::Exited(code) => write!(f, "exited({code})"),
            CommandOutcome::Interactive => write!(f, "interactive"),
            CommandOutcome::InvalidLong => write!(f, "invalid-long"),
            CommandOutcome::InvalidShort => write!(f, "invalid-short"),
        }
    }
}

/// Full result of one command: classification plus captured output.
///
/// Produced once per command by the sandbox executor and overwritten by the
/// next command; the channel is a single slot, not a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub outcome: CommandOutcome,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandResult {
    pub fn exited(code: i32, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            outcome: CommandOutcome::Exited(code),
            stdout,
            stderr,
        }
    }

    /// Result carrying only a classification, no output.
    pub fn bare(outcome: CommandOutcome) -> Self {
        Self {
            outcome,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    /// Error record published when execution itself failed.
    pub fn execution_error(message: &str) -> Self {
        Self {
            outcome: CommandOutcome::Exited(1),
            stdout: Vec::new(),
            stderr: message.as_bytes().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sentinels_round_trip() {
        for outcome in [
            CommandOutcome::Interactive,
            CommandOutcome::InvalidLong,
            CommandOutcome::InvalidShort,
            CommandOutcome::Exited(0),
            CommandOutcome::Exited(127),
        ] {
            assert_eq!(CommandOutcome::from_wire_code(outcome.wire_code()), outcome);
        }
    }

    #[test]
    fn sentinel_values_are_distinct() {
        assert_ne!(WIRE_INTERACTIVE, WIRE_INVALID_LONG);
        assert_ne!(WIRE_INTERACTIVE, WIRE_INVALID_SHORT);
        assert_ne!(WIRE_INVALID_LONG, WIRE_INVALID_SHORT);
    }

    #[test]
    fn non_sentinel_codes_are_literal() {
        assert_eq!(
            CommandOutcome::from_wire_code(255),
            CommandOutcome::Exited(255)
        );
        assert_eq!(CommandOutcome::from_wire_code(-1), CommandOutcome::Exited(-1));
    }

    #[test]
    fn only_zero_exit_is_success() {
        assert!(CommandOutcome::Exited(0).is_success());
        assert!(!CommandOutcome::Exited(1).is_success());
        assert!(!CommandOutcome::Interactive.is_success());
        assert!(!CommandOutcome::InvalidLong.is_success());
    }
}
