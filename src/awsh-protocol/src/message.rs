//! Control messages and fixed protocol tokens.
//!
//! The frontend speaks a small line-oriented vocabulary to the backend
//! (through the proxy). Everything that is not a recognized control message
//! is treated as opaque query text by the relay.

use serde::{Deserialize, Serialize};

/// Sandbox socket acknowledgment: the channel record is valid.
pub const ACK_OK: &str = "OK";

/// Sandbox socket acknowledgment: execution failed, channel holds an error
/// record.
pub const ACK_ERROR: &str = "ERROR";

/// Backend readiness replies to a `STATUS` probe.
pub const STATUS_READY: &str = "AI_READY";
pub const STATUS_LOADING: &str = "AI_LOADING";

/// Command line buffer limit, shared by the frontend and the sandbox server.
pub const MAX_COMMAND_LEN: usize = 4096;

/// Prefix notice the proxy sends back in place of a blocked message.
pub const BLOCKED_PREFIX: &str = "SECURITY_BLOCKED:";

/// Messages the proxy forwards without policy checks. These carry session
/// bookkeeping, not user-influenced command text; blocking `CWD:` would
/// desync the backend's working directory.
pub const BYPASS_PREFIXES: &[&str] = &[
    "CWD:",
    "STATUS",
    "BASH_FAILED:",
    "VERBOSE:",
    "MODEL:",
    "AI_PROVIDER:",
];

/// A parsed frontend-to-backend message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Natural-language query text.
    Query(String),

    /// Readiness probe; answered with [`STATUS_READY`] or [`STATUS_LOADING`].
    Status,

    /// Working-directory sync after a `cd`.
    Cwd(String),

    /// A direct shell execution failed; the capture file holds its output.
    BashFailed {
        exit_code: i32,
        command: String,
        capture_path: String,
    },

    /// Session verbosity level.
    Verbose(u8),

    /// Model selection.
    Model(String),

    /// Provider selection.
    Provider(String),
}

impl ControlMessage {
    /// Render the wire line (no trailing newline).
    pub fn encode(&self) -> String {
        match self {
            ControlMessage::Query(text) => format!("QUERY:{text}"),
            ControlMessage::Status => "STATUS".to_owned(),
            ControlMessage::Cwd(path) => format!("CWD:{path}"),
            ControlMessage::BashFailed {
                exit_code,
                command,
                capture_path,
            } => format!("BASH_FAILED:{exit_code}:{command}:{capture_path}"),
            ControlMessage::Verbose(level) => format!("VERBOSE:{level}"),
            ControlMessage::Model(name) => format!("MODEL:{name}"),
            ControlMessage::Provider(name) => format!("AI_PROVIDER:{name}"),
        }
    }

    /// Parse a wire line. Returns `None` for anything outside the vocabulary.
    pub fn parse(line: &str) -> Option<Self> {
        if line == "STATUS" {
            return Some(ControlMessage::Status);
        }
        if let Some(text) = line.strip_prefix("QUERY:") {
            return Some(ControlMessage::Query(text.to_owned()));
        }
        if let Some(path) = line.strip_prefix("CWD:") {
            return Some(ControlMessage::Cwd(path.to_owned()));
        }
        if let Some(rest) = line.strip_prefix("BASH_FAILED:") {
            // Format is <code>:<cmd>:<tmpfile>; the command may itself
            // contain colons, the capture path may not.
            let (code_text, rest) = rest.split_once(':')?;
            let (command, capture_path) = rest.rsplit_once(':')?;
            let exit_code = code_text.parse().ok()?;
            return Some(ControlMessage::BashFailed {
                exit_code,
                command: command.to_owned(),
                capture_path: capture_path.to_owned(),
            });
        }
        if let Some(level) = line.strip_prefix("VERBOSE:") {
            return Some(ControlMessage::Verbose(level.parse().ok()?));
        }
        if let Some(name) = line.strip_prefix("MODEL:") {
            return Some(ControlMessage::Model(name.to_owned()));
        }
        if let Some(name) = line.strip_prefix("AI_PROVIDER:") {
            return Some(ControlMessage::Provider(name.to_owned()));
        }
        None
    }
}

/// Whether a raw outbound payload is exempt from policy checks.
pub fn is_bypass_message(payload: &str) -> bool {
    BYPASS_PREFIXES
        .iter()
        .any(|prefix| payload.starts_with(prefix))
}
