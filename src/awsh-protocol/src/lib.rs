//! awsh Protocol - Shared wire types between the frontend, sandbox and proxy
//!
//! This crate defines the command outcome type, the result-channel record
//! format published by the sandbox and consumed by the frontend, the control
//! messages exchanged with the AI backend, runtime file paths, and the
//! timeout/retry settings shared by all awsh processes.

pub mod channel;
pub mod message;
pub mod outcome;
pub mod paths;
pub mod record;
pub mod settings;

// Re-exports
pub use channel::{ChannelError, ResultChannelReader, ResultChannelWriter, CHANNEL_CAPACITY};
pub use message::{ControlMessage, ACK_ERROR, ACK_OK, MAX_COMMAND_LEN, STATUS_LOADING, STATUS_READY};
pub use outcome::{CommandOutcome, CommandResult};
pub use paths::RuntimePaths;
pub use record::{decode_record, encode_record, RecordError};
pub use settings::{PollBudget, Settings};
