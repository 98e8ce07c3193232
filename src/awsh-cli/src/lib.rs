//! awsh frontend.
//!
//! Owns the interactive prompt loop, routes each input line (built-in, shell
//! built-in, direct execution, sandbox classification, AI query), supervises
//! the sandbox and proxy children, and manages terminal-mode transitions
//! around interactive programs.

pub mod backend;
pub mod builtins;
pub mod exec;
pub mod prompt;
pub mod router;
pub mod sandbox_client;
pub mod session;
pub mod supervisor;
pub mod term;

pub use session::Session;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("socket i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no acknowledgment from the sandbox")]
    NoAck,

    #[error(transparent)]
    Channel(#[from] awsh_protocol::ChannelError),

    #[error("backend did not answer within the ceiling")]
    BackendTimeout,
}

pub type Result<T> = std::result::Result<T, FrontendError>;
