//! awsh sandbox.
//!
//! Owns a persistent shell attached to a pseudo-terminal inside a restricted
//! filesystem view. Commands arrive one per connection on a Unix socket, run
//! to completion (or are declared interactive), and the classified result is
//! published through the shared result channel before the acknowledgment is
//! sent.

pub mod executor;
pub mod fsview;
pub mod server;
pub mod session;
pub mod transcript;

pub use executor::{Executor, PromptCompletion};
pub use fsview::FsView;
pub use server::SandboxServer;
pub use session::ShellSession;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("pty setup failed: {0}")]
    Pty(anyhow::Error),

    #[error("shell spawn failed: {0}")]
    Spawn(anyhow::Error),

    #[error("shell session has exited")]
    ShellExited,

    #[error("pty i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Channel(#[from] awsh_protocol::ChannelError),

    #[error("filesystem view setup failed at {path}: {source}")]
    FsView {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SandboxError>;
