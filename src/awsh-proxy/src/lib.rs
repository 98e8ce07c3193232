//! awsh security proxy.
//!
//! Sits between the frontend and the AI backend on Unix sockets. Every
//! frontend-to-backend message is checked against a fixed rule set before it
//! is forwarded; backend-to-frontend traffic passes through untouched. A
//! blocked message never reaches the backend, so the backend's view of the
//! conversation contains only admitted input.

pub mod relay;
pub mod rules;

pub use relay::SecurityProxy;
pub use rules::{BlockReason, RuleSet, Verdict};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("could not bind proxy socket {path}: {source}")]
    Bind {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("rule pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
