use thiserror::Error;

/// Errors raised while dispatching a control-plane command (§4.7).
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown command: {0}")]
    NotFound(String),

    #[error("invalid arguments for {command}: {reason}")]
    InvalidArgs { command: String, reason: String },

    #[error("role {role:?} is not authorized for {command}")]
    Unauthorized { command: String, role: String },
}

pub type Result<T> = std::result::Result<T, Error>;
