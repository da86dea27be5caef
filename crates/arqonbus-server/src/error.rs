use thiserror::Error;

/// Errors composed upward from every core crate, plus the connection
/// lifecycle's own (§7: "composed upward into the server's error type via
/// `#[from]`/`#[error(transparent)]`").
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Common(#[from] arqonbus_common::Error),

    #[error(transparent)]
    Registry(#[from] arqonbus_registry::Error),

    #[error(transparent)]
    Rooms(#[from] arqonbus_rooms::Error),

    #[error(transparent)]
    Router(#[from] arqonbus_router::Error),

    #[error(transparent)]
    Casil(#[from] arqonbus_casil::Error),

    #[error(transparent)]
    History(#[from] arqonbus_history::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
