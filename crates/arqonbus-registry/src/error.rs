use thiserror::Error;

/// Errors raised by the client registry / session fabric (§4.2).
#[derive(Debug, Error)]
pub enum Error {
    #[error("client {client_id:?} is already registered for tenant {tenant_id:?}")]
    DuplicateIdentity { tenant_id: String, client_id: String },

    #[error("no session for client {client_id:?} in tenant {tenant_id:?}")]
    NotFound { tenant_id: String, client_id: String },

    #[error("send queue for client {client_id:?} is saturated")]
    QueueFull { client_id: String },
}

pub type Result<T> = std::result::Result<T, Error>;
