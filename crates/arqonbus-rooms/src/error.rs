use thiserror::Error;

/// Errors raised by the rooms/channels store (§4.3).
#[derive(Debug, Error)]
pub enum Error {
    #[error("room {room:?} not found for tenant {tenant_id:?}")]
    RoomNotFound { tenant_id: String, room: String },

    #[error("channel {channel:?} not found in room {room:?} for tenant {tenant_id:?}")]
    ChannelNotFound {
        tenant_id: String,
        room: String,
        channel: String,
    },

    #[error("channel {channel:?} already exists in room {room:?} for tenant {tenant_id:?}")]
    ChannelAlreadyExists {
        tenant_id: String,
        room: String,
        channel: String,
    },

    #[error("auto-create is disabled for tenant {tenant_id:?}")]
    AutoCreateDisabled { tenant_id: String },
}

pub type Result<T> = std::result::Result<T, Error>;
