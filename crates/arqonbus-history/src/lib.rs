//! History/persistence layer (§4.6): an append-only per-`(tenant, room,
//! channel)` log with a bounded in-memory ring as the authoritative default,
//! and an optional durable mirror behind the `durable-sqlite` feature.

pub mod entry;
pub mod error;
#[cfg(feature = "durable-sqlite")]
pub mod durable;
pub mod ring;
pub mod store;

pub use entry::{HistoryEntry, HistoryKey};
pub use error::{Error, Result};
pub use store::HistoryStore;
