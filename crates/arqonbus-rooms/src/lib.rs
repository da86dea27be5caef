//! Rooms/channels store (§4.3): the authoritative membership ledger.
//!
//! A room has no independent existence: it is metadata plus the set of
//! channels created within it, and its membership is always the union of
//! its channels' member sets (an Open Question resolved this way, see
//! `DESIGN.md`). A room is removed the moment its last channel is deleted.

pub mod error;
pub mod store;

pub use error::{Error, Result};
pub use store::{ChannelInfo, RoomsStore};
