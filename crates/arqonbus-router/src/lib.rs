//! Routing engine (§4.4): resolves an envelope's recipient set and fans it
//! out to the client registry's per-session send queues.
//!
//! No global ordering is guaranteed across recipients; each recipient's
//! queue preserves FIFO order for messages addressed to it (§7).

pub mod error;
pub mod route;

pub use error::{Error, Result};
pub use route::{DeliveryOutcome, Router};
