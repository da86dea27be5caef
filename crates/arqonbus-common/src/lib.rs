//! Shared error handling and time helpers used across the ArqonBus crates.

pub mod error;
pub mod time;

pub use error::{Error, FromMessage, Result};
