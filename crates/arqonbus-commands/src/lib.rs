//! The control-plane command executor (§4.7): a fixed, versioned set of
//! named operations dispatched against a declared argument schema and a
//! role-based authorization gate, independent of the data-plane message
//! path handled by `arqonbus-router`.

pub mod args;
pub mod context;
pub mod error;
pub mod handlers;
pub mod registry;

pub use context::CommandContext;
pub use error::{Error, Result};
pub use registry::{CommandRegistry, CommandResult, COMMAND_NAMES};
