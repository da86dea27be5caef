//! CASIL: the content-aware safety/inspection layer (§4.5).
//!
//! Every data-bearing envelope passes through [`Engine::inspect`] before
//! routing: enabled-check, scope-match, classify, policy-evaluate, with
//! internal-error-containment around the whole pass.

pub mod classify;
pub mod engine;
pub mod error;
pub mod redact;
pub mod scope;

pub use engine::Engine;
pub use error::{Error, Result};
