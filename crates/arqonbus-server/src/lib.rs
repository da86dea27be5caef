//! The WebSocket connection lifecycle, envelope validator wiring, and
//! concurrency glue that ties the leaf-first component crates into one
//! running bus (§4.1, §5).

pub mod app;
pub mod auth;
pub mod error;
pub mod state;
pub mod telemetry;
pub mod validate;
pub mod ws;

pub use app::{build_app, serve};
pub use auth::{Authenticator, ConnectAuth, StaticTokenAuthenticator};
pub use error::{Error, Result};
pub use state::ServerState;
pub use telemetry::{NoopTelemetrySink, RingTelemetrySink, TelemetryEvent, TelemetrySink};
