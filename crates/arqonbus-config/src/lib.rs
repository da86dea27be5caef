//! Config schema, discovery/loading, env substitution, and validation for
//! ArqonBus. Produces one immutable [`ArqonConfig`] snapshot at startup;
//! reload requires a process restart (§6).

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::{config_dir, discover_and_load, load_config};
pub use schema::ArqonConfig;
