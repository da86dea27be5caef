use std::sync::Arc;

use arqonbus_casil::Engine as CasilEngine;
use arqonbus_commands::CommandRegistry;
use arqonbus_config::schema::ArqonConfig;
use arqonbus_history::HistoryStore;
use arqonbus_registry::Registry;
use arqonbus_rooms::RoomsStore;

use crate::auth::Authenticator;
use crate::error::Result;
use crate::telemetry::TelemetrySink;
use crate::validate::Validator;

/// Everything a connection task needs, shared across every live session
/// (§5: "parallel per-connection reader/writer tasks" over these
/// partitioned, lock-striped stores).
pub struct ServerState {
    pub config: ArqonConfig,
    pub validator: Validator,
    pub registry: Arc<Registry>,
    pub rooms: Arc<RoomsStore>,
    pub history: Arc<HistoryStore>,
    pub casil: Arc<CasilEngine>,
    pub commands: Arc<CommandRegistry>,
    pub authenticator: Arc<dyn Authenticator>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl ServerState {
    pub fn new(
        config: ArqonConfig,
        authenticator: Arc<dyn Authenticator>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self> {
        let validator = Validator::new(&config.validation)
            .map_err(|e| arqonbus_common::Error::message(format!("invalid id_grammar regex: {e}")))?;
        let registry = Arc::new(Registry::new(
            config.registry.send_queue_depth,
            config.registry.duplicate_identity_policy,
        ));
        let rooms = Arc::new(RoomsStore::new(
            config.rooms.auto_create_default,
            config.rooms.auto_create_opt_out_tenants.clone(),
        ));
        let history = Arc::new(HistoryStore::new(&config.history));
        let casil = Arc::new(CasilEngine::new(&config.casil)?);
        let commands = Arc::new(CommandRegistry::new());

        Ok(Self {
            config,
            validator,
            registry,
            rooms,
            history,
            casil,
            commands,
            authenticator,
            telemetry,
        })
    }
}
