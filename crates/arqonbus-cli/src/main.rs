use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "arqonbus", about = "ArqonBus — multi-tenant real-time message bus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Path to a config file (overrides standard discovery locations).
    #[arg(long, global = true, env = "ARQONBUS_CONFIG")]
    config: Option<std::path::PathBuf>,
    /// Static bearer token accepted by the built-in authenticator.
    #[arg(long, global = true, env = "ARQONBUS_TOKEN")]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bus server (default when no subcommand is provided).
    Serve,
    /// Inspect the effective configuration without starting the server.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the resolved configuration as JSON.
    Show,
    /// Load and validate the configuration, then exit.
    Check,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry.with(fmt::layer().json().with_target(true).with_thread_ids(false)).init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_ids(false).with_ansi(true))
            .init();
    }
}

fn load_config(cli: &Cli) -> arqonbus_config::ArqonConfig {
    match &cli.config {
        Some(path) => arqonbus_config::load_config(path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            arqonbus_config::ArqonConfig::default()
        }),
        None => arqonbus_config::discover_and_load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "arqonbus starting");

    match cli.command {
        None | Some(Commands::Serve) => {
            let mut config = load_config(&cli);
            if let Some(ref bind) = cli.bind {
                config.server.bind_address = bind.clone();
            }
            if let Some(port) = cli.port {
                config.server.port = port;
            }

            let authenticator: Arc<dyn arqonbus_server::Authenticator> =
                Arc::new(arqonbus_server::StaticTokenAuthenticator::new(cli.token.clone(), Vec::new()));
            let telemetry: Arc<dyn arqonbus_server::TelemetrySink> = Arc::new(arqonbus_server::NoopTelemetrySink);

            let state = Arc::new(arqonbus_server::ServerState::new(config, authenticator, telemetry)?);
            arqonbus_server::serve(state).await?;
            Ok(())
        },
        Some(Commands::Config { action }) => {
            let config = load_config(&cli);
            match action {
                ConfigAction::Show => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                },
                ConfigAction::Check => {
                    println!("config OK (bind {}:{})", config.server.bind_address, config.server.port);
                },
            }
            Ok(())
        },
    }
}
