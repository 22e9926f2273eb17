use std::path::PathBuf;

use clap::Parser;
use kitsune_server::ServerBuilder;
use kitsune_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

/// Receives Firefox Accounts security events and records them for processing.
#[derive(Debug, Parser)]
#[command(name = "kitsune-server", version, about)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, env = "KITSUNE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `server.port`
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();

    // Initialize tracing early with the default level
    kitsune_server::observability::init_tracing();

    let mut cfg = match load_config(cli.config.to_str()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }

    tracing::info!(
        path = %cli.config.display(),
        exists = cli.config.exists(),
        storage = ?cfg.storage.backend,
        "Configuration loaded"
    );

    kitsune_server::observability::apply_logging_level(&cfg.logging.level);

    let server = ServerBuilder::new().with_config(cfg).build().await?;
    server.run().await
}
