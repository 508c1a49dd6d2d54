//! Postboard - Users and Posts HTTP Service
//!
//! Serves the users/posts JSON API over the storage backend named in the
//! config file or on the command line.

use std::path::PathBuf;

use clap::Parser;
use postboard::config::{Config, ConfigOverrides, CONFIG_PATH_DEFAULT};
use postboard::{server, APP_NAME, APP_VERSION};

// =============================================================================
// CLI
// =============================================================================

/// Users and posts HTTP service
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Users and posts HTTP service over interchangeable storage backends")]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(short, long, env = "POSTBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info,tower_http=debug",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::info!("{} v{}", APP_NAME, APP_VERSION);

    // An explicit path must exist; the default one may not.
    let required = cli.config.is_some();
    let path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(CONFIG_PATH_DEFAULT));
    let config = Config::load(&path, required)?.with_overrides(cli.overrides);
    config.validate()?;

    let repo = board_core::connect(&config.connect_options()).await?;
    tracing::info!(backend = %config.backend, "storage ready");

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    server::serve(
        listener,
        repo,
        config.operation_timeout(),
        config.shutdown_grace(),
        server::shutdown_signal(),
    )
    .await?;

    Ok(())
}
