//! Binary entry point.
//!
//! Resolves a driver from a connection-string argument or a JSON config
//! file, then serves the query studio proxy until shutdown.

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlgate::config::{DEFAULT_CONFIG_FILE, DEFAULT_PORT, DEFAULT_STUDIO_URL, GatewayConfig};
use sqlgate::server::{ServeOptions, serve};
use sqlgate::{Driver, resolver};

/// sqlgate - serve a SQL database to a browser-based query studio.
#[derive(Parser, Debug)]
#[command(name = "sqlgate", version, about, long_about = None)]
struct Cli {
    /// Serve a database from a connection string
    connection: Option<String>,

    /// Launch using a configuration file
    #[arg(long)]
    config: Option<String>,

    /// Port to serve on
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Basic authentication username
    #[arg(long)]
    user: Option<String>,

    /// Basic authentication password
    #[arg(long)]
    pass: Option<String>,

    /// Log every SQL statement executed
    #[arg(short, long)]
    log: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut port = cli.port;
    let mut studio = DEFAULT_STUDIO_URL.to_string();
    let mut username = cli.user;
    let mut password = cli.pass;

    let driver = if let Some(connection) = &cli.connection {
        match resolver::from_connection_string(connection) {
            Ok(driver) => driver,
            Err(err) => {
                tracing::error!("{err}");
                return Ok(());
            }
        }
    } else {
        let config_file = cli
            .config
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        let config_path = Path::new(&config_file);

        if !config_path.exists() {
            tracing::error!("cannot find {config_file}");
            return Ok(());
        }

        let config = match GatewayConfig::load(config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("{err}");
                return Ok(());
            }
        };

        // Config-file settings take precedence over flags.
        if let Some(config_port) = config.port {
            port = config_port;
        }
        if let Some(config_studio) = &config.studio {
            studio = config_studio.clone();
        }
        if let Some(auth) = &config.auth {
            username = Some(auth.username.clone());
            password = Some(auth.password.clone());
        }

        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        resolver::from_config(config_dir, &config.connection)
    };

    let driver: Arc<dyn Driver> = Arc::from(driver);
    tracing::info!(
        "Connected to {} ({})",
        driver.connection_name(),
        driver.kind()
    );

    serve(
        driver,
        ServeOptions {
            port,
            studio,
            username,
            password,
            log: cli.log,
        },
    )
    .await?;

    Ok(())
}
