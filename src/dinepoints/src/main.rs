//! DinePoints: loyalty engine service for restaurant bookings.
//!
//! Loads configuration and the program catalog, builds the engine and serves
//! the REST API.

use anyhow::Context;
use clap::Parser;
use dinepoints_api::ApiServer;
use dinepoints_core::config::AppConfig;
use dinepoints_core::events::LogNotifier;
use dinepoints_core::program::Program;
use dinepoints_loyalty::{InMemoryAccountStore, LoyaltyEngine, ProgramStore};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "dinepoints")]
#[command(about = "Loyalty engine for restaurant bookings")]
#[command(version)]
struct Cli {
    /// Optional TOML config file, layered under environment variables
    #[arg(long, short = 'c', env = "DINEPOINTS_CONFIG")]
    config: Option<String>,

    /// Node identifier (overrides config)
    #[arg(long, env = "DINEPOINTS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "DINEPOINTS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Metrics port (overrides config)
    #[arg(long, env = "DINEPOINTS__METRICS__PORT")]
    metrics_port: Option<u16>,

    /// Program catalog JSON, a single program or an array (overrides config)
    #[arg(long, env = "DINEPOINTS__PROGRAM__PATH")]
    program: Option<String>,
}

/// Read programs from `path`. Accepts one program object or an array.
fn load_programs(path: &str) -> anyhow::Result<Vec<Program>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading program file {path}"))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing program file {path}"))?;
    let programs = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(programs)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dinepoints=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("DinePoints starting up");

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    if let Some(path) = cli.program {
        config.program.path = Some(path);
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        metrics_port = config.metrics.port,
        program_path = ?config.program.path,
        "Configuration loaded"
    );

    let programs = match config.program.path.as_deref() {
        Some(path) => load_programs(path)?,
        None => {
            warn!("No program file configured, using the built-in demo program");
            vec![Program::demo()]
        }
    };
    let programs = Arc::new(ProgramStore::with_programs(programs)?);
    let active = programs.active()?;
    info!(program_id = %active.id, name = %active.name, "Active program selected");

    let engine = Arc::new(LoyaltyEngine::new(
        &config.engine,
        Arc::new(InMemoryAccountStore::new()),
        programs,
        Arc::new(LogNotifier),
    ));

    let api_server = ApiServer::new(config.clone(), engine.clone());

    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Program cache maintenance
    let engine_for_maintenance = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            engine_for_maintenance.maintenance();
        }
    });

    info!("DinePoints is ready to serve traffic");

    api_server.start_http().await?;

    Ok(())
}
