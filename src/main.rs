// vstats - vehicle usage statistics server
// Binary entry point: CLI dispatch and the server daemon

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use vehicle_stats::admin::AdminPolicy;
use vehicle_stats::aggregator::{Aggregator, AggregatorSettings};
use vehicle_stats::cli::{self, Commands};
use vehicle_stats::clock::SystemClock;
use vehicle_stats::config::catalog::VehicleCatalog;
use vehicle_stats::config::StatsConfig;
use vehicle_stats::hub::Hub;
use vehicle_stats::report::ReportWriter;
use vehicle_stats::server::{self, ServerState};
use vehicle_stats::signals::{self, ShutdownCoordinator};
use vehicle_stats::storage::JsonFileStore;
use vehicle_stats::observability;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Commands printing to stdout stay quiet unless asked
    let wants_logs = cli.verbose || matches!(cli.command, Commands::Serve { .. } | Commands::Drive { .. });
    if wants_logs {
        if let Err(e) = observability::init(cli.verbose) {
            cli::error(&format!("{:#}", e));
        }
    }

    let outcome = match cli.command {
        Commands::Serve { config } => run_server(&config).await,
        command => cli::commands::execute(command).await,
    };

    if let Err(e) = outcome {
        error!(error = %format!("{:#}", e), "Command failed");
        cli::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Run the stats server until SIGINT/SIGTERM
async fn run_server(config_path: &str) -> Result<()> {
    let config = StatsConfig::load(config_path)?;
    info!("✓ Configuration loaded and validated");

    let catalog = VehicleCatalog::load(&config.catalog.path)
        .context("A vehicle catalog is required to start the server")?;
    let catalog = Arc::new(catalog);

    let aggregator = Aggregator::open(
        Box::new(JsonFileStore::new(&config.storage.data_file)),
        Arc::new(SystemClock),
        AggregatorSettings::from(&config.aggregator),
    );

    let hub = Hub::new(
        aggregator,
        catalog.clone(),
        AdminPolicy::new(config.admin.tokens.clone()),
        ReportWriter::new(&config.storage.report_file),
        Duration::from_secs(config.aggregator.report_interval_secs),
    );

    let coordinator = ShutdownCoordinator::new();
    let (hub_handle, hub_task) = hub.spawn(coordinator.subscribe());
    info!("✓ Stats hub started");

    let shutdown_signal = signals::create_shutdown_listener()?;
    info!("✓ Signal handlers installed (SIGTERM, SIGINT)");

    let addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let state = Arc::new(ServerState::new(hub_handle, catalog.clone(), config.aggregator.top_n));
    let mut server_task = tokio::spawn(server::serve(listener, state, coordinator.wait()));

    println!();
    cli::success(&format!("Vehicle stats server ready ({} vehicles in catalog)", catalog.len()));
    cli::info(&format!("Trackers: {}", format!("ws://{}/ws", addr).cyan().underline()));
    cli::info(&format!("Report: {}", format!("http://{}/report", addr).cyan().underline()));
    cli::info("Press Ctrl+C for graceful shutdown");
    println!();

    tokio::select! {
        _ = shutdown_signal => {
            info!("🛑 Shutdown signal received - Initiating graceful shutdown");
        }
        result = &mut server_task => {
            error!(result = ?result, "Stats server exited unexpectedly");
        }
    }

    coordinator.trigger();

    if !server_task.is_finished() {
        match server_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Stats server error during shutdown"),
            Err(e) => error!(error = %e, "Stats server task failed"),
        }
    }

    hub_task.await.context("Stats hub task failed")?;

    info!("✓ Graceful shutdown complete - vehicle data saved");
    Ok(())
}
