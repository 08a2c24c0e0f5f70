// CLI Command Implementations
// Offline tools over the data file and the scripted drive client, with colored output

use super::{info, success, warning, Commands, ReportFormat};
use crate::admin::{AdminPolicy, Caller};
use crate::aggregator::{Aggregator, AggregatorSettings};
use crate::clock::SystemClock;
use crate::config::catalog::VehicleCatalog;
use crate::config::StatsConfig;
use crate::report::{self, ReportWriter};
use crate::stats::rank;
use crate::storage::{JsonFileStore, StateStore};
use crate::tracker::client::{run_drive, DrivePlan};
use crate::tracker::{LiveStatsView, TrackerSettings};
use anyhow::Context;
use colored::*;
use std::sync::Arc;
use std::time::Duration;

/// Execute a CLI command. `serve` is handled by the binary.
pub async fn execute(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve { .. } => {
            anyhow::bail!("serve is handled by the vstats binary")
        }
        Commands::Report { config, format, top } => report_command(&config, format, top),
        Commands::Reset { config } => reset_command(&config),
        Commands::Validate { file } => validate_command(&file),
        Commands::Catalog { config } => catalog_command(&config),
        Commands::Drive { config, url, vehicle, seconds, passenger } => {
            drive_command(&config, url, vehicle, seconds, passenger).await
        }
    }
}

/// Print the leaderboard and refresh the HTML report
fn report_command(config_path: &str, format: ReportFormat, top: Option<usize>) -> anyhow::Result<()> {
    let config = StatsConfig::load(config_path)?;
    let store = JsonFileStore::new(&config.storage.data_file);
    let table = store
        .read_state()
        .with_context(|| format!("Failed to read {}", config.storage.data_file.display()))?;
    let entries = rank(&table);

    match format {
        ReportFormat::Text => print!("{}", report::render_text(&entries)),
        ReportFormat::Chat => {
            let limit = top.unwrap_or(config.aggregator.top_n);
            for line in report::render_chat(&entries, limit) {
                println!("{}", line);
            }
        }
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
    }

    let writer = ReportWriter::new(&config.storage.report_file);
    writer.write(&entries)?;
    if format != ReportFormat::Json {
        info(&format!("Report written to {}", writer.path().display().to_string().bright_white()));
    }
    Ok(())
}

/// Wipe the data file as the console operator
fn reset_command(config_path: &str) -> anyhow::Result<()> {
    let config = StatsConfig::load(config_path)?;
    AdminPolicy::new(config.admin.tokens.clone()).authorize(&Caller::Console, "reset vehicle statistics")?;

    let mut aggregator = Aggregator::open(
        Box::new(JsonFileStore::new(&config.storage.data_file)),
        Arc::new(SystemClock),
        AggregatorSettings::from(&config.aggregator),
    );
    let cleared = aggregator.len();
    aggregator.reset()?;

    warning("Stop the server before resetting; a running server keeps its own copy in memory");
    success(&format!(
        "Vehicle statistics reset ({} kinds cleared in {})",
        cleared.to_string().yellow(),
        config.storage.data_file.display()
    ));
    Ok(())
}

fn validate_command(file: &str) -> anyhow::Result<()> {
    info(&format!("Validating {}", file.bright_white()));
    let config = StatsConfig::load(file)?;

    println!();
    println!("  {} {}:{}", "Listen:".bright_white(), config.server.bind_addr, config.server.port);
    println!("  {} {}", "Data file:".bright_white(), config.storage.data_file.display());
    println!("  {} {}", "Report file:".bright_white(), config.storage.report_file.display());
    println!(
        "  {} merge {}s, persist every {}s, report every {}s",
        "Aggregator:".bright_white(),
        config.aggregator.merge_delay_secs,
        config.aggregator.persist_interval_secs,
        config.aggregator.report_interval_secs
    );
    println!(
        "  {} usage every {}s, heartbeat every {}s",
        "Tracker:".bright_white(),
        config.tracker.coarse_tick_secs,
        config.tracker.fine_tick_secs
    );
    println!();

    match VehicleCatalog::load(&config.catalog.path) {
        Ok(catalog) => success(&format!(
            "Configuration file is valid ({} vehicles in catalog)",
            catalog.len().to_string().green()
        )),
        Err(e) => {
            success("Configuration file is valid");
            warning(&format!("The server will refuse to start: {}", e));
        }
    }
    Ok(())
}

fn catalog_command(config_path: &str) -> anyhow::Result<()> {
    let config = StatsConfig::load(config_path)?;
    let catalog = VehicleCatalog::load(&config.catalog.path)?;

    println!();
    println!("{}", format!("Vehicle catalog ({})", catalog.len()).bright_cyan().bold());
    for name in catalog.names() {
        println!("  • {}", name);
    }
    println!();
    Ok(())
}

async fn drive_command(
    config_path: &str,
    url: String,
    vehicle: String,
    seconds: u64,
    passenger: bool,
) -> anyhow::Result<()> {
    let config = StatsConfig::load(config_path)?;
    let settings = TrackerSettings::from(&config.tracker);

    info(&format!(
        "Driving {} for {}s against {}",
        vehicle.cyan(),
        seconds,
        url.bright_white()
    ));
    if passenger {
        warning("Passenger seat: nothing will be tracked");
    }

    let plan = DrivePlan {
        url,
        vehicle,
        duration: Duration::from_secs(seconds),
        as_driver: !passenger,
    };
    let summary = run_drive(plan, settings).await?;

    if summary.session_started {
        success(&format!("Session recorded ({} messages sent)", summary.sent));
    } else {
        warning(&format!("No session was started ({} messages sent)", summary.sent));
    }
    print_live_stats(&summary.stats);
    Ok(())
}

fn print_live_stats(rows: &[LiveStatsView]) {
    println!();
    if rows.is_empty() {
        println!("No vehicle data recorded yet");
        return;
    }

    println!("{}", "Vehicle Statistics".bright_cyan().bold());
    for row in rows {
        let name = if row.is_active {
            format!("{} (driving, {})", row.view.vehicle_name, report::format_duration(row.current_session))
                .green()
                .bold()
        } else {
            row.view.vehicle_name.normal()
        };
        println!(
            "  {}  spawns: {}  time: {}  drivers: {}",
            name,
            row.view.spawns.to_string().yellow(),
            row.view.formatted_time,
            row.view.active_drivers
        );
    }
    println!();
}
