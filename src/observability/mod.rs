// Observability infrastructure using tracing crate
// Structured JSON logs on stderr so stdout stays free for command output

use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the observability system
/// `verbose` raises the default level to debug; RUST_LOG still wins when set
pub fn init(verbose: bool) -> Result<()> {
    let fmt_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE);

    // Example: RUST_LOG=vehicle_stats=debug,tower_http=info
    let default_filter = if verbose {
        "vehicle_stats=debug,vstats=debug,tower_http=info"
    } else {
        "vehicle_stats=info,vstats=info,tower_http=warn"
    };
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Failed to create tracing filter")?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Span covering one tracker connection
#[inline]
pub fn connection_span(participant: &uuid::Uuid) -> tracing::Span {
    tracing::info_span!("tracker", participant = %participant)
}
