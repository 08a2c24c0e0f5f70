// Report rendering
// Plain-text table, chat leaderboard lines and the HTML report file

use crate::error::{Result, StatsError};
use crate::stats::StatsEntry;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

const EMPTY_MESSAGE: &str = "No vehicle data recorded yet";

/// `1h 2m 3s`, `2m 3s` or `3s`
pub fn format_duration(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let hours = (seconds / 3600.0).floor() as u64;
    let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
    let remaining = (seconds % 60.0).round() as u64;

    if hours > 0 {
        format!("{hours}h {minutes}m {remaining}s")
    } else if minutes > 0 {
        format!("{minutes}m {remaining}s")
    } else {
        format!("{remaining}s")
    }
}

/// Full leaderboard as a pipe-separated table
pub fn render_text(entries: &[StatsEntry]) -> String {
    let mut out = String::from("Vehicle Usage Statistics\n\n");
    out.push_str("Vehicle Name | Times Spawned | Total Drive Time\n");
    out.push_str("------------|---------------|----------------\n");

    if entries.is_empty() {
        out.push_str(EMPTY_MESSAGE);
        out.push('\n');
        return out;
    }

    for entry in entries {
        let _ = writeln!(
            out,
            "{} | {} | {}",
            entry.vehicle_name,
            entry.spawns,
            format_duration(entry.usage_time)
        );
    }
    out
}

/// Chat lines for the top `limit` kinds
pub fn render_chat(entries: &[StatsEntry], limit: usize) -> Vec<String> {
    let mut lines = vec![format!("Vehicle Statistics - Top {limit}")];

    if entries.is_empty() {
        lines.push(EMPTY_MESSAGE.to_string());
        return lines;
    }

    lines.extend(entries.iter().take(limit).map(|entry| {
        format!(
            "{}: Spawns: {}, Usage: {:.2}s",
            entry.vehicle_name, entry.spawns, entry.usage_time
        )
    }));
    lines
}

/// Standalone HTML page with the leaderboard
pub fn render_html(entries: &[StatsEntry], generated_at: chrono::DateTime<chrono::Utc>) -> String {
    let mut rows = String::new();
    for (rank, entry) in entries.iter().enumerate() {
        let _ = writeln!(
            rows,
            "      <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            rank + 1,
            escape_html(entry.vehicle_name.as_str()),
            entry.spawns,
            format_duration(entry.usage_time)
        );
    }
    if entries.is_empty() {
        let _ = writeln!(rows, "      <tr><td colspan=\"4\">{EMPTY_MESSAGE}</td></tr>");
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n  <title>Vehicle Usage Statistics</title>\n</head>\n<body>\n  <h1>Vehicle Usage Statistics</h1>\n  <p>Generated {}</p>\n  <table>\n    <thead>\n      <tr><th>#</th><th>Vehicle Name</th><th>Times Spawned</th><th>Total Drive Time</th></tr>\n    </thead>\n    <tbody>\n{}    </tbody>\n  </table>\n</body>\n</html>\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        rows
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Writes the HTML report to a fixed location
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, entries: &[StatsEntry]) -> Result<()> {
        let html = render_html(entries, chrono::Utc::now());
        std::fs::write(&self.path, html).map_err(|source| StatsError::PersistenceWrite {
            path: self.path.clone(),
            source,
        })?;

        info!(path = %self.path.display(), kinds = entries.len(), "Stats report generated");
        Ok(())
    }
}
