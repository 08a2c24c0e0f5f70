// Vehicle statistics data model
// Per-kind counters and the ranked leaderboard view

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Normalized identifier for a vehicle model (trimmed, lowercase)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleKind(String);

impl VehicleKind {
    /// Normalize a display name. Blank names are not a kind.
    pub fn new(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cumulative counters for one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleStats {
    /// Number of times the kind was spawned
    #[serde(default)]
    pub spawns: u64,

    /// Total drive time in seconds
    #[serde(default)]
    pub usage_time: f64,
}

/// Authoritative state, keyed by kind. Also the on-disk JSON shape.
pub type StatsTable = BTreeMap<VehicleKind, VehicleStats>;

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsEntry {
    pub vehicle_name: VehicleKind,
    pub spawns: u64,
    pub usage_time: f64,
}

/// Rank all kinds by spawns, then usage time, both descending.
/// Equal keys keep the table's (name) order.
pub fn rank(table: &StatsTable) -> Vec<StatsEntry> {
    let mut entries: Vec<StatsEntry> = table
        .iter()
        .map(|(kind, stats)| StatsEntry {
            vehicle_name: kind.clone(),
            spawns: stats.spawns,
            usage_time: stats.usage_time,
        })
        .collect();

    entries.sort_by(|a, b| {
        b.spawns
            .cmp(&a.spawns)
            .then_with(|| b.usage_time.total_cmp(&a.usage_time))
    });

    entries
}

/// Repair a table read from disk: re-normalize keys (merging duplicates)
/// and clamp invalid drive times to zero.
/// Returns the repaired table and how many records had to be fixed.
pub fn sanitize(table: StatsTable) -> (StatsTable, usize) {
    let mut repaired = 0;
    let mut clean = StatsTable::new();

    for (kind, mut stats) in table {
        if !stats.usage_time.is_finite() || stats.usage_time < 0.0 {
            stats.usage_time = 0.0;
            repaired += 1;
        }

        let Some(normalized) = VehicleKind::new(kind.as_str()) else {
            repaired += 1;
            continue;
        };
        if normalized != kind {
            repaired += 1;
        }

        let entry = clean.entry(normalized).or_default();
        entry.spawns += stats.spawns;
        entry.usage_time = (entry.usage_time + stats.usage_time).min(f64::MAX);
    }

    (clean, repaired)
}
