// Vehicle stats aggregator
// Owns the authoritative counters, batches usage into timed merges and throttles disk writes

use crate::clock::Clock;
use crate::config::AggregatorConfig;
use crate::error::{Result, StatsError};
use crate::scheduler::{Debounce, Throttle};
use crate::stats::{self, StatsEntry, StatsTable, VehicleKind, VehicleStats};
use crate::storage::StateStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Aggregator timing
#[derive(Debug, Clone, Copy)]
pub struct AggregatorSettings {
    /// Delay between the first pending usage and the merge (D)
    pub merge_delay: Duration,

    /// Minimum time between two durable writes (S)
    pub persist_interval: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            merge_delay: Duration::from_secs(5),
            persist_interval: Duration::from_secs(5),
        }
    }
}

impl From<&AggregatorConfig> for AggregatorSettings {
    fn from(config: &AggregatorConfig) -> Self {
        Self {
            merge_delay: Duration::from_secs(config.merge_delay_secs),
            persist_interval: Duration::from_secs(config.persist_interval_secs),
        }
    }
}

/// Result of a flush request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// Dropped because the last write was too recent
    Throttled,
    /// The store rejected the write; state stays in memory
    Failed,
}

pub struct Aggregator {
    stats: StatsTable,
    pending: BTreeMap<VehicleKind, f64>,
    merge_timer: Debounce,
    persist_gate: Throttle,
    store: Box<dyn StateStore>,
    clock: Arc<dyn Clock>,
    /// Authoritative state differs from the last successful write
    dirty: bool,
}

impl Aggregator {
    /// Load persisted state and build the aggregator.
    /// An unreadable store is logged and the aggregator starts empty.
    pub fn open(
        store: Box<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: AggregatorSettings,
    ) -> Self {
        let stats = match store.read_state() {
            Ok(table) => table,
            Err(e) => {
                error!(
                    location = %store.location(),
                    error = %e,
                    "Failed to load vehicle data, starting with empty stats"
                );
                StatsTable::new()
            }
        };

        info!(
            kinds = stats.len(),
            merge_delay_secs = settings.merge_delay.as_secs_f64(),
            persist_interval_secs = settings.persist_interval.as_secs_f64(),
            "Aggregator initialized"
        );

        Self {
            stats,
            pending: BTreeMap::new(),
            merge_timer: Debounce::new(settings.merge_delay),
            persist_gate: Throttle::new(settings.persist_interval),
            store,
            clock,
            dirty: false,
        }
    }

    /// Count one spawn of `kind` and request a flush
    pub fn record_spawn(&mut self, kind: VehicleKind) -> PersistOutcome {
        let entry = self.stats.entry(kind.clone()).or_default();
        entry.spawns += 1;
        self.dirty = true;

        debug!(kind = %kind, spawns = entry.spawns, "Vehicle spawn recorded");
        self.persist()
    }

    /// Queue `seconds` of drive time for `kind`.
    /// The time reaches the authoritative counter on the next merge.
    pub fn record_usage(&mut self, kind: VehicleKind, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            debug!(kind = %kind, seconds, "Discarding invalid usage duration");
            return Err(StatsError::InvalidDuration(seconds));
        }

        // Totals must stay finite: the state file cannot hold infinity
        let saved = self.stats.get(&kind).map_or(0.0, |s| s.usage_time);
        if !(saved + self.pending_usage(&kind) + seconds).is_finite() {
            warn!(kind = %kind, seconds, "Discarding usage that would overflow the drive time total");
            return Err(StatsError::InvalidDuration(seconds));
        }

        self.stats.entry(kind.clone()).or_default();
        *self.pending.entry(kind).or_insert(0.0) += seconds;

        let now = self.clock.now();
        if self.merge_timer.schedule_once(now) {
            debug!(
                delay_secs = self.merge_timer.delay().as_secs_f64(),
                "Pending usage merge scheduled"
            );
        }
        Ok(())
    }

    /// When the pending merge should fire, if one is scheduled
    pub fn next_deadline(&self) -> Option<Instant> {
        self.merge_timer.deadline()
    }

    /// Fire the merge timer if it is due. Returns the flush outcome when it fired.
    pub fn fire_due(&mut self) -> Option<PersistOutcome> {
        let now = self.clock.now();
        if self.merge_timer.take_if_due(now) {
            Some(self.merge_pending())
        } else {
            None
        }
    }

    /// Move all pending usage into the authoritative counters and request a flush
    #[instrument(skip(self))]
    pub fn merge_pending(&mut self) -> PersistOutcome {
        let pending = std::mem::take(&mut self.pending);
        self.merge_timer.cancel();

        for (kind, seconds) in pending {
            self.stats.entry(kind).or_default().usage_time += seconds;
            self.dirty = true;
        }

        self.persist()
    }

    /// Write the authoritative state unless the last successful write
    /// was less than the persist interval ago
    pub fn persist(&mut self) -> PersistOutcome {
        let now = self.clock.now();
        if !self.persist_gate.ready(now) {
            debug!(
                retry_in_ms = self.persist_gate.remaining(now).as_millis() as u64,
                "Skipping save, last write too recent"
            );
            return PersistOutcome::Throttled;
        }

        match self.write(now) {
            Ok(()) => PersistOutcome::Written,
            Err(_) => PersistOutcome::Failed,
        }
    }

    /// Write now, ignoring the throttle
    pub fn force_persist(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.write(now)
    }

    fn write(&mut self, now: Instant) -> Result<()> {
        match self.store.write_state(&self.stats) {
            Ok(()) => {
                self.persist_gate.mark(now);
                self.dirty = false;
                Ok(())
            }
            Err(e) => {
                error!(location = %self.store.location(), error = %e, "Failed to save vehicle data");
                Err(e)
            }
        }
    }

    /// Leaderboard: spawns descending, then drive time descending
    pub fn query(&self) -> Vec<StatsEntry> {
        stats::rank(&self.stats)
    }

    /// Drop all counters and pending time, then write the empty state
    pub fn reset(&mut self) -> Result<()> {
        self.stats.clear();
        self.pending.clear();
        self.merge_timer.cancel();
        self.dirty = true;

        info!("Vehicle statistics have been reset");
        self.force_persist()
    }

    /// Merge whatever is pending and write any unsaved state
    pub fn shutdown(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            for (kind, seconds) in pending {
                self.stats.entry(kind).or_default().usage_time += seconds;
            }
            self.dirty = true;
        }
        self.merge_timer.cancel();

        if self.dirty {
            info!(kinds = self.stats.len(), "Writing unsaved vehicle data before shutdown");
            self.force_persist()?;
        } else {
            debug!("No unsaved vehicle data at shutdown");
        }
        Ok(())
    }

    pub fn stats(&self, kind: &VehicleKind) -> Option<VehicleStats> {
        self.stats.get(kind).copied()
    }

    pub fn pending_usage(&self, kind: &VehicleKind) -> f64 {
        self.pending.get(kind).copied().unwrap_or(0.0)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        if self.dirty || !self.pending.is_empty() {
            warn!("Aggregator dropped with unsaved vehicle data");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn kind(name: &str) -> VehicleKind {
        VehicleKind::new(name).unwrap()
    }

    fn setup() -> (Aggregator, MemoryStore, Arc<ManualClock>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new());
        let aggregator = Aggregator::open(
            Box::new(store.clone()),
            clock.clone(),
            AggregatorSettings::default(),
        );
        (aggregator, store, clock)
    }

    #[test]
    fn test_spawn_creates_record_and_persists() {
        let (mut agg, store, _clock) = setup();

        assert_eq!(agg.record_spawn(kind("adder")), PersistOutcome::Written);
        assert_eq!(agg.stats(&kind("adder")).unwrap().spawns, 1);
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_usage_is_pending_until_merge() {
        let (mut agg, _store, clock) = setup();

        agg.record_usage(kind("kart"), 60.0).unwrap();
        assert_eq!(agg.stats(&kind("kart")).unwrap().usage_time, 0.0);
        assert_eq!(agg.pending_usage(&kind("kart")), 60.0);

        clock.advance(Duration::from_secs(4));
        assert!(agg.fire_due().is_none());

        clock.advance(Duration::from_secs(1));
        assert!(agg.fire_due().is_some());
        assert_eq!(agg.stats(&kind("kart")).unwrap().usage_time, 60.0);
        assert!(!agg.has_pending());
        assert!(agg.next_deadline().is_none());
    }

    #[test]
    fn test_usage_overflowing_total_is_rejected() {
        let (mut agg, _store, clock) = setup();

        agg.record_usage(kind("kart"), 1e308).unwrap();
        let err = agg.record_usage(kind("kart"), 1e308).unwrap_err();
        assert!(matches!(err, StatsError::InvalidDuration(_)));
        assert_eq!(agg.pending_usage(&kind("kart")), 1e308);

        clock.advance(Duration::from_secs(5));
        agg.fire_due();
        assert!(agg.record_usage(kind("kart"), 1e308).is_err());
        assert!(agg.stats(&kind("kart")).unwrap().usage_time.is_finite());

        // Other kinds are unaffected
        agg.record_usage(kind("bus"), 1e308).unwrap();
    }

    #[test]
    fn test_invalid_durations_are_discarded() {
        let (mut agg, _store, _clock) = setup();

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(agg.record_usage(kind("kart"), bad).is_err());
        }
        assert!(!agg.has_pending());
        assert!(agg.is_empty());
        assert!(agg.next_deadline().is_none());
    }

    #[test]
    fn test_persist_is_throttled() {
        let (mut agg, store, clock) = setup();

        assert_eq!(agg.persist(), PersistOutcome::Written);
        clock.advance(Duration::from_secs(2));
        assert_eq!(agg.persist(), PersistOutcome::Throttled);
        assert_eq!(store.writes(), 1);

        clock.advance(Duration::from_secs(3));
        assert_eq!(agg.persist(), PersistOutcome::Written);
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn test_failed_write_does_not_close_gate() {
        let (mut agg, store, _clock) = setup();

        store.set_fail_writes(true);
        assert_eq!(agg.record_spawn(kind("adder")), PersistOutcome::Failed);
        assert!(agg.has_unsaved_changes());

        store.set_fail_writes(false);
        assert_eq!(agg.persist(), PersistOutcome::Written);
        assert!(!agg.has_unsaved_changes());
    }

    #[test]
    fn test_open_loads_persisted_state() {
        let mut table = StatsTable::new();
        table.insert(kind("bmx"), VehicleStats { spawns: 7, usage_time: 12.0 });
        let store = MemoryStore::with_state(table);

        let agg = Aggregator::open(
            Box::new(store),
            Arc::new(ManualClock::new()),
            AggregatorSettings::default(),
        );
        assert_eq!(agg.stats(&kind("bmx")).unwrap().spawns, 7);
    }

    #[test]
    fn test_shutdown_flushes_pending_past_throttle() {
        let (mut agg, store, _clock) = setup();

        agg.record_spawn(kind("kart"));
        agg.record_usage(kind("kart"), 30.0).unwrap();
        agg.shutdown().unwrap();

        assert_eq!(store.writes(), 2);
        assert_eq!(store.snapshot()[&kind("kart")].usage_time, 30.0);
        assert!(!agg.has_unsaved_changes());
    }
}
