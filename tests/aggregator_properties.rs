// Aggregator integration tests
// Ranking, duration rejection, debounced merges and the persistence throttle

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use vehicle_stats::aggregator::{Aggregator, AggregatorSettings, PersistOutcome};
    use vehicle_stats::clock::ManualClock;
    use vehicle_stats::error::StatsError;
    use vehicle_stats::stats::VehicleKind;
    use vehicle_stats::storage::{JsonFileStore, MemoryStore, StateStore};

    fn kind(name: &str) -> VehicleKind {
        VehicleKind::new(name).unwrap()
    }

    fn setup() -> (Aggregator, MemoryStore, Arc<ManualClock>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new());
        let aggregator = Aggregator::open(
            Box::new(store.clone()),
            clock.clone(),
            AggregatorSettings {
                merge_delay: Duration::from_secs(5),
                persist_interval: Duration::from_secs(5),
            },
        );
        (aggregator, store, clock)
    }

    #[test]
    fn test_query_is_sorted_permutation_of_recorded_kinds() {
        let (mut agg, _store, clock) = setup();

        let events: &[(&str, Option<f64>)] = &[
            ("adder", None),
            ("kart", Some(30.0)),
            ("zentorno", None),
            ("adder", None),
            ("bus", Some(120.0)),
            ("zentorno", Some(5.0)),
            ("kart", None),
            ("t20", Some(1.5)),
        ];

        for (name, usage) in events {
            match usage {
                Some(seconds) => agg.record_usage(kind(name), *seconds).unwrap(),
                None => {
                    agg.record_spawn(kind(name));
                }
            }
        }
        clock.advance(Duration::from_secs(5));
        agg.fire_due();

        let entries = agg.query();
        let mut names: Vec<_> = entries.iter().map(|e| e.vehicle_name.as_str().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["adder", "bus", "kart", "t20", "zentorno"]);

        for pair in entries.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.spawns > b.spawns || (a.spawns == b.spawns && a.usage_time >= b.usage_time),
                "{:?} ranked before {:?}",
                a,
                b
            );
        }
        assert_eq!(entries[0].vehicle_name.as_str(), "adder");
        assert_eq!(entries[1].vehicle_name.as_str(), "kart");
        assert_eq!(entries[2].vehicle_name.as_str(), "zentorno");
        assert_eq!(entries[3].vehicle_name.as_str(), "bus");
    }

    #[test]
    fn test_invalid_durations_change_nothing() {
        let (mut agg, store, clock) = setup();
        agg.record_usage(kind("kart"), 10.0).unwrap();

        for bad in [0.0, -1.0, -0.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = agg.record_usage(kind("kart"), bad).unwrap_err();
            assert!(matches!(err, StatsError::InvalidDuration(_)));
            let err = agg.record_usage(kind("ghost"), bad).unwrap_err();
            assert!(matches!(err, StatsError::InvalidDuration(_)));
        }

        assert_eq!(agg.pending_usage(&kind("kart")), 10.0);
        assert_eq!(agg.pending_usage(&kind("ghost")), 0.0);
        assert!(agg.stats(&kind("ghost")).is_none());

        clock.advance(Duration::from_secs(5));
        agg.fire_due();
        assert_eq!(agg.stats(&kind("kart")).unwrap().usage_time, 10.0);
        assert!(store.snapshot().get(&kind("ghost")).is_none());
    }

    #[test]
    fn test_burst_of_usage_merges_once() {
        let (mut agg, store, clock) = setup();

        for _ in 0..3 {
            agg.record_usage(kind("kart"), 10.0).unwrap();
            clock.advance(Duration::from_millis(300));
        }
        assert_eq!(agg.stats(&kind("kart")).unwrap().usage_time, 0.0);

        // Deadline is measured from the first report, not the last
        clock.advance(Duration::from_millis(4100));
        assert_eq!(agg.fire_due(), Some(PersistOutcome::Written));
        assert_eq!(agg.stats(&kind("kart")).unwrap().usage_time, 30.0);
        assert!(!agg.has_pending());
        assert_eq!(store.snapshot()[&kind("kart")].usage_time, 30.0);

        // Nothing left to fire
        clock.advance(Duration::from_secs(10));
        assert_eq!(agg.fire_due(), None);
        assert_eq!(agg.stats(&kind("kart")).unwrap().usage_time, 30.0);
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_persist_throttle_coalesces_writes() {
        let (mut agg, store, clock) = setup();

        assert_eq!(agg.record_spawn(kind("adder")), PersistOutcome::Written);
        clock.advance(Duration::from_secs(2));
        assert_eq!(agg.record_spawn(kind("adder")), PersistOutcome::Throttled);
        assert_eq!(store.writes(), 1);
        assert_eq!(store.snapshot()[&kind("adder")].spawns, 1);
        assert!(agg.has_unsaved_changes());

        clock.advance(Duration::from_secs(3));
        assert_eq!(agg.persist(), PersistOutcome::Written);
        assert_eq!(store.writes(), 2);
        assert_eq!(store.snapshot()[&kind("adder")].spawns, 2);
        assert!(!agg.has_unsaved_changes());
    }

    #[test]
    fn test_failed_write_keeps_state_and_retries() {
        let (mut agg, store, clock) = setup();
        store.set_fail_writes(true);

        assert_eq!(agg.record_spawn(kind("bus")), PersistOutcome::Failed);
        assert_eq!(agg.stats(&kind("bus")).unwrap().spawns, 1);

        store.set_fail_writes(false);
        clock.advance(Duration::from_millis(10));
        assert_eq!(agg.persist(), PersistOutcome::Written);
        assert_eq!(store.snapshot()[&kind("bus")].spawns, 1);
    }

    #[test]
    fn test_reset_empties_query_and_durable_state() {
        let (mut agg, store, _clock) = setup();
        agg.record_spawn(kind("adder"));
        agg.record_usage(kind("kart"), 42.0).unwrap();

        agg.reset().unwrap();

        assert!(agg.query().is_empty());
        assert!(!agg.has_pending());
        assert_eq!(agg.next_deadline(), None);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_shutdown_flushes_pending_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vehicleData.json");
        let clock = Arc::new(ManualClock::new());

        {
            let mut agg = Aggregator::open(
                Box::new(JsonFileStore::new(&path)),
                clock.clone(),
                AggregatorSettings::default(),
            );
            agg.record_spawn(kind("Kart"));
            agg.record_usage(kind("kart"), 60.0).unwrap();
            agg.shutdown().unwrap();
        }

        let reopened = JsonFileStore::new(&path).read_state().unwrap();
        let stats = reopened[&kind("kart")];
        assert_eq!(stats.spawns, 1);
        assert_eq!(stats.usage_time, 60.0);
    }

    #[test]
    fn test_huge_usage_keeps_state_file_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vehicleData.json");
        let clock = Arc::new(ManualClock::new());

        let mut agg = Aggregator::open(
            Box::new(JsonFileStore::new(&path)),
            clock.clone(),
            AggregatorSettings::default(),
        );
        agg.record_spawn(kind("adder"));
        agg.record_usage(kind("kart"), 1e308).unwrap();
        assert!(agg.record_usage(kind("kart"), 1e308).is_err());
        clock.advance(Duration::from_secs(5));
        agg.fire_due();
        agg.shutdown().unwrap();

        let saved = JsonFileStore::new(&path).read_state().unwrap();
        assert_eq!(saved[&kind("adder")].spawns, 1);
        assert_eq!(saved[&kind("kart")].usage_time, 1e308);
    }

    #[test]
    fn test_open_resumes_persisted_counters() {
        let mut table = vehicle_stats::stats::StatsTable::new();
        table.insert(kind("adder"), vehicle_stats::stats::VehicleStats { spawns: 3, usage_time: 90.0 });
        let store = MemoryStore::with_state(table);

        let mut agg = Aggregator::open(
            Box::new(store.clone()),
            Arc::new(ManualClock::new()),
            AggregatorSettings::default(),
        );
        agg.record_spawn(kind("adder"));

        assert_eq!(agg.len(), 1);
        assert_eq!(store.snapshot()[&kind("adder")].spawns, 4);
        assert_eq!(store.snapshot()[&kind("adder")].usage_time, 90.0);
    }
}
