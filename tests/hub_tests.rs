// Stats hub integration tests
// Runs the hub task on tokio's paused clock against an in-memory store

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::task::JoinHandle;
    use uuid::Uuid;
    use vehicle_stats::admin::{AdminPolicy, Caller};
    use vehicle_stats::aggregator::{Aggregator, AggregatorSettings};
    use vehicle_stats::clock::SystemClock;
    use vehicle_stats::config::catalog::VehicleCatalog;
    use vehicle_stats::error::StatsError;
    use vehicle_stats::hub::{Hub, HubHandle};
    use vehicle_stats::protocol::ServerMessage;
    use vehicle_stats::report::ReportWriter;
    use vehicle_stats::signals::ShutdownCoordinator;
    use vehicle_stats::stats::VehicleKind;
    use vehicle_stats::storage::MemoryStore;

    struct Harness {
        handle: HubHandle,
        task: JoinHandle<()>,
        store: MemoryStore,
        coordinator: ShutdownCoordinator,
        report: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    fn kind(name: &str) -> VehicleKind {
        VehicleKind::new(name).unwrap()
    }

    fn start_hub() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("stats.html");
        let store = MemoryStore::new();

        let aggregator = Aggregator::open(
            Box::new(store.clone()),
            Arc::new(SystemClock),
            AggregatorSettings::default(),
        );
        let hub = Hub::new(
            aggregator,
            Arc::new(VehicleCatalog::from_names(["adder", "kart", "bus"])),
            AdminPolicy::new(["letmein"]),
            ReportWriter::new(&report),
            Duration::from_secs(3600),
        );

        let coordinator = ShutdownCoordinator::new();
        let (handle, task) = hub.spawn(coordinator.subscribe());
        Harness { handle, task, store, coordinator, report, _dir: dir }
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_merged_after_debounce() {
        let h = start_hub();

        h.handle.spawned(kind("kart")).await.unwrap();
        for _ in 0..3 {
            h.handle.usage(kind("kart"), 10.0).await.unwrap();
        }

        let before = h.handle.leaderboard().await.unwrap();
        assert_eq!(before[0].spawns, 1);
        assert_eq!(before[0].usage_time, 0.0);

        tokio::time::sleep(Duration::from_secs(6)).await;

        let after = h.handle.leaderboard().await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].usage_time, 30.0);

        h.coordinator.trigger();
        h.task.await.unwrap();
        assert_eq!(h.store.snapshot()[&kind("kart")].usage_time, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_saves_pending_usage() {
        let h = start_hub();

        h.handle.usage(kind("bus"), 60.0).await.unwrap();
        h.coordinator.trigger();
        h.task.await.unwrap();

        let saved = h.store.snapshot();
        assert_eq!(saved[&kind("bus")].usage_time, 60.0);
        assert_eq!(saved[&kind("bus")].spawns, 0);
        assert!(h.report.exists());
        assert!(h.handle.snapshot().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_counts_active_drivers() {
        let h = start_hub();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        h.handle.spawned(kind("adder")).await.unwrap();
        h.handle.session_started(alice, kind("adder"), 1001).await.unwrap();
        h.handle.session_started(bob, kind("adder"), 1002).await.unwrap();
        h.handle.heartbeat(alice, kind("adder")).await.unwrap();

        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.stats[0].vehicle_name, "adder");
        assert_eq!(snapshot.stats[0].active_drivers, 2);
        assert_eq!(snapshot.all_vehicles, vec!["adder", "bus", "kart"]);

        h.handle.session_ended(alice).await.unwrap();
        h.handle.disconnected(bob).await.unwrap();
        let snapshot = h.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.stats[0].active_drivers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_requires_privilege() {
        let h = start_hub();
        let mut events = h.handle.subscribe();

        h.handle.spawned(kind("adder")).await.unwrap();

        let intruder = Caller::Player { id: "7".to_string(), token: Some("guess".to_string()) };
        let err = h.handle.reset(intruder).await.unwrap_err();
        assert!(matches!(err, StatsError::Unauthorized { .. }));
        assert_eq!(h.handle.leaderboard().await.unwrap().len(), 1);
        assert!(events.try_recv().is_err());

        let admin = Caller::Player { id: "1".to_string(), token: Some("letmein".to_string()) };
        h.handle.reset(admin).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), ServerMessage::ResetStats);
        assert!(h.handle.leaderboard().await.unwrap().is_empty());
        assert!(h.store.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_usage_is_discarded() {
        let h = start_hub();

        h.handle.usage(kind("kart"), -5.0).await.unwrap();
        h.handle.usage(kind("kart"), f64::NAN).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(h.handle.leaderboard().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_queued_before_shutdown_are_saved() {
        let h = start_hub();

        for _ in 0..50 {
            h.handle.spawned(kind("adder")).await.unwrap();
            h.handle.usage(kind("kart"), 2.0).await.unwrap();
        }
        h.coordinator.trigger();
        h.task.await.unwrap();

        let saved = h.store.snapshot();
        assert_eq!(saved[&kind("adder")].spawns, 50);
        assert_eq!(saved[&kind("kart")].usage_time, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_rewritten_every_interval() {
        let h = start_hub();

        h.handle.spawned(kind("kart")).await.unwrap();
        h.handle.leaderboard().await.unwrap();
        let startup = std::fs::read_to_string(&h.report).unwrap();
        assert!(startup.contains("No vehicle data recorded yet"));

        tokio::time::sleep(Duration::from_secs(3601)).await;
        // Round trip so the hub has handled its tick
        h.handle.leaderboard().await.unwrap();

        let hourly = std::fs::read_to_string(&h.report).unwrap();
        assert!(hourly.contains("<td>kart</td>"));
        assert!(!hourly.contains("No vehicle data recorded yet"));

        h.coordinator.trigger();
        h.task.await.unwrap();
    }
}
