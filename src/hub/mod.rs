// Stats hub
// Single task that owns the aggregator and processes every event in order,
// so no handler ever races another

use crate::admin::{AdminPolicy, Caller};
use crate::aggregator::Aggregator;
use crate::config::catalog::VehicleCatalog;
use crate::error::{Result, StatsError};
use crate::protocol::{ServerMessage, StatsSnapshot, StatsView};
use crate::report::ReportWriter;
use crate::stats::{StatsEntry, VehicleKind};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Identifies one connected tracker
pub type ParticipantId = Uuid;

const COMMAND_BUFFER: usize = 1024;
const EVENT_BUFFER: usize = 64;
const RESET_ACTION: &str = "reset vehicle statistics";

/// Everything the hub reacts to
#[derive(Debug)]
pub enum HubCommand {
    Spawned { kind: VehicleKind },
    Usage { kind: VehicleKind, seconds: f64 },
    SessionStarted { participant: ParticipantId, kind: VehicleKind, net_id: u32 },
    SessionEnded { participant: ParticipantId },
    Heartbeat { participant: ParticipantId, kind: VehicleKind },
    Disconnected { participant: ParticipantId },
    Snapshot { reply: oneshot::Sender<StatsSnapshot> },
    Leaderboard { reply: oneshot::Sender<Vec<StatsEntry>> },
    Reset { caller: Caller, reply: oneshot::Sender<Result<()>> },
}

/// Live (never persisted) session of one participant
#[derive(Debug, Clone)]
struct LiveSession {
    kind: VehicleKind,
    net_id: u32,
    started_at: Instant,
    last_heartbeat: Instant,
}

pub struct Hub {
    aggregator: Aggregator,
    catalog: Arc<VehicleCatalog>,
    admin: AdminPolicy,
    reporter: ReportWriter,
    report_interval: Duration,
    sessions: HashMap<ParticipantId, LiveSession>,
    events: broadcast::Sender<ServerMessage>,
}

impl Hub {
    pub fn new(
        aggregator: Aggregator,
        catalog: Arc<VehicleCatalog>,
        admin: AdminPolicy,
        reporter: ReportWriter,
        report_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            aggregator,
            catalog,
            admin,
            reporter,
            report_interval,
            sessions: HashMap::new(),
            events,
        }
    }

    /// Start the hub task. It runs until every handle is dropped or shutdown fires.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = HubHandle {
            commands: tx,
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(rx, shutdown));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>, mut shutdown: broadcast::Receiver<()>) {
        info!("Stats hub started");
        self.write_report();

        let mut report_tick = tokio::time::interval_at(
            Instant::now() + self.report_interval,
            self.report_interval,
        );

        loop {
            let deadline = self.aggregator.next_deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        debug!("All hub handles dropped");
                        break;
                    }
                },
                _ = wait_until(deadline) => {
                    self.aggregator.fire_due();
                }
                _ = report_tick.tick() => {
                    self.write_report();
                    info!("Hourly vehicle stats generated automatically");
                }
                _ = shutdown.recv() => {
                    info!("Stats hub received shutdown signal");
                    break;
                }
            }
        }

        // Events accepted before shutdown still count
        commands.close();
        let mut drained = 0usize;
        while let Some(command) = commands.recv().await {
            self.handle(command);
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "Processed queued events before shutdown");
        }

        if let Err(e) = self.aggregator.shutdown() {
            error!(error = %e, "Failed to save vehicle data at shutdown");
        }
        self.write_report();
        info!("Stats hub stopped");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Spawned { kind } => {
                self.aggregator.record_spawn(kind);
            }
            HubCommand::Usage { kind, seconds } => {
                if let Err(e) = self.aggregator.record_usage(kind, seconds) {
                    debug!(error = %e, "Usage report discarded");
                }
            }
            HubCommand::SessionStarted { participant, kind, net_id } => {
                let now = Instant::now();
                info!(participant = %participant, kind = %kind, net_id, "Vehicle session started");
                self.sessions.insert(
                    participant,
                    LiveSession { kind, net_id, started_at: now, last_heartbeat: now },
                );
            }
            HubCommand::SessionEnded { participant } => self.end_session(participant, "ended"),
            HubCommand::Disconnected { participant } => self.end_session(participant, "disconnected"),
            HubCommand::Heartbeat { participant, kind } => {
                match self.sessions.get_mut(&participant) {
                    Some(session) if session.kind == kind => session.last_heartbeat = Instant::now(),
                    _ => trace!(participant = %participant, kind = %kind, "Heartbeat without matching session"),
                }
            }
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            HubCommand::Leaderboard { reply } => {
                let _ = reply.send(self.aggregator.query());
            }
            HubCommand::Reset { caller, reply } => {
                let _ = reply.send(self.reset(&caller));
            }
        }
    }

    fn end_session(&mut self, participant: ParticipantId, reason: &str) {
        if let Some(session) = self.sessions.remove(&participant) {
            info!(
                participant = %participant,
                kind = %session.kind,
                net_id = session.net_id,
                duration_secs = session.started_at.elapsed().as_secs_f64(),
                since_heartbeat_secs = session.last_heartbeat.elapsed().as_secs_f64(),
                reason,
                "Vehicle session closed"
            );
        }
    }

    fn reset(&mut self, caller: &Caller) -> Result<()> {
        self.admin.authorize(caller, RESET_ACTION)?;

        if let Err(e) = self.aggregator.reset() {
            warn!(error = %e, "Stats reset in memory but the empty state was not saved");
        }
        self.sessions.clear();

        let notified = self.events.send(ServerMessage::ResetStats).unwrap_or(0);
        info!(caller = %caller, notified, "Vehicle statistics reset");
        Ok(())
    }

    fn snapshot(&self) -> StatsSnapshot {
        let mut active: HashMap<&VehicleKind, usize> = HashMap::new();
        for session in self.sessions.values() {
            *active.entry(&session.kind).or_insert(0) += 1;
        }

        let stats = self
            .aggregator
            .query()
            .iter()
            .map(|entry| {
                let drivers = active.get(&entry.vehicle_name).copied().unwrap_or(0);
                StatsView::from_entry(entry, drivers)
            })
            .collect();

        StatsSnapshot {
            stats,
            all_vehicles: self.catalog.names(),
        }
    }

    fn write_report(&self) {
        if let Err(e) = self.reporter.write(&self.aggregator.query()) {
            error!(error = %e, "Failed to generate stats report");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable sender side of the hub
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    events: broadcast::Sender<ServerMessage>,
}

impl HubHandle {
    async fn send(&self, command: HubCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| StatsError::ServiceClosed)
    }

    pub async fn spawned(&self, kind: VehicleKind) -> Result<()> {
        self.send(HubCommand::Spawned { kind }).await
    }

    pub async fn usage(&self, kind: VehicleKind, seconds: f64) -> Result<()> {
        self.send(HubCommand::Usage { kind, seconds }).await
    }

    pub async fn session_started(&self, participant: ParticipantId, kind: VehicleKind, net_id: u32) -> Result<()> {
        self.send(HubCommand::SessionStarted { participant, kind, net_id }).await
    }

    pub async fn session_ended(&self, participant: ParticipantId) -> Result<()> {
        self.send(HubCommand::SessionEnded { participant }).await
    }

    pub async fn heartbeat(&self, participant: ParticipantId, kind: VehicleKind) -> Result<()> {
        self.send(HubCommand::Heartbeat { participant, kind }).await
    }

    pub async fn disconnected(&self, participant: ParticipantId) -> Result<()> {
        self.send(HubCommand::Disconnected { participant }).await
    }

    pub async fn snapshot(&self) -> Result<StatsSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| StatsError::ServiceClosed)
    }

    pub async fn leaderboard(&self) -> Result<Vec<StatsEntry>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Leaderboard { reply }).await?;
        rx.await.map_err(|_| StatsError::ServiceClosed)
    }

    /// Privileged reset; unauthorized callers get `StatsError::Unauthorized`
    pub async fn reset(&self, caller: Caller) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Reset { caller, reply }).await?;
        rx.await.map_err(|_| StatsError::ServiceClosed)?
    }

    /// Server-to-tracker broadcasts (reset notifications)
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }
}
