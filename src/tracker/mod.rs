// Session Tracker
// Runs per participant: turns vehicle enter/exit/removal events into session
// lifecycle messages and periodic usage ticks for the aggregator

pub mod client;
pub mod host;

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::protocol::{ClientMessage, StatsSnapshot, StatsView};
use crate::stats::VehicleKind;
use host::{VehicleHandle, VehicleHost};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Tracker timing
#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    /// Authoritative usage tick (T1)
    pub coarse_tick: Duration,

    /// Live heartbeat tick (T2)
    pub fine_tick: Duration,

    /// How long to wait for a kind validation before giving up
    pub validation_timeout: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            coarse_tick: Duration::from_secs(60),
            fine_tick: Duration::from_secs(1),
            validation_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&TrackerConfig> for TrackerSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            coarse_tick: Duration::from_secs(config.coarse_tick_secs),
            fine_tick: Duration::from_secs(config.fine_tick_secs),
            validation_timeout: Duration::from_secs(config.validation_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingValidation {
    vehicle: VehicleHandle,
    kind: VehicleKind,
    sent_at: Instant,
}

#[derive(Debug, Clone)]
struct ActiveSession {
    kind: VehicleKind,
    started_at: Instant,
}

/// Leaderboard row annotated with the local live session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatsView {
    #[serde(flatten)]
    pub view: StatsView,

    /// The local actor is driving this kind right now
    pub is_active: bool,

    /// Seconds into the current session
    pub current_session: f64,
}

pub struct SessionTracker<H: VehicleHost> {
    host: H,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
    /// Start timestamps of live sessions, by instance
    sessions: HashMap<VehicleHandle, ActiveSession>,
    /// Instances that already produced their spawn event
    tracked: HashSet<VehicleHandle>,
    /// Validation requests awaiting a response, by request id
    in_flight: HashMap<u64, PendingValidation>,
    next_request_id: u64,
    outbox: Vec<ClientMessage>,
}

impl<H: VehicleHost> SessionTracker<H> {
    pub fn new(host: H, clock: Arc<dyn Clock>, settings: TrackerSettings) -> Self {
        Self {
            host,
            clock,
            settings,
            sessions: HashMap::new(),
            tracked: HashSet::new(),
            in_flight: HashMap::new(),
            next_request_id: 1,
            outbox: Vec::new(),
        }
    }

    fn kind_of(&self, vehicle: VehicleHandle) -> Option<VehicleKind> {
        self.host
            .display_name(vehicle)
            .and_then(|name| VehicleKind::new(&name))
    }

    /// Local actor entered `vehicle`. Starts an asynchronous kind validation
    /// when they are the driver.
    pub fn on_enter(&mut self, vehicle: VehicleHandle) {
        if !self.host.is_local_driver(vehicle) {
            return;
        }

        if self.sessions.contains_key(&vehicle) {
            debug!(vehicle = vehicle.0, "Session already running");
            return;
        }

        if self.in_flight.values().any(|p| p.vehicle == vehicle) {
            debug!(vehicle = vehicle.0, "Validation already in flight");
            return;
        }

        let Some(kind) = self.kind_of(vehicle) else {
            debug!(vehicle = vehicle.0, "Vehicle has no display name");
            return;
        };

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        self.in_flight.insert(
            request_id,
            PendingValidation {
                vehicle,
                kind: kind.clone(),
                sent_at: self.clock.now(),
            },
        );
        self.outbox.push(ClientMessage::ValidateVehicle {
            request_id,
            vehicle_name: kind.to_string(),
        });
    }

    /// Response to a validation request. Late, unknown or negative
    /// responses start nothing.
    pub fn on_validation(&mut self, request_id: u64, valid: bool) {
        let Some(pending) = self.in_flight.remove(&request_id) else {
            debug!(request_id, "Ignoring validation response with no pending request");
            return;
        };

        if !valid {
            debug!(kind = %pending.kind, "Vehicle not recognized, not tracking");
            return;
        }

        let vehicle = pending.vehicle;
        if !self.host.is_local_driver(vehicle) {
            debug!(vehicle = vehicle.0, "No longer driving, validation dropped");
            return;
        }

        if self.sessions.contains_key(&vehicle) {
            return;
        }

        let kind = pending.kind;
        if self.tracked.insert(vehicle) {
            self.outbox.push(ClientMessage::VehicleSpawned {
                vehicle_name: kind.to_string(),
            });
        }

        self.outbox.push(ClientMessage::StartVehicleSession {
            vehicle_name: kind.to_string(),
            net_id: self.host.network_id(vehicle),
        });
        self.sessions.insert(
            vehicle,
            ActiveSession {
                kind: kind.clone(),
                started_at: self.clock.now(),
            },
        );

        info!(kind = %kind, vehicle = vehicle.0, "Started/Resumed tracking");
    }

    /// Local actor left `vehicle`
    pub fn on_exit(&mut self, vehicle: VehicleHandle) {
        if let Some(session) = self.sessions.remove(&vehicle) {
            let elapsed = self.clock.now().saturating_duration_since(session.started_at);
            self.outbox.push(ClientMessage::EndVehicleSession);
            info!(
                kind = %session.kind,
                elapsed_secs = elapsed.as_secs_f64(),
                "Stopped tracking"
            );
        }
    }

    /// `vehicle` was deleted from the world
    pub fn on_removed(&mut self, vehicle: VehicleHandle) {
        self.on_exit(vehicle);
        self.tracked.remove(&vehicle);
        self.in_flight.retain(|_, pending| pending.vehicle != vehicle);
    }

    /// Coarse tick: report authoritative drive time, or re-run entry
    /// if the session was never started
    pub fn on_coarse_tick(&mut self) {
        self.expire_validations();

        let Some(vehicle) = self.host.current_vehicle() else {
            return;
        };
        if !self.host.is_local_driver(vehicle) {
            return;
        }

        if !self.sessions.contains_key(&vehicle) {
            self.on_enter(vehicle);
            return;
        }

        if let Some(kind) = self.kind_of(vehicle) {
            self.outbox.push(ClientMessage::VehicleUsed {
                vehicle_name: kind.to_string(),
                seconds: self.settings.coarse_tick.as_secs_f64(),
            });
        }
    }

    /// Fine tick: live heartbeat while driving
    pub fn on_fine_tick(&mut self) {
        let Some(vehicle) = self.host.current_vehicle() else {
            return;
        };
        if !self.host.is_local_driver(vehicle) {
            return;
        }

        if let Some(kind) = self.kind_of(vehicle) {
            self.outbox.push(ClientMessage::Heartbeat {
                vehicle_name: kind.to_string(),
                seconds: self.settings.fine_tick.as_secs_f64(),
            });
        }
    }

    fn expire_validations(&mut self) {
        let now = self.clock.now();
        let timeout = self.settings.validation_timeout;
        let before = self.in_flight.len();

        self.in_flight
            .retain(|_, pending| now.saturating_duration_since(pending.sent_at) < timeout);

        let expired = before - self.in_flight.len();
        if expired > 0 {
            debug!(expired, "Validation requests timed out");
        }
    }

    /// Server-wide reset: forget every local session
    pub fn reset(&mut self) {
        self.sessions.clear();
        self.tracked.clear();
        self.in_flight.clear();
        info!("Local vehicle sessions reset");
    }

    /// Ask the server for the leaderboard
    pub fn request_stats(&mut self) {
        self.outbox.push(ClientMessage::RequestStats);
    }

    /// Take the messages produced since the last drain
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Kind and elapsed time of the session in the vehicle currently occupied
    pub fn current_session(&self) -> Option<(VehicleKind, Duration)> {
        let vehicle = self.host.current_vehicle()?;
        let session = self.sessions.get(&vehicle)?;
        let elapsed = self.clock.now().saturating_duration_since(session.started_at);
        Some((session.kind.clone(), elapsed))
    }

    /// Mark the row of the vehicle being driven and attach its session length
    pub fn annotate(&self, snapshot: &StatsSnapshot) -> Vec<LiveStatsView> {
        let current_kind = self
            .host
            .current_vehicle()
            .and_then(|vehicle| self.kind_of(vehicle));
        let current_session = self
            .current_session()
            .map(|(_, elapsed)| elapsed.as_secs_f64())
            .unwrap_or(0.0);

        snapshot
            .stats
            .iter()
            .map(|view| {
                let is_active = current_kind
                    .as_ref()
                    .is_some_and(|kind| kind.as_str() == view.vehicle_name);
                LiveStatsView {
                    view: view.clone(),
                    is_active,
                    current_session: if current_kind.is_some() { current_session } else { 0.0 },
                }
            })
            .collect()
    }

    pub fn has_session(&self, vehicle: VehicleHandle) -> bool {
        self.sessions.contains_key(&vehicle)
    }

    pub fn pending_validations(&self) -> usize {
        self.in_flight.len()
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}
