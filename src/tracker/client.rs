// Tracker websocket client
// Drives a SessionTracker against a live stats server: ticks, validation round trips and reset broadcasts

use super::host::{ScriptedHost, VehicleHost};
use super::{LiveStatsView, SessionTracker, TrackerSettings};
use crate::clock::SystemClock;
use crate::protocol::ServerMessage;
use anyhow::{Context, Result};
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

/// One scripted drive
#[derive(Debug, Clone)]
pub struct DrivePlan {
    /// Websocket endpoint, e.g. ws://127.0.0.1:30125/ws
    pub url: String,

    /// Display name of the vehicle model
    pub vehicle: String,

    /// How long to stay in the vehicle
    pub duration: Duration,

    /// Sit in the driver seat (passengers are not tracked)
    pub as_driver: bool,
}

#[derive(Debug, Clone)]
pub struct DriveSummary {
    /// Messages sent to the server
    pub sent: usize,

    /// Whether the server accepted the vehicle and a session ran
    pub session_started: bool,

    /// Leaderboard as seen from inside the vehicle just before leaving
    pub stats: Vec<LiveStatsView>,
}

/// Connect, drive for `plan.duration`, fetch the leaderboard, leave and disconnect
pub async fn run_drive(plan: DrivePlan, settings: TrackerSettings) -> Result<DriveSummary> {
    let (socket, _) = tokio_tungstenite::connect_async(plan.url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", plan.url))?;
    let (mut sink, mut stream) = socket.split();
    info!(url = %plan.url, vehicle = %plan.vehicle, "Connected to stats server");

    let mut host = ScriptedHost::new();
    let vehicle = host.spawn_vehicle(&plan.vehicle);
    host.enter(vehicle, plan.as_driver);

    let mut tracker = SessionTracker::new(host, Arc::new(SystemClock), settings);
    tracker.on_enter(vehicle);
    let mut sent = flush(&mut tracker, &mut sink).await?;

    let start = Instant::now();
    let mut coarse = interval_at(start + settings.coarse_tick, settings.coarse_tick);
    let mut fine = interval_at(start + settings.fine_tick, settings.fine_tick);
    let end = tokio::time::sleep(plan.duration);
    tokio::pin!(end);

    let mut leaving = false;
    let mut session_started = false;

    let stats = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(ServerMessage::ValidationResult { request_id, valid }) => {
                        tracker.on_validation(request_id, valid);
                        if !valid {
                            warn!(vehicle = %plan.vehicle, "Vehicle is not in the server catalog");
                        }
                    }
                    Ok(ServerMessage::ResetStats) => tracker.reset(),
                    Ok(ServerMessage::ReceiveStats { snapshot }) if leaving => {
                        break tracker.annotate(&snapshot);
                    }
                    Ok(ServerMessage::ReceiveStats { .. }) => debug!("Ignoring unrequested stats"),
                    Ok(ServerMessage::Error { message }) => warn!(%message, "Server rejected a message"),
                    Err(e) => warn!(error = %e, "Unreadable server message"),
                },
                Some(Ok(WsMessage::Close(_))) | None => anyhow::bail!("Stats server closed the connection"),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("Websocket receive failed"),
            },
            _ = coarse.tick() => tracker.on_coarse_tick(),
            _ = fine.tick() => tracker.on_fine_tick(),
            _ = &mut end, if !leaving => {
                leaving = true;
                session_started = tracker.has_session(vehicle);
                tracker.request_stats();
            }
        }

        sent += flush(&mut tracker, &mut sink).await?;
    };

    tracker.host_mut().leave();
    tracker.on_exit(vehicle);
    sent += flush(&mut tracker, &mut sink).await?;
    let _ = sink.close().await;

    info!(sent, session_started, "Drive finished");
    Ok(DriveSummary { sent, session_started, stats })
}

/// Send everything the tracker queued
async fn flush<H, S>(tracker: &mut SessionTracker<H>, sink: &mut S) -> Result<usize>
where
    H: VehicleHost,
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let messages = tracker.drain();
    let count = messages.len();

    for message in messages {
        let json = message.to_json()?;
        debug!(%json, "Sending tracker message");
        sink.send(WsMessage::Text(json)).await.context("Websocket send failed")?;
    }
    Ok(count)
}
