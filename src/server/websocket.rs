// WebSocket handler for session trackers
// One connection per participant; incoming events go to the hub, replies and reset broadcasts go back out

use super::{ConnectionInfo, ServerState};
use crate::config::catalog::VehicleCatalog;
use crate::error::Result;
use crate::hub::{HubHandle, ParticipantId};
use crate::observability;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::stats::VehicleKind;
use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, State},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// WebSocket upgrade handler
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> Response {
    ws.on_upgrade(|socket| {
        let participant = Uuid::new_v4();
        handle_socket(socket, state, participant)
            .instrument(observability::connection_span(&participant))
    })
}

/// Handle one tracker connection
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>, participant: ParticipantId) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut broadcasts = state.hub.subscribe();

    state.connections.insert(participant, ConnectionInfo::new());
    info!(connections = state.connections.len(), "Tracker connected");

    // Replies and reset broadcasts share the socket's write half
    let mut send_task = tokio::spawn(
        async move {
            loop {
                let message = tokio::select! {
                    reply = out_rx.recv() => match reply {
                        Some(message) => message,
                        None => break,
                    },
                    event = broadcasts.recv() => match event {
                        Ok(message) => message,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Tracker fell behind on broadcasts");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };

                let json = match message.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "Failed to encode server message");
                        continue;
                    }
                };

                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
        .in_current_span(),
    );

    let hub = state.hub.clone();
    let catalog = state.catalog.clone();
    let mut recv_task = tokio::spawn(
        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => {
                            if let Err(e) = dispatch(message, participant, &hub, &catalog, &out_tx).await {
                                error!(error = %e, "Stats hub unavailable, closing connection");
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Malformed tracker message");
                            let _ = out_tx.send(ServerMessage::Error {
                                message: format!("invalid message: {e}"),
                            });
                        }
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
        .in_current_span(),
    );

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    let connected_secs = state
        .connections
        .remove(&participant)
        .map(|(_, info)| info.connected_for().as_secs_f64())
        .unwrap_or(0.0);
    if let Err(e) = state.hub.disconnected(participant).await {
        debug!(error = %e, "Hub gone before disconnect was recorded");
    }
    info!(connections = state.connections.len(), connected_secs, "Tracker disconnected");
}

/// Route one tracker message. Only a dead hub is an error.
async fn dispatch(
    message: ClientMessage,
    participant: ParticipantId,
    hub: &HubHandle,
    catalog: &VehicleCatalog,
    out: &mpsc::UnboundedSender<ServerMessage>,
) -> Result<()> {
    let reply = |message: ServerMessage| {
        let _ = out.send(message);
    };

    match message {
        ClientMessage::ValidateVehicle { request_id, vehicle_name } => {
            let valid = catalog.contains(&vehicle_name);
            debug!(request_id, vehicle = %vehicle_name, valid, "Vehicle validation");
            reply(ServerMessage::ValidationResult { request_id, valid });
        }
        ClientMessage::VehicleSpawned { vehicle_name } => match VehicleKind::new(&vehicle_name) {
            Some(kind) => hub.spawned(kind).await?,
            None => reply(blank_name()),
        },
        ClientMessage::StartVehicleSession { vehicle_name, net_id } => {
            match VehicleKind::new(&vehicle_name) {
                Some(kind) => hub.session_started(participant, kind, net_id).await?,
                None => reply(blank_name()),
            }
        }
        ClientMessage::EndVehicleSession => hub.session_ended(participant).await?,
        ClientMessage::VehicleUsed { vehicle_name, seconds } => match VehicleKind::new(&vehicle_name) {
            Some(kind) => hub.usage(kind, seconds).await?,
            None => reply(blank_name()),
        },
        ClientMessage::Heartbeat { vehicle_name, .. } => {
            if let Some(kind) = VehicleKind::new(&vehicle_name) {
                hub.heartbeat(participant, kind).await?;
            }
        }
        ClientMessage::RequestStats => {
            let snapshot = hub.snapshot().await?;
            debug!(kinds = snapshot.stats.len(), "Vehicle stats sent to tracker");
            reply(ServerMessage::ReceiveStats { snapshot });
        }
    }
    Ok(())
}

fn blank_name() -> ServerMessage {
    ServerMessage::Error {
        message: "vehicle name must not be blank".to_string(),
    }
}
