// Tracker <-> aggregator wire protocol
// JSON text frames, internally tagged by `type`

use crate::stats::StatsEntry;
use serde::{Deserialize, Serialize};

/// Messages a session tracker sends to the stats server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Ask whether a kind is recognized. Answered with `ValidationResult`.
    ValidateVehicle { request_id: u64, vehicle_name: String },

    /// First time this participant drove this vehicle instance
    VehicleSpawned { vehicle_name: String },

    StartVehicleSession { vehicle_name: String, net_id: u32 },

    EndVehicleSession,

    /// Authoritative drive time (coarse tick)
    VehicleUsed { vehicle_name: String, seconds: f64 },

    /// Liveness while driving (fine tick); never persisted
    Heartbeat { vehicle_name: String, seconds: f64 },

    RequestStats,
}

/// Messages the stats server sends to trackers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    ValidationResult { request_id: u64, valid: bool },

    /// Broadcast: all counters were cleared, drop local session state
    ResetStats,

    ReceiveStats { snapshot: StatsSnapshot },

    Error { message: String },
}

/// Leaderboard as shown to players
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub stats: Vec<StatsView>,

    /// Every recognized vehicle name
    pub all_vehicles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub vehicle_name: String,
    pub spawns: u64,
    pub usage_time: f64,
    pub formatted_time: String,

    /// Participants currently in a session with this kind
    #[serde(default)]
    pub active_drivers: usize,
}

impl StatsView {
    pub fn from_entry(entry: &StatsEntry, active_drivers: usize) -> Self {
        Self {
            vehicle_name: entry.vehicle_name.to_string(),
            spawns: entry.spawns,
            usage_time: entry.usage_time,
            formatted_time: crate::report::format_duration(entry.usage_time),
            active_drivers,
        }
    }
}

impl ClientMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_shape() {
        let msg = ClientMessage::StartVehicleSession {
            vehicle_name: "adder".to_string(),
            net_id: 17,
        };
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "startVehicleSession");
        assert_eq!(json["vehicleName"], "adder");
        assert_eq!(json["netId"], 17);
    }

    #[test]
    fn test_unit_variants_parse() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"endVehicleSession"}"#).unwrap();
        assert_eq!(msg, ClientMessage::EndVehicleSession);

        let msg: ServerMessage = serde_json::from_str(r#"{"type":"resetStats"}"#).unwrap();
        assert_eq!(msg, ServerMessage::ResetStats);
    }

    #[test]
    fn test_validation_result_parses() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"validationResult","requestId":3,"valid":true}"#)
                .unwrap();
        assert_eq!(msg, ServerMessage::ValidationResult { request_id: 3, valid: true });
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#).is_err());
    }
}
