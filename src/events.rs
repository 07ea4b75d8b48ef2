//! Typed output events for the fan-out transport
//!
//! Every externally visible state change the engine makes is described by one
//! of these events. The engine decides *which* events a mutation produces;
//! delivering them (websocket broadcast, queue, log) is the transport's job.
//! Events are emitted strictly after the mutation they describe, so a
//! consumer that reads current state on receipt sees a value consistent with
//! the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Distance/message refresh for one sensor, always emitted on movement
/// telemetry so the sensor stays visible on dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorUpdate {
    pub device_id: String,
    pub block_distance: f64,
    pub message: String,
}

/// State of a movement anomaly notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementAlertKind {
    NoMovement,
    Cleared,
}

/// Movement-anomaly notification for one sensor. This channel is independent
/// of the per-entity emergency aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEmergency {
    pub device_id: String,
    pub kind: MovementAlertKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Full beacon refresh carrying the RSSI of the triggering reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconUpdate {
    pub device_name: String,
    pub uuid: String,
    pub room: String,
    pub rssi: i32,
    pub reporting_node: String,
}

/// Lower-priority live-RSSI refresh carrying the strongest stored signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalUpdate {
    pub uuid: String,
    pub room: String,
    pub rssi: i32,
    pub reporting_node: String,
}

/// Edge-triggered room reassignment for one beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomChanged {
    pub device_id: String,
    pub name: String,
    pub room: String,
    pub rssi: i32,
    pub reporting_node: String,
}

/// Per-entity emergency notification, emitted on every emergency event even
/// when the flag did not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub uuid: String,
    pub room: String,
    pub emergency: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_node: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The global aggregate went from no active emergencies to at least one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEmergencyRaised {
    pub active_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// The last active emergency was cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEmergencyCleared {
    pub timestamp: DateTime<Utc>,
}

/// A typed output event, one variant per externally visible change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutputEvent {
    SensorUpdate(SensorUpdate),
    MovementEmergency(MovementEmergency),
    BeaconUpdate(BeaconUpdate),
    SignalUpdate(SignalUpdate),
    RoomChanged(RoomChanged),
    EmergencyAlert(EmergencyAlert),
    GlobalEmergencyRaised(GlobalEmergencyRaised),
    GlobalEmergencyCleared(GlobalEmergencyCleared),
}

impl OutputEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutputEvent::SensorUpdate(_) => "sensor_update",
            OutputEvent::MovementEmergency(_) => "movement_emergency",
            OutputEvent::BeaconUpdate(_) => "beacon_update",
            OutputEvent::SignalUpdate(_) => "signal_update",
            OutputEvent::RoomChanged(_) => "room_changed",
            OutputEvent::EmergencyAlert(_) => "emergency_alert",
            OutputEvent::GlobalEmergencyRaised(_) => "global_emergency_raised",
            OutputEvent::GlobalEmergencyCleared(_) => "global_emergency_cleared",
        }
    }
}
