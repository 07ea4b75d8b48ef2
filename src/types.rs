//! Core state types for the fusion engine
//!
//! This module defines the records the engine mutates in place as telemetry
//! arrives: tracked entities (BLE beacons worn by people), their per-node
//! signal readings, ultrasonic sensor devices with their movement-anomaly
//! state, and the room directory entries everything is assigned to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse proximity classification derived from RSSI.
///
/// Thresholds follow the deployment calibration: stronger than −70 dBm means
/// same room, −70..−85 dBm an adjacent room, weaker than −85 dBm far away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    Immediate,
    Near,
    Far,
}

impl Proximity {
    pub fn from_rssi(rssi: i32) -> Self {
        if rssi > -70 {
            Proximity::Immediate
        } else if rssi > -85 {
            Proximity::Near
        } else {
            Proximity::Far
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Proximity::Immediate => "immediate",
            Proximity::Near => "near",
            Proximity::Far => "far",
        }
    }
}

/// Latest signal-strength reading from one reporting node.
///
/// Only the latest reading per (entity, node) pair is retained; a new reading
/// from the same node replaces the previous one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalReading {
    /// Id of the fixed reporting node that measured the signal.
    pub node_id: String,
    /// Received signal strength in dBm (less negative = closer).
    pub rssi: i32,
    /// Room reported by the node, already canonicalized.
    pub room: String,
    /// When the reading was ingested.
    pub timestamp: DateTime<Utc>,
    /// Engine-assigned arrival stamp. Readings are ordered by arrival, not by
    /// embedded timestamp; this breaks equal-strength ties in favor of the
    /// most recently written reading.
    pub seq: u64,
}

/// A tracked beacon/person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEntity {
    /// Canonical key every alias of this entity resolves to.
    pub key: String,
    /// Display name; defaults to the key until a broadcast name arrives.
    pub name: String,
    /// All identifiers known to refer to this entity (the key included).
    pub aliases: Vec<String>,
    /// Current best-room assignment; None until the first signal fix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Strongest currently stored RSSI, for live display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i32>,
    /// Latest reading per reporting node.
    pub readings: HashMap<String, SignalReading>,
    /// Per-entity emergency flag (last write wins).
    pub emergency: bool,
    /// When any telemetry last referenced this entity.
    pub last_seen: DateTime<Utc>,
    /// Reporting node of the most recent telemetry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_node: Option<String>,
}

impl TrackedEntity {
    pub fn new(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        let key = key.into();
        TrackedEntity {
            name: key.clone(),
            aliases: vec![key.clone()],
            key,
            room: None,
            rssi: None,
            readings: HashMap::new(),
            emergency: false,
            last_seen: now,
            last_node: None,
        }
    }
}

/// Movement-anomaly lifecycle of one ultrasonic sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementState {
    #[default]
    Normal,
    NoMovementSuspected,
}

/// Kind of sensor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Ultrasonic distance sensor used for movement detection.
    BlockDistance,
    Temperature,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::BlockDistance => "block_distance",
            SensorKind::Temperature => "temperature",
        }
    }
}

/// A fixed sensor device (ultrasonic movement detector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorDevice {
    pub id: u32,
    /// Room the sensor is assigned to.
    pub room_id: u32,
    /// Device id as it appears on the wire (e.g. "bedroom_ultrasonic_1").
    pub name: String,
    pub kind: SensorKind,
    /// Last reported distance in centimeters.
    pub value: f64,
    /// Last free-text status message.
    pub message: String,
    pub state: MovementState,
}

/// A dashboard room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: u32,
    pub name: String,
}

/// Derived emergency aggregate, recomputed on every flag mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalEmergencyState {
    /// Canonical keys currently flagged, in sorted order.
    pub active: Vec<String>,
    pub count: usize,
    pub any_active: bool,
}

/// Full state snapshot sent to a newly connected observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Engine instance id (fresh per process).
    pub instance_id: String,
    pub engine_version: String,
    pub rooms: Vec<Room>,
    pub sensors: Vec<SensorDevice>,
    pub beacons: Vec<TrackedEntity>,
}
