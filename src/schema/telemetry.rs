//! vigil.telemetry.v1 schema definition
//!
//! The closed set of typed input events the engine accepts. Reporting nodes
//! publish three kinds of telemetry: ultrasonic movement readings, per-beacon
//! emergency flags, and combined beacon status (name + unique id + RSSI).
//! Payloads are validated at this boundary before entering the core; the
//! engine never sees an unparsed or shapeless message.

use serde::{Deserialize, Serialize};

/// Current input schema version
pub const SCHEMA_VERSION: &str = "vigil.telemetry.v1";

/// Kind of movement telemetry from an ultrasonic sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// No movement detected for the reported duration; anomaly suspected.
    NoMovement,
    /// Movement seen again after an anomaly; clears the suspicion.
    MovementRestored,
    /// Sensor produced garbage readings; treated as a clear.
    InvalidReadings,
    /// Routine distance refresh.
    RegularUpdate,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::NoMovement => "no_movement",
            MovementKind::MovementRestored => "movement_restored",
            MovementKind::InvalidReadings => "invalid_readings",
            MovementKind::RegularUpdate => "regular_update",
        }
    }
}

/// Telemetry from an ultrasonic movement sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementEvent {
    pub kind: MovementKind,
    /// Reporting device id (e.g. "bedroom_ultrasonic_1").
    pub device_id: String,
    /// Measured distance in centimeters, when the kind carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Seconds without movement, for `no_movement`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Free-text status message from the device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-beacon emergency flag from a reporting node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyEvent {
    /// Beacon unique id. Absent on some firmware; the topic-derived room
    /// token stands in as the identifier then.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Room label as published (pre-canonicalization).
    pub room: String,
    /// Emergency flag; a missing flag on the wire reads as cleared.
    #[serde(default)]
    pub emergency: bool,
    /// Reporting node that forwarded the flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_node: Option<String>,
}

/// Combined beacon status: broadcast name, unique id, and one RSSI sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Broadcast name of the beacon (e.g. "M5_Bedroom").
    pub device_name: String,
    /// Stable unique id of the beacon.
    pub uuid: String,
    /// Received signal strength in dBm at the reporting node.
    pub rssi: i32,
    /// Room label of the reporting node (pre-canonicalization).
    pub room: String,
    /// Reporting node that measured the signal.
    pub reporting_node: String,
}

/// A typed telemetry event, one variant per telemetry kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Movement(MovementEvent),
    Emergency(EmergencyEvent),
    Status(StatusEvent),
}

impl TelemetryEvent {
    /// Create a routine movement distance refresh.
    pub fn regular_update(device_id: impl Into<String>, distance: f64) -> Self {
        TelemetryEvent::Movement(MovementEvent {
            kind: MovementKind::RegularUpdate,
            device_id: device_id.into(),
            distance: Some(distance),
            duration: None,
            message: None,
        })
    }

    /// Create a no-movement anomaly event.
    pub fn no_movement(device_id: impl Into<String>, duration: u32, distance: f64) -> Self {
        TelemetryEvent::Movement(MovementEvent {
            kind: MovementKind::NoMovement,
            device_id: device_id.into(),
            distance: Some(distance),
            duration: Some(duration),
            message: None,
        })
    }

    /// Create a beacon status event.
    pub fn status(
        device_name: impl Into<String>,
        uuid: impl Into<String>,
        rssi: i32,
        room: impl Into<String>,
        reporting_node: impl Into<String>,
    ) -> Self {
        TelemetryEvent::Status(StatusEvent {
            device_name: device_name.into(),
            uuid: uuid.into(),
            rssi,
            room: room.into(),
            reporting_node: reporting_node.into(),
        })
    }

    /// Create an emergency flag event.
    pub fn emergency(
        uuid: Option<String>,
        room: impl Into<String>,
        emergency: bool,
        reporting_node: Option<String>,
    ) -> Self {
        TelemetryEvent::Emergency(EmergencyEvent {
            uuid,
            room: room.into(),
            emergency,
            reporting_node,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TelemetryEvent::Movement(_) => "movement",
            TelemetryEvent::Emergency(_) => "emergency",
            TelemetryEvent::Status(_) => "status",
        }
    }

    /// Validate the event before it enters the core.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            TelemetryEvent::Movement(ev) => {
                if ev.device_id.is_empty() {
                    return Err(ValidationError::EmptyDeviceId);
                }
            }
            TelemetryEvent::Emergency(ev) => {
                let has_uuid = ev.uuid.as_deref().map_or(false, |u| !u.is_empty());
                if !has_uuid && ev.room.is_empty() {
                    return Err(ValidationError::NoIdentifier);
                }
            }
            TelemetryEvent::Status(ev) => {
                if ev.uuid.is_empty() {
                    return Err(ValidationError::EmptyField("uuid"));
                }
                if ev.device_name.is_empty() {
                    return Err(ValidationError::EmptyField("device_name"));
                }
                if ev.reporting_node.is_empty() {
                    return Err(ValidationError::EmptyField("reporting_node"));
                }
            }
        }
        Ok(())
    }
}

/// Validation errors for telemetry events
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("movement event has an empty device id")]
    EmptyDeviceId,

    #[error("emergency event carries neither uuid nor room token")]
    NoIdentifier,

    #[error("status event field is empty: {0}")]
    EmptyField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_status_event() {
        let event = TelemetryEvent::status("M5_Bedroom", "uuid-123", -60, "bedroom", "M5A");
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"event\":\"status\""));
        assert!(json.contains("\"device_name\":\"M5_Bedroom\""));
        assert!(json.contains("-60"));
    }

    #[test]
    fn deserialize_movement_event() {
        let json = r#"{
            "event": "movement",
            "kind": "no_movement",
            "device_id": "bedroom_ultrasonic_1",
            "distance": 42.5,
            "duration": 30
        }"#;

        let event: TelemetryEvent = serde_json::from_str(json).unwrap();
        match event {
            TelemetryEvent::Movement(ev) => {
                assert_eq!(ev.kind, MovementKind::NoMovement);
                assert_eq!(ev.device_id, "bedroom_ultrasonic_1");
                assert_eq!(ev.distance, Some(42.5));
                assert_eq!(ev.duration, Some(30));
            }
            other => panic!("expected movement event, got {:?}", other),
        }
    }

    #[test]
    fn deserialize_emergency_without_flag_reads_cleared() {
        let json = r#"{"event": "emergency", "room": "bedroom"}"#;
        let event: TelemetryEvent = serde_json::from_str(json).unwrap();
        match event {
            TelemetryEvent::Emergency(ev) => {
                assert!(!ev.emergency);
                assert!(ev.uuid.is_none());
            }
            other => panic!("expected emergency event, got {:?}", other),
        }
    }

    #[test]
    fn validate_rejects_empty_identifiers() {
        let event = TelemetryEvent::regular_update("", 10.0);
        assert_eq!(event.validate(), Err(ValidationError::EmptyDeviceId));

        let event = TelemetryEvent::emergency(None, "", true, None);
        assert_eq!(event.validate(), Err(ValidationError::NoIdentifier));

        let event = TelemetryEvent::status("Tag1", "", -60, "bedroom", "M5A");
        assert_eq!(event.validate(), Err(ValidationError::EmptyField("uuid")));
    }

    #[test]
    fn validate_accepts_room_token_as_emergency_identifier() {
        let event = TelemetryEvent::emergency(None, "bedroom", true, None);
        assert!(event.validate().is_ok());
    }
}
