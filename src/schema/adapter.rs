//! Adapter for converting broker messages to typed telemetry events
//!
//! Reporting nodes publish JSON on a small set of topics:
//!
//! - `homeassistant/emergency/movement` — ultrasonic sensor telemetry
//! - `homeassistant/ble/devices/<room>/emergency` — per-beacon emergency flag
//! - `homeassistant/ble/devices/<room>/status` — beacon status (name/uuid/RSSI)
//!
//! This module is the pure parsing half of the ingestion boundary: it maps a
//! `(topic, payload)` pair to one [`TelemetryEvent`], including the legacy
//! `block_distance` payload shape and the topic-derived room token fallback
//! for emergency messages. Transport (broker subscription) lives outside the
//! crate; whatever receives the bytes hands them here.

use crate::error::EngineError;
use crate::schema::telemetry::*;
use serde::Deserialize;

/// Topic carrying ultrasonic movement telemetry.
pub const MOVEMENT_TOPIC: &str = "homeassistant/emergency/movement";

/// Adapter mapping raw broker messages to typed telemetry events
pub struct TopicAdapter;

/// A broker message as the transport hands it over.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Wire shape of movement payloads. `device`/`device_id` vary by firmware;
/// `block_distance` is the legacy field predating typed message kinds.
#[derive(Debug, Deserialize)]
struct MovementWire {
    #[serde(rename = "type")]
    kind: Option<String>,
    device: Option<String>,
    device_id: Option<String>,
    distance: Option<f64>,
    duration: Option<u32>,
    message: Option<String>,
    block_distance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EmergencyWire {
    uuid: Option<String>,
    #[serde(default)]
    emergency: bool,
    m5device: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusWire {
    #[serde(rename = "deviceName")]
    device_name: Option<String>,
    rssi: Option<i32>,
    uuid: Option<String>,
    m5device: Option<String>,
}

impl TopicAdapter {
    /// Parse one broker message into a typed telemetry event.
    pub fn parse(topic: &str, payload: &serde_json::Value) -> Result<TelemetryEvent, EngineError> {
        if topic == MOVEMENT_TOPIC {
            Self::parse_movement(payload)
        } else if topic.contains("/emergency") {
            Self::parse_emergency(topic, payload)
        } else if topic.contains("/status") {
            Self::parse_status(topic, payload)
        } else {
            Err(EngineError::UnknownTopic(topic.to_string()))
        }
    }

    /// Parse NDJSON (newline-delimited JSON) of [`BrokerMessage`] envelopes.
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<TelemetryEvent>, EngineError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let message: BrokerMessage = serde_json::from_str(trimmed).map_err(|e| {
                EngineError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            events.push(Self::parse(&message.topic, &message.payload)?);
        }
        Ok(events)
    }

    fn parse_movement(payload: &serde_json::Value) -> Result<TelemetryEvent, EngineError> {
        let wire: MovementWire = serde_json::from_value(payload.clone())?;

        let device_id = wire
            .device
            .or(wire.device_id)
            .filter(|d| !d.is_empty())
            .ok_or(EngineError::MissingDeviceId)?;

        let kind = match wire.kind.as_deref() {
            Some("no_movement") => MovementKind::NoMovement,
            Some("movement_restored") => MovementKind::MovementRestored,
            Some("invalid_readings") => MovementKind::InvalidReadings,
            Some("regular_update") => MovementKind::RegularUpdate,
            // Legacy firmware sends no type tag, only block_distance.
            None if wire.block_distance.is_some() => MovementKind::RegularUpdate,
            Some(other) => return Err(EngineError::UnknownEventKind(other.to_string())),
            None => {
                return Err(EngineError::MissingField("type or block_distance".to_string()))
            }
        };

        Ok(TelemetryEvent::Movement(MovementEvent {
            kind,
            device_id,
            distance: wire.distance.or(wire.block_distance),
            duration: wire.duration,
            message: wire.message,
        }))
    }

    fn parse_emergency(
        topic: &str,
        payload: &serde_json::Value,
    ) -> Result<TelemetryEvent, EngineError> {
        let wire: EmergencyWire = serde_json::from_value(payload.clone())?;
        let room = Self::room_token(topic);

        // Firmware without a uuid falls back to the topic room token, so the
        // flag still attaches to a stable identifier.
        let uuid = wire.uuid.filter(|u| !u.is_empty());

        Ok(TelemetryEvent::Emergency(EmergencyEvent {
            uuid,
            room,
            emergency: wire.emergency,
            reporting_node: wire.m5device,
        }))
    }

    fn parse_status(topic: &str, payload: &serde_json::Value) -> Result<TelemetryEvent, EngineError> {
        let wire: StatusWire = serde_json::from_value(payload.clone())?;

        let device_name = wire
            .device_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| EngineError::MissingField("deviceName".to_string()))?;
        let uuid = wire
            .uuid
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EngineError::MissingField("uuid".to_string()))?;
        let rssi = wire
            .rssi
            .ok_or_else(|| EngineError::MissingField("rssi".to_string()))?;
        let reporting_node = wire
            .m5device
            .filter(|n| !n.is_empty())
            .ok_or_else(|| EngineError::MissingField("m5device".to_string()))?;

        Ok(TelemetryEvent::Status(StatusEvent {
            device_name,
            uuid,
            rssi,
            room: Self::room_token(topic),
            reporting_node,
        }))
    }

    /// Room token from a `homeassistant/ble/devices/<room>/...` topic.
    fn room_token(topic: &str) -> String {
        topic
            .split('/')
            .nth(3)
            .filter(|t| !t.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }
}
