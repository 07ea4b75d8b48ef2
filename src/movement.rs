//! Ultrasonic sensor fleet and the no-movement anomaly lifecycle
//!
//! Each sensor runs a two-state machine: `Normal` and `NoMovementSuspected`.
//! A `no_movement` report raises the suspicion and notifies; movement
//! restoration or an invalid-readings report clears it, idempotently. This
//! anomaly track is a notification channel of its own and never touches the
//! per-entity emergency aggregate.

use crate::events::{MovementAlertKind, MovementEmergency, OutputEvent, SensorUpdate};
use crate::rooms::RoomDirectory;
use crate::schema::{MovementEvent, MovementKind};
use crate::types::{MovementState, SensorDevice, SensorKind};
use chrono::{DateTime, Utc};
use tracing::info;

/// Registry of known sensor devices.
#[derive(Debug, Default)]
pub struct SensorFleet {
    sensors: Vec<SensorDevice>,
}

impl SensorFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sensor on behalf of the external CRUD layer.
    pub fn add_sensor(
        &mut self,
        room_id: u32,
        name: impl Into<String>,
        kind: SensorKind,
        value: f64,
    ) -> u32 {
        let id = self.next_id();
        self.sensors.push(SensorDevice {
            id,
            room_id,
            name: name.into(),
            kind,
            value,
            message: String::new(),
            state: MovementState::Normal,
        });
        id
    }

    pub fn get(&self, name: &str) -> Option<&SensorDevice> {
        self.sensors.iter().find(|s| s.name == name)
    }

    pub fn sensors(&self) -> &[SensorDevice] {
        &self.sensors
    }

    /// Apply one movement event, mutating the device record and returning
    /// the output events the mutation produces.
    pub fn apply(
        &mut self,
        event: &MovementEvent,
        rooms: &RoomDirectory,
        now: DateTime<Utc>,
    ) -> Vec<OutputEvent> {
        let idx = self.ensure(&event.device_id, rooms);
        let sensor = &mut self.sensors[idx];

        match event.kind {
            MovementKind::NoMovement => {
                sensor.state = MovementState::NoMovementSuspected;
                if let Some(distance) = event.distance {
                    sensor.value = distance;
                }
                let message = format!(
                    "No movement detected for {} seconds!",
                    event.duration.unwrap_or(0)
                );
                sensor.message = message.clone();

                vec![
                    OutputEvent::MovementEmergency(MovementEmergency {
                        device_id: sensor.name.clone(),
                        kind: MovementAlertKind::NoMovement,
                        duration: event.duration,
                        distance: event.distance,
                        message: message.clone(),
                        timestamp: now,
                    }),
                    OutputEvent::SensorUpdate(SensorUpdate {
                        device_id: sensor.name.clone(),
                        block_distance: sensor.value,
                        message,
                    }),
                ]
            }
            MovementKind::MovementRestored => {
                Self::clear(sensor, "Movement detected - emergency cleared", now)
            }
            MovementKind::InvalidReadings => {
                Self::clear(sensor, "Invalid readings - emergency cleared", now)
            }
            MovementKind::RegularUpdate => {
                sensor.state = MovementState::Normal;
                if let Some(distance) = event.distance {
                    sensor.value = distance;
                }
                sensor.message = event.message.clone().unwrap_or_default();

                vec![OutputEvent::SensorUpdate(SensorUpdate {
                    device_id: sensor.name.clone(),
                    block_distance: sensor.value,
                    message: sensor.message.clone(),
                })]
            }
        }
    }

    /// Clear transition, valid from any prior state.
    fn clear(sensor: &mut SensorDevice, message: &str, now: DateTime<Utc>) -> Vec<OutputEvent> {
        sensor.state = MovementState::Normal;
        sensor.value = 0.0;
        sensor.message = message.to_string();

        vec![
            OutputEvent::MovementEmergency(MovementEmergency {
                device_id: sensor.name.clone(),
                kind: MovementAlertKind::Cleared,
                duration: None,
                distance: None,
                message: message.to_string(),
                timestamp: now,
            }),
            OutputEvent::SensorUpdate(SensorUpdate {
                device_id: sensor.name.clone(),
                block_distance: 0.0,
                message: message.to_string(),
            }),
        ]
    }

    /// Find the sensor by device id, creating it with an inferred room when
    /// movement telemetry references an unseen device.
    fn ensure(&mut self, device_id: &str, rooms: &RoomDirectory) -> usize {
        if let Some(idx) = self.sensors.iter().position(|s| s.name == device_id) {
            return idx;
        }
        let room_id = rooms.infer_for_device(device_id);
        info!(device_id, room_id, "creating sensor for unseen device");
        let id = self.next_id();
        self.sensors.push(SensorDevice {
            id,
            room_id,
            name: device_id.to_string(),
            kind: SensorKind::BlockDistance,
            value: 0.0,
            message: String::new(),
            state: MovementState::Normal,
        });
        self.sensors.len() - 1
    }

    fn next_id(&self) -> u32 {
        self.sensors.iter().map(|s| s.id).max().unwrap_or(0) + 1
    }
}
