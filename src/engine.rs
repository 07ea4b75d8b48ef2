//! Engine orchestration
//!
//! [`TelemetryEngine`] owns all mutable state and applies one typed event at
//! a time: identity resolution first, then the per-kind mutation (location
//! fusion, movement state machine, emergency aggregation), then the output
//! events describing what changed. All operations are synchronous pure
//! computation over in-memory state, so any serializing dispatcher — a single
//! consumer thread, an actor, a mutex — gives the required
//! one-event-at-a-time ordering. Events apply in arrival order; a
//! late-arriving but chronologically older reading overwrites a newer one
//! (no reordering buffer).

use crate::emergency::{EmergencyLedger, GlobalEdge};
use crate::events::{
    BeaconUpdate, EmergencyAlert, GlobalEmergencyCleared, GlobalEmergencyRaised, OutputEvent,
    RoomChanged, SignalUpdate,
};
use crate::fusion;
use crate::movement::SensorFleet;
use crate::resolver::EntityRegistry;
use crate::rooms::{self, RoomDirectory};
use crate::schema::{EmergencyEvent, StatusEvent, TelemetryEvent, TopicAdapter};
use crate::types::{
    GlobalEmergencyState, Room, SensorDevice, SensorKind, SignalReading, Snapshot, TrackedEntity,
};
use chrono::Utc;
use tracing::{info, warn};

/// Stateful telemetry fusion engine.
pub struct TelemetryEngine {
    instance_id: String,
    rooms: RoomDirectory,
    entities: EntityRegistry,
    sensors: SensorFleet,
    emergencies: EmergencyLedger,
    /// Arrival counter stamped onto signal readings.
    seq: u64,
}

impl Default for TelemetryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryEngine {
    /// Create an engine with the standard room directory.
    pub fn new() -> Self {
        Self::with_rooms(RoomDirectory::default())
    }

    /// Create an engine over a custom room directory.
    pub fn with_rooms(rooms: RoomDirectory) -> Self {
        TelemetryEngine {
            instance_id: uuid::Uuid::new_v4().to_string(),
            rooms,
            entities: EntityRegistry::new(),
            sensors: SensorFleet::new(),
            emergencies: EmergencyLedger::new(),
            seq: 0,
        }
    }

    /// Apply one typed telemetry event and return the output events the
    /// mutation produced. Invalid events are dropped with a log entry;
    /// ingestion never fails.
    pub fn apply(&mut self, event: TelemetryEvent) -> Vec<OutputEvent> {
        if let Err(err) = event.validate() {
            warn!(kind = event.kind_name(), %err, "dropping invalid telemetry event");
            return Vec::new();
        }

        match event {
            TelemetryEvent::Movement(ev) => self.sensors.apply(&ev, &self.rooms, Utc::now()),
            TelemetryEvent::Emergency(ev) => self.apply_emergency(ev),
            TelemetryEvent::Status(ev) => self.apply_status(ev),
        }
    }

    /// Parse and apply a raw broker message. Unparsable payloads and unknown
    /// topics are dropped with a log entry, keeping the availability
    /// guarantee: never crash on bad input, always keep processing.
    pub fn apply_message(&mut self, topic: &str, payload: &serde_json::Value) -> Vec<OutputEvent> {
        match TopicAdapter::parse(topic, payload) {
            Ok(event) => self.apply(event),
            Err(err) => {
                warn!(topic, %err, "dropping unparsable broker message");
                Vec::new()
            }
        }
    }

    fn apply_status(&mut self, ev: StatusEvent) -> Vec<OutputEvent> {
        let now = Utc::now();
        let key = self.entities.resolve_status(&ev.uuid, &ev.device_name, now);
        self.seq += 1;
        let reading = SignalReading {
            node_id: ev.reporting_node.clone(),
            rssi: ev.rssi,
            room: rooms::canonicalize(&ev.room),
            timestamp: now,
            seq: self.seq,
        };

        let Some(entity) = self.entities.get_mut(&key) else {
            return Vec::new();
        };
        entity.name = ev.device_name.clone();
        entity.last_seen = now;
        entity.last_node = Some(ev.reporting_node.clone());

        let outcome = fusion::apply_reading(entity, reading);

        let mut events = Vec::with_capacity(3);
        if outcome.room_changed {
            events.push(OutputEvent::RoomChanged(RoomChanged {
                device_id: key.clone(),
                name: ev.device_name.clone(),
                room: outcome.room.clone(),
                rssi: outcome.rssi,
                reporting_node: outcome.node_id,
            }));
        }
        events.push(OutputEvent::BeaconUpdate(BeaconUpdate {
            device_name: ev.device_name,
            uuid: key.clone(),
            room: outcome.room.clone(),
            rssi: ev.rssi,
            reporting_node: ev.reporting_node.clone(),
        }));
        events.push(OutputEvent::SignalUpdate(SignalUpdate {
            uuid: key,
            room: outcome.room,
            rssi: outcome.rssi,
            reporting_node: ev.reporting_node,
        }));
        events
    }

    fn apply_emergency(&mut self, ev: EmergencyEvent) -> Vec<OutputEvent> {
        let now = Utc::now();
        // Firmware without a uuid attaches the flag to the topic room token.
        let identifier = ev
            .uuid
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| ev.room.clone());
        let key = self.entities.resolve(&identifier, now);
        let room = rooms::canonicalize(&ev.room);

        let Some(entity) = self.entities.get_mut(&key) else {
            return Vec::new();
        };
        // An entity that has never had a signal fix takes the reported room;
        // a located entity keeps its fused assignment. The flag never
        // fabricates a signal reading for the reporting node.
        if entity.room.is_none() {
            entity.room = Some(room.clone());
        }
        entity.emergency = ev.emergency;
        entity.last_seen = now;
        if let Some(node) = &ev.reporting_node {
            entity.last_node = Some(node.clone());
        }
        let alert_room = entity.room.clone().unwrap_or(room);

        let edge = self.emergencies.set(&key, ev.emergency);
        info!(
            entity = %key,
            room = %alert_room,
            emergency = ev.emergency,
            node = ev.reporting_node.as_deref().unwrap_or("unknown"),
            "emergency flag updated"
        );

        let mut events = vec![OutputEvent::EmergencyAlert(EmergencyAlert {
            uuid: key,
            room: alert_room,
            emergency: ev.emergency,
            reporting_node: ev.reporting_node,
            timestamp: now,
        })];
        match edge {
            Some(GlobalEdge::Raised) => {
                events.push(OutputEvent::GlobalEmergencyRaised(GlobalEmergencyRaised {
                    active_count: self.emergencies.state().count,
                    timestamp: now,
                }));
            }
            Some(GlobalEdge::Cleared) => {
                events.push(OutputEvent::GlobalEmergencyCleared(GlobalEmergencyCleared {
                    timestamp: now,
                }));
            }
            None => {}
        }
        events
    }

    // ------------------------------------------------------------------
    // Read-only snapshot interface for the external CRUD/reporting layer
    // ------------------------------------------------------------------

    /// All tracked entities, sorted by canonical key.
    pub fn entities(&self) -> Vec<&TrackedEntity> {
        let mut entities: Vec<_> = self.entities.iter().collect();
        entities.sort_by(|a, b| a.key.cmp(&b.key));
        entities
    }

    /// Look up one entity by any of its aliases.
    pub fn entity(&self, identifier: &str) -> Option<&TrackedEntity> {
        self.entities
            .lookup(identifier)
            .map(str::to_string)
            .and_then(|key| self.entities.get(&key))
    }

    pub fn sensors(&self) -> &[SensorDevice] {
        self.sensors.sensors()
    }

    pub fn sensor(&self, name: &str) -> Option<&SensorDevice> {
        self.sensors.get(name)
    }

    pub fn rooms(&self) -> &[Room] {
        self.rooms.rooms()
    }

    /// Derived emergency aggregate.
    pub fn emergency_state(&self) -> GlobalEmergencyState {
        self.emergencies.state()
    }

    /// Full state snapshot for a newly connected observer.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            instance_id: self.instance_id.clone(),
            engine_version: crate::ENGINE_VERSION.to_string(),
            rooms: self.rooms.rooms().to_vec(),
            sensors: self.sensors.sensors().to_vec(),
            beacons: self.entities().into_iter().cloned().collect(),
        }
    }

    // ------------------------------------------------------------------
    // Registration operations backing the external CRUD layer
    // ------------------------------------------------------------------

    pub fn add_room(&mut self, name: impl Into<String>) -> u32 {
        self.rooms.add_room(name)
    }

    pub fn add_sensor(
        &mut self,
        room_id: u32,
        name: impl Into<String>,
        kind: SensorKind,
        value: f64,
    ) -> u32 {
        self.sensors.add_sensor(room_id, name, kind, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MovementAlertKind;
    use pretty_assertions::assert_eq;

    fn room_changes(events: &[OutputEvent]) -> Vec<&RoomChanged> {
        events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::RoomChanged(rc) => Some(rc),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn strongest_node_determines_room() {
        let mut engine = TelemetryEngine::new();

        engine.apply(TelemetryEvent::status("Tag1", "U1", -60, "bedroom", "M5A"));
        engine.apply(TelemetryEvent::status("Tag1", "U1", -90, "bathroom", "M5B"));

        let entity = engine.entity("U1").unwrap();
        assert_eq!(entity.room.as_deref(), Some("Bedroom"));
        assert_eq!(entity.rssi, Some(-60));
        assert_eq!(entity.readings.len(), 2);
    }

    #[test]
    fn final_room_matches_strongest_stored_signal() {
        let mut engine = TelemetryEngine::new();

        engine.apply(TelemetryEvent::status("Tag1", "U1", -75, "bedroom", "M5A"));
        engine.apply(TelemetryEvent::status("Tag1", "U1", -68, "livingroom", "M5B"));
        engine.apply(TelemetryEvent::status("Tag1", "U1", -82, "bathroom", "M5C"));
        engine.apply(TelemetryEvent::status("Tag1", "U1", -64, "bathroom", "M5C"));

        let entity = engine.entity("U1").unwrap();
        assert_eq!(entity.room.as_deref(), Some("Bathroom"));
        assert_eq!(entity.rssi, Some(-64));
    }

    #[test]
    fn repeated_status_is_idempotent() {
        let mut engine = TelemetryEngine::new();

        let first = engine.apply(TelemetryEvent::status("Tag1", "U1", -60, "bedroom", "M5A"));
        assert_eq!(room_changes(&first).len(), 1);

        let second = engine.apply(TelemetryEvent::status("Tag1", "U1", -60, "bedroom", "M5A"));
        assert_eq!(room_changes(&second).len(), 0);
        // The live-RSSI refresh still goes out.
        assert!(second
            .iter()
            .any(|e| matches!(e, OutputEvent::SignalUpdate(_))));
        assert!(second
            .iter()
            .any(|e| matches!(e, OutputEvent::BeaconUpdate(_))));
    }

    #[test]
    fn status_events_carry_current_and_strongest_rssi() {
        let mut engine = TelemetryEngine::new();
        engine.apply(TelemetryEvent::status("Tag1", "U1", -60, "bedroom", "M5A"));
        let events = engine.apply(TelemetryEvent::status("Tag1", "U1", -90, "bathroom", "M5B"));

        // BeaconUpdate reports the triggering reading, SignalUpdate the
        // strongest stored one; both carry the fused room.
        match events
            .iter()
            .find(|e| matches!(e, OutputEvent::BeaconUpdate(_)))
        {
            Some(OutputEvent::BeaconUpdate(update)) => {
                assert_eq!(update.rssi, -90);
                assert_eq!(update.room, "Bedroom");
            }
            other => panic!("expected beacon update, got {:?}", other),
        }
        match events
            .iter()
            .find(|e| matches!(e, OutputEvent::SignalUpdate(_)))
        {
            Some(OutputEvent::SignalUpdate(update)) => {
                assert_eq!(update.rssi, -60);
                assert_eq!(update.room, "Bedroom");
            }
            other => panic!("expected signal update, got {:?}", other),
        }
    }

    #[test]
    fn unique_id_merges_with_entity_known_by_name() {
        let mut engine = TelemetryEngine::new();

        // First contact: an emergency flag with no uuid, identified only by
        // the topic room token.
        engine.apply(TelemetryEvent::emergency(None, "M5_Bedroom", true, None));
        assert!(engine.entity("M5_Bedroom").unwrap().emergency);

        // A status message later pairs that name with a stable unique id.
        engine.apply(TelemetryEvent::status("M5_Bedroom", "uuid-123", -58, "bedroom", "M5A"));

        // Both identifiers now resolve to the same record: the emergency
        // flag survives and the signal fix landed on it.
        let by_uuid = engine.entity("uuid-123").unwrap();
        let by_name = engine.entity("M5_Bedroom").unwrap();
        assert_eq!(by_uuid.key, by_name.key);
        assert!(by_uuid.emergency);
        assert_eq!(by_uuid.room.as_deref(), Some("Bedroom"));
        assert_eq!(engine.entities().len(), 1);
    }

    #[test]
    fn emergency_alert_is_always_emitted() {
        let mut engine = TelemetryEngine::new();

        let first = engine.apply(TelemetryEvent::emergency(
            Some("U1".to_string()),
            "bathroom",
            true,
            Some("M5B".to_string()),
        ));
        let second = engine.apply(TelemetryEvent::emergency(
            Some("U1".to_string()),
            "bathroom",
            true,
            Some("M5B".to_string()),
        ));

        for events in [&first, &second] {
            assert!(events
                .iter()
                .any(|e| matches!(e, OutputEvent::EmergencyAlert(_))));
        }
        // The repeat did not grow the active set.
        assert_eq!(engine.emergency_state().count, 1);
        // Only the first call crossed the empty → non-empty edge.
        assert!(first
            .iter()
            .any(|e| matches!(e, OutputEvent::GlobalEmergencyRaised(_))));
        assert!(!second
            .iter()
            .any(|e| matches!(e, OutputEvent::GlobalEmergencyRaised(_))));
    }

    #[test]
    fn global_clear_fires_once_after_all_entities_clear() {
        let mut engine = TelemetryEngine::new();
        let raise = |uuid: &str| {
            TelemetryEvent::emergency(Some(uuid.to_string()), "bedroom", true, None)
        };
        let clear = |uuid: &str| {
            TelemetryEvent::emergency(Some(uuid.to_string()), "bedroom", false, None)
        };

        engine.apply(raise("U1"));
        engine.apply(raise("U2"));

        // One of two cleared: aggregate stays active, no global signal.
        let events = engine.apply(clear("U1"));
        assert!(engine.emergency_state().any_active);
        assert!(!events
            .iter()
            .any(|e| matches!(e, OutputEvent::GlobalEmergencyCleared(_))));

        // Second clear empties the set: exactly one cleared signal.
        let events = engine.apply(clear("U2"));
        let cleared: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, OutputEvent::GlobalEmergencyCleared(_)))
            .collect();
        assert_eq!(cleared.len(), 1);
        assert!(!engine.emergency_state().any_active);
    }

    #[test]
    fn emergency_does_not_fabricate_a_signal_reading() {
        let mut engine = TelemetryEngine::new();

        engine.apply(TelemetryEvent::status("Tag1", "U1", -60, "bedroom", "M5A"));
        engine.apply(TelemetryEvent::emergency(
            Some("U1".to_string()),
            "bathroom",
            true,
            Some("M5B".to_string()),
        ));

        // The flag is set, but the bathroom node gained no phantom reading
        // and the fused room is untouched.
        let entity = engine.entity("U1").unwrap();
        assert!(entity.emergency);
        assert_eq!(entity.readings.len(), 1);
        assert_eq!(entity.room.as_deref(), Some("Bedroom"));
    }

    #[test]
    fn movement_lifecycle_clears_exactly_once() {
        let mut engine = TelemetryEngine::new();

        engine.apply(TelemetryEvent::no_movement("bedroom_ultrasonic_1", 30, 55.0));
        let events = engine.apply(TelemetryEvent::Movement(crate::schema::MovementEvent {
            kind: crate::schema::MovementKind::MovementRestored,
            device_id: "bedroom_ultrasonic_1".to_string(),
            distance: None,
            duration: None,
            message: None,
        }));

        let cleared: Vec<_> = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    OutputEvent::MovementEmergency(a) if a.kind == MovementAlertKind::Cleared
                )
            })
            .collect();
        assert_eq!(cleared.len(), 1);

        let sensor = engine.sensor("bedroom_ultrasonic_1").unwrap();
        assert_eq!(sensor.state, crate::types::MovementState::Normal);
    }

    #[test]
    fn movement_anomaly_does_not_touch_emergency_aggregate() {
        let mut engine = TelemetryEngine::new();

        engine.apply(TelemetryEvent::no_movement("bedroom_ultrasonic_1", 45, 12.0));
        assert_eq!(engine.emergency_state().count, 0);
        assert!(!engine.emergency_state().any_active);
    }

    #[test]
    fn invalid_events_are_dropped_without_state_change() {
        let mut engine = TelemetryEngine::new();

        let events = engine.apply(TelemetryEvent::status("Tag1", "", -60, "bedroom", "M5A"));
        assert!(events.is_empty());
        assert!(engine.entities().is_empty());

        let events = engine.apply(TelemetryEvent::regular_update("", 10.0));
        assert!(events.is_empty());
        assert!(engine.sensors().is_empty());
    }

    #[test]
    fn unparsable_broker_messages_are_dropped() {
        let mut engine = TelemetryEngine::new();

        let events = engine.apply_message(
            "homeassistant/climate/thermostat",
            &serde_json::json!({ "temp": 21 }),
        );
        assert!(events.is_empty());

        let events = engine.apply_message(
            crate::schema::MOVEMENT_TOPIC,
            &serde_json::json!({ "type": "no_movement" }),
        );
        assert!(events.is_empty());
        assert!(engine.sensors().is_empty());

        // The engine keeps processing afterwards.
        let events = engine.apply_message(
            "homeassistant/ble/devices/bedroom/status",
            &serde_json::json!({
                "deviceName": "Tag1", "uuid": "U1", "rssi": -60, "m5device": "M5A"
            }),
        );
        assert!(!events.is_empty());
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let mut engine = TelemetryEngine::new();
        engine.apply(TelemetryEvent::status("Tag1", "U1", -60, "bedroom", "M5A"));
        engine.apply(TelemetryEvent::regular_update("bedroom_ultrasonic_1", 80.0));
        let kitchen = engine.add_room("Kitchen");

        let snapshot = engine.snapshot();
        assert!(!snapshot.instance_id.is_empty());
        assert_eq!(snapshot.engine_version, crate::ENGINE_VERSION);
        assert_eq!(snapshot.rooms.len(), 4);
        assert_eq!(kitchen, 4);
        assert_eq!(snapshot.sensors.len(), 1);
        assert_eq!(snapshot.beacons.len(), 1);
        assert_eq!(snapshot.beacons[0].key, "U1");
    }

    #[test]
    fn add_sensor_registers_for_snapshot() {
        let mut engine = TelemetryEngine::new();
        let id = engine.add_sensor(1, "Temperature Sensor", SensorKind::Temperature, 22.0);

        assert_eq!(id, 1);
        let sensor = engine.sensor("Temperature Sensor").unwrap();
        assert_eq!(sensor.kind, SensorKind::Temperature);
        assert_eq!(sensor.value, 22.0);
    }
}
