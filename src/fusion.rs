//! Location fusion: strongest-signal room assignment
//!
//! Each tracked entity holds the latest reading from every reporting node
//! that has ever seen it. The entity's room is whichever node currently holds
//! the numerically greatest RSSI. No averaging or smoothing across nodes: the
//! strongest instantaneous signal is taken as the best proxy for physical
//! proximity, trading noise-robustness for responsiveness.

use crate::types::{Proximity, SignalReading, TrackedEntity};
use tracing::debug;

/// Result of folding one reading into an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionOutcome {
    /// True when the winning room differs from the previously stored one.
    pub room_changed: bool,
    /// Winning room after the update.
    pub room: String,
    /// Winning (strongest) RSSI after the update.
    pub rssi: i32,
    /// Node that holds the winning reading.
    pub node_id: String,
}

/// Store/replace the reading for its node and recompute the entity's best
/// room and display RSSI.
///
/// Tie-break for equal strength: prefer the node whose reported room equals
/// the entity's current room (stability bias), then the reading written most
/// recently.
pub fn apply_reading(entity: &mut TrackedEntity, reading: SignalReading) -> FusionOutcome {
    // The inserted reading doubles as the fallback winner; the map is never
    // empty past this point.
    let fallback = (reading.room.clone(), reading.rssi, reading.node_id.clone());
    entity.readings.insert(reading.node_id.clone(), reading);

    let current_room = entity.room.as_deref();
    let (room, rssi, node_id) = entity
        .readings
        .values()
        .max_by(|a, b| {
            a.rssi
                .cmp(&b.rssi)
                .then_with(|| {
                    let a_stable = current_room == Some(a.room.as_str());
                    let b_stable = current_room == Some(b.room.as_str());
                    a_stable.cmp(&b_stable)
                })
                .then_with(|| a.seq.cmp(&b.seq))
        })
        .map(|r| (r.room.clone(), r.rssi, r.node_id.clone()))
        .unwrap_or(fallback);

    let room_changed = entity.room.as_deref() != Some(room.as_str());
    if room_changed {
        debug!(
            entity = %entity.key,
            room = %room,
            rssi,
            node = %node_id,
            proximity = Proximity::from_rssi(rssi).as_str(),
            "strongest signal moved entity to new room"
        );
        entity.room = Some(room.clone());
    }
    entity.rssi = Some(rssi);

    FusionOutcome {
        room_changed,
        room,
        rssi,
        node_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn reading(node: &str, rssi: i32, room: &str, seq: u64) -> SignalReading {
        SignalReading {
            node_id: node.to_string(),
            rssi,
            room: room.to_string(),
            timestamp: Utc::now(),
            seq,
        }
    }

    #[test]
    fn first_reading_assigns_room() {
        let mut entity = TrackedEntity::new("U1", Utc::now());
        let outcome = apply_reading(&mut entity, reading("M5A", -60, "Bedroom", 1));

        assert!(outcome.room_changed);
        assert_eq!(outcome.room, "Bedroom");
        assert_eq!(entity.room.as_deref(), Some("Bedroom"));
        assert_eq!(entity.rssi, Some(-60));
    }

    #[test]
    fn strongest_signal_wins_across_nodes() {
        let mut entity = TrackedEntity::new("U1", Utc::now());
        apply_reading(&mut entity, reading("M5A", -60, "Bedroom", 1));
        let outcome = apply_reading(&mut entity, reading("M5B", -90, "Bathroom", 2));

        // The weaker bathroom node does not displace the bedroom fix.
        assert!(!outcome.room_changed);
        assert_eq!(outcome.room, "Bedroom");
        assert_eq!(outcome.node_id, "M5A");
        assert_eq!(entity.room.as_deref(), Some("Bedroom"));
        assert_eq!(entity.rssi, Some(-60));
    }

    #[test]
    fn replacing_a_reading_can_move_the_entity() {
        let mut entity = TrackedEntity::new("U1", Utc::now());
        apply_reading(&mut entity, reading("M5A", -60, "Bedroom", 1));
        apply_reading(&mut entity, reading("M5B", -80, "Bathroom", 2));

        // The bathroom node now sees the beacon up close.
        let outcome = apply_reading(&mut entity, reading("M5B", -50, "Bathroom", 3));
        assert!(outcome.room_changed);
        assert_eq!(outcome.room, "Bathroom");
        assert_eq!(entity.readings.len(), 2);
    }

    #[test]
    fn tie_prefers_current_room() {
        let mut entity = TrackedEntity::new("U1", Utc::now());
        apply_reading(&mut entity, reading("M5A", -70, "Bedroom", 1));

        // Equal strength from another room keeps the current assignment.
        let outcome = apply_reading(&mut entity, reading("M5B", -70, "Bathroom", 2));
        assert!(!outcome.room_changed);
        assert_eq!(outcome.room, "Bedroom");
        assert_eq!(outcome.node_id, "M5A");
    }

    #[test]
    fn tie_without_stability_bias_prefers_most_recent_write() {
        let mut entity = TrackedEntity::new("U1", Utc::now());
        apply_reading(&mut entity, reading("M5A", -70, "Bedroom", 1));
        apply_reading(&mut entity, reading("M5B", -70, "Bathroom", 2));

        // A third node ties from yet another room; neither matches the
        // current room except the incumbent, which still wins.
        let outcome = apply_reading(&mut entity, reading("M5C", -70, "Kitchen", 3));
        assert_eq!(outcome.room, "Bedroom");

        // Drop the stability anchor: once the bedroom node weakens, the tie
        // between the two remaining rooms goes to the most recent write.
        let outcome = apply_reading(&mut entity, reading("M5A", -95, "Bedroom", 4));
        assert_eq!(outcome.room, "Kitchen");
        assert_eq!(outcome.node_id, "M5C");
    }

    #[test]
    fn identical_reading_is_idempotent() {
        let mut entity = TrackedEntity::new("U1", Utc::now());
        apply_reading(&mut entity, reading("M5A", -60, "Bedroom", 1));
        let outcome = apply_reading(&mut entity, reading("M5A", -60, "Bedroom", 2));

        assert!(!outcome.room_changed);
        assert_eq!(entity.readings.len(), 1);
    }

    #[test]
    fn silent_node_pins_stale_room() {
        // A node that stops reporting keeps its last reading forever; its
        // stale strong signal continues to win. Documented limitation.
        let mut entity = TrackedEntity::new("U1", Utc::now());
        apply_reading(&mut entity, reading("M5A", -40, "Bedroom", 1));
        let outcome = apply_reading(&mut entity, reading("M5B", -75, "Bathroom", 2));

        assert_eq!(outcome.room, "Bedroom");
        assert_eq!(entity.room.as_deref(), Some("Bedroom"));
    }
}
