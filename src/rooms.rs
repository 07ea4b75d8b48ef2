//! Room directory and label canonicalization
//!
//! Reporting nodes label rooms with broker topic tokens ("livingroom",
//! "bedroom"); the dashboard uses display names ("Living Room", "Bedroom").
//! [`canonicalize`] is the fixed lookup between the two, applied by every
//! ingestion path before a room value is stored. The [`RoomDirectory`] holds
//! the known rooms and backs sensor room inference.

use crate::types::Room;

/// Normalize a reporting-node room label to its dashboard display name.
///
/// Case-insensitive fixed table; labels with no entry pass through verbatim.
pub fn canonicalize(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "livingroom" | "living_room" => "Living Room".to_string(),
        "bedroom" => "Bedroom".to_string(),
        "bathroom" => "Bathroom".to_string(),
        _ => raw.to_string(),
    }
}

/// Registry of dashboard rooms.
#[derive(Debug, Clone)]
pub struct RoomDirectory {
    rooms: Vec<Room>,
}

impl Default for RoomDirectory {
    /// Directory seeded with the standard deployment rooms.
    fn default() -> Self {
        RoomDirectory {
            rooms: vec![
                Room { id: 1, name: "Bedroom".to_string() },
                Room { id: 2, name: "Living Room".to_string() },
                Room { id: 3, name: "Bathroom".to_string() },
            ],
        }
    }
}

impl RoomDirectory {
    /// An empty directory, for deployments that register rooms themselves.
    pub fn empty() -> Self {
        RoomDirectory { rooms: Vec::new() }
    }

    /// Register a room, returning its id. Re-registering an existing name
    /// (case-insensitive) returns the existing id instead of duplicating.
    pub fn add_room(&mut self, name: impl Into<String>) -> u32 {
        let name = name.into();
        if let Some(room) = self.by_name(&name) {
            return room.id;
        }
        let id = self.rooms.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        self.rooms.push(Room { id, name });
        id
    }

    /// Case-insensitive lookup by display name.
    pub fn by_name(&self, name: &str) -> Option<&Room> {
        self.rooms
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn by_id(&self, id: u32) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == id)
    }

    /// Infer a room id for a sensor device from its id prefix.
    ///
    /// The token before the first `_` is matched case-insensitively against
    /// known room names ("bedroom_ultrasonic_1" → Bedroom). Devices with no
    /// matching prefix land in the first known room.
    pub fn infer_for_device(&self, device_id: &str) -> u32 {
        let prefix = device_id.split('_').next().unwrap_or(device_id);
        self.by_name(prefix)
            .map(|r| r.id)
            .or_else(|| self.rooms.first().map(|r| r.id))
            .unwrap_or(1)
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }
}
