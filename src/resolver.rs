//! Entity identity resolution
//!
//! Reporting nodes identify the same beacon inconsistently: some messages
//! carry only a broadcast name ("M5_Bedroom"), some a stable unique id, some
//! nothing but a topic-derived room token. The registry maps every observed
//! identifier (alias) to exactly one canonical entity key, so the rest of the
//! engine only ever sees canonical keys. Lookups and inserts are explicit;
//! nothing is auto-vivified as a side effect of reading.

use crate::types::TrackedEntity;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Registry of tracked entities and the alias map over them.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    /// Canonical key → entity record.
    entities: HashMap<String, TrackedEntity>,
    /// Any observed identifier → canonical key. Every canonical key is also
    /// registered as an alias of itself.
    aliases: HashMap<String, String>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the canonical key for an identifier without creating anything.
    pub fn lookup(&self, identifier: &str) -> Option<&str> {
        self.aliases.get(identifier).map(String::as_str)
    }

    /// Resolve an identifier to its canonical key, creating a fresh entity
    /// when the identifier has never been seen.
    pub fn resolve(&mut self, identifier: &str, now: DateTime<Utc>) -> String {
        if let Some(key) = self.aliases.get(identifier) {
            return key.clone();
        }
        self.create(identifier, now);
        identifier.to_string()
    }

    /// Resolve a status message carrying both a unique id and a broadcast
    /// name. The unique id wins as canonical key; an entity previously known
    /// only by its name is reused and the unique id bound to it, so no data
    /// is duplicated or lost.
    pub fn resolve_status(&mut self, uuid: &str, device_name: &str, now: DateTime<Utc>) -> String {
        if let Some(key) = self.aliases.get(uuid).cloned() {
            self.bind_alias(&key, device_name);
            return key;
        }
        if let Some(key) = self.aliases.get(device_name).cloned() {
            debug!(uuid, device_name, key = %key, "binding unique id to entity known by name");
            self.bind_alias(&key, uuid);
            return key;
        }
        self.create(uuid, now);
        self.bind_alias(uuid, device_name);
        uuid.to_string()
    }

    /// Register `alias` as another identifier of the entity `identifier`
    /// resolves to. Returns false when the alias is already bound to a
    /// different entity; two canonical keys are never merged after the fact.
    pub fn bind_alias(&mut self, identifier: &str, alias: &str) -> bool {
        let Some(key) = self.aliases.get(identifier).cloned() else {
            return false;
        };
        match self.aliases.get(alias) {
            Some(existing) if *existing == key => true,
            Some(existing) => {
                debug!(
                    alias,
                    bound_to = %existing,
                    requested = %key,
                    "alias already bound to a different entity, keeping first binding"
                );
                false
            }
            None => {
                self.aliases.insert(alias.to_string(), key.clone());
                if let Some(entity) = self.entities.get_mut(&key) {
                    entity.aliases.push(alias.to_string());
                }
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&TrackedEntity> {
        self.entities.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut TrackedEntity> {
        self.entities.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn create(&mut self, key: &str, now: DateTime<Utc>) {
        debug!(key, "creating tracked entity");
        self.aliases.insert(key.to_string(), key.to_string());
        self.entities
            .insert(key.to_string(), TrackedEntity::new(key, now));
    }
}
