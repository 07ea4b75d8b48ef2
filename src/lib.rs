//! Vigil Fusion - telemetry fusion engine for indoor presence and emergency tracking
//!
//! Vigil Fusion turns asynchronous telemetry from fixed sensing nodes
//! (ultrasonic movement detectors, BLE signal-strength reporting nodes) into
//! one consistent answer to two questions: where is each tracked beacon right
//! now, and is anyone currently in an emergency state?
//!
//! ## Modules
//!
//! - **Schema**: typed telemetry events and the broker-topic adapter
//! - **Resolver**: alias → canonical entity key resolution
//! - **Fusion**: strongest-signal room assignment across reporting nodes
//! - **Movement**: per-sensor no-movement anomaly lifecycle
//! - **Emergency**: per-entity flags with an edge-triggered global aggregate
//! - **Engine**: the serializing dispatcher tying it all together
//!
//! The crate is transport-agnostic: broker subscription and observer fan-out
//! live outside; the engine consumes typed events and returns typed output
//! events.

pub mod emergency;
pub mod engine;
pub mod error;
pub mod events;
pub mod fusion;
pub mod movement;
pub mod resolver;
pub mod rooms;
pub mod schema;
pub mod types;

pub use engine::TelemetryEngine;
pub use error::EngineError;
pub use events::OutputEvent;

// Schema exports
pub use schema::{TelemetryEvent, TopicAdapter, SCHEMA_VERSION};

/// Engine version embedded in snapshots
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for snapshots and diagnostics
pub const PRODUCER_NAME: &str = "vigil-fusion";
