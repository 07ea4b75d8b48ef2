//! Unified vigil.telemetry.v1 schema
//!
//! This module defines the typed input boundary of the engine: the closed set
//! of telemetry event variants and the adapter that parses raw broker
//! messages into them.

mod adapter;
mod telemetry;

pub use adapter::*;
pub use telemetry::*;
