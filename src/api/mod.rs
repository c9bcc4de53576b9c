//! Engine API
//!
//! This module exposes the anchoring engine, its request and event types, the
//! typed event bus and a thread-safe shared handle.

pub mod engine;
pub mod events;
pub mod shared;
pub mod types;

// Re-export commonly used API types
pub use engine::SpatialAnchoringEngine;
pub use events::EventBus;
pub use shared::SharedEngine;
pub use types::{
    DiscoveryTrigger, EngineEvent, EngineStatus, Placement, PlacementRequest, SessionHandle,
};
