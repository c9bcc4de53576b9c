//! Geo Anchoring
//!
//! Places persistent virtual objects at real-world locations inside a live
//! spatial-tracking session, reconciling meter-level geodetic coordinates with
//! centimeter-level session-local tracking.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod tracking;
pub mod api;

// Re-export commonly used types
pub use core::{
    AnchorRecord, Column, GeodeticPoint, LocalFrameId, LocalPosition, ObjectCategory, ObjectId, PrecisionTier,
    SurfaceId, SurfaceObservation, SurfaceOrientation, EARTH_RADIUS_M,
};
pub use algorithms::coordinates::{bearing_deg, distance_m, from_local, local_to_geodetic, to_local, to_local_vector};
pub use algorithms::{
    AnchorGroup, Constraint, CoordinateValidator, CorrectionReport, GeodeticReason, GroundingResult, GroundingSource,
    PlacementStrategy, PrecisionDecider, StabilizationGraph, SurfaceGroundingSearch, TangentOffset,
};
pub use processing::{CompassDirection, DiscoveryState, DiscoveryStateMachine, Guidance, LockConfidence, PositioningSession};
pub use tracking::{MockTrackingProvider, PoseProvider, SurfaceProvider, TrackingError, TrackingProvider, TrackingResult, UserPose};
pub use validation::{Diagnostic, DiagnosticReporter, DiagnosticSeverity};
pub use utils::{ConfigError, EngineConfig};
pub use api::{
    DiscoveryTrigger, EngineEvent, EngineStatus, Placement, PlacementRequest, SessionHandle, SharedEngine,
    SpatialAnchoringEngine,
};
