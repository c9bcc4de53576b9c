//! Core anchoring algorithms

pub mod coordinates;
pub mod grounding;
pub mod precision;
pub mod stabilization;

pub use coordinates::{CoordinateValidator, TangentOffset};
pub use grounding::{GroundingResult, GroundingSource, ProbeSelection, SurfaceGroundingSearch};
pub use precision::{GeodeticReason, PlacementStrategy, PrecisionCandidate, PrecisionDecider, PrecisionInputs};
pub use stabilization::{AnchorGroup, Constraint, CorrectionReport, StabilizationGraph};
