//! Abstraction over the external spatial-tracking capability
//!
//! The engine never produces pose or surface data. It pulls synchronous
//! snapshots through these traits once per operation.

pub mod error;
pub mod mock;
pub mod provider;

pub use error::{TrackingError, TrackingResult};
pub use mock::MockTrackingProvider;
pub use provider::{PoseProvider, SurfaceProvider, TrackingProvider, UserPose};
