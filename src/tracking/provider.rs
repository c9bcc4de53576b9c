//! Collaborator traits for the external tracking capability

use crate::core::{Column, GeodeticPoint, LocalFrameId, LocalPosition, SurfaceObservation};
use crate::tracking::TrackingResult;

/// Snapshot of the user's pose in both position sources
#[derive(Debug, Clone, PartialEq)]
pub struct UserPose {
    /// Latest location fix
    pub geodetic: GeodeticPoint,
    /// Session the local data belongs to
    pub frame: LocalFrameId,
    /// Camera position in the session frame
    pub camera: LocalPosition,
}

/// Supplies the current user pose
pub trait PoseProvider {
    fn current_user_pose(&self) -> TrackingResult<UserPose>;
}

/// Supplies read-only surface snapshots
pub trait SurfaceProvider {
    /// Surfaces whose centers lie within `radius` of the column
    fn surfaces_near(&self, column: Column, radius: f64) -> TrackingResult<Vec<SurfaceObservation>>;

    /// Surfaces hit by a downward probe through the column, in hit order (not sorted)
    fn probe_downward(&self, column: Column) -> TrackingResult<Vec<SurfaceObservation>>;
}

/// Full tracking capability consumed by the engine
pub trait TrackingProvider: PoseProvider + SurfaceProvider {}

impl<T: PoseProvider + SurfaceProvider> TrackingProvider for T {}
