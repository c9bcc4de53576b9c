//! Mock tracking provider for testing and demos

use std::cell::Cell;

use crate::core::{Column, GeodeticPoint, LocalFrameId, LocalPosition, SurfaceId, SurfaceObservation};
use crate::tracking::{PoseProvider, SurfaceProvider, TrackingError, TrackingResult, UserPose};

/// In-memory tracking capability with scriptable pose and surfaces
pub struct MockTrackingProvider {
    pose: UserPose,
    surfaces: Vec<SurfaceObservation>,
    pose_available: bool,
    surfaces_available: bool,
    session_lost: bool,
    /// Horizontal reach of a downward probe around its column (meters)
    probe_reach_m: f64,
    probe_count: Cell<u32>,
    pose_count: Cell<u32>,
}

impl MockTrackingProvider {
    /// Create a provider with the user standing at the session origin
    pub fn new(geodetic: GeodeticPoint, camera_height_m: f64) -> Self {
        Self {
            pose: UserPose {
                geodetic,
                frame: LocalFrameId(1),
                camera: LocalPosition::new(0.0, camera_height_m, 0.0),
            },
            surfaces: Vec::new(),
            pose_available: true,
            surfaces_available: true,
            session_lost: false,
            probe_reach_m: 1.0,
            probe_count: Cell::new(0),
            pose_count: Cell::new(0),
        }
    }

    pub fn with_probe_reach(mut self, reach_m: f64) -> Self {
        self.probe_reach_m = reach_m;
        self
    }

    pub fn set_geodetic(&mut self, geodetic: GeodeticPoint) {
        self.pose.geodetic = geodetic;
    }

    pub fn set_camera(&mut self, camera: LocalPosition) {
        self.pose.camera = camera;
    }

    pub fn pose(&self) -> &UserPose {
        &self.pose
    }

    /// Simulate losing the session: pose queries fail until `restart_session`
    pub fn lose_session(&mut self) {
        self.session_lost = true;
    }

    /// Simulate a tracking restart: new frame, camera back at the origin
    pub fn restart_session(&mut self, frame: LocalFrameId) {
        self.session_lost = false;
        self.pose.frame = frame;
        self.pose.camera = LocalPosition::new(0.0, self.pose.camera.y, 0.0);
        self.surfaces.clear();
    }

    pub fn set_pose_available(&mut self, available: bool) {
        self.pose_available = available;
    }

    pub fn set_surfaces_available(&mut self, available: bool) {
        self.surfaces_available = available;
    }

    pub fn add_surface(&mut self, surface: SurfaceObservation) {
        self.surfaces.retain(|s| s.id != surface.id);
        self.surfaces.push(surface);
    }

    /// Re-estimate a surface's center, as tracking refinement does
    pub fn move_surface(&mut self, id: SurfaceId, center: LocalPosition) -> bool {
        match self.surfaces.iter_mut().find(|s| s.id == id) {
            Some(surface) => {
                surface.center = center;
                true
            }
            None => false,
        }
    }

    pub fn remove_surface(&mut self, id: SurfaceId) -> bool {
        let before = self.surfaces.len();
        self.surfaces.retain(|s| s.id != id);
        self.surfaces.len() != before
    }

    pub fn clear_surfaces(&mut self) {
        self.surfaces.clear();
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    /// Number of pose queries issued so far
    pub fn pose_count(&self) -> u32 {
        self.pose_count.get()
    }

    /// Number of downward probes issued so far
    pub fn probe_count(&self) -> u32 {
        self.probe_count.get()
    }

    fn check_surfaces(&self) -> TrackingResult<()> {
        if self.surfaces_available {
            Ok(())
        } else {
            Err(TrackingError::surfaces_unavailable("mock surfaces disabled"))
        }
    }
}

impl PoseProvider for MockTrackingProvider {
    fn current_user_pose(&self) -> TrackingResult<UserPose> {
        self.pose_count.set(self.pose_count.get() + 1);
        if self.session_lost {
            Err(TrackingError::SessionLost { frame: self.pose.frame })
        } else if self.pose_available {
            Ok(self.pose.clone())
        } else {
            Err(TrackingError::pose_unavailable("mock pose disabled"))
        }
    }
}

impl SurfaceProvider for MockTrackingProvider {
    fn surfaces_near(&self, column: Column, radius: f64) -> TrackingResult<Vec<SurfaceObservation>> {
        self.check_surfaces()?;
        Ok(self
            .surfaces
            .iter()
            .filter(|s| (s.center.x - column.x).hypot(s.center.z - column.z) <= radius)
            .cloned()
            .collect())
    }

    fn probe_downward(&self, column: Column) -> TrackingResult<Vec<SurfaceObservation>> {
        self.check_surfaces()?;
        self.probe_count.set(self.probe_count.get() + 1);
        Ok(self
            .surfaces
            .iter()
            .filter(|s| s.horizontal_gap_to(&column) <= self.probe_reach_m)
            .cloned()
            .collect())
    }
}
