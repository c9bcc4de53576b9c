//! Core data types for the anchoring engine

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in the tracking session's local frame (meters).
///
/// x = east, y = up, z = -north. Only meaningful inside the session that
/// produced it.
pub type LocalPosition = Vector3<f64>;

/// Opaque identity of a placed object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ObjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        ObjectId(id.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        ObjectId(id)
    }
}

/// Identity of one continuous tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalFrameId(pub u64);

/// Identity of a detected surface, stable across snapshots of the same session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

/// Geodetic position (WGS84 degrees, optional altitude in meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPoint {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: Option<f64>,
}

impl GeodeticPoint {
    pub fn new(latitude_deg: f64, longitude_deg: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            altitude_m: None,
        }
    }

    pub fn with_altitude(mut self, altitude_m: f64) -> Self {
        self.altitude_m = Some(altitude_m);
        self
    }
}

/// Confidence level of an object's placement, ordered from worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrecisionTier {
    /// Geodetic projection only (meter-level)
    Coarse,
    /// Cached local offset reused (centimeter-level horizontally)
    Cached,
    /// Cached offset resting on a detected surface
    Grounded,
    /// Stabilized and confirmed
    Locked,
}

/// Persisted binding between a geodetic origin and a captured local offset.
///
/// Replaced wholesale on re-capture; fields are never patched individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub object_id: ObjectId,
    pub origin_geodetic: GeodeticPoint,
    pub local_offset: LocalPosition,
    pub captured_at_ms: u64,
    pub precision_tier: PrecisionTier,
}

/// Orientation of a detected plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceOrientation {
    Horizontal,
    Vertical,
}

/// Plane-like detection supplied by the tracking pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceObservation {
    pub id: SurfaceId,
    pub center: LocalPosition,
    /// Full width along x (meters)
    pub extent_x_m: f64,
    /// Full depth along z (meters)
    pub extent_z_m: f64,
    pub orientation: SurfaceOrientation,
    /// Classifier confidence in [0, 1]
    pub classification_confidence: f64,
}

impl SurfaceObservation {
    pub fn horizontal(id: u64, center: LocalPosition, extent_x_m: f64, extent_z_m: f64) -> Self {
        Self {
            id: SurfaceId(id),
            center,
            extent_x_m,
            extent_z_m,
            orientation: SurfaceOrientation::Horizontal,
            classification_confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.classification_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_orientation(mut self, orientation: SurfaceOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn height(&self) -> f64 {
        self.center.y
    }

    pub fn area_m2(&self) -> f64 {
        self.extent_x_m.max(0.0) * self.extent_z_m.max(0.0)
    }

    /// Horizontal distance from a column to this surface's footprint (0 inside it)
    pub fn horizontal_gap_to(&self, column: &Column) -> f64 {
        let dx = ((column.x - self.center.x).abs() - self.extent_x_m.max(0.0) / 2.0).max(0.0);
        let dz = ((column.z - self.center.z).abs() - self.extent_z_m.max(0.0) / 2.0).max(0.0);
        dx.hypot(dz)
    }
}

/// Vertical column in the local frame, identified by its horizontal coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub x: f64,
    pub z: f64,
}

impl Column {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    pub fn of(position: &LocalPosition) -> Self {
        Self {
            x: position.x,
            z: position.z,
        }
    }

    pub fn offset(&self, dx: f64, dz: f64) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
        }
    }

    pub fn at_height(&self, y: f64) -> LocalPosition {
        LocalPosition::new(self.x, y, self.z)
    }
}

/// Object category, used for default resting heights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectCategory {
    /// Hand-held items, default close to eye height
    Small,
    Medium,
    /// Chests, crates and other floor-standing containers
    Container,
}

impl Default for ObjectCategory {
    fn default() -> Self {
        ObjectCategory::Small
    }
}
