//! Tracking capability error types

use thiserror::Error;

use crate::core::LocalFrameId;

/// Errors reported by the external tracking capability
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// No pose estimate this tick
    #[error("pose unavailable: {reason}")]
    PoseUnavailable { reason: String },
    /// Surface detection has not produced a snapshot this tick
    #[error("surfaces unavailable: {reason}")]
    SurfacesUnavailable { reason: String },
    /// The tracking session ended and its local frame is gone
    #[error("tracking session {frame:?} lost")]
    SessionLost { frame: LocalFrameId },
}

/// Result type for tracking queries
pub type TrackingResult<T> = Result<T, TrackingError>;

impl TrackingError {
    pub fn pose_unavailable(reason: impl Into<String>) -> Self {
        TrackingError::PoseUnavailable { reason: reason.into() }
    }

    pub fn surfaces_unavailable(reason: impl Into<String>) -> Self {
        TrackingError::SurfacesUnavailable { reason: reason.into() }
    }

    /// Transient errors mean "try again next tick"
    pub fn is_transient(&self) -> bool {
        !matches!(self, TrackingError::SessionLost { .. })
    }
}
