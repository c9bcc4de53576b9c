//! Request, result and event types of the engine API

use serde::{Deserialize, Serialize};

use crate::algorithms::{GeodeticReason, GroundingResult, PlacementStrategy};
use crate::core::{AnchorRecord, GeodeticPoint, LocalFrameId, LocalPosition, ObjectCategory, ObjectId, PrecisionTier};
use crate::processing::{DiscoveryState, Guidance, LockConfidence};
use crate::validation::DiagnosticRecord;

/// Placement request for one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub object_id: ObjectId,
    pub target: GeodeticPoint,
    pub category: ObjectCategory,
    /// Record to try before the engine's own captured record
    pub cached: Option<AnchorRecord>,
    pub now_ms: u64,
}

impl PlacementRequest {
    pub fn new(object_id: impl Into<ObjectId>, target: GeodeticPoint) -> Self {
        Self {
            object_id: object_id.into(),
            target,
            category: ObjectCategory::default(),
            cached: None,
            now_ms: 0,
        }
    }

    pub fn with_category(mut self, category: ObjectCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_cached(mut self, record: AnchorRecord) -> Self {
        self.cached = Some(record);
        self
    }

    pub fn at(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }
}

/// Grounded local position with the decisions that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub object_id: ObjectId,
    pub position: LocalPosition,
    pub tier: PrecisionTier,
    pub strategy: PlacementStrategy,
    pub reason: Option<GeodeticReason>,
    pub grounding: GroundingResult,
    /// Session the position belongs to; `None` before any pose arrived
    pub frame: Option<LocalFrameId>,
    pub placed_at_ms: u64,
}

/// Handle returned when discovery begins
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle {
    pub object_id: ObjectId,
    pub started_at_ms: u64,
}

/// External discovery trigger, such as a scanned visual tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryTrigger {
    pub tag_id: String,
    /// Object position observed in the local frame, if the trigger carries one
    pub observed_position: Option<LocalPosition>,
    /// Confidence in [0, 1] of the observed position
    pub confidence: f64,
}

impl DiscoveryTrigger {
    pub fn new(tag_id: impl Into<String>) -> Self {
        Self {
            tag_id: tag_id.into(),
            observed_position: None,
            confidence: 0.0,
        }
    }

    pub fn with_observation(mut self, position: LocalPosition, confidence: f64) -> Self {
        self.observed_position = Some(position);
        self.confidence = confidence;
        self
    }
}

/// Events published by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    GuidanceUpdate {
        object_id: ObjectId,
        guidance: Guidance,
        at_ms: u64,
    },
    StateChanged {
        object_id: ObjectId,
        from: DiscoveryState,
        to: DiscoveryState,
        at_ms: u64,
    },
    PrecisionAchieved {
        object_id: ObjectId,
        position: LocalPosition,
        confidence: LockConfidence,
        accuracy_m: f64,
        at_ms: u64,
    },
    AnchorCaptured {
        record: AnchorRecord,
    },
    CorrectionApplied {
        object_id: ObjectId,
        drift_m: f64,
        correction_m: f64,
        center: LocalPosition,
        at_ms: u64,
    },
    Diagnostic(DiagnosticRecord),
}

impl EngineEvent {
    /// Object the event concerns, if any
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            EngineEvent::GuidanceUpdate { object_id, .. }
            | EngineEvent::StateChanged { object_id, .. }
            | EngineEvent::PrecisionAchieved { object_id, .. }
            | EngineEvent::CorrectionApplied { object_id, .. } => Some(object_id),
            EngineEvent::AnchorCaptured { record } => Some(&record.object_id),
            EngineEvent::Diagnostic(record) => record.diagnostic.object_id(),
        }
    }
}

/// Snapshot of engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub frame: Option<LocalFrameId>,
    pub session_origin: Option<GeodeticPoint>,
    pub placed_objects: usize,
    pub anchor_groups: usize,
    pub anchor_records: usize,
    pub coarse_sessions: usize,
    pub proximity_sessions: usize,
    pub grounding_sessions: usize,
    pub locked_sessions: usize,
    pub diagnostics_total: u64,
    pub subscribers: usize,
    pub last_tick_ms: u64,
}
