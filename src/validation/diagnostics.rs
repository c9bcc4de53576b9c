use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tracing::{info, warn};

use crate::core::{LocalFrameId, ObjectCategory, ObjectId};

/// Which external input was missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    Pose,
    Surfaces,
}

/// Degraded-mode conditions reported by the engine.
///
/// None of these is a failure: each one describes a fallback the engine
/// already took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// Pose or surfaces not available this tick; last-known value or default used
    InputUnavailable { source: InputSource, detail: String },
    /// Cached record captured against a different session origin
    StaleCache { object_id: ObjectId, origin_offset_m: f64 },
    /// Cached offset too long to trust
    CachedOffsetTooLarge { object_id: ObjectId, offset_m: f64 },
    /// Target coordinate was not a valid geodetic point
    InvalidTarget { object_id: ObjectId, reason: String },
    /// Fewer than two anchoring surfaces; single-anchor mode used
    InsufficientSurfaces { object_id: ObjectId, found: usize },
    /// No surface found at all; category default height used
    DefaultHeightUsed { object_id: ObjectId, category: ObjectCategory },
    /// Local grounding hit its timeout and was forced to lock
    GroundingTimeout { object_id: ObjectId, waited_ms: u64, stable_samples: u32 },
    /// Tracking session changed; all local state was discarded
    SessionReset { previous: Option<LocalFrameId>, current: LocalFrameId },
    /// Event older than the last one processed for this object
    OutOfOrderEvent { object_id: ObjectId, event_ms: u64, last_ms: u64 },
    /// Discovery trigger for a tag nobody registered
    UnknownDiscoveryTag { tag_id: String },
    /// Discovery trigger delivered more than once
    DuplicateDiscoveryTrigger { tag_id: String },
}

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Info,
    Warning,
}

impl Diagnostic {
    /// Stable name of the diagnostic kind
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::InputUnavailable { .. } => "input_unavailable",
            Diagnostic::StaleCache { .. } => "stale_cache",
            Diagnostic::CachedOffsetTooLarge { .. } => "cached_offset_too_large",
            Diagnostic::InvalidTarget { .. } => "invalid_target",
            Diagnostic::InsufficientSurfaces { .. } => "insufficient_surfaces",
            Diagnostic::DefaultHeightUsed { .. } => "default_height_used",
            Diagnostic::GroundingTimeout { .. } => "grounding_timeout",
            Diagnostic::SessionReset { .. } => "session_reset",
            Diagnostic::OutOfOrderEvent { .. } => "out_of_order_event",
            Diagnostic::UnknownDiscoveryTag { .. } => "unknown_discovery_tag",
            Diagnostic::DuplicateDiscoveryTrigger { .. } => "duplicate_discovery_trigger",
        }
    }

    pub fn severity(&self) -> DiagnosticSeverity {
        match self {
            Diagnostic::InvalidTarget { .. }
            | Diagnostic::GroundingTimeout { .. }
            | Diagnostic::SessionReset { .. }
            | Diagnostic::UnknownDiscoveryTag { .. } => DiagnosticSeverity::Warning,
            _ => DiagnosticSeverity::Info,
        }
    }

    /// Object the diagnostic concerns, if any
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Diagnostic::StaleCache { object_id, .. }
            | Diagnostic::CachedOffsetTooLarge { object_id, .. }
            | Diagnostic::InvalidTarget { object_id, .. }
            | Diagnostic::InsufficientSurfaces { object_id, .. }
            | Diagnostic::DefaultHeightUsed { object_id, .. }
            | Diagnostic::GroundingTimeout { object_id, .. }
            | Diagnostic::OutOfOrderEvent { object_id, .. } => Some(object_id),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::InputUnavailable { source, detail } => {
                write!(f, "{:?} unavailable: {}", source, detail)
            }
            Diagnostic::StaleCache { object_id, origin_offset_m } => {
                write!(f, "Cached anchor for {} is {:.2} m from the live origin", object_id, origin_offset_m)
            }
            Diagnostic::CachedOffsetTooLarge { object_id, offset_m } => {
                write!(f, "Cached offset for {} is {:.1} m long", object_id, offset_m)
            }
            Diagnostic::InvalidTarget { object_id, reason } => {
                write!(f, "Invalid target for {}: {}", object_id, reason)
            }
            Diagnostic::InsufficientSurfaces { object_id, found } => {
                write!(f, "Only {} anchoring surface(s) near {}", found, object_id)
            }
            Diagnostic::DefaultHeightUsed { object_id, category } => {
                write!(f, "No surface under {}, using {:?} default height", object_id, category)
            }
            Diagnostic::GroundingTimeout { object_id, waited_ms, stable_samples } => {
                write!(
                    f,
                    "Grounding of {} timed out after {} ms with {} stable sample(s)",
                    object_id, waited_ms, stable_samples
                )
            }
            Diagnostic::SessionReset { previous, current } => {
                write!(f, "Tracking session reset from {:?} to {:?}", previous, current)
            }
            Diagnostic::OutOfOrderEvent { object_id, event_ms, last_ms } => {
                write!(f, "Ignored event for {} at {} ms (last processed {} ms)", object_id, event_ms, last_ms)
            }
            Diagnostic::UnknownDiscoveryTag { tag_id } => write!(f, "Unknown discovery tag '{}'", tag_id),
            Diagnostic::DuplicateDiscoveryTrigger { tag_id } => {
                write!(f, "Duplicate discovery trigger for tag '{}'", tag_id)
            }
        }
    }
}

/// Recorded diagnostic with its identity and time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub id: u64,
    pub timestamp_ms: u64,
    pub diagnostic: Diagnostic,
}

/// Bounded diagnostic history with per-kind counters
pub struct DiagnosticReporter {
    history: VecDeque<DiagnosticRecord>,
    counter: u64,
    max_history_size: usize,
    counts: HashMap<&'static str, u64>,
}

impl DiagnosticReporter {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            history: VecDeque::new(),
            counter: 0,
            max_history_size,
            counts: HashMap::new(),
        }
    }

    /// Log and record a diagnostic, returning its id
    pub fn report(&mut self, diagnostic: Diagnostic, timestamp_ms: u64) -> u64 {
        self.counter += 1;
        let id = self.counter;

        match diagnostic.severity() {
            DiagnosticSeverity::Warning => {
                warn!(kind = diagnostic.kind(), id, timestamp_ms, "{}", diagnostic)
            }
            DiagnosticSeverity::Info => {
                info!(kind = diagnostic.kind(), id, timestamp_ms, "{}", diagnostic)
            }
        }

        *self.counts.entry(diagnostic.kind()).or_insert(0) += 1;

        if self.max_history_size > 0 {
            self.history.push_back(DiagnosticRecord {
                id,
                timestamp_ms,
                diagnostic,
            });
            while self.history.len() > self.max_history_size {
                self.history.pop_front();
            }
        }

        id
    }

    /// Most recent diagnostics, newest first
    pub fn recent(&self, count: usize) -> Vec<&DiagnosticRecord> {
        self.history.iter().rev().take(count).collect()
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.counts.get(kind).copied().unwrap_or(0)
    }

    /// Total diagnostics ever reported, including ones evicted from history
    pub fn total(&self) -> u64 {
        self.counter
    }

    pub fn set_max_history_size(&mut self, max_history_size: usize) {
        self.max_history_size = max_history_size;
        while self.history.len() > self.max_history_size {
            self.history.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.counts.clear();
    }
}

impl Default for DiagnosticReporter {
    fn default() -> Self {
        Self::new(256)
    }
}
