//! Tiered placement decision
//!
//! Chooses between reusing a cached local offset and projecting the geodetic
//! target into the live session. The checks run in a fixed order and the
//! first failing one decides.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::algorithms::coordinates::{distance_m, to_local_vector};
use crate::core::{AnchorRecord, GeodeticPoint, LocalPosition};
use crate::utils::PrecisionConfig;

/// Source of a candidate position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementStrategy {
    /// Projected from the geodetic target
    Geodetic,
    /// Reused from an anchor record's local offset
    Cached,
}

/// Why the geodetic strategy was chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GeodeticReason {
    NoCachedRecord,
    OutOfProximity { distance_m: f64 },
    OriginMismatch { origin_offset_m: f64 },
    OffsetTooLarge { offset_m: f64 },
}

impl fmt::Display for GeodeticReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeodeticReason::NoCachedRecord => write!(f, "no cached record"),
            GeodeticReason::OutOfProximity { distance_m } => {
                write!(f, "user {:.1} m from object", distance_m)
            }
            GeodeticReason::OriginMismatch { origin_offset_m } => {
                write!(f, "record origin {:.2} m from session origin", origin_offset_m)
            }
            GeodeticReason::OffsetTooLarge { offset_m } => {
                write!(f, "cached offset {:.1} m too long", offset_m)
            }
        }
    }
}

/// Candidate local position before grounding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionCandidate {
    pub position: LocalPosition,
    pub strategy: PlacementStrategy,
    /// Set whenever the strategy is geodetic
    pub reason: Option<GeodeticReason>,
}

/// Live inputs to a placement decision
#[derive(Debug, Clone, Copy)]
pub struct PrecisionInputs<'a> {
    pub target: &'a GeodeticPoint,
    pub cached: Option<&'a AnchorRecord>,
    pub user: &'a GeodeticPoint,
    /// Geodetic position of the live session's local origin
    pub session_origin: &'a GeodeticPoint,
}

/// Ordered fallback chain between cached and geodetic placement
#[derive(Debug, Clone)]
pub struct PrecisionDecider {
    config: PrecisionConfig,
}

impl PrecisionDecider {
    pub fn new(config: PrecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PrecisionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PrecisionConfig) {
        self.config = config;
    }

    /// Run the chain and produce a candidate. Never fails.
    pub fn decide(&self, inputs: PrecisionInputs<'_>) -> PrecisionCandidate {
        match self.check_cache(&inputs) {
            Ok(record) => {
                debug!(object = %record.object_id, "Reusing cached local offset");
                PrecisionCandidate {
                    position: record.local_offset,
                    strategy: PlacementStrategy::Cached,
                    reason: None,
                }
            }
            Err(reason) => {
                debug!(%reason, "Falling back to geodetic projection");
                PrecisionCandidate {
                    position: to_local_vector(inputs.session_origin, inputs.target),
                    strategy: PlacementStrategy::Geodetic,
                    reason: Some(reason),
                }
            }
        }
    }

    /// Steps 1-4 of the chain: the cached record if it survives every check
    pub fn check_cache<'a>(&self, inputs: &PrecisionInputs<'a>) -> Result<&'a AnchorRecord, GeodeticReason> {
        let record = inputs.cached.ok_or(GeodeticReason::NoCachedRecord)?;
        self.check_proximity(inputs.user, inputs.target)?;
        self.check_origin(record, inputs.session_origin)?;
        self.check_offset(record)?;
        Ok(record)
    }

    /// Origin offset of a cached record captured in a different session
    pub fn stale_origin_offset(&self, inputs: &PrecisionInputs<'_>) -> Option<f64> {
        let record = inputs.cached?;
        match self.check_origin(record, inputs.session_origin) {
            Err(GeodeticReason::OriginMismatch { origin_offset_m }) => Some(origin_offset_m),
            _ => None,
        }
    }

    pub fn check_proximity(&self, user: &GeodeticPoint, target: &GeodeticPoint) -> Result<(), GeodeticReason> {
        let distance = distance_m(user, target);
        if distance > self.config.cached_proximity_m {
            Err(GeodeticReason::OutOfProximity { distance_m: distance })
        } else {
            Ok(())
        }
    }

    pub fn check_origin(&self, record: &AnchorRecord, session_origin: &GeodeticPoint) -> Result<(), GeodeticReason> {
        let offset = distance_m(&record.origin_geodetic, session_origin);
        if offset >= self.config.origin_match_threshold_m {
            Err(GeodeticReason::OriginMismatch { origin_offset_m: offset })
        } else {
            Ok(())
        }
    }

    pub fn check_offset(&self, record: &AnchorRecord) -> Result<(), GeodeticReason> {
        let length = record.local_offset.norm();
        if !length.is_finite() || length > self.config.max_cached_offset_m {
            Err(GeodeticReason::OffsetTooLarge { offset_m: length })
        } else {
            Ok(())
        }
    }
}
