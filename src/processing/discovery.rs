//! Discovery state machine
//!
//! Drives each object from coarse geodetic guidance to a locked local
//! placement. The machine only decides transitions. The engine performs
//! placement, stabilization and event delivery for the outputs it returns.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::core::{AnchorRecord, GeodeticPoint, ObjectCategory, ObjectId, PrecisionTier};
use crate::processing::guidance::Guidance;
use crate::processing::timer::PeriodicTimer;
use crate::utils::DiscoveryConfig;

/// Discovery states, in the only order they may be entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiscoveryState {
    CoarseGuidance,
    ProximityDiscovery,
    LocalGrounding,
    LockedIn,
}

impl DiscoveryState {
    /// Precision tier reported while in this state
    pub fn tier(&self) -> PrecisionTier {
        match self {
            DiscoveryState::CoarseGuidance => PrecisionTier::Coarse,
            DiscoveryState::ProximityDiscovery => PrecisionTier::Cached,
            DiscoveryState::LocalGrounding => PrecisionTier::Grounded,
            DiscoveryState::LockedIn => PrecisionTier::Locked,
        }
    }

    pub fn next(&self) -> Option<DiscoveryState> {
        match self {
            DiscoveryState::CoarseGuidance => Some(DiscoveryState::ProximityDiscovery),
            DiscoveryState::ProximityDiscovery => Some(DiscoveryState::LocalGrounding),
            DiscoveryState::LocalGrounding => Some(DiscoveryState::LockedIn),
            DiscoveryState::LockedIn => None,
        }
    }
}

/// How a lock was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockConfidence {
    /// High-confidence observation in the same step
    High,
    /// Enough consecutive stable monitoring samples
    Stable,
    /// Forced by the grounding timeout
    Reduced,
}

impl LockConfidence {
    /// Estimated accuracy of the locked position (meters)
    pub fn accuracy_m(&self, config: &DiscoveryConfig) -> f64 {
        match self {
            LockConfidence::High => config.accuracy_high_m,
            LockConfidence::Stable => config.accuracy_stable_m,
            LockConfidence::Reduced => config.accuracy_reduced_m,
        }
    }
}

/// Per-object discovery progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositioningSession {
    pub object_id: ObjectId,
    pub state: DiscoveryState,
    pub state_entered_at_ms: u64,
    pub started_at_ms: u64,
    pub last_event_ms: u64,
    pub last_guidance: Option<Guidance>,
    pub target: GeodeticPoint,
    pub category: ObjectCategory,
    pub cached: Option<AnchorRecord>,
    pub stable_samples: u32,
    pub lock: Option<LockConfidence>,
    fired_tags: HashSet<String>,
    guidance_timer: PeriodicTimer,
    last_distance_m: f64,
    last_bearing_deg: f64,
}

impl PositioningSession {
    fn new(
        object_id: ObjectId,
        target: GeodeticPoint,
        category: ObjectCategory,
        cached: Option<AnchorRecord>,
        now_ms: u64,
        guidance_interval_ms: u64,
    ) -> Self {
        Self {
            object_id,
            state: DiscoveryState::CoarseGuidance,
            state_entered_at_ms: now_ms,
            started_at_ms: now_ms,
            last_event_ms: now_ms,
            last_guidance: None,
            target,
            category,
            cached,
            stable_samples: 0,
            lock: None,
            fired_tags: HashSet::new(),
            guidance_timer: PeriodicTimer::new(guidance_interval_ms),
            last_distance_m: f64::INFINITY,
            last_bearing_deg: 0.0,
        }
    }

    /// Milliseconds spent in the current state
    pub fn time_in_state(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.state_entered_at_ms)
    }

    fn guidance(&self) -> Guidance {
        Guidance::new(self.state, self.last_distance_m, self.last_bearing_deg)
    }

    fn enter(&mut self, to: DiscoveryState, now_ms: u64, lock: Option<LockConfidence>) -> Transition {
        let from = self.state;
        self.state = to;
        self.state_entered_at_ms = now_ms;
        self.lock = lock;
        if to != DiscoveryState::LocalGrounding {
            self.stable_samples = 0;
        }
        let guidance = self.guidance();
        self.last_guidance = Some(guidance.clone());

        info!(object = %self.object_id, ?from, ?to, at_ms = now_ms, "Discovery transition");

        Transition {
            object_id: self.object_id.clone(),
            from,
            to,
            at_ms: now_ms,
            guidance,
            lock,
        }
    }

    /// Advance one state at a time up to `to`
    fn advance_to(&mut self, to: DiscoveryState, now_ms: u64, lock: Option<LockConfidence>, out: &mut Vec<DiscoveryOutput>) {
        while self.state < to {
            let Some(next) = self.state.next() else { break };
            let lock = if next == DiscoveryState::LockedIn { lock } else { None };
            out.push(DiscoveryOutput::Transition(self.enter(next, now_ms, lock)));
        }
    }
}

/// One state change, carrying the guidance emitted with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub object_id: ObjectId,
    pub from: DiscoveryState,
    pub to: DiscoveryState,
    pub at_ms: u64,
    pub guidance: Guidance,
    pub lock: Option<LockConfidence>,
}

/// Everything the machine asks the engine to act on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscoveryOutput {
    /// Periodic coarse guidance without a state change
    Guidance { object_id: ObjectId, guidance: Guidance },
    Transition(Transition),
    /// Grounding took too long; a forced lock follows
    TimedOut { object_id: ObjectId, waited_ms: u64, stable_samples: u32 },
    /// Event older than the session's last processed one, ignored
    OutOfOrder { object_id: ObjectId, event_ms: u64, last_ms: u64 },
    /// Trigger for a tag that already fired in this session, ignored
    DuplicateTrigger { object_id: ObjectId, tag_id: String },
    /// Locked session retired after its retention period
    Expired { object_id: ObjectId },
}

/// Discovery sessions for every object being searched for
#[derive(Debug)]
pub struct DiscoveryStateMachine {
    config: DiscoveryConfig,
    sessions: HashMap<ObjectId, PositioningSession>,
}

impl DiscoveryStateMachine {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DiscoveryConfig) {
        for session in self.sessions.values_mut() {
            session.guidance_timer.set_interval_ms(config.guidance_interval_ms);
        }
        self.config = config;
    }

    /// Start (or restart) discovery for an object in CoarseGuidance
    pub fn begin(
        &mut self,
        object_id: ObjectId,
        target: GeodeticPoint,
        category: ObjectCategory,
        cached: Option<AnchorRecord>,
        now_ms: u64,
    ) -> &PositioningSession {
        let session = PositioningSession::new(
            object_id.clone(),
            target,
            category,
            cached,
            now_ms,
            self.config.guidance_interval_ms,
        );
        if self.sessions.insert(object_id.clone(), session).is_some() {
            debug!(object = %object_id, "Restarting discovery");
        }
        &self.sessions[&object_id]
    }

    pub fn session(&self, object_id: &ObjectId) -> Option<&PositioningSession> {
        self.sessions.get(object_id)
    }

    pub fn state(&self, object_id: &ObjectId) -> Option<DiscoveryState> {
        self.sessions.get(object_id).map(|s| s.state)
    }

    /// Sessions in deterministic order
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn count_in_state(&self, state: DiscoveryState) -> usize {
        self.sessions.values().filter(|s| s.state == state).count()
    }

    /// Stop discovery from any state
    pub fn remove(&mut self, object_id: &ObjectId) -> bool {
        self.sessions.remove(object_id).is_some()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Fresh distance/bearing from the user. Guidance is emitted on the
    /// guidance interval, and the proximity check runs with it.
    pub fn update_guidance(
        &mut self,
        object_id: &ObjectId,
        distance_m: f64,
        bearing_deg: f64,
        now_ms: u64,
    ) -> Vec<DiscoveryOutput> {
        let mut out = Vec::new();
        let proximity = self.config.proximity_threshold_m;
        let Some(session) = self.accept(object_id, now_ms, &mut out) else {
            return out;
        };

        session.last_distance_m = distance_m;
        session.last_bearing_deg = bearing_deg;

        if session.state != DiscoveryState::CoarseGuidance || !session.guidance_timer.poll(now_ms) {
            return out;
        }

        if distance_m < proximity {
            session.advance_to(DiscoveryState::LocalGrounding, now_ms, None, &mut out);
        } else {
            let guidance = session.guidance();
            session.last_guidance = Some(guidance.clone());
            out.push(DiscoveryOutput::Guidance {
                object_id: object_id.clone(),
                guidance,
            });
        }
        out
    }

    /// External discovery trigger. A high-confidence trigger locks in the same step.
    pub fn trigger(&mut self, object_id: &ObjectId, tag_id: &str, high_confidence: bool, now_ms: u64) -> Vec<DiscoveryOutput> {
        let mut out = Vec::new();
        let Some(session) = self.accept(object_id, now_ms, &mut out) else {
            return out;
        };

        if !session.fired_tags.insert(tag_id.to_string()) {
            out.push(DiscoveryOutput::DuplicateTrigger {
                object_id: object_id.clone(),
                tag_id: tag_id.to_string(),
            });
            return out;
        }

        if session.state == DiscoveryState::LockedIn {
            return out;
        }

        session.advance_to(DiscoveryState::LocalGrounding, now_ms, None, &mut out);
        if high_confidence {
            session.advance_to(DiscoveryState::LockedIn, now_ms, Some(LockConfidence::High), &mut out);
        }
        out
    }

    /// One stabilization monitoring sample for an object in LocalGrounding
    pub fn record_sample(&mut self, object_id: &ObjectId, stable: bool, now_ms: u64) -> Vec<DiscoveryOutput> {
        let mut out = Vec::new();
        let required = self.config.required_stable_samples;
        let Some(session) = self.accept(object_id, now_ms, &mut out) else {
            return out;
        };
        if session.state != DiscoveryState::LocalGrounding {
            return out;
        }

        session.stable_samples = if stable { session.stable_samples + 1 } else { 0 };
        if session.stable_samples >= required {
            session.advance_to(DiscoveryState::LockedIn, now_ms, Some(LockConfidence::Stable), &mut out);
        }
        out
    }

    /// Grounding timeouts and lock expiry
    pub fn check_timeouts(&mut self, now_ms: u64) -> Vec<DiscoveryOutput> {
        let mut out = Vec::new();
        let mut expired = Vec::new();

        for object_id in self.object_ids() {
            let timeout = self.config.grounding_timeout_ms;
            let retention = self.config.lock_retention_ms;
            let Some(session) = self.accept(&object_id, now_ms, &mut out) else {
                continue;
            };

            match session.state {
                DiscoveryState::LocalGrounding if session.time_in_state(now_ms) >= timeout => {
                    out.push(DiscoveryOutput::TimedOut {
                        object_id: object_id.clone(),
                        waited_ms: session.time_in_state(now_ms),
                        stable_samples: session.stable_samples,
                    });
                    session.advance_to(DiscoveryState::LockedIn, now_ms, Some(LockConfidence::Reduced), &mut out);
                }
                DiscoveryState::LockedIn if session.time_in_state(now_ms) >= retention => {
                    expired.push(object_id);
                }
                _ => {}
            }
        }

        for object_id in expired {
            self.sessions.remove(&object_id);
            debug!(object = %object_id, "Locked session expired");
            out.push(DiscoveryOutput::Expired { object_id });
        }
        out
    }

    /// Full reset of every session back to CoarseGuidance
    pub fn reset_all(&mut self, now_ms: u64) -> Vec<DiscoveryOutput> {
        let mut out = Vec::new();
        for object_id in self.object_ids() {
            let Some(session) = self.sessions.get_mut(&object_id) else {
                continue;
            };
            session.last_event_ms = session.last_event_ms.max(now_ms);
            session.fired_tags.clear();
            session.guidance_timer.reset();
            session.cached = None;
            if session.state != DiscoveryState::CoarseGuidance {
                out.push(DiscoveryOutput::Transition(session.enter(DiscoveryState::CoarseGuidance, now_ms, None)));
            }
        }
        out
    }

    /// Enforce timestamp ordering for one session
    fn accept(&mut self, object_id: &ObjectId, now_ms: u64, out: &mut Vec<DiscoveryOutput>) -> Option<&mut PositioningSession> {
        let session = self.sessions.get_mut(object_id)?;
        if now_ms < session.last_event_ms {
            debug!(object = %object_id, event_ms = now_ms, last_ms = session.last_event_ms, "Ignoring out-of-order event");
            out.push(DiscoveryOutput::OutOfOrder {
                object_id: object_id.clone(),
                event_ms: now_ms,
                last_ms: session.last_event_ms,
            });
            return None;
        }
        session.last_event_ms = now_ms;
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> DiscoveryStateMachine {
        DiscoveryStateMachine::new(DiscoveryConfig::default())
    }

    fn begin(m: &mut DiscoveryStateMachine, now_ms: u64) -> ObjectId {
        let id = ObjectId::new("chest");
        m.begin(id.clone(), GeodeticPoint::new(37.0001, -122.0), ObjectCategory::Container, None, now_ms);
        id
    }

    fn transitions(out: &[DiscoveryOutput]) -> Vec<(DiscoveryState, DiscoveryState)> {
        out.iter()
            .filter_map(|o| match o {
                DiscoveryOutput::Transition(t) => Some((t.from, t.to)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_guidance_on_interval() {
        let mut m = machine();
        let id = begin(&mut m, 0);

        let first = m.update_guidance(&id, 50.0, 10.0, 0);
        assert!(matches!(first.as_slice(), [DiscoveryOutput::Guidance { .. }]));
        assert!(m.update_guidance(&id, 45.0, 10.0, 1500).is_empty());
        assert_eq!(m.update_guidance(&id, 40.0, 10.0, 2000).len(), 1);
        assert_eq!(m.session(&id).unwrap().last_guidance.as_ref().unwrap().distance_m, 40.0);
    }

    #[test]
    fn test_proximity_passes_through_every_state() {
        let mut m = machine();
        let id = begin(&mut m, 0);

        let out = m.update_guidance(&id, 9.5, 0.0, 0);
        assert_eq!(
            transitions(&out),
            vec![
                (DiscoveryState::CoarseGuidance, DiscoveryState::ProximityDiscovery),
                (DiscoveryState::ProximityDiscovery, DiscoveryState::LocalGrounding),
            ]
        );
        assert_eq!(m.state(&id), Some(DiscoveryState::LocalGrounding));
    }

    #[test]
    fn test_tiers_strictly_increase() {
        let mut m = machine();
        let id = begin(&mut m, 0);
        let out = m.trigger(&id, "tag-1", true, 100);

        let tiers: Vec<PrecisionTier> = out
            .iter()
            .filter_map(|o| match o {
                DiscoveryOutput::Transition(t) => Some(t.guidance.tier),
                _ => None,
            })
            .collect();
        assert_eq!(tiers, vec![PrecisionTier::Cached, PrecisionTier::Grounded, PrecisionTier::Locked]);
        assert_eq!(m.session(&id).unwrap().lock, Some(LockConfidence::High));
    }

    #[test]
    fn test_stable_samples_lock() {
        let mut m = machine();
        let id = begin(&mut m, 0);
        m.trigger(&id, "tag-1", false, 0);

        assert!(m.record_sample(&id, true, 1000).is_empty());
        assert!(m.record_sample(&id, false, 2000).is_empty());
        assert!(m.record_sample(&id, true, 3000).is_empty());
        assert!(m.record_sample(&id, true, 4000).is_empty());
        let out = m.record_sample(&id, true, 5000);

        assert_eq!(transitions(&out), vec![(DiscoveryState::LocalGrounding, DiscoveryState::LockedIn)]);
        assert_eq!(m.session(&id).unwrap().lock, Some(LockConfidence::Stable));
    }

    #[test]
    fn test_grounding_timeout_forces_reduced_lock() {
        let mut m = machine();
        let id = begin(&mut m, 0);
        m.update_guidance(&id, 5.0, 0.0, 1000);

        assert!(m.check_timeouts(10_999).is_empty());
        let out = m.check_timeouts(11_000);
        assert!(matches!(out[0], DiscoveryOutput::TimedOut { waited_ms: 10_000, .. }));
        assert_eq!(transitions(&out), vec![(DiscoveryState::LocalGrounding, DiscoveryState::LockedIn)]);
        assert_eq!(m.session(&id).unwrap().lock, Some(LockConfidence::Reduced));
    }

    #[test]
    fn test_out_of_order_events_ignored() {
        let mut m = machine();
        let id = begin(&mut m, 5000);

        let out = m.trigger(&id, "tag-1", true, 4000);
        assert!(matches!(out.as_slice(), [DiscoveryOutput::OutOfOrder { event_ms: 4000, last_ms: 5000, .. }]));
        assert_eq!(m.state(&id), Some(DiscoveryState::CoarseGuidance));
    }

    #[test]
    fn test_duplicate_trigger_ignored() {
        let mut m = machine();
        let id = begin(&mut m, 0);
        m.trigger(&id, "tag-1", false, 10);

        let out = m.trigger(&id, "tag-1", true, 20);
        assert!(matches!(out.as_slice(), [DiscoveryOutput::DuplicateTrigger { .. }]));
        assert_eq!(m.state(&id), Some(DiscoveryState::LocalGrounding));
    }

    #[test]
    fn test_lock_expiry_removes_session() {
        let mut m = machine();
        let id = begin(&mut m, 0);
        m.trigger(&id, "tag-1", true, 0);

        assert!(m.check_timeouts(59_999).is_empty());
        let out = m.check_timeouts(60_000);
        assert!(matches!(out.as_slice(), [DiscoveryOutput::Expired { .. }]));
        assert!(m.session(&id).is_none());
    }

    #[test]
    fn test_reset_returns_to_coarse() {
        let mut m = machine();
        let id = begin(&mut m, 0);
        m.trigger(&id, "tag-1", false, 0);

        let out = m.reset_all(500);
        assert_eq!(transitions(&out), vec![(DiscoveryState::LocalGrounding, DiscoveryState::CoarseGuidance)]);
        assert_eq!(m.session(&id).unwrap().stable_samples, 0);

        // the tag may fire again in the new session
        let out = m.trigger(&id, "tag-1", false, 600);
        assert_eq!(transitions(&out).len(), 2);
    }

    #[test]
    fn test_remove_from_any_state() {
        let mut m = machine();
        let id = begin(&mut m, 0);
        m.trigger(&id, "tag-1", false, 0);
        assert!(m.remove(&id));
        assert!(m.record_sample(&id, true, 10).is_empty());
        assert!(m.is_empty());
    }
}
