//! Spatial anchoring engine
//!
//! Owns every per-object state for one tracking session and drives the
//! placement pipeline, stabilization and discovery from injected ticks.

use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

use crate::algorithms::coordinates::{bearing_deg, distance_m, local_to_geodetic, CoordinateValidator};
use crate::algorithms::{
    AnchorGroup, GeodeticReason, GroundingResult, GroundingSource, PlacementStrategy, PrecisionDecider,
    PrecisionInputs, StabilizationGraph, SurfaceGroundingSearch,
};
use crate::api::events::EventBus;
use crate::api::types::{DiscoveryTrigger, EngineEvent, EngineStatus, Placement, PlacementRequest, SessionHandle};
use crate::core::{
    AnchorRecord, Column, GeodeticPoint, LocalFrameId, LocalPosition, ObjectCategory, ObjectId, PrecisionTier,
};
use crate::processing::{DiscoveryOutput, DiscoveryState, DiscoveryStateMachine, LockConfidence, PeriodicTimer, PositioningSession};
use crate::tracking::{TrackingError, TrackingProvider, UserPose};
use crate::utils::{ConfigError, EngineConfig};
use crate::validation::{Diagnostic, DiagnosticRecord, DiagnosticReporter, InputSource};

/// Anchoring engine bound to one tracking provider
pub struct SpatialAnchoringEngine<P: TrackingProvider> {
    config: EngineConfig,
    provider: P,
    decider: PrecisionDecider,
    grounding: SurfaceGroundingSearch,
    stabilization: StabilizationGraph,
    discovery: DiscoveryStateMachine,
    reporter: DiagnosticReporter,
    events: EventBus,
    monitor_timer: PeriodicTimer,
    placements: HashMap<ObjectId, Placement>,
    records: HashMap<ObjectId, AnchorRecord>,
    tags: HashMap<String, ObjectId>,
    frame: Option<LocalFrameId>,
    session_origin: Option<GeodeticPoint>,
    last_pose: Option<UserPose>,
    last_tick_ms: u64,
}

impl<P: TrackingProvider> SpatialAnchoringEngine<P> {
    /// Create an engine. The configuration is validated first.
    pub fn new(config: EngineConfig, provider: P) -> Result<Self, ConfigError> {
        config.validate().into_result()?;

        Ok(Self {
            decider: PrecisionDecider::new(config.precision.clone()),
            grounding: SurfaceGroundingSearch::new(config.grounding.clone()),
            stabilization: StabilizationGraph::new(config.stabilization.clone()),
            discovery: DiscoveryStateMachine::new(config.discovery.clone()),
            reporter: DiagnosticReporter::new(config.diagnostics.max_history_size),
            events: EventBus::new(),
            monitor_timer: PeriodicTimer::new(config.stabilization.monitor_interval_ms),
            placements: HashMap::new(),
            records: HashMap::new(),
            tags: HashMap::new(),
            frame: None,
            session_origin: None,
            last_pose: None,
            last_tick_ms: 0,
            config,
            provider,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the configuration after validating it
    pub fn update_config(&mut self, config: EngineConfig) -> Result<(), ConfigError> {
        config.validate().into_result()?;

        self.decider.set_config(config.precision.clone());
        self.grounding.set_config(config.grounding.clone());
        self.stabilization.set_config(config.stabilization.clone());
        self.discovery.set_config(config.discovery.clone());
        self.reporter.set_max_history_size(config.diagnostics.max_history_size);
        self.monitor_timer.set_interval_ms(config.stabilization.monitor_interval_ms);
        self.config = config;

        info!("Engine configuration updated");
        Ok(())
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn subscribe(&mut self, object_id: impl Into<ObjectId>) -> Receiver<EngineEvent> {
        self.events.subscribe(object_id.into())
    }

    pub fn subscribe_all(&mut self) -> Receiver<EngineEvent> {
        self.events.subscribe_all()
    }

    pub fn diagnostics(&self) -> &DiagnosticReporter {
        &self.reporter
    }

    pub fn placement(&self, object_id: &ObjectId) -> Option<&Placement> {
        self.placements.get(object_id)
    }

    pub fn anchor_record(&self, object_id: &ObjectId) -> Option<&AnchorRecord> {
        self.records.get(object_id)
    }

    pub fn anchor_group(&self, object_id: &ObjectId) -> Option<&AnchorGroup> {
        self.stabilization.group(object_id)
    }

    pub fn discovery_session(&self, object_id: &ObjectId) -> Option<&PositioningSession> {
        self.discovery.session(object_id)
    }

    pub fn discovery_state(&self, object_id: &ObjectId) -> Option<DiscoveryState> {
        self.discovery.state(object_id)
    }

    pub fn frame(&self) -> Option<LocalFrameId> {
        self.frame
    }

    /// Geodetic position of the live session's local origin
    pub fn session_origin(&self) -> Option<GeodeticPoint> {
        self.session_origin
    }

    /// Place an object. Always produces a position.
    pub fn place_object(&mut self, request: PlacementRequest) -> Placement {
        let pose = self.refresh_pose(request.now_ms);
        self.place_with_pose(request, pose.as_ref())
    }

    /// Placement against a pose the caller already pulled this step
    fn place_with_pose(&mut self, request: PlacementRequest, pose: Option<&UserPose>) -> Placement {
        let now_ms = request.now_ms;
        let placement = self.compute_placement(
            &request.object_id,
            &request.target,
            request.category,
            request.cached.as_ref(),
            pose,
            now_ms,
        );

        if self.stabilization.detach(&request.object_id) {
            debug!(object = %request.object_id, "Re-placement dropped previous anchor group");
        }
        if placement.tier == PrecisionTier::Grounded {
            self.capture_anchor(&request.object_id, placement.position, PrecisionTier::Grounded, now_ms);
        }
        self.placements.insert(request.object_id.clone(), placement.clone());
        placement
    }

    /// Start discovery for an object, restarting it if already running
    pub fn begin_discovery(
        &mut self,
        object_id: impl Into<ObjectId>,
        target: GeodeticPoint,
        category: ObjectCategory,
        cached: Option<AnchorRecord>,
        now_ms: u64,
    ) -> SessionHandle {
        let object_id = object_id.into();
        self.observe_time(now_ms);
        self.refresh_pose(now_ms);

        let started_at_ms = self
            .discovery
            .begin(object_id.clone(), target, category, cached, now_ms)
            .started_at_ms;
        info!(object = %object_id, lat = target.latitude_deg, lon = target.longitude_deg, "Discovery started");

        self.drive_guidance(&object_id, now_ms);

        SessionHandle {
            object_id,
            started_at_ms,
        }
    }

    /// Bind a discovery tag to an object; a tag already bound keeps its object
    pub fn register_discovery_tag(&mut self, tag_id: impl Into<String>, object_id: impl Into<ObjectId>) -> bool {
        let tag_id = tag_id.into();
        if self.tags.contains_key(&tag_id) {
            debug!(tag = %tag_id, "Discovery tag already registered");
            return false;
        }
        self.tags.insert(tag_id, object_id.into());
        true
    }

    /// Deliver an external discovery trigger
    pub fn handle_discovery_trigger(&mut self, trigger: DiscoveryTrigger, now_ms: u64) {
        self.observe_time(now_ms);

        let Some(object_id) = self.tags.get(&trigger.tag_id).cloned() else {
            self.report(Diagnostic::UnknownDiscoveryTag { tag_id: trigger.tag_id }, now_ms);
            return;
        };
        if self.discovery.session(&object_id).is_none() {
            debug!(object = %object_id, tag = %trigger.tag_id, "Trigger for object without discovery session");
            return;
        }

        self.refresh_pose(now_ms);

        let observed = trigger
            .observed_position
            .filter(|p| CoordinateValidator::validate_local(p).is_ok())
            .filter(|_| trigger.confidence >= self.config.discovery.high_confidence_threshold);

        let outputs = self.discovery.trigger(&object_id, &trigger.tag_id, observed.is_some(), now_ms);
        self.process_outputs(outputs, observed, now_ms);
    }

    /// Attach multi-surface stabilization around a center
    pub fn attach_stabilization(&mut self, object_id: &ObjectId, center: LocalPosition) -> AnchorGroup {
        let group = self.stabilization.attach(&self.provider, object_id.clone(), center).clone();
        if group.is_single_anchor() {
            self.report(
                Diagnostic::InsufficientSurfaces {
                    object_id: object_id.clone(),
                    found: group.surfaces.len(),
                },
                self.last_tick_ms,
            );
        }
        group
    }

    pub fn detach_stabilization(&mut self, object_id: &ObjectId) -> bool {
        self.stabilization.detach(object_id)
    }

    /// Forget an object: monitoring, discovery, placement and record
    pub fn remove_object(&mut self, object_id: &ObjectId) -> bool {
        let mut removed = self.stabilization.detach(object_id);
        removed |= self.discovery.remove(object_id);
        removed |= self.placements.remove(object_id).is_some();
        removed |= self.records.remove(object_id).is_some();
        self.tags.retain(|_, bound| bound != object_id);
        self.events.close_object(object_id);

        if removed {
            info!(object = %object_id, "Object removed");
        }
        removed
    }

    /// Advance time: session checks, guidance, stabilization and timeouts
    pub fn tick(&mut self, now_ms: u64) {
        self.observe_time(now_ms);
        self.refresh_pose(now_ms);

        for object_id in self.discovery.object_ids() {
            if self.discovery.state(&object_id) == Some(DiscoveryState::CoarseGuidance) {
                self.drive_guidance(&object_id, now_ms);
            }
        }

        if !self.stabilization.is_empty() && self.monitor_timer.poll(now_ms) {
            self.monitor_groups(now_ms);
        }

        let outputs = self.discovery.check_timeouts(now_ms);
        self.process_outputs(outputs, None, now_ms);
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            frame: self.frame,
            session_origin: self.session_origin,
            placed_objects: self.placements.len(),
            anchor_groups: self.stabilization.len(),
            anchor_records: self.records.len(),
            coarse_sessions: self.discovery.count_in_state(DiscoveryState::CoarseGuidance),
            proximity_sessions: self.discovery.count_in_state(DiscoveryState::ProximityDiscovery),
            grounding_sessions: self.discovery.count_in_state(DiscoveryState::LocalGrounding),
            locked_sessions: self.discovery.count_in_state(DiscoveryState::LockedIn),
            diagnostics_total: self.reporter.total(),
            subscribers: self.events.subscriber_count(),
            last_tick_ms: self.last_tick_ms,
        }
    }

    fn observe_time(&mut self, now_ms: u64) {
        self.last_tick_ms = self.last_tick_ms.max(now_ms);
    }

    /// Pull a pose, falling back to the last known one. Detects session changes.
    fn refresh_pose(&mut self, now_ms: u64) -> Option<UserPose> {
        match self.provider.current_user_pose() {
            Ok(pose) => {
                self.last_pose = Some(pose.clone());
                match self.frame {
                    None => self.establish_session(&pose),
                    Some(frame) if frame != pose.frame => self.reset_session(frame, &pose, now_ms),
                    Some(_) => {}
                }
                Some(pose)
            }
            Err(TrackingError::SessionLost { frame }) => {
                warn!(?frame, "Tracking session lost, dropping local state");
                self.clear_local_state();
                self.frame = None;
                self.session_origin = None;
                self.last_pose = None;
                self.report(
                    Diagnostic::InputUnavailable {
                        source: InputSource::Pose,
                        detail: format!("session {:?} lost", frame),
                    },
                    now_ms,
                );
                let outputs = self.discovery.reset_all(now_ms);
                self.process_outputs(outputs, None, now_ms);
                None
            }
            Err(err) => {
                self.report(
                    Diagnostic::InputUnavailable {
                        source: InputSource::Pose,
                        detail: err.to_string(),
                    },
                    now_ms,
                );
                self.last_pose.clone()
            }
        }
    }

    fn establish_session(&mut self, pose: &UserPose) {
        let origin = local_to_geodetic(&pose.geodetic, &(-pose.camera));
        info!(
            frame = pose.frame.0,
            lat = origin.latitude_deg,
            lon = origin.longitude_deg,
            "Tracking session established"
        );
        self.frame = Some(pose.frame);
        self.session_origin = Some(origin);
    }

    fn reset_session(&mut self, previous: LocalFrameId, pose: &UserPose, now_ms: u64) {
        warn!(previous = previous.0, current = pose.frame.0, "Tracking session changed, resetting local state");
        self.clear_local_state();
        self.establish_session(pose);
        self.report(
            Diagnostic::SessionReset {
                previous: Some(previous),
                current: pose.frame,
            },
            now_ms,
        );

        let outputs = self.discovery.reset_all(now_ms);
        self.process_outputs(outputs, None, now_ms);
    }

    /// Local positions are meaningless in a new session; records survive and get re-validated
    fn clear_local_state(&mut self) {
        self.stabilization.clear();
        self.placements.clear();
        self.monitor_timer.reset();
    }

    fn compute_placement(
        &mut self,
        object_id: &ObjectId,
        target: &GeodeticPoint,
        category: ObjectCategory,
        cached: Option<&AnchorRecord>,
        pose: Option<&UserPose>,
        now_ms: u64,
    ) -> Placement {
        let camera = pose.map(|p| p.camera).unwrap_or_else(LocalPosition::zeros);

        if let Err(reason) = CoordinateValidator::validate_geodetic(target) {
            self.report(
                Diagnostic::InvalidTarget {
                    object_id: object_id.clone(),
                    reason: reason.to_string(),
                },
                now_ms,
            );
            let column = Column::of(&camera);
            let grounding = self.ground(object_id, column, camera.y, category, now_ms);
            return Placement {
                object_id: object_id.clone(),
                position: column.at_height(grounding.height),
                tier: PrecisionTier::Coarse,
                strategy: PlacementStrategy::Geodetic,
                reason: None,
                grounding,
                frame: self.frame,
                placed_at_ms: now_ms,
            };
        }

        let stored = self.records.get(object_id).cloned();
        let cached = cached.cloned().or(stored);
        let user = pose.map(|p| p.geodetic).unwrap_or(*target);
        let origin = self.session_origin.unwrap_or(user);

        let inputs = PrecisionInputs {
            target,
            cached: cached.as_ref(),
            user: &user,
            session_origin: &origin,
        };
        let candidate = self.decider.decide(inputs);

        // stale records are reported even when proximity already ruled them out
        if let Some(origin_offset_m) = self.decider.stale_origin_offset(&inputs) {
            self.report(
                Diagnostic::StaleCache {
                    object_id: object_id.clone(),
                    origin_offset_m,
                },
                now_ms,
            );
        }
        if let Some(GeodeticReason::OffsetTooLarge { offset_m }) = candidate.reason {
            self.report(
                Diagnostic::CachedOffsetTooLarge {
                    object_id: object_id.clone(),
                    offset_m,
                },
                now_ms,
            );
        }

        let column = Column::of(&candidate.position);
        let grounding = self.ground(object_id, column, camera.y, category, now_ms);

        let tier = match candidate.strategy {
            PlacementStrategy::Geodetic => PrecisionTier::Coarse,
            PlacementStrategy::Cached if grounding.source.is_grounded() => PrecisionTier::Grounded,
            PlacementStrategy::Cached => PrecisionTier::Cached,
        };

        let placement = Placement {
            object_id: object_id.clone(),
            position: column.at_height(grounding.height),
            tier,
            strategy: candidate.strategy,
            reason: candidate.reason,
            grounding,
            frame: self.frame,
            placed_at_ms: now_ms,
        };

        debug!(
            object = %object_id,
            x = placement.position.x,
            y = placement.position.y,
            z = placement.position.z,
            ?tier,
            strategy = ?placement.strategy,
            "Placed object"
        );
        placement
    }

    fn ground(&mut self, object_id: &ObjectId, column: Column, camera_y: f64, category: ObjectCategory, now_ms: u64) -> GroundingResult {
        let result = self.grounding.find_ground_height(&self.provider, column, camera_y, category);
        if result.input_unavailable {
            self.report(
                Diagnostic::InputUnavailable {
                    source: InputSource::Surfaces,
                    detail: format!("grounding probe for {}", object_id),
                },
                now_ms,
            );
        }
        if result.source == GroundingSource::CategoryDefault {
            self.report(
                Diagnostic::DefaultHeightUsed {
                    object_id: object_id.clone(),
                    category,
                },
                now_ms,
            );
        }
        result
    }

    /// Replace the record wholesale unless a better one exists
    fn capture_anchor(&mut self, object_id: &ObjectId, position: LocalPosition, tier: PrecisionTier, now_ms: u64) {
        let Some(origin) = self.session_origin else {
            return;
        };
        if let Some(existing) = self.records.get(object_id) {
            if existing.precision_tier > tier {
                return;
            }
        }

        let record = AnchorRecord {
            object_id: object_id.clone(),
            origin_geodetic: origin,
            local_offset: position,
            captured_at_ms: now_ms,
            precision_tier: tier,
        };
        info!(object = %object_id, ?tier, "Captured anchor record");
        self.records.insert(object_id.clone(), record.clone());
        self.events.publish(EngineEvent::AnchorCaptured { record });
    }

    fn drive_guidance(&mut self, object_id: &ObjectId, now_ms: u64) {
        let (Some(pose), Some(session)) = (self.last_pose.as_ref(), self.discovery.session(object_id)) else {
            return;
        };
        let distance = distance_m(&pose.geodetic, &session.target);
        let bearing = bearing_deg(&pose.geodetic, &session.target);

        let outputs = self.discovery.update_guidance(object_id, distance, bearing, now_ms);
        self.process_outputs(outputs, None, now_ms);
    }

    fn monitor_groups(&mut self, now_ms: u64) {
        for object_id in self.stabilization.object_ids() {
            let Some(report) = self.stabilization.monitor_with(&self.provider, &object_id) else {
                self.report(
                    Diagnostic::InputUnavailable {
                        source: InputSource::Surfaces,
                        detail: format!("stabilization snapshot for {}", object_id),
                    },
                    now_ms,
                );
                continue;
            };

            if report.corrected() {
                if let Some(placement) = self.placements.get_mut(&object_id) {
                    placement.position = report.center;
                }
                self.events.publish(EngineEvent::CorrectionApplied {
                    object_id: object_id.clone(),
                    drift_m: report.drift_m,
                    correction_m: report.applied.norm(),
                    center: report.center,
                    at_ms: now_ms,
                });
            }

            if self.discovery.state(&object_id) == Some(DiscoveryState::LocalGrounding) {
                let outputs = self.discovery.record_sample(&object_id, report.stable, now_ms);
                self.process_outputs(outputs, None, now_ms);
            }
        }
    }

    fn process_outputs(&mut self, outputs: Vec<DiscoveryOutput>, observed: Option<LocalPosition>, now_ms: u64) {
        for output in outputs {
            match output {
                DiscoveryOutput::Guidance { object_id, guidance } => {
                    self.events.publish(EngineEvent::GuidanceUpdate {
                        object_id,
                        guidance,
                        at_ms: now_ms,
                    });
                }
                DiscoveryOutput::Transition(transition) => {
                    let object_id = transition.object_id.clone();
                    self.events.publish(EngineEvent::StateChanged {
                        object_id: object_id.clone(),
                        from: transition.from,
                        to: transition.to,
                        at_ms: transition.at_ms,
                    });
                    self.events.publish(EngineEvent::GuidanceUpdate {
                        object_id: object_id.clone(),
                        guidance: transition.guidance,
                        at_ms: transition.at_ms,
                    });

                    match transition.to {
                        DiscoveryState::LocalGrounding => self.enter_grounding(&object_id, now_ms),
                        DiscoveryState::LockedIn => {
                            let lock = transition.lock.unwrap_or(LockConfidence::Reduced);
                            self.enter_locked(&object_id, lock, observed, now_ms);
                        }
                        DiscoveryState::CoarseGuidance | DiscoveryState::ProximityDiscovery => {}
                    }
                }
                DiscoveryOutput::TimedOut {
                    object_id,
                    waited_ms,
                    stable_samples,
                } => {
                    self.report(
                        Diagnostic::GroundingTimeout {
                            object_id,
                            waited_ms,
                            stable_samples,
                        },
                        now_ms,
                    );
                }
                DiscoveryOutput::OutOfOrder {
                    object_id,
                    event_ms,
                    last_ms,
                } => {
                    self.report(
                        Diagnostic::OutOfOrderEvent {
                            object_id,
                            event_ms,
                            last_ms,
                        },
                        now_ms,
                    );
                }
                DiscoveryOutput::DuplicateTrigger { tag_id, .. } => {
                    self.report(Diagnostic::DuplicateDiscoveryTrigger { tag_id }, now_ms);
                }
                DiscoveryOutput::Expired { object_id } => {
                    debug!(object = %object_id, "Discovery session retired");
                }
            }
        }
    }

    fn enter_grounding(&mut self, object_id: &ObjectId, now_ms: u64) {
        let Some(session) = self.discovery.session(object_id) else {
            return;
        };
        let request = PlacementRequest {
            object_id: object_id.clone(),
            target: session.target,
            category: session.category,
            cached: session.cached.clone(),
            now_ms,
        };

        // outputs are processed against the pose pulled at the start of this step
        let pose = self.last_pose.clone();
        let placement = self.place_with_pose(request, pose.as_ref());
        self.attach_stabilization(object_id, placement.position);
    }

    fn enter_locked(&mut self, object_id: &ObjectId, lock: LockConfidence, observed: Option<LocalPosition>, now_ms: u64) {
        if let (LockConfidence::High, Some(position)) = (lock, observed) {
            if let Some(placement) = self.placements.get_mut(object_id) {
                placement.position = position;
            }
            if self.stabilization.group(object_id).is_some() {
                self.attach_stabilization(object_id, position);
            }
        }

        let position = self
            .stabilization
            .center(object_id)
            .or_else(|| self.placements.get(object_id).map(|p| p.position));
        let Some(position) = position else {
            return;
        };

        if let Some(placement) = self.placements.get_mut(object_id) {
            placement.tier = PrecisionTier::Locked;
        }

        let accuracy_m = lock.accuracy_m(&self.config.discovery);
        info!(object = %object_id, ?lock, accuracy_m, "Precision achieved");
        self.events.publish(EngineEvent::PrecisionAchieved {
            object_id: object_id.clone(),
            position,
            confidence: lock,
            accuracy_m,
            at_ms: now_ms,
        });
        self.capture_anchor(object_id, position, PrecisionTier::Locked, now_ms);
    }

    fn report(&mut self, diagnostic: Diagnostic, now_ms: u64) {
        let id = self.reporter.report(diagnostic.clone(), now_ms);
        if self.config.diagnostics.publish_events {
            self.events.publish(EngineEvent::Diagnostic(DiagnosticRecord {
                id,
                timestamp_ms: now_ms,
                diagnostic,
            }));
        }
    }
}
