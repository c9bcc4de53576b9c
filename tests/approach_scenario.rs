//! End-to-end approach: coarse guidance, grounding, timeout lock, cache reuse

use approx::assert_abs_diff_eq;
use geo_anchoring::{
    to_local, Diagnostic, DiscoveryState, EngineConfig, EngineEvent, GeodeticPoint, GroundingSource, LocalFrameId,
    LocalPosition, LockConfidence, MockTrackingProvider, ObjectCategory, ObjectId, PlacementRequest,
    PlacementStrategy, PrecisionTier, SpatialAnchoringEngine, SurfaceId, SurfaceObservation,
};

fn start() -> GeodeticPoint {
    GeodeticPoint::new(37.0000, -122.0000)
}

fn target() -> GeodeticPoint {
    GeodeticPoint::new(37.0001, -122.0000)
}

fn engine() -> SpatialAnchoringEngine<MockTrackingProvider> {
    SpatialAnchoringEngine::new(EngineConfig::default(), MockTrackingProvider::new(start(), 1.5)).unwrap()
}

/// Move the simulated user to a local position and the matching geodetic fix
fn walk_to(engine: &mut SpatialAnchoringEngine<MockTrackingProvider>, x: f64, z: f64) {
    let origin = engine.session_origin().unwrap_or_else(start);
    let fix = geo_anchoring::local_to_geodetic(&origin, &LocalPosition::new(x, 0.0, z));
    engine.provider_mut().set_camera(LocalPosition::new(x, 1.5, z));
    engine.provider_mut().set_geodetic(fix);
}

#[test]
fn test_target_is_eleven_meters_north() {
    let offset = to_local(&start(), &target());
    assert_abs_diff_eq!(offset.north_m, 11.1, epsilon = 0.1);
    assert_abs_diff_eq!(offset.east_m, 0.0, epsilon = 0.1);
}

#[test]
fn test_full_approach_with_single_surface() {
    let mut engine = engine();
    let events = engine.subscribe("chest");
    let object = ObjectId::new("chest");

    engine.begin_discovery("chest", target(), ObjectCategory::Small, None, 0);
    assert_eq!(engine.discovery_state(&object), Some(DiscoveryState::CoarseGuidance));

    // nothing detected yet: category default relative to the camera
    let early = engine.place_object(PlacementRequest::new("chest", target()).at(0));
    assert_eq!(early.grounding.source, GroundingSource::CategoryDefault);
    assert_abs_diff_eq!(early.position.y, 1.1, epsilon = 1e-9);

    // a table top 0.3 m below the probe origin appears under the target
    engine
        .provider_mut()
        .add_surface(SurfaceObservation::horizontal(7, LocalPosition::new(0.0, 1.2, -11.12), 1.0, 1.0));

    walk_to(&mut engine, 0.0, -5.56);
    engine.tick(1000);
    assert_eq!(engine.discovery_state(&object), Some(DiscoveryState::CoarseGuidance));
    engine.tick(2000);
    assert_eq!(engine.discovery_state(&object), Some(DiscoveryState::LocalGrounding));

    let grounded = engine.placement(&object).unwrap().clone();
    assert_eq!(grounded.grounding.source, GroundingSource::Surface(SurfaceId(7)));
    assert_abs_diff_eq!(grounded.position.y, 1.2, epsilon = 1e-12);
    assert!(engine.anchor_group(&object).unwrap().is_single_anchor());

    for t in 3..=11 {
        engine.tick(t * 1000);
        assert_eq!(engine.discovery_state(&object), Some(DiscoveryState::LocalGrounding));
    }
    engine.tick(12_000);
    assert_eq!(engine.discovery_state(&object), Some(DiscoveryState::LockedIn));

    let received: Vec<EngineEvent> = events.try_iter().collect();

    let transitions: Vec<DiscoveryState> = received
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            DiscoveryState::ProximityDiscovery,
            DiscoveryState::LocalGrounding,
            DiscoveryState::LockedIn
        ]
    );

    let tiers: Vec<PrecisionTier> = received
        .iter()
        .filter_map(|e| match e {
            EngineEvent::GuidanceUpdate { guidance, .. } => Some(guidance.tier),
            _ => None,
        })
        .collect();
    assert!(tiers.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(tiers.last(), Some(&PrecisionTier::Locked));

    assert!(received.iter().any(|e| matches!(
        e,
        EngineEvent::PrecisionAchieved { confidence: LockConfidence::Reduced, accuracy_m, .. } if *accuracy_m == 0.5
    )));
    assert!(received.iter().any(|e| matches!(
        e,
        EngineEvent::Diagnostic(record) if matches!(record.diagnostic, Diagnostic::GroundingTimeout { .. })
    )));

    let record = engine.anchor_record(&object).unwrap();
    assert_eq!(record.precision_tier, PrecisionTier::Locked);
    assert_abs_diff_eq!(record.local_offset.y, 1.2, epsilon = 1e-12);

    // same session: the captured offset is reused and grounded again
    let revisit = engine.place_object(PlacementRequest::new("chest", target()).at(13_000));
    assert_eq!(revisit.strategy, PlacementStrategy::Cached);
    assert_eq!(revisit.tier, PrecisionTier::Grounded);
    assert_abs_diff_eq!(revisit.position.z, grounded.position.z, epsilon = 1e-12);
}

#[test]
fn test_new_session_invalidates_cached_offset() {
    let mut engine = engine();
    engine
        .provider_mut()
        .add_surface(SurfaceObservation::horizontal(1, LocalPosition::new(0.0, 0.0, -11.12), 4.0, 4.0));
    engine.register_discovery_tag("tag-chest", "chest");
    engine.begin_discovery("chest", target(), ObjectCategory::Container, None, 0);
    engine.handle_discovery_trigger(
        geo_anchoring::DiscoveryTrigger::new("tag-chest").with_observation(LocalPosition::new(0.0, 0.0, -11.1), 0.97),
        100,
    );
    let object = ObjectId::new("chest");
    assert!(engine.anchor_record(&object).is_some());

    // tracking restarts with the user 5.5 m south of the old origin
    engine.provider_mut().restart_session(LocalFrameId(2));
    engine.provider_mut().set_geodetic(GeodeticPoint::new(36.99995, -122.0));
    engine.tick(1000);
    assert_eq!(engine.frame(), Some(LocalFrameId(2)));
    assert_eq!(engine.discovery_state(&object), Some(DiscoveryState::CoarseGuidance));

    let placement = engine.place_object(PlacementRequest::new("chest", target()).at(1100));
    assert_eq!(placement.strategy, PlacementStrategy::Geodetic);
    assert_abs_diff_eq!(placement.position.z, -16.68, epsilon = 0.05);
    assert!(engine.diagnostics().count("stale_cache") >= 1);
}
