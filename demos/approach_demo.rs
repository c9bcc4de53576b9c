//! Demonstration of a user approaching a geo-anchored object

use geo_anchoring::{
    local_to_geodetic, EngineConfig, EngineEvent, GeodeticPoint, LocalPosition, MockTrackingProvider, ObjectCategory,
    ObjectId, SpatialAnchoringEngine, SurfaceObservation,
};

fn main() {
    println!("=== Geo Anchoring - Approach Demo ===\n");

    let start = GeodeticPoint::new(37.0, -122.0);
    let target = GeodeticPoint::new(37.0003, -122.0001);

    let mut provider = MockTrackingProvider::new(start, 1.5);
    // floor plus a table next to the target
    provider.add_surface(SurfaceObservation::horizontal(1, LocalPosition::new(-8.9, 0.0, -33.4), 6.0, 6.0));
    provider.add_surface(SurfaceObservation::horizontal(2, LocalPosition::new(-8.9, 0.75, -33.4), 1.2, 0.8));
    provider.add_surface(SurfaceObservation::horizontal(3, LocalPosition::new(-8.0, 0.45, -33.0), 0.5, 0.5));

    let mut engine = match SpatialAnchoringEngine::new(EngineConfig::default(), provider) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return;
        }
    };

    let events = engine.subscribe_all();
    let object = ObjectId::new("treasure");
    engine.begin_discovery(object.clone(), target, ObjectCategory::Container, None, 0);

    // walk toward the target at about 1.5 m/s
    let walk_to = LocalPosition::new(-8.0, 1.5, -31.0);
    let steps = 25u64;
    for step in 1..=steps {
        let now_ms = step * 1000;
        let fraction = step as f64 / steps as f64;
        let camera = LocalPosition::new(walk_to.x * fraction, 1.5, walk_to.z * fraction);

        let origin = engine.session_origin().unwrap_or(start);
        let geodetic = local_to_geodetic(&origin, &LocalPosition::new(camera.x, 0.0, camera.z));
        engine.provider_mut().set_camera(camera);
        engine.provider_mut().set_geodetic(geodetic);
        engine.tick(now_ms);

        for event in events.try_iter() {
            print_event(&event);
        }
    }

    for now_ms in (steps + 1)..=(steps + 12) {
        engine.tick(now_ms * 1000);
        for event in events.try_iter() {
            print_event(&event);
        }
    }

    println!("\nFinal status: {:#?}", engine.status());
    if let Some(record) = engine.anchor_record(&object) {
        println!(
            "Anchor record: offset ({:.2}, {:.2}, {:.2}) tier {:?}",
            record.local_offset.x, record.local_offset.y, record.local_offset.z, record.precision_tier
        );
    }
}

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::GuidanceUpdate { guidance, at_ms, .. } => {
            println!("[{:>6} ms] {:?}: {}", at_ms, guidance.tier, guidance.instruction);
        }
        EngineEvent::StateChanged { from, to, at_ms, .. } => {
            println!("[{:>6} ms] {:?} -> {:?}", at_ms, from, to);
        }
        EngineEvent::PrecisionAchieved {
            position,
            confidence,
            accuracy_m,
            at_ms,
            ..
        } => {
            println!(
                "[{:>6} ms] Locked ({:?}, ~{:.2} m) at ({:.2}, {:.2}, {:.2})",
                at_ms, confidence, accuracy_m, position.x, position.y, position.z
            );
        }
        EngineEvent::AnchorCaptured { record } => {
            println!("           Anchor captured at tier {:?}", record.precision_tier);
        }
        EngineEvent::CorrectionApplied { drift_m, correction_m, at_ms, .. } => {
            println!("[{:>6} ms] Drift {:.3} m, corrected {:.3} m", at_ms, drift_m, correction_m);
        }
        EngineEvent::Diagnostic(record) => {
            println!("[{:>6} ms] note: {}", record.timestamp_ms, record.diagnostic);
        }
    }
}
