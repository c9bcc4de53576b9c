//! Shared engine handle for timer threads and callers
//!
//! Thread-safe: every call takes the engine's `parking_lot::Mutex`, so ticks
//! from a timer thread never interleave with a placement in progress.

use parking_lot::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::api::engine::SpatialAnchoringEngine;
use crate::api::types::{DiscoveryTrigger, EngineEvent, EngineStatus, Placement, PlacementRequest, SessionHandle};
use crate::core::{AnchorRecord, GeodeticPoint, ObjectCategory, ObjectId};
use crate::tracking::TrackingProvider;
use crate::utils::{ConfigError, EngineConfig};

/// Cloneable handle to one engine
pub struct SharedEngine<P: TrackingProvider> {
    inner: Arc<Mutex<SpatialAnchoringEngine<P>>>,
}

impl<P: TrackingProvider> Clone for SharedEngine<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: TrackingProvider> SharedEngine<P> {
    pub fn new(engine: SpatialAnchoringEngine<P>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn with_config(config: EngineConfig, provider: P) -> Result<Self, ConfigError> {
        Ok(Self::new(SpatialAnchoringEngine::new(config, provider)?))
    }

    /// Run a closure with exclusive access to the engine
    pub fn with<R>(&self, f: impl FnOnce(&mut SpatialAnchoringEngine<P>) -> R) -> R {
        let mut engine = self.inner.lock();
        f(&mut engine)
    }

    pub fn tick(&self, now_ms: u64) {
        self.inner.lock().tick(now_ms);
    }

    pub fn place_object(&self, request: PlacementRequest) -> Placement {
        self.inner.lock().place_object(request)
    }

    pub fn begin_discovery(
        &self,
        object_id: impl Into<ObjectId>,
        target: GeodeticPoint,
        category: ObjectCategory,
        cached: Option<AnchorRecord>,
        now_ms: u64,
    ) -> SessionHandle {
        self.inner.lock().begin_discovery(object_id, target, category, cached, now_ms)
    }

    pub fn handle_discovery_trigger(&self, trigger: DiscoveryTrigger, now_ms: u64) {
        self.inner.lock().handle_discovery_trigger(trigger, now_ms);
    }

    pub fn remove_object(&self, object_id: &ObjectId) -> bool {
        self.inner.lock().remove_object(object_id)
    }

    pub fn subscribe(&self, object_id: impl Into<ObjectId>) -> Receiver<EngineEvent> {
        self.inner.lock().subscribe(object_id)
    }

    pub fn subscribe_all(&self) -> Receiver<EngineEvent> {
        self.inner.lock().subscribe_all()
    }

    pub fn status(&self) -> EngineStatus {
        self.inner.lock().status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::DiscoveryState;
    use crate::tracking::MockTrackingProvider;
    use std::thread;

    #[test]
    fn test_ticks_from_another_thread() {
        let shared = SharedEngine::with_config(
            EngineConfig::default(),
            MockTrackingProvider::new(GeodeticPoint::new(37.00005, -122.0), 1.5),
        )
        .unwrap();
        shared.begin_discovery("chest", GeodeticPoint::new(37.0001, -122.0), ObjectCategory::Small, None, 0);

        let timer = shared.clone();
        let handle = thread::spawn(move || {
            for t in 1..=11 {
                timer.tick(t * 1000);
            }
        });
        handle.join().unwrap();

        let state = shared.with(|engine| engine.discovery_state(&ObjectId::new("chest")));
        assert_eq!(state, Some(DiscoveryState::LockedIn));
        assert_eq!(shared.status().locked_sessions, 1);
    }
}
