//! Multi-surface stabilization and drift correction
//!
//! An anchor group ties a placed object's center to the surfaces around it
//! through distance constraints captured at attach time. Monitoring compares
//! the constraints with fresh surface snapshots and nudges the center by a
//! damped, bounded amount.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::core::{Column, LocalPosition, ObjectId, SurfaceId, SurfaceObservation};
use crate::tracking::SurfaceProvider;
use crate::utils::StabilizationConfig;

/// Distance relation derived from one attach-time snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// Two surfaces whose midpoint carries the object center
    PairDistance {
        a: SurfaceId,
        b: SurfaceId,
        target_distance: f64,
        /// Object center relative to the pair midpoint at derivation time
        center_offset: LocalPosition,
        tolerance: f64,
    },
    /// Distance from a surface center to the object center
    CenterDistance {
        surface: SurfaceId,
        /// Object center at derivation time
        center: LocalPosition,
        target_distance: f64,
        tolerance: f64,
    },
}

impl Constraint {
    pub fn target_distance(&self) -> f64 {
        match self {
            Constraint::PairDistance { target_distance, .. } | Constraint::CenterDistance { target_distance, .. } => {
                *target_distance
            }
        }
    }

    pub fn tolerance(&self) -> f64 {
        match self {
            Constraint::PairDistance { tolerance, .. } | Constraint::CenterDistance { tolerance, .. } => *tolerance,
        }
    }

    /// Signed excess beyond tolerance: positive when stretched, negative when compressed
    pub fn signed_violation(&self, distance: f64) -> f64 {
        let error = distance - self.target_distance();
        if error.abs() <= self.tolerance() {
            0.0
        } else {
            error - self.tolerance() * error.signum()
        }
    }
}

/// Surfaces and constraints stabilizing one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorGroup {
    pub object_id: ObjectId,
    pub center: LocalPosition,
    pub surfaces: Vec<SurfaceId>,
    pub constraints: Vec<Constraint>,
    pub stability_score: f64,
}

impl AnchorGroup {
    /// Fewer than two anchoring surfaces, no constraints
    pub fn is_single_anchor(&self) -> bool {
        self.constraints.is_empty()
    }
}

/// Result of one monitoring pass over a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub object_id: ObjectId,
    /// Largest constraint violation (meters)
    pub drift_m: f64,
    /// Translation applied to the center this pass
    pub applied: LocalPosition,
    pub center: LocalPosition,
    /// Constraints skipped because a surface vanished from the snapshot
    pub skipped: usize,
    /// Constraints were evaluated and drift stayed within threshold
    pub stable: bool,
}

impl CorrectionReport {
    pub fn corrected(&self) -> bool {
        self.applied != LocalPosition::zeros()
    }
}

/// Per-object anchor groups with drift monitoring
#[derive(Debug)]
pub struct StabilizationGraph {
    config: StabilizationConfig,
    groups: HashMap<ObjectId, AnchorGroup>,
}

impl StabilizationGraph {
    pub fn new(config: StabilizationConfig) -> Self {
        Self {
            config,
            groups: HashMap::new(),
        }
    }

    pub fn config(&self) -> &StabilizationConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: StabilizationConfig) {
        self.config = config;
    }

    /// Build a group from a surface snapshot without registering it
    pub fn build_group(&self, object_id: ObjectId, center: LocalPosition, surfaces: &[SurfaceObservation]) -> AnchorGroup {
        let mut nearest: Vec<&SurfaceObservation> =
            surfaces.iter().filter(|s| s.center.iter().all(|c| c.is_finite())).collect();
        nearest.sort_by(|a, b| {
            (a.center - center)
                .norm()
                .total_cmp(&(b.center - center).norm())
                .then(a.id.cmp(&b.id))
        });
        nearest.dedup_by_key(|s| s.id);
        nearest.truncate(self.config.max_anchor_surfaces);

        if nearest.len() < 2 {
            return AnchorGroup {
                object_id,
                center,
                surfaces: nearest.iter().map(|s| s.id).collect(),
                constraints: Vec::new(),
                stability_score: self.config.single_anchor_score,
            };
        }

        let tolerance = self.config.constraint_tolerance_m;
        let mut constraints = Vec::new();
        for (i, a) in nearest.iter().enumerate() {
            for b in &nearest[i + 1..] {
                constraints.push(Constraint::PairDistance {
                    a: a.id,
                    b: b.id,
                    target_distance: (a.center - b.center).norm(),
                    center_offset: center - (a.center + b.center) * 0.5,
                    tolerance,
                });
            }
        }
        for surface in &nearest {
            constraints.push(Constraint::CenterDistance {
                surface: surface.id,
                center,
                target_distance: (surface.center - center).norm(),
                tolerance,
            });
        }

        let chosen: Vec<SurfaceObservation> = nearest.iter().map(|s| (*s).clone()).collect();
        let stability_score = self.score(&chosen, constraints.len());

        AnchorGroup {
            object_id,
            center,
            surfaces: chosen.iter().map(|s| s.id).collect(),
            constraints,
            stability_score,
        }
    }

    /// Weighted stability score in [0, 1]
    pub fn score(&self, surfaces: &[SurfaceObservation], constraint_count: usize) -> f64 {
        if surfaces.is_empty() {
            return 0.0;
        }
        let max = self.config.max_anchor_surfaces.max(1) as f64;
        let count_term = (surfaces.len() as f64 / max).min(1.0);

        let quality_term = surfaces
            .iter()
            .map(|s| {
                let area = if self.config.reference_area_m2 > 0.0 {
                    (s.area_m2() / self.config.reference_area_m2).min(1.0)
                } else {
                    1.0
                };
                area * s.classification_confidence.clamp(0.0, 1.0)
            })
            .sum::<f64>()
            / surfaces.len() as f64;

        let max_possible = max * (max - 1.0) / 2.0 + max;
        let density_term = (constraint_count as f64 / max_possible).min(1.0);

        let score = self.config.weight_surface_count * count_term
            + self.config.weight_surface_quality * quality_term
            + self.config.weight_constraint_density * density_term;
        score.clamp(0.0, 1.0)
    }

    /// Build and register a group from the provider's current snapshot
    pub fn attach<S: SurfaceProvider + ?Sized>(
        &mut self,
        provider: &S,
        object_id: ObjectId,
        center: LocalPosition,
    ) -> &AnchorGroup {
        let surfaces = match provider.surfaces_near(Column::of(&center), self.config.search_radius_m) {
            Ok(surfaces) => surfaces,
            Err(err) => {
                debug!(object = %object_id, error = %err, "Surface snapshot unavailable, attaching single anchor");
                Vec::new()
            }
        };
        let group = self.build_group(object_id.clone(), center, &surfaces);

        info!(
            object = %object_id,
            surfaces = group.surfaces.len(),
            constraints = group.constraints.len(),
            score = group.stability_score,
            "Attached anchor group"
        );

        self.groups.insert(object_id.clone(), group);
        &self.groups[&object_id]
    }

    /// Remove a group and its constraints
    pub fn detach(&mut self, object_id: &ObjectId) -> bool {
        let removed = self.groups.remove(object_id).is_some();
        if removed {
            debug!(object = %object_id, "Detached anchor group");
        }
        removed
    }

    pub fn group(&self, object_id: &ObjectId) -> Option<&AnchorGroup> {
        self.groups.get(object_id)
    }

    pub fn center(&self, object_id: &ObjectId) -> Option<LocalPosition> {
        self.groups.get(object_id).map(|g| g.center)
    }

    /// Registered objects in deterministic order
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.groups.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }

    /// Check one group against a snapshot and apply a bounded correction
    pub fn monitor(&mut self, object_id: &ObjectId, snapshot: &[SurfaceObservation]) -> Option<CorrectionReport> {
        let config = self.config.clone();
        let group = self.groups.get_mut(object_id)?;

        let lookup: HashMap<SurfaceId, &LocalPosition> = snapshot.iter().map(|s| (s.id, &s.center)).collect();
        let mut drift: f64 = 0.0;
        let mut evaluated = 0usize;
        let mut skipped = 0usize;
        let mut sum = Vector3::zeros();
        let mut violated = 0usize;

        for constraint in &group.constraints {
            let (violation, direction) = match constraint {
                Constraint::PairDistance {
                    a,
                    b,
                    center_offset,
                    tolerance,
                    ..
                } => match (lookup.get(a), lookup.get(b)) {
                    (Some(pa), Some(pb)) => {
                        // the center should sit where the pair midpoint now carries it
                        let residual = (*pa + *pb) * 0.5 + center_offset - group.center;
                        ((residual.norm() - tolerance).max(0.0), residual)
                    }
                    _ => {
                        skipped += 1;
                        continue;
                    }
                },
                Constraint::CenterDistance { surface, .. } => match lookup.get(surface) {
                    Some(ps) => {
                        let toward = *ps - group.center;
                        (constraint.signed_violation(toward.norm()), toward)
                    }
                    None => {
                        skipped += 1;
                        continue;
                    }
                },
            };

            evaluated += 1;
            drift = drift.max(violation.abs());

            if violation != 0.0 {
                violated += 1;
                if let Some(unit) = direction.try_normalize(f64::EPSILON) {
                    sum += unit * (config.correction_gain * violation);
                }
            }
        }

        let mut applied = LocalPosition::zeros();
        if drift > config.correction_threshold_m && violated > 0 {
            let mut correction = sum / violated as f64;
            let magnitude = correction.norm();
            if magnitude > config.max_correction_per_tick_m {
                correction *= config.max_correction_per_tick_m / magnitude;
            }
            group.center += correction;
            applied = correction;
            debug!(
                object = %object_id,
                drift_m = drift,
                correction_m = applied.norm(),
                "Applied drift correction"
            );
        }

        Some(CorrectionReport {
            object_id: object_id.clone(),
            drift_m: drift,
            applied,
            center: group.center,
            skipped,
            stable: evaluated > 0 && drift <= config.correction_threshold_m,
        })
    }

    /// Monitor a group using a fresh snapshot from the provider
    pub fn monitor_with<S: SurfaceProvider + ?Sized>(
        &mut self,
        provider: &S,
        object_id: &ObjectId,
    ) -> Option<CorrectionReport> {
        let center = self.center(object_id)?;
        let snapshot = match provider.surfaces_near(Column::of(&center), self.config.search_radius_m) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(object = %object_id, error = %err, "Surface snapshot unavailable, skipping monitor");
                return None;
            }
        };
        self.monitor(object_id, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GeodeticPoint;
    use crate::tracking::MockTrackingProvider;
    use approx::assert_abs_diff_eq;

    fn graph() -> StabilizationGraph {
        StabilizationGraph::new(StabilizationConfig::default())
    }

    fn plane(id: u64, x: f64, y: f64, z: f64) -> SurfaceObservation {
        SurfaceObservation::horizontal(id, LocalPosition::new(x, y, z), 1.0, 1.0)
    }

    fn three_planes() -> Vec<SurfaceObservation> {
        vec![plane(1, 0.5, 0.0, 0.0), plane(2, -0.5, 0.0, 0.0), plane(3, 0.0, 0.7, 0.5)]
    }

    #[test]
    fn test_single_surface_gives_single_anchor() {
        let group = graph().build_group(ObjectId::new("lamp"), LocalPosition::zeros(), &[plane(1, 0.0, -0.3, 0.0)]);
        assert!(group.is_single_anchor());
        assert_eq!(group.surfaces, vec![SurfaceId(1)]);
        assert_abs_diff_eq!(group.stability_score, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_constraints_for_three_surfaces() {
        let group = graph().build_group(ObjectId::new("chest"), LocalPosition::zeros(), &three_planes());
        let pairs = group
            .constraints
            .iter()
            .filter(|c| matches!(c, Constraint::PairDistance { .. }))
            .count();
        assert_eq!(pairs, 3);
        assert_eq!(group.constraints.len(), 6);
        assert!(group.constraints.iter().all(|c| c.tolerance() > 0.0 && c.target_distance() >= 0.0));
    }

    #[test]
    fn test_surfaces_capped_at_nearest() {
        let surfaces: Vec<_> = (0..6).map(|i| plane(i, 0.2 * (i as f64 + 1.0), 0.0, 0.0)).collect();
        let group = graph().build_group(ObjectId::new("crate"), LocalPosition::zeros(), &surfaces);
        assert_eq!(group.surfaces, vec![SurfaceId(0), SurfaceId(1), SurfaceId(2), SurfaceId(3)]);
        // 6 pairs + 4 center constraints
        assert_eq!(group.constraints.len(), 10);
        assert_abs_diff_eq!(group.stability_score, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_score_weights() {
        let g = graph();
        let surfaces = vec![
            SurfaceObservation::horizontal(1, LocalPosition::zeros(), 0.5, 1.0).with_confidence(0.8),
            SurfaceObservation::horizontal(2, LocalPosition::new(1.0, 0.0, 0.0), 2.0, 2.0),
        ];
        // count 0.4 * 0.5, quality 0.4 * mean(0.4, 1.0), density 0.2 * 3/10
        let expected = 0.4 * 0.5 + 0.4 * 0.7 + 0.2 * 0.3;
        assert_abs_diff_eq!(g.score(&surfaces, 3), expected, epsilon = 1e-12);
        assert_eq!(g.score(&[], 0), 0.0);
    }

    #[test]
    fn test_no_correction_within_tolerance() {
        let mut g = graph();
        let id = ObjectId::new("chest");
        let surfaces = three_planes();
        let group = g.build_group(id.clone(), LocalPosition::zeros(), &surfaces);
        g.groups.insert(id.clone(), group);

        let report = g.monitor(&id, &surfaces).unwrap();
        assert_eq!(report.drift_m, 0.0);
        assert!(report.stable);
        assert!(!report.corrected());
    }

    #[test]
    fn test_correction_is_bounded_and_follows_surfaces() {
        let mut g = graph();
        let id = ObjectId::new("chest");
        let surfaces = three_planes();
        let group = g.build_group(id.clone(), LocalPosition::zeros(), &surfaces);
        g.groups.insert(id.clone(), group);

        // all surfaces slid 0.3 m east
        let moved: Vec<_> = surfaces
            .iter()
            .map(|s| {
                let mut s = s.clone();
                s.center.x += 0.3;
                s
            })
            .collect();

        let mut previous_x = 0.0;
        for _ in 0..20 {
            let report = g.monitor(&id, &moved).unwrap();
            assert!(report.applied.norm() <= 0.01 + 1e-12);
            assert!(!report.stable);
            assert!(report.center.x >= previous_x);
            previous_x = report.center.x;
        }
        assert!(previous_x > 0.05);
        assert!(previous_x < 0.3);
    }

    #[test]
    fn test_symmetric_reestimation_keeps_center() {
        for (left, right) in [(1, 2), (2, 1)] {
            let mut g = graph();
            let id = ObjectId::new("chest");
            let surfaces = vec![plane(right, 0.5, 0.0, 0.0), plane(left, -0.5, 0.0, 0.0)];
            let group = g.build_group(id.clone(), LocalPosition::zeros(), &surfaces);
            g.groups.insert(id.clone(), group);

            // both planes re-estimated 0.1 m further out, midpoint unchanged
            let expanded = vec![plane(right, 0.6, 0.0, 0.0), plane(left, -0.6, 0.0, 0.0)];
            for _ in 0..500 {
                let report = g.monitor(&id, &expanded).unwrap();
                assert!(!report.corrected());
            }
            assert_abs_diff_eq!(g.center(&id).unwrap().norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rigid_slide_settles_stable() {
        let mut g = graph();
        let id = ObjectId::new("chest");
        let surfaces = three_planes();
        let group = g.build_group(id.clone(), LocalPosition::zeros(), &surfaces);
        g.groups.insert(id.clone(), group);

        let moved: Vec<_> = surfaces
            .iter()
            .map(|s| {
                let mut s = s.clone();
                s.center.x += 0.3;
                s
            })
            .collect();

        let settled = (0..100).any(|_| g.monitor(&id, &moved).unwrap().stable);
        assert!(settled);

        let report = g.monitor(&id, &moved).unwrap();
        assert!(report.stable);
        assert!(!report.corrected());
        assert_abs_diff_eq!(report.center.x, 0.3, epsilon = 0.05);
    }

    #[test]
    fn test_vanished_surfaces_skipped() {
        let mut g = graph();
        let id = ObjectId::new("chest");
        let surfaces = three_planes();
        let group = g.build_group(id.clone(), LocalPosition::zeros(), &surfaces);
        g.groups.insert(id.clone(), group);

        let report = g.monitor(&id, &surfaces[..1]).unwrap();
        // 3 pairs and 2 center constraints reference missing surfaces
        assert_eq!(report.skipped, 5);
        assert!(report.stable);

        let report = g.monitor(&id, &[]).unwrap();
        assert_eq!(report.skipped, 6);
        assert!(!report.stable);
        assert!(!report.corrected());
    }

    #[test]
    fn test_attach_and_detach_with_provider() {
        let mut provider = MockTrackingProvider::new(GeodeticPoint::new(37.0, -122.0), 1.5);
        for s in three_planes() {
            provider.add_surface(s);
        }
        let mut g = graph();
        let id = ObjectId::new("chest");

        let group = g.attach(&provider, id.clone(), LocalPosition::new(0.0, 0.2, 0.0));
        assert_eq!(group.surfaces.len(), 3);
        assert!(g.monitor_with(&provider, &id).unwrap().stable);

        assert!(g.detach(&id));
        assert!(!g.detach(&id));
        assert!(g.monitor(&id, &[]).is_none());
        assert!(g.is_empty());
    }

    #[test]
    fn test_single_anchor_never_stable() {
        let mut g = graph();
        let id = ObjectId::new("lamp");
        let surfaces = vec![plane(1, 0.0, -0.3, 0.0)];
        let group = g.build_group(id.clone(), LocalPosition::zeros(), &surfaces);
        g.groups.insert(id.clone(), group);

        let report = g.monitor(&id, &surfaces).unwrap();
        assert!(!report.stable);
        assert_eq!(report.drift_m, 0.0);
    }
}
