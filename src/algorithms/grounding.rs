//! Surface grounding search
//!
//! Finds the vertical resting height for an object in a column of the local
//! frame. The search always produces a height: detected surfaces first, then a
//! cross-pattern second pass, then a per-category default.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::core::{Column, ObjectCategory, SurfaceId, SurfaceObservation, SurfaceOrientation};
use crate::tracking::SurfaceProvider;
use crate::utils::GroundingConfig;

/// Which rule produced a grounding height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroundingSource {
    /// Highest surface whose footprint covers the column
    Surface(SurfaceId),
    /// No surface covered the column; lowest hit taken as the floor
    Floor(SurfaceId),
    /// Found by one of the offset probes of the second pass
    CrossProbe(SurfaceId),
    /// Nothing detected; category default relative to the camera
    CategoryDefault,
}

impl GroundingSource {
    pub fn surface_id(&self) -> Option<SurfaceId> {
        match self {
            GroundingSource::Surface(id) | GroundingSource::Floor(id) | GroundingSource::CrossProbe(id) => Some(*id),
            GroundingSource::CategoryDefault => None,
        }
    }

    /// True when the height comes from an actual detected surface
    pub fn is_grounded(&self) -> bool {
        self.surface_id().is_some()
    }
}

/// Grounding outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundingResult {
    pub height: f64,
    pub source: GroundingSource,
    /// The provider failed at least one probe; treated as an empty result
    pub input_unavailable: bool,
}

/// Outcome of selecting among the hits of a single probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeSelection<'a> {
    Qualifying(&'a SurfaceObservation),
    Floor(&'a SurfaceObservation),
}

impl<'a> ProbeSelection<'a> {
    pub fn surface(&self) -> &'a SurfaceObservation {
        match self {
            ProbeSelection::Qualifying(s) | ProbeSelection::Floor(s) => s,
        }
    }
}

/// Deterministic surface grounding
#[derive(Debug, Clone)]
pub struct SurfaceGroundingSearch {
    config: GroundingConfig,
}

impl SurfaceGroundingSearch {
    pub fn new(config: GroundingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GroundingConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GroundingConfig) {
        self.config = config;
    }

    /// Select the resting surface among one probe's hits.
    ///
    /// Hit order does not matter: the same set of observations always yields
    /// the same surface.
    pub fn select<'a>(
        &self,
        hits: &'a [SurfaceObservation],
        column: Column,
        origin_y: f64,
    ) -> Option<ProbeSelection<'a>> {
        let ceiling = origin_y - self.config.ceiling_margin_m;
        let candidates: Vec<&SurfaceObservation> = hits
            .iter()
            .filter(|s| s.orientation == SurfaceOrientation::Horizontal)
            .filter(|s| s.height().is_finite() && s.height() < ceiling)
            .collect();

        let highest_qualifying = candidates
            .iter()
            .filter(|s| s.horizontal_gap_to(&column) <= self.config.column_tolerance_m)
            .copied()
            .min_by(|a, b| higher_first(a, b));

        if let Some(surface) = highest_qualifying {
            return Some(ProbeSelection::Qualifying(surface));
        }

        candidates
            .into_iter()
            .min_by(|a, b| lower_first(a, b))
            .map(ProbeSelection::Floor)
    }

    /// Ground a column, always producing a height
    pub fn find_ground_height<S: SurfaceProvider + ?Sized>(
        &self,
        provider: &S,
        column: Column,
        camera_y: f64,
        category: ObjectCategory,
    ) -> GroundingResult {
        let origin_y = camera_y + self.config.probe_origin_offset_m;
        let mut input_unavailable = false;

        let hits = match provider.probe_downward(column) {
            Ok(hits) => hits,
            Err(err) => {
                debug!(error = %err, "Downward probe failed, treating as empty");
                input_unavailable = true;
                Vec::new()
            }
        };

        if let Some(selection) = self.select(&hits, column, origin_y) {
            let result = match selection {
                ProbeSelection::Qualifying(s) => GroundingResult {
                    height: s.height(),
                    source: GroundingSource::Surface(s.id),
                    input_unavailable,
                },
                ProbeSelection::Floor(s) => GroundingResult {
                    height: s.height(),
                    source: GroundingSource::Floor(s.id),
                    input_unavailable,
                },
            };
            debug!(x = column.x, z = column.z, height = result.height, source = ?result.source, "Grounded column");
            return result;
        }

        let offset = self.config.fallback_probe_offset_m;
        let probes = [
            column.offset(offset, 0.0),
            column.offset(-offset, 0.0),
            column.offset(0.0, offset),
            column.offset(0.0, -offset),
        ];

        let mut best_qualifying: Option<SurfaceObservation> = None;
        let mut best_floor: Option<SurfaceObservation> = None;

        for probe in probes {
            let hits = match provider.probe_downward(probe) {
                Ok(hits) => hits,
                Err(err) => {
                    debug!(error = %err, "Cross probe failed, treating as empty");
                    input_unavailable = true;
                    continue;
                }
            };

            match self.select(&hits, probe, origin_y) {
                Some(ProbeSelection::Qualifying(s)) => {
                    if best_qualifying.as_ref().map_or(true, |b| higher_first(s, b) == Ordering::Less) {
                        best_qualifying = Some(s.clone());
                    }
                }
                Some(ProbeSelection::Floor(s)) => {
                    if best_floor.as_ref().map_or(true, |b| lower_first(s, b) == Ordering::Less) {
                        best_floor = Some(s.clone());
                    }
                }
                None => {}
            }
        }

        if let Some(surface) = best_qualifying.or(best_floor) {
            debug!(x = column.x, z = column.z, height = surface.height(), surface = surface.id.0, "Grounded by cross probe");
            return GroundingResult {
                height: surface.height(),
                source: GroundingSource::CrossProbe(surface.id),
                input_unavailable,
            };
        }

        let height = camera_y + self.config.default_offset(category);
        debug!(x = column.x, z = column.z, height, ?category, "No surface found, using category default");
        GroundingResult {
            height,
            source: GroundingSource::CategoryDefault,
            input_unavailable,
        }
    }
}

/// Orders higher surfaces first, lower id first on equal height
fn higher_first(a: &SurfaceObservation, b: &SurfaceObservation) -> Ordering {
    b.height().total_cmp(&a.height()).then(a.id.cmp(&b.id))
}

/// Orders lower surfaces first, lower id first on equal height
fn lower_first(a: &SurfaceObservation, b: &SurfaceObservation) -> Ordering {
    a.height().total_cmp(&b.height()).then(a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{GeodeticPoint, LocalPosition};
    use crate::tracking::MockTrackingProvider;
    use approx::assert_abs_diff_eq;

    fn search() -> SurfaceGroundingSearch {
        SurfaceGroundingSearch::new(GroundingConfig::default())
    }

    fn plane(id: u64, x: f64, y: f64, z: f64, size: f64) -> SurfaceObservation {
        SurfaceObservation::horizontal(id, LocalPosition::new(x, y, z), size, size)
    }

    fn provider() -> MockTrackingProvider {
        MockTrackingProvider::new(GeodeticPoint::new(37.0, -122.0), 1.5)
    }

    #[test]
    fn test_highest_qualifying_surface_wins() {
        let hits = vec![plane(1, 0.0, 0.0, 0.0, 4.0), plane(2, 0.1, 0.75, 0.0, 1.0), plane(3, 0.0, 0.4, 0.1, 1.0)];
        let selection = search().select(&hits, Column::new(0.0, 0.0), 1.5).unwrap();
        assert_eq!(selection, ProbeSelection::Qualifying(&hits[1]));
    }

    #[test]
    fn test_selection_ignores_hit_order() {
        let a = plane(4, 0.0, 0.7, 0.0, 1.0);
        let b = plane(2, 0.0, 0.7, 0.0, 1.0);
        let c = plane(9, 0.0, 0.0, 0.0, 3.0);

        let forward = vec![a.clone(), b.clone(), c.clone()];
        let reversed = vec![c, b, a];

        let s = search();
        let first = s.select(&forward, Column::new(0.0, 0.0), 1.5).unwrap().surface().id;
        let second = s.select(&reversed, Column::new(0.0, 0.0), 1.5).unwrap().surface().id;
        assert_eq!(first, SurfaceId(2));
        assert_eq!(first, second);
    }

    #[test]
    fn test_ceilings_and_vertical_planes_rejected() {
        let hits = vec![
            plane(1, 0.0, 2.4, 0.0, 3.0),
            plane(2, 0.0, 1.47, 0.0, 1.0),
            plane(3, 0.0, 1.0, 0.0, 1.0).with_orientation(SurfaceOrientation::Vertical),
            plane(4, 0.0, 0.0, 0.0, 3.0),
        ];
        let selection = search().select(&hits, Column::new(0.0, 0.0), 1.5).unwrap();
        assert_eq!(selection.surface().id, SurfaceId(4));
    }

    #[test]
    fn test_lowest_hit_when_nothing_qualifies() {
        let hits = vec![plane(1, 3.0, 0.7, 0.0, 1.0), plane(2, 2.0, -0.1, 2.0, 1.0)];
        let selection = search().select(&hits, Column::new(0.0, 0.0), 1.5).unwrap();
        assert_eq!(selection, ProbeSelection::Floor(&hits[1]));
    }

    #[test]
    fn test_column_tolerance_boundary() {
        // footprint edge at x = 0.5, column at x = 1.0: gap exactly 0.5
        let hits = vec![plane(1, 0.0, 0.7, 0.0, 1.0), plane(2, 0.0, 0.0, 0.0, 0.2)];
        let s = search();
        let at_edge = s.select(&hits, Column::new(1.0, 0.0), 1.5).unwrap();
        assert_eq!(at_edge.surface().id, SurfaceId(1));

        let beyond = s.select(&hits, Column::new(1.01, 0.0), 1.5).unwrap();
        assert_eq!(beyond, ProbeSelection::Floor(&hits[1]));
    }

    #[test]
    fn test_find_ground_height_on_surface() {
        let mut provider = provider();
        provider.add_surface(plane(5, 0.0, 1.2, -11.1, 1.0));

        let result = search().find_ground_height(&provider, Column::new(0.0, -11.1), 1.5, ObjectCategory::Small);
        assert_abs_diff_eq!(result.height, 1.2, epsilon = 1e-12);
        assert_eq!(result.source, GroundingSource::Surface(SurfaceId(5)));
        assert!(!result.input_unavailable);
        assert_eq!(provider.probe_count(), 1);
    }

    #[test]
    fn test_cross_probe_second_pass() {
        let mut provider = MockTrackingProvider::new(GeodeticPoint::new(37.0, -122.0), 1.5).with_probe_reach(0.1);
        provider.add_surface(plane(8, 0.6, 0.45, 0.0, 0.2));

        let result = search().find_ground_height(&provider, Column::new(0.0, 0.0), 1.5, ObjectCategory::Small);
        assert_eq!(result.source, GroundingSource::CrossProbe(SurfaceId(8)));
        assert_abs_diff_eq!(result.height, 0.45, epsilon = 1e-12);
        assert_eq!(provider.probe_count(), 5);
    }

    #[test]
    fn test_category_defaults_when_empty() {
        let provider = provider();
        let s = search();

        let small = s.find_ground_height(&provider, Column::new(0.0, 0.0), 1.5, ObjectCategory::Small);
        let container = s.find_ground_height(&provider, Column::new(0.0, 0.0), 1.5, ObjectCategory::Container);

        assert_eq!(small.source, GroundingSource::CategoryDefault);
        assert_abs_diff_eq!(small.height, 1.1, epsilon = 1e-12);
        assert_abs_diff_eq!(container.height, 0.1, epsilon = 1e-12);
        assert!(small.height > container.height);
    }

    #[test]
    fn test_provider_failure_is_total() {
        let mut provider = provider();
        provider.add_surface(plane(1, 0.0, 0.0, 0.0, 2.0));
        provider.set_surfaces_available(false);

        let result = search().find_ground_height(&provider, Column::new(0.0, 0.0), 1.5, ObjectCategory::Medium);
        assert_eq!(result.source, GroundingSource::CategoryDefault);
        assert!(result.input_unavailable);
        assert_abs_diff_eq!(result.height, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_probe_origin_offset_moves_ceiling() {
        let config = GroundingConfig {
            probe_origin_offset_m: -1.0,
            ..GroundingConfig::default()
        };
        let hits = vec![plane(1, 0.0, 0.7, 0.0, 1.0), plane(2, 0.0, 0.0, 0.0, 3.0)];
        let selection = SurfaceGroundingSearch::new(config.clone())
            .select(&hits, Column::new(0.0, 0.0), 1.5 + config.probe_origin_offset_m)
            .unwrap();
        assert_eq!(selection.surface().id, SurfaceId(2));
    }
}
