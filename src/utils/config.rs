use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::ObjectCategory;

/// Engine-wide configuration.
///
/// Every threshold here was tuned empirically for handheld AR sessions and is
/// not physically derived. Deployments are expected to adjust them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub precision: PrecisionConfig,
    pub grounding: GroundingConfig,
    pub stabilization: StabilizationConfig,
    pub discovery: DiscoveryConfig,
    pub diagnostics: DiagnosticsConfig,
}

/// Thresholds for choosing between cached local offsets and geodetic projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionConfig {
    /// Maximum distance between a record's origin and the live session origin
    /// for the record to count as captured in the same session (meters)
    pub origin_match_threshold_m: f64,
    /// User must be within this distance of the object for the cache to be considered (meters)
    pub cached_proximity_m: f64,
    /// Cached offsets longer than this are considered drifted (meters)
    pub max_cached_offset_m: f64,
}

/// Surface grounding search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingConfig {
    /// Probe origin height relative to the camera (meters)
    pub probe_origin_offset_m: f64,
    /// Hits must lie at least this far below the probe origin (meters)
    pub ceiling_margin_m: f64,
    /// Horizontal tolerance between the column and a surface footprint (meters)
    pub column_tolerance_m: f64,
    /// Offset of the cross-pattern probes used by the second pass (meters)
    pub fallback_probe_offset_m: f64,
    /// Default resting height relative to the camera, per category (meters)
    pub small_default_offset_m: f64,
    pub medium_default_offset_m: f64,
    pub container_default_offset_m: f64,
}

/// Multi-surface stabilization parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizationConfig {
    /// Radius around the object center searched for anchoring surfaces (meters)
    pub search_radius_m: f64,
    /// Tolerance applied to every derived constraint (meters)
    pub constraint_tolerance_m: f64,
    /// Cap on anchoring surfaces, also the normalizer for the count score
    pub max_anchor_surfaces: usize,
    /// Stability score assigned to single-surface anchors
    pub single_anchor_score: f64,
    pub weight_surface_count: f64,
    pub weight_surface_quality: f64,
    pub weight_constraint_density: f64,
    /// Surface area that scores full quality (square meters)
    pub reference_area_m2: f64,
    /// Drift above which a correction is applied (meters)
    pub correction_threshold_m: f64,
    /// Fraction of each violation applied per tick
    pub correction_gain: f64,
    /// Hard per-tick cap on the applied translation (meters)
    pub max_correction_per_tick_m: f64,
    /// Monitor period (milliseconds)
    pub monitor_interval_ms: u64,
}

/// Discovery state machine parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Coarse guidance recomputation period (milliseconds)
    pub guidance_interval_ms: u64,
    /// Distance under which fine positioning becomes possible (meters)
    pub proximity_threshold_m: f64,
    /// Consecutive stable monitor samples needed to lock in
    pub required_stable_samples: u32,
    /// Hard cap on time spent in local grounding (milliseconds)
    pub grounding_timeout_ms: u64,
    /// Minimum confidence of a trigger's observed position to lock immediately
    pub high_confidence_threshold: f64,
    pub accuracy_high_m: f64,
    pub accuracy_stable_m: f64,
    pub accuracy_reduced_m: f64,
    /// How long a locked session is retained before it expires (milliseconds)
    pub lock_retention_ms: u64,
}

/// Diagnostic reporting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    pub max_history_size: usize,
    /// Publish diagnostics on the event channels in addition to logging them
    pub publish_events: bool,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            origin_match_threshold_m: 1.0,
            cached_proximity_m: 20.0,
            max_cached_offset_m: 50.0,
        }
    }
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            probe_origin_offset_m: 0.0,
            ceiling_margin_m: 0.05,
            column_tolerance_m: 0.5,
            fallback_probe_offset_m: 0.5,
            small_default_offset_m: -0.4,
            medium_default_offset_m: -0.9,
            container_default_offset_m: -1.4,
        }
    }
}

impl GroundingConfig {
    /// Default height offset below the camera for an object category
    pub fn default_offset(&self, category: ObjectCategory) -> f64 {
        match category {
            ObjectCategory::Small => self.small_default_offset_m,
            ObjectCategory::Medium => self.medium_default_offset_m,
            ObjectCategory::Container => self.container_default_offset_m,
        }
    }
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            search_radius_m: 1.5,
            constraint_tolerance_m: 0.02,
            max_anchor_surfaces: 4,
            single_anchor_score: 0.3,
            weight_surface_count: 0.4,
            weight_surface_quality: 0.4,
            weight_constraint_density: 0.2,
            reference_area_m2: 1.0,
            correction_threshold_m: 0.02,
            correction_gain: 0.08,
            max_correction_per_tick_m: 0.01,
            monitor_interval_ms: 1000,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            guidance_interval_ms: 2000,
            proximity_threshold_m: 10.0,
            required_stable_samples: 3,
            grounding_timeout_ms: 10_000,
            high_confidence_threshold: 0.9,
            accuracy_high_m: 0.05,
            accuracy_stable_m: 0.10,
            accuracy_reduced_m: 0.50,
            lock_retention_ms: 60_000,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            max_history_size: 256,
            publish_events: true,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("I/O error: {message}")]
    Io { message: String },
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl ConfigError {
    fn invalid(parameter: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// First error, if any
    pub fn into_result(self) -> Result<(), ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(content).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate().into_result()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        Self::from_json_str(&content)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialization {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(&path, content).map_err(|e| ConfigError::Io {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// Validate all sections
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let p = &self.precision;
        if p.origin_match_threshold_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "precision.origin_match_threshold_m",
                p.origin_match_threshold_m,
                "Origin match threshold must be positive",
            ));
        } else if p.origin_match_threshold_m > 5.0 {
            warnings.push("Origin match threshold above 5 m accepts offsets from unrelated sessions".to_string());
        }
        if p.cached_proximity_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "precision.cached_proximity_m",
                p.cached_proximity_m,
                "Cached proximity must be positive",
            ));
        }
        if p.max_cached_offset_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "precision.max_cached_offset_m",
                p.max_cached_offset_m,
                "Maximum cached offset must be positive",
            ));
        }

        let g = &self.grounding;
        if g.ceiling_margin_m < 0.0 {
            errors.push(ConfigError::invalid(
                "grounding.ceiling_margin_m",
                g.ceiling_margin_m,
                "Ceiling margin cannot be negative",
            ));
        }
        if g.column_tolerance_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "grounding.column_tolerance_m",
                g.column_tolerance_m,
                "Column tolerance must be positive",
            ));
        }
        if g.fallback_probe_offset_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "grounding.fallback_probe_offset_m",
                g.fallback_probe_offset_m,
                "Fallback probe offset must be positive",
            ));
        }
        for (name, offset) in [
            ("grounding.small_default_offset_m", g.small_default_offset_m),
            ("grounding.medium_default_offset_m", g.medium_default_offset_m),
            ("grounding.container_default_offset_m", g.container_default_offset_m),
        ] {
            if offset > 0.0 {
                warnings.push(format!("{} places objects above the camera", name));
            }
        }

        let s = &self.stabilization;
        if s.constraint_tolerance_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "stabilization.constraint_tolerance_m",
                s.constraint_tolerance_m,
                "Constraint tolerance must be positive",
            ));
        }
        if s.search_radius_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "stabilization.search_radius_m",
                s.search_radius_m,
                "Search radius must be positive",
            ));
        }
        if s.max_anchor_surfaces < 2 {
            errors.push(ConfigError::invalid(
                "stabilization.max_anchor_surfaces",
                s.max_anchor_surfaces,
                "At least 2 surfaces are needed to build constraints",
            ));
        }
        if !(0.0..=1.0).contains(&s.single_anchor_score) {
            errors.push(ConfigError::invalid(
                "stabilization.single_anchor_score",
                s.single_anchor_score,
                "Score must be within [0, 1]",
            ));
        }
        let weight_sum = s.weight_surface_count + s.weight_surface_quality + s.weight_constraint_density;
        if (weight_sum - 1.0).abs() > 1e-9
            || s.weight_surface_count < 0.0
            || s.weight_surface_quality < 0.0
            || s.weight_constraint_density < 0.0
        {
            errors.push(ConfigError::invalid(
                "stabilization.weights",
                weight_sum,
                "Stability weights must be non-negative and sum to 1",
            ));
        }
        if s.reference_area_m2 <= 0.0 {
            errors.push(ConfigError::invalid(
                "stabilization.reference_area_m2",
                s.reference_area_m2,
                "Reference area must be positive",
            ));
        }
        if s.correction_gain <= 0.0 || s.correction_gain > 1.0 {
            errors.push(ConfigError::invalid(
                "stabilization.correction_gain",
                s.correction_gain,
                "Correction gain must be within (0, 1]",
            ));
        } else if s.correction_gain > 0.2 {
            warnings.push("Correction gain above 0.2 may visibly jitter anchored objects".to_string());
        }
        if s.max_correction_per_tick_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "stabilization.max_correction_per_tick_m",
                s.max_correction_per_tick_m,
                "Per-tick correction cap must be positive",
            ));
        }
        if s.monitor_interval_ms == 0 {
            errors.push(ConfigError::invalid(
                "stabilization.monitor_interval_ms",
                s.monitor_interval_ms,
                "Monitor interval must be positive",
            ));
        }

        let d = &self.discovery;
        if d.guidance_interval_ms == 0 {
            errors.push(ConfigError::invalid(
                "discovery.guidance_interval_ms",
                d.guidance_interval_ms,
                "Guidance interval must be positive",
            ));
        }
        if d.proximity_threshold_m <= 0.0 {
            errors.push(ConfigError::invalid(
                "discovery.proximity_threshold_m",
                d.proximity_threshold_m,
                "Proximity threshold must be positive",
            ));
        }
        if d.required_stable_samples == 0 {
            errors.push(ConfigError::invalid(
                "discovery.required_stable_samples",
                d.required_stable_samples,
                "At least one stable sample is required",
            ));
        }
        if d.grounding_timeout_ms == 0 {
            errors.push(ConfigError::invalid(
                "discovery.grounding_timeout_ms",
                d.grounding_timeout_ms,
                "Grounding timeout must be positive",
            ));
        } else if d.grounding_timeout_ms
            < u64::from(d.required_stable_samples) * self.stabilization.monitor_interval_ms
        {
            warnings.push("Grounding timeout expires before enough stable samples can be collected".to_string());
        }
        if !(0.0..=1.0).contains(&d.high_confidence_threshold) {
            errors.push(ConfigError::invalid(
                "discovery.high_confidence_threshold",
                d.high_confidence_threshold,
                "Confidence threshold must be within [0, 1]",
            ));
        }
        if !(d.accuracy_high_m <= d.accuracy_stable_m && d.accuracy_stable_m <= d.accuracy_reduced_m) {
            warnings.push("Declared accuracies are not ordered high <= stable <= reduced".to_string());
        }

        if self.diagnostics.max_history_size == 0 {
            warnings.push("Diagnostic history disabled".to_string());
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}
