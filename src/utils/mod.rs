//! Configuration utilities

pub mod config;

pub use config::{
    ConfigError, DiagnosticsConfig, DiscoveryConfig, EngineConfig, GroundingConfig, PrecisionConfig,
    StabilizationConfig, ValidationResult,
};
