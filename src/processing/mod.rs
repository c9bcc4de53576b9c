//! Discovery progression and guidance

pub mod discovery;
pub mod guidance;
pub mod timer;

pub use discovery::{DiscoveryOutput, DiscoveryState, DiscoveryStateMachine, LockConfidence, PositioningSession, Transition};
pub use guidance::{format_distance, CompassDirection, Guidance};
pub use timer::PeriodicTimer;
