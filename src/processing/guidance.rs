//! Human-readable guidance toward an object

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::PrecisionTier;
use crate::processing::discovery::DiscoveryState;

/// 8-point compass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompassDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl CompassDirection {
    /// Nearest compass point to a bearing in degrees clockwise from north
    pub fn from_bearing(bearing_deg: f64) -> Self {
        if !bearing_deg.is_finite() {
            return CompassDirection::North;
        }
        let sector = ((bearing_deg.rem_euclid(360.0) + 22.5) / 45.0).floor() as u32 % 8;
        match sector {
            0 => CompassDirection::North,
            1 => CompassDirection::NorthEast,
            2 => CompassDirection::East,
            3 => CompassDirection::SouthEast,
            4 => CompassDirection::South,
            5 => CompassDirection::SouthWest,
            6 => CompassDirection::West,
            _ => CompassDirection::NorthWest,
        }
    }

    pub fn abbreviation(&self) -> &'static str {
        match self {
            CompassDirection::North => "N",
            CompassDirection::NorthEast => "NE",
            CompassDirection::East => "E",
            CompassDirection::SouthEast => "SE",
            CompassDirection::South => "S",
            CompassDirection::SouthWest => "SW",
            CompassDirection::West => "W",
            CompassDirection::NorthWest => "NW",
        }
    }
}

impl fmt::Display for CompassDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompassDirection::North => "north",
            CompassDirection::NorthEast => "northeast",
            CompassDirection::East => "east",
            CompassDirection::SouthEast => "southeast",
            CompassDirection::South => "south",
            CompassDirection::SouthWest => "southwest",
            CompassDirection::West => "west",
            CompassDirection::NorthWest => "northwest",
        };
        f.write_str(name)
    }
}

/// Format a distance for display: whole meters below 1 km, one decimal above
pub fn format_distance(distance_m: f64) -> String {
    if !distance_m.is_finite() || distance_m < 0.0 {
        return "unknown distance".to_string();
    }
    if distance_m < 1.0 {
        "less than 1 m".to_string()
    } else if distance_m < 999.5 {
        format!("{:.0} m", distance_m)
    } else {
        format!("{:.1} km", distance_m / 1000.0)
    }
}

/// Guidance snapshot delivered to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guidance {
    pub state: DiscoveryState,
    pub tier: PrecisionTier,
    pub distance_m: f64,
    pub bearing_deg: f64,
    pub direction: CompassDirection,
    pub instruction: String,
}

impl Guidance {
    pub fn new(state: DiscoveryState, distance_m: f64, bearing_deg: f64) -> Self {
        let direction = CompassDirection::from_bearing(bearing_deg);
        Self {
            state,
            tier: state.tier(),
            distance_m,
            bearing_deg,
            direction,
            instruction: instruction(state, distance_m, direction),
        }
    }
}

/// Per-state instruction text
pub fn instruction(state: DiscoveryState, distance_m: f64, direction: CompassDirection) -> String {
    match state {
        DiscoveryState::CoarseGuidance => {
            format!("Walk {} {}", format_distance(distance_m), direction)
        }
        DiscoveryState::ProximityDiscovery => "You are close, look around".to_string(),
        DiscoveryState::LocalGrounding => "Hold steady while the object settles".to_string(),
        DiscoveryState::LockedIn => "Found it".to_string(),
    }
}
