//! Physical constants and fixed frame conventions

/// Mean Earth radius in meters (IUGG). Every geodetic computation in the crate
/// uses this single spherical model.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude on the spherical model
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Local frame convention: +x points east
pub const LOCAL_EAST_SIGN: f64 = 1.0;

/// Local frame convention: north maps to -z
pub const LOCAL_NORTH_SIGN: f64 = -1.0;
