//! Geodetic <-> local tangent plane conversion on a spherical Earth
//!
//! All distances use the haversine formula and all projections use the
//! matching great-circle destination formula, so the forward and inverse
//! transforms agree to floating point precision. No ellipsoidal formula may be
//! mixed in anywhere else in the crate.
//!
//! Local frame convention (shared by every consumer in the crate):
//! - x = east
//! - y = up (altitude delta, 0 when either altitude is unknown)
//! - z = -north

use crate::core::{GeodeticPoint, LocalPosition, EARTH_RADIUS_M, LOCAL_EAST_SIGN, LOCAL_NORTH_SIGN};

/// Signed north/east offset in meters on the tangent plane
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TangentOffset {
    pub north_m: f64,
    pub east_m: f64,
}

impl TangentOffset {
    pub fn distance_m(&self) -> f64 {
        self.north_m.hypot(self.east_m)
    }

    /// Bearing in degrees clockwise from north, in [0, 360)
    pub fn bearing_deg(&self) -> f64 {
        normalize_bearing(self.east_m.atan2(self.north_m).to_degrees())
    }

    /// Map into the local frame convention at the given height
    pub fn to_vector(&self, up_m: f64) -> LocalPosition {
        LocalPosition::new(LOCAL_EAST_SIGN * self.east_m, up_m, LOCAL_NORTH_SIGN * self.north_m)
    }

    /// Inverse of [`TangentOffset::to_vector`], ignoring height
    pub fn from_vector(local: &LocalPosition) -> Self {
        Self {
            north_m: local.z / LOCAL_NORTH_SIGN,
            east_m: local.x / LOCAL_EAST_SIGN,
        }
    }
}

/// Great-circle distance in meters
pub fn distance_m(from: &GeodeticPoint, to: &GeodeticPoint) -> f64 {
    let lat1 = from.latitude_deg.to_radians();
    let lat2 = to.latitude_deg.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (to.longitude_deg - from.longitude_deg).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing in degrees clockwise from north, in [0, 360)
pub fn bearing_deg(from: &GeodeticPoint, to: &GeodeticPoint) -> f64 {
    let lat1 = from.latitude_deg.to_radians();
    let lat2 = to.latitude_deg.to_radians();
    let dlon = (to.longitude_deg - from.longitude_deg).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

    normalize_bearing(y.atan2(x).to_degrees())
}

/// Decompose the great-circle path from `origin` to `target` into north/east meters
pub fn to_local(origin: &GeodeticPoint, target: &GeodeticPoint) -> TangentOffset {
    let distance = distance_m(origin, target);
    if distance == 0.0 {
        return TangentOffset::default();
    }

    let bearing = bearing_deg(origin, target).to_radians();
    TangentOffset {
        north_m: distance * bearing.cos(),
        east_m: distance * bearing.sin(),
    }
}

/// Project `target` into the local frame anchored at `origin`
pub fn to_local_vector(origin: &GeodeticPoint, target: &GeodeticPoint) -> LocalPosition {
    let up = match (origin.altitude_m, target.altitude_m) {
        (Some(a), Some(b)) => b - a,
        _ => 0.0,
    };
    to_local(origin, target).to_vector(up)
}

/// Inverse projection: the point reached from `origin` by the given offset
pub fn from_local(origin: &GeodeticPoint, offset: &TangentOffset) -> GeodeticPoint {
    let distance = offset.distance_m();
    if distance == 0.0 {
        return *origin;
    }

    let angular = distance / EARTH_RADIUS_M;
    let bearing = offset.east_m.atan2(offset.north_m);
    let lat1 = origin.latitude_deg.to_radians();
    let lon1 = origin.longitude_deg.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    GeodeticPoint {
        latitude_deg: lat2.to_degrees(),
        longitude_deg: normalize_longitude(lon2.to_degrees()),
        altitude_m: origin.altitude_m,
    }
}

/// Geodetic point of a local-frame vector
pub fn local_to_geodetic(origin: &GeodeticPoint, local: &LocalPosition) -> GeodeticPoint {
    let mut point = from_local(origin, &TangentOffset::from_vector(local));
    point.altitude_m = origin.altitude_m.map(|alt| alt + local.y);
    point
}

fn normalize_bearing(bearing: f64) -> f64 {
    let b = bearing.rem_euclid(360.0);
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

fn normalize_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Coordinate validation utilities
pub struct CoordinateValidator;

impl CoordinateValidator {
    /// Validate geodetic ranges and reject non-finite values
    pub fn validate_geodetic(point: &GeodeticPoint) -> Result<(), &'static str> {
        if !point.latitude_deg.is_finite() || !point.longitude_deg.is_finite() {
            return Err("Non-finite geodetic coordinate");
        }

        if point.latitude_deg < -90.0 || point.latitude_deg > 90.0 {
            return Err("Invalid latitude: must be between -90 and 90 degrees");
        }

        if point.longitude_deg < -180.0 || point.longitude_deg > 180.0 {
            return Err("Invalid longitude: must be between -180 and 180 degrees");
        }

        if let Some(alt) = point.altitude_m {
            if !alt.is_finite() {
                return Err("Non-finite altitude");
            }
        }

        Ok(())
    }

    /// Validate a local vector
    pub fn validate_local(local: &LocalPosition) -> Result<(), &'static str> {
        if local.iter().all(|c| c.is_finite()) {
            Ok(())
        } else {
            Err("Non-finite local coordinate")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_eleven_meters_north() {
        let user = GeodeticPoint::new(37.0000, -122.0000);
        let target = GeodeticPoint::new(37.0001, -122.0000);

        let offset = to_local(&user, &target);
        assert_abs_diff_eq!(offset.north_m, 11.1, epsilon = 0.1);
        assert_abs_diff_eq!(offset.east_m, 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_local_vector_convention() {
        let origin = GeodeticPoint::new(37.0, -122.0);
        let north = GeodeticPoint::new(37.0001, -122.0);
        let east = GeodeticPoint::new(37.0, -121.9999);

        let v_north = to_local_vector(&origin, &north);
        assert!(v_north.z < -11.0);
        assert_abs_diff_eq!(v_north.x, 0.0, epsilon = 1e-6);

        let v_east = to_local_vector(&origin, &east);
        assert!(v_east.x > 8.0);
        assert_abs_diff_eq!(v_east.z, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_zero_distance_is_zero_vector() {
        let p = GeodeticPoint::new(51.5, -0.12);
        let v = to_local_vector(&p, &p);
        assert_eq!(v, LocalPosition::zeros());
        assert_eq!(to_local(&p, &p), TangentOffset::default());
    }

    #[test]
    fn test_altitude_delta_maps_to_up() {
        let origin = GeodeticPoint::new(10.0, 10.0).with_altitude(100.0);
        let target = GeodeticPoint::new(10.0, 10.0).with_altitude(102.5);
        assert_abs_diff_eq!(to_local_vector(&origin, &target).y, 2.5, epsilon = 1e-9);

        let no_alt = GeodeticPoint::new(10.0, 10.0);
        assert_eq!(to_local_vector(&origin, &no_alt).y, 0.0);
    }

    #[test]
    fn test_round_trip_within_epsilon() {
        let pairs = [
            (GeodeticPoint::new(37.0, -122.0), GeodeticPoint::new(37.0001, -122.0)),
            (GeodeticPoint::new(-33.8688, 151.2093), GeodeticPoint::new(-33.8601, 151.2201)),
            (GeodeticPoint::new(64.1466, -21.9426), GeodeticPoint::new(64.1, -22.05)),
            (GeodeticPoint::new(0.0, 179.9995), GeodeticPoint::new(0.0005, -179.9995)),
            (GeodeticPoint::new(1.0, 2.0), GeodeticPoint::new(1.5, 2.5)),
        ];

        for (origin, target) in pairs {
            let offset = to_local(&origin, &target);
            let back = from_local(&origin, &offset);
            assert_abs_diff_eq!(back.latitude_deg, target.latitude_deg, epsilon = 1e-6);
            assert_abs_diff_eq!(back.longitude_deg, target.longitude_deg, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_local_to_geodetic_inverts_vector() {
        let origin = GeodeticPoint::new(48.8584, 2.2945).with_altitude(35.0);
        let local = LocalPosition::new(12.0, 1.5, -30.0);

        let point = local_to_geodetic(&origin, &local);
        let back = to_local_vector(&origin, &point);
        assert_abs_diff_eq!(back.x, local.x, epsilon = 1e-6);
        assert_abs_diff_eq!(back.y, local.y, epsilon = 1e-9);
        assert_abs_diff_eq!(back.z, local.z, epsilon = 1e-6);
    }

    #[test]
    fn test_bearing_quadrants() {
        let origin = GeodeticPoint::new(0.0, 0.0);
        assert_abs_diff_eq!(bearing_deg(&origin, &GeodeticPoint::new(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing_deg(&origin, &GeodeticPoint::new(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing_deg(&origin, &GeodeticPoint::new(-1.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing_deg(&origin, &GeodeticPoint::new(0.0, -1.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tangent_offset_bearing_matches_geodetic() {
        let origin = GeodeticPoint::new(37.0, -122.0);
        let target = GeodeticPoint::new(37.0003, -121.9996);
        let offset = to_local(&origin, &target);
        assert_abs_diff_eq!(offset.bearing_deg(), bearing_deg(&origin, &target), epsilon = 1e-9);
        assert_abs_diff_eq!(offset.distance_m(), distance_m(&origin, &target), epsilon = 1e-9);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance_m(&GeodeticPoint::new(10.0, 5.0), &GeodeticPoint::new(11.0, 5.0));
        assert_abs_diff_eq!(d, crate::core::METERS_PER_DEGREE, epsilon = 1e-6);
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(CoordinateValidator::validate_geodetic(&GeodeticPoint::new(37.7749, -122.4194)).is_ok());
        assert!(CoordinateValidator::validate_geodetic(&GeodeticPoint::new(91.0, 0.0)).is_err());
        assert!(CoordinateValidator::validate_geodetic(&GeodeticPoint::new(0.0, f64::NAN)).is_err());
        assert!(CoordinateValidator::validate_local(&LocalPosition::new(0.0, f64::INFINITY, 0.0)).is_err());
    }
}
