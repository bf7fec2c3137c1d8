//! Great-circle distance and bearing on a spherical Earth.

use crate::model::Coordinate;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two coordinates in kilometres.
#[must_use]
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);

    // rounding can push h fractionally outside [0, 1] near antipodes
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Initial compass bearing from `a` towards `b`, in `[0, 360)` degrees.
#[must_use]
pub fn bearing_degrees(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let x = delta_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();

    normalize_degrees(x.atan2(y).to_degrees())
}

/// Wraps any finite angle into `[0, 360)`.
#[must_use]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MILAN: Coordinate = Coordinate { latitude: 45.4642, longitude: 9.1900 };
    const ROME: Coordinate = Coordinate { latitude: 41.9028, longitude: 12.4964 };
    const AUCKLAND: Coordinate = Coordinate { latitude: -36.8485, longitude: 174.7633 };

    #[test]
    fn identical_points() {
        assert!(distance_km(MILAN, MILAN).abs() < f64::EPSILON);
    }

    #[test]
    fn milan_to_rome() {
        let d = distance_km(MILAN, ROME);
        assert!((d - 477.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn symmetric() {
        let ab = distance_km(MILAN, AUCKLAND);
        let ba = distance_km(AUCKLAND, MILAN);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn triangle_inequality() {
        let points = [
            MILAN,
            ROME,
            AUCKLAND,
            Coordinate { latitude: 0.0, longitude: 0.0 },
            Coordinate { latitude: 89.9, longitude: -179.9 },
        ];
        for a in points {
            for b in points {
                for c in points {
                    let direct = distance_km(a, c);
                    let via = distance_km(a, b) + distance_km(b, c);
                    assert!(direct <= via + 1e-6, "{a} -> {b} -> {c}");
                }
            }
        }
    }

    #[test]
    fn antipodal_is_half_circumference() {
        let a = Coordinate { latitude: 0.0, longitude: 0.0 };
        let b = Coordinate { latitude: 0.0, longitude: 180.0 };
        let d = distance_km(a, b);
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn cardinal_bearings() {
        let origin = Coordinate { latitude: 0.0, longitude: 0.0 };
        let north = Coordinate { latitude: 1.0, longitude: 0.0 };
        let east = Coordinate { latitude: 0.0, longitude: 1.0 };
        let south = Coordinate { latitude: -1.0, longitude: 0.0 };
        let west = Coordinate { latitude: 0.0, longitude: -1.0 };

        assert!(bearing_degrees(origin, north).abs() < 1e-9);
        assert!((bearing_degrees(origin, east) - 90.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, south) - 180.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, west) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn bearing_in_range() {
        let points = [MILAN, ROME, AUCKLAND, Coordinate { latitude: -89.0, longitude: 179.0 }];
        for a in points {
            for b in points {
                let bearing = bearing_degrees(a, b);
                assert!((0.0..360.0).contains(&bearing), "{bearing}");
            }
        }
    }

    #[test]
    fn normalize() {
        assert!((normalize_degrees(-90.0) - 270.0).abs() < 1e-9);
        assert!((normalize_degrees(720.0)).abs() < 1e-9);
        assert!((0.0..360.0).contains(&normalize_degrees(-1e-18)));
    }
}
