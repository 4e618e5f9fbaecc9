//! Spherical geometry used to scope the OpenSky query and filter results.

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A lat/lon rectangle in degrees, used to parameterize the remote
/// states query (`lamin`/`lamax`/`lomin`/`lomax`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

/// Computes the bounding box around a center point for a given radius.
///
/// The corners are the geodesic destinations at bearings 225° (SW) and
/// 45° (NE), traveling `radius_km` from the center, i.e. a square rotated
/// onto its diagonal with half-diagonal `radius_km`. This is deliberately
/// an approximate widening box for the remote query, not a minimal
/// axis-aligned enclosure; callers do precise clipping with
/// [`is_within_radius`] afterwards.
pub fn bounding_box(center_lat: f64, center_lon: f64, radius_km: f64) -> BoundingBox {
    let (lat_min, lon_min) = destination(center_lat, center_lon, 225.0, radius_km);
    let (lat_max, lon_max) = destination(center_lat, center_lon, 45.0, radius_km);

    BoundingBox {
        lat_min,
        lat_max,
        lon_min,
        lon_max,
    }
}

/// Spherical direct geodesic: destination point after traveling
/// `distance_km` from `(lat, lon)` along `bearing_deg`.
fn destination(lat: f64, lon: f64, bearing_deg: f64, distance_km: f64) -> (f64, f64) {
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();
    let bearing = bearing_deg.to_radians();
    let angular = distance_km / EARTH_RADIUS_KM;

    let dest_lat = (lat_rad.sin() * angular.cos()
        + lat_rad.cos() * angular.sin() * bearing.cos())
    .asin();
    let dest_lon = lon_rad
        + (bearing.sin() * angular.sin() * lat_rad.cos())
            .atan2(angular.cos() - lat_rad.sin() * dest_lat.sin());

    (dest_lat.to_degrees(), dest_lon.to_degrees())
}

/// Great-circle distance in kilometers between two points given in degrees.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();

    let a = (d_lat / 2.0).sin() * (d_lat / 2.0).sin()
        + (d_lon / 2.0).sin() * (d_lon / 2.0).sin() * lat1.cos() * lat2.cos();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Whether `(lat, lon)` lies within `radius_km` of the reference point.
/// Boundary inclusive.
pub fn is_within_radius(lat: f64, lon: f64, ref_lat: f64, ref_lon: f64, radius_km: f64) -> bool {
    haversine_km(lat, lon, ref_lat, ref_lon) <= radius_km
}

#[cfg(test)]
mod tests {
    use super::*;

    const EFHK_LAT: f64 = 60.3172;
    const EFHK_LON: f64 = 24.9633;

    #[test]
    fn test_haversine_zero_for_identical_points() {
        assert_eq!(haversine_km(EFHK_LAT, EFHK_LON, EFHK_LAT, EFHK_LON), 0.0);
        assert_eq!(haversine_km(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(haversine_km(-45.0, 170.0, -45.0, 170.0), 0.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let d1 = haversine_km(EFHK_LAT, EFHK_LON, 60.25, 24.75);
        let d2 = haversine_km(60.25, 24.75, EFHK_LAT, EFHK_LON);
        assert!((d1 - d2).abs() < 1e-12);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Helsinki (60.1699, 24.9384) to Tallinn (59.4370, 24.7536) is
        // roughly 82 km across the gulf.
        let d = haversine_km(60.1699, 24.9384, 59.4370, 24.7536);
        assert!((d - 82.0).abs() < 2.0, "got {d}");
    }

    #[test]
    fn test_bounding_box_corners_at_radius() {
        let radius = 50.0;
        let bbox = bounding_box(EFHK_LAT, EFHK_LON, radius);

        let d_sw = haversine_km(EFHK_LAT, EFHK_LON, bbox.lat_min, bbox.lon_min);
        let d_ne = haversine_km(EFHK_LAT, EFHK_LON, bbox.lat_max, bbox.lon_max);

        assert!((d_sw - radius).abs() < 1e-6, "SW corner at {d_sw} km");
        assert!((d_ne - radius).abs() < 1e-6, "NE corner at {d_ne} km");
    }

    #[test]
    fn test_bounding_box_ordering() {
        let bbox = bounding_box(EFHK_LAT, EFHK_LON, 50.0);
        assert!(bbox.lat_min < EFHK_LAT && EFHK_LAT < bbox.lat_max);
        assert!(bbox.lon_min < EFHK_LON && EFHK_LON < bbox.lon_max);
    }

    #[test]
    fn test_is_within_radius_boundary_inclusive() {
        assert!(is_within_radius(EFHK_LAT, EFHK_LON, EFHK_LAT, EFHK_LON, 0.0));
        assert!(is_within_radius(60.25, 24.75, EFHK_LAT, EFHK_LON, 50.0));
        assert!(!is_within_radius(59.4370, 24.7536, 60.1699, 24.9384, 50.0));
    }
}
