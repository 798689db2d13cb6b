/// Mean Earth radius in kilometers. Fixed so distance computations are
/// reproducible across builds.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points given in decimal degrees,
/// via the haversine formula.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Distance between two optional coordinate pairs. Either side missing
/// means the parties are undiscoverable by distance: infinity, so they
/// rank after every located pair.
pub fn distance_km(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> f64 {
    match (a, b) {
        (Some((lat1, lon1)), Some((lat2, lon2))) => haversine_km(lat1, lon1, lat2, lon2),
        _ => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(haversine_km(48.8566, 2.3522, 48.8566, 2.3522), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let there = haversine_km(40.7128, -74.0060, 51.5074, -0.1278);
        let back = haversine_km(51.5074, -0.1278, 40.7128, -74.0060);
        assert_eq!(there, back);
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        // 6371 * pi / 180 ~ 111.195 km
        let d = haversine_km(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111.195).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn missing_coordinates_yield_infinity() {
        assert_eq!(distance_km(None, Some((0.0, 0.0))), f64::INFINITY);
        assert_eq!(distance_km(Some((0.0, 0.0)), None), f64::INFINITY);
        assert_eq!(distance_km(None, None), f64::INFINITY);
    }

    #[test]
    fn located_pair_is_finite() {
        let d = distance_km(Some((0.0, 0.0)), Some((0.0, 1.0)));
        assert!(d.is_finite());
        assert!(d > 0.0);
    }
}
