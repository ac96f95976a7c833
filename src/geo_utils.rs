//! Geographic utilities.
//!
//! Thin wrapper over the `geo` crate's haversine metric so the rest of the
//! crate deals in plain latitude/longitude pairs and kilometers.

use geo::{Distance, Haversine, Point};

/// Great-circle distance between two (lat, lon) coordinates in kilometers,
/// on a spherical earth (haversine formula).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    // geo points are (x, y) = (lon, lat); distance comes back in meters.
    Haversine::distance(Point::new(lon1, lat1), Point::new(lon2, lat2)) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        assert_eq!(haversine_km(39.9847, 116.3184, 39.9847, 116.3184), 0.0);
    }

    #[test]
    fn test_known_distance() {
        // London to Paris, roughly 343 km.
        let d = haversine_km(51.5074, -0.1278, 48.8566, 2.3522);
        assert!(d > 330.0 && d < 350.0, "got {}", d);
    }

    #[test]
    fn test_symmetric() {
        let a = haversine_km(39.9847, 116.3184, 40.0100, 116.3300);
        let b = haversine_km(40.0100, 116.3300, 39.9847, 116.3184);
        assert!((a - b).abs() < 1e-12);
    }
}
