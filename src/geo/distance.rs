const EARTH_RADIUS_KM: f64 = 6371.0;
const KM_PER_MILE: f64 = 1.60934;

/// Great-circle distance between two points on a spherical Earth (haversine).
/// NaN inputs propagate.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

pub fn miles_to_km(miles: f64) -> f64 {
    miles * KM_PER_MILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        for (lat, lon) in [(0.0, 0.0), (40.7128, -74.006), (-33.86, 151.2), (89.9, 179.9)] {
            assert_eq!(distance_km(lat, lon, lat, lon), 0.0);
        }
    }

    #[test]
    fn symmetric() {
        let a = distance_km(40.7128, -74.006, 25.761681, -80.191788);
        let b = distance_km(25.761681, -80.191788, 40.7128, -74.006);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn new_york_to_los_angeles() {
        let d = distance_km(40.7128, -74.006, 34.052235, -118.243683);
        assert!((d - 3936.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn nan_propagates() {
        assert!(distance_km(f64::NAN, 0.0, 1.0, 1.0).is_nan());
    }

    #[test]
    fn mile_conversion() {
        assert!((miles_to_km(50.0) - 80.467).abs() < 1e-9);
        assert!((miles_to_km(100.0) - 160.934).abs() < 1e-9);
    }
}
