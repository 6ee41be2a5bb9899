use crate::domain::Location;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two WGS84 points, in kilometers.
pub fn haversine_km(a: &Location, b: &Location) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

pub fn haversine_m(a: &Location, b: &Location) -> f64 {
    haversine_km(a, b) * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lng: f64) -> Location {
        Location::new(lat, lng)
    }

    #[test]
    fn zero_on_identical_points() {
        let p = loc(-6.2088, 106.8456);
        assert_eq!(haversine_km(&p, &p), 0.0);
    }

    #[test]
    fn symmetric() {
        let a = loc(-6.2088, 106.8456);
        let b = loc(-6.1751, 106.8650);
        let ab = haversine_km(&a, &b);
        let ba = haversine_km(&b, &a);
        assert!((ab - ba).abs() < 1e-12);
    }

    #[test]
    fn known_distance_across_jakarta() {
        // Monas to Kota Tua is roughly 4.4 km as the crow flies.
        let monas = loc(-6.1754, 106.8272);
        let kota = loc(-6.1376, 106.8129);
        let km = haversine_km(&monas, &kota);
        assert!(km > 4.0 && km < 5.0, "got {km}");
    }

    #[test]
    fn bounded_by_half_earth_circumference() {
        let a = loc(0.0, 0.0);
        let antipode = loc(0.0, 180.0);
        let km = haversine_km(&a, &antipode);
        let half_circumference = std::f64::consts::PI * 6371.0;
        assert!(km <= half_circumference + 1e-6);
        assert!(km > half_circumference - 1.0);
    }

    #[test]
    fn non_negative_everywhere() {
        let samples = [
            (-90.0, -180.0),
            (-45.5, 13.2),
            (0.0, 0.0),
            (37.77, -122.41),
            (90.0, 180.0),
        ];
        for (la, lo) in samples {
            for (lb, lj) in samples {
                let d = haversine_km(&loc(la, lo), &loc(lb, lj));
                assert!(d >= 0.0);
            }
        }
    }
}
