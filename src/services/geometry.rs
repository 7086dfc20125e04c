//! Geometry predicates for fence containment
//!
//! Circles use haversine distance. Polygons use an even-odd ray cast over the
//! raw (lat, lng) pairs treated as planar coordinates (x = lng, y = lat). The
//! planar test is kept as-is; switching to a spherical test would move points
//! near long edges across the boundary.
//!
//! Boundary tie-break: for an axis-aligned ring, points on the min-lat or
//! min-lng edge count as inside, points on the max-lat or max-lng edge count
//! as outside.

use crate::domain::types::GeoPoint;

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine great-circle distance in metres
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng * 0.5).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[inline]
pub fn in_circle(point: GeoPoint, center: GeoPoint, radius_m: f64) -> bool {
    distance_meters(point, center) <= radius_m
}

/// Even-odd ray cast; rings with fewer than 3 vertices contain nothing
pub fn in_polygon(point: GeoPoint, ring: &[GeoPoint]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let (x, y) = (point.lng, point.lat);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].lng, ring[i].lat);
        let (xj, yj) = (ring[j].lng, ring[j].lat);

        // yi != yj whenever the first clause holds, so the division is safe
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng)
    }

    fn square() -> Vec<GeoPoint> {
        vec![p(0.0, 0.0), p(0.0, 10.0), p(10.0, 10.0), p(10.0, 0.0)]
    }

    #[test]
    fn test_distance_zero() {
        let a = p(31.2304, 121.4737);
        assert_eq!(distance_meters(a, a), 0.0);
    }

    #[test]
    fn test_distance_one_millidegree_north() {
        let d = distance_meters(p(31.2304, 121.4737), p(31.2314, 121.4737));
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn test_distance_symmetric() {
        let a = p(31.2304, 121.4737);
        let b = p(31.25, 121.5);
        assert!((distance_meters(a, b) - distance_meters(b, a)).abs() < 1e-9);
    }

    #[test]
    fn test_circle_scenario() {
        let center = p(31.2304, 121.4737);
        assert!(in_circle(center, center, 50.0));
        assert!(!in_circle(p(31.2314, 121.4737), center, 50.0));
        assert!(in_circle(p(31.2314, 121.4737), center, 120.0));
    }

    #[test]
    fn test_zero_radius_contains_only_center() {
        let center = p(1.0, 1.0);
        assert!(in_circle(center, center, 0.0));
        assert!(!in_circle(p(1.00001, 1.0), center, 0.0));
    }

    #[test]
    fn test_polygon_scenario() {
        let ring = square();
        assert!(in_polygon(p(5.0, 5.0), &ring));
        assert!(!in_polygon(p(15.0, 5.0), &ring));
        assert!(!in_polygon(p(5.0, -1.0), &ring));
    }

    #[test]
    fn test_polygon_edge_tie_break() {
        let ring = square();
        // min-lat and min-lng edges are inside
        assert!(in_polygon(p(0.0, 5.0), &ring));
        assert!(in_polygon(p(5.0, 0.0), &ring));
        // max-lat and max-lng edges are outside
        assert!(!in_polygon(p(10.0, 5.0), &ring));
        assert!(!in_polygon(p(5.0, 10.0), &ring));
    }

    #[test]
    fn test_polygon_vertex_order_irrelevant() {
        let mut ring = square();
        ring.reverse();
        assert!(in_polygon(p(5.0, 5.0), &ring));
        assert!(!in_polygon(p(15.0, 5.0), &ring));
    }

    #[test]
    fn test_concave_polygon() {
        // U shape opening north
        let ring = vec![
            p(0.0, 0.0),
            p(0.0, 9.0),
            p(9.0, 9.0),
            p(9.0, 6.0),
            p(3.0, 6.0),
            p(3.0, 3.0),
            p(9.0, 3.0),
            p(9.0, 0.0),
        ];
        assert!(in_polygon(p(5.0, 1.5), &ring));
        assert!(!in_polygon(p(5.0, 4.5), &ring));
        assert!(in_polygon(p(1.5, 4.5), &ring));
    }

    #[test]
    fn test_degenerate_rings() {
        assert!(!in_polygon(p(0.0, 0.0), &[]));
        assert!(!in_polygon(p(0.0, 0.0), &[p(0.0, 0.0)]));
        assert!(!in_polygon(p(0.5, 0.5), &[p(0.0, 0.0), p(1.0, 1.0)]));
    }

    #[test]
    fn test_predicates_are_deterministic() {
        let ring = square();
        let point = p(3.3, 7.7);
        let first = in_polygon(point, &ring);
        for _ in 0..100 {
            assert_eq!(in_polygon(point, &ring), first);
        }
        let center = p(31.2304, 121.4737);
        let probe = p(31.2307, 121.4739);
        let first = in_circle(probe, center, 40.0);
        for _ in 0..100 {
            assert_eq!(in_circle(probe, center, 40.0), first);
        }
    }
}
