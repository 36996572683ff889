//! # Geographic Utilities
//!
//! Pure functions shared by the tracking session, the navigation engine and
//! the polyline codec. All distances are meters, durations are seconds and
//! coordinates are decimal degrees.

use crate::error::{OptionExt, Result};
use crate::{BBox, Coordinate};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters.
///
/// # Example
/// ```
/// use route_guide::{geo_utils::haversine_distance, Coordinate};
///
/// let london = Coordinate::new(51.5074, -0.1278);
/// let paris = Coordinate::new(48.8566, 2.3522);
/// let d = haversine_distance(london, paris);
/// assert!(d > 340_000.0 && d < 350_000.0);
/// ```
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    // Rounding can push h a hair past 1.0 for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Total length of a path in meters.
pub fn path_length(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(w[0], w[1]))
        .sum()
}

/// Bounding box of a coordinate set.
///
/// Returns [`RouteGuideError::EmptyInput`](crate::RouteGuideError::EmptyInput)
/// for an empty slice.
pub fn bounding_box(points: &[Coordinate]) -> Result<BBox> {
    let first = points.first().ok_or_empty_input()?;

    Ok(points.iter().skip(1).fold(
        BBox {
            min_lat: first.lat,
            max_lat: first.lat,
            min_lng: first.lng,
            max_lng: first.lng,
        },
        |bbox, p| BBox {
            min_lat: bbox.min_lat.min(p.lat),
            max_lat: bbox.max_lat.max(p.lat),
            min_lng: bbox.min_lng.min(p.lng),
            max_lng: bbox.max_lng.max(p.lng),
        },
    ))
}

/// Pace in seconds per kilometer. Zero when no distance was covered.
pub fn pace(distance_m: f64, duration_s: f64) -> f64 {
    if distance_m <= 0.0 {
        return 0.0;
    }
    duration_s / (distance_m / 1000.0)
}

/// Average speed in km/h. Zero when no time has elapsed.
pub fn speed_kmh(distance_m: f64, duration_s: f64) -> f64 {
    if duration_s <= 0.0 {
        return 0.0;
    }
    (distance_m / duration_s) * 3.6
}

// ============================================================================
// Display helpers
// ============================================================================

/// Format a duration as `H:MM:SS`, or `M:SS` under an hour.
pub fn format_duration(duration_s: f64) -> String {
    let total = if duration_s.is_finite() && duration_s > 0.0 {
        duration_s.round() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Format a pace as `M:SS /km`.
pub fn format_pace(pace_s_per_km: f64) -> String {
    if !pace_s_per_km.is_finite() || pace_s_per_km <= 0.0 {
        return "--:-- /km".to_string();
    }
    let total = pace_s_per_km.round() as u64;
    format!("{}:{:02} /km", total / 60, total % 60)
}

/// Format a distance as meters below one kilometer, kilometers above.
pub fn format_distance(distance_m: f64) -> String {
    if distance_m < 1000.0 {
        format!("{:.0} m", distance_m.max(0.0))
    } else {
        format!("{:.2} km", distance_m / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouteGuideError;

    #[test]
    fn test_haversine_identical_points() {
        let p = Coordinate::new(51.5074, -0.1278);
        assert_eq!(haversine_distance(p, p), 0.0);
        let origin = Coordinate::new(0.0, 0.0);
        assert_eq!(haversine_distance(origin, origin), 0.0);
    }

    #[test]
    fn test_haversine_antipodal_is_finite() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 180.0);
        let d = haversine_distance(a, b);
        assert!(d.is_finite());
        // Half the circumference
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);

        let north = Coordinate::new(90.0, 0.0);
        let south = Coordinate::new(-90.0, 0.0);
        assert!(haversine_distance(north, south).is_finite());
    }

    #[test]
    fn test_haversine_short_range() {
        // 0.001 degrees of longitude at the equator is ~111.2m
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 0.001);
        let d = haversine_distance(a, b);
        assert!((d - 111.19).abs() < 0.5, "got {}", d);
    }

    #[test]
    fn test_bounding_box() {
        let points = vec![
            Coordinate::new(51.50, -0.12),
            Coordinate::new(51.52, -0.15),
            Coordinate::new(51.49, -0.10),
        ];
        let bbox = bounding_box(&points).unwrap();
        assert_eq!(bbox.min_lat, 51.49);
        assert_eq!(bbox.max_lat, 51.52);
        assert_eq!(bbox.min_lng, -0.15);
        assert_eq!(bbox.max_lng, -0.10);

        assert_eq!(bounding_box(&[]), Err(RouteGuideError::EmptyInput));
    }

    #[test]
    fn test_pace_and_speed() {
        assert_eq!(pace(0.0, 120.0), 0.0);
        assert!((pace(1000.0, 300.0) - 300.0).abs() < 1e-9);
        assert_eq!(speed_kmh(100.0, 0.0), 0.0);
        assert!((speed_kmh(1000.0, 360.0) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_path_length() {
        let points: Vec<Coordinate> = (0..3).map(|i| Coordinate::new(0.0, i as f64 * 0.001)).collect();
        let total = path_length(&points);
        assert!((total - 222.4).abs() < 1.0);
        assert_eq!(path_length(&points[..1]), 0.0);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_duration(65.0), "1:05");
        assert_eq!(format_duration(3725.0), "1:02:05");
        assert_eq!(format_duration(f64::NAN), "0:00");
        assert_eq!(format_pace(330.0), "5:30 /km");
        assert_eq!(format_pace(0.0), "--:-- /km");
        assert_eq!(format_distance(850.4), "850 m");
        assert_eq!(format_distance(1240.0), "1.24 km");
    }
}
