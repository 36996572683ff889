//! # Route Guide
//!
//! GPS route tracking, polyline compression and turn-by-turn navigation.
//!
//! This library provides:
//! - Live activity tracking with pause-aware distance, duration and pace
//! - Polyline encoding, bounded down-sampling and zoom estimation for map overlays
//! - A navigation engine that follows a planned route step by step and
//!   detects when the user strays from it
//!
//! The library never talks to a platform location API or a routing backend
//! directly. Hosts implement [`PositionSource`] and [`DirectionsProvider`]
//! (see [`simulation`] for replay-based implementations).
//!
//! ## Quick Start
//!
//! ```rust
//! use route_guide::{polyline_codec, Coordinate};
//!
//! let track = vec![
//!     Coordinate::new(51.5074, -0.1278),
//!     Coordinate::new(51.5080, -0.1290),
//!     Coordinate::new(51.5090, -0.1300),
//! ];
//!
//! let overlay = polyline_codec::simplify(&track, 40);
//! let encoded = polyline_codec::encode(&overlay);
//! let zoom = polyline_codec::optimal_zoom(&overlay, 600, 400).unwrap();
//! println!("path={} zoom={}", encoded, zoom);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{DecodeError, OptionExt, Result, RouteGuideError};

// Geographic utilities (distance, bounds, pace)
pub mod geo_utils;
pub use geo_utils::{bounding_box, haversine_distance, pace};

// Polyline encoding, simplification and zoom
pub mod polyline_codec;

// Host-implemented collaborators (position stream, directions, persistence)
pub mod providers;
pub use providers::{
    DirectionsProvider, ErrorCallback, FixCallback, PersistenceSink, PositionSource,
    SubscriptionHandle,
};

// Live activity tracking
pub mod tracking;
pub use tracking::{SessionStatus, TrackingConfig, TrackingSession, TrackingState, TrackingStats};

// Turn-by-turn navigation
pub mod navigation;
pub use navigation::{
    Maneuver, ManeuverKind, NavigationConfig, NavigationEngine, NavigationPhase,
    NavigationState, NavigationStep, Plan,
};

// Replay sources and fixed plans for simulation and tests
pub mod simulation;

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in decimal degrees.
///
/// # Example
/// ```
/// use route_guide::Coordinate;
/// let point = Coordinate::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Create a coordinate without range checks.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Create a coordinate, rejecting values outside WGS84 range.
    pub fn try_new(lat: f64, lng: f64) -> Result<Self> {
        let point = Self::new(lat, lng);
        if point.is_valid() {
            Ok(point)
        } else {
            Err(RouteGuideError::OutOfRangeCoordinate {
                lat,
                lng,
                index: None,
            })
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// A single timestamped position sample (a fix).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedCoordinate {
    pub coordinate: Coordinate,
    pub timestamp: DateTime<Utc>,
}

impl TimedCoordinate {
    pub fn new(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            timestamp,
        }
    }
}

/// Bounding box of a coordinate set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BBox {
    /// Get the center point of the bounds.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lng..=self.max_lng).contains(&point.lng)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(51.5074, -0.1278).is_valid());
        assert!(Coordinate::new(-90.0, 180.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_try_new() {
        assert!(Coordinate::try_new(10.0, 20.0).is_ok());
        assert!(matches!(
            Coordinate::try_new(-95.0, 0.0),
            Err(RouteGuideError::OutOfRangeCoordinate { index: None, .. })
        ));
    }

    #[test]
    fn test_bbox_center_and_contains() {
        let bbox = bounding_box(&[Coordinate::new(0.0, 0.0), Coordinate::new(2.0, 4.0)]).unwrap();
        assert_eq!(bbox.center(), Coordinate::new(1.0, 2.0));
        assert!(bbox.contains(Coordinate::new(1.0, 3.0)));
        assert!(!bbox.contains(Coordinate::new(3.0, 3.0)));
        assert_eq!(bbox.lat_span(), 2.0);
        assert_eq!(bbox.lng_span(), 4.0);
    }

    #[test]
    fn test_timed_coordinate_serializes() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let fix = TimedCoordinate::new(Coordinate::new(1.5, 2.5), ts);
        let json = serde_json::to_string(&fix).unwrap();
        assert!(json.contains("\"lat\":1.5"));
        let back: TimedCoordinate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fix);
    }
}
