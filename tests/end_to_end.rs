//! End-to-end pipeline: record a walk, compress it for a map overlay, then
//! navigate along it.
//!
//! Encoder output is checked against the `polyline` crate.

use std::sync::Arc;

use geo::{Coord, LineString};

use route_guide::geo_utils::{format_distance, path_length};
use route_guide::polyline_codec::{decode, encode, optimal_zoom, simplify};
use route_guide::simulation::{straight_line_plan, FixedPlanProvider, ReplayPositionSource};
use route_guide::{bounding_box, Coordinate, NavigationEngine, TrackingSession};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 200-point loop around a park in Zurich, ~1.5km.
fn park_loop() -> Vec<Coordinate> {
    (0..200)
        .map(|i| {
            let t = i as f64 / 200.0 * std::f64::consts::TAU;
            Coordinate::new(47.3667 + 0.002 * t.sin(), 8.5450 + 0.003 * t.cos())
        })
        .collect()
}

fn to_line_string(points: &[Coordinate]) -> LineString<f64> {
    points.iter().map(|p| Coord { x: p.lng, y: p.lat }).collect()
}

#[test]
fn test_simplify_keeps_endpoints_and_original_points() {
    let track = park_loop();
    let overlay = simplify(&track, 40);

    assert!(overlay.len() <= 40);
    assert_eq!(overlay.first(), track.first());
    assert_eq!(overlay.last(), track.last());
    assert!(overlay.iter().all(|p| track.contains(p)));
}

#[test]
fn test_encoding_matches_reference_crate() {
    let track = park_loop();
    let ours = encode(&track);
    let reference = polyline::encode_coordinates(to_line_string(&track), 5).unwrap();
    assert_eq!(ours, reference);

    let decoded = decode(&ours).unwrap();
    let reference_decoded = polyline::decode_polyline(&ours, 5).unwrap();
    assert_eq!(decoded.len(), reference_decoded.0.len());
    for (ours, theirs) in decoded.iter().zip(reference_decoded.coords()) {
        assert!((ours.lat - theirs.y).abs() < 1e-9);
        assert!((ours.lng - theirs.x).abs() < 1e-9);
    }
}

#[test]
fn test_recorded_walk_to_overlay() {
    init_logging();
    let source = Arc::new(ReplayPositionSource::new());
    let session = TrackingSession::new(source.clone());
    session.start(|_| {}, |_| {}).unwrap();

    let track = park_loop();
    source.replay_path(&track, 3);
    let state = session.stop().unwrap();

    assert_eq!(state.coordinates.len(), 200);
    let walked = path_length(&state.path());
    assert!((state.stats.distance_m - walked).abs() < 1e-6);
    assert!((state.stats.duration_s - 597.0).abs() < 1e-9);
    assert!(format_distance(walked).ends_with(" km"));

    let overlay = simplify(&state.path(), 50);
    let encoded = encode(&overlay);
    let decoded = decode(&encoded).unwrap();
    assert_eq!(decoded.len(), overlay.len());

    // ~0.004 x 0.006 degrees: log2(360 / 0.006) = 15.9 -> 15 - 1
    let zoom = optimal_zoom(&decoded, 400, 400).unwrap();
    assert_eq!(zoom, 14);

    let bbox = bounding_box(&decoded).unwrap();
    assert!(decoded.iter().all(|p| bbox.contains(*p)));
}

#[tokio::test]
async fn test_navigate_recorded_walk() {
    init_logging();
    let track = park_loop();
    let waypoints: Vec<Coordinate> = simplify(&track, 8);

    let source = Arc::new(ReplayPositionSource::new());
    source.set_current(track[0], 0);
    let mut plan = straight_line_plan(&waypoints, 1.4);
    plan.coordinates = track.clone();
    let provider = Arc::new(FixedPlanProvider::always(plan));

    let engine = NavigationEngine::new(source.clone(), provider);
    engine.start_navigation(track.clone()).await.unwrap();

    // Walk the loop at one fix per second
    for (i, point) in track.iter().enumerate().skip(1) {
        source.push_at(*point, i as i64);
        assert!(!engine.snapshot().is_off_route);
    }
    // Walk onto each remaining maneuver so every step is reached
    let mut t = track.len() as i64;
    for point in &waypoints {
        source.push_at(*point, t);
        t += 1;
    }

    let state = engine.stop().unwrap();
    assert!(state.has_arrived);
    assert_eq!(state.current_step_index, waypoints.len() - 1);
    assert_eq!(state.remaining_distance_m, 0.0);
}
