//! # Polyline Codec
//!
//! Compact string encoding of coordinate sequences (the 5-decimal polyline
//! algorithm), plus the down-sampling and zoom estimation used when a route
//! is rendered as a static map overlay.
//!
//! Encoded strings only contain characters in `'?'..='~'`, so they can be
//! embedded in a URL query parameter. Coordinates are rounded to 5 decimal
//! places (~1.1m); that precision loss is part of the format.

use geo::{algorithm::simplify::Simplify, Coord, LineString};

use crate::error::{DecodeError, Result};
use crate::geo_utils::bounding_box;
use crate::Coordinate;

/// Scale factor for 5 decimal places.
const PRECISION: f64 = 1e5;

/// Zoom returned when the input has no span (a single point).
pub const DEFAULT_SINGLE_POINT_ZOOM: u8 = 15;

pub const MIN_ZOOM: u8 = 1;
pub const MAX_ZOOM: u8 = 20;

// ============================================================================
// Simplification
// ============================================================================

/// Down-sample a path to at most `max_points` coordinates.
///
/// First and last points are always kept. Interior points are sampled with a
/// fixed stride of `ceil(len / max_points)`, so the output size is bounded
/// regardless of input length. Every returned point is taken from the input
/// (no interpolation). A `max_points` below 2 still yields both endpoints.
///
/// # Example
/// ```
/// use route_guide::{polyline_codec::simplify, Coordinate};
///
/// let track: Vec<Coordinate> = (0..200)
///     .map(|i| Coordinate::new(51.5 + i as f64 * 1e-4, -0.12))
///     .collect();
/// let simplified = simplify(&track, 40);
/// assert!(simplified.len() <= 40);
/// assert_eq!(simplified[0], track[0]);
/// assert_eq!(simplified[simplified.len() - 1], track[199]);
/// ```
pub fn simplify(points: &[Coordinate], max_points: usize) -> Vec<Coordinate> {
    if points.len() <= max_points || points.len() <= 2 {
        return points.to_vec();
    }

    let last = points.len() - 1;
    let stride = points.len().div_ceil(max_points.max(1));
    let interior_max = max_points.saturating_sub(2);

    let mut result = Vec::with_capacity(max_points.max(2));
    result.push(points[0]);
    result.extend(
        (stride..last)
            .step_by(stride)
            .take(interior_max)
            .map(|i| points[i]),
    );
    result.push(points[last]);
    result
}

/// Douglas-Peucker simplification with a tolerance in degrees.
///
/// Preserves shape rather than bounding the point count. Use [`simplify`]
/// when the output feeds a length-limited request.
pub fn simplify_tolerance(points: &[Coordinate], tolerance_deg: f64) -> Vec<Coordinate> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let line = LineString::new(
        points
            .iter()
            .map(|p| Coord { x: p.lng, y: p.lat })
            .collect(),
    );

    line.simplify(&tolerance_deg)
        .coords()
        .map(|c| Coordinate::new(c.y, c.x))
        .collect()
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a coordinate sequence as a polyline string.
///
/// # Example
/// ```
/// use route_guide::{polyline_codec::encode, Coordinate};
///
/// let points = [
///     Coordinate::new(38.5, -120.2),
///     Coordinate::new(40.7, -120.95),
///     Coordinate::new(43.252, -126.453),
/// ];
/// assert_eq!(encode(&points), "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
/// ```
///
/// Input is expected to be valid WGS84 (see [`Coordinate::is_valid`]).
/// Non-finite or out-of-range values never panic, but the resulting string
/// does not decode back to them.
pub fn encode(points: &[Coordinate]) -> String {
    let (_, _, encoded) = points.iter().fold(
        (0i64, 0i64, String::with_capacity(points.len() * 8)),
        |(prev_lat, prev_lng, mut out), p| {
            let lat = to_fixed(p.lat);
            let lng = to_fixed(p.lng);
            push_signed(&mut out, lat.wrapping_sub(prev_lat));
            push_signed(&mut out, lng.wrapping_sub(prev_lng));
            (lat, lng, out)
        },
    );
    encoded
}

fn to_fixed(value: f64) -> i64 {
    (value * PRECISION).round() as i64
}

/// Zig-zag a delta and append it as 5-bit chunks.
fn push_signed(out: &mut String, delta: i64) {
    let mut value = if delta < 0 {
        !(delta << 1) as u64
    } else {
        (delta << 1) as u64
    };

    while value >= 0x20 {
        out.push(char::from((((value & 0x1f) | 0x20) + 63) as u8));
        value >>= 5;
    }
    out.push(char::from((value + 63) as u8));
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a polyline string produced by [`encode`].
///
/// Truncated input, characters outside the encoding alphabet and decoded
/// coordinates outside WGS84 range are reported as [`DecodeError`]s.
pub fn decode(encoded: &str) -> std::result::Result<Vec<Coordinate>, DecodeError> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::with_capacity(bytes.len() / 4);
    let mut position = 0;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while position < bytes.len() {
        let (d_lat, next) = read_signed(bytes, position)?;
        if next >= bytes.len() {
            return Err(DecodeError::MalformedEncoding {
                position: next,
                reason: "latitude without longitude".to_string(),
            });
        }
        let (d_lng, next) = read_signed(bytes, next)?;

        lat += d_lat;
        lng += d_lng;
        let point = Coordinate::new(lat as f64 / PRECISION, lng as f64 / PRECISION);
        if !point.is_valid() {
            return Err(DecodeError::OutOfRangeCoordinate {
                lat: point.lat,
                lng: point.lng,
                index: points.len(),
            });
        }

        points.push(point);
        position = next;
    }

    Ok(points)
}

/// Read one zig-zag value starting at `start`; returns it and the next offset.
fn read_signed(bytes: &[u8], start: usize) -> std::result::Result<(i64, usize), DecodeError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    let mut position = start;

    loop {
        let byte = *bytes
            .get(position)
            .ok_or_else(|| DecodeError::MalformedEncoding {
                position,
                reason: "unterminated chunk".to_string(),
            })?;

        if !(63..=126).contains(&byte) {
            return Err(DecodeError::MalformedEncoding {
                position,
                reason: format!("invalid character {:?}", byte as char),
            });
        }
        if shift > 55 {
            return Err(DecodeError::MalformedEncoding {
                position,
                reason: "value overflow".to_string(),
            });
        }

        let chunk = (byte - 63) as u64;
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        position += 1;

        if chunk < 0x20 {
            break;
        }
    }

    let value = if result & 1 == 1 {
        !(result >> 1) as i64
    } else {
        (result >> 1) as i64
    };
    Ok((value, position))
}

// ============================================================================
// Zoom
// ============================================================================

/// Discrete map zoom level at which `points` fit a map viewport.
///
/// Each axis yields `log2(360 / span)`; the smaller (more zoomed-out) value
/// wins, then one level is removed for padding. The result is floored and
/// clamped to `[1, 20]`. It depends only on the spans, so the same bounds
/// give the same level on every screen size. Input with no span returns
/// [`DEFAULT_SINGLE_POINT_ZOOM`].
pub fn optimal_zoom(points: &[Coordinate], _viewport_w: u32, _viewport_h: u32) -> Result<u8> {
    let bbox = bounding_box(points)?;
    let lat_span = bbox.lat_span();
    let lng_span = bbox.lng_span();

    if lat_span <= 0.0 && lng_span <= 0.0 {
        return Ok(DEFAULT_SINGLE_POINT_ZOOM);
    }

    let axis_zoom = |span: f64| -> f64 {
        if span <= 0.0 {
            return f64::INFINITY;
        }
        (360.0 / span).log2()
    };

    let zoom = axis_zoom(lat_span).min(axis_zoom(lng_span));
    Ok((zoom.floor() - 1.0).clamp(MIN_ZOOM as f64, MAX_ZOOM as f64) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouteGuideError;

    fn line(n: usize) -> Vec<Coordinate> {
        (0..n)
            .map(|i| Coordinate::new(51.5 + i as f64 * 1e-4, -0.12 + i as f64 * 2e-4))
            .collect()
    }

    fn round5(v: f64) -> f64 {
        (v * 1e5).round() / 1e5
    }

    #[test]
    fn test_reference_vector() {
        let points = [
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ];
        let encoded = encode(&points);
        assert_eq!(encoded, "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
        assert_eq!(decode(&encoded).unwrap(), points.to_vec());
    }

    #[test]
    fn test_round_trip_rounds_to_five_places() {
        let points = vec![
            Coordinate::new(51.507_412_3, -0.127_849_9),
            Coordinate::new(-33.868_819_7, 151.209_295_5),
            Coordinate::new(89.999_999, -179.999_999),
            Coordinate::new(0.0, 0.0),
        ];
        let decoded = decode(&encode(&points)).unwrap();
        assert_eq!(decoded.len(), points.len());
        for (d, p) in decoded.iter().zip(&points) {
            assert!((d.lat - round5(p.lat)).abs() < 1e-9);
            assert!((d.lng - round5(p.lng)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<Coordinate>::new());
    }

    #[test]
    fn test_encoded_length_depends_only_on_deltas() {
        let base = line(20);
        let shifted: Vec<Coordinate> = base
            .iter()
            .map(|p| Coordinate::new(p.lat - 40.0, p.lng + 100.0))
            .collect();
        // Only the first point carries absolute magnitude
        let a = encode(&base);
        let b = encode(&shifted);
        let first_a = encode(&base[..1]).len();
        let first_b = encode(&shifted[..1]).len();
        assert_eq!(a.len() - first_a, b.len() - first_b);
    }

    #[test]
    fn test_decode_rejects_unterminated_chunk() {
        // '_' (95) has the continuation bit set and nothing follows it
        let err = decode("_p~iF~ps|U_").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedEncoding { .. }));
    }

    #[test]
    fn test_decode_rejects_missing_longitude() {
        let err = decode("_p~iF").unwrap_err();
        match err {
            DecodeError::MalformedEncoding { reason, .. } => {
                assert!(reason.contains("longitude"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_invalid_character() {
        let err = decode("_p~iF ps|U").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MalformedEncoding { position: 5, .. }
        ));
    }

    #[test]
    fn test_decode_rejects_out_of_range() {
        // Two points each advancing latitude by 60 degrees
        let far = [Coordinate::new(60.0, 0.0)];
        let step = encode(&far);
        let encoded = format!("{}{}", step, step);
        let err = decode(&encoded).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::OutOfRangeCoordinate { index: 1, .. }
        ));

        let converted: RouteGuideError = err.into();
        assert!(matches!(
            converted,
            RouteGuideError::OutOfRangeCoordinate { index: Some(1), .. }
        ));
    }

    #[test]
    fn test_simplify_keeps_short_input() {
        let points = line(10);
        assert_eq!(simplify(&points, 10), points);
        assert_eq!(simplify(&points, 50), points);
    }

    #[test]
    fn test_simplify_bounds_and_endpoints() {
        let points = line(200);
        for k in [2usize, 3, 7, 40, 199] {
            let s = simplify(&points, k);
            assert!(s.len() <= k, "k={} len={}", k, s.len());
            assert_eq!(s[0], points[0]);
            assert_eq!(*s.last().unwrap(), points[199]);
            assert!(s.iter().all(|p| points.contains(p)));
        }
    }

    #[test]
    fn test_simplify_degenerate_max_points() {
        let points = line(5);
        let s = simplify(&points, 1);
        assert_eq!(s, vec![points[0], points[4]]);
        assert_eq!(simplify(&[], 0), Vec::<Coordinate>::new());
    }

    #[test]
    fn test_simplify_tolerance_removes_collinear_points() {
        let points: Vec<Coordinate> = (0..10).map(|i| Coordinate::new(0.0, i as f64 * 0.001)).collect();
        let s = simplify_tolerance(&points, 0.0001);
        assert_eq!(s, vec![points[0], points[9]]);
    }

    #[test]
    fn test_encode_non_finite_does_not_panic() {
        let points = [
            Coordinate::new(f64::INFINITY, f64::NEG_INFINITY),
            Coordinate::new(f64::NEG_INFINITY, f64::INFINITY),
            Coordinate::new(f64::NAN, 1e300),
        ];
        let encoded = encode(&points);
        assert!(!encoded.is_empty());
        assert!(encoded.chars().all(|c| ('?'..='~').contains(&c)));
    }

    #[test]
    fn test_optimal_zoom_single_point() {
        let p = [Coordinate::new(51.5, -0.12)];
        assert_eq!(optimal_zoom(&p, 600, 400).unwrap(), DEFAULT_SINGLE_POINT_ZOOM);
        assert_eq!(optimal_zoom(&[], 600, 400), Err(RouteGuideError::EmptyInput));
    }

    #[test]
    fn test_optimal_zoom_monotonic() {
        let mut previous = u8::MAX;
        for span in [0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 10.0, 90.0] {
            let points = [Coordinate::new(0.0, 0.0), Coordinate::new(span, span)];
            let zoom = optimal_zoom(&points, 600, 400).unwrap();
            assert!(zoom <= previous, "span {} gave {} after {}", span, zoom, previous);
            assert!((MIN_ZOOM..=MAX_ZOOM).contains(&zoom));
            previous = zoom;
        }
    }

    #[test]
    fn test_optimal_zoom_city_scale() {
        // ~1km box: log2(360 / 0.01) = 15.1 -> 15 - 1
        let points = [Coordinate::new(51.50, -0.13), Coordinate::new(51.51, -0.12)];
        assert_eq!(optimal_zoom(&points, 512, 512).unwrap(), 14);
    }

    #[test]
    fn test_optimal_zoom_ignores_viewport_size() {
        let points = [Coordinate::new(0.0, 0.0), Coordinate::new(0.01, 0.01)];
        for size in [128, 512, 1024] {
            assert_eq!(optimal_zoom(&points, size, size).unwrap(), 14);
        }
        // The narrower axis does not matter, the wider span wins
        let wide = [Coordinate::new(0.0, 0.0), Coordinate::new(0.01, 1.0)];
        assert_eq!(optimal_zoom(&wide, 600, 400).unwrap(), 7);
    }
}
