//! Unified error handling for the route-guide library.
//!
//! Every fallible operation in the crate returns [`RouteGuideError`]. The
//! polyline decoder has its own narrower [`DecodeError`] which converts into
//! the unified type with `?`.

use thiserror::Error;

/// Unified error type for route-guide operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteGuideError {
    /// Bounding box or zoom requested for zero points
    #[error("Operation requires at least one coordinate")]
    EmptyInput,

    /// A coordinate lies outside the WGS84 range
    #[error("Coordinate ({lat}, {lng}) is out of range{}", fmt_index(.index))]
    OutOfRangeCoordinate {
        lat: f64,
        lng: f64,
        index: Option<usize>,
    },

    /// Encoded polyline is truncated or contains invalid characters
    #[error("Malformed polyline at byte {position}: {reason}")]
    MalformedEncoding { position: usize, reason: String },

    /// Position source failed or permission was denied
    #[error("Position unavailable: {message}")]
    PositionUnavailable { message: String },

    /// Directions provider errored or returned no usable route
    #[error("Directions request failed: {message}")]
    DirectionsRequestFailed { message: String },

    /// Operation not permitted in the current lifecycle state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },
}

fn fmt_index(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" at index {}", i),
        None => String::new(),
    }
}

impl RouteGuideError {
    pub(crate) fn invalid_state(operation: &'static str, state: impl ToString) -> Self {
        RouteGuideError::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    pub(crate) fn directions(message: impl Into<String>) -> Self {
        RouteGuideError::DirectionsRequestFailed {
            message: message.into(),
        }
    }
}

/// Errors produced while decoding a polyline string.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Malformed polyline at byte {position}: {reason}")]
    MalformedEncoding { position: usize, reason: String },

    #[error("Decoded coordinate ({lat}, {lng}) at index {index} is out of range")]
    OutOfRangeCoordinate { lat: f64, lng: f64, index: usize },
}

impl From<DecodeError> for RouteGuideError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::MalformedEncoding { position, reason } => {
                RouteGuideError::MalformedEncoding { position, reason }
            }
            DecodeError::OutOfRangeCoordinate { lat, lng, index } => {
                RouteGuideError::OutOfRangeCoordinate {
                    lat,
                    lng,
                    index: Some(index),
                }
            }
        }
    }
}

/// Result type alias for route-guide operations.
pub type Result<T> = std::result::Result<T, RouteGuideError>;

/// Extension trait for converting Option to RouteGuideError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an empty input error.
    fn ok_or_empty_input(self) -> Result<T>;

    /// Convert Option to Result with a position unavailable error.
    fn ok_or_position_unavailable(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_empty_input(self) -> Result<T> {
        self.ok_or(RouteGuideError::EmptyInput)
    }

    fn ok_or_position_unavailable(self, message: &str) -> Result<T> {
        self.ok_or_else(|| RouteGuideError::PositionUnavailable {
            message: message.to_string(),
        })
    }
}
