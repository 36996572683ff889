//! Directions plan types returned by a [`DirectionsProvider`](crate::DirectionsProvider).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::{Coordinate, RouteGuideError};

/// Maneuver vocabulary shared by common turn-by-turn routing backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManeuverKind {
    #[serde(rename = "depart")]
    Depart,
    #[serde(rename = "arrive")]
    Arrive,
    #[serde(rename = "turn")]
    Turn,
    #[serde(rename = "continue")]
    Continue,
    #[serde(rename = "new name")]
    NewName,
    #[serde(rename = "merge")]
    Merge,
    #[serde(rename = "on ramp")]
    OnRamp,
    #[serde(rename = "off ramp")]
    OffRamp,
    #[serde(rename = "fork")]
    Fork,
    #[serde(rename = "end of road")]
    EndOfRoad,
    #[serde(rename = "roundabout")]
    Roundabout,
    #[serde(rename = "rotary")]
    Rotary,
    #[serde(rename = "roundabout turn")]
    RoundaboutTurn,
    #[serde(rename = "exit roundabout")]
    ExitRoundabout,
    #[serde(rename = "exit rotary")]
    ExitRotary,
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "unknown")]
    #[serde(other)]
    Unknown,
}

/// Where and how a step begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maneuver {
    #[serde(rename = "type")]
    pub kind: ManeuverKind,
    /// Direction qualifier, e.g. "left", "slight right"
    #[serde(default)]
    pub modifier: Option<String>,
    /// Trigger location of the maneuver
    pub location: Coordinate,
}

/// A single turn-by-turn instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStep {
    pub instruction: String,
    /// Length of the step in meters
    pub distance_m: f64,
    /// Expected time for the step in seconds
    pub duration_s: f64,
    pub maneuver: Maneuver,
}

/// Ordered steps plus aggregate distance/duration between origin and destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub distance_m: f64,
    pub duration_s: f64,
    pub steps: Vec<NavigationStep>,
    /// Route geometry used for off-route detection
    pub coordinates: Vec<Coordinate>,
}

impl Plan {
    /// Parse a plan from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RouteGuideError::directions(format!("invalid plan JSON: {}", e)))
    }

    /// Reject plans the engine cannot follow.
    pub(crate) fn validated(self) -> Result<Self> {
        if self.steps.is_empty() {
            return Err(RouteGuideError::directions("provider returned no route"));
        }
        Ok(self)
    }

    /// Route geometry, falling back to maneuver locations when the provider
    /// returned none.
    pub(crate) fn geometry(&self) -> Vec<Coordinate> {
        if self.coordinates.is_empty() {
            self.steps.iter().map(|s| s.maneuver.location).collect()
        } else {
            self.coordinates.clone()
        }
    }
}
