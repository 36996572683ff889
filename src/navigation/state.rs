//! Navigation state and the per-fix progress rules.
//!
//! Everything here is synchronous and allocation-free per fix apart from the
//! snapshot handed to the host, so it can run on every incoming position.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::plan::{NavigationStep, Plan};
use super::route_index::RouteIndex;
use super::NavigationConfig;
use crate::geo_utils::haversine_distance;
use crate::Coordinate;

/// Snapshot of a navigation session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub is_navigating: bool,
    pub steps: Vec<NavigationStep>,
    /// Index of the step being followed; only moves forward until a replan
    pub current_step_index: usize,
    /// Sum of the distances of the steps not yet completed
    pub remaining_distance_m: f64,
    /// Sum of the durations of the steps not yet completed
    pub remaining_duration_s: f64,
    pub current_location: Option<Coordinate>,
    pub is_off_route: bool,
    /// Set once the final step is reached
    pub has_arrived: bool,
    pub route_coordinates: Vec<Coordinate>,
}

impl NavigationState {
    pub fn current_step(&self) -> Option<&NavigationStep> {
        self.steps.get(self.current_step_index)
    }

    pub fn next_step(&self) -> Option<&NavigationStep> {
        self.steps.get(self.current_step_index + 1)
    }

    /// Serialize for the host UI.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Replace the plan wholesale.
    pub(crate) fn install_plan(&mut self, plan: Plan) {
        self.route_coordinates = plan.geometry();
        self.steps = plan.steps;
        self.current_step_index = 0;
        self.is_off_route = false;
        self.has_arrived = false;
        self.recompute_remaining();
    }

    fn recompute_remaining(&mut self) {
        if self.has_arrived {
            self.remaining_distance_m = 0.0;
            self.remaining_duration_s = 0.0;
            return;
        }
        let undone = self.steps.get(self.current_step_index..).unwrap_or_default();
        self.remaining_distance_m = undone.iter().map(|s| s.distance_m).sum();
        self.remaining_duration_s = undone.iter().map(|s| s.duration_s).sum();
    }
}

/// What changed while applying a fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FixOutcome {
    pub advanced: bool,
    pub arrived: bool,
    pub off_route_changed: bool,
}

/// Apply one live position to the state.
///
/// Advances at most one step per call, even when the position is already
/// past several maneuvers.
pub(crate) fn apply_fix(
    state: &mut NavigationState,
    route: &RouteIndex,
    location: Coordinate,
    config: &NavigationConfig,
) -> FixOutcome {
    let mut outcome = FixOutcome::default();
    state.current_location = Some(location);

    if let Some(step) = state.steps.get(state.current_step_index) {
        let to_maneuver = haversine_distance(location, step.maneuver.location);
        if to_maneuver < config.step_proximity_m {
            if state.current_step_index + 1 < state.steps.len() {
                state.current_step_index += 1;
                outcome.advanced = true;
                debug!(
                    "[Navigation] Advanced to step {}/{}",
                    state.current_step_index + 1,
                    state.steps.len()
                );
            } else if !state.has_arrived {
                state.has_arrived = true;
                outcome.arrived = true;
                info!("[Navigation] Arrived at destination");
            }
        }
    }
    state.recompute_remaining();

    if let Some(nearest) = route.nearest_distance(location) {
        let off_route = nearest > config.off_route_threshold_m;
        if off_route != state.is_off_route {
            outcome.off_route_changed = true;
            if off_route {
                warn!("[Navigation] Off route: {:.0}m from planned path", nearest);
            } else {
                info!("[Navigation] Back on route");
            }
        }
        state.is_off_route = off_route;
    }

    outcome
}

/// Waypoints for a replan: the current position, a maneuver a few steps
/// ahead, then the destination. The intermediate point is dropped when it
/// would be the destination itself.
pub(crate) fn replan_waypoints(
    state: &NavigationState,
    current: Coordinate,
    destination: Coordinate,
    lookahead_steps: usize,
) -> Vec<Coordinate> {
    let last = state.steps.len().saturating_sub(1);
    let ahead = state.current_step_index.saturating_add(lookahead_steps).min(last);

    match state.steps.get(ahead) {
        Some(step) if ahead < last && step.maneuver.location != destination => {
            vec![current, step.maneuver.location, destination]
        }
        _ => vec![current, destination],
    }
}
