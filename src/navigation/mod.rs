//! # Navigation Engine
//!
//! Guided walking along a previously recorded path.
//!
//! ## Lifecycle
//!
//! `Idle -> Planning -> Navigating -> {Replanning -> Navigating} -> Stopped`
//!
//! While navigating, every live fix:
//! 1. Updates the current location
//! 2. Advances to the next step when the current maneuver is within
//!    [`NavigationConfig::step_proximity_m`] (one step per fix at most)
//! 3. Recomputes remaining distance/duration from the undone steps
//! 4. Flags the user as off route when the nearest route point is further
//!    than [`NavigationConfig::off_route_threshold_m`]
//!
//! Going off route never replans on its own. The host decides whether to
//! prompt the user or call [`NavigationEngine::recalculate_route`] directly.
//! A failed replan keeps the previous (stale) plan usable.

mod plan;
mod route_index;
mod state;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub use plan::{Maneuver, ManeuverKind, NavigationStep, Plan};
pub use state::NavigationState;

use crate::error::{OptionExt, Result};
use crate::providers::{
    DirectionsProvider, ErrorCallback, FixCallback, PositionSource, SubscriptionHandle,
};
use crate::{Coordinate, RouteGuideError, TimedCoordinate};
use route_index::RouteIndex;

/// Distance at which the current maneuver counts as reached.
pub const DEFAULT_STEP_PROXIMITY_M: f64 = 20.0;

/// Distance from the planned path beyond which the user is off route.
pub const DEFAULT_OFF_ROUTE_THRESHOLD_M: f64 = 50.0;

/// How many steps ahead a replan rejoins the existing plan.
pub const DEFAULT_LOOKAHEAD_STEPS: usize = 5;

/// Route length above which off-route checks use an R-tree.
pub const DEFAULT_BRUTE_FORCE_LIMIT: usize = 64;

/// Callback receiving navigation snapshots.
pub type UpdateCallback = Arc<dyn Fn(NavigationState) + Send + Sync>;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the navigation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Distance to the current maneuver that advances to the next step.
    /// Default: 20.0 meters
    pub step_proximity_m: f64,

    /// Distance to the nearest route point beyond which the user is off route.
    /// Default: 50.0 meters
    pub off_route_threshold_m: f64,

    /// Steps ahead of the current one that a replan routes through.
    /// Default: 5
    pub lookahead_steps: usize,

    /// Routes with more points than this use a spatial index for off-route checks.
    /// Default: 64
    pub brute_force_limit: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            step_proximity_m: DEFAULT_STEP_PROXIMITY_M,
            off_route_threshold_m: DEFAULT_OFF_ROUTE_THRESHOLD_M,
            lookahead_steps: DEFAULT_LOOKAHEAD_STEPS,
            brute_force_limit: DEFAULT_BRUTE_FORCE_LIMIT,
        }
    }
}

/// Lifecycle state of a [`NavigationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationPhase {
    Idle,
    Planning,
    Navigating,
    Replanning,
    Stopped,
}

impl NavigationConfig {
    /// Parse a config, filling missing fields with defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl NavigationPhase {
    /// Live fixes are applied in these phases.
    fn is_following(self) -> bool {
        matches!(self, NavigationPhase::Navigating | NavigationPhase::Replanning)
    }
}

impl fmt::Display for NavigationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavigationPhase::Idle => "idle",
            NavigationPhase::Planning => "planning",
            NavigationPhase::Navigating => "navigating",
            NavigationPhase::Replanning => "replanning",
            NavigationPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Navigator
// ============================================================================

struct Navigator {
    phase: NavigationPhase,
    state: NavigationState,
    route: RouteIndex,
    destination: Option<Coordinate>,
    last_fix: Option<DateTime<Utc>>,
    subscription: Option<SubscriptionHandle>,
    /// Bumped on stop; async results from an older epoch are discarded.
    epoch: u64,
}

impl Navigator {
    fn new() -> Self {
        Self {
            phase: NavigationPhase::Idle,
            state: NavigationState::default(),
            route: RouteIndex::empty(),
            destination: None,
            last_fix: None,
            subscription: None,
            epoch: 0,
        }
    }

    fn install_plan(&mut self, plan: Plan, config: &NavigationConfig) {
        self.state.install_plan(plan);
        self.route = RouteIndex::new(self.state.route_coordinates.clone(), config.brute_force_limit);
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.phase != NavigationPhase::Stopped
    }
}

fn with_navigator<F, R>(navigator: &Mutex<Navigator>, f: F) -> R
where
    F: FnOnce(&mut Navigator) -> R,
{
    let mut guard = navigator.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

// ============================================================================
// Navigation Engine
// ============================================================================

/// Turn-by-turn navigation along a recorded path.
///
/// Callbacks run while the engine lock is held, which is what guarantees
/// that nothing is emitted once [`stop`](Self::stop) returns. They must not
/// call back into the same engine.
pub struct NavigationEngine {
    source: Arc<dyn PositionSource>,
    directions: Arc<dyn DirectionsProvider>,
    config: NavigationConfig,
    on_update: UpdateCallback,
    on_error: ErrorCallback,
    navigator: Arc<Mutex<Navigator>>,
}

impl NavigationEngine {
    /// Create an idle engine.
    pub fn new(source: Arc<dyn PositionSource>, directions: Arc<dyn DirectionsProvider>) -> Self {
        Self {
            source,
            directions,
            config: NavigationConfig::default(),
            on_update: Arc::new(|_| {}),
            on_error: Arc::new(|_| {}),
            navigator: Arc::new(Mutex::new(Navigator::new())),
        }
    }

    pub fn with_config(mut self, config: NavigationConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive a snapshot after every plan change and every applied fix.
    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(NavigationState) + Send + Sync + 'static,
    {
        self.on_update = Arc::new(callback);
        self
    }

    /// Receive position and directions failures.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(RouteGuideError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(callback);
        self
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Plan a route from the current position along `recorded_path` and
    /// start following it.
    ///
    /// The itinerary is `[current position, first path point, last path point]`.
    /// On failure the engine returns to idle and can be started again.
    pub async fn start_navigation(&self, recorded_path: Vec<Coordinate>) -> Result<()> {
        let origin = *recorded_path.first().ok_or_empty_input()?;
        let destination = *recorded_path.last().ok_or_empty_input()?;

        let epoch = with_navigator(&self.navigator, |n| {
            if n.phase != NavigationPhase::Idle {
                return Err(RouteGuideError::invalid_state("start navigation", n.phase));
            }
            n.phase = NavigationPhase::Planning;
            Ok(n.epoch)
        })?;

        info!(
            "[Navigation] Planning route along {} recorded points",
            recorded_path.len()
        );

        let planned = self.request_initial_plan(origin, destination).await;

        let installed = with_navigator(&self.navigator, |n| {
            if !n.is_current(epoch) {
                debug!("[Navigation] Discarding plan that resolved after stop");
                return Err(RouteGuideError::invalid_state("start navigation", NavigationPhase::Stopped));
            }

            match planned {
                Ok((here, plan)) => {
                    n.install_plan(plan, &self.config);
                    n.state.current_location = Some(here);
                    n.state.is_navigating = true;
                    n.destination = Some(destination);
                    n.phase = NavigationPhase::Navigating;
                    info!(
                        "[Navigation] Started with {} steps, {:.0}m",
                        n.state.steps.len(),
                        n.state.remaining_distance_m
                    );
                    (self.on_update)(n.state.clone());
                    Ok(())
                }
                Err(err) => {
                    warn!("[Navigation] Failed to start: {}", err);
                    n.phase = NavigationPhase::Idle;
                    (self.on_error)(err.clone());
                    Err(err)
                }
            }
        });
        installed?;

        self.subscribe(epoch)
    }

    async fn request_initial_plan(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<(Coordinate, Plan)> {
        let here = self.source.current_position().await?.coordinate;
        let plan = self
            .directions
            .get_plan(vec![here, origin, destination])
            .await?
            .validated()?;
        Ok((here, plan))
    }

    fn subscribe(&self, epoch: u64) -> Result<()> {
        let on_fix: FixCallback = {
            let navigator = Arc::clone(&self.navigator);
            let config = self.config.clone();
            let on_update = Arc::clone(&self.on_update);
            Arc::new(move |fix: TimedCoordinate| {
                with_navigator(&navigator, |n| {
                    if !n.phase.is_following() {
                        return;
                    }
                    if n.last_fix.is_some_and(|last| fix.timestamp <= last) {
                        debug!("[Navigation] Discarding out-of-order fix at {}", fix.timestamp);
                        return;
                    }
                    n.last_fix = Some(fix.timestamp);
                    let outcome = state::apply_fix(&mut n.state, &n.route, fix.coordinate, &config);
                    if outcome.advanced || outcome.arrived || outcome.off_route_changed {
                        debug!(
                            "[Navigation] Step {}, {:.0}m remaining, off_route={}",
                            n.state.current_step_index,
                            n.state.remaining_distance_m,
                            n.state.is_off_route
                        );
                    }
                    on_update(n.state.clone());
                })
            })
        };

        let on_source_error: ErrorCallback = {
            let navigator = Arc::clone(&self.navigator);
            let on_error = Arc::clone(&self.on_error);
            Arc::new(move |err| {
                with_navigator(&navigator, |n| {
                    if n.phase.is_following() {
                        warn!("[Navigation] Position source error: {}", err);
                        on_error(err);
                    }
                })
            })
        };

        match self.source.subscribe(on_fix, on_source_error) {
            Ok(handle) => {
                let stale = with_navigator(&self.navigator, |n| {
                    if n.is_current(epoch) {
                        n.subscription = Some(handle);
                        false
                    } else {
                        true
                    }
                });
                if stale {
                    self.source.unsubscribe(handle);
                }
                Ok(())
            }
            Err(err) => {
                with_navigator(&self.navigator, |n| {
                    if n.is_current(epoch) {
                        warn!("[Navigation] Failed to subscribe: {}", err);
                        n.phase = NavigationPhase::Idle;
                        n.state.is_navigating = false;
                        (self.on_error)(err.clone());
                    }
                });
                Err(err)
            }
        }
    }

    /// Request a fresh plan from the current location.
    ///
    /// The new itinerary rejoins the old plan
    /// [`lookahead_steps`](NavigationConfig::lookahead_steps) maneuvers ahead
    /// (or goes straight to the destination when fewer remain). On success
    /// the steps and route are replaced and the step index resets to 0. On
    /// failure the previous plan stays in place.
    pub async fn recalculate_route(&self) -> Result<()> {
        let (epoch, waypoints) = with_navigator(&self.navigator, |n| {
            if n.phase != NavigationPhase::Navigating {
                return Err(RouteGuideError::invalid_state("recalculate route", n.phase));
            }
            let current = n
                .state
                .current_location
                .ok_or_else(|| RouteGuideError::invalid_state("recalculate route", "no known position"))?;
            let destination = n
                .destination
                .ok_or_else(|| RouteGuideError::invalid_state("recalculate route", "no destination"))?;

            let waypoints =
                state::replan_waypoints(&n.state, current, destination, self.config.lookahead_steps);
            n.phase = NavigationPhase::Replanning;
            Ok((n.epoch, waypoints))
        })?;

        info!("[Navigation] Replanning via {} waypoints", waypoints.len());

        let planned = match self.directions.get_plan(waypoints).await {
            Ok(plan) => plan.validated(),
            Err(err) => Err(err),
        };

        with_navigator(&self.navigator, |n| {
            if !n.is_current(epoch) {
                debug!("[Navigation] Discarding replan that resolved after stop");
                return Err(RouteGuideError::invalid_state("recalculate route", NavigationPhase::Stopped));
            }
            n.phase = NavigationPhase::Navigating;

            match planned {
                Ok(plan) => {
                    n.install_plan(plan, &self.config);
                    info!(
                        "[Navigation] Replanned: {} steps, {:.0}m",
                        n.state.steps.len(),
                        n.state.remaining_distance_m
                    );
                    (self.on_update)(n.state.clone());
                    Ok(())
                }
                Err(err) => {
                    warn!("[Navigation] Replan failed, keeping current plan: {}", err);
                    (self.on_error)(err.clone());
                    Err(err)
                }
            }
        })
    }

    /// Stop following the route. Terminal.
    pub fn stop(&self) -> Result<NavigationState> {
        let (state, handle) = with_navigator(&self.navigator, |n| {
            if n.phase == NavigationPhase::Stopped {
                return Err(RouteGuideError::invalid_state("stop", n.phase));
            }
            n.phase = NavigationPhase::Stopped;
            n.epoch += 1;
            n.state.is_navigating = false;
            Ok((n.state.clone(), n.subscription.take()))
        })?;

        if let Some(handle) = handle {
            self.source.unsubscribe(handle);
        }

        info!(
            "[Navigation] Stopped at step {}/{}",
            state.current_step_index + 1,
            state.steps.len()
        );
        Ok(state)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn snapshot(&self) -> NavigationState {
        with_navigator(&self.navigator, |n| n.state.clone())
    }

    pub fn phase(&self) -> NavigationPhase {
        with_navigator(&self.navigator, |n| n.phase)
    }

    pub fn current_step(&self) -> Option<NavigationStep> {
        with_navigator(&self.navigator, |n| n.state.current_step().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = NavigationConfig::default();
        assert_eq!(config.step_proximity_m, 20.0);
        assert_eq!(config.off_route_threshold_m, 50.0);
        assert_eq!(config.lookahead_steps, 5);
    }

    #[test]
    fn test_config_partial_json() {
        let config = NavigationConfig::from_json(r#"{"off_route_threshold_m": 30.0}"#).unwrap();
        assert_eq!(config.off_route_threshold_m, 30.0);
        assert_eq!(config.step_proximity_m, DEFAULT_STEP_PROXIMITY_M);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(NavigationPhase::Replanning.to_string(), "replanning");
        assert!(NavigationPhase::Replanning.is_following());
        assert!(!NavigationPhase::Planning.is_following());
    }
}
