//! Replay-based collaborators.
//!
//! [`ReplayPositionSource`] pushes recorded fixes to subscribers on demand
//! and [`FixedPlanProvider`] answers directions requests from a script.
//! Together they drive a session or engine without a device or a routing
//! backend: offline demos, UI previews and tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{OptionExt, Result};
use crate::geo_utils::haversine_distance;
use crate::navigation::{Maneuver, ManeuverKind, NavigationStep, Plan};
use crate::providers::{
    DirectionsProvider, ErrorCallback, FixCallback, PositionSource, SubscriptionHandle,
};
use crate::{Coordinate, RouteGuideError, TimedCoordinate};

// ============================================================================
// Replay Position Source
// ============================================================================

struct Subscriber {
    handle: SubscriptionHandle,
    on_fix: FixCallback,
    on_error: ErrorCallback,
}

/// Position source fed by the caller.
///
/// Fixes are delivered synchronously on the calling thread. The subscriber
/// list is not locked while callbacks run, so a callback may unsubscribe.
pub struct ReplayPositionSource {
    start: DateTime<Utc>,
    subscribers: Mutex<Vec<Subscriber>>,
    current: Mutex<Option<TimedCoordinate>>,
    next_handle: AtomicU64,
}

impl Default for ReplayPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayPositionSource {
    /// Source whose relative timestamps count from the Unix epoch.
    pub fn new() -> Self {
        Self::starting_at(DateTime::<Utc>::default())
    }

    /// Source whose relative timestamps count from `start`.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            subscribers: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Set the answer to one-shot position requests without notifying subscribers.
    pub fn set_current(&self, coordinate: Coordinate, offset_secs: i64) {
        let fix = self.fix_at(coordinate, offset_secs);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(fix);
    }

    /// Deliver a fix to every subscriber.
    pub fn push(&self, fix: TimedCoordinate) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(fix);
        for on_fix in self.fix_callbacks() {
            on_fix(fix);
        }
    }

    /// Deliver a fix timestamped `offset_secs` after the start.
    pub fn push_at(&self, coordinate: Coordinate, offset_secs: i64) {
        self.push(self.fix_at(coordinate, offset_secs));
    }

    /// Deliver a whole path, one fix every `interval_secs`.
    pub fn replay_path(&self, path: &[Coordinate], interval_secs: i64) {
        for (i, coordinate) in path.iter().enumerate() {
            self.push_at(*coordinate, i as i64 * interval_secs);
        }
    }

    /// Deliver an error to every subscriber.
    pub fn fail(&self, error: RouteGuideError) {
        let callbacks: Vec<ErrorCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.on_error.clone())
            .collect();
        for on_error in callbacks {
            on_error(error.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Instant `offset_secs` after the start, on this source's timeline.
    pub fn time_at(&self, offset_secs: i64) -> DateTime<Utc> {
        self.start + TimeDelta::seconds(offset_secs)
    }

    fn fix_at(&self, coordinate: Coordinate, offset_secs: i64) -> TimedCoordinate {
        TimedCoordinate::new(coordinate, self.time_at(offset_secs))
    }

    fn fix_callbacks(&self) -> Vec<FixCallback> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.on_fix.clone())
            .collect()
    }
}

#[async_trait]
impl PositionSource for ReplayPositionSource {
    fn subscribe(&self, on_fix: FixCallback, on_error: ErrorCallback) -> Result<SubscriptionHandle> {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                handle,
                on_fix,
                on_error,
            });
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| s.handle != handle);
    }

    async fn current_position(&self) -> Result<TimedCoordinate> {
        (*self.current.lock().unwrap_or_else(PoisonError::into_inner))
            .ok_or_position_unavailable("no fix recorded yet")
    }
}

// ============================================================================
// Fixed Plan Provider
// ============================================================================

/// Directions provider answering from a queue of prepared responses.
///
/// Queued responses are consumed first; afterwards every request gets the
/// fallback plan, or fails when there is none.
pub struct FixedPlanProvider {
    responses: Mutex<VecDeque<Result<Plan>>>,
    fallback: Option<Plan>,
    requests: Mutex<Vec<Vec<Coordinate>>>,
}

impl FixedPlanProvider {
    /// Answer every request with `plan`.
    pub fn always(plan: Plan) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Some(plan),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail every request that has no queued response.
    pub fn scripted() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response for the next request.
    pub fn then_respond(self, response: Result<Plan>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
        self
    }

    /// Waypoint lists received so far, in request order.
    pub fn requests(&self) -> Vec<Vec<Coordinate>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DirectionsProvider for FixedPlanProvider {
    async fn get_plan(&self, waypoints: Vec<Coordinate>) -> Result<Plan> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(waypoints);

        let queued = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match (queued, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(plan)) => Ok(plan.clone()),
            (None, None) => Err(RouteGuideError::directions("no scripted response")),
        }
    }
}

/// Build a plan that walks straight between consecutive path points.
///
/// Every vertex becomes a maneuver: depart at the first, arrive at the last,
/// continue in between. Durations assume a constant `speed_mps`.
pub fn straight_line_plan(path: &[Coordinate], speed_mps: f64) -> Plan {
    let last = path.len().saturating_sub(1);
    let speed = if speed_mps > 0.0 { speed_mps } else { 1.4 };

    let steps: Vec<NavigationStep> = path
        .iter()
        .enumerate()
        .map(|(i, location)| {
            let distance_m = path
                .get(i + 1)
                .map(|next| haversine_distance(*location, *next))
                .unwrap_or(0.0);
            let (kind, instruction) = match i {
                0 => (ManeuverKind::Depart, "Head out".to_string()),
                i if i == last => (ManeuverKind::Arrive, "You have arrived".to_string()),
                i => (ManeuverKind::Continue, format!("Continue to waypoint {}", i + 1)),
            };
            NavigationStep {
                instruction,
                distance_m,
                duration_s: distance_m / speed,
                maneuver: Maneuver {
                    kind,
                    modifier: None,
                    location: *location,
                },
            }
        })
        .collect();

    Plan {
        distance_m: steps.iter().map(|s| s.distance_m).sum(),
        duration_s: steps.iter().map(|s| s.duration_s).sum(),
        steps,
        coordinates: path.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_replay_delivers_to_subscribers() {
        let source = ReplayPositionSource::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        let handle = source
            .subscribe(
                Arc::new(move |fix| sink.lock().unwrap().push(fix)),
                Arc::new(|_| {}),
            )
            .unwrap();

        source.push_at(Coordinate::new(1.0, 2.0), 5);
        source.unsubscribe(handle);
        source.push_at(Coordinate::new(1.0, 2.1), 6);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].timestamp.timestamp(), 5);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_current_position() {
        let source = ReplayPositionSource::new();
        assert!(matches!(
            source.current_position().await,
            Err(RouteGuideError::PositionUnavailable { .. })
        ));
        source.set_current(Coordinate::new(3.0, 4.0), 0);
        let fix = source.current_position().await.unwrap();
        assert_eq!(fix.coordinate, Coordinate::new(3.0, 4.0));
    }

    #[tokio::test]
    async fn test_scripted_provider() {
        let plan = straight_line_plan(&[Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.001)], 1.0);
        let provider = FixedPlanProvider::scripted()
            .then_respond(Err(RouteGuideError::directions("offline")))
            .then_respond(Ok(plan.clone()));

        assert!(provider.get_plan(vec![]).await.is_err());
        assert_eq!(provider.get_plan(vec![]).await.unwrap(), plan);
        assert!(provider.get_plan(vec![]).await.is_err());
        assert_eq!(provider.requests().len(), 3);
    }

    #[test]
    fn test_straight_line_plan() {
        let path = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.001),
            Coordinate::new(0.001, 0.001),
        ];
        let plan = straight_line_plan(&path, 2.0);
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].maneuver.kind, ManeuverKind::Depart);
        assert_eq!(plan.steps[1].maneuver.kind, ManeuverKind::Continue);
        assert_eq!(plan.steps[2].maneuver.kind, ManeuverKind::Arrive);
        assert!((plan.distance_m - 222.4).abs() < 1.0);
        assert!((plan.duration_s - plan.distance_m / 2.0).abs() < 1e-9);
    }
}
