//! Collaborator interfaces implemented by the host application.
//!
//! The tracking session and navigation engine never touch a platform
//! location API, a routing backend or a database. They talk to these traits
//! instead, so any implementation (native location services, a replay of a
//! recorded track, a different directions vendor) satisfies the same
//! contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::navigation::Plan;
use crate::{Coordinate, RouteGuideError, TimedCoordinate};

/// Callback receiving live fixes. Sources may invoke it from any thread.
pub type FixCallback = Arc<dyn Fn(TimedCoordinate) + Send + Sync>;

/// Callback receiving errors from a source, session or engine.
pub type ErrorCallback = Arc<dyn Fn(RouteGuideError) + Send + Sync>;

/// Opaque token identifying a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Push-based stream of position fixes.
///
/// Implementations should deliver fixes in increasing timestamp order;
/// consumers silently drop fixes that arrive out of order.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Start delivering fixes to `on_fix` and failures to `on_error`.
    fn subscribe(&self, on_fix: FixCallback, on_error: ErrorCallback) -> Result<SubscriptionHandle>;

    /// Stop delivering to the given subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// One-shot position request.
    ///
    /// Fails with [`RouteGuideError::PositionUnavailable`] when no fix can be
    /// obtained (no signal, permission denied).
    async fn current_position(&self) -> Result<TimedCoordinate>;
}

/// Turn-by-turn walking directions backend.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Compute a plan visiting `waypoints` in order.
    ///
    /// Fails with [`RouteGuideError::DirectionsRequestFailed`] when the
    /// backend errors or finds no route.
    async fn get_plan(&self, waypoints: Vec<Coordinate>) -> Result<Plan>;
}

/// Receives batches of recorded fixes for durable storage.
pub trait PersistenceSink: Send + Sync {
    fn on_batch(&self, coords: &[TimedCoordinate]);
}

impl<F> PersistenceSink for F
where
    F: Fn(&[TimedCoordinate]) + Send + Sync,
{
    fn on_batch(&self, coords: &[TimedCoordinate]) {
        self(coords)
    }
}
