//! # Tracking Session
//!
//! Free-form activity tracking. A session consumes a live position stream
//! and turns it into cumulative distance, active duration and pace.
//!
//! ## Lifecycle
//!
//! `Idle -> Active -> {Paused <-> Active} -> Stopped`
//!
//! `Stopped` is terminal; construct a new session to track again.
//!
//! ## Timing
//!
//! Active duration is the time from the first accepted fix to the latest
//! one, minus every paused interval. A paused interval runs from the pause
//! instant to the resume instant, clipped to start no earlier than the first
//! fix, and counts whether or not fixes arrive in between. While paused, the
//! open interval up to each incoming fix is excluded too.
//!
//! [`TrackingSession::pause`] and [`TrackingSession::resume`] stamp the
//! instant with the host clock, which matches sources reporting wall-clock
//! fixes. Sources on another timeline (replays) use
//! [`pause_at`](TrackingSession::pause_at) and
//! [`resume_at`](TrackingSession::resume_at) with timestamps from that
//! timeline.
//!
//! Fixes received while paused are still recorded so the drawn path stays
//! continuous, but they add neither distance nor active time.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo_utils::{haversine_distance, pace};
use crate::providers::{ErrorCallback, FixCallback, PersistenceSink, PositionSource, SubscriptionHandle};
use crate::{Coordinate, RouteGuideError, TimedCoordinate};

/// Number of accepted fixes per persistence batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for tracking sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Accepted fixes per [`PersistenceSink::on_batch`] call. Zero disables batching.
    /// Default: 10
    pub batch_size: usize,

    /// Hand any partial batch to the sink when the session stops.
    /// Default: true
    pub flush_on_stop: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_on_stop: true,
        }
    }
}

impl TrackingConfig {
    /// Parse a config, filling missing fields with defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ============================================================================
// State
// ============================================================================

/// Trip statistics, recomputed on every accepted fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    /// Cumulative distance in meters, excluding paused intervals
    pub distance_m: f64,
    /// Active time in seconds, excluding paused intervals
    pub duration_s: f64,
    /// Average pace in seconds per kilometer (0 before any distance)
    pub pace_s_per_km: f64,
}

/// Snapshot of a tracking session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    /// Every accepted fix, in timestamp order
    pub coordinates: Vec<TimedCoordinate>,
    pub stats: TrackingStats,
    pub is_paused: bool,
}

impl TrackingState {
    /// Recorded path without timestamps.
    pub fn path(&self) -> Vec<Coordinate> {
        self.coordinates.iter().map(|c| c.coordinate).collect()
    }

    /// Serialize for the host UI.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Lifecycle state of a [`TrackingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Active,
    Paused,
    Stopped,
}

impl SessionStatus {
    fn is_running(self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Paused)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// Mutable session state; every fix and control call goes through here.
#[derive(Debug)]
struct Recorder {
    status: SessionStatus,
    state: TrackingState,
    /// Closed paused intervals, in seconds
    paused_s: f64,
    /// Start of the current pause, if paused
    pause_started: Option<DateTime<Utc>>,
    pending: Vec<TimedCoordinate>,
    batch_size: usize,
    subscription: Option<SubscriptionHandle>,
}

impl Recorder {
    fn new(batch_size: usize) -> Self {
        Self {
            status: SessionStatus::Idle,
            state: TrackingState::default(),
            paused_s: 0.0,
            pause_started: None,
            pending: Vec::with_capacity(batch_size),
            batch_size,
            subscription: None,
        }
    }

    /// Apply a fix. Returns false when it was discarded as stale.
    fn ingest(&mut self, fix: TimedCoordinate) -> bool {
        if let Some(last) = self.state.coordinates.last() {
            if fix.timestamp <= last.timestamp {
                debug!(
                    "[TrackingSession] Discarding fix at {} (last accepted {})",
                    fix.timestamp, last.timestamp
                );
                return false;
            }

            if !self.state.is_paused {
                self.state.stats.distance_m += haversine_distance(last.coordinate, fix.coordinate);
            }
        }

        self.state.coordinates.push(fix);

        let elapsed = seconds_between(self.state.coordinates[0].timestamp, fix.timestamp);
        let open_pause = self
            .pause_started
            .map(|start| self.paused_seconds(start, fix.timestamp))
            .unwrap_or(0.0);
        let stats = &mut self.state.stats;
        stats.duration_s = (elapsed - self.paused_s - open_pause).max(0.0);
        stats.pace_s_per_km = pace(stats.distance_m, stats.duration_s);

        if self.batch_size > 0 {
            self.pending.push(fix);
        }
        true
    }

    /// Begin a paused interval. Pausing again keeps the original start.
    fn pause(&mut self, at: DateTime<Utc>) {
        if self.pause_started.is_none() {
            self.pause_started = Some(at);
        }
        self.status = SessionStatus::Paused;
        self.state.is_paused = true;
    }

    /// Close the current paused interval, if any.
    fn resume(&mut self, at: DateTime<Utc>) {
        if let Some(start) = self.pause_started.take() {
            self.paused_s += self.paused_seconds(start, at);
        }
        self.status = SessionStatus::Active;
        self.state.is_paused = false;
    }

    /// Length of a paused interval on the active timeline, which begins at
    /// the first accepted fix. Zero before any fix.
    fn paused_seconds(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        match self.state.coordinates.first() {
            Some(first) => seconds_between(start.max(first.timestamp), end).max(0.0),
            None => 0.0,
        }
    }

    /// Take the pending batch once it reaches the configured size.
    fn take_full_batch(&mut self) -> Option<Vec<TimedCoordinate>> {
        if self.batch_size > 0 && self.pending.len() >= self.batch_size {
            Some(std::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    fn take_partial_batch(&mut self) -> Option<Vec<TimedCoordinate>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

fn with_recorder<F, R>(recorder: &Mutex<Recorder>, f: F) -> R
where
    F: FnOnce(&mut Recorder) -> R,
{
    let mut guard = recorder.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

// ============================================================================
// Tracking Session
// ============================================================================

/// Live activity tracker.
///
/// Callbacks run while the session lock is held, which is what guarantees
/// that nothing is emitted once [`stop`](Self::stop) returns. They must not
/// call back into the same session.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use route_guide::simulation::ReplayPositionSource;
/// use route_guide::{Coordinate, TrackingSession};
///
/// let source = Arc::new(ReplayPositionSource::new());
/// let session = TrackingSession::new(source.clone());
/// session.start(|state| println!("{:.0} m", state.stats.distance_m), |_| {}).unwrap();
///
/// source.push_at(Coordinate::new(0.0, 0.0), 0);
/// source.push_at(Coordinate::new(0.0, 0.001), 10);
///
/// let state = session.stop().unwrap();
/// assert!((state.stats.distance_m - 111.2).abs() < 1.0);
/// ```
pub struct TrackingSession {
    source: Arc<dyn PositionSource>,
    config: TrackingConfig,
    sink: Option<Arc<dyn PersistenceSink>>,
    recorder: Arc<Mutex<Recorder>>,
}

impl TrackingSession {
    /// Create an idle session reading from `source`.
    pub fn new(source: Arc<dyn PositionSource>) -> Self {
        Self::with_config(source, TrackingConfig::default())
    }

    /// Create an idle session with custom configuration.
    pub fn with_config(source: Arc<dyn PositionSource>, config: TrackingConfig) -> Self {
        Self {
            source,
            recorder: Arc::new(Mutex::new(Recorder::new(config.batch_size))),
            config,
            sink: None,
        }
    }

    /// Forward recorded fixes to `sink` in batches.
    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Start consuming the position stream.
    ///
    /// `emit` receives a snapshot after every accepted fix. `on_error`
    /// receives position-source failures; the session keeps running.
    pub fn start<E, R>(&self, emit: E, on_error: R) -> Result<()>
    where
        E: Fn(TrackingState) + Send + Sync + 'static,
        R: Fn(RouteGuideError) + Send + Sync + 'static,
    {
        with_recorder(&self.recorder, |r| {
            if r.status != SessionStatus::Idle {
                return Err(RouteGuideError::invalid_state("start", r.status));
            }
            r.status = SessionStatus::Active;
            Ok(())
        })?;

        let on_error: ErrorCallback = Arc::new(on_error);

        let on_fix: FixCallback = {
            let recorder = Arc::clone(&self.recorder);
            let sink = self.sink.clone();
            Arc::new(move |fix| {
                with_recorder(&recorder, |r| {
                    if !r.status.is_running() || !r.ingest(fix) {
                        return;
                    }
                    emit(r.state.clone());
                    if let Some(batch) = r.take_full_batch() {
                        if let Some(sink) = &sink {
                            debug!("[TrackingSession] Persisting batch of {}", batch.len());
                            sink.on_batch(&batch);
                        }
                    }
                })
            })
        };

        let on_source_error: ErrorCallback = {
            let recorder = Arc::clone(&self.recorder);
            let on_error = Arc::clone(&on_error);
            Arc::new(move |err| {
                with_recorder(&recorder, |r| {
                    if r.status.is_running() {
                        warn!("[TrackingSession] Position source error: {}", err);
                        on_error(err);
                    }
                })
            })
        };

        match self.source.subscribe(on_fix, on_source_error) {
            Ok(handle) => {
                let stopped_meanwhile = with_recorder(&self.recorder, |r| {
                    if r.status == SessionStatus::Stopped {
                        true
                    } else {
                        r.subscription = Some(handle);
                        false
                    }
                });
                if stopped_meanwhile {
                    self.source.unsubscribe(handle);
                }
                info!("[TrackingSession] Started");
                Ok(())
            }
            Err(err) => {
                warn!("[TrackingSession] Failed to subscribe: {}", err);
                with_recorder(&self.recorder, |r| r.status = SessionStatus::Idle);
                on_error(err.clone());
                Err(err)
            }
        }
    }

    /// Stop accumulating distance and active time. Fixes are still recorded.
    pub fn pause(&self) -> Result<()> {
        self.pause_at(Utc::now())
    }

    /// Pause with the instant taken from the fix timeline.
    pub fn pause_at(&self, at: DateTime<Utc>) -> Result<()> {
        with_recorder(&self.recorder, |r| match r.status {
            SessionStatus::Active | SessionStatus::Paused => {
                r.pause(at);
                info!("[TrackingSession] Paused at {}", at);
                Ok(())
            }
            status => Err(RouteGuideError::invalid_state("pause", status)),
        })
    }

    pub fn resume(&self) -> Result<()> {
        self.resume_at(Utc::now())
    }

    /// Resume with the instant taken from the fix timeline.
    pub fn resume_at(&self, at: DateTime<Utc>) -> Result<()> {
        with_recorder(&self.recorder, |r| match r.status {
            SessionStatus::Active | SessionStatus::Paused => {
                r.resume(at);
                info!("[TrackingSession] Resumed at {}", at);
                Ok(())
            }
            status => Err(RouteGuideError::invalid_state("resume", status)),
        })
    }

    /// Stop consuming the stream and return the final state.
    pub fn stop(&self) -> Result<TrackingState> {
        let (state, handle) = with_recorder(&self.recorder, |r| {
            if r.status == SessionStatus::Stopped {
                return Err(RouteGuideError::invalid_state("stop", r.status));
            }
            r.status = SessionStatus::Stopped;

            if self.config.flush_on_stop {
                if let (Some(batch), Some(sink)) = (r.take_partial_batch(), &self.sink) {
                    debug!("[TrackingSession] Flushing final batch of {}", batch.len());
                    sink.on_batch(&batch);
                }
            }

            Ok((r.state.clone(), r.subscription.take()))
        })?;

        if let Some(handle) = handle {
            self.source.unsubscribe(handle);
        }

        info!(
            "[TrackingSession] Stopped: {} fixes, {:.0}m in {:.0}s",
            state.coordinates.len(),
            state.stats.distance_m,
            state.stats.duration_s
        );
        Ok(state)
    }

    /// Current state without changing the session.
    pub fn snapshot(&self) -> TrackingState {
        with_recorder(&self.recorder, |r| r.state.clone())
    }

    pub fn status(&self) -> SessionStatus {
        with_recorder(&self.recorder, |r| r.status)
    }
}
