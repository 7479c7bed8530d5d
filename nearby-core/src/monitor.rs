//! Location watcher: owns one monitoring session at a time.
//!
//! `start` hands back a [`WatchHandle`] that owns the position subscription;
//! `stop` consumes it. Position events are processed one at a time to
//! completion (match, dedup check, notify) on the caller's thread.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LocationError, MonitorError};
use crate::geo::Coordinate;
use crate::ledger::DedupLedger;
use crate::matcher::{match_candidates, ProximityResult};
use crate::notify::{Delivery, MessageLevel, Notifier};
use crate::prefs::{AlertPreferences, PreferenceStore};
use crate::store::{CandidateStore, RefreshOutcome};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const LOCATION_ERROR_MESSAGE: &str = "Could not track your location. Please check permissions.";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(default, rename = "accuracy")]
    pub accuracy_m: Option<f64>,
    #[serde(default, rename = "timestamp")]
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Fix(PositionFix),
    Error(LocationError),
}

pub trait PositionSource {
    fn subscribe(&mut self, tx: Sender<PositionEvent>) -> Result<Subscription, LocationError>;
}

/// Unsubscribe handle for a position source. Dropping it also unsubscribes.
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(cancelled: Arc<AtomicBool>, worker: Option<JoinHandle<()>>) -> Self {
        Self { cancelled, worker }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Workers may be parked on a blocking read; let them wind down on their own.
        self.worker.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Replays a fixed list of events from a worker thread.
pub struct ReplaySource {
    events: Vec<PositionEvent>,
    pace: Duration,
}

impl ReplaySource {
    pub fn new(events: Vec<PositionEvent>, pace: Duration) -> Self {
        Self { events, pace }
    }
}

impl PositionSource for ReplaySource {
    fn subscribe(&mut self, tx: Sender<PositionEvent>) -> Result<Subscription, LocationError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let events = self.events.clone();
        let pace = self.pace;
        let worker = thread::spawn(move || {
            for event in events {
                if flag.load(Ordering::SeqCst) || tx.send(event).is_err() {
                    break;
                }
                if !pace.is_zero() {
                    thread::sleep(pace);
                }
            }
        });
        Ok(Subscription::new(cancelled, Some(worker)))
    }
}

pub struct WatchHandle {
    session: u64,
    events: Receiver<PositionEvent>,
    subscription: Subscription,
}

impl WatchHandle {
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn is_cancelled(&self) -> bool {
        self.subscription.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Stopped,
    Watching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceChange {
    Unchanged,
    Changed,
    /// Changed, and the candidate filter moved so the store was refetched.
    Refetched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    SourceClosed,
    Disabled,
    Deadline,
}

#[derive(Debug, Clone)]
pub struct FiredAlert {
    pub result: ProximityResult,
    pub delivery: Delivery,
}

/// What one processed fix produced: newly fired alerts plus everything in range.
pub struct FixReport<'a> {
    pub fix: &'a PositionFix,
    pub fired: &'a [FiredAlert],
    pub nearby: &'a [ProximityResult],
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub refresh_interval: Duration,
    pub max_runtime: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            max_runtime: None,
        }
    }
}

pub struct Monitor {
    prefs: AlertPreferences,
    ledger: DedupLedger,
    store: CandidateStore,
    notifier: Notifier,
    state: WatchState,
    nearby: Vec<ProximityResult>,
    last_fix: Option<PositionFix>,
    sessions: u64,
    // Cancel flag of the live session's subscription.
    live: Option<Arc<AtomicBool>>,
}

impl Monitor {
    pub fn new(prefs: AlertPreferences, store: CandidateStore, notifier: Notifier) -> Self {
        Self {
            prefs,
            ledger: DedupLedger::new(),
            store,
            notifier,
            state: WatchState::Stopped,
            nearby: Vec::new(),
            last_fix: None,
            sessions: 0,
            live: None,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn preferences(&self) -> &AlertPreferences {
        &self.prefs
    }

    pub fn nearby(&self) -> &[ProximityResult] {
        &self.nearby
    }

    pub fn last_fix(&self) -> Option<&PositionFix> {
        self.last_fix.as_ref()
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    pub fn store(&self) -> &CandidateStore {
        &self.store
    }

    pub fn start(&mut self, source: &mut dyn PositionSource) -> Result<WatchHandle, MonitorError> {
        if self.state == WatchState::Watching {
            return Err(MonitorError::AlreadyWatching);
        }
        if let Err(err) = self.prefs.validate() {
            self.notifier.message(MessageLevel::Error, &err.to_string());
            return Err(err.into());
        }

        // Every start is a fresh session.
        self.ledger.reset();
        self.nearby.clear();
        self.refresh_candidates();

        let (tx, rx) = mpsc::channel();
        let subscription = match source.subscribe(tx) {
            Ok(s) => s,
            Err(err) => {
                warn!("position subscribe failed: {err}");
                self.notifier.message(MessageLevel::Error, LOCATION_ERROR_MESSAGE);
                return Err(err.into());
            }
        };

        self.sessions += 1;
        self.live = Some(subscription.cancel_flag());
        self.state = WatchState::Watching;
        info!(
            session = self.sessions,
            radius_miles = self.prefs.radius_miles,
            categories = self.prefs.enabled_categories.len(),
            "monitoring started"
        );
        self.notifier.message(MessageLevel::Success, "Proximity alerts enabled!");

        Ok(WatchHandle {
            session: self.sessions,
            events: rx,
            subscription,
        })
    }

    pub fn stop(&mut self, handle: WatchHandle) {
        let WatchHandle {
            session,
            events,
            subscription,
        } = handle;
        subscription.unsubscribe();
        drop(events);

        if session != self.sessions {
            debug!(session, current = self.sessions, "stale handle released");
            return;
        }
        self.live = None;
        if self.state == WatchState::Watching {
            info!(session, "monitoring stopped");
            self.notifier.message(MessageLevel::Info, "Proximity alerts disabled");
        }
        self.state = WatchState::Stopped;
        self.nearby.clear();
        self.ledger.reset();
    }

    /// Returns the alerts fired for this fix; `nearby()` holds every match.
    pub fn on_position(&mut self, fix: &PositionFix) -> Vec<FiredAlert> {
        if self.state != WatchState::Watching {
            debug!("fix ignored, not watching");
            return Vec::new();
        }
        if !fix.coordinate.is_valid() {
            warn!(
                lat = fix.coordinate.latitude,
                lon = fix.coordinate.longitude,
                "fix ignored, coordinate out of range"
            );
            return Vec::new();
        }
        self.last_fix = Some(*fix);

        let results = match_candidates(fix.coordinate, self.store.snapshot(), &self.prefs);
        let mut fired = Vec::new();
        for result in &results {
            if self.ledger.should_notify(&result.key()) {
                let delivery = self.notifier.notify(result);
                fired.push(FiredAlert {
                    result: result.clone(),
                    delivery,
                });
            }
        }
        debug!(nearby = results.len(), fired = fired.len(), "fix processed");
        self.nearby = results;
        fired
    }

    pub fn on_location_error(&mut self, err: &LocationError) {
        if self.state != WatchState::Watching {
            return;
        }
        warn!("location error, stopping: {err}");
        if let Some(cancelled) = self.live.take() {
            cancelled.store(true, Ordering::SeqCst);
        }
        self.state = WatchState::Stopped;
        self.nearby.clear();
        self.ledger.reset();
        self.notifier.message(MessageLevel::Error, LOCATION_ERROR_MESSAGE);
    }

    pub fn update_preferences(&mut self, prefs: AlertPreferences) -> PreferenceChange {
        if prefs == self.prefs {
            return PreferenceChange::Unchanged;
        }
        info!(
            radius_miles = prefs.radius_miles,
            categories = prefs.enabled_categories.len(),
            enabled = prefs.enabled,
            "preferences changed, dedup ledger reset"
        );
        let filter_changed = prefs.candidate_filter() != self.prefs.candidate_filter();
        self.prefs = prefs;
        self.ledger.reset();
        if filter_changed && self.state == WatchState::Watching {
            self.refresh_candidates();
            return PreferenceChange::Refetched;
        }
        PreferenceChange::Changed
    }

    pub fn refresh_candidates(&mut self) -> RefreshOutcome {
        let outcome = self.store.refresh(&self.prefs.candidate_filter());
        if let RefreshOutcome::Updated(count) = &outcome {
            debug!(count, "candidates refreshed");
        }
        outcome
    }

    /// Drives one session until the source closes, errors, alerts get disabled
    /// or `max_runtime` elapses. Preferences are re-read on every refresh tick.
    pub fn run(
        &mut self,
        handle: WatchHandle,
        opts: RunOptions,
        prefs_store: Option<&dyn PreferenceStore>,
        on_fix: &mut dyn FnMut(&FixReport<'_>),
    ) -> Result<StopReason, MonitorError> {
        let started = Instant::now();
        let deadline = opts.max_runtime.map(|d| started + d);
        let mut next_refresh = started + opts.refresh_interval;

        loop {
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                self.stop(handle);
                return Ok(StopReason::Deadline);
            }

            if now >= next_refresh {
                let mut changed = PreferenceChange::Unchanged;
                if let Some(store) = prefs_store {
                    match store.load() {
                        Ok(prefs) => changed = self.update_preferences(prefs),
                        Err(err) => warn!("preferences reload failed: {err}"),
                    }
                }
                if changed != PreferenceChange::Unchanged {
                    if let Err(err) = self.prefs.validate() {
                        self.notifier.message(MessageLevel::Info, &err.to_string());
                        self.stop(handle);
                        return Ok(StopReason::Disabled);
                    }
                }
                if changed != PreferenceChange::Refetched {
                    self.refresh_candidates();
                }
                next_refresh = now + opts.refresh_interval;
            }

            let mut wait = next_refresh.saturating_duration_since(now);
            if let Some(d) = deadline {
                wait = wait.min(d.saturating_duration_since(now));
            }

            match handle.events.recv_timeout(wait) {
                Ok(PositionEvent::Fix(fix)) => {
                    let fired = self.on_position(&fix);
                    on_fix(&FixReport {
                        fix: &fix,
                        fired: &fired,
                        nearby: &self.nearby,
                    });
                }
                Ok(PositionEvent::Error(err)) => {
                    self.on_location_error(&err);
                    handle.subscription.unsubscribe();
                    return Err(err.into());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!(session = handle.session, "position source closed");
                    self.stop(handle);
                    return Ok(StopReason::SourceClosed);
                }
            }
        }
    }
}
