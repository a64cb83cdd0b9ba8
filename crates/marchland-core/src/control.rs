//! Runtime control shared by the background schedulers.
//!
//! The engine holds one [`SchedulerControl`] behind an [`Arc`] and hands
//! clones to every scheduler task. Pausing stops new passes from starting
//! (a pass already running finishes); stopping makes every scheduler loop
//! exit after its current pass.
//!
//! All flags are atomics so the scheduler hot path never takes a lock.
//!
//! [`Arc`]: std::sync::Arc

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;

/// Shared pause/resume/stop state.
#[derive(Debug)]
pub struct SchedulerControl {
    /// Whether new passes are held back.
    paused: AtomicBool,

    /// Wakes paused schedulers when resumed.
    resume_notify: Notify,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes idle schedulers when a stop is requested.
    stop_notify: Notify,

    /// Passes finished by all schedulers together.
    passes_completed: AtomicU64,

    /// Wall-clock time the control was created.
    started_at: DateTime<Utc>,
}

impl Default for SchedulerControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerControl {
    /// A running (not paused, not stopping) control.
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            passes_completed: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether the schedulers are paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Hold back new passes until resumed.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Let passes run again and wake every paused scheduler.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_waiters();
    }

    /// Wait until not paused. Returns early if a stop is requested.
    pub async fn wait_if_paused(&self) {
        loop {
            let resumed = self.resume_notify.notified();
            let stopped = self.stop_notify.notified();
            if !self.is_paused() || self.is_stop_requested() {
                return;
            }
            tokio::select! {
                () = resumed => {}
                () = stopped => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Ask every scheduler to exit after its current pass.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    // -----------------------------------------------------------------------
    // Counters
    // -----------------------------------------------------------------------

    /// Count one finished pass.
    pub fn record_pass(&self) {
        self.passes_completed.fetch_add(1, Ordering::AcqRel);
    }

    /// Passes finished so far.
    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Acquire)
    }

    /// Snapshot for logging.
    pub fn status(&self) -> SchedulerStatus {
        let elapsed = Utc::now().signed_duration_since(self.started_at).num_seconds();
        SchedulerStatus {
            paused: self.is_paused(),
            stop_requested: self.is_stop_requested(),
            passes_completed: self.passes_completed(),
            started_at: self.started_at,
            elapsed_seconds: u64::try_from(elapsed.max(0)).unwrap_or(u64::MAX),
        }
    }
}

/// Serializable view of the scheduler control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    /// Whether new passes are held back.
    pub paused: bool,
    /// Whether a stop has been requested.
    pub stop_requested: bool,
    /// Passes finished by all schedulers together.
    pub passes_completed: u64,
    /// Wall-clock time the control was created.
    pub started_at: DateTime<Utc>,
    /// Seconds since the control was created.
    pub elapsed_seconds: u64,
}
