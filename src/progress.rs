//! Job progress: a callback trait for per-file events and the 0–100 tracker.
//!
//! Two complementary channels report progress:
//!
//! * [`ProcessingProgressCallback`] receives discrete events (job start,
//!   each file start/finish/error, job end). Inject one through
//!   [`crate::config::WorkspaceConfigBuilder::progress_callback`].
//! * [`ProgressTracker`] owns the job's percentage and publishes it on a
//!   `tokio::sync::watch` channel, which [`crate::workspace::Workspace`]
//!   exposes via `subscribe_progress()` and `progress_stream()`.
//!
//! While a job runs, the percentage is driven either by real per-file reports
//! or, for tools with no native signal, by a heuristic estimator that adds a
//! random 5–20 points per tick. Neither source can push the value past
//! [`ESTIMATE_CEILING`]; only [`ProgressTracker::complete`] reaches 100.
//!
//! # Example
//!
//! ```rust
//! use filekit::{ProcessingProgressCallback, WorkspaceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ProcessingProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, output_bytes: u64) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("File {}/{} done ({} bytes)", index, total, output_bytes);
//!     }
//! }
//!
//! let config = WorkspaceConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Highest value progress can show before the job actually resolves.
pub const ESTIMATE_CEILING: u8 = 84;

/// Called by the workspace and the batch tools as a job advances.
///
/// Implementations must be `Send + Sync`: files in a batch are transformed
/// concurrently, so `on_file_*` may be called from different tasks. Every
/// method has a no-op default.
pub trait ProcessingProgressCallback: Send + Sync {
    /// Called once when a job enters `Processing`.
    fn on_job_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is transformed. `index` is 1-based.
    fn on_file_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a file's transformation succeeded.
    fn on_file_complete(&self, index: usize, total: usize, output_bytes: u64) {
        let _ = (index, total, output_bytes);
    }

    /// Called when a file's transformation failed. The job fails with it.
    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after a job completed successfully.
    fn on_job_complete(&self, total_files: usize, artifact_count: usize) {
        let _ = (total_files, artifact_count);
    }
}

/// A callback that ignores every event.
pub struct NoopProgressCallback;

impl ProcessingProgressCallback for NoopProgressCallback {}

/// Shared callback type stored in [`crate::config::WorkspaceConfig`].
pub type ProgressCallback = Arc<dyn ProcessingProgressCallback>;

/// Owner of a job's 0–100 progress value.
///
/// Flag changes happen inside the watch channel's write lock, so an estimator
/// tick and [`complete`](Self::complete) can never interleave: once the job
/// is complete no tick lands on top of the 100.
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<u8>,
    active: AtomicBool,
    native: AtomicBool,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            tx,
            active: AtomicBool::new(false),
            native: AtomicBool::new(false),
        }
    }

    /// Current value.
    pub fn current(&self) -> u8 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.tx.subscribe()
    }

    /// Begin a job at 0.
    pub fn start(&self) {
        self.tx.send_modify(|v| {
            self.active.store(true, Ordering::SeqCst);
            self.native.store(false, Ordering::SeqCst);
            *v = 0;
        });
    }

    /// Stop tracking and return to 0 (job failed, or workspace reset).
    pub fn reset(&self) {
        self.tx.send_if_modified(|v| {
            self.active.store(false, Ordering::SeqCst);
            self.native.store(false, Ordering::SeqCst);
            let changed = *v != 0;
            *v = 0;
            changed
        });
    }

    /// Add a heuristic increment, capped at [`ESTIMATE_CEILING`].
    ///
    /// Returns `false` once the estimator is no longer wanted: the job
    /// settled, or real progress took over.
    pub fn bump(&self, increment: u8) -> bool {
        let mut running = false;
        self.tx.send_if_modified(|v| {
            running = self.active.load(Ordering::SeqCst) && !self.native.load(Ordering::SeqCst);
            if !running {
                return false;
            }
            let next = v.saturating_add(increment).min(ESTIMATE_CEILING);
            let changed = next != *v;
            *v = next;
            changed
        });
        running
    }

    /// Report real progress: `done` of `total` units finished.
    ///
    /// The first report switches the heuristic estimator off. Values are
    /// scaled into `0..=ESTIMATE_CEILING` and never move backwards.
    pub fn report(&self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        self.tx.send_if_modified(|v| {
            if !self.active.load(Ordering::SeqCst) {
                return false;
            }
            self.native.store(true, Ordering::SeqCst);
            let scaled = (done.min(total) * ESTIMATE_CEILING as usize / total) as u8;
            if scaled > *v {
                *v = scaled;
                true
            } else {
                false
            }
        });
    }

    /// Jump to 100 and stop tracking. Returns `false` if no job was active,
    /// so 100 is published at most once per job.
    pub fn complete(&self) -> bool {
        let mut completed = false;
        self.tx.send_if_modified(|v| {
            completed = self.active.swap(false, Ordering::SeqCst);
            if completed {
                *v = 100;
            }
            completed
        });
        completed
    }

    /// Whether real progress has replaced the estimator for this job.
    pub fn is_native(&self) -> bool {
        self.native.load(Ordering::SeqCst)
    }

    /// Spawn the heuristic estimator. It stops on its own once the job
    /// settles or real progress arrives, and is aborted when the guard drops.
    pub fn spawn_estimator(self: &Arc<Self>, interval: Duration) -> EstimatorGuard {
        let tracker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; progress starts at 0.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let increment: u8 = rand::rng().random_range(5..=20);
                if !tracker.bump(increment) {
                    debug!("Progress estimator stopped at {}", tracker.current());
                    break;
                }
            }
        });
        EstimatorGuard { handle }
    }
}

/// Aborts the estimator task when dropped.
#[derive(Debug)]
pub struct EstimatorGuard {
    handle: JoinHandle<()>,
}

impl EstimatorGuard {
    /// Stop the estimator now.
    pub fn stop(self) {}
}

impl Drop for EstimatorGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        job_total: AtomicUsize,
        artifacts: AtomicUsize,
        names: Mutex<Vec<String>>,
    }

    impl ProcessingProgressCallback for TrackingCallback {
        fn on_job_start(&self, total_files: usize) {
            self.job_total.store(total_files, Ordering::SeqCst);
        }

        fn on_file_start(&self, _index: usize, _total: usize, name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.names.lock().unwrap().push(name.to_string());
        }

        fn on_file_complete(&self, _index: usize, _total: usize, _output_bytes: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, _total_files: usize, artifact_count: usize) {
            self.artifacts.store(artifact_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_job_start(2);
        cb.on_file_start(1, 2, "a.png");
        cb.on_file_complete(1, 2, 42);
        cb.on_file_error(2, 2, "decode failed");
        cb.on_job_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb = TrackingCallback::default();
        cb.on_job_start(3);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            cb.on_file_start(i + 1, 3, name);
        }
        cb.on_file_complete(1, 3, 10);
        cb.on_file_complete(2, 3, 20);
        cb.on_file_error(3, 3, "timeout");

        assert_eq!(cb.job_total.load(Ordering::SeqCst), 3);
        assert_eq!(cb.starts.load(Ordering::SeqCst), 3);
        assert_eq!(cb.completes.load(Ordering::SeqCst), 2);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*cb.names.lock().unwrap(), vec!["a", "b", "c"]);

        cb.on_job_complete(3, 2);
        assert_eq!(cb.artifacts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bumps_are_capped_below_85() {
        let t = ProgressTracker::new();
        t.start();
        for _ in 0..50 {
            assert!(t.bump(20));
        }
        assert_eq!(t.current(), ESTIMATE_CEILING);
    }

    #[test]
    fn bump_is_ignored_when_idle() {
        let t = ProgressTracker::new();
        assert!(!t.bump(10));
        assert_eq!(t.current(), 0);
    }

    #[test]
    fn complete_reaches_100_exactly_once() {
        let t = ProgressTracker::new();
        t.start();
        t.bump(30);
        assert!(t.complete());
        assert_eq!(t.current(), 100);
        assert!(!t.complete());
        assert!(!t.bump(5));
        assert_eq!(t.current(), 100);
    }

    #[test]
    fn report_takes_over_and_is_monotonic() {
        let t = ProgressTracker::new();
        t.start();
        t.bump(20);
        t.report(1, 4);
        assert!(t.is_native());
        assert_eq!(t.current(), 21);
        t.report(0, 4);
        assert_eq!(t.current(), 21);
        t.report(4, 4);
        assert_eq!(t.current(), ESTIMATE_CEILING);
        assert!(!t.bump(5), "estimator must stop once real progress arrives");
    }

    #[test]
    fn reset_returns_to_zero() {
        let t = ProgressTracker::new();
        t.start();
        t.bump(40);
        t.reset();
        assert_eq!(t.current(), 0);
        assert!(!t.complete());
    }

    #[tokio::test]
    async fn estimator_advances_without_reaching_85() {
        let t = Arc::new(ProgressTracker::new());
        t.start();
        let mut rx = t.subscribe();
        let guard = t.spawn_estimator(Duration::from_millis(1));

        rx.changed().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = *rx.borrow_and_update();
        assert!(seen > 0);
        assert!(seen <= ESTIMATE_CEILING);

        drop(guard);
        assert!(t.complete());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(t.current(), 100);
    }

    #[tokio::test]
    async fn estimator_exits_after_completion() {
        let t = Arc::new(ProgressTracker::new());
        t.start();
        let guard = t.spawn_estimator(Duration::from_millis(1));
        t.complete();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !guard.handle.is_finished() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("estimator task should finish on its own");
        assert_eq!(t.current(), 100);
    }
}
