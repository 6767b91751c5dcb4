//! Progress reporting for reconstruction runs.
//!
//! The scheduler reports through the [`Progress`] trait from many worker
//! threads at once. Every implementation synchronizes itself.

use crate::{Outcome, ViewJob};
use log::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Receives job events from the scheduler.
pub trait Progress: Send + Sync {
    /// The views a run is going to visit, called once before any job starts.
    fn register_views(&self, view_ids: &[usize]);

    /// A reconstruction is about to start.
    fn job_started(&self, job: &ViewJob);

    /// A view reached its terminal outcome, including skips.
    fn job_finished(&self, view_id: usize, outcome: Outcome);
}

impl<P: Progress + ?Sized> Progress for &P {
    fn register_views(&self, view_ids: &[usize]) {
        (**self).register_views(view_ids)
    }

    fn job_started(&self, job: &ViewJob) {
        (**self).job_started(job)
    }

    fn job_finished(&self, view_id: usize, outcome: Outcome) {
        (**self).job_finished(view_id, outcome)
    }
}

impl<P: Progress + ?Sized> Progress for Arc<P> {
    fn register_views(&self, view_ids: &[usize]) {
        (**self).register_views(view_ids)
    }

    fn job_started(&self, job: &ViewJob) {
        (**self).job_started(job)
    }

    fn job_finished(&self, view_id: usize, outcome: Outcome) {
        (**self).job_finished(view_id, outcome)
    }
}

/// Reports nothing.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn register_views(&self, _: &[usize]) {}

    fn job_started(&self, _: &ViewJob) {}

    fn job_finished(&self, _: usize, _: Outcome) {}
}

/// Logs one line per event.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogProgress;

impl Progress for LogProgress {
    fn register_views(&self, view_ids: &[usize]) {
        info!("registered {} views for reconstruction", view_ids.len());
    }

    fn job_started(&self, job: &ViewJob) {
        info!(
            "reconstructing view {} at scale {}",
            job.view_id, job.scale
        );
    }

    fn job_finished(&self, view_id: usize, outcome: Outcome) {
        match outcome {
            Outcome::Done => info!("view {} done", view_id),
            Outcome::Failed => info!("view {} failed", view_id),
            Outcome::Skipped(reason) => debug!("view {} skipped: {:?}", view_id, reason),
        }
    }
}

/// Where a registered view currently is.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ViewStatus {
    Queued,
    Running { scale: u32, started: Instant },
    Finished { outcome: Outcome, elapsed: Duration },
}

/// Counts of registered views by status.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ProgressSummary {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ProgressSummary {
    pub fn finished(&self) -> usize {
        self.done + self.failed + self.skipped
    }
}

/// Tracks the status of every registered view.
///
/// The monitor can be polled directly with [`ProgressMonitor::summary`], or a
/// background reporter can be started with [`ProgressMonitor::spawn`] that logs
/// a summary at a fixed interval until it is stopped.
#[derive(Debug)]
pub struct ProgressMonitor {
    views: Mutex<BTreeMap<usize, ViewStatus>>,
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Default for ProgressMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self {
            views: Mutex::new(BTreeMap::new()),
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    fn views(&self) -> MutexGuard<'_, BTreeMap<usize, ViewStatus>> {
        // A panicking reporter must not take progress tracking down with it.
        self.views.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self, view_id: usize) -> Option<ViewStatus> {
        self.views().get(&view_id).copied()
    }

    pub fn summary(&self) -> ProgressSummary {
        let views = self.views();
        let mut summary = ProgressSummary {
            total: views.len(),
            ..Default::default()
        };
        for status in views.values() {
            match status {
                ViewStatus::Queued => summary.queued += 1,
                ViewStatus::Running { .. } => summary.running += 1,
                ViewStatus::Finished { outcome, .. } => match outcome {
                    Outcome::Done => summary.done += 1,
                    Outcome::Failed => summary.failed += 1,
                    Outcome::Skipped(_) => summary.skipped += 1,
                },
            }
        }
        summary
    }

    fn report(&self) {
        let summary = self.summary();
        info!(
            "{}/{} views finished ({} done, {} failed, {} skipped), {} running",
            summary.finished(),
            summary.total,
            summary.done,
            summary.failed,
            summary.skipped,
            summary.running
        );
        for (view_id, status) in self.views().iter() {
            if let ViewStatus::Running { scale, started } = status {
                debug!(
                    "view {} running for {:.1?} at scale {}",
                    view_id,
                    started.elapsed(),
                    scale
                );
            }
        }
    }

    /// Starts a thread that logs a summary every `interval` until stopped.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> std::io::Result<MonitorThread> {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = false;
        let monitor = self.clone();
        let handle = thread::Builder::new()
            .name("dmrecon-progress".to_owned())
            .spawn(move || {
                let mut stopped = monitor.stopped.lock().unwrap_or_else(PoisonError::into_inner);
                while !*stopped {
                    stopped = monitor
                        .wake
                        .wait_timeout(stopped, interval)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                    if !*stopped {
                        monitor.report();
                    }
                }
                drop(stopped);
                monitor.report();
            })?;
        Ok(MonitorThread {
            monitor: self.clone(),
            handle,
        })
    }

    fn stop(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_all();
    }
}

impl Progress for ProgressMonitor {
    fn register_views(&self, view_ids: &[usize]) {
        let mut views = self.views();
        for &view_id in view_ids {
            views.insert(view_id, ViewStatus::Queued);
        }
    }

    fn job_started(&self, job: &ViewJob) {
        self.views().insert(
            job.view_id,
            ViewStatus::Running {
                scale: job.scale,
                started: Instant::now(),
            },
        );
    }

    fn job_finished(&self, view_id: usize, outcome: Outcome) {
        let mut views = self.views();
        let elapsed = match views.get(&view_id) {
            Some(ViewStatus::Running { started, .. }) => started.elapsed(),
            _ => Duration::ZERO,
        };
        views.insert(view_id, ViewStatus::Finished { outcome, elapsed });
    }
}

/// The background reporter of a [`ProgressMonitor`].
#[derive(Debug)]
pub struct MonitorThread {
    monitor: Arc<ProgressMonitor>,
    handle: JoinHandle<()>,
}

impl MonitorThread {
    /// Asks the reporter to log a final summary and exit.
    pub fn stop(&self) {
        self.monitor.stop();
    }

    /// Waits for the reporter to exit. Call [`MonitorThread::stop`] first.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}
