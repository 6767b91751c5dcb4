use crate::{
    Error, Outcome, Progress, Reconstructor, SceneView, Settings, SkipReason, ViewCatalog, ViewJob,
};
use itertools::Itertools;
use log::*;
use rayon::ThreadPoolBuilder;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// The outcome of every view visited in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub outcomes: BTreeMap<usize, Outcome>,
    pub elapsed: Duration,
}

impl Report {
    pub fn outcome(&self, view_id: usize) -> Option<Outcome> {
        self.outcomes.get(&view_id).copied()
    }

    pub fn done(&self) -> usize {
        self.count(|outcome| outcome == Outcome::Done)
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| outcome == Outcome::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| outcome.is_skipped())
    }

    fn count(&self, predicate: impl Fn(Outcome) -> bool) -> usize {
        self.outcomes.values().filter(|&&outcome| predicate(outcome)).count()
    }
}

/// Runs depth map reconstruction jobs over the views of a catalog.
///
/// In master mode one view is reconstructed on the calling thread and any
/// failure fails the run. In batch mode every requested view becomes a job on
/// a worker pool. Jobs are handed out one at a time since their cost varies
/// with image size and scale, and a failing job only affects its own view.
pub struct Scheduler<P> {
    settings: Settings,
    progress: P,
}

impl<P: Progress> Scheduler<P> {
    pub fn new(settings: Settings, progress: P) -> Self {
        Self { settings, progress }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    /// Runs master mode if a master view is configured, batch mode otherwise.
    ///
    /// Batch mode visits the configured view ids, or every view of the catalog
    /// if none are configured.
    pub fn run<C, R>(&self, catalog: &C, reconstructor: &R) -> Result<Report, Error>
    where
        C: ViewCatalog,
        R: Reconstructor<C>,
    {
        if let Some(view_id) = self.settings.master_view {
            return self.run_master(catalog, reconstructor, view_id);
        }
        if self.settings.view_ids.is_empty() {
            info!("reconstructing all views");
            let view_ids: Vec<usize> = (0..catalog.num_views()).collect();
            self.run_batch(catalog, reconstructor, &view_ids)
        } else {
            info!("reconstructing views from list");
            self.run_batch(catalog, reconstructor, &self.settings.view_ids)
        }
    }

    /// Derives the job for `view_id` from the settings template.
    pub fn job<C: ViewCatalog>(&self, catalog: &C, view_id: usize, is_master: bool) -> ViewJob {
        ViewJob::new(
            &self.settings.mvs,
            view_id,
            catalog.view(view_id),
            self.settings.max_pixels,
            is_master,
            self.settings.force,
        )
    }

    /// Reconstructs a single view, returning an error if it fails.
    ///
    /// The depth map is recomputed even if it already exists.
    pub fn run_master<C, R>(
        &self,
        catalog: &C,
        reconstructor: &R,
        view_id: usize,
    ) -> Result<Report, Error>
    where
        C: ViewCatalog,
        R: Reconstructor<C>,
    {
        let start = Instant::now();
        let num_views = catalog.num_views();
        if view_id >= num_views {
            return Err(Error::InvalidViewId { view_id, num_views });
        }
        let view = catalog
            .view(view_id)
            .ok_or(Error::MissingView { view_id })?;
        info!("reconstructing view ID {}", view_id);
        self.progress.register_views(&[view_id]);
        let job = self.job(catalog, view_id, true);
        match self.execute(catalog, reconstructor, view, &job) {
            Ok(()) => {
                self.progress.job_finished(view_id, Outcome::Done);
                let mut outcomes = BTreeMap::new();
                outcomes.insert(view_id, Outcome::Done);
                Ok(Report {
                    outcomes,
                    elapsed: start.elapsed(),
                })
            }
            Err(e) => {
                self.progress.job_finished(view_id, Outcome::Failed);
                Err(e)
            }
        }
    }

    /// Reconstructs every view in `view_ids` on a worker pool.
    ///
    /// Repeated ids are visited once. Only failing to start the pool is an
    /// error; per-view failures are logged and recorded in the report.
    pub fn run_batch<C, R>(
        &self,
        catalog: &C,
        reconstructor: &R,
        view_ids: &[usize],
    ) -> Result<Report, Error>
    where
        C: ViewCatalog,
        R: Reconstructor<C>,
    {
        let start = Instant::now();
        let view_ids: Vec<usize> = view_ids.iter().copied().unique().collect();
        self.progress.register_views(&view_ids);

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.settings.threads)
            .thread_name(|ix| format!("dmrecon-worker-{}", ix))
            .build()?;
        info!(
            "dispatching {} views to {} workers",
            view_ids.len(),
            pool.current_num_threads()
        );

        let (sender, receiver) = mpsc::channel();
        pool.scope_fifo(move |scope| {
            for view_id in view_ids {
                let sender = sender.clone();
                scope.spawn_fifo(move |_| {
                    let outcome = self.batch_job(catalog, reconstructor, view_id);
                    // The receiver outlives the scope.
                    sender.send((view_id, outcome)).ok();
                });
            }
        });

        let outcomes: BTreeMap<usize, Outcome> = receiver.into_iter().collect();
        let report = Report {
            outcomes,
            elapsed: start.elapsed(),
        };
        info!(
            "batch finished: {} done, {} failed, {} skipped",
            report.done(),
            report.failed(),
            report.skipped()
        );
        Ok(report)
    }

    /// Applies the skip policy to one batch view and runs it if it passes.
    fn batch_job<C, R>(&self, catalog: &C, reconstructor: &R, view_id: usize) -> Outcome
    where
        C: ViewCatalog,
        R: Reconstructor<C>,
    {
        let outcome = match self.admit(catalog, view_id) {
            Err(reason) => Outcome::Skipped(reason),
            Ok((view, job)) => match self.execute(catalog, reconstructor, view, &job) {
                Ok(()) => Outcome::Done,
                Err(e) => {
                    error!("{}", e);
                    Outcome::Failed
                }
            },
        };
        self.progress.job_finished(view_id, outcome);
        outcome
    }

    fn admit<'a, C: ViewCatalog>(
        &self,
        catalog: &'a C,
        view_id: usize,
    ) -> Result<(&'a C::View, ViewJob), SkipReason> {
        if view_id >= catalog.num_views() {
            info!("invalid ID {}, skipping", view_id);
            return Err(SkipReason::InvalidViewId);
        }
        let view = match catalog.view(view_id) {
            Some(view) if view.is_camera_valid() => view,
            _ => {
                debug!("view {} has no valid camera, skipping", view_id);
                return Err(SkipReason::InvalidCamera);
            }
        };
        let job = self.job(catalog, view_id, false);
        if !job.force && view.has_embedding(&job.target_embedding) {
            debug!(
                "view {} already has {}, skipping",
                view_id, job.target_embedding
            );
            return Err(SkipReason::AlreadyReconstructed);
        }
        Ok((view, job))
    }

    /// Runs the reconstructor for `job` and persists the view on success.
    ///
    /// A panic in either collaborator is returned as an error.
    fn execute<C, R>(
        &self,
        catalog: &C,
        reconstructor: &R,
        view: &C::View,
        job: &ViewJob,
    ) -> Result<(), Error>
    where
        C: ViewCatalog,
        R: Reconstructor<C>,
    {
        let view_id = job.view_id;
        self.progress.job_started(job);
        let start = Instant::now();
        panic::catch_unwind(AssertUnwindSafe(|| {
            reconstructor
                .reconstruct(catalog, &job.settings)
                .map_err(|source| Error::Reconstruction { view_id, source })?;
            view.save()
                .map_err(|source| Error::SaveView { view_id, source })
        }))
        .map_err(|payload| Error::JobPanic {
            view_id,
            message: panic_message(&*payload),
        })??;
        info!(
            "reconstructed {} of view {} in {:.1?}",
            job.target_embedding,
            view_id,
            start.elapsed()
        );
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
