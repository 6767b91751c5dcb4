//! Depth map reconstruction scheduling for multi-view scenes.
//!
//! Dense reconstruction produces one depth map per view and each view is an
//! independent, expensive job. This crate decides which views need a depth
//! map, derives the settings of each job, runs the jobs either for a single
//! master view or as a parallel batch, and reports progress along the way.
//!
//! The scene, its persistence and the reconstruction algorithm itself are
//! supplied by the caller through [`ViewCatalog`], [`SceneLoader`] and
//! [`Reconstructor`].

mod job;
mod progress;
mod scene;
mod scheduler;
mod settings;

pub use job::*;
pub use progress::*;
pub use scene::*;
pub use scheduler::*;
pub use settings::*;

use log::*;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the collaborators of a run.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How often the fancy progress reporter logs a summary.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum Error {
    #[error("error loading scene: {0}")]
    SceneLoad(#[source] BoxError),
    #[error("invalid view ID {view_id}, the scene has {num_views} views")]
    InvalidViewId { view_id: usize, num_views: usize },
    #[error("view {view_id} does not exist")]
    MissingView { view_id: usize },
    #[error("reconstruction of view {view_id} failed: {source}")]
    Reconstruction { view_id: usize, source: BoxError },
    #[error("job for view {view_id} panicked: {message}")]
    JobPanic { view_id: usize, message: String },
    #[error("unable to save view {view_id}: {source}")]
    SaveView { view_id: usize, source: BoxError },
    #[error("unable to save views: {0}")]
    SaveScene(#[source] BoxError),
    #[error("unable to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("unable to start progress reporter: {0}")]
    ProgressReporter(#[source] std::io::Error),
}

/// Loads a scene, reconstructs its depth maps and writes the views back.
///
/// This is the whole reconstruction run: failing to load the scene is an
/// error before any job is scheduled, the progress style decides which
/// [`Progress`] implementation observes the jobs, and the views are saved
/// once all jobs are finished. In master mode a failing job fails the run and
/// nothing is saved.
pub fn run<L, R>(settings: Settings, loader: &L, reconstructor: &R) -> Result<Report, Error>
where
    L: SceneLoader,
    R: Reconstructor<L::Catalog>,
{
    let catalog = loader.load().map_err(Error::SceneLoad)?;
    info!("loaded scene with {} views", catalog.num_views());

    let style = settings.progress;
    let settings = settings.progress(style);
    let mut reporter = None;
    let progress: Arc<dyn Progress> = match settings.progress {
        ProgressStyle::Silent => Arc::new(NoProgress),
        ProgressStyle::Simple => Arc::new(LogProgress),
        ProgressStyle::Fancy => {
            let monitor = Arc::new(ProgressMonitor::new());
            reporter = Some(
                monitor
                    .spawn(REPORT_INTERVAL)
                    .map_err(Error::ProgressReporter)?,
            );
            monitor
        }
    };

    let report = Scheduler::new(settings, progress).run(&catalog, reconstructor);
    if let Some(reporter) = reporter {
        reporter.stop();
        if reporter.join().is_err() {
            warn!("progress reporter panicked");
        }
    }
    let report = report?;

    info!("reconstruction took {} ms", report.elapsed.as_millis());
    info!("saving views back to disc");
    catalog.save_views().map_err(Error::SaveScene)?;
    Ok(report)
}
