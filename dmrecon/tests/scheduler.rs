use dmrecon::{
    BoxError, Error, MvsSettings, NoProgress, Outcome, ProgressMonitor, ProgressStyle,
    Reconstructor, Scheduler, SceneView, Settings, SkipReason, ViewCatalog,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct View {
    camera_valid: bool,
    size: Option<(u32, u32)>,
    embeddings: Mutex<BTreeSet<String>>,
    saves: AtomicUsize,
    panic_on_save: bool,
}

impl View {
    fn new(camera_valid: bool) -> Self {
        Self {
            camera_valid,
            size: Some((640, 480)),
            embeddings: Mutex::new(BTreeSet::new()),
            saves: AtomicUsize::new(0),
            panic_on_save: false,
        }
    }

    fn panicking_on_save(self) -> Self {
        Self {
            panic_on_save: true,
            ..self
        }
    }

    fn with_embedding(self, name: &str) -> Self {
        self.embeddings.lock().unwrap().insert(name.to_owned());
        self
    }

    fn sized(self, width: u32, height: u32) -> Self {
        Self {
            size: Some((width, height)),
            ..self
        }
    }

    fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SceneView for View {
    fn is_camera_valid(&self) -> bool {
        self.camera_valid
    }

    fn has_embedding(&self, name: &str) -> bool {
        self.embeddings.lock().unwrap().contains(name)
    }

    fn image_size(&self, name: &str) -> Option<(u32, u32)> {
        if name == "undistorted" {
            self.size
        } else {
            None
        }
    }

    fn save(&self) -> Result<(), BoxError> {
        if self.panic_on_save {
            panic!("disk vanished while saving");
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Catalog {
    views: Vec<Option<View>>,
    saved: Arc<AtomicBool>,
}

impl Catalog {
    fn new(views: Vec<Option<View>>) -> Self {
        Self {
            views,
            saved: Arc::new(AtomicBool::new(false)),
        }
    }

    fn valid(count: usize) -> Self {
        Self::new((0..count).map(|_| Some(View::new(true))).collect())
    }

    fn get(&self, id: usize) -> &View {
        self.views[id].as_ref().unwrap()
    }
}

impl ViewCatalog for Catalog {
    type View = View;

    fn num_views(&self) -> usize {
        self.views.len()
    }

    fn view(&self, id: usize) -> Option<&View> {
        self.views.get(id)?.as_ref()
    }

    fn save_views(&self) -> Result<(), BoxError> {
        self.saved.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes the target depth map into the reference view and remembers the settings it got.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<MvsSettings>>,
    fail: Vec<usize>,
    panic: Vec<usize>,
}

impl Recorder {
    fn failing(fail: Vec<usize>, panic: Vec<usize>) -> Self {
        Self {
            fail,
            panic,
            ..Default::default()
        }
    }

    fn reference_views(&self) -> BTreeSet<usize> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|settings| settings.reference_view)
            .collect()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Reconstructor<Catalog> for Recorder {
    fn reconstruct(&self, catalog: &Catalog, settings: &MvsSettings) -> Result<(), BoxError> {
        self.calls.lock().unwrap().push(settings.clone());
        let view_id = settings.reference_view;
        if self.panic.contains(&view_id) {
            panic!("depth estimation of view {} diverged", view_id);
        }
        if self.fail.contains(&view_id) {
            return Err(format!("view {} has no neighbors", view_id).into());
        }
        catalog
            .get(view_id)
            .embeddings
            .lock()
            .unwrap()
            .insert(settings.depth_embedding());
        Ok(())
    }
}

fn settings() -> Settings {
    let _ = pretty_env_logger::try_init_timed();
    Settings::default().progress(ProgressStyle::Silent).threads(2)
}

#[test]
fn batch_skips_views_without_camera() {
    let catalog = Catalog::new(vec![
        Some(View::new(true)),
        Some(View::new(false)),
        Some(View::new(true)),
    ]);
    let recorder = Recorder::default();
    let report = Scheduler::new(settings(), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();

    assert_eq!(report.outcome(0), Some(Outcome::Done));
    assert_eq!(
        report.outcome(1),
        Some(Outcome::Skipped(SkipReason::InvalidCamera))
    );
    assert_eq!(report.outcome(2), Some(Outcome::Done));
    assert_eq!(recorder.reference_views(), BTreeSet::from([0, 2]));
    assert!(catalog.get(0).has_embedding("depth-L0"));
    assert!(!catalog.get(1).has_embedding("depth-L0"));
    assert_eq!(catalog.get(0).saves(), 1);
    assert_eq!(catalog.get(1).saves(), 0);
}

#[test]
fn empty_slots_are_skipped() {
    let catalog = Catalog::new(vec![None, Some(View::new(true))]);
    let recorder = Recorder::default();
    let report = Scheduler::new(settings(), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();
    assert_eq!(
        report.outcome(0),
        Some(Outcome::Skipped(SkipReason::InvalidCamera))
    );
    assert_eq!(report.outcome(1), Some(Outcome::Done));
}

#[test]
fn existing_depth_maps_are_kept_unless_forced() {
    let catalog = Catalog::new(vec![
        Some(View::new(true).with_embedding("depth-L0")),
        Some(View::new(true).with_embedding("depth-L1")),
    ]);

    let recorder = Recorder::default();
    let report = Scheduler::new(settings(), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();
    assert_eq!(
        report.outcome(0),
        Some(Outcome::Skipped(SkipReason::AlreadyReconstructed))
    );
    // Only the embedding at the configured scale counts.
    assert_eq!(report.outcome(1), Some(Outcome::Done));
    assert_eq!(recorder.reference_views(), BTreeSet::from([1]));

    let recorder = Recorder::default();
    let report = Scheduler::new(settings().force(true), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();
    assert_eq!(report.done(), 2);
    assert_eq!(recorder.call_count(), 2);
}

#[test]
fn failures_are_isolated_to_their_view() {
    let catalog = Catalog::valid(5);
    let recorder = Recorder::failing(vec![1], vec![3]);
    let report = Scheduler::new(settings(), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();

    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.done(), 3);
    assert_eq!(report.failed(), 2);
    assert_eq!(report.outcome(1), Some(Outcome::Failed));
    assert_eq!(report.outcome(3), Some(Outcome::Failed));
    assert_eq!(catalog.get(1).saves(), 0);
    assert_eq!(catalog.get(3).saves(), 0);
    assert_eq!(catalog.get(4).saves(), 1);
}

#[test]
fn panicking_save_fails_only_its_view() {
    let saved = Arc::new(AtomicBool::new(false));
    let loader = || -> Result<Catalog, BoxError> {
        let mut catalog = Catalog::new(vec![
            Some(View::new(true)),
            Some(View::new(true).panicking_on_save()),
            Some(View::new(true)),
        ]);
        catalog.saved = saved.clone();
        Ok(catalog)
    };
    let recorder = Recorder::default();
    let report = dmrecon::run(settings(), &loader, &recorder).unwrap();

    assert_eq!(report.outcome(0), Some(Outcome::Done));
    assert_eq!(report.outcome(1), Some(Outcome::Failed));
    assert_eq!(report.outcome(2), Some(Outcome::Done));
    assert!(saved.load(Ordering::SeqCst));
}

#[test]
fn panicking_save_fails_master_run() {
    let catalog = Catalog::new(vec![Some(View::new(true).panicking_on_save())]);
    let recorder = Recorder::default();
    let result = Scheduler::new(settings().master_view(0), NoProgress).run(&catalog, &recorder);
    match result {
        Err(Error::JobPanic { view_id, message }) => {
            assert_eq!(view_id, 0);
            assert_eq!(message, "disk vanished while saving");
        }
        other => panic!("expected a panic error, got {:?}", other),
    }
}

#[test]
fn listed_views_are_visited_once() {
    let catalog = Catalog::valid(3);
    let recorder = Recorder::default();
    let report = Scheduler::new(settings().view_ids(vec![2, 7, 2, 0]), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(
        report.outcome(7),
        Some(Outcome::Skipped(SkipReason::InvalidViewId))
    );
    assert_eq!(report.outcome(1), None);
    assert_eq!(recorder.call_count(), 2);
    assert_eq!(recorder.reference_views(), BTreeSet::from([0, 2]));
}

#[test]
fn pixel_budget_selects_scale() {
    let catalog = Catalog::new(vec![
        Some(View::new(true).sized(2000, 2000)),
        Some(View::new(true).sized(20, 20)),
    ]);
    let recorder = Recorder::default();
    Scheduler::new(settings().max_pixels(1000), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();

    let calls = recorder.calls.lock().unwrap();
    let scale_of = |view_id: usize| {
        calls
            .iter()
            .find(|settings| settings.reference_view == view_id)
            .map(|settings| settings.scale)
    };
    assert_eq!(scale_of(0), Some(6));
    assert_eq!(scale_of(1), Some(0));
    assert!(catalog.get(0).has_embedding("depth-L6"));
    assert!(catalog.get(1).has_embedding("depth-L0"));
}

#[test]
fn jobs_carry_the_template() {
    let mvs = MvsSettings {
        filter_width: 7,
        keep_confidence_map: true,
        ..Default::default()
    };
    let catalog = Catalog::valid(2);
    let recorder = Recorder::default();
    Scheduler::new(settings().mvs(mvs), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();
    for settings in recorder.calls.lock().unwrap().iter() {
        assert_eq!(settings.filter_width, 7);
        assert!(settings.keep_confidence_map);
        assert_eq!(settings.scale, 0);
    }
}

#[test]
fn master_view_ignores_skip_policy() {
    let catalog = Catalog::new(vec![
        Some(View::new(true)),
        Some(View::new(false).with_embedding("depth-L0")),
    ]);
    let recorder = Recorder::default();
    let report = Scheduler::new(settings().master_view(1), NoProgress)
        .run(&catalog, &recorder)
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcome(1), Some(Outcome::Done));
    assert_eq!(recorder.reference_views(), BTreeSet::from([1]));
    assert_eq!(catalog.get(1).saves(), 1);
    assert_eq!(catalog.get(0).saves(), 0);
}

#[test]
fn master_view_failure_fails_the_run() {
    let catalog = Catalog::valid(3);
    let recorder = Recorder::failing(vec![2], vec![]);
    let result = Scheduler::new(settings().master_view(2), NoProgress).run(&catalog, &recorder);
    assert!(matches!(
        result,
        Err(Error::Reconstruction { view_id: 2, .. })
    ));

    let recorder = Recorder::failing(vec![], vec![0]);
    let result = Scheduler::new(settings().master_view(0), NoProgress).run(&catalog, &recorder);
    match result {
        Err(Error::JobPanic { view_id, message }) => {
            assert_eq!(view_id, 0);
            assert_eq!(message, "depth estimation of view 0 diverged");
        }
        other => panic!("expected a panic error, got {:?}", other),
    }
}

#[test]
fn master_view_must_exist() {
    let catalog = Catalog::new(vec![Some(View::new(true)), None]);
    let recorder = Recorder::default();

    let result = Scheduler::new(settings().master_view(5), NoProgress).run(&catalog, &recorder);
    assert!(matches!(
        result,
        Err(Error::InvalidViewId {
            view_id: 5,
            num_views: 2
        })
    ));

    let result = Scheduler::new(settings().master_view(1), NoProgress).run(&catalog, &recorder);
    assert!(matches!(result, Err(Error::MissingView { view_id: 1 })));
    assert_eq!(recorder.call_count(), 0);
}

#[test]
fn monitor_sees_every_view() {
    let catalog = Catalog::new(vec![
        Some(View::new(true)),
        Some(View::new(false)),
        Some(View::new(true)),
        Some(View::new(true)),
    ]);
    let recorder = Recorder::failing(vec![3], vec![]);
    let monitor = Arc::new(ProgressMonitor::new());
    Scheduler::new(settings(), monitor.clone())
        .run(&catalog, &recorder)
        .unwrap();

    let summary = monitor.summary();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.finished(), 4);
    assert_eq!(summary.done, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.running + summary.queued, 0);
}

#[test]
fn run_saves_the_scene() {
    let saved = Arc::new(AtomicBool::new(false));
    let loader = || -> Result<Catalog, BoxError> {
        let mut catalog = Catalog::valid(3);
        catalog.saved = saved.clone();
        Ok(catalog)
    };
    let recorder = Recorder::default();
    let report = dmrecon::run(settings().progress(ProgressStyle::Fancy), &loader, &recorder).unwrap();

    assert_eq!(report.done(), 3);
    assert!(saved.load(Ordering::SeqCst));
    for settings in recorder.calls.lock().unwrap().iter() {
        assert!(settings.quiet);
    }
}

#[test]
fn run_reports_load_failure() {
    let loader = || -> Result<Catalog, BoxError> { Err("scene directory not found".into()) };
    let recorder = Recorder::default();
    let result = dmrecon::run(settings(), &loader, &recorder);
    assert!(matches!(result, Err(Error::SceneLoad(_))));
    assert_eq!(recorder.call_count(), 0);
}

#[test]
fn failed_master_run_does_not_save() {
    let saved = Arc::new(AtomicBool::new(false));
    let loader = || -> Result<Catalog, BoxError> {
        let mut catalog = Catalog::valid(2);
        catalog.saved = saved.clone();
        Ok(catalog)
    };
    let recorder = Recorder::failing(vec![1], vec![]);
    let result = dmrecon::run(settings().master_view(1), &loader, &recorder);
    assert!(matches!(
        result,
        Err(Error::Reconstruction { view_id: 1, .. })
    ));
    assert!(!saved.load(Ordering::SeqCst));
}
