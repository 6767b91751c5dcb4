#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The settings handed to the depth map reconstructor for one view.
///
/// The scheduler treats this as a template: every job gets its own copy with
/// `reference_view` and `scale` filled in.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MvsSettings {
    /// The view whose depth map is reconstructed
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub reference_view: usize,
    /// The pyramid level to reconstruct at, 0 is the original resolution
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub scale: u32,
    /// The embedding holding the source image of each view
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_image_embedding")
    )]
    pub image_embedding: String,
    /// The number of neighbor views chosen by global view selection
    #[cfg_attr(
        feature = "serde-serialize",
        serde(default = "default_global_view_selection_max")
    )]
    pub global_view_selection_max: usize,
    /// Patch size for NCC based comparison
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_filter_width"))]
    pub filter_width: u32,
    /// Compensate for color differences between views
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_true"))]
    pub use_color_scale: bool,
    /// Store the depth derivative map into the view
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub keep_dz_map: bool,
    /// Store the confidence map into the view
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub keep_confidence_map: bool,
    /// Where to write a point cloud per view, if anywhere
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub ply_path: Option<PathBuf>,
    /// Where the reconstructor writes its logs, if anywhere
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub log_path: Option<PathBuf>,
    /// Suppress the reconstructor's own progress output
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub quiet: bool,
}

impl MvsSettings {
    /// The name of the embedding this reconstruction produces.
    pub fn depth_embedding(&self) -> String {
        depth_embedding_name(self.scale)
    }
}

/// The embedding name of a depth map at pyramid `scale`.
pub fn depth_embedding_name(scale: u32) -> String {
    format!("depth-L{}", scale)
}

impl Default for MvsSettings {
    fn default() -> Self {
        Self {
            reference_view: 0,
            scale: 0,
            image_embedding: default_image_embedding(),
            global_view_selection_max: default_global_view_selection_max(),
            filter_width: default_filter_width(),
            use_color_scale: true,
            keep_dz_map: false,
            keep_confidence_map: false,
            ply_path: None,
            log_path: None,
            quiet: false,
        }
    }
}

/// How job progress is reported.
#[cfg_attr(
    feature = "serde-serialize",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ProgressStyle {
    /// Nothing is reported.
    Silent,
    /// One log line per job event.
    Simple,
    /// A status table summarized periodically from a background thread.
    #[default]
    Fancy,
}

/// The settings for a reconstruction run.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    /// Reconstruct only this view, synchronously, and fail the run if it fails
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub master_view: Option<usize>,
    /// The views to reconstruct in batch mode, all views if empty
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub view_ids: Vec<usize>,
    /// Limit on the master image size in pixels, which raises the scale per view
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub max_pixels: Option<u64>,
    /// Reconstruct and overwrite existing depth maps
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub force: bool,
    /// Worker threads in batch mode, 0 picks one per CPU
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub threads: usize,
    /// How progress is reported
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub progress: ProgressStyle,
    /// The template for the per-view reconstruction settings
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub mvs: MvsSettings,
}

impl Settings {
    /// Reconstruct a single master view.
    pub fn master_view(self, master_view: usize) -> Self {
        Self {
            master_view: Some(master_view),
            ..self
        }
    }

    /// Restrict batch mode to the given views.
    pub fn view_ids(self, view_ids: Vec<usize>) -> Self {
        Self { view_ids, ..self }
    }

    /// Derive each view's scale from a pixel budget.
    pub fn max_pixels(self, max_pixels: u64) -> Self {
        Self {
            max_pixels: Some(max_pixels),
            ..self
        }
    }

    /// Overwrite existing depth maps.
    pub fn force(self, force: bool) -> Self {
        Self { force, ..self }
    }

    /// Set the number of batch workers.
    pub fn threads(self, threads: usize) -> Self {
        Self { threads, ..self }
    }

    /// Set how progress is reported.
    ///
    /// Unless the style is [`ProgressStyle::Simple`] the reconstructor is made
    /// quiet so progress isn't reported twice. A quiet template stays quiet.
    pub fn progress(self, progress: ProgressStyle) -> Self {
        let mvs = MvsSettings {
            quiet: self.mvs.quiet || progress != ProgressStyle::Simple,
            ..self.mvs
        };
        Self {
            progress,
            mvs,
            ..self
        }
    }

    /// Set the reconstruction settings template.
    pub fn mvs(self, mvs: MvsSettings) -> Self {
        Self { mvs, ..self }
    }
}

fn default_image_embedding() -> String {
    "undistorted".to_owned()
}

fn default_global_view_selection_max() -> usize {
    20
}

fn default_filter_width() -> u32 {
    5
}

#[cfg(feature = "serde-serialize")]
fn default_true() -> bool {
    true
}
