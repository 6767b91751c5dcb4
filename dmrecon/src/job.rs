use crate::{MvsSettings, SceneView};
use log::*;

/// One view to reconstruct, with its settings already derived.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewJob {
    pub view_id: usize,
    /// The pyramid scale this view is reconstructed at
    pub scale: u32,
    /// The embedding the reconstruction writes, `depth-L{scale}`
    pub target_embedding: String,
    /// Set for the single view of a master run
    pub is_master: bool,
    /// Overwrite the target embedding if it already exists
    pub force: bool,
    /// The settings passed to the reconstructor
    pub settings: MvsSettings,
}

impl ViewJob {
    /// Copies the template and fills in the reference view and scale.
    ///
    /// With a `max_pixels` budget the scale is derived from the size of the
    /// view's source image, otherwise the template scale is kept.
    pub fn new<V: SceneView>(
        template: &MvsSettings,
        view_id: usize,
        view: Option<&V>,
        max_pixels: Option<u64>,
        is_master: bool,
        force: bool,
    ) -> Self {
        let mut settings = template.clone();
        settings.reference_view = view_id;
        if let Some(max_pixels) = max_pixels {
            settings.scale = view
                .and_then(|view| view.image_size(&settings.image_embedding))
                .map(|(width, height)| {
                    let scale = scale_for_max_pixels(width, height, max_pixels);
                    if scale > 0 {
                        debug!(
                            "setting scale {} for {}x{} image of view {}",
                            scale, width, height, view_id
                        );
                    }
                    scale
                })
                .unwrap_or(0);
        }
        Self {
            view_id,
            scale: settings.scale,
            target_embedding: settings.depth_embedding(),
            is_master,
            force: force || is_master,
            settings,
        }
    }
}

/// The smallest pyramid scale at which a `width` x `height` image has at most
/// `max_pixels` pixels.
///
/// Each scale halves both image sides, so this is
/// `max(0, ceil(log4(width * height / max_pixels)))`, computed exactly.
/// A budget of zero is treated as no budget.
pub fn scale_for_max_pixels(width: u32, height: u32, max_pixels: u64) -> u32 {
    if max_pixels == 0 {
        return 0;
    }
    let pixels = u64::from(width) * u64::from(height);
    let mut scale = 0;
    let mut budget = max_pixels;
    while pixels > budget {
        scale += 1;
        budget = budget.saturating_mul(4);
    }
    scale
}

/// Why a view was not reconstructed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The id is past the end of the catalog.
    InvalidViewId,
    /// The view slot is empty or the view has no usable camera pose.
    InvalidCamera,
    /// The target depth map exists and overwriting was not forced.
    AlreadyReconstructed,
}

/// The terminal state of a view in a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Outcome {
    Skipped(SkipReason),
    Done,
    Failed,
}

impl Outcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }
}
