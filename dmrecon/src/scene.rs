//! The scene collaborators the scheduler drives.
//!
//! Persistence, camera models and the reconstruction algorithm all live
//! outside this crate. The scheduler only needs to look views up, ask a few
//! questions about them, hand them to a [`Reconstructor`] and tell them to
//! persist.

use crate::{BoxError, MvsSettings};

/// A single view of a scene.
///
/// Views are shared between batch workers. A worker only ever mutates the
/// view its job is for, so implementations that store new embeddings need
/// interior mutability scoped to the view, not to the catalog.
pub trait SceneView: Sync {
    /// Returns true if the view has a usable camera pose.
    fn is_camera_valid(&self) -> bool;

    /// Returns true if the view carries an embedding called `name`.
    fn has_embedding(&self, name: &str) -> bool;

    /// The `(width, height)` of the image embedding called `name`, if present.
    fn image_size(&self, name: &str) -> Option<(u32, u32)>;

    /// Writes the view, including newly reconstructed embeddings, to durable storage.
    fn save(&self) -> Result<(), BoxError>;
}

/// An ordered collection of views, some of which may be missing.
pub trait ViewCatalog: Sync {
    type View: SceneView;

    /// The number of view slots, including missing views.
    fn num_views(&self) -> usize;

    /// The view with id `id`, or `None` if the slot is empty or out of range.
    fn view(&self, id: usize) -> Option<&Self::View>;

    /// Writes every view back to durable storage at the end of a run.
    fn save_views(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Loads the catalog a run operates on.
pub trait SceneLoader {
    type Catalog: ViewCatalog;

    fn load(&self) -> Result<Self::Catalog, BoxError>;
}

impl<F, C> SceneLoader for F
where
    F: Fn() -> Result<C, BoxError>,
    C: ViewCatalog,
{
    type Catalog = C;

    fn load(&self) -> Result<C, BoxError> {
        self()
    }
}

/// The dense reconstruction of one reference view.
///
/// This is one blocking, potentially long running call. It reads neighbor
/// views from the catalog and stores its output embeddings into the
/// reference view given by [`MvsSettings::reference_view`]. Any error marks
/// the job as failed.
pub trait Reconstructor<C: ViewCatalog>: Sync {
    fn reconstruct(&self, catalog: &C, settings: &MvsSettings) -> Result<(), BoxError>;
}

impl<C, F> Reconstructor<C> for F
where
    C: ViewCatalog,
    F: Fn(&C, &MvsSettings) -> Result<(), BoxError> + Sync,
{
    fn reconstruct(&self, catalog: &C, settings: &MvsSettings) -> Result<(), BoxError> {
        self(catalog, settings)
    }
}
