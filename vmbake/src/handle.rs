//! Image references handed out by a build backend.
//!
//! The two types are deliberately distinct: a [`WorkingImage`] is only ever
//! seen by the pipeline and the backend, while an [`ImageHandle`] can only be
//! obtained from [`BuildBackend::finalize`](crate::BuildBackend::finalize),
//! which consumes the working image.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// In-progress disk owned by exactly one build.
///
/// A backend may attach a release guard with [`WorkingImage::with_release_guard`].
/// The guard is dropped with the working image, which lets the backend reclaim
/// a build whose pipeline was dropped before `finalize` or `abandon` ran.
pub struct WorkingImage {
    name: String,
    build_id: String,
    disk_path: PathBuf,
    release_guard: Option<Box<dyn Any + Send + Sync>>,
}

impl WorkingImage {
    pub fn new(name: impl Into<String>, build_id: impl Into<String>, disk_path: PathBuf) -> Self {
        Self {
            name: name.into(),
            build_id: build_id.into(),
            disk_path,
            release_guard: None,
        }
    }

    /// Attach a value that is dropped together with this working image.
    pub fn with_release_guard(mut self, guard: impl Send + Sync + 'static) -> Self {
        self.release_guard = Some(Box::new(guard));
        self
    }

    /// Name the image will be persisted under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend-assigned identifier of this build attempt.
    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    /// Path of the disk being customized.
    pub fn disk_path(&self) -> &Path {
        &self.disk_path
    }
}

impl fmt::Debug for WorkingImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingImage")
            .field("name", &self.name)
            .field("build_id", &self.build_id)
            .field("disk_path", &self.disk_path)
            .field("guarded", &self.release_guard.is_some())
            .finish()
    }
}

impl PartialEq for WorkingImage {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.build_id == other.build_id
            && self.disk_path == other.disk_path
    }
}

impl Eq for WorkingImage {}

/// Reference to a completed, persisted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    name: String,
    path: PathBuf,
}

impl ImageHandle {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path.display())
    }
}
