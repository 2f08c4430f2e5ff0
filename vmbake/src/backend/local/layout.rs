use std::path::{Path, PathBuf};

use crate::constants::filenames;
use crate::errors::{BackendError, BackendResult};

/// Directory structure constants
pub mod dirs {
    /// Base directory name for vmbake data
    pub const VMBAKE_DIR: &str = ".vmbake";

    /// Subdirectory for finished images
    pub const IMAGES_DIR: &str = "images";

    /// Subdirectory for in-progress builds (one directory per build)
    pub const BUILDS_DIR: &str = "builds";

    /// Subdirectory for failed builds kept for debugging
    pub const FAILED_DIR: &str = "failed";

    /// Subdirectory for per-image build locks
    pub const LOCKS_DIR: &str = "locks";

    /// Subdirectory for log files
    pub const LOGS_DIR: &str = "logs";
}

// ============================================================================
// FILESYSTEM LAYOUT (home directory)
// ============================================================================

#[derive(Clone, Debug)]
pub struct ImageLayout {
    home_dir: PathBuf,
}

impl ImageLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Finished images: ~/.vmbake/images
    pub fn images_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::IMAGES_DIR)
    }

    /// In-progress builds: ~/.vmbake/builds
    pub fn builds_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::BUILDS_DIR)
    }

    /// Retained failed builds: ~/.vmbake/failed
    pub fn failed_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::FAILED_DIR)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOCKS_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(dirs::LOGS_DIR)
    }

    /// Persisted image: ~/.vmbake/images/{name}.qcow2
    pub fn image_path(&self, name: &str) -> PathBuf {
        self.images_dir()
            .join(format!("{}.{}", name, filenames::IMAGE_EXT))
    }

    /// Hidden file a finished image is written to before the final rename.
    ///
    /// Lives in images/ so the rename stays on one filesystem.
    pub fn partial_image_path(&self, name: &str, build_id: &str) -> PathBuf {
        self.images_dir().join(format!(".{}.{}.partial", name, build_id))
    }

    /// Workspace of one build: ~/.vmbake/builds/{name}-{build_id}
    pub fn build_dir(&self, name: &str, build_id: &str) -> PathBuf {
        self.builds_dir().join(format!("{}-{}", name, build_id))
    }

    /// Retained failed build: ~/.vmbake/failed/{name}-{build_id}
    pub fn failed_build_dir(&self, name: &str, build_id: &str) -> PathBuf {
        self.failed_dir().join(format!("{}-{}", name, build_id))
    }

    /// Build lock for an image name: ~/.vmbake/locks/{name}.lock
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.locks_dir().join(format!("{}.lock", name))
    }

    /// Initialize the filesystem structure.
    pub fn prepare(&self) -> BackendResult<()> {
        for dir in [
            self.home_dir.clone(),
            self.images_dir(),
            self.builds_dir(),
            self.locks_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                BackendError::Storage(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}
