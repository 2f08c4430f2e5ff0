//! Disk image operations backed by `qemu-img`.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::tool;
use crate::errors::{BackendError, BackendResult};

/// Subset of `qemu-img info --output=json`.
#[derive(Debug, Deserialize)]
struct ImageInfo {
    format: String,
    #[serde(rename = "virtual-size")]
    virtual_size: u64,
}

/// Read the format and virtual size of a disk image.
async fn inspect(qemu_img: &Path, image: &Path) -> BackendResult<ImageInfo> {
    let output = tool::run(
        qemu_img,
        [
            OsStr::new("info"),
            OsStr::new("--output=json"),
            image.as_os_str(),
        ],
        None,
    )
    .await?;

    serde_json::from_slice(&output.stdout).map_err(|e| {
        BackendError::Storage(format!(
            "failed to parse qemu-img info for {}: {}",
            image.display(),
            e
        ))
    })
}

/// Create a qcow2 copy-on-write child of `base` at `child`.
///
/// Reads come from the base (never modified), writes go to the child.
pub async fn create_overlay(qemu_img: &Path, base: &Path, child: &Path) -> BackendResult<()> {
    let info = inspect(qemu_img, base).await?;

    tracing::info!(
        base = %base.display(),
        child = %child.display(),
        format = %info.format,
        virtual_size_mib = info.virtual_size / (1024 * 1024),
        "Creating qcow2 overlay"
    );

    tool::run(
        qemu_img,
        [
            OsStr::new("create"),
            OsStr::new("-f"),
            OsStr::new("qcow2"),
            OsStr::new("-F"),
            OsStr::new(&info.format),
            OsStr::new("-b"),
            base.as_os_str(),
            child.as_os_str(),
        ],
        None,
    )
    .await?;

    Ok(())
}

/// Write `source` and its backing chain into a standalone qcow2 at `dest`.
pub async fn flatten(qemu_img: &Path, source: &Path, dest: &Path) -> BackendResult<()> {
    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        "Flattening image"
    );

    tool::run(
        qemu_img,
        [
            OsStr::new("convert"),
            OsStr::new("-O"),
            OsStr::new("qcow2"),
            source.as_os_str(),
            dest.as_os_str(),
        ],
        None,
    )
    .await?;

    Ok(())
}

/// RAII-managed build workspace.
///
/// Removes the directory (working disk, rendered scripts) on drop unless it
/// was moved elsewhere with [`WorkDir::leak`].
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    pub fn create(path: PathBuf) -> BackendResult<Self> {
        std::fs::create_dir_all(&path).map_err(|e| {
            BackendError::Storage(format!(
                "failed to create build directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume without cleanup.
    pub fn leak(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }

        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!("Failed to cleanup build dir {}: {}", self.path.display(), e);
            } else {
                tracing::debug!("Cleaned up build dir: {}", self.path.display());
            }
        }
    }
}
