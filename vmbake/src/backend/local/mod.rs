//! Host-local build backend.
//!
//! ## Layout
//!
//! ```text
//! ~/.vmbake/
//! ├── base.qcow2                    default base image
//! ├── images/{name}.qcow2           finished images
//! ├── builds/{name}-{build_id}/     working disk + rendered scripts
//! ├── failed/{name}-{build_id}/     retained failed builds (FailurePolicy::Retain)
//! ├── locks/{name}.lock             one running build per name
//! └── logs/
//! ```
//!
//! A build is a qcow2 overlay on the base image, mutated by
//! `virt-customize --run` and flattened with `qemu-img convert` on success.

mod disk;
pub mod layout;
mod lock;
mod scripts;
mod tool;

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::BuildBackend;
use crate::constants::{filenames, tools};
use crate::errors::{BackendError, BackendResult};
use crate::handle::{ImageHandle, WorkingImage};
use crate::options::{BakeOptions, FailurePolicy};
use crate::pipeline::BuildLog;
use disk::WorkDir;
use layout::ImageLayout;
use lock::BuildLock;

pub use tool::find_tool;

/// Resources held for one in-progress build.
///
/// Dropping it removes the workspace and releases the name lock.
#[derive(Debug)]
struct ActiveBuild {
    workdir: WorkDir,
    _lock: BuildLock,
}

/// Builds created by this backend and not yet finalized or abandoned,
/// keyed by build id.
struct ActiveBuilds {
    layout: ImageLayout,
    policy: FailurePolicy,
    builds: Mutex<HashMap<String, ActiveBuild>>,
}

impl ActiveBuilds {
    fn insert(&self, build_id: &str, build: ActiveBuild) {
        self.builds.lock().insert(build_id.to_string(), build);
    }

    /// Remove a build, rejecting images this backend did not issue.
    fn take(&self, image: &WorkingImage) -> BackendResult<ActiveBuild> {
        self.builds
            .lock()
            .remove(image.build_id())
            .ok_or_else(|| unknown_build(image))
    }

    fn contains(&self, image: &WorkingImage) -> bool {
        self.builds.lock().contains_key(image.build_id())
    }

    /// Dispose of a failed build according to the failure policy.
    ///
    /// Blocking; async callers go through `spawn_blocking`.
    fn release_failed(
        &self,
        build: ActiveBuild,
        name: &str,
        build_id: &str,
        reason: &str,
    ) -> BackendResult<()> {
        match self.policy {
            FailurePolicy::Discard => {
                tracing::info!(image = name, build_id, "Discarding failed build");
                drop(build);
                Ok(())
            }
            FailurePolicy::Retain => {
                let ActiveBuild { workdir, _lock } = build;
                let target = self.layout.failed_build_dir(name, build_id);

                std::fs::create_dir_all(self.layout.failed_dir()).map_err(|e| {
                    BackendError::Storage(format!("failed to create failed dir: {}", e))
                })?;
                std::fs::rename(workdir.path(), &target).map_err(|e| {
                    BackendError::Storage(format!(
                        "failed to move {} to {}: {}",
                        workdir.path().display(),
                        target.display(),
                        e
                    ))
                })?;
                workdir.leak();

                let marker = format!(
                    "image: {}\nbuild_id: {}\nfailed_at: {}\nreason: {}\n",
                    name,
                    build_id,
                    chrono::Utc::now().to_rfc3339(),
                    reason
                );
                std::fs::write(target.join(filenames::FAILED_MARKER), marker).map_err(|e| {
                    BackendError::Storage(format!("failed to write failure marker: {}", e))
                })?;

                tracing::info!(
                    image = name,
                    path = %target.display(),
                    "Retained failed build for inspection"
                );
                Ok(())
            }
        }
    }
}

fn unknown_build(image: &WorkingImage) -> BackendError {
    BackendError::Storage(format!(
        "unknown build {} for image '{}'",
        image.build_id(),
        image.name()
    ))
}

/// Attached to every working image this backend hands out.
///
/// If the image is dropped while its build is still active (the pipeline
/// future was dropped mid-build), the build is released like an abandon.
struct OrphanGuard {
    active: Weak<ActiveBuilds>,
    name: String,
    build_id: String,
}

impl Drop for OrphanGuard {
    fn drop(&mut self) {
        let Some(active) = self.active.upgrade() else {
            return;
        };
        let Some(build) = active.builds.lock().remove(&self.build_id) else {
            return;
        };

        tracing::warn!(
            image = %self.name,
            build_id = %self.build_id,
            "Working image dropped before finalize, releasing build"
        );
        if let Err(e) = active.release_failed(
            build,
            &self.name,
            &self.build_id,
            "build dropped before it finished",
        ) {
            tracing::warn!(image = %self.name, "Failed to release dropped build: {}", e);
        }
    }
}

/// Build backend operating on the local filesystem with `qemu-img` and
/// `virt-customize`.
pub struct LocalBackend {
    options: BakeOptions,
    layout: ImageLayout,
    active: Arc<ActiveBuilds>,
}

impl LocalBackend {
    pub fn new(options: BakeOptions) -> BackendResult<Self> {
        let layout = ImageLayout::new(options.home_dir.clone());
        layout.prepare()?;

        tracing::debug!(home = %layout.home_dir().display(), "Initialized local backend");

        let active = Arc::new(ActiveBuilds {
            layout: layout.clone(),
            policy: options.failure_policy,
            builds: Mutex::new(HashMap::new()),
        });

        Ok(Self {
            options,
            layout,
            active,
        })
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn options(&self) -> &BakeOptions {
        &self.options
    }

    fn tool(&self, name: &str) -> BackendResult<PathBuf> {
        find_tool(self.options.tools_dir.as_deref(), name)
    }

    /// Take the name lock and create an empty workspace for a new build.
    fn begin_build(&self, name: &str) -> BackendResult<(WorkingImage, ActiveBuild)> {
        let lock = BuildLock::acquire(&self.layout.lock_path(name), name)?;

        // Checked again under the lock: a concurrent build may have just finished
        let image_path = self.layout.image_path(name);
        if image_path.exists() {
            return Err(BackendError::AlreadyExists(format!(
                "image '{}' at {}",
                name,
                image_path.display()
            )));
        }

        let build_id = ulid::Ulid::new().to_string();
        let workdir = WorkDir::create(self.layout.build_dir(name, &build_id))?;
        let working = WorkingImage::new(
            name,
            build_id,
            workdir.path().join(filenames::WORK_DISK),
        );

        Ok((
            working,
            ActiveBuild {
                workdir,
                _lock: lock,
            },
        ))
    }

    /// Track `build` as active and tie its release to the working image.
    fn register(&self, working: WorkingImage, build: ActiveBuild) -> WorkingImage {
        self.active.insert(working.build_id(), build);
        let guard = OrphanGuard {
            active: Arc::downgrade(&self.active),
            name: working.name().to_string(),
            build_id: working.build_id().to_string(),
        };
        working.with_release_guard(guard)
    }

    fn ensure_active(&self, image: &WorkingImage) -> BackendResult<()> {
        if self.active.contains(image) {
            Ok(())
        } else {
            Err(unknown_build(image))
        }
    }

    async fn release_failed(
        &self,
        build: ActiveBuild,
        image: &WorkingImage,
        reason: &str,
    ) -> BackendResult<()> {
        let active = Arc::clone(&self.active);
        let name = image.name().to_string();
        let build_id = image.build_id().to_string();
        let reason = reason.to_string();

        tokio::task::spawn_blocking(move || {
            active.release_failed(build, &name, &build_id, &reason)
        })
        .await
        .map_err(|e| BackendError::Storage(format!("release task failed: {}", e)))?
    }

    /// Run a script inside the working image with `virt-customize`.
    async fn customize(
        &self,
        image: &WorkingImage,
        script: &Path,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        self.ensure_active(image)?;
        let virt_customize = self.tool(tools::VIRT_CUSTOMIZE)?;

        let mut args: Vec<OsString> = vec![
            "-a".into(),
            image.disk_path().into(),
            "--memsize".into(),
            self.options.memory_mib.to_string().into(),
        ];
        args.push(if self.options.network {
            "--network".into()
        } else {
            "--no-network".into()
        });
        args.push("--run".into());
        args.push(script.into());

        tool::run(&virt_customize, args, log).await?;
        Ok(())
    }

    /// Write a built-in script into the build workspace.
    async fn render_script(
        &self,
        image: &WorkingImage,
        file_name: &str,
        contents: &str,
    ) -> BackendResult<PathBuf> {
        let dir = image.disk_path().parent().ok_or_else(|| {
            BackendError::Storage(format!(
                "working disk {} has no parent directory",
                image.disk_path().display()
            ))
        })?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, contents).await.map_err(|e| {
            BackendError::Storage(format!("failed to write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}

#[async_trait]
impl BuildBackend for LocalBackend {
    async fn create_base_image(&self, name: &str) -> BackendResult<WorkingImage> {
        let image_path = self.layout.image_path(name);
        if image_path.exists() {
            return Err(BackendError::AlreadyExists(format!(
                "image '{}' at {}",
                name,
                image_path.display()
            )));
        }

        // qemu-img resolves a relative backing file against the overlay's directory
        let requested = self.options.base_image_path();
        let base = match tokio::fs::canonicalize(&requested).await {
            Ok(path) if path.is_file() => path,
            _ => {
                return Err(BackendError::NotFound(format!(
                    "base image {}",
                    requested.display()
                )));
            }
        };

        let qemu_img = self.tool(tools::QEMU_IMG)?;
        let (working, build) = self.begin_build(name)?;

        // On error `build` drops here, removing the workspace and the lock
        disk::create_overlay(&qemu_img, &base, working.disk_path()).await?;

        tracing::info!(
            image = name,
            build_id = working.build_id(),
            base = %base.display(),
            "Created working image"
        );

        Ok(self.register(working, build))
    }

    async fn install_k8s(
        &self,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        let script = scripts::install_k8s(&self.options.kubernetes_version);
        let path = self.render_script(image, "install-k8s.sh", &script).await?;
        self.customize(image, &path, log).await
    }

    async fn prepull_k8s_images(
        &self,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        let path = self
            .render_script(image, "prepull-k8s-images.sh", scripts::prepull_k8s_images())
            .await?;
        self.customize(image, &path, log).await
    }

    async fn run_script(
        &self,
        image: &WorkingImage,
        script: &Path,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        if !script.is_file() {
            return Err(BackendError::NotFound(format!(
                "script {}",
                script.display()
            )));
        }
        self.customize(image, script, log).await
    }

    async fn finalize(&self, image: WorkingImage) -> BackendResult<ImageHandle> {
        let build = self.active.take(&image)?;

        let final_path = self.layout.image_path(image.name());
        let partial = self.layout.partial_image_path(image.name(), image.build_id());

        let persisted = async {
            let qemu_img = self.tool(tools::QEMU_IMG)?;
            disk::flatten(&qemu_img, image.disk_path(), &partial).await?;
            tokio::fs::rename(&partial, &final_path).await.map_err(|e| {
                BackendError::Storage(format!(
                    "failed to move image into place at {}: {}",
                    final_path.display(),
                    e
                ))
            })
        }
        .await;

        if let Err(e) = persisted {
            let _ = tokio::fs::remove_file(&partial).await;
            if let Err(release_err) = self.release_failed(build, &image, &e.to_string()).await {
                tracing::warn!(image = image.name(), "Failed to release build: {}", release_err);
            }
            return Err(e);
        }

        // Workspace removed and lock released
        drop(build);

        tracing::info!(image = image.name(), path = %final_path.display(), "Persisted image");
        Ok(ImageHandle::new(image.name(), final_path))
    }

    async fn abandon(&self, image: WorkingImage, reason: &str) -> BackendResult<()> {
        let build = self.active.take(&image)?;
        self.release_failed(build, &image, reason).await
    }
}
