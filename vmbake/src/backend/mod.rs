//! Build backends.
//!
//! A backend owns the disk substrate: it creates the working copy of the base
//! image, performs the mutation behind each step kind, and persists or
//! discards the result. [`LocalBackend`] drives host tools (`qemu-img`,
//! `virt-customize`); tests substitute recording fakes.

pub mod local;

pub use local::LocalBackend;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::BackendResult;
use crate::handle::{ImageHandle, WorkingImage};
use crate::pipeline::BuildLog;

/// Substrate that creates, mutates and persists VM disk images.
///
/// Every call may block for a long time (disk copies, package installs,
/// image pulls). A backend must give each [`WorkingImage`] to exactly one
/// build; it may serve builds of different images concurrently.
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// Create a fresh working copy of the base image for `name`.
    ///
    /// Fails with [`AlreadyExists`](crate::BackendError::AlreadyExists) when an
    /// image or a running build already uses the name.
    async fn create_base_image(&self, name: &str) -> BackendResult<WorkingImage>;

    /// Install a container runtime and Kubernetes tooling.
    async fn install_k8s(
        &self,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()>;

    /// Pull the container images a cluster needs at boot into the runtime storage.
    async fn prepull_k8s_images(
        &self,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()>;

    /// Run the shell script at `script` inside the image.
    async fn run_script(
        &self,
        image: &WorkingImage,
        script: &Path,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()>;

    /// Persist a fully customized image.
    async fn finalize(&self, image: WorkingImage) -> BackendResult<ImageHandle>;

    /// Release a working image whose build failed or was cancelled.
    ///
    /// Whether the disk is discarded or retained for debugging is up to the
    /// backend; either way it must never look like a finished image.
    async fn abandon(&self, image: WorkingImage, reason: &str) -> BackendResult<()>;
}
