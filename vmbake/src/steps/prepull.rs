use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Customize, StepKind};
use crate::backend::BuildBackend;
use crate::errors::BackendResult;
use crate::handle::WorkingImage;
use crate::pipeline::BuildLog;

/// Pull the control-plane container images into the image's runtime storage,
/// so clusters booted from the image do not download them at startup.
///
/// Needs a working container runtime, see [`InstallK8s`](super::InstallK8s).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepullK8sImages {}

#[async_trait]
impl Customize for PrepullK8sImages {
    fn kind(&self) -> StepKind {
        StepKind::PrepullK8sImages
    }

    async fn apply(
        &self,
        backend: &dyn BuildBackend,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        backend.prepull_k8s_images(image, log).await
    }
}
