use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Customize, StepKind};
use crate::backend::BuildBackend;
use crate::errors::BackendResult;
use crate::handle::WorkingImage;
use crate::pipeline::BuildLog;

/// Install a container runtime and the Kubernetes tooling (kubeadm, kubelet, kubectl).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallK8s {}

#[async_trait]
impl Customize for InstallK8s {
    fn kind(&self) -> StepKind {
        StepKind::InstallK8s
    }

    async fn apply(
        &self,
        backend: &dyn BuildBackend,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        backend.install_k8s(image, log).await
    }
}
