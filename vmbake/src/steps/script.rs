use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Customize, StepKind};
use crate::backend::BuildBackend;
use crate::errors::BackendResult;
use crate::handle::WorkingImage;
use crate::pipeline::BuildLog;

/// Run a caller-supplied shell script inside the image.
///
/// The script is opaque: no sandboxing beyond what the backend provides, and
/// its exit status alone decides success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunScript {
    /// Host path of the script.
    pub path: PathBuf,
}

#[async_trait]
impl Customize for RunScript {
    fn kind(&self) -> StepKind {
        StepKind::RunScript
    }

    async fn apply(
        &self,
        backend: &dyn BuildBackend,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        backend.run_script(image, &self.path, log).await
    }
}
