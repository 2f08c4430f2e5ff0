//! Customization steps.
//!
//! Each step kind is its own type implementing [`Customize`]. [`Step`] is the
//! closed set of kinds a configuration can name; it dispatches `apply` to the
//! variant and is what gets serialized into config files:
//!
//! ```yaml
//! steps:
//!   - kind: install-k8s
//!   - kind: prepull-k8s-images
//!   - kind: run-script
//!     path: ./setup.sh
//! ```
//!
//! Steps only describe *what* to change. The mutation itself is performed by
//! the [`BuildBackend`] entry point for that kind.

mod deps;
mod install_k8s;
mod prepull;
mod script;

pub use deps::required_before;
pub use install_k8s::InstallK8s;
pub use prepull::PrepullK8sImages;
pub use script::RunScript;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::BuildBackend;
use crate::errors::BackendResult;
use crate::handle::WorkingImage;
use crate::pipeline::BuildLog;

/// Discriminant of a [`Step`], used in errors, logs and the dependency table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    InstallK8s,
    PrepullK8sImages,
    RunScript,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::InstallK8s => "install-k8s",
            StepKind::PrepullK8sImages => "prepull-k8s-images",
            StepKind::RunScript => "run-script",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mutation applied to a working image.
///
/// Implementations must report failure unambiguously and be safe to re-run
/// when a whole build is retried. The pipeline never retries a step.
#[async_trait]
pub trait Customize: Send + Sync {
    fn kind(&self) -> StepKind;

    async fn apply(
        &self,
        backend: &dyn BuildBackend,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()>;
}

/// Customization step descriptor as it appears in an image configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Step {
    InstallK8s(InstallK8s),
    PrepullK8sImages(PrepullK8sImages),
    RunScript(RunScript),
}

impl Step {
    pub fn install_k8s() -> Self {
        Step::InstallK8s(InstallK8s {})
    }

    pub fn prepull_k8s_images() -> Self {
        Step::PrepullK8sImages(PrepullK8sImages {})
    }

    pub fn run_script(path: impl Into<PathBuf>) -> Self {
        Step::RunScript(RunScript { path: path.into() })
    }

    pub fn kind(&self) -> StepKind {
        self.as_customize().kind()
    }

    fn as_customize(&self) -> &dyn Customize {
        match self {
            Step::InstallK8s(step) => step,
            Step::PrepullK8sImages(step) => step,
            Step::RunScript(step) => step,
        }
    }
}

#[async_trait]
impl Customize for Step {
    fn kind(&self) -> StepKind {
        self.as_customize().kind()
    }

    async fn apply(
        &self,
        backend: &dyn BuildBackend,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        self.as_customize().apply(backend, image, log).await
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::RunScript(step) => write!(f, "{} ({})", self.kind(), step.path.display()),
            _ => write!(f, "{}", self.kind()),
        }
    }
}
