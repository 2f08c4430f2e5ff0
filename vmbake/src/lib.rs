//! vmbake builds reusable VM disk images.
//!
//! A build takes a pristine base image and applies an ordered list of
//! customization steps to it (install Kubernetes prerequisites, pre-pull
//! container images, run arbitrary scripts), then persists the result:
//!
//! ```ignore
//! use vmbake::{BakeOptions, BuildLog, ImageConfig, ImagePipeline, LocalBackend, Step};
//!
//! let backend = LocalBackend::new(BakeOptions::default())?;
//! let config = ImageConfig::new("k8s-base")
//!     .with_step(Step::install_k8s())
//!     .with_step(Step::prepull_k8s_images());
//!
//! let image = ImagePipeline::new(&backend)
//!     .build(&config, Some(&mut BuildLog::stdout()))
//!     .await?;
//! println!("built {}", image.path().display());
//! ```
//!
//! Configurations are validated before the backend is touched, steps run
//! strictly in order, and the first failing step aborts the build.

pub mod backend;
pub mod config;
pub mod constants;
pub mod errors;
pub mod handle;
pub mod options;
pub mod pipeline;
pub mod steps;
pub mod util;
pub mod validate;

pub use backend::{BuildBackend, LocalBackend};
pub use config::ImageConfig;
pub use errors::{
    BackendError, BackendResult, BakeError, BakeResult, BuildPhase, ConfigError,
};
pub use handle::{ImageHandle, WorkingImage};
pub use options::{BakeOptions, FailurePolicy};
pub use pipeline::{BuildLog, ImagePipeline};
pub use steps::{Customize, Step, StepKind};
pub use util::init_logging;
