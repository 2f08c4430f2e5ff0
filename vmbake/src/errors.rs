//! Hierarchical error types for image builds.
//!
//! Errors are categorized by where a build stopped:
//! - [`ConfigError`]: the configuration was rejected before any backend work (user-fixable)
//! - [`BackendError`]: the build backend failed while creating, mutating or persisting a disk
//! - [`BakeError`]: top-level error returned by the pipeline, wrapping the above with
//!   the phase or step position it occurred at
//!
//! ```ignore
//! match pipeline.build(&config, None).await {
//!     Err(BakeError::Config(_)) => { /* fix flags and retry */ }
//!     Err(BakeError::Step { kind, position, .. }) => { /* inspect the failing step */ }
//!     Err(BakeError::Backend { phase, .. }) => { /* backend trouble */ }
//!     _ => {}
//! }
//! ```

use std::fmt;
use std::io;
use thiserror::Error;

use crate::steps::StepKind;

/// Result alias for pipeline operations.
pub type BakeResult<T> = Result<T, BakeError>;

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

// ============================================================================
// Top-Level Error
// ============================================================================

/// Errors returned by [`ImagePipeline::build`](crate::ImagePipeline::build).
///
/// No variant carries a usable image: a build either returns an
/// [`ImageHandle`](crate::ImageHandle) or one of these.
#[derive(Debug, Error)]
pub enum BakeError {
    /// Configuration rejected before the backend was touched.
    #[error("invalid image configuration: {0}")]
    Config(#[from] ConfigError),

    /// Backend failed outside of a customization step.
    #[error("{phase} failed: {source}")]
    Backend {
        phase: BuildPhase,
        #[source]
        source: BackendError,
    },

    /// A customization step failed. `position` is 1-based.
    #[error("step {position} ({kind}) failed: {source}")]
    Step {
        kind: StepKind,
        position: usize,
        #[source]
        source: BackendError,
    },

    /// The build was cancelled between steps.
    #[error("build cancelled after {completed} completed step(s)")]
    Cancelled { completed: usize },
}

impl BakeError {
    /// Kind and 1-based position of the failing step, if a step failed.
    pub fn failed_step(&self) -> Option<(StepKind, usize)> {
        match self {
            BakeError::Step { kind, position, .. } => Some((*kind, *position)),
            _ => None,
        }
    }
}

/// Pipeline phases that talk to the backend outside of steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// Creating the working copy of the base image.
    Create,
    /// Persisting the customized image.
    Finalize,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPhase::Create => f.write_str("creating base image"),
            BuildPhase::Finalize => f.write_str("finalizing image"),
        }
    }
}

// ============================================================================
// Configuration Errors (user-fixable)
// ============================================================================

/// Configuration or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Image name is empty.
    #[error("image name must not be empty")]
    EmptyName,

    /// Image name cannot be used as a file name.
    #[error("invalid image name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A step needs another step kind to run before it.
    #[error("step '{step}' at position {position} requires '{requires}' to run before it")]
    UnsatisfiedDependency {
        step: StepKind,
        position: usize,
        requires: StepKind,
    },

    /// Configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not a valid image configuration.
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

// ============================================================================
// Backend Errors
// ============================================================================

/// Errors raised by a [`BuildBackend`](crate::BuildBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    /// A required input (base image, script) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An image or build with this name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Disk or workspace manipulation failed.
    #[error("storage: {0}")]
    Storage(String),

    /// An external tool ran but reported failure.
    #[error("execution: {0}")]
    Execution(String),

    /// A required host tool is not installed.
    #[error("tool '{0}' not found (searched the tools directory and PATH)")]
    ToolNotFound(String),

    /// Generic IO error (catch-all).
    #[error("io: {0}")]
    Io(#[from] io::Error),
}
