//! Image build orchestration.
//!
//! ## Architecture
//!
//! ```text
//! validate ──→ create_base_image ──→ step 1 ──→ step 2 ──→ … ──→ finalize
//!                                       │          │
//!                                       └──────────┴──→ abandon (on failure or cancel)
//! ```
//!
//! Steps run strictly one after another in configuration order; the first
//! failure stops the build. Cancellation is honored between steps and before
//! finalizing; a step already running is left to finish.

mod log;

pub use log::BuildLog;

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::backend::BuildBackend;
use crate::config::ImageConfig;
use crate::errors::{BakeError, BakeResult, BuildPhase};
use crate::handle::{ImageHandle, WorkingImage};
use crate::steps::Customize;

/// Drives one backend through image builds.
///
/// The pipeline holds no per-build state, so one instance can run several
/// builds of different images concurrently.
///
/// # Example
///
/// ```ignore
/// let backend = LocalBackend::new(BakeOptions::default())?;
/// let config = ImageConfig::new("base").with_step(Step::install_k8s());
/// let mut log = BuildLog::stdout();
///
/// let image = ImagePipeline::new(&backend)
///     .build(&config, Some(&mut log))
///     .await?;
/// ```
pub struct ImagePipeline<'a> {
    backend: &'a dyn BuildBackend,
    cancel: CancellationToken,
}

impl<'a> ImagePipeline<'a> {
    pub fn new(backend: &'a dyn BuildBackend) -> Self {
        Self {
            backend,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop builds between steps once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the image described by `config`.
    ///
    /// Progress lines go to `log` when present. On any failure after the base
    /// image was created, the working image is handed back to the backend via
    /// [`BuildBackend::abandon`] and no handle is returned.
    pub async fn build(
        &self,
        config: &ImageConfig,
        mut log: Option<&mut BuildLog>,
    ) -> BakeResult<ImageHandle> {
        config.validate()?;

        let started = Instant::now();
        let total = config.steps.len();

        tracing::info!(image = %config.name, steps = total, "Starting image build");

        let working = self
            .backend
            .create_base_image(&config.name)
            .await
            .map_err(|source| BakeError::Backend {
                phase: BuildPhase::Create,
                source,
            })?;

        tracing::debug!(
            image = %config.name,
            build_id = working.build_id(),
            disk = %working.disk_path().display(),
            "Created working image"
        );

        for (index, step) in config.steps.iter().enumerate() {
            let position = index + 1;

            if self.cancel.is_cancelled() {
                let err = BakeError::Cancelled { completed: index };
                return Err(self.abandon(working, err).await);
            }

            if let Some(log) = log.as_deref_mut() {
                log.line(format_args!("[{position}/{total}] applying step {step}..."));
            }
            tracing::info!(image = %config.name, step = %step.kind(), position, "Applying step");

            let step_started = Instant::now();
            if let Err(source) = step.apply(self.backend, &working, log.as_deref_mut()).await {
                let err = BakeError::Step {
                    kind: step.kind(),
                    position,
                    source,
                };
                return Err(self.abandon(working, err).await);
            }

            tracing::info!(
                image = %config.name,
                step = %step.kind(),
                position,
                elapsed_ms = step_started.elapsed().as_millis() as u64,
                "Step completed"
            );
        }

        if self.cancel.is_cancelled() {
            let err = BakeError::Cancelled { completed: total };
            return Err(self.abandon(working, err).await);
        }

        // finalize consumes the working image; the backend cleans up on its own failure
        let image = self
            .backend
            .finalize(working)
            .await
            .map_err(|source| BakeError::Backend {
                phase: BuildPhase::Finalize,
                source,
            })?;

        if let Some(log) = log.as_deref_mut() {
            log.line(format_args!("image {} ready at {}", image.name(), image.path().display()));
        }
        tracing::info!(
            image = image.name(),
            path = %image.path().display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Image build completed"
        );

        Ok(image)
    }

    /// Release a working image after `err`, returning `err` unchanged.
    async fn abandon(&self, working: WorkingImage, err: BakeError) -> BakeError {
        tracing::warn!(
            image = working.name(),
            build_id = working.build_id(),
            error = %err,
            "Image build failed, abandoning working image"
        );

        let name = working.name().to_string();
        if let Err(e) = self.backend.abandon(working, &err.to_string()).await {
            tracing::warn!(image = %name, "Failed to abandon working image: {}", e);
        }

        err
    }
}
