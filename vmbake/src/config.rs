//! Image build configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::steps::Step;
use crate::validate;

/// Describes the image to produce: its name and the ordered steps applied to
/// the base image.
///
/// The step order is preserved exactly; later steps may rely on the disk
/// state left by earlier ones.
///
/// # Example
///
/// ```
/// use vmbake::{ImageConfig, Step};
///
/// let config = ImageConfig::new("base")
///     .with_step(Step::install_k8s())
///     .with_step(Step::prepull_k8s_images());
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl ImageConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step to the end of the sequence.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Check name and step ordering without touching any backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate::validate(self)
    }

    /// Load a configuration from a YAML (or JSON) file.
    ///
    /// Relative `run-script` paths are resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: ImageConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        if let Some(base) = path.parent() {
            for step in &mut config.steps {
                if let Step::RunScript(script) = step
                    && script.path.is_relative()
                {
                    script.path = base.join(&script.path);
                }
            }
        }

        tracing::debug!(
            path = %path.display(),
            image = %config.name,
            steps = config.steps.len(),
            "Loaded image config"
        );

        Ok(config)
    }
}
