//! Configuration validation.
//!
//! Pure checks run before any backend work. A configuration that fails here
//! never reaches [`BuildBackend::create_base_image`](crate::BuildBackend::create_base_image).

use crate::config::ImageConfig;
use crate::errors::ConfigError;
use crate::steps::required_before;

/// Longest accepted image name, in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Validate an image configuration.
///
/// Checks, in order:
/// 1. the name is non-empty and usable as a single path component
/// 2. every step's required kinds appear earlier in the step list
///
/// Script paths are not checked here: a missing script is a failure of the
/// `run-script` step itself.
pub fn validate(config: &ImageConfig) -> Result<(), ConfigError> {
    validate_name(&config.name)?;

    for (index, step) in config.steps.iter().enumerate() {
        let kind = step.kind();
        let earlier = &config.steps[..index];

        for required in required_before(kind) {
            if !earlier.iter().any(|s| s.kind() == *required) {
                return Err(ConfigError::UnsatisfiedDependency {
                    step: kind,
                    position: index + 1,
                    requires: *required,
                });
            }
        }
    }

    Ok(())
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(ConfigError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("longer than 128 bytes"));
    }
    if name.starts_with('.') {
        return Err(invalid("must not start with '.'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid("only ASCII letters, digits, '.', '_' and '-' are allowed"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{Step, StepKind};

    #[test]
    fn accepts_install_then_prepull() {
        let config = ImageConfig::new("base")
            .with_step(Step::install_k8s())
            .with_step(Step::prepull_k8s_images());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn accepts_zero_steps() {
        assert!(validate(&ImageConfig::new("empty")).is_ok());
    }

    #[test]
    fn rejects_prepull_without_install() {
        let config = ImageConfig::new("bad").with_step(Step::prepull_k8s_images());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnsatisfiedDependency {
                step: StepKind::PrepullK8sImages,
                position: 1,
                requires: StepKind::InstallK8s,
            })
        ));
    }

    #[test]
    fn rejects_prepull_before_install() {
        let config = ImageConfig::new("bad")
            .with_step(Step::run_script("/setup.sh"))
            .with_step(Step::prepull_k8s_images())
            .with_step(Step::install_k8s());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::UnsatisfiedDependency {
                step: StepKind::PrepullK8sImages,
                position: 2,
                requires: StepKind::InstallK8s,
            })
        ));
    }

    #[test]
    fn missing_script_is_not_a_config_error() {
        let config = ImageConfig::new("x")
            .with_step(Step::install_k8s())
            .with_step(Step::run_script("/definitely/missing.sh"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        assert!(matches!(
            validate(&ImageConfig::new("")),
            Err(ConfigError::EmptyName)
        ));
    }

    #[test]
    fn rejects_names_that_are_not_path_components() {
        for name in ["../escape", "a/b", ".hidden", "with space", "x".repeat(129).as_str()] {
            let err = validate(&ImageConfig::new(name)).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidName { .. }),
                "{name:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn accepts_typical_names() {
        for name in ["base", "k8s-1.30", "debian_12.k8s"] {
            assert!(validate(&ImageConfig::new(name)).is_ok(), "{name}");
        }
    }
}
