//! Ordering requirements between step kinds.
//!
//! Each entry lists the kinds that must appear *earlier* in the step list
//! than the keyed kind. The validator is the only consumer; the pipeline
//! driver never looks at this table.

use super::StepKind;

/// Container images can only be pulled into a runtime that is installed.
const REQUIREMENTS: &[(StepKind, &[StepKind])] =
    &[(StepKind::PrepullK8sImages, &[StepKind::InstallK8s])];

/// Step kinds that must run before `kind`.
pub fn required_before(kind: StepKind) -> &'static [StepKind] {
    REQUIREMENTS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, required)| *required)
        .unwrap_or(&[])
}
