//! Integration tests for the image build pipeline against a recording backend.

use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vmbake::{
    BackendError, BakeError, BuildPhase, ConfigError, ImageConfig, ImagePipeline, Step, StepKind,
};
use vmbake_test_utils::{BackendCall, FakeBackend, SharedBuffer, write_script};

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn prepull_without_install_never_reaches_backend() {
    let backend = FakeBackend::new();
    let config = ImageConfig::new("bad").with_step(Step::prepull_k8s_images());

    let err = ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BakeError::Config(ConfigError::UnsatisfiedDependency {
            step: StepKind::PrepullK8sImages,
            position: 1,
            requires: StepKind::InstallK8s,
        })
    ));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn prepull_with_script_but_no_install_is_rejected() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "setup.sh", "true");
    let backend = FakeBackend::new();
    let config = ImageConfig::new("bad")
        .with_step(Step::run_script(script))
        .with_step(Step::prepull_k8s_images());

    let err = ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BakeError::Config(ConfigError::UnsatisfiedDependency { position: 2, .. })
    ));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn empty_name_never_reaches_backend() {
    let backend = FakeBackend::new();

    let err = ImagePipeline::new(&backend)
        .build(&ImageConfig::new(""), None)
        .await
        .unwrap_err();

    assert!(matches!(err, BakeError::Config(ConfigError::EmptyName)));
    assert_eq!(backend.call_count(), 0);
}

// ============================================================================
// ORDERING AND SUCCESS
// ============================================================================

#[tokio::test]
async fn install_then_prepull_produces_named_image() {
    let backend = FakeBackend::new();
    let config = ImageConfig::new("base")
        .with_step(Step::install_k8s())
        .with_step(Step::prepull_k8s_images());

    let image = ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap();

    assert_eq!(image.name(), "base");
    assert_eq!(
        backend.calls(),
        vec![
            BackendCall::CreateBaseImage {
                name: "base".into()
            },
            BackendCall::Apply {
                kind: StepKind::InstallK8s,
                succeeded: true
            },
            BackendCall::Apply {
                kind: StepKind::PrepullK8sImages,
                succeeded: true
            },
            BackendCall::Finalize {
                name: "base".into()
            },
        ]
    );
}

#[tokio::test]
async fn steps_run_in_configuration_order() {
    let temp = TempDir::new().unwrap();
    let first = write_script(temp.path(), "first.sh", "true");
    let last = write_script(temp.path(), "last.sh", "true");

    let backend = FakeBackend::new();
    let config = ImageConfig::new("ordered")
        .with_step(Step::run_script(first))
        .with_step(Step::install_k8s())
        .with_step(Step::prepull_k8s_images())
        .with_step(Step::run_script(last));

    ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap();

    let expected: Vec<StepKind> = config.steps.iter().map(|s| s.kind()).collect();
    assert_eq!(backend.applied_kinds(), expected);
}

#[tokio::test]
async fn zero_steps_is_create_and_finalize() {
    let backend = FakeBackend::new();

    let image = ImagePipeline::new(&backend)
        .build(&ImageConfig::new("plain"), None)
        .await
        .unwrap();

    assert_eq!(image.name(), "plain");
    assert_eq!(
        backend.calls(),
        vec![
            BackendCall::CreateBaseImage {
                name: "plain".into()
            },
            BackendCall::Finalize {
                name: "plain".into()
            },
        ]
    );
}

// ============================================================================
// FAIL-FAST
// ============================================================================

#[tokio::test]
async fn missing_script_fails_at_its_position() {
    let temp = TempDir::new().unwrap();
    let backend = FakeBackend::new();
    let config = ImageConfig::new("x")
        .with_step(Step::install_k8s())
        .with_step(Step::run_script(temp.path().join("missing.sh")));

    let err = ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap_err();

    match &err {
        BakeError::Step {
            kind,
            position,
            source,
        } => {
            assert_eq!(*kind, StepKind::RunScript);
            assert_eq!(*position, 2);
            assert!(matches!(source, BackendError::NotFound(_)));
        }
        other => panic!("expected step error, got {other:?}"),
    }
    assert!(err.to_string().contains("run-script"));

    let applies: Vec<_> = backend
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BackendCall::Apply { .. }))
        .collect();
    assert_eq!(
        applies,
        vec![
            BackendCall::Apply {
                kind: StepKind::InstallK8s,
                succeeded: true
            },
            BackendCall::Apply {
                kind: StepKind::RunScript,
                succeeded: false
            },
        ]
    );
    assert!(!backend.finalized());
    assert!(backend.abandoned());
}

#[tokio::test]
async fn later_steps_never_run_after_failure() {
    let temp = TempDir::new().unwrap();
    let script = write_script(temp.path(), "after.sh", "true");
    let backend = FakeBackend::new().failing_step(StepKind::InstallK8s);
    let config = ImageConfig::new("k8s")
        .with_step(Step::install_k8s())
        .with_step(Step::prepull_k8s_images())
        .with_step(Step::run_script(script));

    let err = ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap_err();

    assert_eq!(err.failed_step(), Some((StepKind::InstallK8s, 1)));
    assert_eq!(backend.applied_kinds(), vec![StepKind::InstallK8s]);
    assert!(!backend.finalized());
}

#[tokio::test]
async fn abandon_receives_failure_reason() {
    let backend = FakeBackend::new().failing_step(StepKind::PrepullK8sImages);
    let config = ImageConfig::new("k8s")
        .with_step(Step::install_k8s())
        .with_step(Step::prepull_k8s_images());

    ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap_err();

    let reason = backend
        .calls()
        .into_iter()
        .find_map(|c| match c {
            BackendCall::Abandon { name, reason } => {
                assert_eq!(name, "k8s");
                Some(reason)
            }
            _ => None,
        })
        .expect("working image should be abandoned");
    assert!(reason.contains("step 2 (prepull-k8s-images) failed"), "{reason}");
}

#[tokio::test]
async fn create_failure_attempts_no_steps() {
    let backend = FakeBackend::new().failing_create();
    let config = ImageConfig::new("base").with_step(Step::install_k8s());

    let err = ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BakeError::Backend {
            phase: BuildPhase::Create,
            ..
        }
    ));
    assert_eq!(
        backend.calls(),
        vec![BackendCall::CreateBaseImage {
            name: "base".into()
        }]
    );
}

#[tokio::test]
async fn finalize_failure_is_reported_with_phase() {
    let backend = FakeBackend::new().failing_finalize();
    let config = ImageConfig::new("base").with_step(Step::install_k8s());

    let err = ImagePipeline::new(&backend)
        .build(&config, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BakeError::Backend {
            phase: BuildPhase::Finalize,
            ..
        }
    ));
    assert!(err.to_string().starts_with("finalizing image failed"));
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[tokio::test]
async fn cancellation_stops_between_steps() {
    let token = CancellationToken::new();
    let backend = FakeBackend::new().cancel_after(StepKind::InstallK8s, token.clone());
    let config = ImageConfig::new("base")
        .with_step(Step::install_k8s())
        .with_step(Step::prepull_k8s_images());

    let err = ImagePipeline::new(&backend)
        .with_cancellation(token)
        .build(&config, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BakeError::Cancelled { completed: 1 }));
    assert_eq!(backend.applied_kinds(), vec![StepKind::InstallK8s]);
    assert!(backend.abandoned());
    assert!(!backend.finalized());
}

#[tokio::test]
async fn cancellation_after_last_step_prevents_finalize() {
    let token = CancellationToken::new();
    let backend = FakeBackend::new().cancel_after(StepKind::InstallK8s, token.clone());
    let config = ImageConfig::new("base").with_step(Step::install_k8s());

    let err = ImagePipeline::new(&backend)
        .with_cancellation(token)
        .build(&config, None)
        .await
        .unwrap_err();

    assert!(matches!(err, BakeError::Cancelled { completed: 1 }));
    assert!(!backend.finalized());
}

// ============================================================================
// BUILD LOG
// ============================================================================

#[tokio::test]
async fn progress_is_written_to_log() {
    let backend = FakeBackend::new();
    let buffer = SharedBuffer::new();
    let mut log = buffer.build_log();
    let config = ImageConfig::new("base")
        .with_step(Step::install_k8s())
        .with_step(Step::prepull_k8s_images());

    ImagePipeline::new(&backend)
        .build(&config, Some(&mut log))
        .await
        .unwrap();

    let text = buffer.contents();
    let install = text.find("[1/2] applying step install-k8s...").unwrap();
    let prepull = text.find("[2/2] applying step prepull-k8s-images...").unwrap();
    assert!(install < prepull);
    assert!(text.contains("image base ready"));
}

#[tokio::test]
async fn log_sink_does_not_change_outcome() {
    let temp = TempDir::new().unwrap();
    let config = ImageConfig::new("x")
        .with_step(Step::install_k8s())
        .with_step(Step::run_script(temp.path().join("missing.sh")));

    let silent = FakeBackend::new();
    let silent_err = ImagePipeline::new(&silent)
        .build(&config, None)
        .await
        .unwrap_err();

    let logged = FakeBackend::new();
    let buffer = SharedBuffer::new();
    let mut log = buffer.build_log();
    let logged_err = ImagePipeline::new(&logged)
        .build(&config, Some(&mut log))
        .await
        .unwrap_err();

    assert_eq!(silent_err.to_string(), logged_err.to_string());
    assert_eq!(silent.calls(), logged.calls());
    assert!(buffer.contents().contains("applying step run-script"));
}

#[tokio::test]
async fn concurrent_builds_keep_separate_logs() {
    let backend = FakeBackend::new().with_step_delay(Duration::from_millis(10));
    let pipeline = ImagePipeline::new(&backend);

    let a = ImageConfig::new("alpha").with_step(Step::install_k8s());
    let b = ImageConfig::new("beta").with_step(Step::install_k8s());
    let (buf_a, buf_b) = (SharedBuffer::new(), SharedBuffer::new());
    let (mut log_a, mut log_b) = (buf_a.build_log(), buf_b.build_log());

    let (ra, rb) = tokio::join!(
        pipeline.build(&a, Some(&mut log_a)),
        pipeline.build(&b, Some(&mut log_b)),
    );

    assert_eq!(ra.unwrap().name(), "alpha");
    assert_eq!(rb.unwrap().name(), "beta");
    assert!(buf_a.contents().contains("fake install-k8s on alpha"));
    assert!(!buf_a.contents().contains("beta"));
    assert!(buf_b.contents().contains("fake install-k8s on beta"));
    assert!(!buf_b.contents().contains("alpha"));
}
