//! Test helpers for vmbake: a recording in-memory backend, a shareable
//! log buffer and shell stand-ins for the host tools.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use vmbake::{
    BackendError, BackendResult, BuildBackend, BuildLog, ImageHandle, StepKind, WorkingImage,
};

/// One call observed by [`FakeBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    CreateBaseImage { name: String },
    Apply { kind: StepKind, succeeded: bool },
    Finalize { name: String },
    Abandon { name: String, reason: String },
}

/// Backend that records every call and never touches a disk.
///
/// Succeeds by default; failures and cancellation are opt-in through the
/// builder methods. `run_script` fails with `NotFound` when the script path
/// does not exist, like a real backend would.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<BackendCall>>,
    fail_create: bool,
    fail_finalize: bool,
    failing_steps: Vec<StepKind>,
    cancel_after: Option<(StepKind, CancellationToken)>,
    step_delay: Option<std::time::Duration>,
    next_build: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_base_image` fail.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Make `finalize` fail.
    pub fn failing_finalize(mut self) -> Self {
        self.fail_finalize = true;
        self
    }

    /// Make every step of `kind` fail.
    pub fn failing_step(mut self, kind: StepKind) -> Self {
        self.failing_steps.push(kind);
        self
    }

    /// Cancel `token` right after the first step of `kind` completes.
    pub fn cancel_after(mut self, kind: StepKind, token: CancellationToken) -> Self {
        self.cancel_after = Some((kind, token));
        self
    }

    /// Sleep inside every step, to let concurrent builds overlap.
    pub fn with_step_delay(mut self, delay: std::time::Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Kinds of all attempted steps, in call order.
    pub fn applied_kinds(&self) -> Vec<StepKind> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                BackendCall::Apply { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn finalized(&self) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|call| matches!(call, BackendCall::Finalize { .. }))
    }

    pub fn abandoned(&self) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|call| matches!(call, BackendCall::Abandon { .. }))
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().push(call);
    }

    async fn apply(
        &self,
        kind: StepKind,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
        precondition: BackendResult<()>,
    ) -> BackendResult<()> {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }

        let result = precondition.and_then(|_| {
            if self.failing_steps.contains(&kind) {
                Err(BackendError::Execution(format!("{} exited with 1", kind)))
            } else {
                Ok(())
            }
        });

        if let Some(log) = log {
            log.line(format_args!("fake {} on {}", kind, image.name()));
        }

        self.record(BackendCall::Apply {
            kind,
            succeeded: result.is_ok(),
        });

        if result.is_ok()
            && let Some((cancel_kind, token)) = &self.cancel_after
            && *cancel_kind == kind
        {
            token.cancel();
        }

        result
    }
}

#[async_trait]
impl BuildBackend for FakeBackend {
    async fn create_base_image(&self, name: &str) -> BackendResult<WorkingImage> {
        self.record(BackendCall::CreateBaseImage {
            name: name.to_string(),
        });

        if self.fail_create {
            return Err(BackendError::NotFound("base image /fake/base.qcow2".into()));
        }

        let build_id = self.next_build.fetch_add(1, Ordering::SeqCst).to_string();
        let disk = PathBuf::from(format!("/fake/builds/{}-{}/disk.qcow2", name, build_id));
        Ok(WorkingImage::new(name, build_id, disk))
    }

    async fn install_k8s(
        &self,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        self.apply(StepKind::InstallK8s, image, log, Ok(())).await
    }

    async fn prepull_k8s_images(
        &self,
        image: &WorkingImage,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        self.apply(StepKind::PrepullK8sImages, image, log, Ok(()))
            .await
    }

    async fn run_script(
        &self,
        image: &WorkingImage,
        script: &Path,
        log: Option<&mut BuildLog>,
    ) -> BackendResult<()> {
        let precondition = if script.is_file() {
            Ok(())
        } else {
            Err(BackendError::NotFound(format!("script {}", script.display())))
        };
        self.apply(StepKind::RunScript, image, log, precondition)
            .await
    }

    async fn finalize(&self, image: WorkingImage) -> BackendResult<ImageHandle> {
        self.record(BackendCall::Finalize {
            name: image.name().to_string(),
        });

        if self.fail_finalize {
            return Err(BackendError::Storage("no space left on device".into()));
        }

        let path = PathBuf::from(format!("/fake/images/{}.qcow2", image.name()));
        Ok(ImageHandle::new(image.name(), path))
    }

    async fn abandon(&self, image: WorkingImage, reason: &str) -> BackendResult<()> {
        self.record(BackendCall::Abandon {
            name: image.name().to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}

/// Cloneable in-memory writer, for asserting on build log contents.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// A build log writing into this buffer.
    pub fn build_log(&self) -> BuildLog {
        BuildLog::new(self.clone())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const QEMU_IMG_STUB: &str = r#"DIR=$(dirname "$0")
echo "$*" >> "$DIR/qemu-img.calls"
case "$1" in
    info)
        echo '{"format": "qcow2", "virtual-size": 1073741824}'
        ;;
    create)
        for last; do :; done
        echo overlay > "$last"
        ;;
    convert)
        if [ -f "$DIR/fail-convert" ]; then
            echo "convert: no space left on device" >&2
            exit 1
        fi
        cp "$4" "$5"
        ;;
esac"#;

const VIRT_CUSTOMIZE_STUB: &str = r#"DIR=$(dirname "$0")
echo "$*" >> "$DIR/virt-customize.calls"
if [ -f "$DIR/fail-customize" ]; then
    echo "customize: script exited with 1" >&2
    exit 1
fi
if [ -f "$DIR/slow" ]; then
    exec sleep 30
fi
echo "customized"
"#;

/// Shell stand-ins for `qemu-img` and `virt-customize` in one directory.
///
/// Point `BakeOptions::tools_dir` at [`StubTools::dir`]. Every invocation is
/// appended to `<tool>.calls`; behavior is switched with marker files.
pub struct StubTools {
    dir: PathBuf,
}

impl StubTools {
    pub fn install(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).expect("create tools dir");
        write_script(dir, "qemu-img", QEMU_IMG_STUB);
        write_script(dir, "virt-customize", VIRT_CUSTOMIZE_STUB);
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Argument lines of every `qemu-img` call so far.
    pub fn qemu_img_calls(&self) -> Vec<String> {
        self.calls("qemu-img")
    }

    /// Argument lines of every `virt-customize` call so far.
    pub fn virt_customize_calls(&self) -> Vec<String> {
        self.calls("virt-customize")
    }

    /// Make `qemu-img convert` fail.
    pub fn fail_convert(&self, on: bool) {
        self.set_marker("fail-convert", on);
    }

    /// Make `virt-customize` fail.
    pub fn fail_customize(&self, on: bool) {
        self.set_marker("fail-customize", on);
    }

    /// Make `virt-customize` hang until killed.
    pub fn slow_customize(&self, on: bool) {
        self.set_marker("slow", on);
    }

    fn calls(&self, tool: &str) -> Vec<String> {
        std::fs::read_to_string(self.dir.join(format!("{}.calls", tool)))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn set_marker(&self, name: &str, on: bool) {
        let path = self.dir.join(name);
        if on {
            std::fs::write(&path, b"").expect("write marker");
        } else {
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// Write an executable shell script into `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write test script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod test script");
    }
    path
}
