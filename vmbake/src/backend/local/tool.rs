//! Locating and running host tools.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;

use crate::errors::{BackendError, BackendResult};
use crate::pipeline::BuildLog;

/// How much of a failing tool's stderr ends up in the error message.
const STDERR_TAIL_BYTES: usize = 2048;

/// Find a host tool.
///
/// Searches `tools_dir` first, then every entry of `PATH`.
pub fn find_tool(tools_dir: Option<&Path>, name: &str) -> BackendResult<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = tools_dir {
        candidates.push(dir.join(name));
    }

    if let Some(path) = std::env::var_os("PATH") {
        candidates.extend(std::env::split_paths(&path).map(|dir| dir.join(name)));
    }

    for candidate in &candidates {
        if candidate.is_file() {
            tracing::debug!(tool = name, path = %candidate.display(), "Found tool");
            return Ok(candidate.clone());
        }
    }

    Err(BackendError::ToolNotFound(name.to_string()))
}

/// Run `program` to completion, copying its output into `log`.
///
/// A non-zero exit becomes [`BackendError::Execution`] carrying the tail of
/// stderr, whether or not a log is attached.
pub async fn run<I, S>(program: &Path, args: I, log: Option<&mut BuildLog>) -> BackendResult<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(command = ?cmd.as_std(), "Running tool");

    let output = cmd.output().await.map_err(|e| {
        BackendError::Execution(format!("failed to run {}: {}", program.display(), e))
    })?;

    if let Some(log) = log {
        log.output(&output.stdout);
        log.output(&output.stderr);
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackendError::Execution(format!(
            "{} exited with {}: {}",
            program.display(),
            output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            tail(stderr.trim_end(), STDERR_TAIL_BYTES)
        )));
    }

    Ok(output)
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_end_on_char_boundary() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("aé", 1), "");
    }

    #[test]
    fn missing_tool_is_reported_by_name() {
        let err = find_tool(None, "vmbake-no-such-tool").unwrap_err();
        assert!(matches!(err, BackendError::ToolNotFound(ref name) if name == "vmbake-no-such-tool"));
    }

    #[test]
    fn tools_dir_wins_over_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let local_sh = temp.path().join("sh");
        std::fs::write(&local_sh, "#!/bin/sh\n").unwrap();

        assert_eq!(find_tool(Some(temp.path()), "sh").unwrap(), local_sh);
        assert_ne!(find_tool(None, "sh").unwrap(), local_sh);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_reports_stderr() {
        let sh = find_tool(None, "sh").unwrap();
        let err = run(&sh, ["-c", "echo boom >&2; exit 3"], None)
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("exited with 3"), "{msg}");
        assert!(msg.contains("boom"), "{msg}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_is_copied_to_log() {
        use parking_lot::Mutex;
        use std::io::Write;
        use std::sync::Arc;

        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let shared = Shared::default();
        let mut log = BuildLog::new(shared.clone());
        let sh = find_tool(None, "sh").unwrap();

        run(&sh, ["-c", "echo hello"], Some(&mut log)).await.unwrap();

        assert_eq!(String::from_utf8(shared.0.lock().clone()).unwrap(), "hello\n");
    }
}
