//! Human-readable build log sink.

use std::fmt;
use std::io::Write;

/// Destination for progress text and tool output of one build.
///
/// Purely observational: write failures are reported through `tracing` and
/// otherwise ignored, so attaching, swapping or dropping a log never changes
/// the outcome of a build. Each build gets its own sink, so concurrent builds
/// never interleave.
pub struct BuildLog {
    sink: Box<dyn Write + Send>,
    write_failed: bool,
}

impl BuildLog {
    pub fn new<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Box::new(sink),
            write_failed: false,
        }
    }

    /// Log to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Write one line of progress text.
    pub fn line(&mut self, line: impl fmt::Display) {
        let result = writeln!(self.sink, "{}", line).and_then(|_| self.sink.flush());
        self.record(result);
    }

    /// Copy raw output of an external tool.
    pub fn output(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let result = self.sink.write_all(bytes).and_then(|_| self.sink.flush());
        self.record(result);
    }

    fn record(&mut self, result: std::io::Result<()>) {
        // Warn once per sink; a broken pipe would otherwise repeat on every line.
        if let Err(e) = result
            && !self.write_failed
        {
            self.write_failed = true;
            tracing::warn!("Failed to write to build log: {}", e);
        }
    }
}

impl fmt::Debug for BuildLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildLog")
            .field("write_failed", &self.write_failed)
            .finish_non_exhaustive()
    }
}
