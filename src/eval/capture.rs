//! In-memory capture of what an evaluation prints.
//!
//! A capture owns a shared text buffer for its lifetime. The scripting
//! host's print/debug callbacks and the shell reader tasks write into it
//! through a [`CaptureSink`]; nothing touches the process's own stdout or
//! stderr, so concurrent evaluations never see each other's output.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::redact;

/// Final status of a captured run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    /// In-process run finished without a parse or runtime error.
    Succeeded,
    /// In-process run failed; the error is part of the captured text.
    Failed,
    /// External process exited; `None` when terminated by a signal or
    /// never spawned.
    Exited(Option<i32>),
}

impl CaptureStatus {
    /// Whether the result should be shown with the success color.
    pub fn is_success(self) -> bool {
        matches!(self, CaptureStatus::Succeeded | CaptureStatus::Exited(Some(0)))
    }
}

/// Cloneable writer into a capture buffer.
#[derive(Debug, Clone, Default)]
pub struct CaptureSink {
    buffer: Arc<Mutex<String>>,
}

impl CaptureSink {
    /// Append `text` verbatim.
    pub fn write(&self, text: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(text);
    }

    /// Append `line` followed by a newline.
    pub fn write_line(&self, line: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(line);
        buffer.push('\n');
    }

    fn take(&self) -> String {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *buffer)
    }
}

/// Output of one run, already scrubbed of the token and of backticks.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub text: String,
    pub elapsed: Duration,
    pub status: CaptureStatus,
}

impl CapturedOutput {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Lines of the captured text, in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

/// An open capture. Created right before the action runs.
#[derive(Debug)]
pub struct OutputCapture {
    started: Instant,
    sink: CaptureSink,
}

impl OutputCapture {
    pub fn begin() -> Self {
        Self {
            started: Instant::now(),
            sink: CaptureSink::default(),
        }
    }

    /// A writer for the running action.
    pub fn sink(&self) -> CaptureSink {
        self.sink.clone()
    }

    /// Close the capture: stop the clock, drain the buffer and scrub it.
    ///
    /// Writers still holding a sink after this point write into a buffer
    /// nobody reads.
    pub fn finish(self, status: CaptureStatus, token: &str) -> CapturedOutput {
        let elapsed = self.started.elapsed();
        let raw = self.sink.take();
        CapturedOutput {
            text: redact::scrub(&raw, token),
            elapsed,
            status,
        }
    }
}
