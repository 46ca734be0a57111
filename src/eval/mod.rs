//! Code evaluation: from raw command input to rendered result pages.
//!
//! The pipeline is extract → wrap → run → capture → scrub → paginate →
//! render. [`Evaluator`] drives the middle of it and owns the only state
//! carried between invocations: the previous in-process result.

pub mod capture;
pub mod card;
pub mod host;
pub mod paginate;
pub mod redact;
pub mod shell;
pub mod source;
pub mod unit;

use std::sync::Arc;

use async_lock::Mutex;
use rhai::Dynamic;
use tracing::{debug, warn};

pub use capture::{CaptureSink, CaptureStatus, CapturedOutput, OutputCapture};
pub use card::render_cards;
pub use host::{describe_value, ExecutionEnvironment, RhaiHost, ScriptError, ScriptHost};
pub use paginate::{paginate, Page, Paginator, DEFAULT_MAX_CHARS, DEFAULT_MAX_LINES};
pub use unit::{CodeUnit, ExecutionKind};

/// A finished run: the unit (with `succeeded` settled) and its output.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub unit: CodeUnit,
    pub output: CapturedOutput,
}

/// Runs code units and remembers the last in-process result.
pub struct Evaluator {
    host: Arc<dyn ScriptHost>,
    previous: Mutex<Dynamic>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Arc::new(RhaiHost::default()))
    }
}

impl Evaluator {
    pub fn new(host: Arc<dyn ScriptHost>) -> Self {
        Self {
            host,
            previous: Mutex::new(Dynamic::UNIT),
        }
    }

    /// Value returned by the last successful in-process run, or unit.
    pub async fn previous_result(&self) -> Dynamic {
        self.previous.lock().await.clone()
    }

    /// Run `unit` and capture everything it prints.
    ///
    /// User-code failures end up in the output; this never fails.
    pub async fn run(
        &self,
        mut unit: CodeUnit,
        mut env: ExecutionEnvironment,
        token: &str,
    ) -> Evaluation {
        let capture = OutputCapture::begin();
        let sink = capture.sink();

        let status = match unit.kind() {
            ExecutionKind::InProcess => {
                env.previous_result = self.previous_result().await;
                match self.evaluate(unit.wrapped().to_string(), env, sink.clone()).await {
                    Ok(value) => {
                        sink.write_line(&format!("- Returned {}", describe_value(&value)));
                        *self.previous.lock().await = value;
                        unit.succeeded = true;
                        CaptureStatus::Succeeded
                    }
                    Err(e) => {
                        debug!(error = %e, "evaluation failed");
                        sink.write_line(&e.render(unit.wrapped()));
                        CaptureStatus::Failed
                    }
                }
            }
            ExecutionKind::ExternalProcess => {
                CaptureStatus::Exited(shell::run_shell(unit.wrapped(), &sink).await)
            }
        };

        let output = capture.finish(status, token);
        debug!(
            kind = ?unit.kind(),
            elapsed_ms = output.elapsed_ms(),
            succeeded = unit.succeeded,
            "evaluation finished"
        );
        Evaluation { unit, output }
    }

    /// Evaluate on the blocking pool so a long-running unit does not stall
    /// the event loop.
    async fn evaluate(
        &self,
        source: String,
        env: ExecutionEnvironment,
        sink: CaptureSink,
    ) -> Result<Dynamic, ScriptError> {
        let host = Arc::clone(&self.host);
        match tokio::task::spawn_blocking(move || host.evaluate(&source, &env, sink)).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "evaluation task did not complete");
                Err(ScriptError::Runtime {
                    message: format!("evaluation aborted: {e}"),
                })
            }
        }
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator").finish_non_exhaustive()
    }
}
