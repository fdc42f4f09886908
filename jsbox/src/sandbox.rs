use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::engine::{EngineBackend, NodeBackend, EVAL_FAILURE_CODE, GLOBALS_FILE, RESULT_FILE};
use crate::error::Error;
use crate::jail::Jail;
use crate::sink::{OutputSink, WriteSink};
use crate::types::{Capabilities, EvalOutcome, Execution, ResourceLimits};

/// Restricted evaluation context for untrusted script text.
///
/// Configure grants and budgets, bind a sink, then evaluate. The sandbox is
/// reusable; every evaluation runs in a fresh jail.
///
/// ```no_run
/// # async fn demo() -> jsbox::Result<()> {
/// use jsbox::{BufferSink, Sandbox};
///
/// let mut sandbox = Sandbox::new();
/// sandbox.allow_print_functions(true);
/// let sink = BufferSink::new();
/// sandbox.set_writer(sink.clone());
/// sandbox.eval(r#"print("Hi there!");"#).await?;
/// assert_eq!(sink.contents(), "Hi there!\n");
/// # Ok(())
/// # }
/// ```
pub struct Sandbox {
    capabilities: Capabilities,
    limits: ResourceLimits,
    eval_timeout: Duration,
    globals: HashMap<String, serde_json::Value>,
    input: Option<String>,
    writer: Box<dyn OutputSink>,
}

impl Sandbox {
    /// Sandbox with default budgets. Nothing is granted; the bound sink is
    /// process stdout until [`Sandbox::set_writer`] replaces it.
    pub fn new() -> Self {
        Self::with_limits(ResourceLimits::default())
    }

    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self {
            capabilities: Capabilities::default(),
            limits,
            eval_timeout: Duration::from_secs(30),
            globals: HashMap::new(),
            input: None,
            writer: Box::new(WriteSink::stdout()),
        }
    }

    /// Enable or disable the `print`/`println` primitives.
    pub fn allow_print_functions(&mut self, enabled: bool) {
        self.capabilities.print_functions = enabled;
    }

    /// Enable or disable the `exit`/`quit` primitives.
    pub fn allow_exit_functions(&mut self, enabled: bool) {
        self.capabilities.exit_functions = enabled;
    }

    /// Enable or disable the `readLine` primitive.
    pub fn allow_read_functions(&mut self, enabled: bool) {
        self.capabilities.read_functions = enabled;
    }

    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    /// Bind the sink that receives print output from subsequent
    /// evaluations. Replaces any previously bound sink.
    pub fn set_writer(&mut self, sink: impl OutputSink + 'static) {
        self.writer = Box::new(sink);
    }

    /// Wall-clock deadline for each evaluation.
    pub fn set_eval_timeout(&mut self, timeout: Duration) {
        self.eval_timeout = timeout;
    }

    /// CPU time budget in seconds.
    pub fn set_max_cpu_time(&mut self, seconds: u32) {
        self.limits.cpu_time = seconds;
    }

    /// Memory budget in bytes.
    pub fn set_max_memory(&mut self, bytes: u64) {
        self.limits.memory = bytes;
    }

    /// Bind a global variable into the evaluation context.
    pub fn inject(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.globals.insert(name.into(), value);
    }

    /// Input made available to `readLine()`.
    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = Some(input.into());
    }

    /// Evaluate script text under the current configuration.
    ///
    /// Print output lands in the bound sink, including output produced
    /// before a runtime failure. Budget violations surface as
    /// [`Error::ResourceExceeded`], parse and runtime errors as
    /// [`Error::EvaluationFailed`].
    pub async fn eval(&mut self, script: &str) -> Result<EvalOutcome, Error> {
        let backend = NodeBackend::new(self.limits.memory);
        backend.check_tools().await?;

        let mut jail = Jail::new(self.limits.clone()).await?;

        debug!("Evaluating {} bytes of script", script.len());

        tokio::fs::write(jail.root_dir.join(backend.source_file()), script)
            .await
            .map_err(Error::Io)?;

        let has_globals = !self.globals.is_empty();
        if has_globals {
            let payload = serde_json::to_vec(&self.globals)
                .map_err(|e| Error::Sandbox(format!("Failed to encode globals: {}", e)))?;
            tokio::fs::write(jail.root_dir.join(GLOBALS_FILE), payload)
                .await
                .map_err(Error::Io)?;
        }

        backend
            .write_bootstrap(&jail.root_dir, &self.capabilities, has_globals)
            .await?;

        let args = backend.run_args();
        let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

        let execution = jail
            .execute(
                backend.run_command(),
                &args,
                &[],
                self.input.as_deref(),
                self.eval_timeout,
            )
            .await?;

        if !execution.stdout.is_empty() {
            self.writer.accept(&execution.stdout);
        }

        if !execution.success() {
            return Err(Error::EvaluationFailed(diagnostic(&execution)));
        }

        let value = match tokio::fs::read_to_string(jail.root_dir.join(RESULT_FILE)).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(EvalOutcome {
            value,
            stats: execution.stats,
        })
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

static ERROR_LINE: OnceLock<Regex> = OnceLock::new();

/// Distill an engine stderr dump into a one-line diagnostic.
fn diagnostic(execution: &Execution) -> String {
    let stderr = execution.stderr.trim();

    let pattern = ERROR_LINE
        .get_or_init(|| Regex::new(r"(?m)^[A-Za-z]*(?:Error|Exception)\b.*$").expect("error line pattern"));
    if let Some(m) = pattern.find(stderr) {
        return m.as_str().to_string();
    }

    match execution.exit_code {
        Some(code) if code != EVAL_FAILURE_CODE => {
            format!("Script exited with status {}", code)
        }
        _ => stderr
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("Script evaluation failed")
            .trim()
            .to_string(),
    }
}
