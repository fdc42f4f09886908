use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Primitives granted to evaluated scripts.
///
/// Everything is denied by default; the evaluation context starts out empty
/// and only granted primitives are bound into it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Grant `print(...)` / `println(...)`, which write to the bound sink.
    #[serde(default)]
    pub print_functions: bool,
    /// Grant `exit([code])` / `quit([code])`, which end the evaluation.
    #[serde(default)]
    pub exit_functions: bool,
    /// Grant `readLine()`, which consumes lines from the caller input.
    #[serde(default)]
    pub read_functions: bool,
}

/// Resource budgets applied to each evaluation.
#[derive(Debug, Clone)]
pub struct ResourceLimits {
    /// Maximum CPU time (seconds)
    pub cpu_time: u32,
    /// Maximum memory (bytes)
    pub memory: u64,
    /// Maximum file size the script may produce (bytes)
    pub file_size: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time: 30,
            memory: 512 * 1024 * 1024,   // 512MB
            file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Process accounting collected after an evaluation.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStats {
    /// Peak memory usage in bytes
    pub max_rss: u64,
    /// Page faults served without I/O
    pub minor_page_faults: u64,
    /// Page faults that required I/O
    pub major_page_faults: u64,
    /// Total user CPU time
    #[serde(with = "duration_serde")]
    pub user_time: Duration,
    /// Total system CPU time
    #[serde(with = "duration_serde")]
    pub system_time: Duration,
    /// Wall-clock time of the evaluation
    #[serde(with = "duration_serde")]
    pub execution_time: Duration,
}

/// Raw outcome of a jailed process run.
///
/// Resource kills and infrastructure failures are reported as errors by the
/// jail; everything that produced an exit status lands here so the evaluator
/// can apply its own exit-code policy.
#[derive(Debug)]
pub struct Execution {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stats: ProcessStats,
}

impl Execution {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Result of a successful evaluation.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    /// Completion value of the script, stringified. `None` when the script
    /// completed with `undefined`.
    pub value: Option<String>,
    /// Process accounting for the evaluation.
    pub stats: ProcessStats,
}

/// Evaluation request handled by [`crate::EvalService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    /// Script source text
    pub code: String,
    /// Input made available to `readLine()`
    #[serde(default)]
    pub input: Option<String>,
    /// Globals bound into the evaluation context
    #[serde(default)]
    pub globals: HashMap<String, serde_json::Value>,
    /// Capability grants; defaults to print (plus read when input is given)
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
    /// Wall-clock deadline
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

/// Evaluation status as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalStatus {
    Success,
    EvaluationError,
    ResourceExceeded,
    SystemError,
}

impl ToString for EvalStatus {
    fn to_string(&self) -> String {
        match self {
            EvalStatus::Success => "success".to_string(),
            EvalStatus::EvaluationError => "evaluation_error".to_string(),
            EvalStatus::ResourceExceeded => "resource_exceeded".to_string(),
            EvalStatus::SystemError => "system_error".to_string(),
        }
    }
}

/// Service-level evaluation report.
///
/// Script-level failures are folded in rather than propagated: the sink
/// output produced before the failure and the diagnostic both survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    pub status: EvalStatus,
    /// Everything the script printed
    pub output: String,
    /// Completion value, when the script produced one
    pub value: Option<String>,
    /// Diagnostic message for failed evaluations
    pub error: Option<String>,
    pub stats: ProcessStats,
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
