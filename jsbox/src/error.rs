use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The script exceeded an execution budget (CPU time, wall clock or
    /// memory) and was stopped.
    #[error("Resource budget exceeded: {0}")]
    ResourceExceeded(String),

    /// The script failed to parse or threw during evaluation.
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Engine unavailable: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
