use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::{
    error::Error,
    sandbox::Sandbox,
    sink::BufferSink,
    types::{Capabilities, EvalReport, EvalRequest, EvalStatus, ResourceLimits},
};

/// Concurrency-bounded evaluation front end.
///
/// Each request gets a fresh sandbox and a fresh jail; the semaphore bounds
/// how many evaluations run at once.
#[derive(Clone)]
pub struct EvalService {
    semaphore: Arc<Semaphore>,
    resource_limits: ResourceLimits,
}

impl EvalService {
    pub async fn new(
        max_concurrent_evals: usize,
        resource_limits: ResourceLimits,
    ) -> Result<Self, Error> {
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_evals)),
            resource_limits,
        })
    }

    /// Evaluate a request and fold script-level failures into the report.
    ///
    /// Only infrastructure failures propagate as `Err`; a script that threw
    /// or blew its budget still yields a report carrying its partial output
    /// and the diagnostic.
    pub async fn evaluate(&self, request: EvalRequest) -> Result<EvalReport, Error> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to acquire evaluation permit: {}", e)))?;

        debug!("Starting evaluation of {} bytes of script", request.code.len());

        let capabilities = request.capabilities.unwrap_or(Capabilities {
            print_functions: true,
            exit_functions: false,
            read_functions: request.input.is_some(),
        });

        let mut sandbox = Sandbox::with_limits(self.resource_limits.clone());
        sandbox.set_capabilities(capabilities);
        sandbox.set_eval_timeout(request.timeout);
        if let Some(input) = request.input {
            sandbox.set_input(input);
        }
        for (name, value) in request.globals {
            sandbox.inject(name, value);
        }

        let sink = BufferSink::new();
        sandbox.set_writer(sink.clone());

        let report = match sandbox.eval(&request.code).await {
            Ok(outcome) => {
                info!("Evaluation completed successfully");
                EvalReport {
                    status: EvalStatus::Success,
                    output: sink.contents(),
                    value: outcome.value,
                    error: None,
                    stats: outcome.stats,
                }
            }
            Err(Error::EvaluationFailed(message)) => {
                warn!("Evaluation failed: {}", message);
                EvalReport {
                    status: EvalStatus::EvaluationError,
                    output: sink.contents(),
                    value: None,
                    error: Some(message),
                    stats: Default::default(),
                }
            }
            Err(Error::ResourceExceeded(message)) => {
                warn!("Evaluation stopped: {}", message);
                EvalReport {
                    status: EvalStatus::ResourceExceeded,
                    output: sink.contents(),
                    value: None,
                    error: Some(message),
                    stats: Default::default(),
                }
            }
            Err(e) => {
                error!("Evaluation error: {}", e);
                return Err(e);
            }
        };

        Ok(report)
    }

    pub fn get_available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}
