//! # jsbox
//!
//! Sandboxed JavaScript evaluation. Scripts run in an empty engine context
//! that contains only the primitives the caller has granted; print output is
//! routed to a caller-supplied sink, and runaway scripts are stopped by CPU,
//! memory and wall-clock budgets.

mod engine;
mod error;
mod jail;
mod sandbox;
mod service;
mod sink;
mod types;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use sandbox::Sandbox;
pub use service::EvalService;
pub use sink::{BufferSink, OutputSink, WriteSink};
pub use types::{
    Capabilities, EvalOutcome, EvalReport, EvalRequest, EvalStatus, ProcessStats, ResourceLimits,
};

/// Result type for sandbox operations
pub type Result<T> = std::result::Result<T, Error>;
