// core/src/pipeline/mod.rs

//! Named-stage pipelines. Every mutating engine operation is expressed as a
//! `Pipeline` over an operation context that owns the open store transaction.

pub mod control;
pub mod definition;
pub mod execution;
pub mod hooks;

pub use control::{PipelineControl, PipelineResult};
pub use definition::{Pipeline, SkipCondition, StageFuture, StageHandler};

use thiserror::Error;

/// Faults in the pipeline wiring itself, as opposed to errors raised by handlers.
#[derive(Debug, Error)]
pub enum PipelineFault {
  #[error("Stage '{stage}' of pipeline '{pipeline}' has no handlers")]
  HandlerMissing { pipeline: &'static str, stage: String },
}
