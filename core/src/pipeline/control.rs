// core/src/pipeline/control.rs

//! Signals for controlling pipeline flow and the outcome of a pipeline run.

/// Signal from a stage handler indicating whether the pipeline should continue or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  /// Continue with the remaining handlers of this stage and the following stages.
  Continue,
  /// Halt the pipeline immediately. Used for idempotent replays, where the
  /// operation has nothing left to do and the transaction must not commit.
  Stop,
}

/// Outcome of a full pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  /// Every non-skipped stage ran to completion.
  Completed,
  /// A handler returned `PipelineControl::Stop`.
  Stopped,
}
