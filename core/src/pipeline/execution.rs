// core/src/pipeline/execution.rs

//! Contains `Pipeline::run()`, which executes the stages and their handlers in order.

use crate::pipeline::control::{PipelineControl, PipelineResult};
use crate::pipeline::definition::{Pipeline, StageHandler};
use crate::pipeline::PipelineFault;
use tracing::{event, span, Instrument, Level};

#[derive(Debug, Clone, Copy)]
enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  fn as_str(self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + 'static,
  Err: std::error::Error + From<PipelineFault> + Send + Sync + 'static,
{
  /// Executes the pipeline against `ctx`.
  ///
  /// Returns `Completed` when every stage ran, `Stopped` when a handler asked
  /// to halt, or the first handler error. A non-optional stage without any
  /// handler is a wiring fault and is reported as `PipelineFault::HandlerMissing`.
  pub async fn run(&self, ctx: &mut TData) -> Result<PipelineResult, Err> {
    let pipeline_span = span!(Level::DEBUG, "pipeline", pipeline = self.name, num_stages = self.stages.len());
    async move {
      event!(Level::DEBUG, "Pipeline execution starting.");

      for (stage_idx, stage_def) in self.stages.iter().enumerate() {
        let stage = stage_def.name.as_str();

        if let Some(skip_if) = &stage_def.skip_if {
          if skip_if(&*ctx) {
            event!(Level::DEBUG, %stage, "Stage skipped due to 'skip_if' condition.");
            continue;
          }
        }

        let has_handlers = [&self.before, &self.on, &self.after]
          .iter()
          .any(|phase| phase.get(stage).map_or(false, |v| !v.is_empty()));
        if !has_handlers {
          if stage_def.optional {
            event!(Level::DEBUG, %stage, "Optional stage has no handlers, skipping.");
            continue;
          }
          event!(Level::ERROR, %stage, "Non-optional stage has no handlers.");
          return Err(Err::from(PipelineFault::HandlerMissing {
            pipeline: self.name,
            stage: stage.to_string(),
          }));
        }

        let stage_span = span!(Level::DEBUG, "pipeline_stage", stage, stage_index = stage_idx);
        for (phase, handlers) in [
          (Phase::Before, self.before.get(stage)),
          (Phase::On, self.on.get(stage)),
          (Phase::After, self.after.get(stage)),
        ] {
          let Some(handlers) = handlers else { continue };
          if Self::run_phase(phase, handlers, ctx).instrument(stage_span.clone()).await? == PipelineControl::Stop {
            event!(Level::INFO, %stage, phase = phase.as_str(), "Pipeline stopped by a handler.");
            return Ok(PipelineResult::Stopped);
          }
        }
      }

      event!(Level::DEBUG, "Pipeline execution completed.");
      Ok(PipelineResult::Completed)
    }
    .instrument(pipeline_span)
    .await
  }

  async fn run_phase(
    phase: Phase,
    handlers: &[StageHandler<TData, Err>],
    ctx: &mut TData,
  ) -> Result<PipelineControl, Err> {
    for (handler_idx, handler) in handlers.iter().enumerate() {
      match handler(&mut *ctx).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => return Ok(PipelineControl::Stop),
        Err(e) => {
          event!(Level::WARN, phase = phase.as_str(), handler_index = handler_idx, error = %e, "Stage handler failed.");
          return Err(e);
        }
      }
    }
    Ok(PipelineControl::Continue)
  }
}
