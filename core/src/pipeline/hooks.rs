// core/src/pipeline/hooks.rs

//! Registration of `before`, `on` and `after` handlers for pipeline stages.

use crate::pipeline::definition::{Pipeline, StageFuture, StageHandler};
use crate::pipeline::PipelineFault;
use tracing::{event, Level};

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + 'static,
  Err: std::error::Error + From<PipelineFault> + Send + Sync + 'static,
{
  /// Registers a handler that runs before the stage's `on` handlers.
  pub fn before<H>(&mut self, stage: &str, handler: H)
  where
    H: for<'a> Fn(&'a mut TData) -> StageFuture<'a, Err> + Send + Sync + 'static,
  {
    self.ensure_stage_exists(stage);
    let boxed: StageHandler<TData, Err> = Box::new(handler);
    self.before.entry(stage.to_string()).or_default().push(boxed);
    event!(Level::TRACE, pipeline = self.name, %stage, "before handler registered.");
  }

  /// Registers the main handler of a stage.
  pub fn on<H>(&mut self, stage: &str, handler: H)
  where
    H: for<'a> Fn(&'a mut TData) -> StageFuture<'a, Err> + Send + Sync + 'static,
  {
    self.ensure_stage_exists(stage);
    let boxed: StageHandler<TData, Err> = Box::new(handler);
    self.on.entry(stage.to_string()).or_default().push(boxed);
    event!(Level::TRACE, pipeline = self.name, %stage, "on handler registered.");
  }

  /// Registers a handler that runs after the stage's `on` handlers.
  pub fn after<H>(&mut self, stage: &str, handler: H)
  where
    H: for<'a> Fn(&'a mut TData) -> StageFuture<'a, Err> + Send + Sync + 'static,
  {
    self.ensure_stage_exists(stage);
    let boxed: StageHandler<TData, Err> = Box::new(handler);
    self.after.entry(stage.to_string()).or_default().push(boxed);
    event!(Level::TRACE, pipeline = self.name, %stage, "after handler registered.");
  }
}
