// core/src/pipeline/definition.rs

//! Contains the `Pipeline<TData, Err>` struct definition and its construction.

use crate::pipeline::control::PipelineControl;
use crate::pipeline::PipelineFault;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a stage handler. It borrows the context mutably for its
/// whole lifetime, so a handler may hold the transaction across `.await`.
pub type StageFuture<'a, Err> = Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send + 'a>>;

/// A stage handler: an async function over `&mut TData`.
///
/// Plain generic `fn` items are the usual way to write these, e.g.
/// `fn load<T: StoreTx>(ctx: &mut TransitionCtx<T>) -> StageFuture<'_, EngineError>`.
pub type StageHandler<TData, Err> = Box<dyn for<'a> Fn(&'a mut TData) -> StageFuture<'a, Err> + Send + Sync>;

/// Evaluated before a stage runs; when it returns true the stage is skipped.
pub type SkipCondition<TData> = Arc<dyn Fn(&TData) -> bool + Send + Sync + 'static>;

pub(crate) struct StageDef<TData> {
  pub(crate) name: String,
  pub(crate) optional: bool,
  pub(crate) skip_if: Option<SkipCondition<TData>>,
}

/// An ordered list of named stages, each with `before`, `on` and `after` handlers.
pub struct Pipeline<TData, Err>
where
  TData: Send + 'static,
  Err: std::error::Error + From<PipelineFault> + Send + Sync + 'static,
{
  pub(crate) name: &'static str,
  pub(crate) stages: Vec<StageDef<TData>>,
  pub(crate) before: HashMap<String, Vec<StageHandler<TData, Err>>>,
  pub(crate) on: HashMap<String, Vec<StageHandler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<StageHandler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + 'static,
  Err: std::error::Error + From<PipelineFault> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(stage_name, optional)` pairs, in execution order.
  pub fn new(name: &'static str, stage_defs: &[(&str, bool)]) -> Self {
    let stages = stage_defs
      .iter()
      .map(|(stage, optional)| StageDef {
        name: (*stage).to_string(),
        optional: *optional,
        skip_if: None,
      })
      .collect();

    Self {
      name,
      stages,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  /// Stage names in execution order.
  pub fn stage_names(&self) -> Vec<&str> {
    self.stages.iter().map(|s| s.name.as_str()).collect()
  }

  /// Panics when the stage is unknown: a typo in a stage name is a wiring bug
  /// caught the first time the engine is constructed.
  pub(crate) fn ensure_stage_exists(&self, stage: &str) {
    if !self.stages.iter().any(|s| s.name == stage) {
      panic!(
        "Pipeline setup error: stage '{}' not found in pipeline '{}'.",
        stage, self.name
      );
    }
  }

  pub fn set_skip_condition(&mut self, stage: &str, skip_if: Option<SkipCondition<TData>>) {
    self.ensure_stage_exists(stage);
    if let Some(def) = self.stages.iter_mut().find(|s| s.name == stage) {
      def.skip_if = skip_if;
    }
  }
}
