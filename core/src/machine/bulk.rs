// core/src/machine/bulk.rs

//! Administrative batch operations. Each id goes through the same per-order
//! path as a single request; failures are collected, never fatal to the batch.

use crate::error::{EngineError, EngineResult};
use crate::machine::transition::{StatusUpdate, TransitionRequest};
use crate::machine::OrderEngine;
use crate::model::Actor;
use crate::retry::retry_once_on_conflict;
use crate::store::OrderStore;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSkip {
  pub id: i64,
  pub code: &'static str,
  pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkResult {
  pub updated: Vec<i64>,
  pub skipped: Vec<BulkSkip>,
}

impl BulkResult {
  fn record(&mut self, id: i64, outcome: EngineResult<()>) {
    match outcome {
      Ok(()) => self.updated.push(id),
      Err(e) => self.skipped.push(BulkSkip {
        id,
        code: e.code(),
        reason: e.to_string(),
      }),
    }
  }
}

fn dedup(ids: &[i64]) -> Vec<i64> {
  let mut seen = HashSet::new();
  ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl<S: OrderStore> OrderEngine<S> {
  #[instrument(skip(self, actor, order_ids, update), fields(actor_id = actor.user_id, count = order_ids.len()))]
  pub async fn bulk_update_status(&self, actor: &Actor, order_ids: &[i64], update: StatusUpdate) -> EngineResult<BulkResult> {
    if !actor.is_admin() {
      return Err(EngineError::wrong_role(actor.role, "bulk update orders"));
    }
    let event = update.event()?;
    let mut result = BulkResult::default();
    for id in dedup(order_ids) {
      let outcome = retry_once_on_conflict("bulk_update_status", || {
        let request = TransitionRequest {
          notes: update.notes.clone(),
          override_from: update.override_from,
          ..Default::default()
        };
        self.transition(actor, id, event, request)
      })
      .await;
      result.record(id, outcome.map(|_| ()));
    }
    info!(updated = result.updated.len(), skipped = result.skipped.len(), %event, "Bulk status update finished.");
    Ok(result)
  }

  #[instrument(skip(self, actor, order_ids), fields(actor_id = actor.user_id, count = order_ids.len()))]
  pub async fn bulk_delete(&self, actor: &Actor, order_ids: &[i64]) -> EngineResult<BulkResult> {
    if !actor.is_admin() {
      return Err(EngineError::wrong_role(actor.role, "bulk delete orders"));
    }
    let mut result = BulkResult::default();
    for id in dedup(order_ids) {
      let outcome = retry_once_on_conflict("bulk_delete", || self.delete(actor, id)).await;
      result.record(id, outcome);
    }
    info!(updated = result.updated.len(), skipped = result.skipped.len(), "Bulk delete finished.");
    Ok(result)
  }
}
