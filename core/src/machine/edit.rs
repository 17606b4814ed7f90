// core/src/machine/edit.rs

//! Changes to a pending order (`edit` pipeline) and soft deletion.

use crate::catalog::resolve_lines;
use crate::error::{EngineError, EngineResult};
use crate::escrow;
use crate::machine::create::parse_event_date;
use crate::machine::{
  load_for_update, loaded, loaded_mut, reject_in_maintenance, verify_invariants, OperationCtx, OrderEngine,
};
use crate::model::{Actor, HistoryAction, OrderAggregate, OrderSnapshot, OrderStatus, Role, StatusHistoryEntry};
use crate::pipeline::{Pipeline, PipelineControl, PipelineResult, StageFuture};
use crate::pricing::{price_basket, validate_lines, LineRequest, PriceAuthority};
use crate::settings::EngineSettings;
use crate::store::{OrderStore, StoreTx};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

const LOAD: &str = "load_for_update";
const AUTHORISE: &str = "authorise_editor";
const CHECK: &str = "check_editable";
const REPRICE: &str = "reprice";
const PERSIST: &str = "persist_edit";

/// Fields left `None` are unchanged. `items` replaces the whole basket.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditOrderRequest {
  #[serde(default)]
  pub event_date: Option<String>,
  #[serde(default)]
  pub event_location: Option<String>,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub items: Option<Vec<LineRequest>>,
}

impl EditOrderRequest {
  fn changed_fields(&self) -> Vec<&'static str> {
    [
      ("event_date", self.event_date.is_some()),
      ("event_location", self.event_location.is_some()),
      ("notes", self.notes.is_some()),
      ("items", self.items.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect()
  }
}

pub struct EditCtx<T: StoreTx> {
  pub(crate) tx: T,
  pub(crate) actor: Actor,
  pub(crate) order_id: i64,
  pub(crate) request: EditOrderRequest,
  pub(crate) settings: Arc<EngineSettings>,
  pub(crate) now: DateTime<Utc>,
  pub(crate) aggregate: Option<OrderAggregate>,
  pub(crate) items_replaced: bool,
}

impl<T: StoreTx> OperationCtx for EditCtx<T> {
  type Tx = T;

  fn settings(&self) -> &EngineSettings {
    &self.settings
  }

  fn exempt_from_maintenance(&self) -> bool {
    self.actor.is_admin()
  }

  fn tx_mut(&mut self) -> &mut T {
    &mut self.tx
  }

  fn order_id(&self) -> Option<i64> {
    Some(self.order_id)
  }

  fn set_aggregate(&mut self, agg: OrderAggregate) {
    self.aggregate = Some(agg);
  }

  fn aggregate(&self) -> Option<&OrderAggregate> {
    self.aggregate.as_ref()
  }
}

fn authorise_editor<T: StoreTx>(ctx: &mut EditCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let order = &loaded(&ctx.aggregate)?.order;
    let actor = &ctx.actor;
    if actor.is_admin() || actor.is_customer_of(order.customer_id) || actor.owns_vendor(order.vendor_id) {
      return Ok(PipelineControl::Continue);
    }
    Err(EngineError::NotOwner { order_id: order.id })
  })
}

fn check_editable<T: StoreTx>(ctx: &mut EditCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let agg = loaded(&ctx.aggregate)?;
    let status = agg.order.status;
    if status.is_terminal() {
      return Err(EngineError::TerminalState { status });
    }
    if status != OrderStatus::Pending {
      return Err(EngineError::ActionNotAllowed { action: "edit", status });
    }
    if ctx.request.items.is_some() && agg.captured().units() > 0 {
      return Err(EngineError::PaymentAlreadyReconciled(agg.order.order_number.clone()));
    }
    if let Some(items) = &ctx.request.items {
      validate_lines(items)?;
    }
    if let Some(raw) = &ctx.request.event_date {
      parse_event_date(raw, ctx.now.date_naive())?;
    }
    Ok(PipelineControl::Continue)
  })
}

fn reprice<T: StoreTx>(ctx: &mut EditCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let Some(lines) = ctx.request.items.as_ref() else {
      return Ok(PipelineControl::Continue);
    };
    let resolved = resolve_lines(&mut ctx.tx, lines).await?;
    let agg = loaded_mut(&mut ctx.aggregate)?;
    let basket = price_basket(
      lines,
      &resolved,
      PriceAuthority::for_actor(&ctx.actor),
      ctx.settings.commission_rate,
      Some(agg.order.vendor_id),
    )?;
    ctx.settings.check_order_amount(basket.total_amount)?;

    agg.items = basket.order_items(agg.order.id);
    agg.order.total_amount = basket.total_amount;
    agg.order.commission = basket.commission;
    agg.order.vendor_amount = basket.vendor_amount;
    agg.order.commission_rate = basket.commission_rate;
    agg.order.payment_status = escrow::derive_payment_status(agg);
    ctx.items_replaced = true;
    info!(
      order_id = agg.order.id,
      total = %basket.total_amount,
      commission = %basket.commission,
      "Order re-priced."
    );
    Ok(PipelineControl::Continue)
  })
}

fn persist_edit<T: StoreTx>(ctx: &mut EditCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let today = ctx.now.date_naive();
    let agg = loaded_mut(&mut ctx.aggregate)?;
    if let Some(raw) = &ctx.request.event_date {
      agg.order.event_date = parse_event_date(raw, today)?;
    }
    if let Some(location) = &ctx.request.event_location {
      agg.order.event_location = location.trim().to_string();
    }
    if let Some(notes) = &ctx.request.notes {
      agg.order.notes = Some(notes.clone());
    }
    agg.order.updated_at = ctx.now;

    ctx.tx.update_order(&agg.order).await?;
    if ctx.items_replaced {
      ctx.tx.replace_items(agg.order.id, &agg.items).await?;
    }
    let entry = StatusHistoryEntry {
      id: 0,
      order_id: agg.order.id,
      action: HistoryAction::Edit,
      from_status: Some(agg.order.status),
      to_status: agg.order.status,
      actor_id: ctx.actor.user_id,
      actor_role: ctx.actor.role,
      notes: Some(format!("changed: {}", ctx.request.changed_fields().join(", "))),
      is_override: false,
      idempotency_key: None,
      created_at: ctx.now,
    };
    ctx.tx.append_history(&entry).await?;
    Ok(PipelineControl::Continue)
  })
}

pub(crate) fn build_pipeline<T: StoreTx>() -> Pipeline<EditCtx<T>, EngineError> {
  let mut p = Pipeline::new(
    "edit",
    &[(LOAD, false), (AUTHORISE, false), (CHECK, false), (REPRICE, false), (PERSIST, false)],
  );
  p.before(LOAD, reject_in_maintenance::<EditCtx<T>>);
  p.on(LOAD, load_for_update::<EditCtx<T>>);
  p.on(AUTHORISE, authorise_editor::<T>);
  p.on(CHECK, check_editable::<T>);
  p.on(REPRICE, reprice::<T>);
  p.on(PERSIST, persist_edit::<T>);
  p.after(PERSIST, verify_invariants::<EditCtx<T>>);
  p
}

impl<S: OrderStore> OrderEngine<S> {
  /// Edits a pending order. Replacing the items re-prices it in the same transaction.
  #[instrument(skip(self, actor, request), fields(actor_id = actor.user_id, role = %actor.role))]
  pub async fn edit(&self, actor: &Actor, order_id: i64, request: EditOrderRequest) -> EngineResult<OrderSnapshot> {
    self
      .with_deadline("edit", async {
        let tx = self.store.begin(self.request_timeout).await?;
        let ctx = EditCtx {
          tx,
          actor: actor.clone(),
          order_id,
          request,
          settings: self.settings.snapshot(),
          now: Utc::now(),
          aggregate: None,
          items_replaced: false,
        };
        let (outcome, ctx) = self.drive(&self.edit_pipeline, ctx).await?;
        if outcome != PipelineResult::Completed {
          return Err(EngineError::Internal("edit pipeline stopped early".to_string()));
        }
        let EditCtx { tx, items_replaced, .. } = ctx;
        tx.commit().await?;
        info!(order_id, items_replaced, "Order edited.");
        Ok(())
      })
      .await?;
    self.committed_snapshot(order_id).await
  }

  /// Soft-deletes a rejected or cancelled order. Customers may delete their
  /// own orders; admins any.
  #[instrument(skip(self, actor), fields(actor_id = actor.user_id, role = %actor.role))]
  pub async fn delete(&self, actor: &Actor, order_id: i64) -> EngineResult<()> {
    self.ensure_writable(actor)?;
    self
      .with_deadline("delete", async {
        let mut tx = self.store.begin(self.request_timeout).await?;
        let mut agg = tx.load_for_update(order_id).await?;
        match actor.role {
          Role::Admin | Role::SuperUser => {}
          Role::Customer if actor.is_customer_of(agg.order.customer_id) => {}
          Role::Customer => return Err(EngineError::NotOwner { order_id }),
          Role::Vendor => return Err(EngineError::wrong_role(actor.role, "delete orders")),
        }
        let status = agg.order.status;
        if !matches!(status, OrderStatus::Rejected | OrderStatus::Cancelled) {
          return Err(EngineError::ActionNotAllowed { action: "delete", status });
        }

        let now = Utc::now();
        agg.order.deleted_at = Some(now);
        agg.order.updated_at = now;
        tx.update_order(&agg.order).await?;
        tx.append_history(&StatusHistoryEntry {
          id: 0,
          order_id,
          action: HistoryAction::Delete,
          from_status: Some(status),
          to_status: status,
          actor_id: actor.user_id,
          actor_role: actor.role,
          notes: None,
          is_override: false,
          idempotency_key: None,
          created_at: now,
        })
        .await?;
        tx.commit().await?;
        info!(order_id, "Order soft-deleted.");
        Ok(())
      })
      .await
  }
}
