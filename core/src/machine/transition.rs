// core/src/machine/transition.rs

//! Lifecycle transitions after creation: the transition table, who may fire
//! which event, and the `transition` pipeline that applies one event.

use crate::error::{EngineError, EngineResult};
use crate::escrow::{self, EscrowEffects};
use crate::machine::{
  load_for_update, loaded, loaded_mut, reject_in_maintenance, verify_invariants, OperationCtx, OrderEngine,
};
use crate::model::{
  Actor, HistoryAction, Money, Order, OrderAggregate, OrderEvent, OrderSnapshot, OrderStatus, Role, StatusHistoryEntry,
};
use crate::pipeline::{Pipeline, PipelineControl, PipelineResult, StageFuture};
use crate::settings::EngineSettings;
use crate::store::{OrderStore, StoreTx};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const LOAD: &str = "load_for_update";
const AUTHORISE: &str = "authorise_actor";
const CHECK: &str = "check_transition";
const SETTLE: &str = "settle_escrow";
const PERSIST: &str = "persist_transition";

/// The transition table. `None` means the event is not valid from `from`.
pub fn next_status(from: OrderStatus, event: OrderEvent) -> Option<OrderStatus> {
  use OrderEvent::*;
  use OrderStatus::*;
  match (from, event) {
    (Pending, Accept) | (Pending, Reject) | (Pending, Cancel) => Some(event.target()),
    (Accepted, Start) | (Accepted, Cancel) => Some(event.target()),
    (InProgress, Complete) => Some(Completed),
    (Completed, Refund) => Some(Refunded),
    _ => None,
  }
}

/// Who may fire `event` on `order`. Admins may fire any event.
pub fn authorise(actor: &Actor, order: &Order, event: OrderEvent) -> EngineResult<()> {
  if actor.is_admin() {
    return Ok(());
  }
  let action = format!("{} orders", event);
  match event {
    OrderEvent::Accept | OrderEvent::Reject | OrderEvent::Start | OrderEvent::Complete => {
      if actor.vendor_profile_id.is_none() {
        return Err(EngineError::wrong_role(actor.role, action));
      }
      if !actor.owns_vendor(order.vendor_id) {
        return Err(EngineError::NotOwner { order_id: order.id });
      }
      Ok(())
    }
    OrderEvent::Cancel => {
      if actor.role != Role::Customer {
        return Err(EngineError::wrong_role(actor.role, action));
      }
      if !actor.is_customer_of(order.customer_id) {
        return Err(EngineError::NotOwner { order_id: order.id });
      }
      Ok(())
    }
    OrderEvent::Refund => Err(EngineError::wrong_role(actor.role, action)),
  }
}

/// True when `key` is the idempotency key of the transition that produced
/// the order's current state.
fn is_replay(agg: &OrderAggregate, event: OrderEvent, key: Option<&str>) -> bool {
  let (Some(key), Some(last)) = (key, agg.last_transition.as_ref()) else {
    return false;
  };
  last.action == HistoryAction::Transition(event)
    && last.idempotency_key.as_deref() == Some(key)
    && agg.order.status == event.target()
}

/// Options of a single transition request.
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
  pub notes: Option<String>,
  /// Admin-only: bypass the From-state check.
  pub override_from: bool,
  /// Client-supplied key; a replay of the last transition with the same key
  /// returns the current state without side effects.
  pub idempotency_key: Option<String>,
  /// Refund amount; defaults to the captured part of the total.
  pub refund_amount: Option<Money>,
  /// Version the client last saw. A mismatch is an `OptimisticConflict`.
  pub expected_version: Option<i64>,
}

impl TransitionRequest {
  pub fn with_notes(notes: impl Into<String>) -> Self {
    Self {
      notes: Some(notes.into()),
      ..Default::default()
    }
  }

  pub fn idempotent(mut self, key: impl Into<String>) -> Self {
    self.idempotency_key = Some(key.into());
    self
  }

  pub fn if_version(mut self, version: i64) -> Self {
    self.expected_version = Some(version);
    self
  }
}

/// `{status, notes, override}` body of the status routes.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
  pub status: String,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default, rename = "override")]
  pub override_from: bool,
}

impl StatusUpdate {
  pub fn event(&self) -> EngineResult<OrderEvent> {
    OrderEvent::for_target(self.status.trim().parse::<OrderStatus>()?)
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
  #[serde(default)]
  pub reason: Option<String>,
  #[serde(default)]
  pub amount: Option<Decimal>,
}

pub struct TransitionCtx<T: StoreTx> {
  pub(crate) tx: T,
  pub(crate) actor: Actor,
  pub(crate) order_id: i64,
  pub(crate) event: OrderEvent,
  pub(crate) request: TransitionRequest,
  pub(crate) settings: Arc<EngineSettings>,
  pub(crate) now: DateTime<Utc>,
  pub(crate) aggregate: Option<OrderAggregate>,
  pub(crate) from: Option<OrderStatus>,
  pub(crate) is_override: bool,
  pub(crate) effects: EscrowEffects,
}

impl<T: StoreTx> OperationCtx for TransitionCtx<T> {
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
    self.from = Some(agg.order.status);
    self.aggregate = Some(agg);
  }

  fn aggregate(&self) -> Option<&OrderAggregate> {
    self.aggregate.as_ref()
  }
}

fn authorise_actor<T: StoreTx>(ctx: &mut TransitionCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let agg = loaded(&ctx.aggregate)?;
    authorise(&ctx.actor, &agg.order, ctx.event)?;
    Ok(PipelineControl::Continue)
  })
}

fn check_transition<T: StoreTx>(ctx: &mut TransitionCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let agg = loaded(&ctx.aggregate)?;
    let from = agg.order.status;
    let event = ctx.event;

    if is_replay(agg, event, ctx.request.idempotency_key.as_deref()) {
      info!(order_id = ctx.order_id, %event, "Replayed transition, nothing to do.");
      return Ok(PipelineControl::Stop);
    }
    if let Some(expected) = ctx.request.expected_version {
      if expected != agg.order.version {
        warn!(order_id = ctx.order_id, expected, actual = agg.order.version, "Order changed since the client read it.");
        return Err(EngineError::OptimisticConflict { order_id: ctx.order_id });
      }
    }
    if next_status(from, event).is_some() {
      return Ok(PipelineControl::Continue);
    }
    if ctx.request.override_from {
      if !ctx.actor.is_admin() {
        return Err(EngineError::wrong_role(ctx.actor.role, "override transitions"));
      }
      if from.is_terminal() {
        return Err(EngineError::TerminalState { status: from });
      }
      if from == event.target() {
        return Err(EngineError::InvalidTransition { from, event });
      }
      warn!(
        order_id = ctx.order_id,
        %from,
        %event,
        actor_id = ctx.actor.user_id,
        "Admin override applied to transition."
      );
      ctx.is_override = true;
      return Ok(PipelineControl::Continue);
    }
    Err(EngineError::InvalidTransition { from, event })
  })
}

fn settle_escrow<T: StoreTx>(ctx: &mut TransitionCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let now = ctx.now;
    let event = ctx.event;
    let agg = loaded_mut(&mut ctx.aggregate)?;
    match event {
      OrderEvent::Complete => escrow::release(agg, now, &mut ctx.effects),
      OrderEvent::Cancel | OrderEvent::Reject => escrow::unwind(agg, event, now, &mut ctx.effects),
      OrderEvent::Refund => {
        let reason = ctx.request.notes.as_deref().unwrap_or("admin refund");
        escrow::refund(agg, ctx.request.refund_amount, reason, now, &mut ctx.effects)?;
      }
      OrderEvent::Accept | OrderEvent::Start => {}
    }
    agg.order.status = event.target();
    agg.order.payment_status = escrow::derive_payment_status(agg);
    agg.order.updated_at = now;
    Ok(PipelineControl::Continue)
  })
}

fn persist_transition<T: StoreTx>(ctx: &mut TransitionCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let agg = loaded(&ctx.aggregate)?;
    ctx.tx.update_order(&agg.order).await?;
    for (payment_id, status) in &ctx.effects.payment_updates {
      ctx.tx.update_payment_status(*payment_id, *status, None).await?;
    }
    for entry in &ctx.effects.ledger {
      ctx.tx.append_ledger(entry).await?;
    }
    let entry = StatusHistoryEntry {
      id: 0,
      order_id: ctx.order_id,
      action: HistoryAction::Transition(ctx.event),
      from_status: ctx.from,
      to_status: agg.order.status,
      actor_id: ctx.actor.user_id,
      actor_role: ctx.actor.role,
      notes: ctx.request.notes.clone(),
      is_override: ctx.is_override,
      idempotency_key: ctx.request.idempotency_key.clone(),
      created_at: ctx.now,
    };
    ctx.tx.append_history(&entry).await?;
    Ok(PipelineControl::Continue)
  })
}

pub(crate) fn build_pipeline<T: StoreTx>() -> Pipeline<TransitionCtx<T>, EngineError> {
  let mut p = Pipeline::new(
    "transition",
    &[(LOAD, false), (AUTHORISE, false), (CHECK, false), (SETTLE, false), (PERSIST, false)],
  );
  p.before(LOAD, reject_in_maintenance::<TransitionCtx<T>>);
  p.on(LOAD, load_for_update::<TransitionCtx<T>>);
  p.on(AUTHORISE, authorise_actor::<T>);
  p.on(CHECK, check_transition::<T>);
  p.on(SETTLE, settle_escrow::<T>);
  p.on(PERSIST, persist_transition::<T>);
  p.after(PERSIST, verify_invariants::<TransitionCtx<T>>);
  p
}

impl<S: OrderStore> OrderEngine<S> {
  /// Applies `event` to an order on behalf of `actor`.
  #[instrument(skip(self, actor, request), fields(actor_id = actor.user_id, role = %actor.role))]
  pub async fn transition(
    &self,
    actor: &Actor,
    order_id: i64,
    event: OrderEvent,
    request: TransitionRequest,
  ) -> EngineResult<OrderSnapshot> {
    self
      .with_deadline("transition", async {
        let tx = self.store.begin(self.request_timeout).await?;
        let ctx = TransitionCtx {
          tx,
          actor: actor.clone(),
          order_id,
          event,
          request,
          settings: self.settings.snapshot(),
          now: Utc::now(),
          aggregate: None,
          from: None,
          is_override: false,
          effects: EscrowEffects::default(),
        };
        let (outcome, ctx) = self.drive(&self.transition_pipeline, ctx).await?;
        match outcome {
          PipelineResult::Completed => {
            let TransitionCtx { mut tx, effects, from, .. } = ctx;
            if let Some(intent) = &effects.refund {
              tx.stage_refund(intent).await?;
            }
            tx.commit().await?;
            info!(order_id, ?from, to = %event.target(), "Order transition committed.");
            self.dispatch_refund(effects.refund);
          }
          PipelineResult::Stopped => drop(ctx),
        }
        Ok(())
      })
      .await?;
    self.committed_snapshot(order_id).await
  }

  /// Resolves a `{status}` body into its event and applies it.
  /// `request` supplies the idempotency key and expected version; notes and
  /// the override flag come from the body.
  pub async fn update_status(
    &self,
    actor: &Actor,
    order_id: i64,
    update: StatusUpdate,
    request: TransitionRequest,
  ) -> EngineResult<OrderSnapshot> {
    let event = update.event()?;
    let request = TransitionRequest {
      notes: update.notes,
      override_from: update.override_from,
      ..request
    };
    self.transition(actor, order_id, event, request).await
  }

  pub async fn cancel(&self, actor: &Actor, order_id: i64, request: TransitionRequest) -> EngineResult<OrderSnapshot> {
    self.transition(actor, order_id, OrderEvent::Cancel, request).await
  }

  /// Admin refund of a completed order.
  pub async fn refund(
    &self,
    actor: &Actor,
    order_id: i64,
    refund: RefundRequest,
    request: TransitionRequest,
  ) -> EngineResult<OrderSnapshot> {
    let refund_amount = match refund.amount {
      None => None,
      Some(amount) if amount <= Decimal::ZERO => {
        return Err(EngineError::InvalidAmount(format!("refund amount must be positive, got {}", amount)));
      }
      Some(amount) => Some(
        Money::from_decimal(amount)
          .ok_or_else(|| EngineError::InvalidAmount(format!("refund amount {} is out of range", amount)))?,
      ),
    };
    let request = TransitionRequest {
      notes: refund.reason,
      override_from: false,
      refund_amount,
      ..request
    };
    self.transition(actor, order_id, OrderEvent::Refund, request).await
  }
}
