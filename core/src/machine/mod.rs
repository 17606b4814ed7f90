// core/src/machine/mod.rs

//! The order state machine.
//!
//! `OrderEngine` is the only entry point for mutating orders. Each mutating
//! operation runs one of the stage pipelines below over a context that owns
//! the open store transaction; the engine commits only when the pipeline
//! completes. A `Stopped` run is an idempotent replay and is rolled back.

pub mod bulk;
pub mod create;
pub mod edit;
pub mod payment;
pub mod review;
pub mod transition;

pub use bulk::{BulkResult, BulkSkip};
pub use create::CreateOrderRequest;
pub use edit::EditOrderRequest;
pub use review::ReviewReply;
pub use transition::{next_status, RefundRequest, StatusUpdate, TransitionRequest};

use crate::error::{EngineError, EngineResult};
use crate::gateway::{RefundIntent, RefundQueue};
use crate::invariants;
use crate::model::{Actor, LedgerEntry, Order, OrderAggregate, OrderSnapshot, Role, StatusHistoryEntry, VendorBalances};
use crate::pipeline::{Pipeline, PipelineControl, PipelineResult, StageFuture};
use crate::settings::{EngineSettings, SettingsHandle};
use crate::store::{OrderFilter, OrderStore, Page, StoreTx};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// What every operation context exposes to the shared stage handlers.
pub(crate) trait OperationCtx: Send + 'static {
  type Tx: StoreTx;

  fn settings(&self) -> &EngineSettings;
  /// Admin tooling keeps working in maintenance mode.
  fn exempt_from_maintenance(&self) -> bool;
  fn tx_mut(&mut self) -> &mut Self::Tx;
  fn order_id(&self) -> Option<i64>;
  fn set_aggregate(&mut self, agg: OrderAggregate);
  fn aggregate(&self) -> Option<&OrderAggregate>;
}

pub(crate) fn reject_in_maintenance<C: OperationCtx>(ctx: &mut C) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    if ctx.settings().maintenance_mode && !ctx.exempt_from_maintenance() {
      warn!(order_id = ?ctx.order_id(), "Mutation rejected, platform is in maintenance mode.");
      return Err(EngineError::MaintenanceMode);
    }
    Ok(PipelineControl::Continue)
  })
}

pub(crate) fn load_for_update<C: OperationCtx>(ctx: &mut C) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let order_id = ctx
      .order_id()
      .ok_or_else(|| EngineError::Internal("no order to load".to_string()))?;
    let agg = ctx.tx_mut().load_for_update(order_id).await?;
    debug!(order_id, status = %agg.order.status, version = agg.order.version, "Order loaded for update.");
    ctx.set_aggregate(agg);
    Ok(PipelineControl::Continue)
  })
}

pub(crate) fn verify_invariants<C: OperationCtx>(ctx: &mut C) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let agg = ctx
      .aggregate()
      .ok_or_else(|| EngineError::Internal("no post-state to verify".to_string()))?;
    invariants::verify(agg)?;
    Ok(PipelineControl::Continue)
  })
}

pub(crate) fn loaded(agg: &Option<OrderAggregate>) -> EngineResult<&OrderAggregate> {
  agg
    .as_ref()
    .ok_or_else(|| EngineError::Internal("stage ran before the order was loaded".to_string()))
}

pub(crate) fn loaded_mut(agg: &mut Option<OrderAggregate>) -> EngineResult<&mut OrderAggregate> {
  agg
    .as_mut()
    .ok_or_else(|| EngineError::Internal("stage ran before the order was loaded".to_string()))
}

/// Customers see their own orders, vendors the orders placed with their
/// profile, admins everything.
pub(crate) fn ensure_can_view(actor: &Actor, order: &Order) -> EngineResult<()> {
  if actor.is_admin() || actor.is_customer_of(order.customer_id) || actor.owns_vendor(order.vendor_id) {
    Ok(())
  } else {
    Err(EngineError::NotOwner { order_id: order.id })
  }
}

/// Balances of one vendor plus the entries they are computed from.
#[derive(Debug, Clone, Serialize)]
pub struct VendorLedger {
  #[serde(flatten)]
  pub balances: VendorBalances,
  pub entries: Vec<LedgerEntry>,
}

pub struct OrderEngine<S: OrderStore> {
  store: S,
  settings: SettingsHandle,
  refunds: Option<RefundQueue>,
  request_timeout: Duration,
  create_pipeline: Pipeline<create::CreateCtx<S::Tx>, EngineError>,
  transition_pipeline: Pipeline<transition::TransitionCtx<S::Tx>, EngineError>,
  edit_pipeline: Pipeline<edit::EditCtx<S::Tx>, EngineError>,
  payment_pipeline: Pipeline<payment::PaymentCtx<S::Tx>, EngineError>,
}

impl<S: OrderStore> OrderEngine<S> {
  pub fn new(store: S, settings: SettingsHandle) -> Self {
    let engine = Self {
      store,
      settings,
      refunds: None,
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
      create_pipeline: create::build_pipeline(),
      transition_pipeline: transition::build_pipeline(),
      edit_pipeline: edit::build_pipeline(),
      payment_pipeline: payment::build_pipeline(),
    };
    info!(pipelines = ?engine.describe_pipelines(), "Order engine initialised.");
    engine
  }

  pub fn with_refund_queue(mut self, queue: RefundQueue) -> Self {
    self.refunds = Some(queue);
    self
  }

  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn settings(&self) -> &SettingsHandle {
    &self.settings
  }

  pub fn request_timeout(&self) -> Duration {
    self.request_timeout
  }

  /// `(pipeline, stages)` in execution order.
  pub fn describe_pipelines(&self) -> Vec<(&'static str, Vec<&str>)> {
    vec![
      (self.create_pipeline.name(), self.create_pipeline.stage_names()),
      (self.transition_pipeline.name(), self.transition_pipeline.stage_names()),
      (self.edit_pipeline.name(), self.edit_pipeline.stage_names()),
      (self.payment_pipeline.name(), self.payment_pipeline.stage_names()),
    ]
  }

  /// Bounds an operation by the request deadline, up to and including its
  /// commit. Dropping the inner future drops its transaction, which rolls it back.
  pub(crate) async fn with_deadline<T, F>(&self, operation: &'static str, fut: F) -> EngineResult<T>
  where
    F: Future<Output = EngineResult<T>>,
  {
    match tokio::time::timeout(self.request_timeout, fut).await {
      Ok(result) => result,
      Err(_) => {
        warn!(%operation, timeout = ?self.request_timeout, "Operation exceeded its deadline.");
        Err(EngineError::Timeout)
      }
    }
  }

  /// Runs `pipeline` over `ctx`. On error the context (and with it the
  /// transaction) is dropped before a ledger imbalance is flagged, so the
  /// flagging write never waits on our own row lock.
  pub(crate) async fn drive<C: OperationCtx>(
    &self,
    pipeline: &Pipeline<C, EngineError>,
    mut ctx: C,
  ) -> EngineResult<(PipelineResult, C)> {
    match pipeline.run(&mut ctx).await {
      Ok(outcome) => Ok((outcome, ctx)),
      Err(e) => {
        let order_id = ctx.order_id();
        drop(ctx);
        if let EngineError::LedgerImbalance { .. } = e {
          self.raise_imbalance(order_id, &e).await;
        }
        Err(e)
      }
    }
  }

  async fn raise_imbalance(&self, order_id: Option<i64>, cause: &EngineError) {
    error!(
      target: "order_engine::alert",
      order_id = ?order_id,
      error = %cause,
      "Ledger imbalance detected, transaction aborted."
    );
    if let Some(order_id) = order_id {
      if let Err(e) = self.store.mark_needs_review(order_id).await {
        error!(target: "order_engine::alert", order_id, error = %e, "Failed to flag order for review.");
      }
    }
  }

  pub(crate) fn dispatch_refund(&self, intent: Option<RefundIntent>) {
    let Some(intent) = intent else { return };
    match &self.refunds {
      Some(queue) => {
        info!(order_id = intent.order_id, amount = %intent.amount, "Refund intent queued.");
        queue.enqueue(intent);
      }
      None => warn!(
        order_id = intent.order_id,
        amount = %intent.amount,
        "No refund queue configured, intent left in the outbox."
      ),
    }
  }

  /// Rejects mutations from non-admins while the platform is in maintenance.
  pub(crate) fn ensure_writable(&self, actor: &Actor) -> EngineResult<()> {
    if self.settings.snapshot().maintenance_mode && !actor.is_admin() {
      return Err(EngineError::MaintenanceMode);
    }
    Ok(())
  }

  pub(crate) fn snapshot_of(&self, agg: &OrderAggregate) -> OrderSnapshot {
    agg.snapshot(self.settings.snapshot().escrow_duration_days)
  }

  /// Committed state of an order, read outside of any transaction. Callers
  /// read it after `with_deadline` returns, so a change that committed is
  /// never reported as `Timeout`.
  pub(crate) async fn committed_snapshot(&self, order_id: i64) -> EngineResult<OrderSnapshot> {
    let agg = self.store.find_by_id(order_id).await?;
    Ok(self.snapshot_of(&agg))
  }

  #[instrument(skip(self, actor), fields(actor_id = actor.user_id, role = %actor.role))]
  pub async fn get(&self, actor: &Actor, order_id: i64) -> EngineResult<OrderSnapshot> {
    let agg = self.store.find_by_id(order_id).await?;
    ensure_can_view(actor, &agg.order)?;
    Ok(self.snapshot_of(&agg))
  }

  #[instrument(skip(self, actor), fields(actor_id = actor.user_id, role = %actor.role))]
  pub async fn find_by_number(&self, actor: &Actor, order_number: &str) -> EngineResult<OrderSnapshot> {
    let agg = self.store.find_by_number(order_number).await?;
    ensure_can_view(actor, &agg.order)?;
    Ok(self.snapshot_of(&agg))
  }

  /// Lists orders visible to `actor`. Customer and vendor listings are always
  /// narrowed to their own orders, whatever the filter asks for.
  #[instrument(skip(self, actor, filter), fields(actor_id = actor.user_id, role = %actor.role))]
  pub async fn list(&self, actor: &Actor, filter: OrderFilter) -> EngineResult<Page<Order>> {
    let filter = match actor.role {
      Role::Customer => filter.for_customer(actor.user_id),
      Role::Vendor => match actor.vendor_profile_id {
        Some(vendor_id) => filter.for_vendor(vendor_id),
        None => return Err(EngineError::wrong_role(actor.role, "list vendor orders without a vendor profile")),
      },
      Role::Admin | Role::SuperUser => filter,
    };
    self.store.list(&filter).await
  }

  #[instrument(skip(self, actor), fields(actor_id = actor.user_id, role = %actor.role))]
  pub async fn history(&self, actor: &Actor, order_id: i64) -> EngineResult<Vec<StatusHistoryEntry>> {
    let agg = self.store.find_by_id(order_id).await?;
    ensure_can_view(actor, &agg.order)?;
    self.store.history(order_id).await
  }

  #[instrument(skip(self, actor), fields(actor_id = actor.user_id, role = %actor.role))]
  pub async fn vendor_ledger(&self, actor: &Actor, vendor_id: i64) -> EngineResult<VendorLedger> {
    if !actor.is_admin() && !actor.owns_vendor(vendor_id) {
      return Err(EngineError::wrong_role(actor.role, "view this vendor's ledger"));
    }
    let entries = self.store.ledger_for_vendor(vendor_id).await?;
    Ok(VendorLedger {
      balances: VendorBalances::from_entries(vendor_id, &entries),
      entries,
    })
  }
}
