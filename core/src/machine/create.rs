// core/src/machine/create.rs

//! Order placement: `create` pipeline.

use crate::catalog::{require_active_vendor, resolve_lines, CatalogItem};
use crate::error::{EngineError, EngineResult};
use crate::machine::{reject_in_maintenance, verify_invariants, OperationCtx, OrderEngine};
use crate::model::{
  Actor, HistoryAction, Order, OrderAggregate, OrderSnapshot, OrderStatus, PaymentStatus, Role, StatusHistoryEntry,
};
use crate::pipeline::{Pipeline, PipelineControl, PipelineResult, StageFuture};
use crate::pricing::{price_basket as price, validate_lines, LineRequest, PriceAuthority, PricedBasket};
use crate::settings::EngineSettings;
use crate::store::{format_order_number, OrderStore, StoreTx};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

const VALIDATE: &str = "validate_request";
const RESOLVE: &str = "resolve_catalog";
const PRICE: &str = "price_basket";
const NUMBER: &str = "assign_order_number";
const INSERT: &str = "insert_order";

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
  /// Vendor profile id.
  pub vendor_id: i64,
  /// `YYYY-MM-DD`.
  pub event_date: String,
  pub event_location: String,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub items: Vec<LineRequest>,
}

/// Parses a `YYYY-MM-DD` event date that must not lie before `today`.
pub(crate) fn parse_event_date(raw: &str, today: NaiveDate) -> EngineResult<NaiveDate> {
  let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
    .map_err(|_| EngineError::InvalidDate(format!("'{}' is not a YYYY-MM-DD date", raw)))?;
  if date < today {
    return Err(EngineError::InvalidDate(format!("event date {} is in the past", date)));
  }
  Ok(date)
}

pub struct CreateCtx<T: StoreTx> {
  pub(crate) tx: T,
  pub(crate) actor: Actor,
  pub(crate) request: CreateOrderRequest,
  pub(crate) settings: Arc<EngineSettings>,
  pub(crate) now: DateTime<Utc>,
  pub(crate) event_date: Option<NaiveDate>,
  pub(crate) resolved: Vec<CatalogItem>,
  pub(crate) basket: Option<PricedBasket>,
  pub(crate) order_number: Option<String>,
  pub(crate) order_id: Option<i64>,
  pub(crate) aggregate: Option<OrderAggregate>,
}

impl<T: StoreTx> OperationCtx for CreateCtx<T> {
  type Tx = T;

  fn settings(&self) -> &EngineSettings {
    &self.settings
  }

  fn exempt_from_maintenance(&self) -> bool {
    false
  }

  fn tx_mut(&mut self) -> &mut T {
    &mut self.tx
  }

  fn order_id(&self) -> Option<i64> {
    self.order_id
  }

  fn set_aggregate(&mut self, agg: OrderAggregate) {
    self.aggregate = Some(agg);
  }

  fn aggregate(&self) -> Option<&OrderAggregate> {
    self.aggregate.as_ref()
  }
}

fn validate_request<T: StoreTx>(ctx: &mut CreateCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    if ctx.actor.role != Role::Customer {
      return Err(EngineError::wrong_role(ctx.actor.role, "place orders"));
    }
    validate_lines(&ctx.request.items)?;
    ctx.event_date = Some(parse_event_date(&ctx.request.event_date, ctx.now.date_naive())?);
    Ok(PipelineControl::Continue)
  })
}

fn resolve_catalog<T: StoreTx>(ctx: &mut CreateCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    require_active_vendor(&mut ctx.tx, ctx.request.vendor_id).await?;
    ctx.resolved = resolve_lines(&mut ctx.tx, &ctx.request.items).await?;
    Ok(PipelineControl::Continue)
  })
}

fn price_basket<T: StoreTx>(ctx: &mut CreateCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let basket = price(
      &ctx.request.items,
      &ctx.resolved,
      PriceAuthority::for_actor(&ctx.actor),
      ctx.settings.commission_rate,
      Some(ctx.request.vendor_id),
    )?;
    ctx.settings.check_order_amount(basket.total_amount)?;
    ctx.basket = Some(basket);
    Ok(PipelineControl::Continue)
  })
}

fn assign_order_number<T: StoreTx>(ctx: &mut CreateCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let day = ctx.now.date_naive();
    let sequence = ctx.tx.next_order_sequence(day).await?;
    ctx.order_number = Some(format_order_number(day, sequence));
    Ok(PipelineControl::Continue)
  })
}

fn insert_order<T: StoreTx>(ctx: &mut CreateCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let (Some(basket), Some(order_number), Some(event_date)) =
      (ctx.basket.as_ref(), ctx.order_number.clone(), ctx.event_date)
    else {
      return Err(EngineError::Internal("order inserted before it was priced and numbered".to_string()));
    };

    let mut order = Order {
      id: 0,
      order_number,
      customer_id: ctx.actor.user_id,
      vendor_id: basket.vendor_id,
      status: OrderStatus::Pending,
      total_amount: basket.total_amount,
      commission: basket.commission,
      vendor_amount: basket.vendor_amount,
      commission_rate: basket.commission_rate,
      event_date,
      event_location: ctx.request.event_location.trim().to_string(),
      notes: ctx.request.notes.clone(),
      payment_status: PaymentStatus::Pending,
      payment_method: None,
      payment_reference: None,
      is_escrow: true,
      escrow_released: false,
      escrow_released_at: None,
      needs_review: false,
      version: 1,
      created_at: ctx.now,
      updated_at: ctx.now,
      deleted_at: None,
    };
    let mut items = basket.order_items(0);

    let order_id = ctx.tx.insert_order(&order, &items).await?;
    order.id = order_id;
    items.iter_mut().for_each(|item| item.order_id = order_id);

    let history = StatusHistoryEntry {
      id: 0,
      order_id,
      action: HistoryAction::Create,
      from_status: None,
      to_status: OrderStatus::Pending,
      actor_id: ctx.actor.user_id,
      actor_role: ctx.actor.role,
      notes: ctx.request.notes.clone(),
      is_override: false,
      idempotency_key: None,
      created_at: ctx.now,
    };
    ctx.tx.append_history(&history).await?;

    ctx.order_id = Some(order_id);
    ctx.aggregate = Some(OrderAggregate {
      order,
      items,
      payments: Vec::new(),
      review: None,
      ledger: Vec::new(),
      last_transition: None,
    });
    Ok(PipelineControl::Continue)
  })
}

pub(crate) fn build_pipeline<T: StoreTx>() -> Pipeline<CreateCtx<T>, EngineError> {
  let mut p = Pipeline::new(
    "create",
    &[(VALIDATE, false), (RESOLVE, false), (PRICE, false), (NUMBER, false), (INSERT, false)],
  );
  p.before(VALIDATE, reject_in_maintenance::<CreateCtx<T>>);
  p.on(VALIDATE, validate_request::<T>);
  p.on(RESOLVE, resolve_catalog::<T>);
  p.on(PRICE, price_basket::<T>);
  p.on(NUMBER, assign_order_number::<T>);
  p.on(INSERT, insert_order::<T>);
  p.after(INSERT, verify_invariants::<CreateCtx<T>>);
  p
}

impl<S: OrderStore> OrderEngine<S> {
  /// Places a new order for the acting customer.
  #[instrument(skip(self, actor, request), fields(actor_id = actor.user_id, vendor_id = request.vendor_id))]
  pub async fn create(&self, actor: &Actor, request: CreateOrderRequest) -> EngineResult<OrderSnapshot> {
    let order_id = self
      .with_deadline("create", async {
        let tx = self.store.begin(self.request_timeout).await?;
        let ctx = CreateCtx {
          tx,
          actor: actor.clone(),
          request,
          settings: self.settings.snapshot(),
          now: Utc::now(),
          event_date: None,
          resolved: Vec::new(),
          basket: None,
          order_number: None,
          order_id: None,
          aggregate: None,
        };
        let (outcome, ctx) = self.drive(&self.create_pipeline, ctx).await?;
        if outcome != PipelineResult::Completed {
          return Err(EngineError::Internal("create pipeline stopped early".to_string()));
        }
        let CreateCtx { tx, order_id, order_number, .. } = ctx;
        let order_id = order_id.ok_or_else(|| EngineError::Internal("order id missing after insert".to_string()))?;
        tx.commit().await?;
        info!(order_id, order_number = ?order_number, "Order created.");
        Ok(order_id)
      })
      .await?;
    self.committed_snapshot(order_id).await
  }
}
