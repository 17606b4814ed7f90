// core/src/machine/payment.rs

//! Payment outcome intake (`payment` pipeline).
//!
//! Notifications are idempotent per `(gateway, gateway_txn_id)`. Intake is
//! never blocked by maintenance mode: money that is already moving must be
//! booked.

use crate::error::{EngineError, EngineResult};
use crate::escrow::{self, EscrowEffects};
use crate::machine::{load_for_update, loaded, loaded_mut, verify_invariants, OperationCtx, OrderEngine};
use crate::model::{OrderAggregate, OrderSnapshot, Payment, PaymentNotification, PaymentRecordStatus};
use crate::pipeline::{Pipeline, PipelineControl, PipelineResult, StageFuture};
use crate::settings::EngineSettings;
use crate::store::{OrderStore, StoreTx};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const LOAD: &str = "load_for_update";
const RECONCILE: &str = "reconcile_payment";
const SETTLE: &str = "settle_payment";
const PERSIST: &str = "persist_payment";

#[derive(Debug, Clone)]
pub(crate) enum PaymentChange {
  New(Payment),
  Advance {
    payment_id: i64,
    to: PaymentRecordStatus,
  },
}

pub struct PaymentCtx<T: StoreTx> {
  pub(crate) tx: T,
  pub(crate) notification: PaymentNotification,
  pub(crate) settings: Arc<EngineSettings>,
  pub(crate) now: DateTime<Utc>,
  pub(crate) aggregate: Option<OrderAggregate>,
  pub(crate) change: Option<PaymentChange>,
  pub(crate) effects: EscrowEffects,
}

impl<T: StoreTx> OperationCtx for PaymentCtx<T> {
  type Tx = T;

  fn settings(&self) -> &EngineSettings {
    &self.settings
  }

  fn exempt_from_maintenance(&self) -> bool {
    true
  }

  fn tx_mut(&mut self) -> &mut T {
    &mut self.tx
  }

  fn order_id(&self) -> Option<i64> {
    Some(self.notification.order_id)
  }

  fn set_aggregate(&mut self, agg: OrderAggregate) {
    self.aggregate = Some(agg);
  }

  fn aggregate(&self) -> Option<&OrderAggregate> {
    self.aggregate.as_ref()
  }
}

fn reconcile_payment<T: StoreTx>(ctx: &mut PaymentCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let n = &ctx.notification;
    if n.amount.units() <= 0 {
      return Err(EngineError::InvalidAmount(format!("payment amount must be positive, got {}", n.amount)));
    }
    let agg = loaded(&ctx.aggregate)?;
    let existing = agg
      .payments
      .iter()
      .find(|p| p.gateway == n.gateway && p.gateway_txn_id == n.gateway_txn_id);

    let change = match existing {
      Some(p) if p.status == n.status && p.amount == n.amount => {
        info!(order_id = n.order_id, txn = %n.gateway_txn_id, "Duplicate payment notification ignored.");
        return Ok(PipelineControl::Stop);
      }
      Some(p) if p.amount != n.amount || !p.status.can_advance_to(n.status) => {
        warn!(
          order_id = n.order_id,
          txn = %n.gateway_txn_id,
          recorded = %p.status,
          received = %n.status,
          "Conflicting payment notification."
        );
        return Err(EngineError::PaymentAlreadyReconciled(n.gateway_txn_id.clone()));
      }
      Some(p) => PaymentChange::Advance {
        payment_id: p.id,
        to: n.status,
      },
      None if n.status == PaymentRecordStatus::Refunded => {
        return Err(EngineError::InvalidStatus(format!(
          "refund notification for unknown payment '{}'",
          n.gateway_txn_id
        )));
      }
      None => PaymentChange::New(Payment {
        id: 0,
        order_id: n.order_id,
        amount: n.amount,
        method: n.method.clone(),
        gateway: n.gateway.clone(),
        gateway_txn_id: n.gateway_txn_id.clone(),
        status: n.status,
        payload: n.payload.clone(),
        paid_at: n.paid_at.or((n.status == PaymentRecordStatus::Success).then_some(ctx.now)),
        created_at: ctx.now,
      }),
    };
    ctx.change = Some(change);
    Ok(PipelineControl::Continue)
  })
}

fn settle_payment<T: StoreTx>(ctx: &mut PaymentCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let now = ctx.now;
    let agg = loaded_mut(&mut ctx.aggregate)?;
    let captured_before = agg.captured();

    let payment = match &ctx.change {
      Some(PaymentChange::New(payment)) => {
        agg.payments.push(payment.clone());
        payment.clone()
      }
      Some(PaymentChange::Advance { payment_id, to }) => {
        let record = agg
          .payments
          .iter_mut()
          .find(|p| p.id == *payment_id)
          .ok_or_else(|| EngineError::Internal(format!("payment {} vanished from its order", payment_id)))?;
        record.status = *to;
        if *to == PaymentRecordStatus::Success && record.paid_at.is_none() {
          record.paid_at = Some(ctx.notification.paid_at.unwrap_or(now));
        }
        ctx.effects.payment_updates.push((*payment_id, *to));
        record.clone()
      }
      None => return Err(EngineError::Internal("payment settled before reconciliation".to_string())),
    };

    match payment.status {
      PaymentRecordStatus::Success => {
        escrow::record_success(agg, &payment, captured_before, now, &mut ctx.effects);
        agg.order.payment_method = Some(payment.method.clone());
        agg.order.payment_reference = Some(payment.gateway_txn_id.clone());
      }
      PaymentRecordStatus::Refunded => escrow::record_gateway_refund(agg, &payment, now, &mut ctx.effects),
      PaymentRecordStatus::Pending | PaymentRecordStatus::Failed | PaymentRecordStatus::Cancelled => {}
    }
    agg.order.payment_status = escrow::derive_payment_status(agg);
    agg.order.updated_at = now;
    info!(
      order_id = agg.order.id,
      txn = %payment.gateway_txn_id,
      status = %payment.status,
      payment_status = %agg.order.payment_status,
      "Payment settled."
    );
    Ok(PipelineControl::Continue)
  })
}

fn persist_payment<T: StoreTx>(ctx: &mut PaymentCtx<T>) -> StageFuture<'_, EngineError> {
  Box::pin(async move {
    let agg = loaded_mut(&mut ctx.aggregate)?;

    // A new payment gets its id only now; entries staged under the
    // placeholder id are pointed at the real row.
    if let Some(PaymentChange::New(_)) = &ctx.change {
      let record = agg
        .payments
        .iter_mut()
        .find(|p| p.id == 0)
        .ok_or_else(|| EngineError::Internal("new payment missing from aggregate".to_string()))?;
      let payment_id = ctx.tx.append_payment(record).await?;
      record.id = payment_id;
      ctx.effects.payment_updates.retain(|(id, _)| *id != 0);
      for entry in ctx.effects.ledger.iter_mut() {
        if entry.payment_id == Some(0) {
          entry.payment_id = Some(payment_id);
        }
      }
      for entry in agg.ledger.iter_mut() {
        if entry.payment_id == Some(0) {
          entry.payment_id = Some(payment_id);
        }
      }
    }

    for (payment_id, status) in &ctx.effects.payment_updates {
      let paid_at = agg.payments.iter().find(|p| p.id == *payment_id).and_then(|p| p.paid_at);
      ctx.tx.update_payment_status(*payment_id, *status, paid_at).await?;
    }
    ctx.tx.update_order(&agg.order).await?;
    for entry in &ctx.effects.ledger {
      ctx.tx.append_ledger(entry).await?;
    }
    Ok(PipelineControl::Continue)
  })
}

pub(crate) fn build_pipeline<T: StoreTx>() -> Pipeline<PaymentCtx<T>, EngineError> {
  let mut p = Pipeline::new(
    "payment",
    &[(LOAD, false), (RECONCILE, false), (SETTLE, false), (PERSIST, false)],
  );
  p.on(LOAD, load_for_update::<PaymentCtx<T>>);
  p.on(RECONCILE, reconcile_payment::<T>);
  p.on(SETTLE, settle_payment::<T>);
  p.on(PERSIST, persist_payment::<T>);
  p.after(PERSIST, verify_invariants::<PaymentCtx<T>>);
  p
}

impl<S: OrderStore> OrderEngine<S> {
  /// Books a payment outcome reported by a gateway.
  #[instrument(skip(self, notification), fields(order_id = notification.order_id, txn = %notification.gateway_txn_id))]
  pub async fn record_payment(&self, notification: PaymentNotification) -> EngineResult<OrderSnapshot> {
    let order_id = notification.order_id;
    self
      .with_deadline("record_payment", async {
        let tx = self.store.begin(self.request_timeout).await?;
        let ctx = PaymentCtx {
          tx,
          notification,
          settings: self.settings.snapshot(),
          now: Utc::now(),
          aggregate: None,
          change: None,
          effects: EscrowEffects::default(),
        };
        let (outcome, ctx) = self.drive(&self.payment_pipeline, ctx).await?;
        match outcome {
          PipelineResult::Completed => {
            let PaymentCtx { mut tx, effects, .. } = ctx;
            if let Some(intent) = &effects.refund {
              tx.stage_refund(intent).await?;
            }
            tx.commit().await?;
            self.dispatch_refund(effects.refund);
          }
          PipelineResult::Stopped => drop(ctx),
        }
        Ok(())
      })
      .await?;
    self.committed_snapshot(order_id).await
  }
}
