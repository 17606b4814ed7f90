// core/src/escrow.rs

//! Escrow/ledger coordinator.
//!
//! Every function here mutates an `OrderAggregate` in memory (so invariants
//! can be checked against the post-state) and records the writes it implies
//! in `EscrowEffects`, which the persist stage flushes into the transaction.
//!
//! Ledger keys are derived from the order id and the movement, which makes
//! each movement idempotent per `(order, transition)`.

use crate::error::{EngineError, EngineResult};
use crate::gateway::RefundIntent;
use crate::model::{
  LedgerBucket, LedgerEntry, Money, Order, OrderAggregate, OrderEvent, OrderStatus, Payment, PaymentRecordStatus,
  PaymentStatus,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EscrowEffects {
  pub ledger: Vec<LedgerEntry>,
  pub payment_updates: Vec<(i64, PaymentRecordStatus)>,
  pub refund: Option<RefundIntent>,
}

impl EscrowEffects {
  pub fn is_empty(&self) -> bool {
    self.ledger.is_empty() && self.payment_updates.is_empty() && self.refund.is_none()
  }
}

/// The vendor's part of `amount` received against `order`. Commission is
/// apportioned pro rata, so a full payment yields exactly `vendor_amount`.
pub fn vendor_share(order: &Order, amount: Money) -> Money {
  amount - order.commission.pro_rata(amount, order.total_amount)
}

/// Order-level payment status implied by the payment records.
pub fn derive_payment_status(agg: &OrderAggregate) -> PaymentStatus {
  let captured = agg.captured();
  if captured.units() > 0 && captured >= agg.order.total_amount {
    return PaymentStatus::Paid;
  }
  if captured.units() > 0 {
    return PaymentStatus::Partial;
  }
  let any = |status: PaymentRecordStatus| agg.payments.iter().any(|p| p.status == status);
  if any(PaymentRecordStatus::Refunded) {
    PaymentStatus::Refunded
  } else if any(PaymentRecordStatus::Failed) && !any(PaymentRecordStatus::Pending) {
    PaymentStatus::Failed
  } else {
    PaymentStatus::Pending
  }
}

struct Movement<'a> {
  agg: &'a mut OrderAggregate,
  fx: &'a mut EscrowEffects,
  reason: &'static str,
  payment_id: Option<i64>,
  now: DateTime<Utc>,
}

impl<'a> Movement<'a> {
  fn new(agg: &'a mut OrderAggregate, fx: &'a mut EscrowEffects, reason: &'static str, now: DateTime<Utc>) -> Self {
    Self {
      agg,
      fx,
      reason,
      payment_id: None,
      now,
    }
  }

  fn for_payment(mut self, payment_id: Option<i64>) -> Self {
    self.payment_id = payment_id;
    self
  }

  fn post(&mut self, bucket: LedgerBucket, amount: Money, key: String) {
    if amount.is_zero() || self.agg.ledger.iter().any(|e| e.idempotency_key == key) {
      return;
    }
    let entry = LedgerEntry {
      id: 0,
      vendor_id: self.agg.order.vendor_id,
      order_id: self.agg.order.id,
      payment_id: self.payment_id,
      bucket,
      amount,
      reason: self.reason.to_string(),
      idempotency_key: key,
      created_at: self.now,
    };
    debug!(bucket = %entry.bucket, amount = %entry.amount, key = %entry.idempotency_key, "Ledger entry posted.");
    self.agg.ledger.push(entry.clone());
    self.fx.ledger.push(entry);
  }

  fn transfer(&mut self, from: LedgerBucket, to: LedgerBucket, amount: Money, prefix: &str) {
    if amount.is_zero() {
      return;
    }
    self.post(from, -amount, format!("{}:{}->{}:out", prefix, from, to));
    self.post(to, amount, format!("{}:{}->{}:in", prefix, from, to));
  }

  fn mark_success_payments_refunded(&mut self) {
    for payment in self.agg.payments.iter_mut() {
      if payment.status == PaymentRecordStatus::Success {
        payment.status = PaymentRecordStatus::Refunded;
        self.fx.payment_updates.push((payment.id, PaymentRecordStatus::Refunded));
      }
    }
  }

  fn balance(&self, bucket: LedgerBucket) -> Money {
    self.agg.bucket_balance(bucket)
  }

  /// Moves the vendor part of `amount` (payable first, then held) to reversed
  /// and debits the platform's part from commission.
  fn reverse_amount(&mut self, amount: Money, prefix: &str) -> Money {
    let payable = self.balance(LedgerBucket::Payable).max(Money::ZERO);
    let held = self.balance(LedgerBucket::Held).max(Money::ZERO);
    let vendor_part = vendor_share(&self.agg.order, amount).min(payable + held);
    let from_payable = vendor_part.min(payable);
    let from_held = vendor_part - from_payable;
    let commission_part = (amount - vendor_part)
      .min(self.balance(LedgerBucket::Commission))
      .max(Money::ZERO);

    self.transfer(LedgerBucket::Payable, LedgerBucket::Reversed, from_payable, prefix);
    self.transfer(LedgerBucket::Held, LedgerBucket::Reversed, from_held, prefix);
    self.post(LedgerBucket::Commission, -commission_part, format!("{}:commission", prefix));
    vendor_part
  }
}

fn payment_prefix(order_id: i64, payment: &Payment) -> String {
  format!("{}:payment:{}:{}", order_id, payment.gateway, payment.gateway_txn_id)
}

/// Books a payment that has just become `success` (already reflected in
/// `agg.payments`). Only the newly covered part of the order total is
/// credited; where it goes depends on the order's current status.
pub fn record_success(
  agg: &mut OrderAggregate,
  payment: &Payment,
  captured_before: Money,
  now: DateTime<Utc>,
  fx: &mut EscrowEffects,
) {
  let order = &agg.order;
  let total = order.total_amount;
  let before = captured_before.min(total);
  let after = agg.captured().min(total);
  let vendor_delta = vendor_share(order, after) - vendor_share(order, before);
  let commission_delta = (after - before) - vendor_delta;
  let status = order.status;
  let prefix = payment_prefix(order.id, payment);

  let mut mv = Movement::new(agg, fx, "payment", now).for_payment(Some(payment.id));
  mv.post(LedgerBucket::Held, vendor_delta, format!("{}:held", prefix));
  mv.post(LedgerBucket::Commission, commission_delta, format!("{}:commission", prefix));

  if status == OrderStatus::Completed {
    mv.transfer(
      LedgerBucket::Held,
      LedgerBucket::Payable,
      vendor_delta,
      &format!("{}:release", prefix),
    );
    info!(order_id = mv.agg.order.id, amount = %payment.amount, "Payment on a completed order released to payable.");
  } else if status.is_reversed() {
    let reverse_prefix = format!("{}:reverse", prefix);
    mv.transfer(LedgerBucket::Held, LedgerBucket::Reversed, vendor_delta, &reverse_prefix);
    mv.post(
      LedgerBucket::Commission,
      -commission_delta,
      format!("{}:commission", reverse_prefix),
    );
    if let Some(record) = mv.agg.payments.iter_mut().find(|p| p.id == payment.id) {
      record.status = PaymentRecordStatus::Refunded;
    }
    mv.fx.payment_updates.push((payment.id, PaymentRecordStatus::Refunded));
    mv.fx.refund = Some(RefundIntent {
      order_id: mv.agg.order.id,
      order_number: mv.agg.order.order_number.clone(),
      amount: payment.amount,
      reason: format!("payment received on {} order", status),
      idempotency_key: reverse_prefix,
    });
    info!(order_id = mv.agg.order.id, amount = %payment.amount, %status, "Late payment reversed.");
  }
}

/// Books a refund the gateway performed on its own (`success -> refunded`).
pub fn record_gateway_refund(agg: &mut OrderAggregate, payment: &Payment, now: DateTime<Utc>, fx: &mut EscrowEffects) {
  let prefix = format!("{}:gateway_refund", payment_prefix(agg.order.id, payment));
  let amount = payment.amount.min(agg.order.total_amount);
  let mut mv = Movement::new(agg, fx, "gateway_refund", now).for_payment(Some(payment.id));
  mv.reverse_amount(amount, &prefix);
}

/// Complete: everything held for the order becomes payable to the vendor.
pub fn release(agg: &mut OrderAggregate, now: DateTime<Utc>, fx: &mut EscrowEffects) {
  let prefix = format!("{}:complete", agg.order.id);
  let mut mv = Movement::new(agg, fx, "complete", now);
  let held = mv.balance(LedgerBucket::Held);
  mv.transfer(LedgerBucket::Held, LedgerBucket::Payable, held, &prefix);
  agg.order.escrow_released = true;
  agg.order.escrow_released_at = Some(now);
  info!(order_id = agg.order.id, released = %held, "Escrow released.");
}

/// Cancel/Reject: unwinds everything the order has accumulated and queues a
/// refund of all captured money. A no-op on the ledger when nothing was paid.
pub fn unwind(agg: &mut OrderAggregate, event: OrderEvent, now: DateTime<Utc>, fx: &mut EscrowEffects) {
  let prefix = format!("{}:{}", agg.order.id, event);
  let captured = agg.captured();
  let reason = match event {
    OrderEvent::Reject => "reject",
    _ => "cancel",
  };
  let mut mv = Movement::new(agg, fx, reason, now);
  let held = mv.balance(LedgerBucket::Held);
  let payable = mv.balance(LedgerBucket::Payable);
  let commission = mv.balance(LedgerBucket::Commission);
  mv.transfer(LedgerBucket::Held, LedgerBucket::Reversed, held, &prefix);
  mv.transfer(LedgerBucket::Payable, LedgerBucket::Reversed, payable, &prefix);
  mv.post(LedgerBucket::Commission, -commission, format!("{}:commission", prefix));
  mv.mark_success_payments_refunded();

  if captured.units() > 0 {
    fx.refund = Some(RefundIntent {
      order_id: agg.order.id,
      order_number: agg.order.order_number.clone(),
      amount: captured,
      reason: reason.to_string(),
      idempotency_key: prefix,
    });
    info!(order_id = agg.order.id, amount = %captured, %event, "Captured funds reversed.");
  }
}

/// Admin refund. `amount` defaults to the captured part of the total and may
/// not exceed what was captured.
pub fn refund(
  agg: &mut OrderAggregate,
  amount: Option<Money>,
  reason: &str,
  now: DateTime<Utc>,
  fx: &mut EscrowEffects,
) -> EngineResult<()> {
  let captured = agg.captured();
  let amount = match amount {
    Some(a) if a.units() <= 0 => {
      return Err(EngineError::InvalidAmount(format!("refund amount must be positive, got {}", a)));
    }
    Some(a) => a,
    None => agg.order.total_amount.min(captured),
  };
  if amount > captured {
    return Err(EngineError::InvalidAmount(format!(
      "refund amount {} exceeds captured payments {}",
      amount, captured
    )));
  }

  let prefix = format!("{}:refund", agg.order.id);
  let mut mv = Movement::new(agg, fx, "refund", now);
  let vendor_part = mv.reverse_amount(amount, &prefix);
  if amount == captured {
    mv.mark_success_payments_refunded();
  }

  if amount.units() > 0 {
    fx.refund = Some(RefundIntent {
      order_id: agg.order.id,
      order_number: agg.order.order_number.clone(),
      amount,
      reason: reason.to_string(),
      idempotency_key: prefix,
    });
  }
  info!(order_id = agg.order.id, %amount, %vendor_part, "Refund booked.");
  Ok(())
}
