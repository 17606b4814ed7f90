// core/src/invariants.rs

//! Post-state checks run before every commit. A monetary violation is a
//! `LedgerImbalance`: the transaction aborts and the order is flagged.

use crate::error::{EngineError, EngineResult};
use crate::model::{ItemKind, LedgerBucket, Money, OrderAggregate, OrderStatus, PaymentStatus};

pub fn verify(agg: &OrderAggregate) -> EngineResult<()> {
  let order = &agg.order;
  let imbalance = |detail: String| EngineError::LedgerImbalance {
    order_id: order.id,
    detail,
  };

  if agg.items.is_empty() {
    return Err(EngineError::Internal(format!("order {} has no items", order.id)));
  }

  let mut items_total = Money::ZERO;
  for item in &agg.items {
    let discriminator_ok = match item.item_type {
      ItemKind::Service => item.service_id.is_some() && item.package_id.is_none(),
      ItemKind::Package => item.package_id.is_some() && item.service_id.is_none(),
    };
    if !discriminator_ok {
      return Err(EngineError::Internal(format!(
        "item '{}' of order {} references both or neither catalogue kinds",
        item.item_name, order.id
      )));
    }
    if item.price.checked_mul(i64::from(item.quantity)) != Some(item.total_price) {
      return Err(imbalance(format!(
        "item '{}' total {} != {} x {}",
        item.item_name, item.total_price, item.price, item.quantity
      )));
    }
    items_total += item.total_price;
  }
  if items_total != order.total_amount {
    return Err(imbalance(format!(
      "total_amount {} != sum of items {}",
      order.total_amount, items_total
    )));
  }

  if order.commission + order.vendor_amount != order.total_amount {
    return Err(imbalance(format!(
      "commission {} + vendor_amount {} != total_amount {}",
      order.commission, order.vendor_amount, order.total_amount
    )));
  }
  if order.total_amount.apply_rate(order.commission_rate) != Some(order.commission) {
    return Err(imbalance(format!(
      "commission {} is not {} x {}",
      order.commission, order.total_amount, order.commission_rate
    )));
  }

  if order.escrow_released
    && (!matches!(order.status, OrderStatus::Completed | OrderStatus::Refunded) || order.escrow_released_at.is_none())
  {
    return Err(EngineError::Internal(format!(
      "order {} is marked escrow-released while {}",
      order.id, order.status
    )));
  }

  let captured = agg.captured();
  if order.payment_status == PaymentStatus::Paid && captured < order.total_amount {
    return Err(imbalance(format!(
      "payment_status is paid but only {} of {} captured",
      captured, order.total_amount
    )));
  }

  if agg.review.is_some() && !matches!(order.status, OrderStatus::Completed | OrderStatus::Refunded) {
    return Err(EngineError::Internal(format!(
      "order {} has a review while {}",
      order.id, order.status
    )));
  }

  for bucket in [
    LedgerBucket::Held,
    LedgerBucket::Payable,
    LedgerBucket::Reversed,
    LedgerBucket::Commission,
  ] {
    let balance = agg.bucket_balance(bucket);
    if balance.is_negative() {
      return Err(imbalance(format!("{} balance is negative ({})", bucket, balance)));
    }
  }

  Ok(())
}
