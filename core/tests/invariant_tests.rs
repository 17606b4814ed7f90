// tests/invariant_tests.rs
mod common;

use common::*;
use order_engine::invariants::verify;
use order_engine::{LedgerBucket, Money, OrderStatus, OrderStore, PaymentStatus};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_corrupted_aggregates_are_caught() {
  setup_tracing();
  let engine = engine();
  let id = order_in(&engine, OrderStatus::Pending, true).await.order.id;
  let clean = engine.store().find_by_id(id).await.unwrap();
  assert!(verify(&clean).is_ok());

  let mut skewed_commission = clean.clone();
  skewed_commission.order.commission = Money::new(10_000);
  skewed_commission.order.vendor_amount = Money::new(240_000);
  assert_eq!(verify(&skewed_commission).unwrap_err().code(), "LedgerImbalance");

  let mut wrong_total = clean.clone();
  wrong_total.items[0].total_price = Money::new(1);
  assert_eq!(verify(&wrong_total).unwrap_err().code(), "LedgerImbalance");

  let mut overdrawn = clean.clone();
  let mut debit = overdrawn.ledger[0].clone();
  debit.bucket = LedgerBucket::Held;
  debit.amount = Money::new(-1_000_000);
  debit.idempotency_key = "corrupt".to_string();
  overdrawn.ledger.push(debit);
  assert_eq!(verify(&overdrawn).unwrap_err().code(), "LedgerImbalance");

  let mut unpaid = clean.clone();
  unpaid.payments.clear();
  unpaid.order.payment_status = PaymentStatus::Paid;
  assert_eq!(verify(&unpaid).unwrap_err().code(), "LedgerImbalance");

  let mut early_release = clean.clone();
  early_release.order.escrow_released = true;
  early_release.order.escrow_released_at = Some(chrono::Utc::now());
  assert_eq!(verify(&early_release).unwrap_err().code(), "Internal");

  let mut both_kinds = clean.clone();
  both_kinds.items[0].package_id = Some(GOLD_PACKAGE);
  assert_eq!(verify(&both_kinds).unwrap_err().code(), "Internal");
}

#[tokio::test]
#[serial]
async fn test_flagged_orders_stay_readable() {
  setup_tracing();
  let engine = engine();
  let placed = place_order(&engine, CATERING).await;
  engine.store().mark_needs_review(placed.order.id).await.unwrap();

  let flagged = engine.get(&admin(), placed.order.id).await.unwrap();
  assert!(flagged.order.needs_review);
  assert!(flagged.order.version > placed.order.version);
  assert_code(engine.store().mark_needs_review(9_999).await, "OrderNotFound");
}
