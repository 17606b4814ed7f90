// tests/escrow_ledger_tests.rs
mod common;

use common::*;
use order_engine::escrow::vendor_share;
use order_engine::gateway::dispatch;
use order_engine::{
  GatewayError, LedgerBucket, Money, OrderEvent, OrderFilter, OrderStatus, OrderStore, PaymentRecordStatus,
  OrderEngine, PaymentStatus, RefundIntent, RefundOutbox, RefundOutcome, RefundQueue, RefundRequest, RetryPolicy,
  SettingsHandle, TransitionRequest,
};
use rust_decimal::Decimal;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn fast_retries(max_attempts: u32) -> RetryPolicy {
  RetryPolicy {
    max_attempts,
    base_backoff: Duration::from_millis(1),
    max_backoff: Duration::from_millis(5),
  }
}

fn intent(order_id: i64) -> RefundIntent {
  RefundIntent {
    order_id,
    order_number: format!("WC20250101{:06}", order_id),
    amount: Money::new(250_000),
    reason: "cancel".to_string(),
    idempotency_key: format!("{}:cancel", order_id),
  }
}

async fn refund_amount(engine: &order_engine::OrderEngine<order_engine::MemoryStore>, id: i64, amount: i64) {
  engine
    .refund(
      &admin(),
      id,
      RefundRequest {
        reason: Some("partial goodwill refund".to_string()),
        amount: Some(Decimal::from(amount)),
      },
      TransitionRequest::default(),
    )
    .await
    .unwrap();
}

#[tokio::test]
#[serial]
async fn test_vendor_balances_match_open_receivables() {
  setup_tracing();
  let engine = engine();

  order_in(&engine, OrderStatus::Completed, true).await; // payable 237 500
  order_in(&engine, OrderStatus::Pending, true).await; // held 237 500
  let partial = place_order(&engine, CATERING).await.order.id;
  pay(&engine, partial, 100_000, "txn-partial").await; // held 95 000
  fire(&engine, partial, OrderEvent::Accept).await.unwrap();
  order_in(&engine, OrderStatus::Cancelled, true).await; // fully reversed
  let goodwill = order_in(&engine, OrderStatus::Completed, true).await.order.id;
  refund_amount(&engine, goodwill, 100_000).await; // payable 142 500

  let orders = engine
    .list(&admin(), OrderFilter::default().for_vendor(VENDOR).unpaginated())
    .await
    .unwrap();
  assert_eq!(orders.total, 5);

  let mut expected = Money::ZERO;
  for order in &orders.items {
    assert_invariants(&engine, order.id).await;
    let counted = !matches!(order.status, OrderStatus::Cancelled | OrderStatus::Rejected)
      && matches!(order.payment_status, PaymentStatus::Paid | PaymentStatus::Partial);
    if counted {
      let agg = engine.store().find_by_id(order.id).await.unwrap();
      let covered = agg.captured().min(order.total_amount);
      expected += vendor_share(order, covered) - agg.bucket_balance(LedgerBucket::Reversed);
    }
  }

  let balances = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances;
  assert_eq!(balances.held + balances.payable, expected);
  assert_eq!(balances.held, Money::new(332_500));
  assert_eq!(balances.payable, Money::new(380_000));
  assert_eq!(balances.reversed, Money::new(332_500));
  assert_eq!(balances.commission, Money::new(37_500));

  let other = engine.vendor_ledger(&admin(), OTHER_VENDOR).await.unwrap();
  assert!(other.entries.is_empty());
  assert_code(engine.vendor_ledger(&other_vendor(), VENDOR).await, "WrongRole");
}

#[tokio::test]
#[serial]
async fn test_partial_payments_accumulate_in_escrow() {
  setup_tracing();
  let engine = engine();
  let id = place_order(&engine, CATERING).await.order.id;

  let first = pay(&engine, id, 100_000, "txn-dp").await;
  assert_eq!(first.order.payment_status, PaymentStatus::Partial);
  assert_eq!(engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances.held, Money::new(95_000));

  let second = pay(&engine, id, 150_000, "txn-rest").await;
  assert_eq!(second.order.payment_status, PaymentStatus::Paid);
  assert_eq!(second.order.payment_reference.as_deref(), Some("txn-rest"));
  let balances = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances;
  assert_eq!(balances.held, Money::new(237_500));
  assert_eq!(balances.commission, Money::new(12_500));
  assert_invariants(&engine, id).await;
}

#[tokio::test]
#[serial]
async fn test_overpayment_credits_only_the_order_total() {
  setup_tracing();
  let engine = engine();
  let id = place_order(&engine, CATERING).await.order.id;

  let paid = pay(&engine, id, 300_000, "txn-over").await;
  assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
  let balances = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances;
  assert_eq!(balances.held, Money::new(237_500));
  assert_eq!(balances.commission, Money::new(12_500));
}

#[tokio::test]
#[serial]
async fn test_late_payment_on_cancelled_order_is_reversed() {
  setup_tracing();
  let (engine, mut refunds) = engine_with_refunds();
  let id = order_in(&engine, OrderStatus::Cancelled, false).await.order.id;
  assert!(refunds.try_recv().is_err(), "nothing was captured at cancellation");

  let late = pay(&engine, id, CATERING_PRICE, "txn-late").await;
  assert_eq!(late.order.status, OrderStatus::Cancelled);
  assert_eq!(late.order.payment_status, PaymentStatus::Refunded);
  assert_eq!(late.payments.len(), 1);
  assert_eq!(late.payments[0].status, PaymentRecordStatus::Refunded);

  let balances = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances;
  assert_eq!(balances.held, Money::ZERO);
  assert_eq!(balances.commission, Money::ZERO);
  assert_eq!(balances.reversed, Money::new(237_500));

  let intent = refunds.try_recv().expect("late payment should be refunded");
  assert_eq!(intent.amount, Money::new(CATERING_PRICE));
  assert_invariants(&engine, id).await;
}

#[tokio::test]
#[serial]
async fn test_payment_after_completion_is_released_immediately() {
  setup_tracing();
  let engine = engine();
  let id = order_in(&engine, OrderStatus::Completed, false).await.order.id;

  let paid = pay(&engine, id, CATERING_PRICE, "txn-after").await;
  assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
  let balances = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances;
  assert_eq!(balances.held, Money::ZERO);
  assert_eq!(balances.payable, Money::new(237_500));
  assert_invariants(&engine, id).await;
}

#[tokio::test]
#[serial]
async fn test_payment_notifications_are_idempotent() {
  setup_tracing();
  let engine = engine();
  let id = place_order(&engine, CATERING).await.order.id;
  let first = pay(&engine, id, CATERING_PRICE, "txn-dup").await;
  let entries = engine.store().ledger_entries().len();

  let again = pay(&engine, id, CATERING_PRICE, "txn-dup").await;
  assert_eq!(first, again);
  assert_eq!(engine.store().ledger_entries().len(), entries);

  assert_code(
    engine
      .record_payment(notification(id, CATERING_PRICE, "txn-dup", PaymentRecordStatus::Failed))
      .await,
    "PaymentAlreadyReconciled",
  );
  assert_code(
    engine
      .record_payment(notification(id, 1_000, "txn-dup", PaymentRecordStatus::Success))
      .await,
    "PaymentAlreadyReconciled",
  );
  assert_code(
    engine
      .record_payment(notification(id, 0, "txn-zero", PaymentRecordStatus::Success))
      .await,
    "InvalidAmount",
  );
  assert_code(
    engine
      .record_payment(notification(id, 5_000, "txn-ghost", PaymentRecordStatus::Refunded))
      .await,
    "InvalidStatus",
  );
  assert_code(
    engine
      .record_payment(notification(9_999, 5_000, "txn-none", PaymentRecordStatus::Success))
      .await,
    "OrderNotFound",
  );
}

#[tokio::test]
#[serial]
async fn test_pending_payment_settles_on_success() {
  setup_tracing();
  let engine = engine();
  let id = place_order(&engine, CATERING).await.order.id;

  let waiting = engine
    .record_payment(notification(id, CATERING_PRICE, "txn-va", PaymentRecordStatus::Pending))
    .await
    .unwrap();
  assert_eq!(waiting.order.payment_status, PaymentStatus::Pending);
  assert!(engine.store().ledger_entries().is_empty());

  let settled = engine
    .record_payment(notification(id, CATERING_PRICE, "txn-va", PaymentRecordStatus::Success))
    .await
    .unwrap();
  assert_eq!(settled.order.payment_status, PaymentStatus::Paid);
  assert_eq!(settled.payments.len(), 1);
  assert!(settled.payments[0].paid_at.is_some());
  assert_eq!(engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances.held, Money::new(237_500));

  let failed_id = place_order(&engine, CATERING).await.order.id;
  let failed = engine
    .record_payment(notification(failed_id, CATERING_PRICE, "txn-decline", PaymentRecordStatus::Failed))
    .await
    .unwrap();
  assert_eq!(failed.order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
#[serial]
async fn test_gateway_initiated_refund_reverses_vendor_share() {
  setup_tracing();
  let engine = engine();
  let id = place_order(&engine, CATERING).await.order.id;
  pay(&engine, id, CATERING_PRICE, "txn-chargeback").await;

  let refunded = engine
    .record_payment(notification(id, CATERING_PRICE, "txn-chargeback", PaymentRecordStatus::Refunded))
    .await
    .unwrap();
  assert_eq!(refunded.order.status, OrderStatus::Pending);
  assert_eq!(refunded.order.payment_status, PaymentStatus::Refunded);

  let balances = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances;
  assert_eq!(balances.held, Money::ZERO);
  assert_eq!(balances.reversed, Money::new(237_500));
  assert_eq!(balances.commission, Money::ZERO);
  assert_invariants(&engine, id).await;
}

#[tokio::test]
#[serial]
async fn test_partial_refund_takes_from_payable() {
  setup_tracing();
  let (engine, mut refunds) = engine_with_refunds();
  let id = order_in(&engine, OrderStatus::Completed, true).await.order.id;
  refund_amount(&engine, id, 100_000).await;

  let snapshot = engine.get(&admin(), id).await.unwrap();
  assert_eq!(snapshot.order.status, OrderStatus::Refunded);
  assert_eq!(snapshot.order.payment_status, PaymentStatus::Paid);
  assert!(snapshot.payments.iter().all(|p| p.status == PaymentRecordStatus::Success));

  let balances = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap().balances;
  assert_eq!(balances.payable, Money::new(142_500));
  assert_eq!(balances.reversed, Money::new(95_000));
  assert_eq!(balances.commission, Money::new(7_500));
  assert_eq!(refunds.try_recv().unwrap().amount, Money::new(100_000));
  assert_invariants(&engine, id).await;
}

#[tokio::test]
#[serial]
async fn test_refund_amount_is_bounded_by_captured_funds() {
  setup_tracing();
  let engine = engine();
  let id = order_in(&engine, OrderStatus::Completed, true).await.order.id;
  let over = RefundRequest {
    reason: None,
    amount: Some(Decimal::from(300_000)),
  };
  assert_code(engine.refund(&admin(), id, over, TransitionRequest::default()).await, "InvalidAmount");
  let zero = RefundRequest {
    reason: None,
    amount: Some(Decimal::ZERO),
  };
  assert_code(engine.refund(&admin(), id, zero, TransitionRequest::default()).await, "InvalidAmount");
  assert_eq!(engine.get(&admin(), id).await.unwrap().order.status, OrderStatus::Completed);

  let pending = place_order(&engine, CATERING).await.order.id;
  assert_code(
    engine
      .refund(&admin(), pending, RefundRequest::default(), TransitionRequest::default())
      .await,
    "InvalidTransition",
  );
}

#[tokio::test]
#[serial]
async fn test_cancelling_accepted_order_queues_refund() {
  setup_tracing();
  let (engine, mut refunds) = engine_with_refunds();
  let id = order_in(&engine, OrderStatus::Accepted, true).await.order.id;

  let cancelled = engine
    .cancel(&customer(), id, TransitionRequest::with_notes("Wedding postponed"))
    .await
    .unwrap();
  assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
  assert_eq!(cancelled.order.payment_status, PaymentStatus::Refunded);
  let intent = refunds.try_recv().unwrap();
  assert_eq!(intent.idempotency_key, format!("{}:cancel", id));
  assert_eq!(intent.amount, Money::new(CATERING_PRICE));
}

#[tokio::test]
#[serial]
async fn test_refund_dispatch_retries_transient_failures() {
  setup_tracing();
  let gateway = ScriptedGateway::new(vec![
    Err(GatewayError::Unavailable("timeout".into())),
    Err(GatewayError::Unavailable("502".into())),
  ]);
  assert_eq!(
    dispatch(&gateway, &intent(1), &fast_retries(5)).await,
    Some(RefundOutcome::Delivered)
  );
  assert_eq!(gateway.attempts(), 3);
  assert_eq!(gateway.delivered().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_refund_dispatch_gives_up() {
  setup_tracing();
  let rejected = ScriptedGateway::new(vec![Err(GatewayError::Rejected("card closed".into()))]);
  assert_eq!(
    dispatch(&rejected, &intent(2), &fast_retries(5)).await,
    Some(RefundOutcome::Rejected)
  );
  assert_eq!(rejected.attempts(), 1);

  let down = ScriptedGateway::new(vec![
    Err(GatewayError::Unavailable("down".into())),
    Err(GatewayError::Unavailable("down".into())),
    Err(GatewayError::Unavailable("down".into())),
  ]);
  assert_eq!(dispatch(&down, &intent(3), &fast_retries(3)).await, None);
  assert_eq!(down.attempts(), 3);
  assert!(down.delivered().is_empty());
}

#[tokio::test]
#[serial]
async fn test_refund_worker_delivers_after_commit() {
  setup_tracing();
  let gateway = Arc::new(ScriptedGateway::new(vec![Err(GatewayError::Unavailable("warming up".into()))]));
  let store = seeded_store();
  let (queue, worker) = RefundQueue::spawn(gateway.clone(), Arc::new(store.clone()), fast_retries(3));
  let engine = OrderEngine::new(store, SettingsHandle::default()).with_refund_queue(queue);

  let id = order_in(&engine, OrderStatus::Rejected, true).await.order.id;
  for _ in 0..100 {
    if !gateway.delivered().is_empty() {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  let delivered = gateway.delivered();
  assert_eq!(delivered.len(), 1);
  assert_eq!(delivered[0].order_id, id);
  assert_eq!(delivered[0].amount, Money::new(CATERING_PRICE));

  let store = engine.store().clone();
  drop(engine);
  worker.await.unwrap();
  assert!(store.pending_refunds().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_refund_intent_is_written_with_the_transition() {
  setup_tracing();
  let (engine, mut refunds) = engine_with_refunds();
  let id = order_in(&engine, OrderStatus::Accepted, true).await.order.id;
  engine.cancel(&customer(), id, TransitionRequest::default()).await.unwrap();

  let queued = refunds.try_recv().unwrap();
  let pending = engine.store().pending_refunds().await.unwrap();
  assert_eq!(pending, vec![queued]);
}

#[tokio::test]
#[serial]
async fn test_refund_worker_replays_unsettled_intents_on_start() {
  setup_tracing();
  // No worker running when the refund commits, as after a crash.
  let store = seeded_store();
  let engine = OrderEngine::new(store.clone(), SettingsHandle::default());
  let id = order_in(&engine, OrderStatus::Rejected, true).await.order.id;
  assert_eq!(store.pending_refunds().await.unwrap().len(), 1);

  let gateway = Arc::new(ScriptedGateway::new(vec![]));
  let (queue, worker) = RefundQueue::spawn(gateway.clone(), Arc::new(store.clone()), fast_retries(3));
  for _ in 0..100 {
    if store.pending_refunds().await.unwrap().is_empty() {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  assert!(store.pending_refunds().await.unwrap().is_empty());
  let delivered = gateway.delivered();
  assert_eq!(delivered.len(), 1);
  assert_eq!(delivered[0].order_id, id);

  drop(queue);
  worker.await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_rejected_refund_leaves_the_outbox() {
  setup_tracing();
  let store = seeded_store();
  let engine = OrderEngine::new(store.clone(), SettingsHandle::default());
  order_in(&engine, OrderStatus::Rejected, true).await;

  let gateway = Arc::new(ScriptedGateway::new(vec![Err(GatewayError::Rejected("account closed".into()))]));
  let (queue, worker) = RefundQueue::spawn(gateway.clone(), Arc::new(store.clone()), fast_retries(3));
  drop(queue);
  worker.await.unwrap();

  assert_eq!(gateway.attempts(), 1);
  assert!(gateway.delivered().is_empty());
  assert!(store.pending_refunds().await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_exhausted_refund_stays_pending() {
  setup_tracing();
  let store = seeded_store();
  let engine = OrderEngine::new(store.clone(), SettingsHandle::default());
  order_in(&engine, OrderStatus::Rejected, true).await;

  let gateway = Arc::new(ScriptedGateway::new(vec![
    Err(GatewayError::Unavailable("down".into())),
    Err(GatewayError::Unavailable("down".into())),
  ]));
  let (queue, worker) = RefundQueue::spawn(gateway.clone(), Arc::new(store.clone()), fast_retries(2));
  drop(queue);
  worker.await.unwrap();

  assert_eq!(gateway.attempts(), 2);
  assert_eq!(store.pending_refunds().await.unwrap().len(), 1);
}
