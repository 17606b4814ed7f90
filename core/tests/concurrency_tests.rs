// tests/concurrency_tests.rs
mod common;

use async_trait::async_trait;
use common::*;
use order_engine::model::{LedgerEntry, Order, OrderAggregate, StatusHistoryEntry};
use order_engine::store::memory::MemoryTx;
use order_engine::store::{OrderFilter, Page};
use order_engine::{
  EngineResult, EngineSettings, LineRequest, MemoryStore, Money, NewReview, OrderEngine, OrderEvent, OrderStatus,
  OrderStore, PaymentRecordStatus, RefundIntent, RefundOutbox, RefundOutcome, SettingsHandle, StoreTx,
  TransitionRequest,
};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Memory store whose committed-state reads take `delay`.
struct SlowReads {
  inner: MemoryStore,
  delay: Duration,
}

#[async_trait]
impl RefundOutbox for SlowReads {
  async fn pending_refunds(&self) -> EngineResult<Vec<RefundIntent>> {
    self.inner.pending_refunds().await
  }

  async fn settle_refund(&self, idempotency_key: &str, outcome: RefundOutcome) -> EngineResult<()> {
    self.inner.settle_refund(idempotency_key, outcome).await
  }
}

#[async_trait]
impl OrderStore for SlowReads {
  type Tx = MemoryTx;

  async fn begin(&self, timeout: Duration) -> EngineResult<MemoryTx> {
    self.inner.begin(timeout).await
  }

  async fn find_by_id(&self, order_id: i64) -> EngineResult<OrderAggregate> {
    tokio::time::sleep(self.delay).await;
    self.inner.find_by_id(order_id).await
  }

  async fn find_by_number(&self, order_number: &str) -> EngineResult<OrderAggregate> {
    tokio::time::sleep(self.delay).await;
    self.inner.find_by_number(order_number).await
  }

  async fn list(&self, filter: &OrderFilter) -> EngineResult<Page<Order>> {
    self.inner.list(filter).await
  }

  async fn history(&self, order_id: i64) -> EngineResult<Vec<StatusHistoryEntry>> {
    self.inner.history(order_id).await
  }

  async fn ledger_for_vendor(&self, vendor_id: i64) -> EngineResult<Vec<LedgerEntry>> {
    self.inner.ledger_for_vendor(vendor_id).await
  }

  async fn mark_needs_review(&self, order_id: i64) -> EngineResult<()> {
    self.inner.mark_needs_review(order_id).await
  }

  async fn vendor_profile_for_user(&self, user_id: i64) -> EngineResult<Option<i64>> {
    self.inner.vendor_profile_for_user(user_id).await
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_accept_and_cancel_have_one_winner() {
  setup_tracing();
  let engine = Arc::new(engine());

  for _ in 0..20 {
    let read = place_order(engine.as_ref(), CATERING).await;
    let id = read.order.id;
    let seen = read.order.version;

    let accept = {
      let engine = engine.clone();
      tokio::spawn(async move {
        engine
          .transition(&vendor(), id, OrderEvent::Accept, TransitionRequest::default().if_version(seen))
          .await
      })
    };
    let cancel = {
      let engine = engine.clone();
      tokio::spawn(async move {
        engine
          .transition(&customer(), id, OrderEvent::Cancel, TransitionRequest::default().if_version(seen))
          .await
      })
    };
    let (accept, cancel) = (accept.await.unwrap(), cancel.await.unwrap());

    let winner = match (&accept, &cancel) {
      (Ok(_), Err(e)) | (Err(e), Ok(_)) => {
        assert!(
          matches!(e.code(), "InvalidTransition" | "OptimisticConflict"),
          "loser saw {}",
          e
        );
        if accept.is_ok() {
          OrderStatus::Accepted
        } else {
          OrderStatus::Cancelled
        }
      }
      _ => panic!("expected exactly one winner, got {:?} and {:?}", accept, cancel),
    };
    let status = engine.get(&admin(), id).await.unwrap().order.status;
    assert_eq!(status, winner);
    assert_invariants(engine.as_ref(), id).await;
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_racing_accept_and_reject_serialise_on_the_row() {
  setup_tracing();
  let engine = Arc::new(engine());
  let id = order_in(engine.as_ref(), OrderStatus::Pending, true).await.order.id;

  let handles: Vec<_> = [OrderEvent::Accept, OrderEvent::Reject, OrderEvent::Accept, OrderEvent::Reject]
    .into_iter()
    .map(|event| {
      let engine = engine.clone();
      tokio::spawn(async move { fire(engine.as_ref(), id, event).await })
    })
    .collect();

  let mut successes = 0;
  for handle in handles {
    match handle.await.unwrap() {
      Ok(_) => successes += 1,
      Err(e) => assert_eq!(e.code(), "InvalidTransition"),
    }
  }
  assert_eq!(successes, 1);
  assert_invariants(engine.as_ref(), id).await;
}

#[tokio::test]
#[serial]
async fn test_order_numbers_increase_within_the_day() {
  setup_tracing();
  let engine = engine();
  let mut numbers = Vec::new();
  for _ in 0..5 {
    numbers.push(place_order(&engine, CATERING).await.order.order_number);
  }
  let day = chrono::Utc::now().date_naive().format("%Y%m%d").to_string();
  assert!(numbers.iter().all(|n| n[2..10] == day));
  assert!(numbers.windows(2).all(|w| w[0] < w[1]), "{:?}", numbers);
  assert_eq!(numbers[0], format!("WC{}000001", day));
  assert_eq!(numbers[4], format!("WC{}000005", day));

  let found = engine.find_by_number(&customer(), &numbers[2]).await.unwrap();
  assert_eq!(found.order.order_number, numbers[2]);
  assert_code(engine.find_by_number(&customer(), "WC19990101000001").await, "OrderNotFound");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_creates_get_unique_numbers() {
  setup_tracing();
  let engine = Arc::new(engine());
  let handles: Vec<_> = (0..10)
    .map(|_| {
      let engine = engine.clone();
      tokio::spawn(async move {
        engine
          .create(&customer(), order_request(vec![LineRequest::service(CATERING, 1)]))
          .await
      })
    })
    .collect();

  let mut numbers = HashSet::new();
  for handle in handles {
    let created = handle.await.unwrap().unwrap();
    assert!(numbers.insert(created.order.order_number));
  }
  assert_eq!(numbers.len(), 10);
  assert_eq!(engine.store().order_row_count(), 10);
}

#[tokio::test]
#[serial]
async fn test_locked_row_times_out() {
  setup_tracing();
  let engine = engine().with_request_timeout(Duration::from_millis(50));
  let id = place_order(&engine, CATERING).await.order.id;

  let mut blocker = engine.store().begin(Duration::from_secs(5)).await.unwrap();
  blocker.load_for_update(id).await.unwrap();

  assert_code(fire(&engine, id, OrderEvent::Accept).await, "Timeout");
  assert_eq!(engine.get(&vendor(), id).await.unwrap().order.status, OrderStatus::Pending);

  drop(blocker);
  let accepted = fire(&engine, id, OrderEvent::Accept).await.unwrap();
  assert_eq!(accepted.order.status, OrderStatus::Accepted);
}

#[tokio::test]
#[serial]
async fn test_slow_read_after_commit_is_not_a_timeout() {
  setup_tracing();
  let store = SlowReads {
    inner: seeded_store(),
    delay: Duration::from_millis(150),
  };
  let engine = OrderEngine::new(store, SettingsHandle::default()).with_request_timeout(Duration::from_millis(50));
  let id = order_in(&engine, OrderStatus::InProgress, true).await.order.id;

  let completed = fire(&engine, id, OrderEvent::Complete).await.unwrap();
  assert_eq!(completed.order.status, OrderStatus::Completed);
  assert!(completed.order.escrow_released);

  let committed = engine.store().inner.find_by_id(id).await.unwrap();
  assert_eq!(committed.order.status, OrderStatus::Completed);
  assert!(committed.order.escrow_released);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_duplicate_notifications_race_to_one_payment() {
  setup_tracing();
  let engine = Arc::new(engine());
  let id = place_order(engine.as_ref(), CATERING).await.order.id;

  let handles: Vec<_> = (0..5)
    .map(|_| {
      let engine = engine.clone();
      tokio::spawn(async move {
        engine
          .record_payment(notification(id, CATERING_PRICE, "txn-retry-storm", PaymentRecordStatus::Success))
          .await
      })
    })
    .collect();
  for handle in handles {
    handle.await.unwrap().unwrap();
  }

  let snapshot = engine.get(&admin(), id).await.unwrap();
  assert_eq!(snapshot.payments.len(), 1);
  let balances = engine.vendor_ledger(&admin(), VENDOR).await.unwrap().balances;
  assert_eq!(balances.held, Money::new(237_500));
}

#[tokio::test]
#[serial]
async fn test_maintenance_mode_blocks_everyone_but_admins_and_gateways() {
  setup_tracing();
  let engine = engine_with(EngineSettings::default());
  let pending = place_order(&engine, CATERING).await.order.id;
  let completed = order_in(&engine, OrderStatus::Completed, true).await.order.id;
  let cancelled = order_in(&engine, OrderStatus::Cancelled, false).await.order.id;
  engine.settings().update(|s| s.maintenance_mode = true);

  assert_code(
    engine
      .create(&customer(), order_request(vec![LineRequest::service(CATERING, 1)]))
      .await,
    "MaintenanceMode",
  );
  assert_code(fire(&engine, pending, OrderEvent::Accept).await, "MaintenanceMode");
  assert_code(engine.delete(&customer(), cancelled).await, "MaintenanceMode");
  let review = NewReview {
    rating: 4,
    comment: None,
    images: vec![],
  };
  assert_code(engine.create_review(&customer(), completed, review).await, "MaintenanceMode");

  let paid = pay(&engine, pending, CATERING_PRICE, "txn-maint").await;
  assert_eq!(paid.order.payment_status, order_engine::PaymentStatus::Paid);
  let accepted = engine
    .transition(&admin(), pending, OrderEvent::Accept, TransitionRequest::default())
    .await
    .unwrap();
  assert_eq!(accepted.order.status, OrderStatus::Accepted);

  engine.settings().update(|s| s.maintenance_mode = false);
  engine.delete(&customer(), cancelled).await.unwrap();
}
