// tests/lifecycle_scenario_tests.rs
mod common;

use common::*;
use order_engine::model::HistoryAction;
use order_engine::{
  EditOrderRequest, LedgerBucket, LineRequest, Money, NewReview, OrderEvent, OrderStatus, OrderStore, PaymentRecordStatus,
  PaymentStatus, RefundRequest, TransitionRequest,
};
use rust_decimal::Decimal;
use serial_test::serial;

fn looks_like_order_number(number: &str) -> bool {
  number.len() == 16 && number.starts_with("WC") && number[2..].chars().all(|c| c.is_ascii_digit())
}

#[tokio::test]
#[serial]
async fn test_happy_path_from_placement_to_review() {
  setup_tracing();
  let engine = engine();

  let created = place_order(&engine, PHOTOGRAPHY).await;
  let id = created.order.id;
  assert!(looks_like_order_number(&created.order.order_number), "{}", created.order.order_number);
  assert_eq!(created.order.status, OrderStatus::Pending);
  assert_eq!(created.order.total_amount, Money::new(1_500_000));
  assert_eq!(created.order.commission, Money::new(75_000));
  assert_eq!(created.order.vendor_amount, Money::new(1_425_000));
  assert_eq!(created.items.len(), 1);
  assert_eq!(created.items[0].total_price, Money::new(1_500_000));
  assert_invariants(&engine, id).await;

  let paid = pay(&engine, id, PHOTOGRAPHY_PRICE, "txn-s1").await;
  assert_eq!(paid.order.payment_status, PaymentStatus::Paid);
  let ledger = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap();
  assert_eq!(ledger.balances.held, Money::new(1_425_000));
  assert_eq!(ledger.balances.commission, Money::new(75_000));
  assert_invariants(&engine, id).await;

  let accepted = fire(&engine, id, OrderEvent::Accept).await.unwrap();
  assert_eq!(accepted.order.status, OrderStatus::Accepted);
  let started = fire(&engine, id, OrderEvent::Start).await.unwrap();
  assert_eq!(started.order.status, OrderStatus::InProgress);
  let completed = fire(&engine, id, OrderEvent::Complete).await.unwrap();
  assert_eq!(completed.order.status, OrderStatus::Completed);
  assert!(completed.order.escrow_released);
  assert!(completed.order.escrow_released_at.is_some());
  assert_invariants(&engine, id).await;

  let ledger = engine.vendor_ledger(&vendor(), VENDOR).await.unwrap();
  assert_eq!(ledger.balances.held, Money::ZERO);
  assert_eq!(ledger.balances.payable, Money::new(1_425_000));

  let review = engine
    .create_review(
      &customer(),
      id,
      NewReview {
        rating: 5,
        comment: Some("Beautiful photos".to_string()),
        images: vec![],
      },
    )
    .await
    .unwrap();
  assert_eq!(review.rating, 5);
  assert_eq!(review.vendor_id, VENDOR);
  assert_invariants(&engine, id).await;

  let actions: Vec<HistoryAction> = engine
    .history(&customer(), id)
    .await
    .unwrap()
    .into_iter()
    .map(|h| h.action)
    .collect();
  assert_eq!(
    actions,
    vec![
      HistoryAction::Create,
      HistoryAction::Transition(OrderEvent::Accept),
      HistoryAction::Transition(OrderEvent::Start),
      HistoryAction::Transition(OrderEvent::Complete),
    ]
  );
}

#[tokio::test]
#[serial]
async fn test_rejection_refunds_captured_payment() {
  setup_tracing();
  let (engine, mut refunds) = engine_with_refunds();
  let id = place_order(&engine, CATERING).await.order.id;
  pay(&engine, id, CATERING_PRICE, "txn-s2").await;

  let rejected = fire(&engine, id, OrderEvent::Reject).await.unwrap();
  assert_eq!(rejected.order.status, OrderStatus::Rejected);
  assert_eq!(rejected.order.payment_status, PaymentStatus::Refunded);
  assert!(rejected.payments.iter().all(|p| p.status == PaymentRecordStatus::Refunded));
  assert_invariants(&engine, id).await;

  let held: Vec<Money> = engine
    .store()
    .find_by_id(id)
    .await
    .unwrap()
    .ledger
    .iter()
    .filter(|e| e.bucket == LedgerBucket::Held)
    .map(|e| e.amount)
    .collect();
  assert_eq!(held, vec![Money::new(237_500), Money::new(-237_500)]);

  let intent = refunds.try_recv().expect("a refund intent should be queued");
  assert_eq!(intent.order_id, id);
  assert_eq!(intent.amount, Money::new(CATERING_PRICE));

  let before = engine.store().find_by_id(id).await.unwrap();
  assert_code(fire(&engine, id, OrderEvent::Reject).await, "InvalidTransition");
  assert_eq!(engine.store().find_by_id(id).await.unwrap(), before);
  assert!(refunds.try_recv().is_err());
}

#[tokio::test]
#[serial]
async fn test_mixed_vendor_basket_writes_nothing() {
  setup_tracing();
  let engine = engine();
  let request = order_request(vec![LineRequest::service(PHOTOGRAPHY, 1), LineRequest::service(VENUE, 1)]);

  assert_code(engine.create(&customer(), request).await, "MixedVendor");
  assert_eq!(engine.store().order_row_count(), 0);
  assert!(engine.store().ledger_entries().is_empty());
}

#[tokio::test]
#[serial]
async fn test_pending_edit_reprices_with_package() {
  setup_tracing();
  let engine = engine();
  let id = place_order(&engine, CATERING).await.order.id;

  let edited = engine
    .edit(
      &customer(),
      id,
      EditOrderRequest {
        items: Some(vec![LineRequest::package(GOLD_PACKAGE, 1)]),
        ..Default::default()
      },
    )
    .await
    .unwrap();

  assert_eq!(edited.order.total_amount, Money::new(800_000));
  assert_eq!(edited.order.commission, Money::new(40_000));
  assert_eq!(edited.order.vendor_amount, Money::new(760_000));
  assert_eq!(edited.items.len(), 1);
  assert_eq!(edited.items[0].package_id, Some(GOLD_PACKAGE));
  assert_eq!(edited.items[0].service_id, None);
  assert_invariants(&engine, id).await;

  let last = engine.history(&customer(), id).await.unwrap().pop().unwrap();
  assert_eq!(last.action, HistoryAction::Edit);
}

#[tokio::test]
#[serial]
async fn test_admin_refund_after_completion() {
  setup_tracing();
  let (engine, mut refunds) = engine_with_refunds();
  let id = place_order(&engine, MAKEUP).await.order.id;
  pay(&engine, id, MAKEUP_PRICE, "txn-s5").await;
  for event in [OrderEvent::Accept, OrderEvent::Start, OrderEvent::Complete] {
    fire(&engine, id, event).await.unwrap();
  }

  let refunded = engine
    .refund(
      &admin(),
      id,
      RefundRequest {
        reason: Some("Vendor no-show".to_string()),
        amount: Some(Decimal::from(450_000)),
      },
      TransitionRequest::default(),
    )
    .await
    .unwrap();

  assert_eq!(refunded.order.status, OrderStatus::Refunded);
  assert!(refunded.order.escrow_released);
  assert_invariants(&engine, id).await;

  let ledger = engine.vendor_ledger(&admin(), VENDOR).await.unwrap();
  assert_eq!(ledger.balances.payable, Money::ZERO);
  assert_eq!(ledger.balances.reversed, Money::new(427_500));
  let refund_entries: Vec<(LedgerBucket, Money)> = ledger
    .entries
    .iter()
    .filter(|e| e.reason == "refund")
    .map(|e| (e.bucket, e.amount))
    .collect();
  assert!(refund_entries.contains(&(LedgerBucket::Payable, Money::new(-427_500))));
  assert!(refund_entries.contains(&(LedgerBucket::Reversed, Money::new(427_500))));

  let intent = refunds.try_recv().expect("refund intent should be queued");
  assert_eq!(intent.amount, Money::new(450_000));
  assert_eq!(intent.reason, "Vendor no-show");
}

#[tokio::test]
#[serial]
async fn test_second_review_is_rejected_and_first_kept() {
  setup_tracing();
  let engine = engine();
  let id = order_in(&engine, OrderStatus::Completed, true).await.order.id;
  let first = engine
    .create_review(
      &customer(),
      id,
      NewReview {
        rating: 5,
        comment: Some("Perfect".to_string()),
        images: vec!["https://cdn.example.com/r/1.jpg".to_string()],
      },
    )
    .await
    .unwrap();

  let second = engine
    .create_review(
      &customer(),
      id,
      NewReview {
        rating: 1,
        comment: Some("Changed my mind".to_string()),
        images: vec![],
      },
    )
    .await;
  assert_code(second, "DuplicateReview");

  let stored = engine.get(&customer(), id).await.unwrap().review.unwrap();
  assert_eq!(stored, first);
}
