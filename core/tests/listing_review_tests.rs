// tests/listing_review_tests.rs
mod common;

use common::*;
use order_engine::{
  Actor, LineRequest, Money, NewReview, OrderFilter, OrderFilterParams, OrderStatus, RefundRequest, ReviewReply, Role,
  TransitionRequest,
};
use serial_test::serial;

fn stars(rating: i32) -> NewReview {
  NewReview {
    rating,
    comment: Some(format!("{} stars", rating)),
    images: vec![],
  }
}

#[tokio::test]
#[serial]
async fn test_listing_is_narrowed_to_the_actor() {
  setup_tracing();
  let engine = engine();
  let mine = place_order(&engine, CATERING).await.order.id;
  let theirs = engine
    .create(&other_customer(), order_request(vec![LineRequest::service(MAKEUP, 1)]))
    .await
    .unwrap()
    .order
    .id;
  let elsewhere = engine
    .create(
      &customer(),
      order_engine::CreateOrderRequest {
        vendor_id: OTHER_VENDOR,
        ..order_request(vec![LineRequest::service(VENUE, 1)])
      },
    )
    .await
    .unwrap()
    .order
    .id;

  let ids = |page: order_engine::Page<order_engine::Order>| -> Vec<i64> {
    let mut ids: Vec<i64> = page.items.iter().map(|o| o.id).collect();
    ids.sort();
    ids
  };

  // A customer asking for someone else's orders still only sees their own.
  let asked_for_other = OrderFilter {
    customer_id: Some(OTHER_CUSTOMER),
    ..Default::default()
  };
  assert_eq!(ids(engine.list(&customer(), asked_for_other).await.unwrap()), vec![mine, elsewhere]);
  assert_eq!(ids(engine.list(&vendor(), OrderFilter::default()).await.unwrap()), vec![mine, theirs]);
  assert_eq!(ids(engine.list(&other_vendor(), OrderFilter::default()).await.unwrap()), vec![elsewhere]);
  assert_eq!(ids(engine.list(&admin(), OrderFilter::default()).await.unwrap()).len(), 3);

  let profileless = Actor {
    user_id: 555,
    role: Role::Vendor,
    vendor_profile_id: None,
  };
  assert_code(engine.list(&profileless, OrderFilter::default()).await, "WrongRole");
}

#[tokio::test]
#[serial]
async fn test_listing_pages_filters_and_sorts() {
  setup_tracing();
  let engine = engine();
  for quantity in 1..=12 {
    engine
      .create(&customer(), order_request(vec![LineRequest::service(CATERING, quantity)]))
      .await
      .unwrap();
  }
  let first = engine.list(&admin(), OrderFilter::default()).await.unwrap().items[0].id;
  engine
    .transition(&vendor(), first, order_engine::OrderEvent::Accept, TransitionRequest::default())
    .await
    .unwrap();

  let page = engine
    .list(
      &admin(),
      OrderFilterParams {
        sort_by: Some("total_amount".into()),
        sort_order: Some("asc".into()),
        page: Some(3),
        limit: Some(5),
        ..Default::default()
      }
      .into_filter()
      .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(page.total, 12);
  assert_eq!(page.total_pages(), 3);
  let totals: Vec<Money> = page.items.iter().map(|o| o.total_amount).collect();
  assert_eq!(totals, vec![Money::new(11 * CATERING_PRICE), Money::new(12 * CATERING_PRICE)]);

  let accepted = engine
    .list(
      &vendor(),
      OrderFilterParams {
        status: Some("accepted".into()),
        ..Default::default()
      }
      .into_filter()
      .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(accepted.total, 1);
  assert_eq!(accepted.items[0].status, OrderStatus::Accepted);

  let number = engine.get(&admin(), first).await.unwrap().order.order_number;
  let searched = engine
    .list(
      &customer(),
      OrderFilter {
        search: Some(number[10..].to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  assert!(searched.items.iter().any(|o| o.id == first));
}

#[test]
fn test_filter_params_are_normalised() {
  let clamped = OrderFilterParams {
    limit: Some(500),
    page: Some(0),
    ..Default::default()
  }
  .into_filter()
  .unwrap();
  assert_eq!(clamped.limit, 100);
  assert_eq!(clamped.page, 1);

  let bad_sort = OrderFilterParams {
    sort_by: Some("customer_email".into()),
    ..Default::default()
  };
  assert_eq!(bad_sort.into_filter().unwrap_err().code(), "InvalidStatus");

  let inverted = OrderFilterParams {
    start_date: Some("2025-06-30".into()),
    end_date: Some("2025-06-01".into()),
    ..Default::default()
  };
  assert_eq!(inverted.into_filter().unwrap_err().code(), "InvalidDate");
}

#[tokio::test]
#[serial]
async fn test_review_rules() {
  setup_tracing();
  let engine = engine();
  let pending = place_order(&engine, CATERING).await.order.id;
  assert_code(engine.create_review(&customer(), pending, stars(5)).await, "ActionNotAllowed");

  let id = order_in(&engine, OrderStatus::Completed, true).await.order.id;
  assert_code(engine.create_review(&customer(), id, stars(0)).await, "InvalidRating");
  assert_code(engine.create_review(&customer(), id, stars(6)).await, "InvalidRating");
  assert_code(engine.create_review(&vendor(), id, stars(5)).await, "WrongRole");
  assert_code(engine.create_review(&other_customer(), id, stars(5)).await, "NotOwner");
  assert_code(
    engine
      .reply_review(&vendor(), id, ReviewReply { reply: "Thanks!".into() })
      .await,
    "ReviewNotFound",
  );

  engine.create_review(&customer(), id, stars(4)).await.unwrap();
  assert_code(
    engine
      .reply_review(&other_vendor(), id, ReviewReply { reply: "Hi".into() })
      .await,
    "NotOwner",
  );
  let replied = engine
    .reply_review(&vendor(), id, ReviewReply { reply: "  Thank you!  ".into() })
    .await
    .unwrap();
  assert_eq!(replied.vendor_reply.as_deref(), Some("Thank you!"));
  assert!(replied.replied_at.is_some());

  assert_code(engine.highlight_review(&vendor(), id, true).await, "WrongRole");
  let highlighted = engine.highlight_review(&admin(), id, true).await.unwrap();
  assert!(highlighted.is_highlighted);
  assert_eq!(highlighted.vendor_reply.as_deref(), Some("Thank you!"));

  // A reviewed order can still be refunded; the review stays.
  let refunded = engine
    .refund(&admin(), id, RefundRequest::default(), TransitionRequest::default())
    .await
    .unwrap();
  assert_eq!(refunded.order.status, OrderStatus::Refunded);
  assert_eq!(refunded.review.map(|r| r.rating), Some(4));
  assert_invariants(&engine, id).await;
}

#[tokio::test]
#[serial]
async fn test_refunded_order_can_still_be_reviewed() {
  setup_tracing();
  let engine = engine();
  let id = order_in(&engine, OrderStatus::Refunded, true).await.order.id;

  let review = engine.create_review(&customer(), id, stars(2)).await.unwrap();
  assert_eq!(review.rating, 2);
  assert_code(engine.create_review(&customer(), id, stars(3)).await, "DuplicateReview");

  let snapshot = engine.get(&customer(), id).await.unwrap();
  assert_eq!(snapshot.order.status, OrderStatus::Refunded);
  assert_eq!(snapshot.review.map(|r| r.rating), Some(2));
  assert_invariants(&engine, id).await;

  let cancelled = order_in(&engine, OrderStatus::Cancelled, true).await.order.id;
  assert_code(engine.create_review(&customer(), cancelled, stars(5)).await, "ActionNotAllowed");
}
