// core/examples/lifecycle_demo.rs

use order_engine::{
  Actor, CreateOrderRequest, EngineSettings, LineRequest, MemoryStore, Money, NewReview, OrderEngine, OrderEvent,
  PaymentNotification, PaymentRecordStatus, RefundQueue, RefundRequest, SettingsHandle, TransitionRequest,
};
use tracing::info;

// Walks one order through placement, payment, fulfilment, review and refund
// against the in-memory store.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Order Lifecycle Demo ---");

  let store = MemoryStore::new();
  store.seed_vendor(1, 201, true);
  store.seed_service(10, 1, "Wedding photography", Money::new(1_500_000), true);
  store.seed_package(30, 1, "Gold package", Money::new(800_000), true);

  let (queue, mut refunds) = RefundQueue::channel();
  let engine = OrderEngine::new(store, SettingsHandle::new(EngineSettings::default())).with_refund_queue(queue);
  let customer = Actor::customer(101);
  let vendor = Actor::vendor(201, 1);
  let admin = Actor::admin(900);

  let event_date = (chrono::Utc::now().date_naive() + chrono::Days::new(90))
    .format("%Y-%m-%d")
    .to_string();
  let order = engine
    .create(
      &customer,
      CreateOrderRequest {
        vendor_id: 1,
        event_date,
        event_location: "Garden Terrace, Bali".to_string(),
        notes: Some("Sunset ceremony".to_string()),
        items: vec![LineRequest::service(10, 1), LineRequest::package(30, 1)],
      },
    )
    .await?;
  let id = order.order.id;
  info!(
    number = %order.order.order_number,
    total = %order.order.total_amount,
    commission = %order.order.commission,
    vendor_amount = %order.order.vendor_amount,
    "Order placed."
  );

  let paid = engine
    .record_payment(PaymentNotification {
      order_id: id,
      amount: order.order.total_amount,
      method: "bank_transfer".to_string(),
      gateway: "demo".to_string(),
      gateway_txn_id: "demo-0001".to_string(),
      status: PaymentRecordStatus::Success,
      payload: serde_json::json!({ "channel": "va" }),
      paid_at: None,
    })
    .await?;
  info!(payment_status = %paid.order.payment_status, "Payment received.");

  for event in [OrderEvent::Accept, OrderEvent::Start, OrderEvent::Complete] {
    let snapshot = engine.transition(&vendor, id, event, TransitionRequest::default()).await?;
    info!(%event, status = %snapshot.order.status, "Transition applied.");
  }

  let review = engine
    .create_review(
      &customer,
      id,
      NewReview {
        rating: 5,
        comment: Some("Stunning work".to_string()),
        images: vec![],
      },
    )
    .await?;
  info!(rating = review.rating, "Review posted.");

  let balances = engine.vendor_ledger(&vendor, 1).await?.balances;
  info!(held = %balances.held, payable = %balances.payable, commission = %balances.commission, "Vendor balances.");

  let refunded = engine
    .refund(
      &admin,
      id,
      RefundRequest {
        reason: Some("Album delivered late".to_string()),
        amount: Some(rust_decimal::Decimal::from(230_000)),
      },
      TransitionRequest::default(),
    )
    .await?;
  info!(status = %refunded.order.status, "Partial refund booked.");
  if let Ok(intent) = refunds.try_recv() {
    info!(amount = %intent.amount, key = %intent.idempotency_key, "Refund intent ready for the gateway.");
  }

  for entry in engine.history(&admin, id).await? {
    info!(action = %entry.action, from = ?entry.from_status, to = %entry.to_status, "History");
  }
  Ok(())
}
