// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different slice of these fixtures.

use async_trait::async_trait;
use chrono::{Days, Utc};
use order_engine::{
  Actor, CreateOrderRequest, EngineResult, EngineSettings, GatewayError, LineRequest, MemoryStore, Money, OrderEngine,
  OrderEvent, OrderSnapshot, OrderStatus, OrderStore, PaymentGateway, PaymentNotification, PaymentRecordStatus,
  RefundIntent, RefundQueue, SettingsHandle, TransitionRequest,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::Level;

// --- Seeded catalogue ---
pub const CUSTOMER: i64 = 101;
pub const OTHER_CUSTOMER: i64 = 102;
pub const ADMIN: i64 = 900;

pub const VENDOR: i64 = 1;
pub const VENDOR_USER: i64 = 201;
pub const OTHER_VENDOR: i64 = 2;
pub const OTHER_VENDOR_USER: i64 = 202;
pub const INACTIVE_VENDOR: i64 = 3;
pub const INACTIVE_VENDOR_USER: i64 = 203;

pub const PHOTOGRAPHY: i64 = 10; // V1, 1 500 000
pub const CATERING: i64 = 11; // V1, 250 000
pub const MAKEUP: i64 = 12; // V1, 450 000
pub const RETIRED_DECOR: i64 = 13; // V1, inactive
pub const VENUE: i64 = 20; // V2, 3 000 000
pub const DORMANT_BAND: i64 = 31; // inactive vendor
pub const GOLD_PACKAGE: i64 = 30; // V1, 800 000

pub const PHOTOGRAPHY_PRICE: i64 = 1_500_000;
pub const CATERING_PRICE: i64 = 250_000;
pub const MAKEUP_PRICE: i64 = 450_000;
pub const GOLD_PACKAGE_PRICE: i64 = 800_000;

pub fn seeded_store() -> MemoryStore {
  let store = MemoryStore::new();
  store.seed_vendor(VENDOR, VENDOR_USER, true);
  store.seed_vendor(OTHER_VENDOR, OTHER_VENDOR_USER, true);
  store.seed_vendor(INACTIVE_VENDOR, INACTIVE_VENDOR_USER, false);
  store.seed_service(PHOTOGRAPHY, VENDOR, "Wedding photography", Money::new(PHOTOGRAPHY_PRICE), true);
  store.seed_service(CATERING, VENDOR, "Catering for 100", Money::new(CATERING_PRICE), true);
  store.seed_service(MAKEUP, VENDOR, "Bridal makeup", Money::new(MAKEUP_PRICE), true);
  store.seed_service(RETIRED_DECOR, VENDOR, "Retired decoration", Money::new(100_000), false);
  store.seed_service(VENUE, OTHER_VENDOR, "Garden venue", Money::new(3_000_000), true);
  store.seed_service(DORMANT_BAND, INACTIVE_VENDOR, "Live band", Money::new(700_000), true);
  store.seed_package(GOLD_PACKAGE, VENDOR, "Gold package", Money::new(GOLD_PACKAGE_PRICE), true);
  store
}

pub fn engine() -> OrderEngine<MemoryStore> {
  engine_with(EngineSettings::default())
}

pub fn engine_with(settings: EngineSettings) -> OrderEngine<MemoryStore> {
  OrderEngine::new(seeded_store(), SettingsHandle::new(settings))
}

/// An engine whose refund intents land in the returned receiver.
pub fn engine_with_refunds() -> (OrderEngine<MemoryStore>, UnboundedReceiver<RefundIntent>) {
  let (queue, receiver) = RefundQueue::channel();
  (engine().with_refund_queue(queue), receiver)
}

// --- Actors ---
pub fn customer() -> Actor {
  Actor::customer(CUSTOMER)
}

pub fn other_customer() -> Actor {
  Actor::customer(OTHER_CUSTOMER)
}

pub fn vendor() -> Actor {
  Actor::vendor(VENDOR_USER, VENDOR)
}

pub fn other_vendor() -> Actor {
  Actor::vendor(OTHER_VENDOR_USER, OTHER_VENDOR)
}

pub fn admin() -> Actor {
  Actor::admin(ADMIN)
}

/// The actor that normally fires `event` on a V1 order placed by `CUSTOMER`.
pub fn actor_for(event: OrderEvent) -> Actor {
  match event {
    OrderEvent::Accept | OrderEvent::Reject | OrderEvent::Start | OrderEvent::Complete => vendor(),
    OrderEvent::Cancel => customer(),
    OrderEvent::Refund => admin(),
  }
}

// --- Requests ---
pub fn event_date_in(days: u64) -> String {
  (Utc::now().date_naive() + Days::new(days)).format("%Y-%m-%d").to_string()
}

pub fn order_request(items: Vec<LineRequest>) -> CreateOrderRequest {
  CreateOrderRequest {
    vendor_id: VENDOR,
    event_date: event_date_in(30),
    event_location: "Grand Ballroom, Jakarta".to_string(),
    notes: None,
    items,
  }
}

pub async fn place_order<S: OrderStore>(engine: &OrderEngine<S>, service_id: i64) -> OrderSnapshot {
  engine
    .create(&customer(), order_request(vec![LineRequest::service(service_id, 1)]))
    .await
    .expect("order should be created")
}

pub fn notification(order_id: i64, amount: i64, txn: &str, status: PaymentRecordStatus) -> PaymentNotification {
  PaymentNotification {
    order_id,
    amount: Money::new(amount),
    method: "bank_transfer".to_string(),
    gateway: "midtrans".to_string(),
    gateway_txn_id: txn.to_string(),
    status,
    payload: serde_json::json!({ "txn": txn }),
    paid_at: None,
  }
}

pub async fn pay<S: OrderStore>(engine: &OrderEngine<S>, order_id: i64, amount: i64, txn: &str) -> OrderSnapshot {
  engine
    .record_payment(notification(order_id, amount, txn, PaymentRecordStatus::Success))
    .await
    .expect("payment should be recorded")
}

pub async fn fire<S: OrderStore>(engine: &OrderEngine<S>, order_id: i64, event: OrderEvent) -> EngineResult<OrderSnapshot> {
  engine
    .transition(&actor_for(event), order_id, event, TransitionRequest::default())
    .await
}

/// Events that lead a fresh order to `status`.
pub fn path_to(status: OrderStatus) -> Vec<OrderEvent> {
  use OrderEvent::*;
  match status {
    OrderStatus::Pending => vec![],
    OrderStatus::Accepted => vec![Accept],
    OrderStatus::InProgress => vec![Accept, Start],
    OrderStatus::Completed => vec![Accept, Start, Complete],
    OrderStatus::Rejected => vec![Reject],
    OrderStatus::Cancelled => vec![Cancel],
    OrderStatus::Refunded => vec![Accept, Start, Complete, Refund],
  }
}

/// A catering order (250 000) driven to `status`, fully paid first when `paid`.
pub async fn order_in<S: OrderStore>(engine: &OrderEngine<S>, status: OrderStatus, paid: bool) -> OrderSnapshot {
  let mut snapshot = place_order(engine, CATERING).await;
  let id = snapshot.order.id;
  if paid {
    snapshot = pay(engine, id, CATERING_PRICE, &format!("txn-{}", id)).await;
  }
  for event in path_to(status) {
    snapshot = fire(engine, id, event).await.expect("lifecycle step should succeed");
  }
  assert_eq!(snapshot.order.status, status);
  snapshot
}

pub fn assert_code<T: Debug>(result: EngineResult<T>, code: &str) {
  match result {
    Ok(value) => panic!("expected {} but the call succeeded with {:?}", code, value),
    Err(e) => assert_eq!(e.code(), code, "unexpected error: {}", e),
  }
}

/// Re-checks the committed aggregate against the engine's invariants.
pub async fn assert_invariants<S: OrderStore>(engine: &OrderEngine<S>, order_id: i64) {
  let agg = engine.store().find_by_id(order_id).await.expect("order should exist");
  if let Err(e) = order_engine::invariants::verify(&agg) {
    panic!("invariants violated on order {}: {}", order_id, e);
  }
}

// --- Gateway double ---

/// Replays a scripted sequence of outcomes, then accepts everything.
pub struct ScriptedGateway {
  script: Mutex<VecDeque<Result<String, GatewayError>>>,
  attempts: AtomicU32,
  delivered: Mutex<Vec<RefundIntent>>,
}

impl ScriptedGateway {
  pub fn new(script: Vec<Result<String, GatewayError>>) -> Self {
    Self {
      script: Mutex::new(script.into()),
      attempts: AtomicU32::new(0),
      delivered: Mutex::new(Vec::new()),
    }
  }

  pub fn attempts(&self) -> u32 {
    self.attempts.load(Ordering::SeqCst)
  }

  pub fn delivered(&self) -> Vec<RefundIntent> {
    self.delivered.lock().clone()
  }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
  fn name(&self) -> &str {
    "scripted"
  }

  async fn refund(&self, intent: &RefundIntent) -> Result<String, GatewayError> {
    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    let outcome = self
      .script
      .lock()
      .pop_front()
      .unwrap_or_else(|| Ok(format!("rf-{}-{}", intent.order_id, attempt)));
    if outcome.is_ok() {
      self.delivered.lock().push(intent.clone());
    }
    outcome
  }
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
