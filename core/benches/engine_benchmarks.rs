// core/benches/engine_benchmarks.rs

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use order_engine::catalog::CatalogItem;
use order_engine::pricing::price_basket;
use order_engine::{
  Actor, CreateOrderRequest, EngineSettings, ItemKind, LineRequest, MemoryStore, Money, OrderEngine, OrderEvent,
  PaymentNotification, PaymentRecordStatus, PriceAuthority, SettingsHandle, TransitionRequest,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Runtime;

const VENDOR: i64 = 1;
const VENDOR_USER: i64 = 201;
const CUSTOMER: i64 = 101;

fn basket(lines: usize) -> (Vec<LineRequest>, Vec<CatalogItem>) {
  (0..lines)
    .map(|i| {
      let id = i as i64 + 1;
      let item = CatalogItem {
        kind: ItemKind::Service,
        id,
        vendor_id: VENDOR,
        name: format!("service {}", id),
        unit_price: Money::new(125_010 + id * 7),
        is_active: true,
      };
      (LineRequest::service(id, (i % 4) as i32 + 1), item)
    })
    .unzip()
}

fn bench_pricing(c: &mut Criterion) {
  let mut group = c.benchmark_group("PriceBasket");
  let rate = Decimal::new(5, 2);
  for lines in [1usize, 10, 100] {
    let (requests, resolved) = basket(lines);
    group.throughput(Throughput::Elements(lines as u64));
    group.bench_with_input(BenchmarkId::from_parameter(lines), &lines, |b, _| {
      b.iter(|| price_basket(&requests, &resolved, PriceAuthority::CatalogOnly, rate, Some(VENDOR)))
    });
  }
  group.finish();
}

fn seeded_engine() -> OrderEngine<MemoryStore> {
  let store = MemoryStore::new();
  store.seed_vendor(VENDOR, VENDOR_USER, true);
  store.seed_service(10, VENDOR, "Wedding photography", Money::new(1_500_000), true);
  OrderEngine::new(store, SettingsHandle::new(EngineSettings::default()))
}

fn bench_lifecycle(c: &mut Criterion) {
  let rt = Runtime::new().unwrap();
  let engine = seeded_engine();
  let customer = Actor::customer(CUSTOMER);
  let vendor = Actor::vendor(VENDOR_USER, VENDOR);
  let txn = AtomicU64::new(0);
  let event_date = (chrono::Utc::now().date_naive() + chrono::Days::new(60))
    .format("%Y-%m-%d")
    .to_string();

  c.bench_function("create_pay_complete", |b| {
    b.to_async(&rt).iter(|| async {
      let order = engine
        .create(
          &customer,
          CreateOrderRequest {
            vendor_id: VENDOR,
            event_date: event_date.clone(),
            event_location: "Bench Hall".to_string(),
            notes: None,
            items: vec![LineRequest::service(10, 1)],
          },
        )
        .await
        .unwrap();
      let id = order.order.id;
      engine
        .record_payment(PaymentNotification {
          order_id: id,
          amount: Money::new(1_500_000),
          method: "card".to_string(),
          gateway: "bench".to_string(),
          gateway_txn_id: format!("bench-{}", txn.fetch_add(1, Ordering::Relaxed)),
          status: PaymentRecordStatus::Success,
          payload: serde_json::Value::Null,
          paid_at: None,
        })
        .await
        .unwrap();
      for event in [OrderEvent::Accept, OrderEvent::Start, OrderEvent::Complete] {
        engine
          .transition(&vendor, id, event, TransitionRequest::default())
          .await
          .unwrap();
      }
    })
  });
}

criterion_group!(benches, bench_pricing, bench_lifecycle);
criterion_main!(benches);
