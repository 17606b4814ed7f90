// core/src/store/memory.rs

//! In-process `OrderStore`.
//!
//! Committed state sits behind one `parking_lot` mutex. A transaction stages
//! its writes and applies them atomically on `commit`; row locks are per-order
//! `tokio` mutexes whose owned guards live as long as the transaction.

use crate::catalog::{CatalogItem, CatalogView, VendorSnapshot};
use crate::error::{EngineError, EngineResult};
use crate::gateway::{RefundIntent, RefundOutbox, RefundOutcome};
use crate::model::{
  HistoryAction, ItemKind, LedgerEntry, Money, Order, OrderAggregate, OrderItem, Payment, PaymentRecordStatus, Review,
  StatusHistoryEntry,
};
use crate::store::filter::{OrderFilter, Page};
use crate::store::{OrderStore, StoreTx};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, instrument};

#[derive(Default)]
struct MemoryState {
  next_id: i64,
  orders: BTreeMap<i64, Order>,
  items: HashMap<i64, Vec<OrderItem>>,
  payments: BTreeMap<i64, Payment>,
  reviews: HashMap<i64, Review>,
  history: Vec<StatusHistoryEntry>,
  ledger: Vec<LedgerEntry>,
  ledger_keys: HashSet<String>,
  refund_outbox: Vec<(RefundIntent, Option<RefundOutcome>)>,
  sequences: HashMap<NaiveDate, u32>,
  vendors: HashMap<i64, VendorSnapshot>,
  services: HashMap<i64, CatalogItem>,
  packages: HashMap<i64, CatalogItem>,
}

impl MemoryState {
  fn allocate_id(&mut self) -> i64 {
    self.next_id += 1;
    self.next_id
  }

  fn live_order(&self, order_id: i64) -> Option<&Order> {
    self.orders.get(&order_id).filter(|o| o.deleted_at.is_none())
  }

  fn aggregate(&self, order: &Order) -> OrderAggregate {
    let id = order.id;
    OrderAggregate {
      order: order.clone(),
      items: self.items.get(&id).cloned().unwrap_or_default(),
      payments: self.payments.values().filter(|p| p.order_id == id).cloned().collect(),
      review: self.reviews.get(&id).cloned(),
      ledger: self.ledger.iter().filter(|e| e.order_id == id).cloned().collect(),
      last_transition: self
        .history
        .iter()
        .rev()
        .find(|h| h.order_id == id && matches!(h.action, HistoryAction::Transition(_)))
        .cloned(),
    }
  }

  fn number_taken(&self, number: &str) -> bool {
    self.orders.values().any(|o| o.order_number == number)
  }

  fn payment_taken(&self, gateway: &str, txn_id: &str) -> bool {
    self
      .payments
      .values()
      .any(|p| p.gateway == gateway && p.gateway_txn_id == txn_id)
  }
}

struct Shared {
  state: Mutex<MemoryState>,
  row_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl Shared {
  fn row_lock(&self, order_id: i64) -> Arc<tokio::sync::Mutex<()>> {
    self.row_locks.lock().entry(order_id).or_default().clone()
  }
}

#[derive(Clone)]
pub struct MemoryStore {
  shared: Arc<Shared>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(Shared {
        state: Mutex::new(MemoryState::default()),
        row_locks: Mutex::new(HashMap::new()),
      }),
    }
  }

  pub fn seed_vendor(&self, id: i64, user_id: i64, is_active: bool) {
    self
      .shared
      .state
      .lock()
      .vendors
      .insert(id, VendorSnapshot { id, user_id, is_active });
  }

  pub fn seed_service(&self, id: i64, vendor_id: i64, name: &str, unit_price: Money, is_active: bool) {
    let item = CatalogItem {
      kind: ItemKind::Service,
      id,
      vendor_id,
      name: name.to_string(),
      unit_price,
      is_active,
    };
    self.shared.state.lock().services.insert(id, item);
  }

  pub fn seed_package(&self, id: i64, vendor_id: i64, name: &str, unit_price: Money, is_active: bool) {
    let item = CatalogItem {
      kind: ItemKind::Package,
      id,
      vendor_id,
      name: name.to_string(),
      unit_price,
      is_active,
    };
    self.shared.state.lock().packages.insert(id, item);
  }

  pub fn set_vendor_active(&self, id: i64, is_active: bool) {
    if let Some(vendor) = self.shared.state.lock().vendors.get_mut(&id) {
      vendor.is_active = is_active;
    }
  }

  pub fn set_service_active(&self, id: i64, is_active: bool) {
    if let Some(service) = self.shared.state.lock().services.get_mut(&id) {
      service.is_active = is_active;
    }
  }

  pub fn set_service_price(&self, id: i64, unit_price: Money) {
    if let Some(service) = self.shared.state.lock().services.get_mut(&id) {
      service.unit_price = unit_price;
    }
  }

  /// Number of order rows, soft-deleted included.
  pub fn order_row_count(&self) -> usize {
    self.shared.state.lock().orders.len()
  }

  /// Every ledger entry, in append order.
  pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
    self.shared.state.lock().ledger.clone()
  }
}

#[async_trait]
impl RefundOutbox for MemoryStore {
  async fn pending_refunds(&self) -> EngineResult<Vec<RefundIntent>> {
    let state = self.shared.state.lock();
    Ok(
      state
        .refund_outbox
        .iter()
        .filter(|(_, outcome)| outcome.is_none())
        .map(|(intent, _)| intent.clone())
        .collect(),
    )
  }

  async fn settle_refund(&self, idempotency_key: &str, outcome: RefundOutcome) -> EngineResult<()> {
    let mut state = self.shared.state.lock();
    if let Some(row) = state.refund_outbox.iter_mut().find(|(i, _)| i.idempotency_key == idempotency_key) {
      row.1.get_or_insert(outcome);
    }
    Ok(())
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  type Tx = MemoryTx;

  async fn begin(&self, timeout: Duration) -> EngineResult<MemoryTx> {
    Ok(MemoryTx {
      shared: self.shared.clone(),
      deadline: Instant::now() + timeout,
      guards: HashMap::new(),
      staged: Vec::new(),
      staged_numbers: HashSet::new(),
      staged_payments: HashSet::new(),
      staged_ledger_keys: HashSet::new(),
      staged_versions: HashMap::new(),
    })
  }

  async fn find_by_id(&self, order_id: i64) -> EngineResult<OrderAggregate> {
    let state = self.shared.state.lock();
    state
      .live_order(order_id)
      .map(|o| state.aggregate(o))
      .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))
  }

  async fn find_by_number(&self, order_number: &str) -> EngineResult<OrderAggregate> {
    let state = self.shared.state.lock();
    state
      .orders
      .values()
      .find(|o| o.order_number == order_number && o.deleted_at.is_none())
      .map(|o| state.aggregate(o))
      .ok_or_else(|| EngineError::OrderNotFound(order_number.to_string()))
  }

  async fn list(&self, filter: &OrderFilter) -> EngineResult<Page<Order>> {
    let state = self.shared.state.lock();
    let mut matching: Vec<&Order> = state.orders.values().filter(|o| filter.matches(o)).collect();
    matching.sort_by(|a, b| filter.compare(a, b));
    let total = matching.len() as u64;
    let items = matching
      .into_iter()
      .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
      .take(filter.limit as usize)
      .cloned()
      .collect();
    Ok(Page {
      items,
      total,
      page: filter.page,
      limit: filter.limit,
    })
  }

  async fn history(&self, order_id: i64) -> EngineResult<Vec<StatusHistoryEntry>> {
    let state = self.shared.state.lock();
    if state.live_order(order_id).is_none() {
      return Err(EngineError::OrderNotFound(order_id.to_string()));
    }
    Ok(state.history.iter().filter(|h| h.order_id == order_id).cloned().collect())
  }

  async fn ledger_for_vendor(&self, vendor_id: i64) -> EngineResult<Vec<LedgerEntry>> {
    let state = self.shared.state.lock();
    Ok(state.ledger.iter().filter(|e| e.vendor_id == vendor_id).cloned().collect())
  }

  async fn mark_needs_review(&self, order_id: i64) -> EngineResult<()> {
    let mut state = self.shared.state.lock();
    match state.orders.get_mut(&order_id) {
      Some(order) => {
        order.needs_review = true;
        order.version += 1;
        Ok(())
      }
      None => Err(EngineError::OrderNotFound(order_id.to_string())),
    }
  }

  async fn vendor_profile_for_user(&self, user_id: i64) -> EngineResult<Option<i64>> {
    let state = self.shared.state.lock();
    Ok(state.vendors.values().find(|v| v.user_id == user_id).map(|v| v.id))
  }
}

enum Staged {
  InsertOrder(Order, Vec<OrderItem>),
  UpdateOrder(Order),
  ReplaceItems(i64, Vec<OrderItem>),
  AppendPayment(Payment),
  UpdatePayment {
    payment_id: i64,
    status: PaymentRecordStatus,
    paid_at: Option<DateTime<Utc>>,
  },
  UpsertReview(Review),
  AppendHistory(StatusHistoryEntry),
  AppendLedger(LedgerEntry),
  StageRefund(RefundIntent),
}

pub struct MemoryTx {
  shared: Arc<Shared>,
  deadline: Instant,
  guards: HashMap<i64, OwnedMutexGuard<()>>,
  staged: Vec<Staged>,
  staged_numbers: HashSet<String>,
  staged_payments: HashSet<(String, String)>,
  staged_ledger_keys: HashSet<String>,
  staged_versions: HashMap<i64, i64>,
}

impl MemoryTx {
  fn check_deadline(&self) -> EngineResult<()> {
    if Instant::now() > self.deadline {
      return Err(EngineError::Timeout);
    }
    Ok(())
  }

  fn allocate_id(&self) -> i64 {
    self.shared.state.lock().allocate_id()
  }
}

#[async_trait]
impl CatalogView for MemoryTx {
  async fn resolve_vendor(&mut self, vendor_id: i64) -> EngineResult<VendorSnapshot> {
    self.check_deadline()?;
    let state = self.shared.state.lock();
    state
      .vendors
      .get(&vendor_id)
      .cloned()
      .ok_or(EngineError::VendorNotFound(vendor_id))
  }

  async fn resolve_service(&mut self, service_id: i64) -> EngineResult<CatalogItem> {
    self.check_deadline()?;
    let state = self.shared.state.lock();
    state
      .services
      .get(&service_id)
      .cloned()
      .ok_or(EngineError::ServiceNotFound(service_id))
  }

  async fn resolve_package(&mut self, package_id: i64) -> EngineResult<CatalogItem> {
    self.check_deadline()?;
    let state = self.shared.state.lock();
    state
      .packages
      .get(&package_id)
      .cloned()
      .ok_or(EngineError::PackageNotFound(package_id))
  }
}

#[async_trait]
impl StoreTx for MemoryTx {
  #[instrument(name = "memory::load_for_update", skip(self))]
  async fn load_for_update(&mut self, order_id: i64) -> EngineResult<OrderAggregate> {
    if self.shared.state.lock().live_order(order_id).is_none() {
      return Err(EngineError::OrderNotFound(order_id.to_string()));
    }
    if !self.guards.contains_key(&order_id) {
      let lock = self.shared.row_lock(order_id);
      let guard = tokio::time::timeout_at(self.deadline, lock.lock_owned())
        .await
        .map_err(|_| EngineError::Timeout)?;
      debug!(order_id, "Row lock acquired.");
      self.guards.insert(order_id, guard);
    }
    // Re-read under the lock: the previous holder may have changed or deleted it.
    let state = self.shared.state.lock();
    state
      .live_order(order_id)
      .map(|o| state.aggregate(o))
      .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))
  }

  async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> EngineResult<i64> {
    self.check_deadline()?;
    if self.staged_numbers.contains(&order.order_number) || self.shared.state.lock().number_taken(&order.order_number) {
      return Err(EngineError::DuplicateOrderNumber(order.order_number.clone()));
    }
    let id = self.allocate_id();
    let mut order = order.clone();
    order.id = id;
    order.version = 1;
    let items: Vec<OrderItem> = items
      .iter()
      .map(|item| {
        let mut item = item.clone();
        item.id = self.allocate_id();
        item.order_id = id;
        item
      })
      .collect();
    self.staged_numbers.insert(order.order_number.clone());
    self.staged_versions.insert(id, order.version);
    self.staged.push(Staged::InsertOrder(order, items));
    Ok(id)
  }

  async fn update_order(&mut self, order: &Order) -> EngineResult<()> {
    self.check_deadline()?;
    let current = match self.staged_versions.get(&order.id) {
      Some(version) => Some(*version),
      None => self.shared.state.lock().orders.get(&order.id).map(|o| o.version),
    };
    match current {
      None => Err(EngineError::OrderNotFound(order.id.to_string())),
      Some(version) if version != order.version => Err(EngineError::OptimisticConflict { order_id: order.id }),
      Some(version) => {
        let mut next = order.clone();
        next.version = version + 1;
        self.staged_versions.insert(order.id, next.version);
        self.staged.push(Staged::UpdateOrder(next));
        Ok(())
      }
    }
  }

  async fn replace_items(&mut self, order_id: i64, items: &[OrderItem]) -> EngineResult<()> {
    self.check_deadline()?;
    let items: Vec<OrderItem> = items
      .iter()
      .map(|item| {
        let mut item = item.clone();
        item.id = self.allocate_id();
        item.order_id = order_id;
        item
      })
      .collect();
    self.staged.push(Staged::ReplaceItems(order_id, items));
    Ok(())
  }

  async fn append_payment(&mut self, payment: &Payment) -> EngineResult<i64> {
    self.check_deadline()?;
    let key = (payment.gateway.clone(), payment.gateway_txn_id.clone());
    if self.staged_payments.contains(&key) || self.shared.state.lock().payment_taken(&key.0, &key.1) {
      return Err(EngineError::PaymentAlreadyReconciled(payment.gateway_txn_id.clone()));
    }
    let id = self.allocate_id();
    let mut payment = payment.clone();
    payment.id = id;
    self.staged_payments.insert(key);
    self.staged.push(Staged::AppendPayment(payment));
    Ok(id)
  }

  async fn update_payment_status(
    &mut self,
    payment_id: i64,
    status: PaymentRecordStatus,
    paid_at: Option<DateTime<Utc>>,
  ) -> EngineResult<()> {
    self.check_deadline()?;
    self.staged.push(Staged::UpdatePayment {
      payment_id,
      status,
      paid_at,
    });
    Ok(())
  }

  async fn upsert_review(&mut self, review: &Review) -> EngineResult<i64> {
    self.check_deadline()?;
    let mut review = review.clone();
    if review.id == 0 {
      review.id = match self.shared.state.lock().reviews.get(&review.order_id) {
        Some(existing) => existing.id,
        None => self.allocate_id(),
      };
    }
    let id = review.id;
    self.staged.push(Staged::UpsertReview(review));
    Ok(id)
  }

  async fn append_history(&mut self, entry: &StatusHistoryEntry) -> EngineResult<i64> {
    self.check_deadline()?;
    let mut entry = entry.clone();
    entry.id = self.allocate_id();
    let id = entry.id;
    self.staged.push(Staged::AppendHistory(entry));
    Ok(id)
  }

  async fn append_ledger(&mut self, entry: &LedgerEntry) -> EngineResult<bool> {
    self.check_deadline()?;
    if self.staged_ledger_keys.contains(&entry.idempotency_key)
      || self.shared.state.lock().ledger_keys.contains(&entry.idempotency_key)
    {
      debug!(key = %entry.idempotency_key, "Ledger entry already recorded.");
      return Ok(false);
    }
    let mut entry = entry.clone();
    entry.id = self.allocate_id();
    self.staged_ledger_keys.insert(entry.idempotency_key.clone());
    self.staged.push(Staged::AppendLedger(entry));
    Ok(true)
  }

  async fn stage_refund(&mut self, intent: &RefundIntent) -> EngineResult<()> {
    self.check_deadline()?;
    self.staged.push(Staged::StageRefund(intent.clone()));
    Ok(())
  }

  async fn next_order_sequence(&mut self, day: NaiveDate) -> EngineResult<u32> {
    self.check_deadline()?;
    let mut state = self.shared.state.lock();
    let next = state.sequences.entry(day).or_insert(0);
    *next += 1;
    Ok(*next)
  }

  #[instrument(name = "memory::commit", skip(self))]
  async fn commit(mut self) -> EngineResult<()> {
    self.check_deadline()?;
    let mut state = self.shared.state.lock();

    // Validate everything before applying anything.
    for write in &self.staged {
      match write {
        Staged::InsertOrder(order, _) if state.number_taken(&order.order_number) => {
          return Err(EngineError::DuplicateOrderNumber(order.order_number.clone()));
        }
        Staged::AppendPayment(p) if state.payment_taken(&p.gateway, &p.gateway_txn_id) => {
          return Err(EngineError::PaymentAlreadyReconciled(p.gateway_txn_id.clone()));
        }
        _ => {}
      }
    }
    let mut expected_versions: HashMap<i64, i64> = HashMap::new();
    for write in &self.staged {
      if let Staged::UpdateOrder(order) = write {
        let base = expected_versions
          .get(&order.id)
          .copied()
          .or_else(|| state.orders.get(&order.id).map(|o| o.version));
        if base != Some(order.version - 1) {
          return Err(EngineError::OptimisticConflict { order_id: order.id });
        }
        expected_versions.insert(order.id, order.version);
      } else if let Staged::InsertOrder(order, _) = write {
        expected_versions.insert(order.id, order.version);
      }
    }

    for write in std::mem::take(&mut self.staged) {
      match write {
        Staged::InsertOrder(order, items) => {
          state.items.insert(order.id, items);
          state.orders.insert(order.id, order);
        }
        Staged::UpdateOrder(order) => {
          state.orders.insert(order.id, order);
        }
        Staged::ReplaceItems(order_id, items) => {
          state.items.insert(order_id, items);
        }
        Staged::AppendPayment(payment) => {
          state.payments.insert(payment.id, payment);
        }
        Staged::UpdatePayment {
          payment_id,
          status,
          paid_at,
        } => {
          if let Some(payment) = state.payments.get_mut(&payment_id) {
            payment.status = status;
            if paid_at.is_some() {
              payment.paid_at = paid_at;
            }
          }
        }
        Staged::UpsertReview(review) => {
          state.reviews.insert(review.order_id, review);
        }
        Staged::AppendHistory(entry) => state.history.push(entry),
        Staged::AppendLedger(entry) => {
          if state.ledger_keys.insert(entry.idempotency_key.clone()) {
            state.ledger.push(entry);
          }
        }
        Staged::StageRefund(intent) => {
          if !state.refund_outbox.iter().any(|(i, _)| i.idempotency_key == intent.idempotency_key) {
            state.refund_outbox.push((intent, None));
          }
        }
      }
    }
    drop(state);
    self.guards.clear();
    Ok(())
  }
}
