// core/src/store/mod.rs

//! Persistence seams of the order aggregate.
//!
//! `OrderStore` serves the plain (non-locking) read paths and opens
//! transactions. Every mutation goes through a `StoreTx`, which also acts as
//! the catalogue view so referential checks see the transaction's snapshot.
//! Dropping a `StoreTx` without calling `commit` rolls it back.

pub mod filter;
pub mod memory;
pub mod numbering;

pub use filter::{OrderFilter, OrderFilterParams, Page, SortField, SortOrder};
pub use memory::MemoryStore;
pub use numbering::{format_order_number, parse_order_number};

use crate::catalog::CatalogView;
use crate::error::EngineResult;
use crate::gateway::{RefundIntent, RefundOutbox};
use crate::model::{
  LedgerEntry, Order, OrderAggregate, OrderItem, Payment, PaymentRecordStatus, Review, StatusHistoryEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;

/// Also the durable outbox for refund intents its transactions stage.
#[async_trait]
pub trait OrderStore: RefundOutbox + Send + Sync + 'static {
  type Tx: StoreTx;

  /// Opens a unit of work whose statements must finish within `timeout`.
  async fn begin(&self, timeout: Duration) -> EngineResult<Self::Tx>;

  /// Excludes soft-deleted orders.
  async fn find_by_id(&self, order_id: i64) -> EngineResult<OrderAggregate>;

  async fn find_by_number(&self, order_number: &str) -> EngineResult<OrderAggregate>;

  async fn list(&self, filter: &OrderFilter) -> EngineResult<Page<Order>>;

  /// Oldest first.
  async fn history(&self, order_id: i64) -> EngineResult<Vec<StatusHistoryEntry>>;

  async fn ledger_for_vendor(&self, vendor_id: i64) -> EngineResult<Vec<LedgerEntry>>;

  /// Flags an order for operator attention outside of any failed transaction.
  async fn mark_needs_review(&self, order_id: i64) -> EngineResult<()>;

  /// Resolves the vendor profile owned by a vendor user.
  async fn vendor_profile_for_user(&self, user_id: i64) -> EngineResult<Option<i64>>;
}

#[async_trait]
pub trait StoreTx: CatalogView + Send + 'static {
  /// Loads the full aggregate and holds a write lock on the order row until
  /// the transaction ends. Soft-deleted orders are `OrderNotFound`.
  async fn load_for_update(&mut self, order_id: i64) -> EngineResult<OrderAggregate>;

  /// Inserts an order and its items, returning the new order id.
  /// `DuplicateOrderNumber` when the number is already taken.
  async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> EngineResult<i64>;

  /// Writes the order row. `order.version` must equal the stored version,
  /// otherwise `OptimisticConflict`; the stored version is then incremented.
  async fn update_order(&mut self, order: &Order) -> EngineResult<()>;

  async fn replace_items(&mut self, order_id: i64, items: &[OrderItem]) -> EngineResult<()>;

  /// `PaymentAlreadyReconciled` when `(gateway, gateway_txn_id)` already exists.
  async fn append_payment(&mut self, payment: &Payment) -> EngineResult<i64>;

  async fn update_payment_status(
    &mut self,
    payment_id: i64,
    status: PaymentRecordStatus,
    paid_at: Option<DateTime<Utc>>,
  ) -> EngineResult<()>;

  /// Inserts or updates the single review of an order, returning its id.
  async fn upsert_review(&mut self, review: &Review) -> EngineResult<i64>;

  async fn append_history(&mut self, entry: &StatusHistoryEntry) -> EngineResult<i64>;

  /// Appends a ledger entry. Returns `false` (and writes nothing) when an entry
  /// with the same idempotency key already exists.
  async fn append_ledger(&mut self, entry: &LedgerEntry) -> EngineResult<bool>;

  /// Writes a refund intent to the outbox; a no-op when its idempotency key
  /// is already there.
  async fn stage_refund(&mut self, intent: &RefundIntent) -> EngineResult<()>;

  /// Next value of the per-day order number sequence, starting at 1.
  async fn next_order_sequence(&mut self, day: NaiveDate) -> EngineResult<u32>;

  async fn commit(self) -> EngineResult<()>;
}
