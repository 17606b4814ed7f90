// server/src/db/rows.rs

//! Row shapes as Postgres returns them, and their conversion into engine types.
//! Statuses are stored as text; monetary columns are NUMERIC(18,2).

use chrono::{DateTime, NaiveDate, Utc};
use order_engine::catalog::{CatalogItem, VendorSnapshot};
use order_engine::model::HistoryAction;
use order_engine::{
  EngineError, EngineResult, ItemKind, LedgerBucket, LedgerEntry, Money, Order, OrderItem, OrderStatus,
  Payment, PaymentRecordStatus, PaymentStatus, RefundIntent, Review, Role, StatusHistoryEntry,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, customer_id, vendor_id, status, total_amount, commission, \
  vendor_amount, commission_rate, event_date, event_location, notes, payment_status, payment_method, \
  payment_reference, is_escrow, escrow_released, escrow_released_at, needs_review, version, created_at, updated_at, \
  deleted_at";

/// NUMERIC column to whole currency units.
pub(crate) fn money(column: &str, value: Decimal) -> EngineResult<Money> {
  Money::from_decimal(value).ok_or_else(|| EngineError::Internal(format!("{} value {} does not fit", column, value)))
}

fn parse<T>(column: &str, raw: &str) -> EngineResult<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .parse()
    .map_err(|e| EngineError::Internal(format!("corrupt {} '{}': {}", column, raw, e)))
}

#[derive(Debug, FromRow)]
pub struct OrderRow {
  pub id: i64,
  pub order_number: String,
  pub customer_id: i64,
  pub vendor_id: i64,
  pub status: String,
  pub total_amount: Decimal,
  pub commission: Decimal,
  pub vendor_amount: Decimal,
  pub commission_rate: Decimal,
  pub event_date: NaiveDate,
  pub event_location: String,
  pub notes: Option<String>,
  pub payment_status: String,
  pub payment_method: Option<String>,
  pub payment_reference: Option<String>,
  pub is_escrow: bool,
  pub escrow_released: bool,
  pub escrow_released_at: Option<DateTime<Utc>>,
  pub needs_review: bool,
  pub version: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
  type Error = EngineError;

  fn try_from(row: OrderRow) -> EngineResult<Self> {
    Ok(Order {
      id: row.id,
      order_number: row.order_number,
      customer_id: row.customer_id,
      vendor_id: row.vendor_id,
      status: parse::<OrderStatus>("orders.status", &row.status)?,
      total_amount: money("orders.total_amount", row.total_amount)?,
      commission: money("orders.commission", row.commission)?,
      vendor_amount: money("orders.vendor_amount", row.vendor_amount)?,
      commission_rate: row.commission_rate,
      event_date: row.event_date,
      event_location: row.event_location,
      notes: row.notes,
      payment_status: parse::<PaymentStatus>("orders.payment_status", &row.payment_status)?,
      payment_method: row.payment_method,
      payment_reference: row.payment_reference,
      is_escrow: row.is_escrow,
      escrow_released: row.escrow_released,
      escrow_released_at: row.escrow_released_at,
      needs_review: row.needs_review,
      version: row.version,
      created_at: row.created_at,
      updated_at: row.updated_at,
      deleted_at: row.deleted_at,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct OrderItemRow {
  pub id: i64,
  pub order_id: i64,
  pub item_type: String,
  pub service_id: Option<i64>,
  pub package_id: Option<i64>,
  pub item_name: String,
  pub price: Decimal,
  pub quantity: i32,
  pub total_price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
  type Error = EngineError;

  fn try_from(row: OrderItemRow) -> EngineResult<Self> {
    Ok(OrderItem {
      id: row.id,
      order_id: row.order_id,
      item_type: parse::<ItemKind>("order_items.item_type", &row.item_type)?,
      service_id: row.service_id,
      package_id: row.package_id,
      item_name: row.item_name,
      price: money("order_items.price", row.price)?,
      quantity: row.quantity,
      total_price: money("order_items.total_price", row.total_price)?,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct PaymentRow {
  pub id: i64,
  pub order_id: i64,
  pub amount: Decimal,
  pub method: String,
  pub gateway: String,
  pub gateway_txn_id: String,
  pub status: String,
  pub payload: Json<serde_json::Value>,
  pub paid_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
  type Error = EngineError;

  fn try_from(row: PaymentRow) -> EngineResult<Self> {
    Ok(Payment {
      id: row.id,
      order_id: row.order_id,
      amount: money("payments.amount", row.amount)?,
      method: row.method,
      gateway: row.gateway,
      gateway_txn_id: row.gateway_txn_id,
      status: parse::<PaymentRecordStatus>("payments.status", &row.status)?,
      payload: row.payload.0,
      paid_at: row.paid_at,
      created_at: row.created_at,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct ReviewRow {
  pub id: i64,
  pub order_id: i64,
  pub customer_id: i64,
  pub vendor_id: i64,
  pub rating: i32,
  pub comment: Option<String>,
  pub images: Json<Vec<String>>,
  pub is_highlighted: bool,
  pub vendor_reply: Option<String>,
  pub replied_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
  fn from(row: ReviewRow) -> Self {
    Review {
      id: row.id,
      order_id: row.order_id,
      customer_id: row.customer_id,
      vendor_id: row.vendor_id,
      rating: row.rating,
      comment: row.comment,
      images: row.images.0,
      is_highlighted: row.is_highlighted,
      vendor_reply: row.vendor_reply,
      replied_at: row.replied_at,
      created_at: row.created_at,
      updated_at: row.updated_at,
    }
  }
}

#[derive(Debug, FromRow)]
pub struct HistoryRow {
  pub id: i64,
  pub order_id: i64,
  pub action: String,
  pub from_status: Option<String>,
  pub to_status: String,
  pub actor_id: i64,
  pub actor_role: String,
  pub notes: Option<String>,
  pub is_override: bool,
  pub idempotency_key: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for StatusHistoryEntry {
  type Error = EngineError;

  fn try_from(row: HistoryRow) -> EngineResult<Self> {
    Ok(StatusHistoryEntry {
      id: row.id,
      order_id: row.order_id,
      action: parse::<HistoryAction>("order_status_history.action", &row.action)?,
      from_status: row
        .from_status
        .as_deref()
        .map(|s| parse::<OrderStatus>("order_status_history.from_status", s))
        .transpose()?,
      to_status: parse::<OrderStatus>("order_status_history.to_status", &row.to_status)?,
      actor_id: row.actor_id,
      actor_role: parse::<Role>("order_status_history.actor_role", &row.actor_role)?,
      notes: row.notes,
      is_override: row.is_override,
      idempotency_key: row.idempotency_key,
      created_at: row.created_at,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct LedgerRow {
  pub id: i64,
  pub vendor_id: i64,
  pub order_id: i64,
  pub payment_id: Option<i64>,
  pub bucket: String,
  pub amount: Decimal,
  pub reason: String,
  pub idempotency_key: String,
  pub created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
  type Error = EngineError;

  fn try_from(row: LedgerRow) -> EngineResult<Self> {
    Ok(LedgerEntry {
      id: row.id,
      vendor_id: row.vendor_id,
      order_id: row.order_id,
      payment_id: row.payment_id,
      bucket: parse::<LedgerBucket>("vendor_ledger_entries.bucket", &row.bucket)?,
      amount: money("vendor_ledger_entries.amount", row.amount)?,
      reason: row.reason,
      idempotency_key: row.idempotency_key,
      created_at: row.created_at,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct RefundRow {
  pub order_id: i64,
  pub order_number: String,
  pub amount: Decimal,
  pub reason: String,
  pub idempotency_key: String,
}

impl TryFrom<RefundRow> for RefundIntent {
  type Error = EngineError;

  fn try_from(row: RefundRow) -> EngineResult<Self> {
    Ok(RefundIntent {
      order_id: row.order_id,
      order_number: row.order_number,
      amount: money("refund_outbox.amount", row.amount)?,
      reason: row.reason,
      idempotency_key: row.idempotency_key,
    })
  }
}

#[derive(Debug, FromRow)]
pub struct VendorRow {
  pub id: i64,
  pub user_id: i64,
  pub is_active: bool,
}

impl From<VendorRow> for VendorSnapshot {
  fn from(row: VendorRow) -> Self {
    VendorSnapshot {
      id: row.id,
      user_id: row.user_id,
      is_active: row.is_active,
    }
  }
}

/// A `services` or `packages` row.
#[derive(Debug, FromRow)]
pub struct CatalogRow {
  pub id: i64,
  pub vendor_id: i64,
  pub name: String,
  pub price: Decimal,
  pub is_active: bool,
}

impl CatalogRow {
  pub fn into_item(self, kind: ItemKind) -> EngineResult<CatalogItem> {
    Ok(CatalogItem {
      kind,
      id: self.id,
      vendor_id: self.vendor_id,
      name: self.name,
      unit_price: money("catalog price", self.price)?,
      is_active: self.is_active,
    })
  }
}

/// Collects fallible row conversions, stopping at the first corrupt row.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> EngineResult<Vec<T>>
where
  T: TryFrom<R, Error = EngineError>,
{
  rows.into_iter().map(T::try_from).collect()
}
