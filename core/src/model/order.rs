// core/src/model/order.rs

use crate::error::EngineError;
use crate::model::history::StatusHistoryEntry;
use crate::model::ledger::{LedgerBucket, LedgerEntry};
use crate::model::money::Money;
use crate::model::payment::{Payment, PaymentRecordStatus};
use crate::model::review::Review;
use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Accepted,
  InProgress,
  Completed,
  Rejected,
  Cancelled,
  Refunded,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 7] = [
    OrderStatus::Pending,
    OrderStatus::Accepted,
    OrderStatus::InProgress,
    OrderStatus::Completed,
    OrderStatus::Rejected,
    OrderStatus::Cancelled,
    OrderStatus::Refunded,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Accepted => "accepted",
      OrderStatus::InProgress => "in_progress",
      OrderStatus::Completed => "completed",
      OrderStatus::Rejected => "rejected",
      OrderStatus::Cancelled => "cancelled",
      OrderStatus::Refunded => "refunded",
    }
  }

  /// No outgoing event except admin Refund from `Completed`.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      OrderStatus::Completed | OrderStatus::Rejected | OrderStatus::Cancelled | OrderStatus::Refunded
    )
  }

  /// Funds received while in these states stay in escrow.
  pub fn is_in_flight(self) -> bool {
    matches!(self, OrderStatus::Pending | OrderStatus::Accepted | OrderStatus::InProgress)
  }

  /// Terminal states whose funds go back to the customer.
  pub fn is_reversed(self) -> bool {
    matches!(self, OrderStatus::Rejected | OrderStatus::Cancelled | OrderStatus::Refunded)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    OrderStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| EngineError::InvalidStatus(s.to_string()))
  }
}

/// Lifecycle events after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
  Accept,
  Reject,
  Start,
  Complete,
  Cancel,
  Refund,
}

impl OrderEvent {
  pub const ALL: [OrderEvent; 6] = [
    OrderEvent::Accept,
    OrderEvent::Reject,
    OrderEvent::Start,
    OrderEvent::Complete,
    OrderEvent::Cancel,
    OrderEvent::Refund,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      OrderEvent::Accept => "accept",
      OrderEvent::Reject => "reject",
      OrderEvent::Start => "start",
      OrderEvent::Complete => "complete",
      OrderEvent::Cancel => "cancel",
      OrderEvent::Refund => "refund",
    }
  }

  /// The status this event always leads to.
  pub fn target(self) -> OrderStatus {
    match self {
      OrderEvent::Accept => OrderStatus::Accepted,
      OrderEvent::Reject => OrderStatus::Rejected,
      OrderEvent::Start => OrderStatus::InProgress,
      OrderEvent::Complete => OrderStatus::Completed,
      OrderEvent::Cancel => OrderStatus::Cancelled,
      OrderEvent::Refund => OrderStatus::Refunded,
    }
  }

  /// Resolves a `{status}` request body into the event that produces it.
  /// `pending` is never a target.
  pub fn for_target(status: OrderStatus) -> Result<Self, EngineError> {
    OrderEvent::ALL
      .into_iter()
      .find(|event| event.target() == status)
      .ok_or_else(|| EngineError::InvalidStatus(format!("'{}' is not a reachable target status", status)))
  }
}

impl fmt::Display for OrderEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Order-level payment state, derived from the payment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Pending,
  Partial,
  Paid,
  Failed,
  Refunded,
}

impl PaymentStatus {
  pub const ALL: [PaymentStatus; 5] = [
    PaymentStatus::Pending,
    PaymentStatus::Partial,
    PaymentStatus::Paid,
    PaymentStatus::Failed,
    PaymentStatus::Refunded,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      PaymentStatus::Pending => "pending",
      PaymentStatus::Partial => "partial",
      PaymentStatus::Paid => "paid",
      PaymentStatus::Failed => "failed",
      PaymentStatus::Refunded => "refunded",
    }
  }
}

impl fmt::Display for PaymentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PaymentStatus {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    PaymentStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| EngineError::InvalidStatus(format!("unknown payment status '{}'", s)))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
  Service,
  Package,
}

impl ItemKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ItemKind::Service => "service",
      ItemKind::Package => "package",
    }
  }
}

impl fmt::Display for ItemKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ItemKind::Service => f.write_str("Service"),
      ItemKind::Package => f.write_str("Package"),
    }
  }
}

impl FromStr for ItemKind {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "service" => Ok(ItemKind::Service),
      "package" => Ok(ItemKind::Package),
      other => Err(EngineError::InvalidStatus(format!("unknown item type '{}'", other))),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
  pub id: i64,
  pub order_number: String,
  pub customer_id: i64,
  /// Vendor profile id.
  pub vendor_id: i64,
  pub status: OrderStatus,
  pub total_amount: Money,
  pub commission: Money,
  pub vendor_amount: Money,
  /// Rate captured at pricing time; `commission` is always derived from it.
  pub commission_rate: Decimal,
  pub event_date: NaiveDate,
  pub event_location: String,
  pub notes: Option<String>,
  pub payment_status: PaymentStatus,
  pub payment_method: Option<String>,
  pub payment_reference: Option<String>,
  pub is_escrow: bool,
  pub escrow_released: bool,
  pub escrow_released_at: Option<DateTime<Utc>>,
  pub needs_review: bool,
  /// Bumped on every committed write; clients echo it back to detect lost updates.
  pub version: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
  /// Day on which escrowed funds become due to the vendor.
  pub fn escrow_release_due(&self, escrow_duration_days: u32) -> Option<NaiveDate> {
    self.event_date.checked_add_days(Days::new(u64::from(escrow_duration_days)))
  }
}

/// A priced line, denormalised at creation so catalogue edits never touch history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
  pub id: i64,
  pub order_id: i64,
  pub item_type: ItemKind,
  pub service_id: Option<i64>,
  pub package_id: Option<i64>,
  pub item_name: String,
  pub price: Money,
  pub quantity: i32,
  pub total_price: Money,
}

impl OrderItem {
  pub fn item_id(&self) -> i64 {
    match self.item_type {
      ItemKind::Service => self.service_id.unwrap_or_default(),
      ItemKind::Package => self.package_id.unwrap_or_default(),
    }
  }
}

/// The order row plus everything mutated under the same transaction boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderAggregate {
  pub order: Order,
  pub items: Vec<OrderItem>,
  pub payments: Vec<Payment>,
  pub review: Option<Review>,
  pub ledger: Vec<LedgerEntry>,
  pub last_transition: Option<StatusHistoryEntry>,
}

impl OrderAggregate {
  /// Sum of payments currently in `success`.
  pub fn captured(&self) -> Money {
    self
      .payments
      .iter()
      .filter(|p| p.status == PaymentRecordStatus::Success)
      .map(|p| p.amount)
      .sum()
  }

  /// Net balance this order holds in `bucket`.
  pub fn bucket_balance(&self, bucket: LedgerBucket) -> Money {
    self.ledger.iter().filter(|e| e.bucket == bucket).map(|e| e.amount).sum()
  }

  pub fn snapshot(&self, escrow_duration_days: u32) -> OrderSnapshot {
    OrderSnapshot {
      escrow_release_due: self.order.escrow_release_due(escrow_duration_days),
      order: self.order.clone(),
      items: self.items.clone(),
      payments: self.payments.clone(),
      review: self.review.clone(),
    }
  }
}

/// What the engine hands back after a read or a committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSnapshot {
  #[serde(flatten)]
  pub order: Order,
  pub items: Vec<OrderItem>,
  pub payments: Vec<Payment>,
  pub review: Option<Review>,
  pub escrow_release_due: Option<NaiveDate>,
}
