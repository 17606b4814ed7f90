// core/src/error.rs

//! The engine's error taxonomy. Every variant carries a stable machine-readable
//! identifier (`EngineError::code`) and belongs to one `ErrorKind`, which the
//! HTTP boundary maps onto status codes.

use crate::model::{ItemKind, OrderEvent, OrderStatus};
use crate::pipeline::PipelineFault;
use thiserror::Error;

/// Coarse category of an `EngineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Validation,
  Lookup,
  Authorisation,
  Transition,
  Conflict,
  Infrastructure,
}

#[derive(Debug, Error)]
pub enum EngineError {
  // --- Validation ---
  #[error("Order must contain at least one item")]
  EmptyBasket,

  #[error("Quantity on line {line} must be at least 1")]
  InvalidQuantity { line: usize },

  #[error("All items must belong to vendor {expected}, line {line} belongs to vendor {found}")]
  MixedVendor { expected: i64, found: i64, line: usize },

  #[error("{kind} {id} is not active")]
  InactiveItem { kind: ItemKind, id: i64 },

  #[error("Vendor {vendor_id} is not active")]
  InactiveVendor { vendor_id: i64 },

  #[error("Custom price on line {line} must not be negative")]
  NegativeOverride { line: usize },

  #[error("Invalid status: {0}")]
  InvalidStatus(String),

  #[error("Invalid date: {0}")]
  InvalidDate(String),

  #[error("Rating must be between 1 and 5, got {0}")]
  InvalidRating(i32),

  #[error("Invalid amount: {0}")]
  InvalidAmount(String),

  #[error("Order total {total} is outside the allowed range: {detail}")]
  AmountOutOfRange { total: i64, detail: String },

  // --- Lookup ---
  #[error("Order {0} not found")]
  OrderNotFound(String),

  #[error("Vendor {0} not found")]
  VendorNotFound(i64),

  #[error("Service {0} not found")]
  ServiceNotFound(i64),

  #[error("Package {0} not found")]
  PackageNotFound(i64),

  #[error("Review for order {0} not found")]
  ReviewNotFound(i64),

  // --- Authorisation ---
  #[error("Authentication required")]
  Unauthenticated,

  #[error("Role {role} may not {action}")]
  WrongRole { role: String, action: String },

  #[error("Order {order_id} does not belong to the acting user")]
  NotOwner { order_id: i64 },

  // --- Transition ---
  #[error("Cannot {event} an order that is {from}")]
  InvalidTransition { from: OrderStatus, event: OrderEvent },

  #[error("Order is {status} and can no longer be changed")]
  TerminalState { status: OrderStatus },

  #[error("Order {order_id} has already been reviewed")]
  DuplicateReview { order_id: i64 },

  #[error("Cannot {action} an order that is {status}")]
  ActionNotAllowed { action: &'static str, status: OrderStatus },

  // --- Conflict ---
  #[error("Order {order_id} was modified concurrently")]
  OptimisticConflict { order_id: i64 },

  #[error("Order number {0} already exists")]
  DuplicateOrderNumber(String),

  #[error("Payment {0} has already been reconciled")]
  PaymentAlreadyReconciled(String),

  // --- Infrastructure ---
  #[error("Operation exceeded its deadline")]
  Timeout,

  #[error("Storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("Ledger imbalance on order {order_id}: {detail}")]
  LedgerImbalance { order_id: i64, detail: String },

  #[error("Platform is in maintenance mode")]
  MaintenanceMode,

  #[error("Internal engine error: {0}")]
  Internal(String),
}

impl EngineError {
  /// Stable identifier surfaced to clients in the `errors` field of the envelope.
  pub fn code(&self) -> &'static str {
    match self {
      EngineError::EmptyBasket => "EmptyBasket",
      EngineError::InvalidQuantity { .. } => "InvalidQuantity",
      EngineError::MixedVendor { .. } => "MixedVendor",
      EngineError::InactiveItem { .. } => "InactiveItem",
      EngineError::InactiveVendor { .. } => "InactiveVendor",
      EngineError::NegativeOverride { .. } => "NegativeOverride",
      EngineError::InvalidStatus(_) => "InvalidStatus",
      EngineError::InvalidDate(_) => "InvalidDate",
      EngineError::InvalidRating(_) => "InvalidRating",
      EngineError::InvalidAmount(_) => "InvalidAmount",
      EngineError::AmountOutOfRange { .. } => "AmountOutOfRange",
      EngineError::OrderNotFound(_) => "OrderNotFound",
      EngineError::VendorNotFound(_) => "VendorNotFound",
      EngineError::ServiceNotFound(_) => "ServiceNotFound",
      EngineError::PackageNotFound(_) => "PackageNotFound",
      EngineError::ReviewNotFound(_) => "ReviewNotFound",
      EngineError::Unauthenticated => "Unauthenticated",
      EngineError::WrongRole { .. } => "WrongRole",
      EngineError::NotOwner { .. } => "NotOwner",
      EngineError::InvalidTransition { .. } => "InvalidTransition",
      EngineError::TerminalState { .. } => "TerminalState",
      EngineError::DuplicateReview { .. } => "DuplicateReview",
      EngineError::ActionNotAllowed { .. } => "ActionNotAllowed",
      EngineError::OptimisticConflict { .. } => "OptimisticConflict",
      EngineError::DuplicateOrderNumber(_) => "DuplicateOrderNumber",
      EngineError::PaymentAlreadyReconciled(_) => "PaymentAlreadyReconciled",
      EngineError::Timeout => "Timeout",
      EngineError::StorageUnavailable(_) => "StorageUnavailable",
      EngineError::LedgerImbalance { .. } => "LedgerImbalance",
      EngineError::MaintenanceMode => "MaintenanceMode",
      EngineError::Internal(_) => "Internal",
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      EngineError::EmptyBasket
      | EngineError::InvalidQuantity { .. }
      | EngineError::MixedVendor { .. }
      | EngineError::InactiveItem { .. }
      | EngineError::InactiveVendor { .. }
      | EngineError::NegativeOverride { .. }
      | EngineError::InvalidStatus(_)
      | EngineError::InvalidDate(_)
      | EngineError::InvalidRating(_)
      | EngineError::InvalidAmount(_)
      | EngineError::AmountOutOfRange { .. } => ErrorKind::Validation,
      EngineError::OrderNotFound(_)
      | EngineError::VendorNotFound(_)
      | EngineError::ServiceNotFound(_)
      | EngineError::PackageNotFound(_)
      | EngineError::ReviewNotFound(_) => ErrorKind::Lookup,
      EngineError::Unauthenticated | EngineError::WrongRole { .. } | EngineError::NotOwner { .. } => {
        ErrorKind::Authorisation
      }
      EngineError::InvalidTransition { .. }
      | EngineError::TerminalState { .. }
      | EngineError::DuplicateReview { .. }
      | EngineError::ActionNotAllowed { .. } => ErrorKind::Transition,
      EngineError::OptimisticConflict { .. }
      | EngineError::DuplicateOrderNumber(_)
      | EngineError::PaymentAlreadyReconciled(_) => ErrorKind::Conflict,
      EngineError::Timeout
      | EngineError::StorageUnavailable(_)
      | EngineError::LedgerImbalance { .. }
      | EngineError::MaintenanceMode
      | EngineError::Internal(_) => ErrorKind::Infrastructure,
    }
  }

  /// Conflicts that a single automatic retry can resolve.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      EngineError::OptimisticConflict { .. } | EngineError::DuplicateOrderNumber(_)
    )
  }

  pub(crate) fn wrong_role(role: impl std::fmt::Display, action: impl std::fmt::Display) -> Self {
    EngineError::WrongRole {
      role: role.to_string(),
      action: action.to_string(),
    }
  }
}

// Framework faults (a stage without handlers) are programming errors; they
// surface as internal errors rather than leaking pipeline details.
impl From<PipelineFault> for EngineError {
  fn from(fault: PipelineFault) -> Self {
    EngineError::Internal(fault.to_string())
  }
}

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;
