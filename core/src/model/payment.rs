// core/src/model/payment.rs

use crate::model::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a single payment record. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRecordStatus {
  Pending,
  Success,
  Failed,
  Cancelled,
  Refunded,
}

impl PaymentRecordStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentRecordStatus::Pending => "pending",
      PaymentRecordStatus::Success => "success",
      PaymentRecordStatus::Failed => "failed",
      PaymentRecordStatus::Cancelled => "cancelled",
      PaymentRecordStatus::Refunded => "refunded",
    }
  }

  pub fn can_advance_to(self, next: PaymentRecordStatus) -> bool {
    use PaymentRecordStatus::*;
    matches!(
      (self, next),
      (Pending, Success) | (Pending, Failed) | (Pending, Cancelled) | (Success, Refunded)
    )
  }
}

impl fmt::Display for PaymentRecordStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PaymentRecordStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(PaymentRecordStatus::Pending),
      "success" => Ok(PaymentRecordStatus::Success),
      "failed" => Ok(PaymentRecordStatus::Failed),
      "cancelled" => Ok(PaymentRecordStatus::Cancelled),
      "refunded" => Ok(PaymentRecordStatus::Refunded),
      other => Err(format!("unknown payment record status '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
  pub id: i64,
  pub order_id: i64,
  pub amount: Money,
  pub method: String,
  pub gateway: String,
  pub gateway_txn_id: String,
  pub status: PaymentRecordStatus,
  /// Raw gateway payload, kept verbatim for reconciliation.
  #[serde(skip_serializing)]
  pub payload: serde_json::Value,
  pub paid_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
}

/// Outcome notification from a payment gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
  pub order_id: i64,
  pub amount: Money,
  pub method: String,
  pub gateway: String,
  pub gateway_txn_id: String,
  pub status: PaymentRecordStatus,
  #[serde(default)]
  pub payload: serde_json::Value,
  pub paid_at: Option<DateTime<Utc>>,
}
