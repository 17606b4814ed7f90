// core/src/model/ledger.rs

//! Vendor ledger. Money moves by appending signed entries, never by editing
//! amounts in place; a credit is positive and a debit negative.

use crate::model::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBucket {
  /// Received, matched to an open order, not yet owed to the vendor.
  Held,
  /// Released to the vendor, not yet disbursed.
  Payable,
  /// Sent back to the customer.
  Reversed,
  /// Platform share.
  Commission,
}

impl LedgerBucket {
  pub fn as_str(self) -> &'static str {
    match self {
      LedgerBucket::Held => "held",
      LedgerBucket::Payable => "payable",
      LedgerBucket::Reversed => "reversed",
      LedgerBucket::Commission => "commission",
    }
  }
}

impl fmt::Display for LedgerBucket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for LedgerBucket {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "held" => Ok(LedgerBucket::Held),
      "payable" => Ok(LedgerBucket::Payable),
      "reversed" => Ok(LedgerBucket::Reversed),
      "commission" => Ok(LedgerBucket::Commission),
      other => Err(format!("unknown ledger bucket '{}'", other)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
  pub id: i64,
  pub vendor_id: i64,
  pub order_id: i64,
  pub payment_id: Option<i64>,
  pub bucket: LedgerBucket,
  pub amount: Money,
  /// What moved the money: `payment`, `complete`, `cancel`, `reject`, `refund`.
  pub reason: String,
  /// Unique per movement; appending an existing key is a no-op.
  pub idempotency_key: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VendorBalances {
  pub vendor_id: i64,
  pub held: Money,
  pub payable: Money,
  pub reversed: Money,
  pub commission: Money,
}

impl VendorBalances {
  pub fn from_entries(vendor_id: i64, entries: &[LedgerEntry]) -> Self {
    entries
      .iter()
      .filter(|e| e.vendor_id == vendor_id)
      .fold(VendorBalances { vendor_id, ..Default::default() }, |mut acc, e| {
        match e.bucket {
          LedgerBucket::Held => acc.held += e.amount,
          LedgerBucket::Payable => acc.payable += e.amount,
          LedgerBucket::Reversed => acc.reversed += e.amount,
          LedgerBucket::Commission => acc.commission += e.amount,
        }
        acc
      })
  }
}
