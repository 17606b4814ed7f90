// core/src/model/history.rs

//! Audit trail rows appended to `order_status_history`.

use crate::model::actor::Role;
use crate::model::order::{OrderEvent, OrderStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a history row records; serialized as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum HistoryAction {
  Create,
  Edit,
  Delete,
  Transition(OrderEvent),
}

impl HistoryAction {
  pub fn as_str(self) -> &'static str {
    match self {
      HistoryAction::Create => "create",
      HistoryAction::Edit => "edit",
      HistoryAction::Delete => "delete",
      HistoryAction::Transition(event) => event.as_str(),
    }
  }
}

impl fmt::Display for HistoryAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for HistoryAction {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "create" => Ok(HistoryAction::Create),
      "edit" => Ok(HistoryAction::Edit),
      "delete" => Ok(HistoryAction::Delete),
      other => OrderEvent::ALL
        .into_iter()
        .find(|event| event.as_str() == other)
        .map(HistoryAction::Transition)
        .ok_or_else(|| format!("unknown history action '{}'", other)),
    }
  }
}

impl From<HistoryAction> for String {
  fn from(action: HistoryAction) -> Self {
    action.as_str().to_string()
  }
}

impl TryFrom<String> for HistoryAction {
  type Error = String;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
  pub id: i64,
  pub order_id: i64,
  pub action: HistoryAction,
  pub from_status: Option<OrderStatus>,
  pub to_status: OrderStatus,
  pub actor_id: i64,
  pub actor_role: Role,
  pub notes: Option<String>,
  pub is_override: bool,
  pub idempotency_key: Option<String>,
  pub created_at: DateTime<Utc>,
}
