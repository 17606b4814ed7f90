// core/src/model/review.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
  pub id: i64,
  pub order_id: i64,
  pub customer_id: i64,
  pub vendor_id: i64,
  pub rating: i32,
  pub comment: Option<String>,
  pub images: Vec<String>,
  pub is_highlighted: bool,
  pub vendor_reply: Option<String>,
  pub replied_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
  pub rating: i32,
  pub comment: Option<String>,
  #[serde(default)]
  pub images: Vec<String>,
}
