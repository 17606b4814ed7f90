// core/src/store/filter.rs

//! Typed filter/sort/paginate options for order listings.

use crate::error::{EngineError, EngineResult};
use crate::model::{Order, OrderStatus, PaymentStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
  #[default]
  CreatedAt,
  UpdatedAt,
  TotalAmount,
  Status,
  PaymentStatus,
  EventDate,
}

impl SortField {
  pub fn parse(value: &str) -> EngineResult<Self> {
    match value {
      "created_at" => Ok(SortField::CreatedAt),
      "updated_at" => Ok(SortField::UpdatedAt),
      "total_amount" => Ok(SortField::TotalAmount),
      "status" => Ok(SortField::Status),
      "payment_status" => Ok(SortField::PaymentStatus),
      "event_date" => Ok(SortField::EventDate),
      other => Err(EngineError::InvalidStatus(format!("cannot sort by '{}'", other))),
    }
  }

  /// Column name, safe to splice into SQL.
  pub fn column(self) -> &'static str {
    match self {
      SortField::CreatedAt => "created_at",
      SortField::UpdatedAt => "updated_at",
      SortField::TotalAmount => "total_amount",
      SortField::Status => "status",
      SortField::PaymentStatus => "payment_status",
      SortField::EventDate => "event_date",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
  Asc,
  #[default]
  Desc,
}

impl SortOrder {
  pub fn parse(value: &str) -> EngineResult<Self> {
    match value.to_ascii_lowercase().as_str() {
      "asc" => Ok(SortOrder::Asc),
      "desc" => Ok(SortOrder::Desc),
      other => Err(EngineError::InvalidStatus(format!("unknown sort order '{}'", other))),
    }
  }

  pub fn keyword(self) -> &'static str {
    match self {
      SortOrder::Asc => "ASC",
      SortOrder::Desc => "DESC",
    }
  }
}

/// Query-string form of a listing request, as clients send it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilterParams {
  pub status: Option<String>,
  pub payment_status: Option<String>,
  pub vendor_id: Option<i64>,
  pub customer_id: Option<i64>,
  pub search: Option<String>,
  pub start_date: Option<String>,
  pub end_date: Option<String>,
  pub sort_by: Option<String>,
  pub sort_order: Option<String>,
  pub page: Option<u32>,
  pub limit: Option<u32>,
}

impl OrderFilterParams {
  pub fn into_filter(self) -> EngineResult<OrderFilter> {
    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let status = match non_empty(self.status).as_deref() {
      None | Some("all") => None,
      Some(s) => Some(s.parse::<OrderStatus>()?),
    };
    let payment_status = match non_empty(self.payment_status).as_deref() {
      None | Some("all") => None,
      Some(s) => Some(s.parse::<PaymentStatus>()?),
    };
    let parse_date = |v: Option<String>| -> EngineResult<Option<NaiveDate>> {
      non_empty(v)
        .map(|s| {
          NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|_| EngineError::InvalidDate(format!("'{}' is not a YYYY-MM-DD date", s)))
        })
        .transpose()
    };
    let start_date = parse_date(self.start_date)?;
    let end_date = parse_date(self.end_date)?;
    if let (Some(start), Some(end)) = (start_date, end_date) {
      if start > end {
        return Err(EngineError::InvalidDate(format!("start_date {} is after end_date {}", start, end)));
      }
    }

    Ok(OrderFilter {
      status,
      payment_status,
      vendor_id: self.vendor_id,
      customer_id: self.customer_id,
      search: non_empty(self.search),
      start_date,
      end_date,
      sort_by: non_empty(self.sort_by).map(|s| SortField::parse(&s)).transpose()?.unwrap_or_default(),
      sort_order: non_empty(self.sort_order).map(|s| SortOrder::parse(&s)).transpose()?.unwrap_or_default(),
      page: self.page.filter(|p| *p >= 1).unwrap_or(DEFAULT_PAGE),
      limit: self.limit.filter(|l| *l >= 1).unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
  pub status: Option<OrderStatus>,
  pub payment_status: Option<PaymentStatus>,
  pub vendor_id: Option<i64>,
  pub customer_id: Option<i64>,
  pub search: Option<String>,
  pub start_date: Option<NaiveDate>,
  pub end_date: Option<NaiveDate>,
  pub sort_by: SortField,
  pub sort_order: SortOrder,
  pub page: u32,
  pub limit: u32,
}

impl Default for OrderFilter {
  fn default() -> Self {
    Self {
      status: None,
      payment_status: None,
      vendor_id: None,
      customer_id: None,
      search: None,
      start_date: None,
      end_date: None,
      sort_by: SortField::default(),
      sort_order: SortOrder::default(),
      page: DEFAULT_PAGE,
      limit: DEFAULT_LIMIT,
    }
  }
}

impl OrderFilter {
  pub fn for_customer(mut self, customer_id: i64) -> Self {
    self.customer_id = Some(customer_id);
    self
  }

  pub fn for_vendor(mut self, vendor_id: i64) -> Self {
    self.vendor_id = Some(vendor_id);
    self
  }

  /// Same filter, every matching row on one page. Used by exports.
  pub fn unpaginated(mut self) -> Self {
    self.page = 1;
    self.limit = u32::MAX;
    self
  }

  pub fn offset(&self) -> u64 {
    u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
  }

  /// Whether `order` passes every set criterion. Soft-deleted orders never do.
  pub fn matches(&self, order: &Order) -> bool {
    if order.deleted_at.is_some() {
      return false;
    }
    let created = order.created_at.date_naive();
    self.status.map_or(true, |s| order.status == s)
      && self.payment_status.map_or(true, |s| order.payment_status == s)
      && self.vendor_id.map_or(true, |v| order.vendor_id == v)
      && self.customer_id.map_or(true, |c| order.customer_id == c)
      && self.search.as_deref().map_or(true, |q| order.order_number.contains(q))
      && self.start_date.map_or(true, |d| created >= d)
      && self.end_date.map_or(true, |d| created <= d)
  }

  /// Ordering of two matching orders; ties are broken by id in the same direction.
  pub fn compare(&self, a: &Order, b: &Order) -> Ordering {
    let primary = match self.sort_by {
      SortField::CreatedAt => a.created_at.cmp(&b.created_at),
      SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
      SortField::TotalAmount => a.total_amount.cmp(&b.total_amount),
      SortField::Status => a.status.as_str().cmp(b.status.as_str()),
      SortField::PaymentStatus => a.payment_status.as_str().cmp(b.payment_status.as_str()),
      SortField::EventDate => a.event_date.cmp(&b.event_date),
    }
    .then_with(|| a.id.cmp(&b.id));
    match self.sort_order {
      SortOrder::Asc => primary,
      SortOrder::Desc => primary.reverse(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: u64,
  pub page: u32,
  pub limit: u32,
}

impl<T> Page<T> {
  pub fn total_pages(&self) -> u64 {
    if self.limit == 0 {
      return 0;
    }
    self.total.div_ceil(u64::from(self.limit))
  }

  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items: self.items.into_iter().map(f).collect(),
      total: self.total,
      page: self.page,
      limit: self.limit,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_and_all_status() {
    let filter = OrderFilterParams {
      status: Some("all".into()),
      page: Some(0),
      ..Default::default()
    }
    .into_filter()
    .unwrap();
    assert_eq!(filter.status, None);
    assert_eq!(filter.page, 1);
    assert_eq!(filter.limit, 10);
    assert_eq!(filter.sort_by, SortField::CreatedAt);
    assert_eq!(filter.sort_order, SortOrder::Desc);
  }

  #[test]
  fn rejects_bad_dates_and_statuses() {
    let bad_date = OrderFilterParams {
      start_date: Some("14-06-2025".into()),
      ..Default::default()
    };
    assert_eq!(bad_date.into_filter().unwrap_err().code(), "InvalidDate");

    let bad_status = OrderFilterParams {
      status: Some("shipped".into()),
      ..Default::default()
    };
    assert_eq!(bad_status.into_filter().unwrap_err().code(), "InvalidStatus");
  }
}
