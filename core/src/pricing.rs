// core/src/pricing.rs

//! The pricing calculator: a pure function from a basket and its catalogue
//! resolutions to priced lines and the order's monetary fields.

use crate::catalog::CatalogItem;
use crate::error::{EngineError, EngineResult};
use crate::model::{Actor, ItemKind, Money, OrderItem};
use rust_decimal::Decimal;
use serde::Deserialize;

/// One requested line of a basket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LineRequest {
  pub item_type: ItemKind,
  pub item_id: i64,
  pub quantity: i32,
  #[serde(default)]
  pub custom_price: Option<Decimal>,
}

impl LineRequest {
  pub fn service(item_id: i64, quantity: i32) -> Self {
    Self {
      item_type: ItemKind::Service,
      item_id,
      quantity,
      custom_price: None,
    }
  }

  pub fn package(item_id: i64, quantity: i32) -> Self {
    Self {
      item_type: ItemKind::Package,
      item_id,
      quantity,
      custom_price: None,
    }
  }

  pub fn with_custom_price(mut self, price: Decimal) -> Self {
    self.custom_price = Some(price);
    self
  }
}

/// Whether `custom_price` on a line is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceAuthority {
  CatalogOnly,
  MayOverride,
}

impl PriceAuthority {
  /// Vendors and admins may quote their own prices; customers never can.
  pub fn for_actor(actor: &Actor) -> Self {
    if actor.is_admin() || actor.vendor_profile_id.is_some() {
      PriceAuthority::MayOverride
    } else {
      PriceAuthority::CatalogOnly
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
  pub kind: ItemKind,
  pub item_id: i64,
  pub name: String,
  pub unit_price: Money,
  pub quantity: i32,
  pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedBasket {
  pub vendor_id: i64,
  pub lines: Vec<PricedLine>,
  pub total_amount: Money,
  pub commission: Money,
  pub vendor_amount: Money,
  pub commission_rate: Decimal,
}

impl PricedBasket {
  /// Materialises the priced lines as order items of `order_id`.
  pub fn order_items(&self, order_id: i64) -> Vec<OrderItem> {
    self
      .lines
      .iter()
      .map(|line| OrderItem {
        id: 0,
        order_id,
        item_type: line.kind,
        service_id: (line.kind == ItemKind::Service).then_some(line.item_id),
        package_id: (line.kind == ItemKind::Package).then_some(line.item_id),
        item_name: line.name.clone(),
        price: line.unit_price,
        quantity: line.quantity,
        total_price: line.line_total,
      })
      .collect()
  }
}

/// Shape checks that need no catalogue access. Runs before any I/O.
pub fn validate_lines(lines: &[LineRequest]) -> EngineResult<()> {
  if lines.is_empty() {
    return Err(EngineError::EmptyBasket);
  }
  for (idx, line) in lines.iter().enumerate() {
    if line.quantity < 1 {
      return Err(EngineError::InvalidQuantity { line: idx + 1 });
    }
    if line.custom_price.is_some_and(|p| p.is_sign_negative() && !p.is_zero()) {
      return Err(EngineError::NegativeOverride { line: idx + 1 });
    }
  }
  Ok(())
}

/// `(commission, vendor_amount)` for `total` at `rate`, commission rounded half-to-even.
pub fn split_commission(total: Money, rate: Decimal) -> EngineResult<(Money, Money)> {
  let commission = total
    .apply_rate(rate)
    .ok_or_else(|| EngineError::InvalidAmount(format!("commission on {} overflows", total)))?;
  Ok((commission, total - commission))
}

/// Prices a basket.
///
/// `resolved[i]` must be the catalogue resolution of `lines[i]`. When
/// `expected_vendor` is set (the order's vendor profile), every line must
/// belong to it; otherwise the first line decides.
pub fn price_basket(
  lines: &[LineRequest],
  resolved: &[CatalogItem],
  authority: PriceAuthority,
  commission_rate: Decimal,
  expected_vendor: Option<i64>,
) -> EngineResult<PricedBasket> {
  validate_lines(lines)?;
  if lines.len() != resolved.len() {
    return Err(EngineError::Internal(format!(
      "{} lines but {} catalogue resolutions",
      lines.len(),
      resolved.len()
    )));
  }

  let vendor_id = expected_vendor.unwrap_or(resolved[0].vendor_id);
  let mut priced = Vec::with_capacity(lines.len());
  let mut total_amount = Money::ZERO;

  for (idx, (line, item)) in lines.iter().zip(resolved).enumerate() {
    if item.vendor_id != vendor_id {
      return Err(EngineError::MixedVendor {
        expected: vendor_id,
        found: item.vendor_id,
        line: idx + 1,
      });
    }
    if !item.is_active {
      return Err(EngineError::InactiveItem {
        kind: item.kind,
        id: item.id,
      });
    }

    let unit_price = match (line.custom_price, authority) {
      (Some(custom), PriceAuthority::MayOverride) => Money::from_decimal(custom)
        .ok_or_else(|| EngineError::InvalidAmount(format!("custom price {} on line {} is out of range", custom, idx + 1)))?,
      _ => item.unit_price,
    };
    let line_total = unit_price
      .checked_mul(i64::from(line.quantity))
      .ok_or_else(|| EngineError::InvalidAmount(format!("line {} total overflows", idx + 1)))?;
    total_amount = total_amount
      .checked_add(line_total)
      .ok_or_else(|| EngineError::InvalidAmount("order total overflows".to_string()))?;

    priced.push(PricedLine {
      kind: item.kind,
      item_id: item.id,
      name: item.name.clone(),
      unit_price,
      quantity: line.quantity,
      line_total,
    });
  }

  let (commission, vendor_amount) = split_commission(total_amount, commission_rate)?;
  Ok(PricedBasket {
    vendor_id,
    lines: priced,
    total_amount,
    commission,
    vendor_amount,
    commission_rate,
  })
}

/// Recomputes `(total, commission, vendor_amount)` from persisted items.
pub fn reprice_items(items: &[OrderItem], commission_rate: Decimal) -> EngineResult<(Money, Money, Money)> {
  let total: Money = items.iter().map(|i| i.total_price).sum();
  let (commission, vendor_amount) = split_commission(total, commission_rate)?;
  Ok((total, commission, vendor_amount))
}
