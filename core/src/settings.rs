// core/src/settings.rs

//! Platform settings the engine consults on every operation. They originate in
//! a key-value table and may change at runtime; each operation reads one
//! consistent snapshot from a `SettingsHandle`.

use crate::error::EngineError;
use crate::model::Money;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_COMMISSION_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
pub const DEFAULT_ESCROW_DURATION_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
  pub commission_rate: Decimal,
  pub min_order_amount: Option<Money>,
  pub max_order_amount: Option<Money>,
  pub escrow_duration_days: u32,
  pub maintenance_mode: bool,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self {
      commission_rate: DEFAULT_COMMISSION_RATE,
      min_order_amount: None,
      max_order_amount: None,
      escrow_duration_days: DEFAULT_ESCROW_DURATION_DAYS,
      maintenance_mode: false,
    }
  }
}

impl EngineSettings {
  /// Builds settings from raw key/value rows. Unknown keys are ignored; a value
  /// that fails to parse is logged and the default kept.
  pub fn from_pairs<'a, I>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let mut settings = EngineSettings::default();
    for (key, raw) in pairs {
      let value = raw.trim();
      match key {
        "commission_rate" => match Decimal::from_str(value) {
          Ok(rate) if rate >= Decimal::ZERO && rate <= Decimal::ONE => settings.commission_rate = rate,
          _ => warn!(%key, %value, "Ignoring malformed setting, rate must be within [0, 1]."),
        },
        "min_order_amount" => match parse_amount(value) {
          Ok(amount) => settings.min_order_amount = amount,
          Err(e) => warn!(%key, %value, error = %e, "Ignoring malformed setting."),
        },
        "max_order_amount" => match parse_amount(value) {
          Ok(amount) => settings.max_order_amount = amount,
          Err(e) => warn!(%key, %value, error = %e, "Ignoring malformed setting."),
        },
        "escrow_duration_days" => match value.parse::<u32>() {
          Ok(days) => settings.escrow_duration_days = days,
          Err(e) => warn!(%key, %value, error = %e, "Ignoring malformed setting."),
        },
        "maintenance_mode" => match parse_bool(value) {
          Some(flag) => settings.maintenance_mode = flag,
          None => warn!(%key, %value, "Ignoring malformed setting, expected a boolean."),
        },
        _ => {}
      }
    }
    settings
  }

  /// `AmountOutOfRange` when `total` falls outside the configured bounds.
  pub fn check_order_amount(&self, total: Money) -> Result<(), EngineError> {
    if let Some(min) = self.min_order_amount {
      if total < min {
        return Err(EngineError::AmountOutOfRange {
          total: total.units(),
          detail: format!("minimum order amount is {}", min),
        });
      }
    }
    if let Some(max) = self.max_order_amount {
      if total > max {
        return Err(EngineError::AmountOutOfRange {
          total: total.units(),
          detail: format!("maximum order amount is {}", max),
        });
      }
    }
    Ok(())
  }
}

// Empty means "no bound".
fn parse_amount(value: &str) -> Result<Option<Money>, String> {
  if value.is_empty() || value == "0" {
    return Ok(None);
  }
  let amount = Decimal::from_str(value).map_err(|e| e.to_string())?;
  if amount.is_sign_negative() {
    return Err("amount must not be negative".to_string());
  }
  Money::from_decimal(amount)
    .map(Some)
    .ok_or_else(|| "amount out of range".to_string())
}

fn parse_bool(value: &str) -> Option<bool> {
  match value.to_ascii_lowercase().as_str() {
    "true" | "1" | "yes" | "on" => Some(true),
    "false" | "0" | "no" | "off" => Some(false),
    _ => None,
  }
}

/// Shared, swappable settings. Readers take an `Arc` snapshot and never block writers for long.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
  inner: Arc<RwLock<Arc<EngineSettings>>>,
}

impl SettingsHandle {
  pub fn new(settings: EngineSettings) -> Self {
    Self {
      inner: Arc::new(RwLock::new(Arc::new(settings))),
    }
  }

  pub fn snapshot(&self) -> Arc<EngineSettings> {
    self.inner.read().clone()
  }

  pub fn replace(&self, settings: EngineSettings) {
    info!(
      commission_rate = %settings.commission_rate,
      escrow_duration_days = settings.escrow_duration_days,
      maintenance_mode = settings.maintenance_mode,
      "Engine settings updated."
    );
    *self.inner.write() = Arc::new(settings);
  }

  /// Applies `f` to a copy of the current settings and publishes the result.
  pub fn update(&self, f: impl FnOnce(&mut EngineSettings)) {
    let mut next = (*self.snapshot()).clone();
    f(&mut next);
    self.replace(next);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_keys_and_bad_values_fall_back_to_defaults() {
    let settings = EngineSettings::from_pairs([
      ("commission_rate", "abc"),
      ("theme_colour", "pink"),
      ("escrow_duration_days", "14"),
      ("maintenance_mode", "TRUE"),
    ]);
    assert_eq!(settings.commission_rate, DEFAULT_COMMISSION_RATE);
    assert_eq!(settings.escrow_duration_days, 14);
    assert!(settings.maintenance_mode);
  }

  #[test]
  fn order_amount_bounds() {
    let settings = EngineSettings::from_pairs([("min_order_amount", "100000"), ("max_order_amount", "5000000.00")]);
    assert!(settings.check_order_amount(Money::new(99_999)).is_err());
    assert!(settings.check_order_amount(Money::new(100_000)).is_ok());
    assert!(settings.check_order_amount(Money::new(5_000_001)).is_err());
  }
}
