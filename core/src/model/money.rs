// core/src/model/money.rs

//! Monetary amounts in the platform currency's smallest unit.
//!
//! Totals are always integer arithmetic on `Money`; `Decimal` only appears for
//! rates and client-supplied price overrides, and is rounded half-to-even at
//! scale 0 whenever it turns back into `Money`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
  pub const ZERO: Money = Money(0);

  pub const fn new(units: i64) -> Self {
    Money(units)
  }

  pub const fn units(self) -> i64 {
    self.0
  }

  pub fn is_zero(self) -> bool {
    self.0 == 0
  }

  pub fn is_negative(self) -> bool {
    self.0 < 0
  }

  /// Rounds `value` half-to-even to whole units. `None` when it does not fit.
  pub fn from_decimal(value: Decimal) -> Option<Self> {
    round_half_even(value).to_i64().map(Money)
  }

  pub fn to_decimal(self) -> Decimal {
    Decimal::from(self.0)
  }

  pub fn checked_add(self, other: Money) -> Option<Money> {
    self.0.checked_add(other.0).map(Money)
  }

  pub fn checked_mul(self, quantity: i64) -> Option<Money> {
    self.0.checked_mul(quantity).map(Money)
  }

  /// `round(self × rate)`, ties to even.
  pub fn apply_rate(self, rate: Decimal) -> Option<Money> {
    self.to_decimal().checked_mul(rate).and_then(Money::from_decimal)
  }

  /// Share of `self` proportional to `part / whole`, ties to even. A zero
  /// `whole` yields zero.
  pub fn pro_rata(self, part: Money, whole: Money) -> Money {
    if whole.is_zero() {
      return Money::ZERO;
    }
    self
      .to_decimal()
      .checked_mul(part.to_decimal())
      .and_then(|v| v.checked_div(whole.to_decimal()))
      .and_then(Money::from_decimal)
      .unwrap_or(Money::ZERO)
  }
}

pub fn round_half_even(value: Decimal) -> Decimal {
  value.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
}

impl fmt::Display for Money {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Add for Money {
  type Output = Money;
  fn add(self, rhs: Money) -> Money {
    Money(self.0 + rhs.0)
  }
}

impl AddAssign for Money {
  fn add_assign(&mut self, rhs: Money) {
    self.0 += rhs.0;
  }
}

impl Sub for Money {
  type Output = Money;
  fn sub(self, rhs: Money) -> Money {
    Money(self.0 - rhs.0)
  }
}

impl SubAssign for Money {
  fn sub_assign(&mut self, rhs: Money) {
    self.0 -= rhs.0;
  }
}

impl Neg for Money {
  type Output = Money;
  fn neg(self) -> Money {
    Money(-self.0)
  }
}

impl Sum for Money {
  fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
    iter.fold(Money::ZERO, Add::add)
  }
}

impl<'a> Sum<&'a Money> for Money {
  fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
    iter.copied().sum()
  }
}

impl From<i64> for Money {
  fn from(units: i64) -> Self {
    Money(units)
  }
}
