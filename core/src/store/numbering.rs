// core/src/store/numbering.rs

//! Human-readable order numbers: `WC` + `YYYYMMDD` + daily sequence padded to
//! six digits, so numbers of one day sort as strings in sequence order.

use chrono::NaiveDate;

pub const ORDER_NUMBER_PREFIX: &str = "WC";
const SEQUENCE_WIDTH: usize = 6;

pub fn format_order_number(day: NaiveDate, sequence: u32) -> String {
  format!(
    "{}{}{:0width$}",
    ORDER_NUMBER_PREFIX,
    day.format("%Y%m%d"),
    sequence,
    width = SEQUENCE_WIDTH
  )
}

/// Splits an order number into its day and sequence.
pub fn parse_order_number(number: &str) -> Option<(NaiveDate, u32)> {
  let rest = number.strip_prefix(ORDER_NUMBER_PREFIX)?;
  if rest.len() < 8 + SEQUENCE_WIDTH || !rest.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let (day, sequence) = rest.split_at(8);
  let day = NaiveDate::parse_from_str(day, "%Y%m%d").ok()?;
  Some((day, sequence.parse().ok()?))
}
