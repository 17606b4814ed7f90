// server/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use order_engine::{retry_once_on_conflict, EngineError, Money, OrderStore, PaymentNotification, PaymentRecordStatus};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::response;

/// Fields every gateway callback must carry, whatever else it sends.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookPayload {
  pub order_id: i64,
  pub amount: Decimal,
  #[serde(default)]
  pub method: Option<String>,
  pub transaction_id: String,
  pub status: String,
  #[serde(default)]
  pub paid_at: Option<DateTime<Utc>>,
}

/// Maps gateway vocabularies onto payment record statuses.
fn normalise_status(raw: &str) -> Option<PaymentRecordStatus> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "success" | "settlement" | "capture" | "paid" => Some(PaymentRecordStatus::Success),
    "pending" => Some(PaymentRecordStatus::Pending),
    "failed" | "failure" | "deny" => Some(PaymentRecordStatus::Failed),
    "cancelled" | "cancel" | "expire" | "expired" => Some(PaymentRecordStatus::Cancelled),
    "refunded" | "refund" => Some(PaymentRecordStatus::Refunded),
    _ => None,
  }
}

fn parse_notification(source: &str, body: &[u8]) -> Result<PaymentNotification, AppError> {
  let raw: serde_json::Value =
    serde_json::from_slice(body).map_err(|e| AppError::Validation(format!("Webhook body is not JSON: {}", e)))?;
  let payload: PaymentWebhookPayload = serde_json::from_value(raw.clone())
    .map_err(|e| AppError::Validation(format!("Webhook body is missing fields: {}", e)))?;
  let status = normalise_status(&payload.status)
    .ok_or_else(|| AppError::Validation(format!("Unknown payment status '{}'", payload.status)))?;
  let amount = Money::from_decimal(payload.amount)
    .ok_or_else(|| EngineError::InvalidAmount(format!("{} is out of range", payload.amount)))?;
  Ok(PaymentNotification {
    order_id: payload.order_id,
    amount,
    method: payload.method.unwrap_or_else(|| source.to_string()),
    gateway: source.to_string(),
    gateway_txn_id: payload.transaction_id,
    status,
    payload: raw,
    paid_at: payload.paid_at,
  })
}

/// Payment outcome callback. Replays of the same transaction are acknowledged
/// without side effects, so gateways may retry freely.
#[instrument(
  name = "handler::payment_webhook",
  skip(app_state, body),
  fields(webhook_source = %source, payload_bytes = body.len())
)]
pub async fn payment_webhook_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  source: web::Path<String>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let source = source.into_inner();
  let notification = parse_notification(&source, &body)?;
  info!(
    order_id = notification.order_id,
    txn = %notification.gateway_txn_id,
    status = %notification.status,
    "Received payment notification."
  );

  let snapshot = retry_once_on_conflict("payment_webhook", || {
    app_state.engine.record_payment(notification.clone())
  })
  .await?;

  Ok(response::ok(
    "Payment notification processed",
    json!({
      "order_id": snapshot.order.id,
      "order_number": snapshot.order.order_number,
      "status": snapshot.order.status,
      "payment_status": snapshot.order.payment_status,
    }),
  ))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gateway_statuses_map_onto_records() {
    assert_eq!(normalise_status("settlement"), Some(PaymentRecordStatus::Success));
    assert_eq!(normalise_status(" EXPIRE "), Some(PaymentRecordStatus::Cancelled));
    assert_eq!(normalise_status("chargeback"), None);
  }

  #[test]
  fn keeps_raw_payload_and_uses_source_as_gateway() {
    let body = br#"{"order_id": 7, "amount": "250000.00", "transaction_id": "T-1", "status": "capture", "fraud_status": "accept"}"#;
    let notification = parse_notification("midtrans", body).unwrap();
    assert_eq!(notification.gateway, "midtrans");
    assert_eq!(notification.method, "midtrans");
    assert_eq!(notification.amount, Money::new(250_000));
    assert_eq!(notification.payload["fraud_status"], "accept");
  }
}
