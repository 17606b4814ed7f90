// server/src/services/payment_gateway.rs

//! Stand-in for the payment provider's refund API, used until a real gateway
//! client is wired in.

use async_trait::async_trait;
use order_engine::{GatewayError, PaymentGateway, RefundIntent};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MockPaymentGateway {
  latency: Duration,
}

impl MockPaymentGateway {
  pub fn new(latency: Duration) -> Self {
    Self { latency }
  }
}

impl Default for MockPaymentGateway {
  fn default() -> Self {
    Self::new(Duration::from_millis(100))
  }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
  fn name(&self) -> &str {
    "mock"
  }

  #[instrument(name = "gateway::refund", skip(self, intent), fields(order_id = intent.order_id, amount = %intent.amount))]
  async fn refund(&self, intent: &RefundIntent) -> Result<String, GatewayError> {
    tokio::time::sleep(self.latency).await;

    // Amounts ending in 123 are declined, so failure paths can be exercised end to end.
    if intent.amount.units() % 1000 == 123 {
      warn!(key = %intent.idempotency_key, "Mock refund declined.");
      return Err(GatewayError::Rejected(format!(
        "refund of {} for {} declined by test condition",
        intent.amount, intent.order_number
      )));
    }

    let reference = format!("mock_rf_{}", Uuid::new_v4());
    info!(key = %intent.idempotency_key, %reference, "Mock refund accepted.");
    Ok(reference)
  }
}
