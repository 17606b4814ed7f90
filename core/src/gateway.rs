// core/src/gateway.rs

//! Outbound side of payments. The engine never calls a gateway inside a
//! transaction. A refund intent is written to the store's outbox in the same
//! transaction that books it, queued after commit, and delivered by a
//! background worker with exponential backoff. The worker replays unsettled
//! outbox rows when it starts, so an intent survives a crash between commit
//! and delivery.

use crate::error::EngineResult;
use crate::model::Money;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Money owed back to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundIntent {
  pub order_id: i64,
  pub order_number: String,
  pub amount: Money,
  pub reason: String,
  /// Stable per refund so the gateway can deduplicate redeliveries.
  pub idempotency_key: String,
}

/// How the gateway settled an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundOutcome {
  Delivered,
  Rejected,
}

impl RefundOutcome {
  pub fn as_str(self) -> &'static str {
    match self {
      RefundOutcome::Delivered => "delivered",
      RefundOutcome::Rejected => "rejected",
    }
  }
}

/// Durable record of refund intents. Rows are written through
/// [`StoreTx::stage_refund`](crate::store::StoreTx::stage_refund) and leave
/// the pending set once settled.
#[async_trait]
pub trait RefundOutbox: Send + Sync + 'static {
  /// Committed intents with no outcome yet, oldest first.
  async fn pending_refunds(&self) -> EngineResult<Vec<RefundIntent>>;

  async fn settle_refund(&self, idempotency_key: &str, outcome: RefundOutcome) -> EngineResult<()>;
}

#[derive(Debug, Error)]
pub enum GatewayError {
  /// Permanent; retrying will not help.
  #[error("Gateway rejected the request: {0}")]
  Rejected(String),
  #[error("Gateway unavailable: {0}")]
  Unavailable(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
  fn name(&self) -> &str;

  /// Returns the gateway's reference for the refund.
  async fn refund(&self, intent: &RefundIntent) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub base_backoff: Duration,
  pub max_backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_backoff: Duration::from_millis(200),
      max_backoff: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  /// Delay before attempt `attempt + 1`, doubling from `base_backoff`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base_backoff.saturating_mul(factor).min(self.max_backoff)
  }
}

/// Sending half of the refund dispatch queue.
#[derive(Debug, Clone)]
pub struct RefundQueue {
  sender: mpsc::UnboundedSender<RefundIntent>,
}

impl RefundQueue {
  /// A queue without a worker; the receiver sees every enqueued intent.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<RefundIntent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }

  /// Starts a worker that delivers intents to `gateway` one at a time. It
  /// first replays whatever `outbox` still holds, then serves the queue.
  /// Intents whose retries run out stay pending for the next start.
  pub fn spawn<G, O>(gateway: Arc<G>, outbox: Arc<O>, policy: RetryPolicy) -> (Self, JoinHandle<()>)
  where
    G: PaymentGateway,
    O: RefundOutbox,
  {
    let (queue, mut receiver) = Self::channel();
    let handle = tokio::spawn(async move {
      info!(gateway = gateway.name(), "Refund dispatch worker started.");
      let mut settled = HashSet::new();
      match outbox.pending_refunds().await {
        Ok(pending) => {
          if !pending.is_empty() {
            info!(count = pending.len(), "Replaying unsettled refund intents.");
          }
          for intent in pending {
            deliver(gateway.as_ref(), outbox.as_ref(), &intent, &policy, &mut settled).await;
          }
        }
        Err(e) => error!(target: "order_engine::alert", error = %e, "Could not read the refund outbox."),
      }
      while let Some(intent) = receiver.recv().await {
        if settled.contains(&intent.idempotency_key) {
          continue;
        }
        deliver(gateway.as_ref(), outbox.as_ref(), &intent, &policy, &mut settled).await;
      }
      info!("Refund dispatch worker stopped.");
    });
    (queue, handle)
  }

  pub fn enqueue(&self, intent: RefundIntent) {
    let order_id = intent.order_id;
    if let Err(e) = self.sender.send(intent) {
      error!(
        target: "order_engine::alert",
        order_id,
        amount = %e.0.amount,
        "Refund queue is closed, intent dropped."
      );
    }
  }
}

async fn deliver<G, O>(
  gateway: &G,
  outbox: &O,
  intent: &RefundIntent,
  policy: &RetryPolicy,
  settled: &mut HashSet<String>,
) where
  G: PaymentGateway + ?Sized,
  O: RefundOutbox + ?Sized,
{
  let Some(outcome) = dispatch(gateway, intent, policy).await else {
    return;
  };
  match outbox.settle_refund(&intent.idempotency_key, outcome).await {
    Ok(()) => {
      settled.insert(intent.idempotency_key.clone());
    }
    Err(e) => error!(
      target: "order_engine::alert",
      order_id = intent.order_id,
      key = %intent.idempotency_key,
      error = %e,
      "Refund settled with the gateway but the outbox was not updated."
    ),
  }
}

/// Delivers one intent. `None` means retries ran out and the intent is still owed.
pub async fn dispatch<G: PaymentGateway + ?Sized>(
  gateway: &G,
  intent: &RefundIntent,
  policy: &RetryPolicy,
) -> Option<RefundOutcome> {
  for attempt in 1..=policy.max_attempts.max(1) {
    match gateway.refund(intent).await {
      Ok(reference) => {
        info!(
          order_id = intent.order_id,
          amount = %intent.amount,
          %reference,
          attempt,
          "Refund delivered to gateway."
        );
        return Some(RefundOutcome::Delivered);
      }
      Err(GatewayError::Rejected(reason)) => {
        error!(
          target: "order_engine::alert",
          order_id = intent.order_id,
          amount = %intent.amount,
          %reason,
          "Gateway rejected refund."
        );
        return Some(RefundOutcome::Rejected);
      }
      Err(GatewayError::Unavailable(reason)) => {
        if attempt < policy.max_attempts {
          let delay = policy.backoff(attempt);
          warn!(order_id = intent.order_id, attempt, ?delay, %reason, "Refund attempt failed, retrying.");
          tokio::time::sleep(delay).await;
        } else {
          warn!(order_id = intent.order_id, attempt, %reason, "Refund attempt failed.");
        }
      }
    }
  }
  error!(
    target: "order_engine::alert",
    order_id = intent.order_id,
    amount = %intent.amount,
    attempts = policy.max_attempts,
    "Refund retries exhausted."
  );
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_doubles_and_caps() {
    let policy = RetryPolicy {
      max_attempts: 10,
      base_backoff: Duration::from_millis(100),
      max_backoff: Duration::from_millis(500),
    };
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(400));
    assert_eq!(policy.backoff(4), Duration::from_millis(500));
  }
}
