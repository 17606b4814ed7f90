// core/src/machine/review.rs

//! Reviews of completed orders: one per order, written by its customer,
//! answered by its vendor, highlighted by admins.

use crate::error::{EngineError, EngineResult};
use crate::invariants;
use crate::machine::OrderEngine;
use crate::model::{Actor, NewReview, OrderStatus, Review, Role};
use crate::store::{OrderStore, StoreTx};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewReply {
  pub reply: String,
}

impl<S: OrderStore> OrderEngine<S> {
  #[instrument(skip(self, actor, review), fields(actor_id = actor.user_id, rating = review.rating))]
  pub async fn create_review(&self, actor: &Actor, order_id: i64, review: NewReview) -> EngineResult<Review> {
    self.ensure_writable(actor)?;
    if actor.role != Role::Customer {
      return Err(EngineError::wrong_role(actor.role, "review orders"));
    }
    if !(1..=5).contains(&review.rating) {
      return Err(EngineError::InvalidRating(review.rating));
    }

    self
      .with_deadline("create_review", async {
        let mut tx = self.store.begin(self.request_timeout).await?;
        let mut agg = tx.load_for_update(order_id).await?;
        if !actor.is_customer_of(agg.order.customer_id) {
          return Err(EngineError::NotOwner { order_id });
        }
        if agg.review.is_some() {
          return Err(EngineError::DuplicateReview { order_id });
        }
        if !matches!(agg.order.status, OrderStatus::Completed | OrderStatus::Refunded) {
          return Err(EngineError::ActionNotAllowed {
            action: "review",
            status: agg.order.status,
          });
        }

        let now = Utc::now();
        let mut record = Review {
          id: 0,
          order_id,
          customer_id: actor.user_id,
          vendor_id: agg.order.vendor_id,
          rating: review.rating,
          comment: review.comment,
          images: review.images,
          is_highlighted: false,
          vendor_reply: None,
          replied_at: None,
          created_at: now,
          updated_at: now,
        };
        agg.review = Some(record.clone());
        invariants::verify(&agg)?;

        record.id = tx.upsert_review(&record).await?;
        tx.commit().await?;
        info!(order_id, review_id = record.id, "Review created.");
        Ok(record)
      })
      .await
  }

  #[instrument(skip(self, actor, reply), fields(actor_id = actor.user_id))]
  pub async fn reply_review(&self, actor: &Actor, order_id: i64, reply: ReviewReply) -> EngineResult<Review> {
    self.ensure_writable(actor)?;
    self
      .with_deadline("reply_review", async {
        let mut tx = self.store.begin(self.request_timeout).await?;
        let agg = tx.load_for_update(order_id).await?;
        if !actor.is_admin() {
          if actor.vendor_profile_id.is_none() {
            return Err(EngineError::wrong_role(actor.role, "reply to reviews"));
          }
          if !actor.owns_vendor(agg.order.vendor_id) {
            return Err(EngineError::NotOwner { order_id });
          }
        }
        let mut review = agg.review.ok_or(EngineError::ReviewNotFound(order_id))?;
        let now = Utc::now();
        review.vendor_reply = Some(reply.reply.trim().to_string());
        review.replied_at = Some(now);
        review.updated_at = now;
        tx.upsert_review(&review).await?;
        tx.commit().await?;
        info!(order_id, review_id = review.id, "Vendor replied to review.");
        Ok(review)
      })
      .await
  }

  #[instrument(skip(self, actor), fields(actor_id = actor.user_id))]
  pub async fn highlight_review(&self, actor: &Actor, order_id: i64, highlighted: bool) -> EngineResult<Review> {
    if !actor.is_admin() {
      return Err(EngineError::wrong_role(actor.role, "highlight reviews"));
    }
    self
      .with_deadline("highlight_review", async {
        let mut tx = self.store.begin(self.request_timeout).await?;
        let agg = tx.load_for_update(order_id).await?;
        let mut review = agg.review.ok_or(EngineError::ReviewNotFound(order_id))?;
        review.is_highlighted = highlighted;
        review.updated_at = Utc::now();
        tx.upsert_review(&review).await?;
        tx.commit().await?;
        info!(order_id, highlighted, "Review highlight changed.");
        Ok(review)
      })
      .await
  }
}
