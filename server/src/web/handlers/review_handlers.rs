// server/src/web/handlers/review_handlers.rs

use actix_web::{web, HttpResponse};
use order_engine::{retry_once_on_conflict, NewReview, OrderStore, ReviewReply};
use serde::Deserialize;
use tracing::instrument;

use super::{require_admin, require_vendor};
use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;
use crate::web::response;

fn default_highlighted() -> bool {
  true
}

#[derive(Debug, Deserialize)]
pub struct HighlightRequest {
  #[serde(default = "default_highlighted")]
  pub highlighted: bool,
}

#[instrument(
  name = "handler::create_review",
  skip(app_state, caller, body),
  fields(user_id = caller.0.user_id, rating = body.rating)
)]
pub async fn create_review_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
  body: web::Json<NewReview>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let order_id = path.into_inner();
  let review = body.into_inner();
  let created =
    retry_once_on_conflict("create_review", || app_state.engine.create_review(&actor, order_id, review.clone())).await?;
  Ok(response::created("Review submitted successfully", created))
}

#[instrument(name = "handler::reply_review", skip(app_state, caller, body), fields(user_id = caller.0.user_id))]
pub async fn reply_review_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
  body: web::Json<ReviewReply>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_vendor(&actor)?;
  let order_id = path.into_inner();
  let reply = body.into_inner();
  if reply.reply.trim().is_empty() {
    return Err(AppError::Validation("reply must not be empty".to_string()));
  }
  let review =
    retry_once_on_conflict("reply_review", || app_state.engine.reply_review(&actor, order_id, reply.clone())).await?;
  Ok(response::ok("Reply saved successfully", review))
}

#[instrument(name = "handler::highlight_review", skip(app_state, caller, body), fields(user_id = caller.0.user_id))]
pub async fn highlight_review_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
  body: Option<web::Json<HighlightRequest>>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_admin(&actor)?;
  let order_id = path.into_inner();
  let highlighted = body.map_or(true, |b| b.highlighted);
  let review = retry_once_on_conflict("highlight_review", || {
    app_state.engine.highlight_review(&actor, order_id, highlighted)
  })
  .await?;
  Ok(response::ok("Review highlight updated", review))
}
