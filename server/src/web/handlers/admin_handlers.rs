// server/src/web/handlers/admin_handlers.rs

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use order_engine::{retry_once_on_conflict, OrderFilterParams, OrderStore, RefundRequest, StatusUpdate};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::require_admin;
use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::{transition_request, AuthenticatedActor, IdempotencyKey, IfMatchVersion};
use crate::web::response;

const MAX_BULK_IDS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
  pub order_ids: Vec<i64>,
  pub status: String,
  #[serde(default)]
  pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
  pub order_ids: Vec<i64>,
}

fn check_bulk_size(ids: &[i64]) -> Result<(), AppError> {
  if ids.is_empty() {
    return Err(AppError::Validation("order_ids must not be empty".to_string()));
  }
  if ids.len() > MAX_BULK_IDS {
    return Err(AppError::Validation(format!("at most {} order_ids per request", MAX_BULK_IDS)));
  }
  Ok(())
}

#[instrument(name = "handler::list_all_orders", skip(app_state, caller, query), fields(user_id = caller.0.user_id))]
pub async fn list_all_orders_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  query: web::Query<OrderFilterParams>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_admin(&actor)?;
  let filter = query.into_inner().into_filter()?;
  let page = app_state.engine.list(&actor, filter).await?;
  Ok(response::paginated("Orders retrieved successfully", page))
}

/// Any valid transition; `override: true` skips the From-state check.
#[instrument(
  name = "handler::admin_update_status",
  skip(app_state, caller, body, key, version),
  fields(user_id = caller.0.user_id, status = %body.status, override_from = body.override_from)
)]
pub async fn update_status_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
  key: IdempotencyKey,
  version: IfMatchVersion,
  body: web::Json<StatusUpdate>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_admin(&actor)?;
  let order_id = path.into_inner();
  let update = body.into_inner();
  if update.override_from {
    warn!(order_id, status = %update.status, "Admin override requested.");
  }
  let request = transition_request(key, version);
  let snapshot = retry_once_on_conflict("admin_update_status", || {
    app_state
      .engine
      .update_status(&actor, order_id, update.clone(), request.clone())
  })
  .await?;
  Ok(response::order(StatusCode::OK, "Order status updated successfully", snapshot))
}

#[instrument(
  name = "handler::bulk_update_status",
  skip(app_state, caller, body),
  fields(user_id = caller.0.user_id, count = body.order_ids.len())
)]
pub async fn bulk_update_status_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  body: web::Json<BulkStatusRequest>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_admin(&actor)?;
  let BulkStatusRequest { order_ids, status, notes } = body.into_inner();
  check_bulk_size(&order_ids)?;
  let update = StatusUpdate {
    status,
    notes,
    override_from: false,
  };
  let result = app_state.engine.bulk_update_status(&actor, &order_ids, update).await?;
  let message = format!("{} orders updated, {} skipped", result.updated.len(), result.skipped.len());
  Ok(response::ok(&message, result))
}

#[instrument(
  name = "handler::bulk_delete",
  skip(app_state, caller, body),
  fields(user_id = caller.0.user_id, count = body.order_ids.len())
)]
pub async fn bulk_delete_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  body: web::Json<BulkDeleteRequest>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_admin(&actor)?;
  let order_ids = body.into_inner().order_ids;
  check_bulk_size(&order_ids)?;
  let result = app_state.engine.bulk_delete(&actor, &order_ids).await?;
  let message = format!("{} orders deleted, {} skipped", result.updated.len(), result.skipped.len());
  Ok(response::ok(&message, result))
}

#[instrument(
  name = "handler::refund_order",
  skip(app_state, caller, body, key, version),
  fields(user_id = caller.0.user_id, amount = ?body.amount)
)]
pub async fn refund_order_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
  key: IdempotencyKey,
  version: IfMatchVersion,
  body: web::Json<RefundRequest>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_admin(&actor)?;
  let order_id = path.into_inner();
  let refund = body.into_inner();
  let request = transition_request(key, version);
  let snapshot = retry_once_on_conflict("refund_order", || {
    app_state
      .engine
      .refund(&actor, order_id, refund.clone(), request.clone())
  })
  .await?;
  info!(order_id, payment_status = %snapshot.order.payment_status, "Order refunded.");
  Ok(response::order(StatusCode::OK, "Order refunded successfully", snapshot))
}

#[instrument(name = "handler::admin_vendor_ledger", skip(app_state, caller), fields(user_id = caller.0.user_id))]
pub async fn vendor_ledger_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_admin(&actor)?;
  let ledger = app_state.engine.vendor_ledger(&actor, path.into_inner()).await?;
  Ok(response::ok("Vendor ledger retrieved successfully", ledger))
}
