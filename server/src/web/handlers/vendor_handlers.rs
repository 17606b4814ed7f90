// server/src/web/handlers/vendor_handlers.rs

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use order_engine::{retry_once_on_conflict, OrderFilterParams, OrderStore, StatusUpdate};
use tracing::{info, instrument};

use super::require_vendor;
use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::{transition_request, AuthenticatedActor, IdempotencyKey, IfMatchVersion};
use crate::web::response;

#[instrument(name = "handler::list_vendor_orders", skip(app_state, caller, query), fields(user_id = caller.0.user_id))]
pub async fn list_vendor_orders_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  query: web::Query<OrderFilterParams>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_vendor(&actor)?;
  let filter = query.into_inner().into_filter()?;
  let page = app_state.engine.list(&actor, filter).await?;
  Ok(response::paginated("Vendor orders retrieved successfully", page))
}

/// Accept, reject, start or complete one of the vendor's orders.
#[instrument(
  name = "handler::update_vendor_order_status",
  skip(app_state, caller, body, key, version),
  fields(user_id = caller.0.user_id, status = %body.status)
)]
pub async fn update_vendor_order_status_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
  key: IdempotencyKey,
  version: IfMatchVersion,
  body: web::Json<StatusUpdate>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_vendor(&actor)?;
  let order_id = path.into_inner();
  let update = body.into_inner();
  let request = transition_request(key, version);
  let snapshot = retry_once_on_conflict("update_vendor_order_status", || {
    app_state
      .engine
      .update_status(&actor, order_id, update.clone(), request.clone())
  })
  .await?;
  info!(order_id, status = %snapshot.order.status, "Vendor status update applied.");
  Ok(response::order(StatusCode::OK, "Order status updated successfully", snapshot))
}

#[instrument(name = "handler::vendor_ledger", skip(app_state, caller), fields(user_id = caller.0.user_id))]
pub async fn vendor_ledger_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let vendor_id = require_vendor(&actor)?;
  let ledger = app_state.engine.vendor_ledger(&actor, vendor_id).await?;
  Ok(response::ok("Vendor ledger retrieved successfully", ledger))
}
