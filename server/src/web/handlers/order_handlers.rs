// server/src/web/handlers/order_handlers.rs

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use order_engine::{retry_once_on_conflict, CreateOrderRequest, EditOrderRequest, OrderFilterParams, OrderStore};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::{transition_request, AuthenticatedActor, IdempotencyKey, IfMatchVersion};
use crate::web::response;

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
  #[serde(default)]
  pub notes: Option<String>,
}

#[instrument(
  name = "handler::create_order",
  skip(app_state, caller, body),
  fields(user_id = caller.0.user_id, vendor_id = body.vendor_id, lines = body.items.len())
)]
pub async fn create_order_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let request = body.into_inner();
  let snapshot = retry_once_on_conflict("create_order", || app_state.engine.create(&actor, request.clone())).await?;
  info!(order_id = snapshot.order.id, number = %snapshot.order.order_number, "Order created.");
  Ok(response::order(StatusCode::CREATED, "Order created successfully", snapshot))
}

/// Lists the caller's own orders; the engine narrows customers and vendors.
#[instrument(name = "handler::list_orders", skip(app_state, caller, query), fields(user_id = caller.0.user_id))]
pub async fn list_orders_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  query: web::Query<OrderFilterParams>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let filter = query.into_inner().into_filter()?;
  let page = app_state.engine.list(&actor, filter).await?;
  Ok(response::paginated("Orders retrieved successfully", page))
}

#[instrument(name = "handler::get_order", skip(app_state, caller), fields(user_id = caller.0.user_id))]
pub async fn get_order_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let snapshot = app_state.engine.get(&actor, path.into_inner()).await?;
  Ok(response::order(StatusCode::OK, "Order retrieved successfully", snapshot))
}

#[instrument(name = "handler::get_order_by_number", skip(app_state, caller), fields(user_id = caller.0.user_id))]
pub async fn get_order_by_number_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let snapshot = app_state.engine.find_by_number(&actor, path.as_str()).await?;
  Ok(response::order(StatusCode::OK, "Order retrieved successfully", snapshot))
}

#[instrument(name = "handler::update_order", skip(app_state, caller, body), fields(user_id = caller.0.user_id))]
pub async fn update_order_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
  body: web::Json<EditOrderRequest>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let order_id = path.into_inner();
  let request = body.into_inner();
  let snapshot =
    retry_once_on_conflict("update_order", || app_state.engine.edit(&actor, order_id, request.clone())).await?;
  Ok(response::order(StatusCode::OK, "Order updated successfully", snapshot))
}

#[instrument(
  name = "handler::cancel_order",
  skip(app_state, caller, body, key, version),
  fields(user_id = caller.0.user_id, idempotency_key = ?key.0)
)]
pub async fn cancel_order_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
  key: IdempotencyKey,
  version: IfMatchVersion,
  body: Option<web::Json<CancelRequest>>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let order_id = path.into_inner();
  let mut request = transition_request(key, version);
  request.notes = body.and_then(|b| b.into_inner().notes);
  let snapshot =
    retry_once_on_conflict("cancel_order", || app_state.engine.cancel(&actor, order_id, request.clone())).await?;
  Ok(response::order(StatusCode::OK, "Order cancelled successfully", snapshot))
}

#[instrument(name = "handler::delete_order", skip(app_state, caller), fields(user_id = caller.0.user_id))]
pub async fn delete_order_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let order_id = path.into_inner();
  retry_once_on_conflict("delete_order", || app_state.engine.delete(&actor, order_id)).await?;
  Ok(response::message("Order deleted successfully"))
}

#[instrument(name = "handler::order_history", skip(app_state, caller), fields(user_id = caller.0.user_id))]
pub async fn order_history_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  let history = app_state.engine.history(&actor, path.into_inner()).await?;
  Ok(response::ok("Order history retrieved successfully", history))
}
