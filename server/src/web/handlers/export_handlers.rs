// server/src/web/handlers/export_handlers.rs

//! CSV export of the admin order listing, streamed page by page.

use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use order_engine::{Order, OrderFilterParams, OrderStore};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::require_admin;
use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedActor;

const EXPORT_PAGE_SIZE: u32 = 100;

/// Used for the header of an export with no orders.
const EXPORT_COLUMNS: [&str; 13] = [
  "order_number",
  "status",
  "payment_status",
  "customer_id",
  "vendor_id",
  "event_date",
  "event_location",
  "total_amount",
  "commission",
  "vendor_amount",
  "escrow_released",
  "needs_review",
  "created_at",
];

/// One CSV record. Field order is column order.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
  order_number: &'a str,
  status: String,
  payment_status: String,
  customer_id: i64,
  vendor_id: i64,
  event_date: String,
  event_location: &'a str,
  total_amount: String,
  commission: String,
  vendor_amount: String,
  escrow_released: bool,
  needs_review: bool,
  created_at: String,
}

impl<'a> From<&'a Order> for ExportRow<'a> {
  fn from(order: &'a Order) -> Self {
    Self {
      order_number: &order.order_number,
      status: order.status.to_string(),
      payment_status: order.payment_status.to_string(),
      customer_id: order.customer_id,
      vendor_id: order.vendor_id,
      event_date: order.event_date.format("%Y-%m-%d").to_string(),
      event_location: &order.event_location,
      total_amount: order.total_amount.to_string(),
      commission: order.commission.to_string(),
      vendor_amount: order.vendor_amount.to_string(),
      escrow_released: order.escrow_released,
      needs_review: order.needs_review,
      created_at: order.created_at.to_rfc3339(),
    }
  }
}

/// Encodes one page of orders. The header row is derived from `ExportRow`
/// and written only when `with_header` is set; a page with no orders still
/// yields the header then.
pub fn render(orders: &[Order], with_header: bool) -> Result<Vec<u8>, AppError> {
  let mut writer = csv::WriterBuilder::new()
    .has_headers(with_header)
    .from_writer(Vec::new());
  if orders.is_empty() && with_header {
    writer.write_record(EXPORT_COLUMNS)?;
  }
  for order in orders {
    writer.serialize(ExportRow::from(order))?;
  }
  writer
    .into_inner()
    .map_err(|e| AppError::Internal(format!("flushing CSV export: {}", e)))
}

#[instrument(name = "handler::export_orders", skip(app_state, caller, query), fields(user_id = caller.0.user_id))]
pub async fn export_orders_handler<S: OrderStore>(
  app_state: web::Data<AppState<S>>,
  caller: AuthenticatedActor,
  query: web::Query<OrderFilterParams>,
) -> Result<HttpResponse, AppError> {
  let actor = app_state.resolve_actor(caller).await?;
  require_admin(&actor)?;
  let mut filter = query.into_inner().into_filter()?;
  filter.page = 1;
  filter.limit = EXPORT_PAGE_SIZE;

  // The first page is read before the response starts so a bad filter still
  // gets an error envelope.
  let first = app_state.engine.list(&actor, filter.clone()).await?;
  let total_pages = first.total_pages();
  info!(total = first.total, pages = total_pages, "Starting order export.");

  let head = stream::once(async move { render(&first.items, true).map(web::Bytes::from) });
  let engine = app_state.engine.clone();
  let rest = stream::unfold(2u32, move |page| {
    let engine = engine.clone();
    let actor = actor.clone();
    let mut filter = filter.clone();
    async move {
      if u64::from(page) > total_pages {
        return None;
      }
      filter.page = page;
      let chunk = engine
        .list(&actor, filter)
        .await
        .map_err(AppError::from)
        .and_then(|next| render(&next.items, false))
        .map(web::Bytes::from);
      if let Err(e) = &chunk {
        warn!(page, error = %e, "Order export aborted mid-stream.");
      }
      Some((chunk, page + 1))
    }
  });

  let filename = format!("orders-{}.csv", Utc::now().format("%Y%m%d%H%M%S"));
  Ok(
    HttpResponse::Ok()
      .content_type("text/csv; charset=utf-8")
      .insert_header(ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![DispositionParam::Filename(filename)],
      })
      .streaming(head.chain(rest)),
  )
}
