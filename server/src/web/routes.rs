// server/src/web/routes.rs

use actix_web::{web, HttpResponse};
use order_engine::OrderStore;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::handlers::{
  admin_handlers, export_handlers, order_handlers, review_handlers, vendor_handlers, webhook_handlers,
};
use crate::web::response;

async fn health_check_handler<S: OrderStore>(app_state: web::Data<AppState<S>>) -> HttpResponse {
  let settings = app_state.engine.settings().snapshot();
  response::ok(
    "ok",
    serde_json::json!({
      "status": "ok",
      "maintenance_mode": settings.maintenance_mode,
    }),
  )
}

/// Called from `main.rs` (and the HTTP tests) to mount every route over store `S`.
pub fn configure_app_routes<S: OrderStore>(cfg: &mut web::ServiceConfig) {
  // Extractor failures render the same envelope as engine errors.
  cfg
    .app_data(web::JsonConfig::default().error_handler(|err, _| AppError::Validation(err.to_string()).into()))
    .app_data(web::QueryConfig::default().error_handler(|err, _| AppError::Validation(err.to_string()).into()))
    .app_data(web::PathConfig::default().error_handler(|err, _| AppError::Validation(err.to_string()).into()));

  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler::<S>))
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::create_order_handler::<S>))
          .route("", web::get().to(order_handlers::list_orders_handler::<S>))
          .route(
            "/by-number/{order_number}",
            web::get().to(order_handlers::get_order_by_number_handler::<S>),
          )
          .route("/{id}", web::get().to(order_handlers::get_order_handler::<S>))
          .route("/{id}", web::put().to(order_handlers::update_order_handler::<S>))
          .route("/{id}", web::delete().to(order_handlers::delete_order_handler::<S>))
          .route("/{id}/cancel", web::put().to(order_handlers::cancel_order_handler::<S>))
          .route("/{id}/history", web::get().to(order_handlers::order_history_handler::<S>))
          .route("/{id}/review", web::post().to(review_handlers::create_review_handler::<S>)),
      )
      .service(
        web::scope("/vendor")
          .route("/orders", web::get().to(vendor_handlers::list_vendor_orders_handler::<S>))
          .route(
            "/orders/{id}/status",
            web::put().to(vendor_handlers::update_vendor_order_status_handler::<S>),
          )
          .route(
            "/orders/{id}/review/reply",
            web::put().to(review_handlers::reply_review_handler::<S>),
          )
          .route("/ledger", web::get().to(vendor_handlers::vendor_ledger_handler::<S>)),
      )
      .service(
        web::scope("/admin")
          .route("/orders", web::get().to(admin_handlers::list_all_orders_handler::<S>))
          // Literal segments before `/orders/{id}` routes.
          .route("/orders/export", web::get().to(export_handlers::export_orders_handler::<S>))
          .route(
            "/orders/bulk-update-status",
            web::post().to(admin_handlers::bulk_update_status_handler::<S>),
          )
          .route("/orders/bulk-delete", web::post().to(admin_handlers::bulk_delete_handler::<S>))
          .route("/orders/{id}/status", web::put().to(admin_handlers::update_status_handler::<S>))
          .route("/orders/{id}/refund", web::post().to(admin_handlers::refund_order_handler::<S>))
          .route(
            "/orders/{id}/review/highlight",
            web::put().to(review_handlers::highlight_review_handler::<S>),
          )
          .route("/vendors/{id}/ledger", web::get().to(admin_handlers::vendor_ledger_handler::<S>)),
      )
      .service(
        web::scope("/payments").route(
          "/webhook/{source}",
          web::post().to(webhook_handlers::payment_webhook_handler::<S>),
        ),
      ),
  );
}
