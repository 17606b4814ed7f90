// server/src/web/response.rs

//! The `{success, message, data?, errors?, meta?}` envelope every route answers with.

use actix_web::http::header;
use actix_web::HttpResponse;
use order_engine::{OrderSnapshot, Page};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PageMeta {
  pub page: u32,
  pub limit: u32,
  pub total: u64,
  pub total_pages: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
  pub success: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub errors: Option<serde_json::Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub meta: Option<PageMeta>,
}

impl<T: Serialize> ApiResponse<T> {
  pub fn success(message: impl Into<String>, data: T) -> Self {
    Self {
      success: true,
      message: message.into(),
      data: Some(data),
      errors: None,
      meta: None,
    }
  }

  pub fn failure(message: impl Into<String>, errors: serde_json::Value) -> Self {
    Self {
      success: false,
      message: message.into(),
      data: None,
      errors: Some(errors),
      meta: None,
    }
  }
}

pub fn ok<T: Serialize>(message: &str, data: T) -> HttpResponse {
  HttpResponse::Ok().json(ApiResponse::success(message, data))
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
  HttpResponse::Created().json(ApiResponse::success(message, data))
}

pub fn message(message: &str) -> HttpResponse {
  HttpResponse::Ok().json(ApiResponse::<()> {
    success: true,
    message: message.to_string(),
    data: None,
    errors: None,
    meta: None,
  })
}

pub fn paginated<T: Serialize>(message: &str, page: Page<T>) -> HttpResponse {
  let meta = PageMeta {
    page: page.page,
    limit: page.limit,
    total: page.total,
    total_pages: page.total_pages(),
  };
  HttpResponse::Ok().json(ApiResponse {
    success: true,
    message: message.to_string(),
    data: Some(page.items),
    errors: None,
    meta: Some(meta),
  })
}

/// Order views carry their version as an ETag so clients can send it back in `If-Match`.
pub fn order(status: actix_web::http::StatusCode, message: &str, snapshot: OrderSnapshot) -> HttpResponse {
  HttpResponse::build(status)
    .insert_header((header::ETAG, format!("\"{}\"", snapshot.order.version)))
    .json(ApiResponse::success(message, snapshot))
}
