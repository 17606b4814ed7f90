// server/src/web/extractors.rs

//! Request-scoped values pulled from headers.
//!
//! Bearer tokens are verified by the gateway in front of this service, which
//! forwards the caller as `X-User-ID`, `X-User-Role` and, for vendors,
//! `X-Vendor-Profile-ID`.

use crate::errors::AppError;
use actix_web::{dev::Payload, http::header, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use order_engine::{Actor, EngineError, Role, TransitionRequest};
use tracing::warn;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";
pub const VENDOR_PROFILE_HEADER: &str = "X-Vendor-Profile-ID";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
  req
    .headers()
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

impl AuthenticatedActor {
  fn from_headers(req: &HttpRequest) -> Result<Self, AppError> {
    let user_id = header_str(req, USER_ID_HEADER)
      .and_then(|v| v.parse::<i64>().ok())
      .ok_or(EngineError::Unauthenticated)?;
    let role = header_str(req, USER_ROLE_HEADER)
      .ok_or(EngineError::Unauthenticated)?
      .parse::<Role>()
      .map_err(|_| EngineError::Unauthenticated)?;
    let vendor_profile_id = match header_str(req, VENDOR_PROFILE_HEADER) {
      None => None,
      Some(raw) => Some(
        raw
          .parse::<i64>()
          .map_err(|_| AppError::Validation(format!("{} must be an integer", VENDOR_PROFILE_HEADER)))?,
      ),
    };
    Ok(AuthenticatedActor(Actor {
      user_id,
      role,
      vendor_profile_id: vendor_profile_id.filter(|_| role == Role::Vendor),
    }))
  }
}

impl FromRequest for AuthenticatedActor {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let result = Self::from_headers(req);
    if let Err(e) = &result {
      warn!(path = %req.path(), error = %e, "Rejected request without a usable caller identity.");
    }
    ready(result)
  }
}

/// Client-chosen key that makes a transition safe to resend.
#[derive(Debug, Clone, Default)]
pub struct IdempotencyKey(pub Option<String>);

impl FromRequest for IdempotencyKey {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(match header_str(req, IDEMPOTENCY_KEY_HEADER) {
      None => Ok(IdempotencyKey(None)),
      Some(key) if key.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(AppError::Validation(format!(
        "{} must not exceed {} characters",
        IDEMPOTENCY_KEY_HEADER, MAX_IDEMPOTENCY_KEY_LEN
      ))),
      Some(key) => Ok(IdempotencyKey(Some(key.to_string()))),
    })
  }
}

/// Order version from `If-Match`, as handed out in the `ETag` of order responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct IfMatchVersion(pub Option<i64>);

impl IfMatchVersion {
  fn parse(raw: &str) -> Option<i64> {
    let tag = raw.strip_prefix("W/").unwrap_or(raw);
    tag.trim_matches('"').parse().ok()
  }
}

impl FromRequest for IfMatchVersion {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    ready(match header_str(req, header::IF_MATCH.as_str()) {
      None | Some("*") => Ok(IfMatchVersion(None)),
      Some(raw) => IfMatchVersion::parse(raw)
        .map(|v| IfMatchVersion(Some(v)))
        .ok_or_else(|| AppError::Validation(format!("If-Match '{}' is not an order version", raw))),
    })
  }
}

/// Folds the optional transition headers into an engine request.
pub fn transition_request(key: IdempotencyKey, version: IfMatchVersion) -> TransitionRequest {
  TransitionRequest {
    idempotency_key: key.0,
    expected_version: version.0,
    ..Default::default()
  }
}
