// server/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod export_handlers;
pub mod order_handlers;
pub mod review_handlers;
pub mod vendor_handlers;
pub mod webhook_handlers;

use crate::errors::Result;
use order_engine::{Actor, EngineError, Role};

/// Route-level gate for the `/admin` scope; the engine re-checks per operation.
pub(crate) fn require_admin(actor: &Actor) -> Result<()> {
  if actor.is_admin() {
    Ok(())
  } else {
    Err(
      EngineError::WrongRole {
        role: actor.role.to_string(),
        action: "use admin routes".to_string(),
      }
      .into(),
    )
  }
}

pub(crate) fn require_vendor(actor: &Actor) -> Result<i64> {
  match (actor.role, actor.vendor_profile_id) {
    (Role::Vendor, Some(vendor_id)) => Ok(vendor_id),
    _ => Err(
      EngineError::WrongRole {
        role: actor.role.to_string(),
        action: "use vendor routes without a vendor profile".to_string(),
      }
      .into(),
    ),
  }
}
