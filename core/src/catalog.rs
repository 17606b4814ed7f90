// core/src/catalog.rs

//! Read-only view of the external catalogue entities the engine prices and
//! validates against. Implemented by store transactions, so catalogue reads
//! never observe data newer than the transaction already sees.

use crate::error::{EngineError, EngineResult};
use crate::model::{ItemKind, Money};
use crate::pricing::LineRequest;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSnapshot {
  pub id: i64,
  pub user_id: i64,
  pub is_active: bool,
}

/// A service or package as seen at this instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
  pub kind: ItemKind,
  pub id: i64,
  pub vendor_id: i64,
  pub name: String,
  pub unit_price: Money,
  pub is_active: bool,
}

#[async_trait]
pub trait CatalogView: Send {
  /// `VendorNotFound` when no such vendor profile exists.
  async fn resolve_vendor(&mut self, vendor_id: i64) -> EngineResult<VendorSnapshot>;

  /// `ServiceNotFound` when no such service exists.
  async fn resolve_service(&mut self, service_id: i64) -> EngineResult<CatalogItem>;

  /// `PackageNotFound` when no such package exists.
  async fn resolve_package(&mut self, package_id: i64) -> EngineResult<CatalogItem>;

  async fn resolve_item(&mut self, kind: ItemKind, id: i64) -> EngineResult<CatalogItem> {
    match kind {
      ItemKind::Service => self.resolve_service(id).await,
      ItemKind::Package => self.resolve_package(id).await,
    }
  }
}

/// Resolves every line of a basket, in order.
pub async fn resolve_lines<C>(catalog: &mut C, lines: &[LineRequest]) -> EngineResult<Vec<CatalogItem>>
where
  C: CatalogView + ?Sized,
{
  let mut resolved = Vec::with_capacity(lines.len());
  for line in lines {
    resolved.push(catalog.resolve_item(line.item_type, line.item_id).await?);
  }
  Ok(resolved)
}

/// Loads a vendor profile and rejects it when inactive.
pub async fn require_active_vendor<C>(catalog: &mut C, vendor_id: i64) -> EngineResult<VendorSnapshot>
where
  C: CatalogView + ?Sized,
{
  let vendor = catalog.resolve_vendor(vendor_id).await?;
  if !vendor.is_active {
    return Err(EngineError::InactiveVendor { vendor_id });
  }
  Ok(vendor)
}
