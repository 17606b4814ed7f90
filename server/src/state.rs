// server/src/state.rs
use crate::config::AppConfig;
use crate::errors::Result;
use crate::web::extractors::AuthenticatedActor;
use order_engine::{Actor, OrderEngine, OrderStore, Role};
use std::sync::Arc;

pub struct AppState<S: OrderStore> {
  pub engine: Arc<OrderEngine<S>>,
  pub config: Arc<AppConfig>,
}

// Derived Clone would require `S: Clone`.
impl<S: OrderStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      engine: self.engine.clone(),
      config: self.config.clone(),
    }
  }
}

impl<S: OrderStore> AppState<S> {
  pub fn new(engine: OrderEngine<S>, config: AppConfig) -> Self {
    Self {
      engine: Arc::new(engine),
      config: Arc::new(config),
    }
  }

  /// Fills in the vendor profile of a vendor caller whose gateway did not forward it.
  pub async fn resolve_actor(&self, caller: AuthenticatedActor) -> Result<Actor> {
    let mut actor = caller.0;
    if actor.role == Role::Vendor && actor.vendor_profile_id.is_none() {
      actor.vendor_profile_id = self.engine.store().vendor_profile_for_user(actor.user_id).await?;
    }
    Ok(actor)
  }
}
