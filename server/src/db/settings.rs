// server/src/db/settings.rs

//! Platform settings live in `system_settings`. They are read once at boot and
//! reloaded whenever the table's trigger emits `settings_changed`.

use order_engine::{EngineSettings, SettingsHandle};
use sqlx::postgres::{PgListener, PgPool};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const SETTINGS_CHANNEL: &str = "settings_changed";
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(5);

pub async fn load_settings(pool: &PgPool) -> sqlx::Result<EngineSettings> {
  let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM system_settings")
    .fetch_all(pool)
    .await?;
  Ok(EngineSettings::from_pairs(
    rows.iter().map(|(key, value)| (key.as_str(), value.as_str())),
  ))
}

/// Keeps `handle` in step with `system_settings`. A dropped listener connection
/// is re-established after a short pause, followed by a full reload so no change
/// made in between is missed.
pub fn spawn_settings_listener(pool: PgPool, handle: SettingsHandle) -> JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      if let Err(e) = listen(&pool, &handle).await {
        warn!(error = %e, "Settings listener failed, retrying.");
      }
      tokio::time::sleep(LISTENER_RETRY_DELAY).await;
    }
  })
}

async fn listen(pool: &PgPool, handle: &SettingsHandle) -> sqlx::Result<()> {
  let mut listener = PgListener::connect_with(pool).await?;
  listener.listen(SETTINGS_CHANNEL).await?;
  info!(channel = SETTINGS_CHANNEL, "Listening for settings changes.");
  handle.replace(load_settings(pool).await?);

  loop {
    let notification = listener.recv().await?;
    debug!(key = notification.payload(), "Settings change notified.");
    handle.replace(load_settings(pool).await?);
  }
}
