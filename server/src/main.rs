// server/src/main.rs

use anyhow::Context;
use market_server::config::{AppConfig, LogFormat};
use market_server::db::settings::{load_settings, spawn_settings_listener};
use market_server::db::PgStore;
use market_server::services::MockPaymentGateway;
use market_server::state::AppState;
use market_server::web::configure_app_routes;

use actix_web::{web as actix_data, App, HttpServer};
use order_engine::{OrderEngine, RefundQueue, SettingsHandle};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE); // Span close lines carry durations
  match format {
    LogFormat::Json => builder.json().init(),
    LogFormat::Pretty => builder.init(),
  }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  let app_config = Arc::new(AppConfig::from_env().context("loading configuration")?);
  init_tracing(app_config.log_format);
  tracing::info!(
    bind = %app_config.bind_address(),
    request_timeout = ?app_config.request_timeout,
    run_migrations = app_config.run_migrations,
    "Configuration loaded."
  );

  let db_pool = PgPoolOptions::new()
    .max_connections(app_config.db_max_connections)
    .connect(&app_config.database_url)
    .await
    .context("connecting to the database")?;
  tracing::info!("Successfully connected to the database.");

  if app_config.run_migrations {
    sqlx::migrate!("./migrations")
      .run(&db_pool)
      .await
      .context("running migrations")?;
    tracing::info!("Database migrations applied.");
  }

  let settings = SettingsHandle::new(load_settings(&db_pool).await.context("loading system settings")?);
  let _settings_listener = spawn_settings_listener(db_pool.clone(), settings.clone());

  let store = PgStore::new(db_pool);
  let (refunds, _refund_worker) = RefundQueue::spawn(
    Arc::new(MockPaymentGateway::default()),
    Arc::new(store.clone()),
    app_config.refund_policy(),
  );

  let engine = OrderEngine::new(store, settings)
    .with_refund_queue(refunds)
    .with_request_timeout(app_config.request_timeout);
  let app_state = AppState::new(engine, app_config.as_ref().clone());

  let server_address = app_config.bind_address();
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes::<PgStore>)
  })
  .bind(&server_address)
  .with_context(|| format!("binding {}", server_address))?
  .run()
  .await?;

  Ok(())
}
