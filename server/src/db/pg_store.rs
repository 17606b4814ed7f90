// server/src/db/pg_store.rs

//! `OrderStore` over Postgres.
//!
//! Row locks are `SELECT … FOR UPDATE` on `orders`; every transaction carries a
//! `statement_timeout` equal to the engine's request deadline, so a lock wait
//! longer than that surfaces as `Timeout`. Inserts that can collide use
//! `ON CONFLICT DO NOTHING` so a duplicate never aborts the surrounding
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use order_engine::catalog::{CatalogItem, CatalogView, VendorSnapshot};
use order_engine::store::{OrderFilter, Page};
use order_engine::{
  EngineError, EngineResult, ItemKind, LedgerEntry, Order, OrderAggregate, OrderItem, OrderStore, Payment,
  PaymentRecordStatus, RefundIntent, RefundOutbox, RefundOutcome, Review, StatusHistoryEntry, StoreTx,
};
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::db::rows::{
  convert_all, CatalogRow, HistoryRow, LedgerRow, OrderItemRow, OrderRow, PaymentRow, RefundRow, ReviewRow,
  VendorRow, ORDER_COLUMNS,
};

const ITEM_COLUMNS: &str =
  "id, order_id, item_type, service_id, package_id, item_name, price, quantity, total_price";
const PAYMENT_COLUMNS: &str =
  "id, order_id, amount, method, gateway, gateway_txn_id, status, payload, paid_at, created_at";
const REVIEW_COLUMNS: &str = "id, order_id, customer_id, vendor_id, rating, comment, images, is_highlighted, \
  vendor_reply, replied_at, created_at, updated_at";
const HISTORY_COLUMNS: &str = "id, order_id, action, from_status, to_status, actor_id, actor_role, notes, \
  is_override, idempotency_key, created_at";
const LEDGER_COLUMNS: &str =
  "id, vendor_id, order_id, payment_id, bucket, amount, reason, idempotency_key, created_at";

// SQLSTATEs raised by statement_timeout and by lock waits under NOWAIT/lock_timeout.
const QUERY_CANCELED: &str = "57014";
const LOCK_NOT_AVAILABLE: &str = "55P03";

pub(crate) fn db_error(e: sqlx::Error) -> EngineError {
  match &e {
    sqlx::Error::Database(db) if matches!(db.code().as_deref(), Some(QUERY_CANCELED) | Some(LOCK_NOT_AVAILABLE)) => {
      EngineError::Timeout
    }
    sqlx::Error::PoolTimedOut => EngineError::Timeout,
    _ => EngineError::StorageUnavailable(e.to_string()),
  }
}

async fn fetch_order(conn: &mut PgConnection, order_id: i64, for_update: bool) -> EngineResult<Order> {
  let sql = format!(
    "SELECT {} FROM orders WHERE id = $1 AND deleted_at IS NULL{}",
    ORDER_COLUMNS,
    if for_update { " FOR UPDATE" } else { "" }
  );
  let row: Option<OrderRow> = sqlx::query_as(&sql)
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;
  row
    .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?
    .try_into()
}

/// Everything hanging off an order row, read on the same connection.
async fn load_aggregate(conn: &mut PgConnection, order: Order) -> EngineResult<OrderAggregate> {
  let id = order.id;

  let items: Vec<OrderItemRow> =
    sqlx::query_as(&format!("SELECT {} FROM order_items WHERE order_id = $1 ORDER BY id", ITEM_COLUMNS))
      .bind(id)
      .fetch_all(&mut *conn)
      .await
      .map_err(db_error)?;
  let payments: Vec<PaymentRow> =
    sqlx::query_as(&format!("SELECT {} FROM payments WHERE order_id = $1 ORDER BY id", PAYMENT_COLUMNS))
      .bind(id)
      .fetch_all(&mut *conn)
      .await
      .map_err(db_error)?;
  let review: Option<ReviewRow> = sqlx::query_as(&format!("SELECT {} FROM reviews WHERE order_id = $1", REVIEW_COLUMNS))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error)?;
  let ledger: Vec<LedgerRow> = sqlx::query_as(&format!(
    "SELECT {} FROM vendor_ledger_entries WHERE order_id = $1 ORDER BY id",
    LEDGER_COLUMNS
  ))
  .bind(id)
  .fetch_all(&mut *conn)
  .await
  .map_err(db_error)?;
  let last_transition: Option<HistoryRow> = sqlx::query_as(&format!(
    "SELECT {} FROM order_status_history \
     WHERE order_id = $1 AND action NOT IN ('create', 'edit', 'delete') \
     ORDER BY id DESC LIMIT 1",
    HISTORY_COLUMNS
  ))
  .bind(id)
  .fetch_optional(&mut *conn)
  .await
  .map_err(db_error)?;

  Ok(OrderAggregate {
    order,
    items: convert_all(items)?,
    payments: convert_all(payments)?,
    review: review.map(Review::from),
    ledger: convert_all(ledger)?,
    last_transition: last_transition.map(StatusHistoryEntry::try_from).transpose()?,
  })
}

async fn insert_items(conn: &mut PgConnection, order_id: i64, items: &[OrderItem]) -> EngineResult<()> {
  if items.is_empty() {
    return Ok(());
  }
  let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
    "INSERT INTO order_items (order_id, item_type, service_id, package_id, item_name, price, quantity, total_price) ",
  );
  qb.push_values(items, |mut row, item| {
    row
      .push_bind(order_id)
      .push_bind(item.item_type.as_str())
      .push_bind(item.service_id)
      .push_bind(item.package_id)
      .push_bind(item.item_name.clone())
      .push_bind(item.price.to_decimal())
      .push_bind(item.quantity)
      .push_bind(item.total_price.to_decimal());
  });
  qb.build().execute(&mut *conn).await.map_err(db_error)?;
  Ok(())
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
  qb.push(" WHERE deleted_at IS NULL");
  if let Some(status) = filter.status {
    qb.push(" AND status = ").push_bind(status.as_str());
  }
  if let Some(payment_status) = filter.payment_status {
    qb.push(" AND payment_status = ").push_bind(payment_status.as_str());
  }
  if let Some(vendor_id) = filter.vendor_id {
    qb.push(" AND vendor_id = ").push_bind(vendor_id);
  }
  if let Some(customer_id) = filter.customer_id {
    qb.push(" AND customer_id = ").push_bind(customer_id);
  }
  if let Some(search) = &filter.search {
    qb.push(" AND strpos(order_number, ").push_bind(search.clone()).push(") > 0");
  }
  if let Some(start) = filter.start_date {
    qb.push(" AND (created_at AT TIME ZONE 'UTC')::date >= ").push_bind(start);
  }
  if let Some(end) = filter.end_date {
    qb.push(" AND (created_at AT TIME ZONE 'UTC')::date <= ").push_bind(end);
  }
}

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  /// Read-only snapshot so multi-statement reads see one consistent state.
  async fn read_tx(&self) -> EngineResult<Transaction<'static, Postgres>> {
    let mut tx = self.pool.begin().await.map_err(db_error)?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
      .execute(&mut *tx)
      .await
      .map_err(db_error)?;
    Ok(tx)
  }
}

#[async_trait]
impl RefundOutbox for PgStore {
  async fn pending_refunds(&self) -> EngineResult<Vec<RefundIntent>> {
    let rows: Vec<RefundRow> = sqlx::query_as(
      "SELECT order_id, order_number, amount, reason, idempotency_key FROM refund_outbox \
       WHERE outcome IS NULL ORDER BY id",
    )
    .fetch_all(&self.pool)
    .await
    .map_err(db_error)?;
    convert_all(rows)
  }

  #[instrument(name = "pg::settle_refund", skip(self))]
  async fn settle_refund(&self, idempotency_key: &str, outcome: RefundOutcome) -> EngineResult<()> {
    sqlx::query(
      "UPDATE refund_outbox SET outcome = $2, settled_at = NOW() \
       WHERE idempotency_key = $1 AND outcome IS NULL",
    )
    .bind(idempotency_key)
    .bind(outcome.as_str())
    .execute(&self.pool)
    .await
    .map_err(db_error)?;
    Ok(())
  }
}

#[async_trait]
impl OrderStore for PgStore {
  type Tx = PgTx;

  #[instrument(name = "pg::begin", skip(self))]
  async fn begin(&self, timeout: Duration) -> EngineResult<PgTx> {
    let mut tx = self.pool.begin().await.map_err(db_error)?;
    sqlx::query("SELECT set_config('statement_timeout', $1, true)")
      .bind(format!("{}ms", timeout.as_millis().max(1)))
      .execute(&mut *tx)
      .await
      .map_err(db_error)?;
    Ok(PgTx { tx })
  }

  async fn find_by_id(&self, order_id: i64) -> EngineResult<OrderAggregate> {
    let mut tx = self.read_tx().await?;
    let order = fetch_order(&mut tx, order_id, false).await?;
    load_aggregate(&mut tx, order).await
  }

  async fn find_by_number(&self, order_number: &str) -> EngineResult<OrderAggregate> {
    let mut tx = self.read_tx().await?;
    let row: Option<OrderRow> = sqlx::query_as(&format!(
      "SELECT {} FROM orders WHERE order_number = $1 AND deleted_at IS NULL",
      ORDER_COLUMNS
    ))
    .bind(order_number)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_error)?;
    let order: Order = row
      .ok_or_else(|| EngineError::OrderNotFound(order_number.to_string()))?
      .try_into()?;
    load_aggregate(&mut tx, order).await
  }

  #[instrument(name = "pg::list", skip(self, filter), fields(page = filter.page, limit = filter.limit))]
  async fn list(&self, filter: &OrderFilter) -> EngineResult<Page<Order>> {
    let mut tx = self.read_tx().await?;

    let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM orders");
    push_filters(&mut count, filter);
    let total: i64 = count
      .build_query_scalar::<i64>()
      .fetch_one(&mut *tx)
      .await
      .map_err(db_error)?;

    let mut select: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
    push_filters(&mut select, filter);
    let direction = filter.sort_order.keyword();
    select.push(format!(" ORDER BY {} {}, id {}", filter.sort_by.column(), direction, direction));
    select.push(" LIMIT ").push_bind(i64::from(filter.limit));
    select
      .push(" OFFSET ")
      .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));
    let rows: Vec<OrderRow> = select
      .build_query_as::<OrderRow>()
      .fetch_all(&mut *tx)
      .await
      .map_err(db_error)?;

    Ok(Page {
      items: convert_all(rows)?,
      total: u64::try_from(total).unwrap_or_default(),
      page: filter.page,
      limit: filter.limit,
    })
  }

  async fn history(&self, order_id: i64) -> EngineResult<Vec<StatusHistoryEntry>> {
    let mut tx = self.read_tx().await?;
    fetch_order(&mut tx, order_id, false).await?;
    let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
      "SELECT {} FROM order_status_history WHERE order_id = $1 ORDER BY id",
      HISTORY_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&mut *tx)
    .await
    .map_err(db_error)?;
    convert_all(rows)
  }

  async fn ledger_for_vendor(&self, vendor_id: i64) -> EngineResult<Vec<LedgerEntry>> {
    let rows: Vec<LedgerRow> = sqlx::query_as(&format!(
      "SELECT {} FROM vendor_ledger_entries WHERE vendor_id = $1 ORDER BY id",
      LEDGER_COLUMNS
    ))
    .bind(vendor_id)
    .fetch_all(&self.pool)
    .await
    .map_err(db_error)?;
    convert_all(rows)
  }

  #[instrument(name = "pg::mark_needs_review", skip(self))]
  async fn mark_needs_review(&self, order_id: i64) -> EngineResult<()> {
    let result =
      sqlx::query("UPDATE orders SET needs_review = TRUE, version = version + 1, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
    if result.rows_affected() == 0 {
      return Err(EngineError::OrderNotFound(order_id.to_string()));
    }
    Ok(())
  }

  async fn vendor_profile_for_user(&self, user_id: i64) -> EngineResult<Option<i64>> {
    sqlx::query_scalar("SELECT id FROM vendor_profiles WHERE user_id = $1")
      .bind(user_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(db_error)
  }
}

/// An open Postgres transaction. Dropping it without `commit` rolls back.
pub struct PgTx {
  tx: Transaction<'static, Postgres>,
}

impl PgTx {
  async fn resolve_catalog_row(&mut self, kind: ItemKind, id: i64) -> EngineResult<Option<CatalogItem>> {
    let table = match kind {
      ItemKind::Service => "services",
      ItemKind::Package => "packages",
    };
    let row: Option<CatalogRow> =
      sqlx::query_as(&format!("SELECT id, vendor_id, name, price, is_active FROM {} WHERE id = $1", table))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;
    row.map(|r| r.into_item(kind)).transpose()
  }
}

#[async_trait]
impl CatalogView for PgTx {
  async fn resolve_vendor(&mut self, vendor_id: i64) -> EngineResult<VendorSnapshot> {
    let row: Option<VendorRow> = sqlx::query_as("SELECT id, user_id, is_active FROM vendor_profiles WHERE id = $1")
      .bind(vendor_id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(db_error)?;
    row.map(VendorSnapshot::from).ok_or(EngineError::VendorNotFound(vendor_id))
  }

  async fn resolve_service(&mut self, service_id: i64) -> EngineResult<CatalogItem> {
    self
      .resolve_catalog_row(ItemKind::Service, service_id)
      .await?
      .ok_or(EngineError::ServiceNotFound(service_id))
  }

  async fn resolve_package(&mut self, package_id: i64) -> EngineResult<CatalogItem> {
    self
      .resolve_catalog_row(ItemKind::Package, package_id)
      .await?
      .ok_or(EngineError::PackageNotFound(package_id))
  }
}

#[async_trait]
impl StoreTx for PgTx {
  #[instrument(name = "pg::load_for_update", skip(self))]
  async fn load_for_update(&mut self, order_id: i64) -> EngineResult<OrderAggregate> {
    let order = fetch_order(&mut self.tx, order_id, true).await?;
    debug!(order_id, "Row lock acquired.");
    load_aggregate(&mut self.tx, order).await
  }

  #[instrument(name = "pg::insert_order", skip(self, order, items), fields(number = %order.order_number))]
  async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> EngineResult<i64> {
    let id: Option<i64> = sqlx::query_scalar(
      "INSERT INTO orders (order_number, customer_id, vendor_id, status, total_amount, commission, vendor_amount, \
         commission_rate, event_date, event_location, notes, payment_status, payment_method, payment_reference, \
         is_escrow, escrow_released, escrow_released_at, needs_review, version, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, 1, $19, $20) \
       ON CONFLICT (order_number) DO NOTHING \
       RETURNING id",
    )
    .bind(&order.order_number)
    .bind(order.customer_id)
    .bind(order.vendor_id)
    .bind(order.status.as_str())
    .bind(order.total_amount.to_decimal())
    .bind(order.commission.to_decimal())
    .bind(order.vendor_amount.to_decimal())
    .bind(order.commission_rate)
    .bind(order.event_date)
    .bind(&order.event_location)
    .bind(&order.notes)
    .bind(order.payment_status.as_str())
    .bind(&order.payment_method)
    .bind(&order.payment_reference)
    .bind(order.is_escrow)
    .bind(order.escrow_released)
    .bind(order.escrow_released_at)
    .bind(order.needs_review)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_optional(&mut *self.tx)
    .await
    .map_err(db_error)?;
    let id = id.ok_or_else(|| EngineError::DuplicateOrderNumber(order.order_number.clone()))?;
    insert_items(&mut self.tx, id, items).await?;
    Ok(id)
  }

  async fn update_order(&mut self, order: &Order) -> EngineResult<()> {
    let result = sqlx::query(
      "UPDATE orders SET status = $3, total_amount = $4, commission = $5, vendor_amount = $6, commission_rate = $7, \
         event_date = $8, event_location = $9, notes = $10, payment_status = $11, payment_method = $12, \
         payment_reference = $13, is_escrow = $14, escrow_released = $15, escrow_released_at = $16, \
         needs_review = $17, updated_at = $18, deleted_at = $19, version = version + 1 \
       WHERE id = $1 AND version = $2",
    )
    .bind(order.id)
    .bind(order.version)
    .bind(order.status.as_str())
    .bind(order.total_amount.to_decimal())
    .bind(order.commission.to_decimal())
    .bind(order.vendor_amount.to_decimal())
    .bind(order.commission_rate)
    .bind(order.event_date)
    .bind(&order.event_location)
    .bind(&order.notes)
    .bind(order.payment_status.as_str())
    .bind(&order.payment_method)
    .bind(&order.payment_reference)
    .bind(order.is_escrow)
    .bind(order.escrow_released)
    .bind(order.escrow_released_at)
    .bind(order.needs_review)
    .bind(order.updated_at)
    .bind(order.deleted_at)
    .execute(&mut *self.tx)
    .await
    .map_err(db_error)?;
    if result.rows_affected() == 1 {
      return Ok(());
    }
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
      .bind(order.id)
      .fetch_optional(&mut *self.tx)
      .await
      .map_err(db_error)?;
    match exists {
      Some(_) => Err(EngineError::OptimisticConflict { order_id: order.id }),
      None => Err(EngineError::OrderNotFound(order.id.to_string())),
    }
  }

  async fn replace_items(&mut self, order_id: i64, items: &[OrderItem]) -> EngineResult<()> {
    sqlx::query("DELETE FROM order_items WHERE order_id = $1")
      .bind(order_id)
      .execute(&mut *self.tx)
      .await
      .map_err(db_error)?;
    insert_items(&mut self.tx, order_id, items).await
  }

  async fn append_payment(&mut self, payment: &Payment) -> EngineResult<i64> {
    let id: Option<i64> = sqlx::query_scalar(
      "INSERT INTO payments (order_id, amount, method, gateway, gateway_txn_id, status, payload, paid_at, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
       ON CONFLICT (gateway, gateway_txn_id) DO NOTHING \
       RETURNING id",
    )
    .bind(payment.order_id)
    .bind(payment.amount.to_decimal())
    .bind(&payment.method)
    .bind(&payment.gateway)
    .bind(&payment.gateway_txn_id)
    .bind(payment.status.as_str())
    .bind(Json(&payment.payload))
    .bind(payment.paid_at)
    .bind(payment.created_at)
    .fetch_optional(&mut *self.tx)
    .await
    .map_err(db_error)?;
    id.ok_or_else(|| EngineError::PaymentAlreadyReconciled(payment.gateway_txn_id.clone()))
  }

  async fn update_payment_status(
    &mut self,
    payment_id: i64,
    status: PaymentRecordStatus,
    paid_at: Option<DateTime<Utc>>,
  ) -> EngineResult<()> {
    sqlx::query("UPDATE payments SET status = $2, paid_at = COALESCE($3, paid_at) WHERE id = $1")
      .bind(payment_id)
      .bind(status.as_str())
      .bind(paid_at)
      .execute(&mut *self.tx)
      .await
      .map_err(db_error)?;
    Ok(())
  }

  async fn upsert_review(&mut self, review: &Review) -> EngineResult<i64> {
    sqlx::query_scalar(
      "INSERT INTO reviews (order_id, customer_id, vendor_id, rating, comment, images, is_highlighted, vendor_reply, \
         replied_at, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
       ON CONFLICT (order_id) DO UPDATE SET rating = EXCLUDED.rating, comment = EXCLUDED.comment, \
         images = EXCLUDED.images, is_highlighted = EXCLUDED.is_highlighted, vendor_reply = EXCLUDED.vendor_reply, \
         replied_at = EXCLUDED.replied_at, updated_at = EXCLUDED.updated_at \
       RETURNING id",
    )
    .bind(review.order_id)
    .bind(review.customer_id)
    .bind(review.vendor_id)
    .bind(review.rating)
    .bind(&review.comment)
    .bind(Json(&review.images))
    .bind(review.is_highlighted)
    .bind(&review.vendor_reply)
    .bind(review.replied_at)
    .bind(review.created_at)
    .bind(review.updated_at)
    .fetch_one(&mut *self.tx)
    .await
    .map_err(db_error)
  }

  async fn append_history(&mut self, entry: &StatusHistoryEntry) -> EngineResult<i64> {
    sqlx::query_scalar(
      "INSERT INTO order_status_history (order_id, action, from_status, to_status, actor_id, actor_role, notes, \
         is_override, idempotency_key, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
       RETURNING id",
    )
    .bind(entry.order_id)
    .bind(entry.action.as_str())
    .bind(entry.from_status.map(|s| s.as_str()))
    .bind(entry.to_status.as_str())
    .bind(entry.actor_id)
    .bind(entry.actor_role.as_str())
    .bind(&entry.notes)
    .bind(entry.is_override)
    .bind(&entry.idempotency_key)
    .bind(entry.created_at)
    .fetch_one(&mut *self.tx)
    .await
    .map_err(db_error)
  }

  async fn append_ledger(&mut self, entry: &LedgerEntry) -> EngineResult<bool> {
    let result = sqlx::query(
      "INSERT INTO vendor_ledger_entries (vendor_id, order_id, payment_id, bucket, amount, reason, idempotency_key, \
         created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
       ON CONFLICT (idempotency_key) DO NOTHING",
    )
    .bind(entry.vendor_id)
    .bind(entry.order_id)
    .bind(entry.payment_id)
    .bind(entry.bucket.as_str())
    .bind(entry.amount.to_decimal())
    .bind(&entry.reason)
    .bind(&entry.idempotency_key)
    .bind(entry.created_at)
    .execute(&mut *self.tx)
    .await
    .map_err(db_error)?;
    if result.rows_affected() == 0 {
      debug!(key = %entry.idempotency_key, "Ledger entry already recorded.");
    }
    Ok(result.rows_affected() == 1)
  }

  async fn stage_refund(&mut self, intent: &RefundIntent) -> EngineResult<()> {
    sqlx::query(
      "INSERT INTO refund_outbox (order_id, order_number, amount, reason, idempotency_key) \
       VALUES ($1, $2, $3, $4, $5) \
       ON CONFLICT (idempotency_key) DO NOTHING",
    )
    .bind(intent.order_id)
    .bind(&intent.order_number)
    .bind(intent.amount.to_decimal())
    .bind(&intent.reason)
    .bind(&intent.idempotency_key)
    .execute(&mut *self.tx)
    .await
    .map_err(db_error)?;
    Ok(())
  }

  async fn next_order_sequence(&mut self, day: NaiveDate) -> EngineResult<u32> {
    let value: i32 = sqlx::query_scalar(
      "INSERT INTO order_number_sequences (day, last_value) VALUES ($1, 1) \
       ON CONFLICT (day) DO UPDATE SET last_value = order_number_sequences.last_value + 1 \
       RETURNING last_value",
    )
    .bind(day)
    .fetch_one(&mut *self.tx)
    .await
    .map_err(db_error)?;
    u32::try_from(value).map_err(|_| EngineError::Internal(format!("order sequence for {} is negative", day)))
  }

  #[instrument(name = "pg::commit", skip(self))]
  async fn commit(self) -> EngineResult<()> {
    self.tx.commit().await.map_err(db_error)
  }
}
