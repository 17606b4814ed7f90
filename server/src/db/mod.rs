// server/src/db/mod.rs

//! Postgres persistence: the engine's store seams over sqlx, and the
//! settings table loader.

pub mod pg_store;
pub mod rows;
pub mod settings;

pub use pg_store::{PgStore, PgTx};
