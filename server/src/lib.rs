// server/src/lib.rs

//! HTTP front of the order engine: actix-web handlers, the Postgres store and
//! the runtime wiring the binary assembles.

pub mod config;
pub mod db;
pub mod errors;
pub mod services;
pub mod state;
pub mod web;
