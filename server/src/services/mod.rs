// server/src/services/mod.rs

pub mod payment_gateway;

pub use payment_gateway::MockPaymentGateway;
