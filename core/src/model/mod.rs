// core/src/model/mod.rs

//! Data structures of the order aggregate and the principals acting on it.

pub mod actor;
pub mod history;
pub mod ledger;
pub mod money;
pub mod order;
pub mod payment;
pub mod review;

pub use actor::{Actor, Role};
pub use history::{HistoryAction, StatusHistoryEntry};
pub use ledger::{LedgerBucket, LedgerEntry, VendorBalances};
pub use money::Money;
pub use order::{ItemKind, Order, OrderAggregate, OrderEvent, OrderItem, OrderSnapshot, OrderStatus, PaymentStatus};
pub use payment::{Payment, PaymentNotification, PaymentRecordStatus};
pub use review::{NewReview, Review};
