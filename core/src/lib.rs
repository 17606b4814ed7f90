// src/lib.rs

//! Order lifecycle engine for a wedding-services marketplace.
//!
//! The engine owns the order aggregate (order, items, payments, review, status
//! history and vendor ledger) and is the only component allowed to mutate it:
//!  - A pure pricing calculator turns a basket into totals, commission and vendor payout.
//!  - A catalog view resolves services, packages and vendors inside the caller's transaction.
//!  - The state machine applies Create/Accept/Reject/Start/Complete/Cancel/Refund as named-stage pipelines.
//!  - The escrow coordinator moves money between held, payable and reversed buckets in lockstep.
//!  - Refund intents leave the engine only after commit, through a retrying dispatch queue.

pub mod catalog;
pub mod error;
pub mod escrow;
pub mod gateway;
pub mod invariants;
pub mod machine;
pub mod model;
pub mod pipeline;
pub mod pricing;
pub mod retry;
pub mod settings;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::error::{EngineError, EngineResult, ErrorKind};
pub use crate::gateway::{
  GatewayError, PaymentGateway, RefundIntent, RefundOutbox, RefundOutcome, RefundQueue, RetryPolicy,
};
pub use crate::machine::{
  BulkResult, BulkSkip, CreateOrderRequest, EditOrderRequest, OrderEngine, RefundRequest, ReviewReply, StatusUpdate,
  TransitionRequest, VendorLedger,
};
pub use crate::model::{
  Actor, ItemKind, LedgerBucket, LedgerEntry, Money, NewReview, Order, OrderAggregate, OrderEvent, OrderItem,
  OrderSnapshot, OrderStatus, Payment, PaymentNotification, PaymentRecordStatus, PaymentStatus, Review, Role,
  StatusHistoryEntry, VendorBalances,
};
pub use crate::pipeline::{Pipeline, PipelineControl, PipelineResult};
pub use crate::pricing::{LineRequest, PriceAuthority, PricedBasket};
pub use crate::retry::retry_once_on_conflict;
pub use crate::settings::{EngineSettings, SettingsHandle};
pub use crate::store::{MemoryStore, OrderFilter, OrderFilterParams, OrderStore, Page, StoreTx};

/*
    Lifecycle of a mutating call:
    1. The HTTP layer authenticates the caller and builds an `Actor`.
    2. `OrderEngine` opens a store transaction bounded by the request deadline.
    3. The operation's pipeline runs over a context that owns the transaction:
       load_for_update -> authorise -> check -> settle -> persist -> verify_invariants.
    4. `Completed` commits; `Stopped` (idempotent replay) and errors roll back.
    5. Refund intents produced by the run are queued only after the commit.
*/
