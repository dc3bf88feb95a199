//! Bundle Payment Engine
//!
//! The core logic for the data-bundle shop's payment-settlement and fulfillment pipeline. It is server-agnostic.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You should never need to
//!    access the database directly; use the public API instead. The exception is the data types used in the
//!    database, which are defined in the `db_types` module and are public.
//! 2. The engine public API ([`mod@bpe_api`]). This provides the public-facing flows: checkout and wallet
//!    settlement, dispatch to the telecom provider, gateway reconciliation, profit crediting and repair jobs.
//!    Backends implement the traits in [`mod@traits`] to plug in under these APIs, as do the external payment
//!    gateway and fulfillment provider clients.
//! 3. Events ([`mod@events`]). Certain pipeline milestones (order paid, delivered, terminally failed) are
//!    published to subscribers through a small actor framework, so notification side effects stay out of the
//!    transactional flows.
mod bpe_api;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use bpe_api::{
    FulfillmentDispatcher,
    OrderFlowApi,
    ReconcileItem,
    ReconcileReport,
    Reconciler,
    RepairAction,
    RepairApi,
    RepairReport,
    WalletApi,
};
pub use traits::{OrderManagement, PaymentPipelineDatabase, PipelineError, WalletError};
