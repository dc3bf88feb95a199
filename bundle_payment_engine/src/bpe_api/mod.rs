//! The public API surface of the payment engine.
//!
//! Each API struct wraps a storage backend (and, where relevant, an external adapter) and composes the storage
//! layer's claim transitions into complete flows. The server crate talks to these, never to the storage traits
//! directly.

pub mod dispatcher;
pub mod order_flow_api;
pub mod reconciler;
pub mod repair_api;
pub mod report_objects;
pub mod wallet_api;

pub use dispatcher::FulfillmentDispatcher;
pub use order_flow_api::OrderFlowApi;
pub use reconciler::Reconciler;
pub use repair_api::RepairApi;
pub use report_objects::{ReconcileItem, ReconcileReport, RepairAction, RepairReport};
pub use wallet_api::WalletApi;
