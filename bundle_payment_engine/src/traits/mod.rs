//! The behaviour contracts for pipeline storage backends and the external collaborators.
//!
//! Storage backends implement [`OrderManagement`] and [`PaymentPipelineDatabase`]. The external payment gateway and
//! telecom fulfillment provider are abstracted behind [`PaymentGateway`] and [`FulfillmentProvider`] so that the
//! dispatcher and reconciler can be driven against mocks in tests.

mod adapters;
mod data_objects;
mod storage;

pub use adapters::{
    DispatchOutcome,
    DispatchRequest,
    FulfillmentProvider,
    GatewayError,
    GatewayPaymentStatus,
    GatewayVerification,
    PaymentGateway,
    ProviderError,
};
pub use data_objects::OrderQueryFilter;
pub use storage::{OrderManagement, PaymentPipelineDatabase, PipelineError, WalletError};
