//! HTTP clients for the two external services the pipeline talks to: the card-payment gateway (transaction
//! verification) and the telecom fulfillment API (bundle dispatch). These are thin wire-level clients; the engine
//! defines the domain-facing adapter traits and the server wires the two together.

mod config;
mod data_objects;
mod error;
mod gateway;
mod provider;

pub use config::{GatewayConfig, ProviderConfig};
pub use data_objects::{
    BundleDispatchRequest,
    DispatchResponse,
    VerifiedTransaction,
    VerifyEnvelope,
};
pub use error::TelcoApiError;
pub use gateway::GatewayApi;
pub use provider::ProviderApi;
