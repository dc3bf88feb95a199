//! Adapters between the engine's gateway/provider traits and the HTTP clients in `telco_tools`.
//!
//! The engine only sees the trait verdicts; everything HTTP-shaped (status strings, minor units, error
//! envelopes) is translated here.

use bpg_common::Cedis;
use bundle_payment_engine::traits::{
    DispatchOutcome,
    DispatchRequest,
    FulfillmentProvider,
    GatewayError,
    GatewayPaymentStatus,
    GatewayVerification,
    PaymentGateway,
    ProviderError,
};
use log::*;
use telco_tools::{BundleDispatchRequest, GatewayApi, GatewayConfig, ProviderApi, ProviderConfig, TelcoApiError};

use crate::errors::ServerError;

#[derive(Clone)]
pub struct TelcoGateway {
    api: GatewayApi,
}

impl TelcoGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let api = GatewayApi::new(config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { api })
    }
}

impl PaymentGateway for TelcoGateway {
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError> {
        let tx = self.api.verify_transaction(reference).await.map_err(|e| match e {
            e if e.is_not_found() => GatewayError::UnknownReference(reference.to_string()),
            TelcoApiError::RequestError(m) | TelcoApiError::Initialization(m) => GatewayError::Unavailable(m),
            TelcoApiError::QueryError { status, message } if status >= 500 => {
                GatewayError::Unavailable(format!("{status}: {message}"))
            },
            e => GatewayError::ResponseError(e.to_string()),
        })?;
        let status = match tx.status.to_ascii_lowercase().as_str() {
            "success" => GatewayPaymentStatus::Success,
            "failed" | "reversed" => GatewayPaymentStatus::Failed,
            "abandoned" => GatewayPaymentStatus::Abandoned,
            "pending" | "ongoing" | "processing" | "queued" => GatewayPaymentStatus::Pending,
            other => {
                warn!("🔌️ Gateway returned an unrecognised transaction status '{other}' for [{reference}]");
                return Err(GatewayError::ResponseError(format!("Unrecognised transaction status: {other}")));
            },
        };
        Ok(GatewayVerification {
            status,
            amount: Cedis::from_pesewas(tx.amount),
            message: tx.gateway_response.unwrap_or_default(),
        })
    }
}

#[derive(Clone)]
pub struct TelcoProvider {
    api: ProviderApi,
}

impl TelcoProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ServerError> {
        let api = ProviderApi::new(config).map_err(|e| ServerError::InitializeError(e.to_string()))?;
        Ok(Self { api })
    }
}

impl FulfillmentProvider for TelcoProvider {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, ProviderError> {
        let wire_request = BundleDispatchRequest {
            phone_number: request.phone_number.clone(),
            size_gb: request.size_gb,
            order_id: request.order_id.as_str().to_string(),
            network: request.network.clone(),
            order_type: request.order_type.clone(),
            is_big_time: request.is_big_time,
        };
        let response = self.api.dispatch_bundle(&wire_request).await.map_err(|e| match e {
            TelcoApiError::RequestError(m) | TelcoApiError::Initialization(m) => ProviderError::Unavailable(m),
            TelcoApiError::QueryError { status, message } if status >= 500 => {
                ProviderError::Unavailable(format!("{status}: {message}"))
            },
            TelcoApiError::QueryError { status, message } => {
                ProviderError::Rejected { code: status.to_string(), message }
            },
            e => ProviderError::ResponseError(e.to_string()),
        })?;
        Ok(DispatchOutcome {
            success: response.success,
            reference: response.reference,
            message: response.message,
            error_code: response.error_code,
        })
    }
}
