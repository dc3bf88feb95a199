use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};

use crate::{config::ProviderConfig, BundleDispatchRequest, DispatchResponse, TelcoApiError};

/// Client for the telecom fulfillment API.
#[derive(Clone)]
pub struct ProviderApi {
    config: ProviderConfig,
    client: Arc<Client>,
}

impl ProviderApi {
    pub fn new(config: ProviderConfig) -> Result<Self, TelcoApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| TelcoApiError::Initialization(e.to_string()))?;
        headers.insert("x-api-key", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TelcoApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// Sends one bundle dispatch to the provider. A non-2xx response or timeout surfaces as an error; the caller
    /// decides whether to schedule a retry.
    pub async fn dispatch_bundle(&self, request: &BundleDispatchRequest) -> Result<DispatchResponse, TelcoApiError> {
        let url = format!("{}/orders/dispatch", self.config.base_url);
        debug!(
            "Dispatching {}GB on {} to {} (order {})",
            request.size_gb, request.network, request.phone_number, request.order_id
        );
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| TelcoApiError::RequestError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| TelcoApiError::ResponseError(e.to_string()))?;
            return Err(TelcoApiError::QueryError { status, message });
        }
        let result = response.json::<DispatchResponse>().await.map_err(|e| TelcoApiError::JsonError(e.to_string()))?;
        trace!("Dispatch response for order {}: success={}", request.order_id, result.success);
        Ok(result)
    }
}
