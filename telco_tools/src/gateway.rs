use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};

use crate::{config::GatewayConfig, data_objects::VerifiedTransaction, TelcoApiError, VerifyEnvelope};

const GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Client for the payment gateway's transaction-verification API.
#[derive(Clone)]
pub struct GatewayApi {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl GatewayApi {
    pub fn new(config: GatewayConfig) -> Result<Self, TelcoApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let val = HeaderValue::from_str(&bearer).map_err(|e| TelcoApiError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(GATEWAY_TIMEOUT_SECS))
            .build()
            .map_err(|e| TelcoApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// Asks the gateway for the ground truth on a payment reference.
    pub async fn verify_transaction(&self, reference: &str) -> Result<VerifiedTransaction, TelcoApiError> {
        let url = format!("{}/transaction/verify/{reference}", self.config.base_url);
        trace!("Verifying transaction at {url}");
        let response = self.client.get(url).send().await.map_err(|e| TelcoApiError::RequestError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| TelcoApiError::ResponseError(e.to_string()))?;
            return Err(TelcoApiError::QueryError { status, message });
        }
        let envelope =
            response.json::<VerifyEnvelope>().await.map_err(|e| TelcoApiError::JsonError(e.to_string()))?;
        let data = envelope.data.ok_or_else(|| TelcoApiError::ResponseError(envelope.message.clone()))?;
        debug!("Verified transaction [{reference}]: {} ({} minor units)", data.status, data.amount);
        Ok(data)
    }
}
