use log::*;
use bpg_common::Secret;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection details for the payment gateway's verification API.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub secret_key: Secret<String>,
}

impl GatewayConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("BPG_GATEWAY_URL").unwrap_or_else(|_| {
            warn!("BPG_GATEWAY_URL not set, using https://api.paystack.co as default");
            "https://api.paystack.co".to_string()
        });
        let secret_key = Secret::new(std::env::var("BPG_GATEWAY_SECRET_KEY").unwrap_or_else(|_| {
            warn!("BPG_GATEWAY_SECRET_KEY not set, using (probably useless) default");
            "sk_test_00000000000000".to_string()
        }));
        Self { base_url, secret_key }
    }
}

/// Connection details for the telecom fulfillment API.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    /// Hard cap on any single dispatch call. A hung provider must never stall the dispatcher.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self { base_url: String::new(), api_key: Secret::default(), timeout_secs: DEFAULT_TIMEOUT_SECS }
    }
}

impl ProviderConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("BPG_PROVIDER_URL").unwrap_or_else(|_| {
            warn!("BPG_PROVIDER_URL not set, using (probably useless) default");
            "https://telco.example.com".to_string()
        });
        let api_key = Secret::new(std::env::var("BPG_PROVIDER_API_KEY").unwrap_or_else(|_| {
            warn!("BPG_PROVIDER_API_KEY not set, using (probably useless) default");
            "00000000000000".to_string()
        }));
        let timeout_secs = std::env::var("BPG_PROVIDER_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self { base_url, api_key, timeout_secs }
    }
}
