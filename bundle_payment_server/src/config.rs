use std::env;

use bpg_common::Secret;
use chrono::Duration;
use log::*;
use telco_tools::{GatewayConfig, ProviderConfig};

const DEFAULT_BPG_HOST: &str = "127.0.0.1";
const DEFAULT_BPG_PORT: u16 = 8380;
const DEFAULT_STALE_ORDER_AGE: Duration = Duration::minutes(10);
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;
const DEFAULT_RECONCILE_ITEM_DELAY_MS: u64 = 250;
const DEFAULT_RETRY_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Inbound provider webhook settings.
    pub webhook: WebhookConfig,
    /// The age a pending order must reach before the reconciler considers it stale.
    pub stale_order_age: Duration,
    /// How often the background reconciliation sweep runs.
    pub reconcile_interval_secs: u64,
    /// Spacing between gateway verification calls inside one sweep.
    pub reconcile_item_delay_ms: u64,
    /// How often the dispatcher sweeps for due retries.
    pub retry_sweep_interval_secs: u64,
    /// Payment gateway API configuration.
    pub gateway: GatewayConfig,
    /// Telecom fulfillment provider API configuration.
    pub provider: ProviderConfig,
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    pub hmac_secret: Secret<String>,
    /// When false, requests with a missing or invalid signature are logged and let through. Only ever disable this
    /// on a development instance.
    pub hmac_checks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BPG_HOST.to_string(),
            port: DEFAULT_BPG_PORT,
            database_url: String::default(),
            webhook: WebhookConfig::default(),
            stale_order_age: DEFAULT_STALE_ORDER_AGE,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            reconcile_item_delay_ms: DEFAULT_RECONCILE_ITEM_DELAY_MS,
            retry_sweep_interval_secs: DEFAULT_RETRY_SWEEP_INTERVAL_SECS,
            gateway: GatewayConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("BPG_HOST").ok().unwrap_or_else(|| DEFAULT_BPG_HOST.into());
        let port = env::var("BPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for BPG_PORT. {e} Using the default, {DEFAULT_BPG_PORT}, instead."
                    );
                    DEFAULT_BPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_BPG_PORT);
        let database_url = env::var("BPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ BPG_DATABASE_URL is not set. Please set it to the URL for the bundle store database.");
            String::default()
        });
        let webhook = WebhookConfig::from_env_or_default();
        let stale_order_age = env::var("BPG_STALE_ORDER_AGE_MINUTES")
            .map_err(|_| {
                info!(
                    "🪛️ BPG_STALE_ORDER_AGE_MINUTES is not set. Using the default value of {} minutes.",
                    DEFAULT_STALE_ORDER_AGE.num_minutes()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::minutes)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for BPG_STALE_ORDER_AGE_MINUTES. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_STALE_ORDER_AGE);
        let reconcile_interval_secs = env_u64("BPG_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL_SECS);
        let reconcile_item_delay_ms = env_u64("BPG_RECONCILE_ITEM_DELAY_MS", DEFAULT_RECONCILE_ITEM_DELAY_MS);
        let retry_sweep_interval_secs = env_u64("BPG_RETRY_SWEEP_INTERVAL_SECS", DEFAULT_RETRY_SWEEP_INTERVAL_SECS);
        let gateway = GatewayConfig::new_from_env_or_default();
        let provider = ProviderConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            webhook,
            stale_order_age,
            reconcile_interval_secs,
            reconcile_item_delay_ms,
            retry_sweep_interval_secs,
            gateway,
            provider,
        }
    }
}

impl WebhookConfig {
    pub fn from_env_or_default() -> Self {
        let hmac_secret = env::var("BPG_WEBHOOK_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ BPG_WEBHOOK_HMAC_SECRET is not set. Please set it to the signing key the fulfillment provider \
                 uses for its callbacks."
            );
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = env::var("BPG_WEBHOOK_HMAC_CHECKS").map(|s| &s != "0" && &s != "false").unwrap_or(true);
        if !hmac_checks {
            warn!(
                "🚨️🚨️🚨️ Webhook HMAC checks are disabled. Invalid signatures will be logged and accepted. DO NOT \
                 run a production instance like this. 🚨️🚨️🚨️"
            );
        }
        Self { hmac_secret, hmac_checks }
    }
}

/// The subset of the configuration the reconcile endpoint and worker need per sweep. Kept small so it can be
/// shared as app data without dragging secrets along.
#[derive(Clone, Copy, Debug)]
pub struct ReconcileOptions {
    pub stale_order_age: Duration,
    pub item_delay: std::time::Duration,
}

impl ReconcileOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            stale_order_age: config.stale_order_age,
            item_delay: std::time::Duration::from_millis(config.reconcile_item_delay_ms),
        }
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}")).ok()
        })
        .unwrap_or(default)
}
