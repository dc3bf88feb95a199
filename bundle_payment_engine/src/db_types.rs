use std::{fmt::Display, str::FromStr};

use bpg_common::Cedis;
use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {0}: {1}")]
pub struct ConversionError(pub &'static str, pub String);

//--------------------------------------    PaymentStatus    ---------------------------------------------------------
/// The payment leg of an order. Fulfillment may only begin once the payment status is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The order has been created, but the payment has not been confirmed against the gateway or wallet yet.
    Pending,
    /// The payment has been verified and the wallet/gateway leg is settled.
    Completed,
    /// The gateway reported the payment as failed.
    Failed,
    /// The customer walked away from the gateway checkout without paying.
    Abandoned,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Completed => write!(f, "Completed"),
            PaymentStatus::Failed => write!(f, "Failed"),
            PaymentStatus::Abandoned => write!(f, "Abandoned"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Abandoned" => Ok(Self::Abandoned),
            s => Err(ConversionError("payment status", s.to_string())),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

//--------------------------------------  FulfillmentStatus  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum FulfillmentStatus {
    /// No dispatch attempt has been made for this order yet.
    Unfulfilled,
    /// A dispatch has been claimed and the provider call is in flight (or awaiting its webhook).
    Processing,
    /// The provider confirmed delivery of the bundle.
    Delivered,
    /// All dispatch attempts have been exhausted.
    Failed,
}

impl FulfillmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FulfillmentStatus::Delivered | FulfillmentStatus::Failed)
    }
}

impl Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FulfillmentStatus::Unfulfilled => write!(f, "Unfulfilled"),
            FulfillmentStatus::Processing => write!(f, "Processing"),
            FulfillmentStatus::Delivered => write!(f, "Delivered"),
            FulfillmentStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for FulfillmentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unfulfilled" => Ok(Self::Unfulfilled),
            "Processing" => Ok(Self::Processing),
            "Delivered" => Ok(Self::Delivered),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError("fulfillment status", s.to_string())),
        }
    }
}

impl From<String> for FulfillmentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid fulfillment status: {value}. But this conversion cannot fail. Defaulting to Unfulfilled");
            FulfillmentStatus::Unfulfilled
        })
    }
}

//--------------------------------------       Network       ---------------------------------------------------------
/// The telecom networks we can deliver bundles to. `AtBigTime` is the AirtelTigo BigTime product line, which the
/// provider treats as a separate network with its own flag on the dispatch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum Network {
    Mtn,
    Telecel,
    AtIshare,
    AtBigTime,
}

impl Network {
    pub fn is_big_time(&self) -> bool {
        matches!(self, Network::AtBigTime)
    }

    /// The identifier the fulfillment provider expects on the wire.
    pub fn provider_code(&self) -> &'static str {
        match self {
            Network::Mtn => "mtn",
            Network::Telecel => "telecel",
            Network::AtIshare => "at-ishare",
            Network::AtBigTime => "at-bigtime",
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mtn => write!(f, "Mtn"),
            Network::Telecel => write!(f, "Telecel"),
            Network::AtIshare => write!(f, "AtIshare"),
            Network::AtBigTime => write!(f, "AtBigTime"),
        }
    }
}

impl FromStr for Network {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mtn" => Ok(Self::Mtn),
            "telecel" | "vodafone" => Ok(Self::Telecel),
            "atishare" | "at-ishare" | "at" => Ok(Self::AtIshare),
            "atbigtime" | "at-bigtime" | "bigtime" => Ok(Self::AtBigTime),
            s => Err(ConversionError("network", s.to_string())),
        }
    }
}

impl From<String> for Network {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid network: {value}. But this conversion cannot fail. Defaulting to Mtn");
            Network::Mtn
        })
    }
}

//--------------------------------------       OrderId       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub shop_id: i64,
    /// The recipient phone number, normalised to local `0XXXXXXXXX` form.
    pub msisdn: String,
    pub network: Network,
    pub volume_mb: i64,
    /// What the shop pays upstream for the bundle.
    pub cost_price: Cedis,
    /// The shop's margin on this order. `total_price = cost_price + margin`.
    pub margin: Cedis,
    pub total_price: Cedis,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    /// The gateway reference for direct payments, or the wallet debit reference.
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub shop_id: i64,
    pub msisdn: String,
    pub network: Network,
    pub volume_mb: i64,
    pub cost_price: Cedis,
    pub margin: Cedis,
    pub payment_reference: Option<String>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, shop_id: i64, msisdn: String, network: Network, volume_mb: i64) -> Self {
        Self {
            order_id,
            shop_id,
            msisdn,
            network,
            volume_mb,
            cost_price: Cedis::default(),
            margin: Cedis::default(),
            payment_reference: None,
        }
    }

    pub fn with_pricing(mut self, cost_price: Cedis, margin: Cedis) -> Self {
        self.cost_price = cost_price;
        self.margin = margin;
        self
    }

    pub fn with_payment_reference(mut self, reference: String) -> Self {
        self.payment_reference = Some(reference);
        self
    }

    pub fn total_price(&self) -> Cedis {
        self.cost_price + self.margin
    }
}

//--------------------------------------   TransactionType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionType {
    Credit,
    Debit,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Credit => write!(f, "Credit"),
            TransactionType::Debit => write!(f, "Debit"),
        }
    }
}

impl From<String> for TransactionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Credit" => Self::Credit,
            "Debit" => Self::Debit,
            _ => {
                error!("Invalid transaction type: {value}. Defaulting to Credit");
                Self::Credit
            },
        }
    }
}

//--------------------------------------  TransactionStatus  ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// The balance mutation was applied. Only `Completed` rows count towards the dedup key.
    Completed,
    /// Kept for audit: the mutation was rejected (usually a failed gateway top-up).
    Failed,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Completed => write!(f, "Completed"),
            TransactionStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Completed" => Self::Completed,
            "Failed" => Self::Failed,
            _ => {
                error!("Invalid transaction status: {value}. Defaulting to Failed");
                Self::Failed
            },
        }
    }
}

//-------------------------------------- WalletTransaction   ---------------------------------------------------------
/// An immutable wallet ledger entry. For a given `(user_id, reference, tx_type)` at most one `Completed` row may
/// exist; this is the dedup key that lets reconciliation re-run credits safely.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub user_id: i64,
    pub tx_type: TransactionType,
    pub amount: Cedis,
    pub reference: String,
    pub balance_before: Cedis,
    pub balance_after: Cedis,
    pub memo: Option<String>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Wallet        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: i64,
    pub balance: Cedis,
    pub total_credited: Cedis,
    pub total_debited: Cedis,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   TrackingStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TrackingStatus {
    /// Created, or awaiting a retry whose `next_retry_at` has not yet passed.
    Pending,
    /// The provider accepted the dispatch; we are waiting for its webhook or a reconciliation pass.
    Sent,
    Delivered,
    /// Terminal: all attempts exhausted.
    Failed,
}

impl TrackingStatus {
    /// An active tracking record is the dedup guard against double fulfillment.
    pub fn is_active(&self) -> bool {
        matches!(self, TrackingStatus::Pending | TrackingStatus::Sent)
    }
}

impl Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingStatus::Pending => write!(f, "Pending"),
            TrackingStatus::Sent => write!(f, "Sent"),
            TrackingStatus::Delivered => write!(f, "Delivered"),
            TrackingStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl From<String> for TrackingStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Sent" => Self::Sent,
            "Delivered" => Self::Delivered,
            "Failed" => Self::Failed,
            _ => {
                error!("Invalid tracking status: {value}. Defaulting to Pending");
                Self::Pending
            },
        }
    }
}

//-------------------------------------- FulfillmentTracking ---------------------------------------------------------
/// The dispatch state for an order. One row per order; the attempt counter and `next_retry_at` make the retry
/// schedule an inspectable state machine rather than an in-process timer.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct FulfillmentTracking {
    pub id: i64,
    pub order_id: OrderId,
    /// Assigned once the provider accepts the dispatch.
    pub provider_ref: Option<String>,
    pub attempts: i64,
    pub max_attempts: i64,
    pub status: TrackingStatus,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    ProfitStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ProfitStatus {
    Pending,
    Credited,
    Withdrawn,
}

impl Display for ProfitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfitStatus::Pending => write!(f, "Pending"),
            ProfitStatus::Credited => write!(f, "Credited"),
            ProfitStatus::Withdrawn => write!(f, "Withdrawn"),
        }
    }
}

impl From<String> for ProfitStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Credited" => Self::Credited,
            "Withdrawn" => Self::Withdrawn,
            _ => {
                error!("Invalid profit status: {value}. Defaulting to Pending");
                Self::Pending
            },
        }
    }
}

//--------------------------------------    ProfitRecord     ---------------------------------------------------------
/// The shop's margin for one delivered order. Unique on `order_id`; the balance snapshot records the shop's
/// available balance before and after the credit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProfitRecord {
    pub id: i64,
    pub shop_id: i64,
    pub order_id: OrderId,
    pub amount: Cedis,
    pub balance_before: Cedis,
    pub balance_after: Cedis,
    pub status: ProfitStatus,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------        Shop         ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    /// Set for sub-agent shops. The parent earns `parent_commission` on every order the sub-agent delivers.
    pub parent_shop_id: Option<i64>,
    pub parent_commission: Cedis,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  WithdrawalStatus   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WithdrawalStatus {
    Requested,
    Approved,
    Rejected,
}

impl Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Requested => write!(f, "Requested"),
            WithdrawalStatus::Approved => write!(f, "Approved"),
            WithdrawalStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl From<String> for WithdrawalStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Requested" => Self::Requested,
            "Approved" => Self::Approved,
            "Rejected" => Self::Rejected,
            _ => {
                error!("Invalid withdrawal status: {value}. Defaulting to Requested");
                Self::Requested
            },
        }
    }
}

//--------------------------------------     Withdrawal      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: i64,
    pub shop_id: i64,
    pub amount: Cedis,
    pub status: WithdrawalStatus,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  WebhookEventRecord ---------------------------------------------------------
/// Append-only audit row for every inbound provider callback, stored verbatim before any action is taken.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub id: i64,
    pub event_type: String,
    pub provider_ref: Option<String>,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

//-------------------------------------- FulfillmentSettings ---------------------------------------------------------
/// The mutable global fulfillment switches, read from the settings store once per operation and passed into the
/// dispatcher/reconciler rather than consulted as ambient state.
#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    pub auto_fulfill_enabled: bool,
    pub auto_networks: Vec<Network>,
    pub max_attempts: i64,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            auto_fulfill_enabled: true,
            auto_networks: vec![Network::Mtn, Network::Telecel, Network::AtIshare, Network::AtBigTime],
            max_attempts: 3,
        }
    }
}

impl FulfillmentSettings {
    pub fn allows(&self, network: Network) -> bool {
        self.auto_fulfill_enabled && self.auto_networks.contains(&network)
    }
}
