use serde::{Deserialize, Serialize};

/// The gateway's verify endpoint wraps its result in a `{ status, message, data }` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEnvelope {
    pub status: bool,
    pub message: String,
    pub data: Option<VerifiedTransaction>,
}

/// The transaction record inside a verify response. `amount` is in minor units (pesewas).
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedTransaction {
    pub status: String,
    pub reference: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub gateway_response: Option<String>,
}

/// The dispatch request as the telecom API expects it on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDispatchRequest {
    pub phone_number: String,
    pub size_gb: f64,
    pub order_id: String,
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_big_time: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn verify_envelope_parses() {
        let json = r#"{
            "status": true,
            "message": "Verification successful",
            "data": {
                "status": "success",
                "reference": "BP-1001",
                "amount": 500,
                "currency": "GHS",
                "gateway_response": "Approved"
            }
        }"#;
        let envelope: VerifyEnvelope = serde_json::from_str(json).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.status, "success");
        assert_eq!(data.amount, 500);
        assert_eq!(data.currency.as_deref(), Some("GHS"));
    }

    #[test]
    fn verify_envelope_without_data() {
        let json = r#"{ "status": false, "message": "Transaction reference not found" }"#;
        let envelope: VerifyEnvelope = serde_json::from_str(json).unwrap();
        assert!(!envelope.status);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn dispatch_response_parses_minimal() {
        let json = r#"{ "success": true, "reference": "MTN-998" }"#;
        let response: DispatchResponse = serde_json::from_str(json).unwrap();
        assert!(response.success);
        assert_eq!(response.reference.as_deref(), Some("MTN-998"));
        assert!(response.error_code.is_none());
    }
}
