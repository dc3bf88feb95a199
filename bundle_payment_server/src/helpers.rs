use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Calculates the hex-encoded HMAC-SHA256 signature of `data` under `secret`. This is the signature scheme the
/// fulfillment provider uses for its webhook callbacks.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(data);
    let result = mac.finalize().into_bytes();
    result.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod test {
    use super::calculate_hmac;

    #[test]
    fn hmac_is_stable_and_key_dependent() {
        let sig = calculate_hmac("top-secret", b"{\"event\":\"order.delivered\"}");
        assert_eq!(sig.len(), 64);
        assert_eq!(sig, calculate_hmac("top-secret", b"{\"event\":\"order.delivered\"}"));
        assert_ne!(sig, calculate_hmac("other-key", b"{\"event\":\"order.delivered\"}"));
    }

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2
        let sig = calculate_hmac("Jefe", b"what do ya want for nothing?");
        assert_eq!(sig, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
    }
}
