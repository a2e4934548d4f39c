//! HMAC-SHA256 signing primitive
//!
//! This is the low-level primitive; the webhook-delivery crate's own
//! `signer` module builds the full set of outbound headers on top of it.

use hex;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute `hex(HMAC-SHA256(secret, message))` over raw bytes. Taking `&[u8]`
/// rather than `&str` keeps this correct for message bodies that aren't
/// valid UTF-8.
pub fn sign_hmac(message: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");

    mac.update(message);
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

/// Constant-time comparison against a freshly computed signature
pub fn verify_hmac(message: &[u8], signature_hex: &str, secret: &str) -> bool {
    let computed = sign_hmac(message, secret);

    computed.as_bytes().len() == signature_hex.as_bytes().len()
        && computed
            .as_bytes()
            .iter()
            .zip(signature_hex.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_signing() {
        let message = br#"1700000000.{"a":1}"#;
        let secret = "k";

        let signature = sign_hmac(message, secret);
        assert!(!signature.is_empty());
        assert_eq!(signature.len(), 64); // SHA256 produces 64 hex characters

        assert!(verify_hmac(message, &signature, secret));
        assert!(!verify_hmac(message, "wrong_signature", secret));
        assert!(!verify_hmac(b"different_message", &signature, secret));
    }

    #[test]
    fn test_hmac_deterministic() {
        let message = b"test_message";
        let secret = "test_secret";

        let sig1 = sign_hmac(message, secret);
        let sig2 = sign_hmac(message, secret);

        assert_eq!(sig1, sig2, "HMAC should be deterministic");
    }
}
