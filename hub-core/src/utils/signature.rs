use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate an HMAC-SHA256 signature over `payload`, hex-encoded.
pub fn sign_payload(secret: &str, payload: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(payload.as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify an HMAC-SHA256 signature using constant-time comparison.
pub fn verify_payload(secret: &str, payload: &str, signature: &str) -> Result<bool, anyhow::Error> {
    let expected_signature = sign_payload(secret, payload)?;

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let secret = "my_secret_key";
        let payload = "merchant_id=m1&amount=100.00";

        let signature = sign_payload(secret, payload).unwrap();
        assert!(!signature.is_empty());

        assert!(verify_payload(secret, payload, &signature).unwrap());
    }

    #[test]
    fn test_tampered_signature_fails() {
        let secret = "my_secret_key";
        let payload = "merchant_id=m1&amount=100.00";

        let signature = sign_payload(secret, payload).unwrap();
        let tampered = format!("a{}", &signature[1..]);

        assert!(!verify_payload(secret, payload, &tampered).unwrap());
    }

    #[test]
    fn test_tampered_payload_fails() {
        let secret = "my_secret_key";
        let payload = "merchant_id=m1&amount=100.00";

        let signature = sign_payload(secret, payload).unwrap();

        assert!(!verify_payload(secret, "merchant_id=m1&amount=999.00", &signature).unwrap());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let payload = "merchant_id=m1&amount=100.00";

        let signature = sign_payload("secret_a", payload).unwrap();

        assert!(!verify_payload("secret_b", payload, &signature).unwrap());
    }
}
