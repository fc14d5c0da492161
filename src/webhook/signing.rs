//! HMAC-SHA256 webhook signatures.
//!
//! Signatures cover the exact body bytes and are rendered as
//! `sha256=<lowercase hex>`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

fn mac(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length
    HmacSha256::new_from_slice(secret.as_bytes()).unwrap_or_else(|_| unreachable!())
}

/// Signature header value for `body`
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = mac(secret);
    mac.update(body);
    format!("{}{}", PREFIX, hex::encode(mac.finalize().into_bytes()))
}

/// Check a signature header against `body` in constant time
pub fn verify(body: &[u8], signature_header: &str, secret: &str) -> Result<(), SignatureError> {
    let hex_part = signature_header
        .trim()
        .strip_prefix(PREFIX)
        .ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(hex_part).map_err(|_| SignatureError::Malformed)?;

    let mut mac = mac(secret);
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Whether a timestamp header (unix seconds) is within `tolerance_secs` of `now`
pub fn is_timestamp_fresh(timestamp_header: &str, now: DateTime<Utc>, tolerance_secs: u64) -> bool {
    match timestamp_header.trim().parse::<i64>() {
        Ok(ts) => now.timestamp().abs_diff(ts) <= tolerance_secs,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_sign_format() {
        let signature = sign(b"{}", "secret");
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), PREFIX.len() + 64);
        assert_eq!(signature, sign(b"{}", "secret"));
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signature = sign(b"what do ya want for nothing?", "Jefe");
        assert_eq!(
            signature,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_accepts_valid() {
        let body = br#"{"event":"visit.checked_in"}"#;
        let signature = sign(body, "secret");
        assert_ok!(verify(body, &signature, "secret"));
    }

    #[test]
    fn test_verify_rejects_tampered_body() {
        let body = br#"{"event":"visit.checked_in"}"#.to_vec();
        let signature = sign(&body, "secret");

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                verify(&tampered, &signature, "secret"),
                Err(SignatureError::Mismatch)
            );
        }
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let signature = sign(b"payload", "secret");
        assert_err!(verify(b"payload", &signature, "other"));
    }

    #[test]
    fn test_verify_rejects_malformed_header() {
        assert_eq!(verify(b"p", "md5=abcd", "s"), Err(SignatureError::Malformed));
        assert_eq!(verify(b"p", "sha256=zz", "s"), Err(SignatureError::Malformed));
        // Valid hex of the wrong length is a mismatch
        assert_eq!(verify(b"p", "sha256=abcd", "s"), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_timestamp_freshness() {
        let now = Utc::now();
        let ts = now.timestamp();
        assert!(is_timestamp_fresh(&ts.to_string(), now, 300));
        assert!(is_timestamp_fresh(&(ts - 300).to_string(), now, 300));
        assert!(!is_timestamp_fresh(&(ts - 301).to_string(), now, 300));
        assert!(!is_timestamp_fresh(&(ts + 301).to_string(), now, 300));
        assert!(!is_timestamp_fresh("yesterday", now, 300));
    }
}
