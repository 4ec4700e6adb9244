//! Webhook payload signing and verification.
//!
//! Payloads are signed with HMAC-SHA256 over the raw request body using the
//! webhook's shared secret. The rendered signature carries an algorithm tag,
//! `sha256=<lowercase hex>`, and travels in the `X-Webhook-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm tag prepended to every rendered signature.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Whether payloads without a configured secret may be accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignaturePolicy {
    pub allow_unsigned: bool,
}

/// Sign a payload with the given secret.
///
/// Returns `sha256=<hex>` where `<hex>` is the lowercase hex digest of
/// HMAC-SHA256(secret, payload).
pub fn sign(payload: &[u8], secret: &str) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest(payload, secret)))
}

fn digest(payload: &[u8], secret: &str) -> Vec<u8> {
    // HMAC accepts keys of any length, including empty ones.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return Vec::new(),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Verify a rendered signature against a payload and secret.
///
/// Returns `false` for an empty secret. The comparison runs over the full
/// length of both strings so neither a prefix nor a length mismatch ends it
/// early.
pub fn verify(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        warn!("signature_verify_empty_secret");
        return false;
    }

    let expected = sign(payload, secret);
    let valid = constant_time_compare(&expected, signature);

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = signature.len(),
            "signature_mismatch"
        );
    }

    valid
}

/// Verify a request according to the receiving side's policy.
///
/// With a non-empty secret this is [`verify`]. Without one, the request is
/// accepted only when the policy allows unsigned payloads.
pub fn verify_with_policy(
    payload: &[u8],
    signature: Option<&str>,
    secret: Option<&str>,
    policy: SignaturePolicy,
) -> bool {
    match secret.filter(|s| !s.is_empty()) {
        Some(secret) => match signature {
            Some(sig) => verify(payload, sig, secret),
            None => {
                warn!("signature_header_missing");
                false
            }
        },
        None => policy.allow_unsigned,
    }
}

/// Constant-time string comparison.
///
/// Walks the longer of the two inputs and folds the length difference into
/// the result instead of returning on it.
fn constant_time_compare(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let len = a.len().max(b.len());

    let mut result = (a.len() ^ b.len()) as u64;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        result |= u64::from(x ^ y);
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_format() {
        let sig = sign(b"{\"hello\":\"world\"}", "s3cr3t");
        assert!(sig.starts_with("sha256="));
        let hex_part = &sig[SIGNATURE_PREFIX.len()..];
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2
        let sig = sign(b"what do ya want for nothing?", "Jefe");
        assert_eq!(
            sig,
            "sha256=5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_round_trip() {
        let payload = br#"{"id":"evt_1","type":"job.completed"}"#;
        let sig = sign(payload, "s3cr3t");
        assert!(verify(payload, &sig, "s3cr3t"));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let payload = b"payload-bytes".to_vec();
        let sig = sign(&payload, "secret");

        let mut tampered = payload.clone();
        tampered[0] ^= 0x01;
        assert!(!verify(&tampered, &sig, "secret"));

        let mut bad_sig = sig.clone().into_bytes();
        let last = bad_sig.len() - 1;
        bad_sig[last] = if bad_sig[last] == b'0' { b'1' } else { b'0' };
        assert!(!verify(&payload, &String::from_utf8(bad_sig).unwrap(), "secret"));

        assert!(!verify(&payload, &sig, "secreT"));
    }

    #[test]
    fn test_verify_empty_secret_denies() {
        let sig = sign(b"data", "");
        assert!(!verify(b"data", &sig, ""));
    }

    #[test]
    fn test_verify_rejects_truncated_and_untagged() {
        let sig = sign(b"data", "key");
        assert!(!verify(b"data", &sig[..sig.len() - 2], "key"));
        assert!(!verify(b"data", &sig[SIGNATURE_PREFIX.len()..], "key"));
        assert!(!verify(b"data", "", "key"));
    }

    #[test]
    fn test_verify_with_policy() {
        let sig = sign(b"body", "key");
        let strict = SignaturePolicy::default();
        let lenient = SignaturePolicy { allow_unsigned: true };

        assert!(verify_with_policy(b"body", Some(&sig), Some("key"), strict));
        assert!(!verify_with_policy(b"body", None, Some("key"), lenient));
        assert!(!verify_with_policy(b"body", None, None, strict));
        assert!(!verify_with_policy(b"body", Some(&sig), Some(""), strict));
        assert!(verify_with_policy(b"body", None, None, lenient));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
        assert!(!constant_time_compare("", "a"));
        assert!(constant_time_compare("", ""));
    }
}
