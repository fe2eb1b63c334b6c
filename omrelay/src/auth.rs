//! Shared-secret request authentication.
//!
//! Inbound webhook calls are signed by the gateway as
//!
//! ```text
//! signature = hex(HMAC_SHA256(secret, "{timestamp}.{raw_body}"))
//! ```
//!
//! where `raw_body` is the exact byte sequence received on the wire. The body
//! is never re-serialized before hashing: a JSON round-trip may reorder keys
//! or change whitespace, which would invalidate every honest signature.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Reasons a signed request is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The relay has no shared secret configured, so nothing can be verified.
    #[error("shared secret is not configured")]
    SecretNotConfigured,
    /// The timestamp or signature header is absent.
    #[error("missing signature headers")]
    MissingSignatureHeaders,
    /// The body is not valid UTF-8.
    #[error("body must be UTF-8 JSON")]
    NonUtf8Body,
    /// The computed signature does not match the supplied one.
    #[error("invalid signature")]
    InvalidSignature,
}

/// A signed inbound request, borrowed from the transport layer.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    /// Value of the timestamp header.
    pub timestamp: Option<&'a str>,
    /// Exact received body bytes.
    pub raw_body: &'a [u8],
    /// Value of the signature header.
    pub signature: Option<&'a str>,
}

/// Computes the lowercase hex signature for `timestamp` and `body`.
///
/// # Examples
///
/// ```
/// let sig = omrelay::auth::sign("secret", "1700000000", br#"{"a":1}"#);
/// assert_eq!(sig.len(), 64);
/// ```
#[must_use]
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    hex::encode(digest(secret, timestamp, body))
}

fn digest(secret: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.finalize().into_bytes().to_vec()
}

/// Verifies a signed request against `secret`.
///
/// Returns the body as `&str` on success so the caller can parse it without
/// decoding twice.
///
/// # Errors
///
/// Returns [`AuthError`] describing the first failed check, in this order:
/// secret configured, headers present, body UTF-8, signature match.
pub fn verify<'a>(secret: Option<&str>, request: &SignedRequest<'a>) -> Result<&'a str, AuthError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::SecretNotConfigured)?;
    let (Some(timestamp), Some(signature)) = (request.timestamp, request.signature) else {
        return Err(AuthError::MissingSignatureHeaders);
    };
    if timestamp.is_empty() || signature.is_empty() {
        return Err(AuthError::MissingSignatureHeaders);
    }
    let body = std::str::from_utf8(request.raw_body).map_err(|_| AuthError::NonUtf8Body)?;

    let expected = sign(secret, timestamp, request.raw_body);
    // ct_eq short-circuits only on length, which is public (64 hex chars).
    if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        Ok(body)
    } else {
        #[cfg(feature = "telemetry")]
        tracing::warn!(timestamp, "rejected request with invalid signature");
        Err(AuthError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";
    const TS: &str = "1718000000";
    const BODY: &[u8] = br#"{"openmind_status":200,"openmind_response":{"commands":[]}}"#;

    fn request<'a>(ts: &'a str, body: &'a [u8], sig: &'a str) -> SignedRequest<'a> {
        SignedRequest {
            timestamp: Some(ts),
            raw_body: body,
            signature: Some(sig),
        }
    }

    #[test]
    fn test_known_vector() {
        // hmac.new(b"test-secret", b'1718000000.{"a":1}', sha256).hexdigest()
        assert_eq!(
            sign(SECRET, TS, br#"{"a":1}"#),
            "52c5a81a8890549564b64895fba1a61d9df4f8b7911338370b79b196a18baaf9"
        );
    }

    #[test]
    fn test_valid_signature_accepted() {
        let sig = sign(SECRET, TS, BODY);
        let body = verify(Some(SECRET), &request(TS, BODY, &sig)).unwrap();
        assert_eq!(body.as_bytes(), BODY);
    }

    #[test]
    fn test_signature_over_exact_bytes() {
        // Same JSON, different whitespace: the signature must not carry over.
        let reformatted = br#"{ "openmind_status": 200, "openmind_response": {"commands": []} }"#;
        let sig = sign(SECRET, TS, BODY);
        assert_eq!(
            verify(Some(SECRET), &request(TS, reformatted, &sig)),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_single_byte_mutations_rejected() {
        let sig = sign(SECRET, TS, BODY);

        for i in 0..BODY.len() {
            let mut body = BODY.to_vec();
            body[i] ^= 0x01;
            let result = verify(Some(SECRET), &request(TS, &body, &sig));
            assert!(result.is_err(), "body mutation at {i} accepted");
        }

        for i in 0..TS.len() {
            let mut ts = TS.as_bytes().to_vec();
            ts[i] ^= 0x01;
            let ts = String::from_utf8(ts).unwrap();
            assert_eq!(
                verify(Some(SECRET), &request(&ts, BODY, &sig)),
                Err(AuthError::InvalidSignature)
            );
        }

        for i in 0..sig.len() {
            let mut bad = sig.as_bytes().to_vec();
            bad[i] ^= 0x01;
            let bad = String::from_utf8(bad).unwrap();
            assert_eq!(
                verify(Some(SECRET), &request(TS, BODY, &bad)),
                Err(AuthError::InvalidSignature)
            );
        }
    }

    #[test]
    fn test_uppercase_signature_rejected() {
        let sig = sign(SECRET, TS, BODY).to_uppercase();
        assert_eq!(
            verify(Some(SECRET), &request(TS, BODY, &sig)),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let sig = sign("other", TS, BODY);
        assert_eq!(
            verify(Some(SECRET), &request(TS, BODY, &sig)),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_unconfigured_secret() {
        let sig = sign(SECRET, TS, BODY);
        assert_eq!(
            verify(None, &request(TS, BODY, &sig)),
            Err(AuthError::SecretNotConfigured)
        );
        assert_eq!(
            verify(Some(""), &request(TS, BODY, &sig)),
            Err(AuthError::SecretNotConfigured)
        );
    }

    #[test]
    fn test_missing_headers() {
        let sig = sign(SECRET, TS, BODY);
        let no_ts = SignedRequest {
            timestamp: None,
            raw_body: BODY,
            signature: Some(&sig),
        };
        let no_sig = SignedRequest {
            timestamp: Some(TS),
            raw_body: BODY,
            signature: None,
        };
        assert_eq!(verify(Some(SECRET), &no_ts), Err(AuthError::MissingSignatureHeaders));
        assert_eq!(verify(Some(SECRET), &no_sig), Err(AuthError::MissingSignatureHeaders));
    }

    #[test]
    fn test_non_utf8_body() {
        let body = [0xff, 0xfe, 0x00];
        let sig = sign(SECRET, TS, &body);
        assert_eq!(
            verify(Some(SECRET), &request(TS, &body, &sig)),
            Err(AuthError::NonUtf8Body)
        );
    }
}
