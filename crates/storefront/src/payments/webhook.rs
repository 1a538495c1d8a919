//! Webhook signature verification.
//!
//! The signature header looks like `t=1700000000,v1=<hex>[,v1=<hex>...]`.
//! Each `v1` value is HMAC-SHA256 over `"{t}.{body}"` keyed with the
//! endpoint's signing secret. Events older than five minutes are rejected.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;

use super::PaymentError;
use super::types::WebhookEvent;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum age of a signed event, in seconds.
pub const TOLERANCE_SECS: i64 = 300;

/// Verify a webhook body against its signature header.
///
/// `now` is the current Unix time in seconds.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` if the header is malformed, the
/// timestamp is outside the tolerance, or no `v1` signature matches.
pub fn verify_signature(
    body: &str,
    header: &str,
    secret: &SecretString,
    now: i64,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| PaymentError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| PaymentError::InvalidSignature("invalid timestamp".to_string()))?;
    if (now - ts).abs() > TOLERANCE_SECS {
        return Err(PaymentError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let expected = sign(timestamp, body, secret)?;
    if !signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        return Err(PaymentError::InvalidSignature(
            "signature mismatch".to_string(),
        ));
    }

    debug!("Webhook signature verified");
    Ok(())
}

/// Verify and decode a webhook event.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` or `PaymentError::InvalidPayload`.
pub fn parse_event(
    body: &str,
    header: &str,
    secret: &SecretString,
    now: i64,
) -> Result<WebhookEvent, PaymentError> {
    verify_signature(body, header, secret, now)?;
    Ok(serde_json::from_str(body)?)
}

/// Current Unix time in seconds.
///
/// # Errors
///
/// Returns `PaymentError::InvalidSignature` if the clock is before the epoch.
pub fn unix_now() -> Result<i64, PaymentError> {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?
        .as_secs();
    i64::try_from(secs)
        .map_err(|_| PaymentError::InvalidSignature("system time overflow".to_string()))
}

fn sign(timestamp: &str, body: &str, secret: &SecretString) -> Result<String, PaymentError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| PaymentError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1","payment_status":"paid"}}}"#;
    const NOW: i64 = 1_760_000_000;

    fn secret() -> SecretString {
        SecretString::from("whsec_Zk2p9QmR7vXa1LbT")
    }

    fn header_at(ts: i64) -> String {
        let sig = sign(&ts.to_string(), BODY, &secret()).unwrap();
        format!("t={ts},v1={sig}")
    }

    #[test]
    fn test_valid_signature() {
        assert!(verify_signature(BODY, &header_at(NOW), &secret(), NOW).is_ok());
    }

    #[test]
    fn test_any_v1_may_match() {
        let header = format!("t={NOW},v1=deadbeef,{}", header_at(NOW).split_once(',').unwrap().1);
        assert!(verify_signature(BODY, &header, &secret(), NOW).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let err = verify_signature(&BODY.replace("paid", "unpaid"), &header_at(NOW), &secret(), NOW)
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidSignature(msg) if msg == "signature mismatch"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = SecretString::from("whsec_different_key_9");
        assert!(verify_signature(BODY, &header_at(NOW), &other, NOW).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let header = header_at(NOW - TOLERANCE_SECS - 1);
        assert!(verify_signature(BODY, &header, &secret(), NOW).is_err());
        let within = header_at(NOW - TOLERANCE_SECS);
        assert!(verify_signature(BODY, &within, &secret(), NOW).is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        assert!(verify_signature(BODY, "", &secret(), NOW).is_err());
        assert!(verify_signature(BODY, "v1=abc", &secret(), NOW).is_err());
        assert!(verify_signature(BODY, &format!("t={NOW}"), &secret(), NOW).is_err());
        assert!(verify_signature(BODY, "t=soon,v1=abc", &secret(), NOW).is_err());
    }

    #[test]
    fn test_parse_event() {
        let event = parse_event(BODY, &header_at(NOW), &secret(), NOW).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "checkout.session.completed");
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }
}
