//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header carries `t=<unix>,v1=<hex hmac>`; the
//! signature is HMAC-SHA256 over `"{t}.{raw body}"`. Comparison is
//! constant-time and the timestamp must fall inside the replay window.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Replay window for the signed timestamp.
const TOLERANCE_SECS: i64 = 300;

fn parse_header(header: &str) -> Result<(i64, String), AppError> {
    let mut timestamp: Option<i64> = None;
    let mut v1: Option<String> = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => v1 = Some(value.to_string()),
            _ => {}
        }
    }

    match (timestamp, v1) {
        (Some(t), Some(sig)) if !sig.is_empty() => Ok((t, sig)),
        _ => Err(AppError::InvalidSignature(
            "malformed Stripe-Signature header".to_string(),
        )),
    }
}

/// Verifies the raw webhook body against the endpoint secret.
pub fn verify(payload: &[u8], header: &str, secret: &str) -> Result<(), AppError> {
    let (timestamp, v1) = parse_header(header)?;

    let now = chrono::Utc::now().timestamp();
    if (now - timestamp).abs() > TOLERANCE_SECS {
        return Err(AppError::InvalidSignature(
            "timestamp outside tolerance window".to_string(),
        ));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InvalidSignature("invalid webhook secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if bool::from(expected.as_bytes().ct_eq(v1.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}
