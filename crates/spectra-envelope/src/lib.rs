// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-envelope
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Ed25519-signed submission envelopes (§4.1).
//!
//! Signed message is the ASCII-decimal encoding of `timestamp` immediately
//! concatenated with the raw bytes of `data` — normative, not negotiable.

use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use spectra_error::{ErrorCode, SpectraError};

/// How far a submission's `timestamp` may drift from wall-clock `now`.
pub const TIMESTAMP_WINDOW_SECS: i64 = 5 * 60;

const PUBLIC_KEY_LEN: usize = 32;
const SIGNATURE_LEN: usize = 64;

/// A signed scanner submission, as received over the wire (§6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Envelope {
    /// Opaque scan payload bytes.
    pub data: Vec<u8>,
    /// Base64 encoding of the signer's 32-byte Ed25519 public key.
    pub public_key: String,
    /// Base64 encoding of the 64-byte Ed25519 signature.
    pub signature: String,
    /// Seconds since the Unix epoch at signing time.
    pub timestamp: i64,
}

impl Envelope {
    /// The exact byte sequence that was signed: `ASCII-decimal(timestamp) ∥ data`.
    #[must_use]
    pub fn signed_message(&self) -> Vec<u8> {
        let mut message = self.timestamp.to_string().into_bytes();
        message.extend_from_slice(&self.data);
        message
    }
}

/// Verify an envelope's signature and timestamp freshness.
///
/// Distinguishes failure reasons internally for logging, but per §4.5 step
/// 3 callers at the HTTP boundary must collapse any of these to a single
/// non-discriminating `invalid_signature` response — use
/// [`SpectraError::public_code`] for that collapse.
///
/// # Errors
///
/// Returns one of `EnvelopeMissingField`, `EnvelopeBadTimestamp`,
/// `EnvelopeBadKey`, or `EnvelopeBadSignature`.
pub fn verify(envelope: &Envelope, now: i64) -> Result<(), SpectraError> {
    if envelope.data.is_empty() || envelope.public_key.is_empty() || envelope.signature.is_empty()
    {
        return Err(SpectraError::new(
            ErrorCode::EnvelopeMissingField,
            "envelope is missing a required field",
        ));
    }

    if (now - envelope.timestamp).abs() > TIMESTAMP_WINDOW_SECS {
        return Err(SpectraError::new(
            ErrorCode::EnvelopeBadTimestamp,
            "envelope timestamp is outside the accepted window",
        )
        .with_context("now", now)
        .with_context("timestamp", envelope.timestamp));
    }

    let key_bytes = base64::engine::general_purpose::STANDARD
        .decode(&envelope.public_key)
        .map_err(|_| SpectraError::new(ErrorCode::EnvelopeBadKey, "public key is not valid base64"))?;
    if key_bytes.len() != PUBLIC_KEY_LEN {
        return Err(SpectraError::new(
            ErrorCode::EnvelopeBadKey,
            format!("public key must decode to {PUBLIC_KEY_LEN} bytes"),
        ));
    }
    let key_array: [u8; PUBLIC_KEY_LEN] = key_bytes
        .try_into()
        .expect("length checked above");
    let verifying_key = VerifyingKey::from_bytes(&key_array)
        .map_err(|_| SpectraError::new(ErrorCode::EnvelopeBadKey, "public key is not a valid Ed25519 point"))?;

    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(&envelope.signature)
        .map_err(|_| SpectraError::new(ErrorCode::EnvelopeBadSignature, "signature is not valid base64"))?;
    if sig_bytes.len() != SIGNATURE_LEN {
        return Err(SpectraError::new(
            ErrorCode::EnvelopeBadSignature,
            format!("signature must decode to {SIGNATURE_LEN} bytes"),
        ));
    }
    let sig_array: [u8; SIGNATURE_LEN] = sig_bytes.try_into().expect("length checked above");
    let signature = Signature::from_bytes(&sig_array);

    verifying_key
        .verify(&envelope.signed_message(), &signature)
        .map_err(|_| SpectraError::new(ErrorCode::EnvelopeBadSignature, "signature verification failed"))
}
