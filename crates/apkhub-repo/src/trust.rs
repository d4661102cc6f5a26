//! Manifest signature trust policy
//!
//! Checks the signature block of a fetched manifest against the configured
//! trusted key fingerprints. Verification is a pure function of the manifest
//! and the trust configuration; what to do on failure is up to the caller and
//! its [`SignaturePolicy`].

use apkhub_core::ManifestIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a manifest signature is not trusted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    #[error("manifest is not signed")]
    Unsigned,

    #[error("signature has no public key fingerprint")]
    MissingFingerprint,

    #[error("signature has no signing timestamp")]
    MissingTimestamp,

    #[error("public key {fingerprint} is not in the trusted key list")]
    UntrustedKey { fingerprint: String },
}

/// What callers do with a manifest that fails verification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignaturePolicy {
    /// Reject the manifest
    Strict,
    /// Log a warning and use the manifest anyway
    #[default]
    Lenient,
}

impl SignaturePolicy {
    pub fn is_strict(self) -> bool {
        matches!(self, SignaturePolicy::Strict)
    }
}

/// Verify a manifest's signature block.
///
/// An empty `trusted_keys` list accepts any fingerprint; otherwise the
/// fingerprint must match one entry, ignoring case.
pub fn verify(manifest: &ManifestIndex, trusted_keys: &[String]) -> Result<(), TrustError> {
    let signature = manifest.signature.as_ref().ok_or(TrustError::Unsigned)?;

    let fingerprint = signature.public_key_fingerprint.trim();
    if fingerprint.is_empty() {
        return Err(TrustError::MissingFingerprint);
    }
    if !signature.has_timestamp() {
        return Err(TrustError::MissingTimestamp);
    }

    if !trusted_keys.is_empty()
        && !trusted_keys
            .iter()
            .any(|key| key.trim().eq_ignore_ascii_case(fingerprint))
    {
        return Err(TrustError::UntrustedKey {
            fingerprint: fingerprint.to_string(),
        });
    }

    Ok(())
}
