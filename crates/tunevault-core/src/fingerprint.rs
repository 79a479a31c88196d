//! Content fingerprint value object.
//!
//! A [`Fingerprint`] is the content-derived identity of an audio item: an
//! opaque signature produced by an external analyzer plus the analyzed
//! duration. It is immutable once constructed and validated at construction
//! time, so every `Fingerprint` in the system is known-good.
//!
//! Equality (and hashing) is defined on the signature alone; the duration is
//! carried data, not identity.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum accepted signature length.
///
/// Protects against truncated or garbage analyzer output; anything shorter
/// cannot plausibly identify audio content.
pub const MIN_SIGNATURE_LENGTH: usize = 16;

/// Immutable content signature with the analyzed duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    signature: String,
    duration_secs: f64,
}

impl Fingerprint {
    /// Create a validated fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFingerprint`] if the signature is shorter than
    /// [`MIN_SIGNATURE_LENGTH`], and [`Error::Validation`] if the duration is
    /// not positive.
    pub fn new(signature: impl Into<String>, duration_secs: f64) -> Result<Self> {
        let signature = signature.into();

        if signature.len() < MIN_SIGNATURE_LENGTH {
            return Err(Error::InvalidFingerprint(format!(
                "signature length {} is below the minimum of {}",
                signature.len(),
                MIN_SIGNATURE_LENGTH
            )));
        }

        if duration_secs <= 0.0 || !duration_secs.is_finite() {
            return Err(Error::Validation(format!(
                "fingerprint duration must be positive, got {duration_secs}"
            )));
        }

        Ok(Self {
            signature,
            duration_secs,
        })
    }

    /// The opaque content signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Analyzed duration in seconds.
    #[must_use]
    pub const fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    /// Similarity score in `[0.0, 1.0]`; `1.0` iff the signatures are equal.
    ///
    /// Scored as per-position agreement over the longer signature. Note that
    /// the deduplication decision path does not consult this score: duplicate
    /// detection is exact-signature lookup through the repository index, and
    /// this scorer is an extension point for approximate matching.
    #[must_use]
    pub fn similarity(&self, other: &Self) -> f64 {
        if self.signature == other.signature {
            return 1.0;
        }

        let longer = self.signature.len().max(other.signature.len());
        if longer == 0 {
            return 0.0;
        }

        let matching = self
            .signature
            .bytes()
            .zip(other.signature.bytes())
            .filter(|(a, b)| a == b)
            .count();

        matching as f64 / longer as f64
    }
}

impl PartialEq for Fingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
    }
}

impl Eq for Fingerprint {}

impl Hash for Fingerprint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature.hash(state);
    }
}
