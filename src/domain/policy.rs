//! Validation policy: which checks run at which level, and the time-indexed
//! cryptographic acceptability tables.
//!
//! Loaded once per run and never mutated afterwards.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::crypto::{DigestAlgorithm, EncryptionAlgorithm};
use crate::domain::verification::Level;

/// Either half of a signature algorithm, as named in policy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CryptoAlgorithm {
    Digest(DigestAlgorithm),
    Encryption(EncryptionAlgorithm),
}

impl fmt::Display for CryptoAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoAlgorithm::Digest(d) => d.fmt(f),
            CryptoAlgorithm::Encryption(e) => e.fmt(f),
        }
    }
}

impl From<DigestAlgorithm> for CryptoAlgorithm {
    fn from(alg: DigestAlgorithm) -> Self {
        CryptoAlgorithm::Digest(alg)
    }
}

impl From<EncryptionAlgorithm> for CryptoAlgorithm {
    fn from(alg: EncryptionAlgorithm) -> Self {
        CryptoAlgorithm::Encryption(alg)
    }
}

/// One row of the expiration table. `key_size` rows apply to keys of at
/// least that many bits; `expires = None` means never.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmExpiration {
    pub algorithm: CryptoAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinKeySize {
    pub algorithm: EncryptionAlgorithm,
    pub bits: u32,
}

/// When an algorithm stops being trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    Never,
    At(DateTime<Utc>),
}

impl Expiration {
    #[must_use]
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        match self {
            Expiration::Never => false,
            Expiration::At(date) => at >= *date,
        }
    }

    #[must_use]
    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            Expiration::Never => None,
            Expiration::At(date) => Some(*date),
        }
    }
}

/// Why the policy cannot speak for an algorithm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyLookupError {
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(CryptoAlgorithm),
    #[error("public key size of {0} is unknown")]
    KeySizeUnknown(CryptoAlgorithm),
    #[error("{algorithm} key size {bits} is below every size the policy lists")]
    KeySizeNotListed { algorithm: CryptoAlgorithm, bits: u32 },
}

/// Time-indexed acceptability table for one policy bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptographicPolicy {
    pub level: Level,
    pub acceptable_encryption: Vec<EncryptionAlgorithm>,
    pub acceptable_digest: Vec<DigestAlgorithm>,
    #[serde(default)]
    pub min_key_sizes: Vec<MinKeySize>,
    #[serde(default)]
    pub expirations: Vec<AlgorithmExpiration>,
}

impl CryptographicPolicy {
    #[must_use]
    pub fn is_listed(&self, algorithm: CryptoAlgorithm) -> bool {
        match algorithm {
            CryptoAlgorithm::Digest(d) => self.acceptable_digest.contains(&d),
            CryptoAlgorithm::Encryption(e) => self.acceptable_encryption.contains(&e),
        }
    }

    #[must_use]
    pub fn min_key_size(&self, algorithm: EncryptionAlgorithm) -> Option<u32> {
        self.min_key_sizes
            .iter()
            .find(|m| m.algorithm == algorithm)
            .map(|m| m.bits)
    }

    /// Expiration of `algorithm` (with `key_size` for key algorithms).
    ///
    /// Sized rows pick the largest row not above the actual key size.
    pub fn expiration_of(
        &self,
        algorithm: CryptoAlgorithm,
        key_size: Option<u32>,
    ) -> Result<Expiration, PolicyLookupError> {
        let rows: Vec<&AlgorithmExpiration> = self
            .expirations
            .iter()
            .filter(|row| row.algorithm == algorithm)
            .collect();
        if rows.is_empty() {
            return Err(PolicyLookupError::UnsupportedAlgorithm(algorithm));
        }
        let unsized_row = rows.iter().find(|row| row.key_size.is_none());
        let sized: Vec<&&AlgorithmExpiration> =
            rows.iter().filter(|row| row.key_size.is_some()).collect();

        let chosen = if sized.is_empty() {
            unsized_row.copied()
        } else {
            match key_size {
                None => match unsized_row {
                    Some(row) => Some(*row),
                    None => return Err(PolicyLookupError::KeySizeUnknown(algorithm)),
                },
                Some(bits) => sized
                    .iter()
                    .filter(|row| row.key_size.is_some_and(|size| size <= bits))
                    .max_by_key(|row| row.key_size)
                    .map(|row| **row)
                    .or(unsized_row.copied()),
            }
        };
        let row = chosen.ok_or(PolicyLookupError::KeySizeNotListed {
            algorithm,
            bits: key_size.unwrap_or_default(),
        })?;
        Ok(row.expires.map_or(Expiration::Never, Expiration::At))
    }

    /// Listed, large enough, and not expired at `at`.
    #[must_use]
    pub fn is_acceptable(
        &self,
        algorithm: CryptoAlgorithm,
        key_size: Option<u32>,
        at: DateTime<Utc>,
    ) -> bool {
        if !self.is_listed(algorithm) {
            return false;
        }
        if let CryptoAlgorithm::Encryption(enc) = algorithm {
            if let Some(min) = self.min_key_size(enc) {
                if key_size.map_or(true, |bits| bits < min) {
                    return false;
                }
            }
        }
        self.expiration_of(algorithm, key_size)
            .is_ok_and(|exp| !exp.is_expired_at(at))
    }

    /// Replace (or add) the expiration of an unsized algorithm row.
    #[must_use]
    pub fn with_expiration(
        mut self,
        algorithm: impl Into<CryptoAlgorithm>,
        expires: Option<DateTime<Utc>>,
    ) -> Self {
        let algorithm = algorithm.into();
        self.expirations
            .retain(|row| !(row.algorithm == algorithm && row.key_size.is_none()));
        self.expirations.push(AlgorithmExpiration {
            algorithm,
            key_size: None,
            expires,
        });
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

fn date(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single()
}

fn row(
    algorithm: impl Into<CryptoAlgorithm>,
    key_size: Option<u32>,
    expires: Option<DateTime<Utc>>,
) -> AlgorithmExpiration {
    AlgorithmExpiration {
        algorithm: algorithm.into(),
        key_size,
        expires,
    }
}

impl Default for CryptographicPolicy {
    fn default() -> Self {
        use DigestAlgorithm::{Md5, Sha1, Sha224, Sha256, Sha384, Sha512};
        use EncryptionAlgorithm::{Dsa, Ecdsa, Ed25519, Rsa, RsaPss};
        Self {
            level: Level::Fail,
            acceptable_encryption: vec![Rsa, RsaPss, Dsa, Ecdsa, Ed25519],
            acceptable_digest: vec![Md5, Sha1, Sha224, Sha256, Sha384, Sha512],
            min_key_sizes: vec![
                MinKeySize { algorithm: Rsa, bits: 1024 },
                MinKeySize { algorithm: RsaPss, bits: 1024 },
                MinKeySize { algorithm: Dsa, bits: 1024 },
                MinKeySize { algorithm: Ecdsa, bits: 160 },
            ],
            expirations: vec![
                row(Md5, None, date(2004, 8, 1)),
                row(Sha1, None, date(2009, 12, 31)),
                row(Sha224, None, date(2029, 1, 1)),
                row(Sha256, None, None),
                row(Sha384, None, None),
                row(Sha512, None, None),
                row(Rsa, Some(1024), date(2009, 12, 31)),
                row(Rsa, Some(1900), date(2029, 12, 31)),
                row(Rsa, Some(3000), None),
                row(RsaPss, Some(1024), date(2009, 12, 31)),
                row(RsaPss, Some(1900), date(2029, 12, 31)),
                row(RsaPss, Some(3000), None),
                row(Dsa, Some(1024), date(2015, 12, 31)),
                row(Dsa, Some(2048), date(2029, 12, 31)),
                row(Ecdsa, Some(160), date(2012, 12, 31)),
                row(Ecdsa, Some(256), None),
                row(Ed25519, None, None),
            ],
        }
    }
}

/// Checks run for one kind of token; `None` skips the check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_certificate_present: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_certificate_unique: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_certificate_reference_valid: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_certificates_referenced: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_imprint_matches: Option<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cryptographic: Option<CryptographicPolicy>,
    /// Bucket for references to the signing certificate itself; falls back to `cryptographic`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_certificate_cryptographic: Option<CryptographicPolicy>,
    /// Bucket for references to issuer certificates; falls back to `cryptographic`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate_cryptographic: Option<CryptographicPolicy>,
}

impl ContextConstraints {
    #[must_use]
    pub fn signing_certificate_bucket(&self) -> Option<&CryptographicPolicy> {
        self.signing_certificate_cryptographic
            .as_ref()
            .or(self.cryptographic.as_ref())
    }

    #[must_use]
    pub fn ca_certificate_bucket(&self) -> Option<&CryptographicPolicy> {
        self.ca_certificate_cryptographic
            .as_ref()
            .or(self.cryptographic.as_ref())
    }

    /// No checks at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            signing_certificate_present: None,
            signing_certificate_unique: None,
            signing_certificate_reference_valid: None,
            all_certificates_referenced: None,
            message_imprint_matches: None,
            cryptographic: None,
            signing_certificate_cryptographic: None,
            ca_certificate_cryptographic: None,
        }
    }

    fn defaults_for_signature() -> Self {
        Self {
            signing_certificate_present: Some(Level::Fail),
            signing_certificate_unique: Some(Level::Fail),
            signing_certificate_reference_valid: Some(Level::Fail),
            all_certificates_referenced: Some(Level::Warn),
            message_imprint_matches: None,
            cryptographic: Some(CryptographicPolicy::default()),
            signing_certificate_cryptographic: None,
            ca_certificate_cryptographic: None,
        }
    }

    fn defaults_for_timestamp() -> Self {
        Self {
            signing_certificate_present: Some(Level::Warn),
            signing_certificate_unique: Some(Level::Warn),
            signing_certificate_reference_valid: Some(Level::Warn),
            all_certificates_referenced: None,
            message_imprint_matches: Some(Level::Fail),
            cryptographic: Some(CryptographicPolicy::default()),
            signing_certificate_cryptographic: None,
            ca_certificate_cryptographic: None,
        }
    }
}

/// Complete validation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub name: String,
    /// Advisory check that every certificate has revocation data; `None` skips it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_data_available: Option<Level>,
    pub signature: ContextConstraints,
    pub timestamp: ContextConstraints,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            name: "baseline-default".to_string(),
            revocation_data_available: Some(Level::Warn),
            signature: ContextConstraints::defaults_for_signature(),
            timestamp: ContextConstraints::defaults_for_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn sha1_is_time_sensitive() {
        let policy = CryptographicPolicy::default()
            .with_expiration(DigestAlgorithm::Sha1, Some(at(2016)));
        let sha1 = CryptoAlgorithm::Digest(DigestAlgorithm::Sha1);
        assert!(policy.is_acceptable(sha1, None, at(2015)));
        assert!(!policy.is_acceptable(sha1, None, at(2020)));
        assert_eq!(policy.expiration_of(sha1, None), Ok(Expiration::At(at(2016))));
    }

    #[test]
    fn key_size_rows_pick_largest_applicable() {
        let policy = CryptographicPolicy::default();
        let rsa = CryptoAlgorithm::Encryption(EncryptionAlgorithm::Rsa);
        assert_eq!(
            policy.expiration_of(rsa, Some(2048)),
            Ok(Expiration::At(Utc.with_ymd_and_hms(2029, 12, 31, 0, 0, 0).unwrap()))
        );
        assert_eq!(policy.expiration_of(rsa, Some(4096)), Ok(Expiration::Never));
        assert!(matches!(
            policy.expiration_of(rsa, Some(512)),
            Err(PolicyLookupError::KeySizeNotListed { bits: 512, .. })
        ));
        assert!(matches!(
            policy.expiration_of(rsa, None),
            Err(PolicyLookupError::KeySizeUnknown(_))
        ));
    }

    #[test]
    fn unknown_algorithm_is_unsupported() {
        let mut policy = CryptographicPolicy::default();
        policy
            .expirations
            .retain(|row| row.algorithm != CryptoAlgorithm::Digest(DigestAlgorithm::Sha224));
        let sha224 = CryptoAlgorithm::Digest(DigestAlgorithm::Sha224);
        assert_eq!(
            policy.expiration_of(sha224, None),
            Err(PolicyLookupError::UnsupportedAlgorithm(sha224))
        );
        assert!(!policy.is_acceptable(sha224, None, at(2020)));
    }

    #[test]
    fn min_key_size_enforced() {
        let policy = CryptographicPolicy::default();
        let ecdsa = CryptoAlgorithm::Encryption(EncryptionAlgorithm::Ecdsa);
        assert!(!policy.is_acceptable(ecdsa, Some(128), at(2010)));
        assert!(policy.is_acceptable(ecdsa, Some(256), at(2030)));
    }

    #[test]
    fn policy_roundtrips_through_toml() {
        let policy = ValidationPolicy::default();
        let text = toml::to_string(&policy).unwrap();
        let back: ValidationPolicy = toml::from_str(&text).unwrap();
        assert_eq!(back, policy);
    }
}
