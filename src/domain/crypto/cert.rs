use chrono::{DateTime, Utc};
use der::Decode;
use serde::{Deserialize, Serialize};
use std::fmt;

use x509_cert::spki::{ObjectIdentifier, SubjectPublicKeyInfoOwned};

use super::{DigestAlgorithm, DigestBytes};
use crate::domain::asn1::{read_all, read_tlv};
use crate::domain::encoding::base64_bytes;
use crate::infra::error::{SigningError, SigningResult};

/// Content-hash identifier (hex SHA-256 of the encoded token).
///
/// Gives validation data its set semantics: two tokens with the same bytes are
/// the same token wherever they were found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    #[must_use]
    pub fn of(encoded: &[u8]) -> Self {
        Self(DigestAlgorithm::Sha256.digest(encoded).to_hex())
    }
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell tokens apart in logs and reports.
        f.write_str(&self.0[..self.0.len().min(16)])
    }
}

/// X.509 certificate with the handful of fields chain building needs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateToken {
    #[serde(with = "base64_bytes")]
    der: Vec<u8>,
    subject: String,
    issuer: String,
    serial_number: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    /// Public key length read from the SubjectPublicKeyInfo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_size_bits: Option<u32>,
}

impl CertificateToken {
    /// Parse a DER certificate.
    pub fn from_der(der: Vec<u8>) -> SigningResult<Self> {
        let cert = x509_cert::Certificate::from_der(&der)
            .map_err(|e| SigningError::InvalidCertificate(format!("DER decode failed: {e}")))?;
        let tbs = &cert.tbs_certificate;
        let not_before = unix_to_utc(tbs.validity.not_before.to_unix_duration())?;
        let not_after = unix_to_utc(tbs.validity.not_after.to_unix_duration())?;
        Ok(Self {
            subject: tbs.subject.to_string(),
            issuer: tbs.issuer.to_string(),
            serial_number: hex::encode(tbs.serial_number.as_bytes()),
            not_before,
            not_after,
            key_size_bits: public_key_bits(&tbs.subject_public_key_info),
            der,
        })
    }

    /// Build from already-decoded fields (the decoding collaborator did the parsing).
    #[must_use]
    pub fn from_parts(
        der: Vec<u8>,
        subject: impl Into<String>,
        issuer: impl Into<String>,
        serial_number: impl Into<String>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Self {
        Self {
            der,
            subject: subject.into(),
            issuer: issuer.into(),
            serial_number: serial_number.into(),
            not_before,
            not_after,
            key_size_bits: None,
        }
    }

    #[must_use]
    pub fn with_key_size(mut self, bits: u32) -> Self {
        self.key_size_bits = Some(bits);
        self
    }

    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
    #[must_use]
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }
    #[must_use]
    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    #[must_use]
    pub fn key_size_bits(&self) -> Option<u32> {
        self.key_size_bits
    }

    #[must_use]
    pub fn id(&self) -> TokenId {
        TokenId::of(&self.der)
    }

    #[must_use]
    pub fn digest(&self, algorithm: DigestAlgorithm) -> DigestBytes {
        algorithm.digest(&self.der)
    }

    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    #[must_use]
    pub fn is_issued_by(&self, candidate: &CertificateToken) -> bool {
        self.issuer == candidate.subject
    }

    #[must_use]
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

impl fmt::Debug for CertificateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CertificateToken(subject={}, id={}, len={})",
            self.subject,
            self.id(),
            self.der.len()
        )
    }
}

/// Key length for the key types the cryptographic policy knows about.
fn public_key_bits(spki: &SubjectPublicKeyInfoOwned) -> Option<u32> {
    let key = spki.subject_public_key.raw_bytes();
    match spki.algorithm.oid.to_string().as_str() {
        // RSAPublicKey ::= SEQUENCE { modulus INTEGER, publicExponent INTEGER }
        "1.2.840.113549.1.1.1" | "1.2.840.113549.1.1.10" => {
            let (sequence, _) = read_tlv(key).ok()?;
            let modulus = sequence.children().ok()?.into_iter().next()?;
            integer_bits(modulus.content)
        }
        "1.2.840.10045.2.1" => {
            let curve = spki.algorithm.parameters.as_ref()?;
            match ObjectIdentifier::from_bytes(curve.value()).ok()?.to_string().as_str() {
                "1.2.840.10045.3.1.7" => Some(256),
                "1.3.132.0.34" => Some(384),
                "1.3.132.0.35" => Some(521),
                _ => None,
            }
        }
        "1.3.101.112" => Some(256),
        // DSA keys are sized by the prime p of the domain parameters
        "1.2.840.10040.4.1" => {
            let params = spki.algorithm.parameters.as_ref()?;
            let p = read_all(params.value()).ok()?.into_iter().next()?;
            integer_bits(p.content)
        }
        _ => None,
    }
}

/// Significant bits of an unsigned big-endian INTEGER body.
fn integer_bits(content: &[u8]) -> Option<u32> {
    let start = content.iter().position(|b| *b != 0)?;
    let significant = &content[start..];
    let bytes = u32::try_from(significant.len()).ok()?;
    Some(bytes * 8 - significant[0].leading_zeros())
}

fn unix_to_utc(duration: std::time::Duration) -> SigningResult<DateTime<Utc>> {
    let secs = i64::try_from(duration.as_secs())
        .map_err(|_| SigningError::InvalidCertificate("validity out of range".into()))?;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| SigningError::InvalidCertificate("validity out of range".into()))
}
