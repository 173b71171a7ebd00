//! Certificates and revocation data needed to verify a signature offline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::crypto::{CertificateToken, TokenId};
use crate::domain::encoding::base64_bytes;

/// An encoded CRL covering every certificate of one issuer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrlToken {
    #[serde(with = "base64_bytes")]
    der: Vec<u8>,
    issuer: String,
    this_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_update: Option<DateTime<Utc>>,
}

impl CrlToken {
    #[must_use]
    pub fn new(
        der: Vec<u8>,
        issuer: impl Into<String>,
        this_update: DateTime<Utc>,
        next_update: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            der,
            issuer: issuer.into(),
            this_update,
            next_update,
        }
    }
    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }
    #[must_use]
    pub fn this_update(&self) -> DateTime<Utc> {
        self.this_update
    }
    #[must_use]
    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.next_update
    }
    #[must_use]
    pub fn id(&self) -> TokenId {
        TokenId::of(&self.der)
    }
    #[must_use]
    pub fn covers(&self, cert: &CertificateToken) -> bool {
        cert.issuer() == self.issuer
    }
}

impl fmt::Debug for CrlToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CrlToken(issuer={}, id={})", self.issuer, self.id())
    }
}

/// An encoded OCSP response for exactly one certificate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcspToken {
    #[serde(with = "base64_bytes")]
    der: Vec<u8>,
    issuer: String,
    serial_number: String,
    produced_at: DateTime<Utc>,
}

impl OcspToken {
    #[must_use]
    pub fn new(
        der: Vec<u8>,
        issuer: impl Into<String>,
        serial_number: impl Into<String>,
        produced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            der,
            issuer: issuer.into(),
            serial_number: serial_number.into(),
            produced_at,
        }
    }
    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }
    #[must_use]
    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }
    #[must_use]
    pub fn id(&self) -> TokenId {
        TokenId::of(&self.der)
    }
    #[must_use]
    pub fn covers(&self, cert: &CertificateToken) -> bool {
        cert.issuer() == self.issuer && cert.serial_number() == self.serial_number
    }
}

impl fmt::Debug for OcspToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OcspToken(issuer={}, serial={}, id={})",
            self.issuer,
            self.serial_number,
            self.id()
        )
    }
}

/// Revocation evidence returned by a revocation source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationToken {
    Crl(CrlToken),
    Ocsp(OcspToken),
}

/// Certificates, CRLs and OCSP responses with set semantics by content hash.
///
/// Iteration order is by token id, so encodings derived from a
/// `ValidationData` are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ValidationDataRepr", into = "ValidationDataRepr")]
pub struct ValidationData {
    certificates: BTreeMap<TokenId, CertificateToken>,
    crls: BTreeMap<TokenId, CrlToken>,
    ocsps: BTreeMap<TokenId, OcspToken>,
}

impl ValidationData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the certificate was already present.
    pub fn add_certificate(&mut self, cert: CertificateToken) -> bool {
        self.certificates.insert(cert.id(), cert).is_none()
    }

    pub fn add_crl(&mut self, crl: CrlToken) -> bool {
        self.crls.insert(crl.id(), crl).is_none()
    }

    pub fn add_ocsp(&mut self, ocsp: OcspToken) -> bool {
        self.ocsps.insert(ocsp.id(), ocsp).is_none()
    }

    pub fn add_revocation(&mut self, token: RevocationToken) -> bool {
        match token {
            RevocationToken::Crl(crl) => self.add_crl(crl),
            RevocationToken::Ocsp(ocsp) => self.add_ocsp(ocsp),
        }
    }

    pub fn merge(&mut self, other: ValidationData) {
        self.certificates.extend(other.certificates);
        self.crls.extend(other.crls);
        self.ocsps.extend(other.ocsps);
    }

    #[must_use]
    pub fn contains(&self, id: &TokenId) -> bool {
        self.certificates.contains_key(id) || self.crls.contains_key(id) || self.ocsps.contains_key(id)
    }

    /// Whether embedded revocation data already speaks for `cert`.
    #[must_use]
    pub fn has_revocation_for(&self, cert: &CertificateToken) -> bool {
        self.crls.values().any(|crl| crl.covers(cert)) || self.ocsps.values().any(|o| o.covers(cert))
    }

    #[must_use]
    pub fn find_issuer(&self, cert: &CertificateToken) -> Option<&CertificateToken> {
        self.certificates
            .values()
            .find(|candidate| cert.is_issued_by(candidate) && candidate.id() != cert.id())
    }

    pub fn certificates(&self) -> impl Iterator<Item = &CertificateToken> {
        self.certificates.values()
    }
    pub fn crls(&self) -> impl Iterator<Item = &CrlToken> {
        self.crls.values()
    }
    pub fn ocsps(&self) -> impl Iterator<Item = &OcspToken> {
        self.ocsps.values()
    }

    #[must_use]
    pub fn has_revocation_data(&self) -> bool {
        !self.crls.is_empty() || !self.ocsps.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.crls.is_empty() && self.ocsps.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len() + self.crls.len() + self.ocsps.len()
    }
}

#[derive(Serialize, Deserialize, Default)]
struct ValidationDataRepr {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    certificates: Vec<CertificateToken>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    crls: Vec<CrlToken>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    ocsps: Vec<OcspToken>,
}

impl From<ValidationDataRepr> for ValidationData {
    fn from(repr: ValidationDataRepr) -> Self {
        let mut data = ValidationData::new();
        for cert in repr.certificates {
            data.add_certificate(cert);
        }
        for crl in repr.crls {
            data.add_crl(crl);
        }
        for ocsp in repr.ocsps {
            data.add_ocsp(ocsp);
        }
        data
    }
}

impl From<ValidationData> for ValidationDataRepr {
    fn from(data: ValidationData) -> Self {
        ValidationDataRepr {
            certificates: data.certificates.into_values().collect(),
            crls: data.crls.into_values().collect(),
            ocsps: data.ocsps.into_values().collect(),
        }
    }
}
