//! Signed references a token relies on: signing-certificate references and
//! digest matchers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::crypto::{CertificateToken, DigestAlgorithm, DigestBytes};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerSerial {
    pub issuer: String,
    pub serial_number: String,
}

/// One entry of a signing-certificate attribute (ESSCertIDv2 / xades:Cert).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<DigestBytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_serial: Option<IssuerSerial>,
}

impl CertificateRef {
    /// Reference to `cert` by digest plus issuer/serial.
    #[must_use]
    pub fn to_certificate(cert: &CertificateToken, algorithm: DigestAlgorithm) -> Self {
        Self {
            digest: Some(cert.digest(algorithm)),
            issuer_serial: Some(IssuerSerial {
                issuer: cert.issuer().to_string(),
                serial_number: cert.serial_number().to_string(),
            }),
        }
    }

    #[must_use]
    pub fn digest_algorithm(&self) -> Option<DigestAlgorithm> {
        self.digest.as_ref().map(DigestBytes::algorithm)
    }

    /// Digest must match; issuer/serial is checked only when present.
    #[must_use]
    pub fn matches(&self, cert: &CertificateToken) -> bool {
        let Some(digest) = &self.digest else {
            return false;
        };
        if cert.digest(digest.algorithm()) != *digest {
            return false;
        }
        self.issuer_serial.as_ref().map_or(true, |is| {
            is.issuer == cert.issuer() && is.serial_number == cert.serial_number()
        })
    }

    #[must_use]
    pub fn resolve<'a>(&self, chain: &'a [CertificateToken]) -> Option<&'a CertificateToken> {
        chain.iter().find(|cert| self.matches(cert))
    }
}

/// A signed signing-certificate attribute. The first reference names the
/// signing certificate, later ones its issuers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SigningCertificateAttribute {
    pub refs: Vec<CertificateRef>,
}

impl SigningCertificateAttribute {
    #[must_use]
    pub fn new(refs: Vec<CertificateRef>) -> Self {
        Self { refs }
    }

    /// Attribute referencing every certificate of `chain` (signing certificate first).
    #[must_use]
    pub fn for_chain(chain: &[CertificateToken], algorithm: DigestAlgorithm) -> Self {
        Self {
            refs: chain
                .iter()
                .map(|cert| CertificateRef::to_certificate(cert, algorithm))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DigestMatcherKind {
    Reference,
    SignedProperties,
    KeyInfo,
    Manifest,
    MessageDigest,
    MessageImprint,
}

impl fmt::Display for DigestMatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DigestMatcherKind::Reference => "REFERENCE",
            DigestMatcherKind::SignedProperties => "SIGNED_PROPERTIES",
            DigestMatcherKind::KeyInfo => "KEY_INFO",
            DigestMatcherKind::Manifest => "MANIFEST",
            DigestMatcherKind::MessageDigest => "MESSAGE_DIGEST",
            DigestMatcherKind::MessageImprint => "MESSAGE_IMPRINT",
        };
        f.write_str(name)
    }
}

/// A digest the signature relies on (an XML reference, the CMS message-digest,
/// a timestamp message imprint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: DigestMatcherKind,
    /// Absent when the decoder could not determine it; such matchers are not judged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<DigestAlgorithm>,
    #[serde(default = "default_true")]
    pub data_intact: bool,
}

fn default_true() -> bool {
    true
}

impl DigestMatcher {
    #[must_use]
    pub fn new(kind: DigestMatcherKind, algorithm: DigestAlgorithm) -> Self {
        Self {
            name: None,
            kind,
            algorithm: Some(algorithm),
            data_intact: true,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name if present, otherwise kind and position.
    #[must_use]
    pub fn describe(&self, position: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} #{}", self.kind, position + 1),
        }
    }
}
