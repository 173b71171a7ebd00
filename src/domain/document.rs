//! Logical signed document: one or more signatures with their signed parts
//! and unsigned material, as produced by the container decoder.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::constants::{
    XADES_111_NAMESPACE, XADES_122_NAMESPACE, XADES_132_NAMESPACE, XADES_141_NAMESPACE,
};
use crate::domain::crypto::{CertificateToken, DigestBytes, TokenSignature};
use crate::domain::encoding::base64_bytes;
use crate::domain::level::SignatureLevel;
use crate::domain::references::{DigestMatcher, SigningCertificateAttribute};
use crate::domain::timestamp::TimestampToken;
use crate::domain::unsigned::UnsignedMaterial;
use crate::infra::error::{SigningError, SigningResult};

/// XAdES namespace version of an XML signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum XadesVersion {
    #[serde(rename = "1.1.1")]
    V111,
    #[serde(rename = "1.2.2")]
    V122,
    #[serde(rename = "1.3.2")]
    V132,
    #[serde(rename = "1.4.1")]
    V141,
}

impl XadesVersion {
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        match self {
            XadesVersion::V111 => XADES_111_NAMESPACE,
            XadesVersion::V122 => XADES_122_NAMESPACE,
            XadesVersion::V132 => XADES_132_NAMESPACE,
            XadesVersion::V141 => XADES_141_NAMESPACE,
        }
    }

    /// Namespace of the qualifying properties; 1.4.1 only adds elements on
    /// top of 1.3.2.
    #[must_use]
    pub fn properties_namespace(&self) -> &'static str {
        match self {
            XadesVersion::V141 => XADES_132_NAMESPACE,
            other => other.namespace(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            XadesVersion::V111 => "1.1.1",
            XadesVersion::V122 => "1.2.2",
            XadesVersion::V132 => "1.3.2",
            XadesVersion::V141 => "1.4.1",
        }
    }

    /// 1.1.1 and 1.2.2 predate the archive and validation-data timestamp elements.
    #[must_use]
    pub fn supports_long_term_timestamps(&self) -> bool {
        matches!(self, XadesVersion::V132 | XadesVersion::V141)
    }
}

impl fmt::Display for XadesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "UPPERCASE")]
pub enum SignatureForm {
    Cms,
    Xml { xades_version: XadesVersion },
}

impl SignatureForm {
    #[must_use]
    pub fn profile_name(&self, level: SignatureLevel) -> String {
        match self {
            SignatureForm::Cms => format!("CAdES-BASELINE-{level}"),
            SignatureForm::Xml { .. } => format!("XAdES-BASELINE-{level}"),
        }
    }
}

/// Outcome of the cryptographic verification performed by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureIntegrity {
    Intact,
    Broken(String),
    Unknown,
}

/// A document signed detached from the signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetachedContent {
    Binary {
        name: String,
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
    },
    /// Only the digest is known; enough for B/T/LT but not for archive coverage.
    Digest { name: String, digest: DigestBytes },
}

impl DetachedContent {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            DetachedContent::Binary { name, .. } | DetachedContent::Digest { name, .. } => name,
        }
    }
}

impl fmt::Debug for DetachedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetachedContent::Binary { name, bytes } => {
                write!(f, "DetachedContent::Binary({name}, len={})", bytes.len())
            }
            DetachedContent::Digest { name, digest } => {
                write!(f, "DetachedContent::Digest({name}, {digest:?})")
            }
        }
    }
}

/// Anything judged by the acceptance validator: a signature, or a timestamp
/// treated as a signature-like token.
pub trait SignedToken {
    fn token_id(&self) -> &str;
    fn token_signature(&self) -> Option<&TokenSignature>;
    fn signing_certificate_attributes(&self) -> &[SigningCertificateAttribute];
    fn digest_matchers(&self) -> Vec<DigestMatcher>;
    /// Presented chain, signing certificate first.
    fn certificates(&self) -> &[CertificateToken];

    /// Certificate named by the first signing-certificate reference, falling
    /// back to the head of the presented chain.
    fn signing_certificate(&self) -> Option<&CertificateToken> {
        let chain = self.certificates();
        self.signing_certificate_attributes()
            .first()
            .and_then(|attr| attr.refs.first())
            .and_then(|reference| reference.resolve(chain))
            .or_else(|| chain.first())
    }
}

/// One signature of a document.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub id: String,
    pub form: SignatureForm,
    /// Signed attributes / `SignedInfo` exactly as encoded in the container.
    #[serde(with = "base64_bytes")]
    pub signed_bytes: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub signature_value: Vec<u8>,
    pub signature: TokenSignature,
    #[serde(default)]
    pub signing_certificate_attributes: Vec<SigningCertificateAttribute>,
    #[serde(default)]
    pub digest_matchers: Vec<DigestMatcher>,
    #[serde(default)]
    pub certificates: Vec<CertificateToken>,
    pub integrity: SignatureIntegrity,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detached_contents: Vec<DetachedContent>,
    #[serde(default)]
    pub unsigned: UnsignedMaterial,
}

impl SignatureEntry {
    #[must_use]
    pub fn level(&self) -> SignatureLevel {
        self.unsigned.level()
    }

    #[must_use]
    pub fn find_timestamp(&self, id: &str) -> Option<&TimestampToken> {
        self.unsigned.timestamps().find(|t| t.id() == id)
    }
}

impl SignedToken for SignatureEntry {
    fn token_id(&self) -> &str {
        &self.id
    }
    fn token_signature(&self) -> Option<&TokenSignature> {
        Some(&self.signature)
    }
    fn signing_certificate_attributes(&self) -> &[SigningCertificateAttribute] {
        &self.signing_certificate_attributes
    }
    fn digest_matchers(&self) -> Vec<DigestMatcher> {
        self.digest_matchers.clone()
    }
    fn certificates(&self) -> &[CertificateToken] {
        &self.certificates
    }
}

impl SignedToken for TimestampToken {
    fn token_id(&self) -> &str {
        self.id()
    }
    fn token_signature(&self) -> Option<&TokenSignature> {
        self.signature()
    }
    fn signing_certificate_attributes(&self) -> &[SigningCertificateAttribute] {
        TimestampToken::signing_certificate_attributes(self)
    }
    fn digest_matchers(&self) -> Vec<DigestMatcher> {
        TimestampToken::digest_matchers(self)
    }
    fn certificates(&self) -> &[CertificateToken] {
        TimestampToken::certificates(self)
    }
}

impl fmt::Debug for SignatureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SignatureEntry(id={}, form={:?}, level={}, blocks={})",
            self.id,
            self.form,
            self.level(),
            self.unsigned.blocks().len()
        )
    }
}

/// A decoded document holding one or more signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDocument {
    pub name: String,
    pub signatures: Vec<SignatureEntry>,
}

impl SignedDocument {
    #[must_use]
    pub fn new(name: impl Into<String>, signatures: Vec<SignatureEntry>) -> Self {
        Self {
            name: name.into(),
            signatures,
        }
    }

    #[must_use]
    pub fn signature(&self, id: &str) -> Option<&SignatureEntry> {
        self.signatures.iter().find(|s| s.id == id)
    }

    /// Duplicate ids or malformed unsigned material make a document unusable.
    pub fn check_structure(&self) -> SigningResult<()> {
        for (i, sig) in self.signatures.iter().enumerate() {
            if sig.id.is_empty() {
                return Err(SigningError::StructuralError(format!(
                    "signature #{} has no identifier",
                    i + 1
                )));
            }
            if self.signatures[..i].iter().any(|other| other.id == sig.id) {
                return Err(SigningError::StructuralError(format!(
                    "duplicate signature identifier '{}'",
                    sig.id
                )));
            }
            sig.unsigned.check_structure()?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> SigningResult<Self> {
        let document: SignedDocument = serde_json::from_str(json)?;
        document.check_structure()?;
        Ok(document)
    }

    pub fn to_json(&self) -> SigningResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::{DigestAlgorithm, EncryptionAlgorithm, SignatureAlgorithm};

    fn entry(id: &str) -> SignatureEntry {
        SignatureEntry {
            id: id.to_string(),
            form: SignatureForm::Xml {
                xades_version: XadesVersion::V132,
            },
            signed_bytes: b"<ds:SignedInfo/>".to_vec(),
            signature_value: vec![1, 2, 3],
            signature: TokenSignature::new(
                SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha256),
                Some(2048),
            ),
            signing_certificate_attributes: Vec::new(),
            digest_matchers: Vec::new(),
            certificates: Vec::new(),
            integrity: SignatureIntegrity::Intact,
            detached_contents: Vec::new(),
            unsigned: UnsignedMaterial::new(),
        }
    }

    #[test]
    fn duplicate_ids_are_structural_errors() {
        let doc = SignedDocument::new("doc.xml", vec![entry("a"), entry("a")]);
        assert!(doc.check_structure().unwrap_err().is_structural());
    }

    #[test]
    fn json_roundtrip() {
        let doc = SignedDocument::new("doc.xml", vec![entry("a"), entry("b")]);
        let json = doc.to_json().unwrap();
        assert!(json.contains("\"1.3.2\""));
        assert_eq!(SignedDocument::from_json(&json).unwrap(), doc);
    }

    #[test]
    fn profile_names() {
        assert_eq!(
            SignatureForm::Cms.profile_name(SignatureLevel::Lta),
            "CAdES-BASELINE-LTA"
        );
    }

    #[test]
    fn long_term_timestamps_need_recent_xades() {
        assert!(!XadesVersion::V122.supports_long_term_timestamps());
        assert!(XadesVersion::V141.supports_long_term_timestamps());
    }
}
