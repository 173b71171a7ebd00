//! Shared fixtures for integration tests.
//!
//! Certificates here are synthetic: their "DER" is a unique byte string and
//! their fields are set directly, the way a container decoder would report
//! them.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ades_signer::adapters::{
    CertificatePool, OfflineTimestampSource, RenderedCanonicalizer, RevocationPool,
};
use ades_signer::domain::crypto::{
    CertificateToken, DigestAlgorithm, DigestBytes, EncryptionAlgorithm, SignatureAlgorithm,
    TokenSignature,
};
use ades_signer::domain::references::SigningCertificateAttribute;
use ades_signer::domain::timestamp::TimestampBinary;
use ades_signer::domain::{
    OcspToken, SignatureEntry, SignatureForm, SignatureIntegrity, SignedDocument,
    UnsignedMaterial, XadesVersion,
};
use ades_signer::services::LevelExtensionController;
use ades_signer::{
    ExtensionParameters, SigningError, SigningResult, TimestampSource, ValidationPolicy,
};
use chrono::{DateTime, TimeZone, Utc};

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn cert(subject: &str, issuer: &str, serial: &str) -> CertificateToken {
    CertificateToken::from_parts(
        format!("{subject}|{issuer}|{serial}").into_bytes(),
        subject,
        issuer,
        serial,
        at(2020, 1, 1),
        at(2030, 1, 1),
    )
}

pub fn root() -> CertificateToken {
    cert("CN=Test Root", "CN=Test Root", "01")
}

pub fn signer_chain(name: &str, serial: &str) -> Vec<CertificateToken> {
    vec![cert(&format!("CN={name}"), "CN=Test Root", serial), root()]
}

pub fn tsa_chain() -> Vec<CertificateToken> {
    vec![cert("CN=Test TSA", "CN=Test Root", "99"), root()]
}

pub fn rsa(digest: DigestAlgorithm, bits: u32) -> TokenSignature {
    TokenSignature::new(SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, digest), Some(bits))
}

fn entry(id: &str, form: SignatureForm, serial: &str, digest: DigestAlgorithm) -> SignatureEntry {
    let chain = signer_chain(id, serial);
    SignatureEntry {
        id: id.to_string(),
        form,
        signed_bytes: format!("<SignedInfo Id=\"{id}\"/>").into_bytes(),
        signature_value: DigestAlgorithm::Sha256.digest(id.as_bytes()).into_vec(),
        signature: rsa(digest, 2048),
        signing_certificate_attributes: vec![SigningCertificateAttribute::for_chain(
            &chain,
            DigestAlgorithm::Sha256,
        )],
        digest_matchers: Vec::new(),
        certificates: chain,
        integrity: SignatureIntegrity::Intact,
        detached_contents: Vec::new(),
        unsigned: UnsignedMaterial::new(),
    }
}

/// CAdES B signature signed with RSA-2048 over `digest`.
pub fn cms_signature(id: &str, serial: &str, digest: DigestAlgorithm) -> SignatureEntry {
    entry(id, SignatureForm::Cms, serial, digest)
}

pub fn xml_signature(id: &str, serial: &str, version: XadesVersion) -> SignatureEntry {
    entry(
        id,
        SignatureForm::Xml {
            xades_version: version,
        },
        serial,
        DigestAlgorithm::Sha256,
    )
}

pub fn document(signatures: Vec<SignatureEntry>) -> SignedDocument {
    SignedDocument::new("fixture", signatures)
}

/// OCSP responses for the given certificate serials (all issued by the test root)
/// and for the TSA.
pub fn revocations_for(serials: &[&str]) -> RevocationPool {
    let mut pool = RevocationPool::new();
    for serial in serials.iter().copied().chain(["99"]) {
        pool.add_ocsp(OcspToken::new(
            format!("ocsp-{serial}").into_bytes(),
            "CN=Test Root",
            serial,
            at(2024, 1, 1),
        ));
    }
    pool
}

/// Offline TSA that reports a signer chain and records every digest it was
/// asked to stamp.
pub struct RecordingTsa {
    inner: OfflineTimestampSource,
    requests: Mutex<Vec<DigestBytes>>,
    failing: bool,
}

impl RecordingTsa {
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            inner: OfflineTimestampSource::at(time)
                .with_tsa_chain(tsa_chain(), rsa(DigestAlgorithm::Sha256, 3072)),
            requests: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    /// Every request fails as if the authority was unreachable.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::at(at(2024, 1, 1))
        }
    }

    pub fn requests(&self) -> Vec<DigestBytes> {
        self.requests.lock().unwrap().clone()
    }
}

impl TimestampSource for RecordingTsa {
    fn request_timestamp(
        &self,
        algorithm: DigestAlgorithm,
        digest: &DigestBytes,
        timeout: Duration,
    ) -> SigningResult<TimestampBinary> {
        self.requests.lock().unwrap().push(digest.clone());
        if self.failing {
            return Err(SigningError::TimestampError(
                "All timestamp servers failed".into(),
            ));
        }
        self.inner.request_timestamp(algorithm, digest, timeout)
    }
}

/// Run the extension controller with an empty certificate pool.
pub fn extend_with(
    policy: &ValidationPolicy,
    document: &SignedDocument,
    params: &ExtensionParameters,
    tsa: &dyn TimestampSource,
    revocations: &RevocationPool,
    now: DateTime<Utc>,
) -> SigningResult<SignedDocument> {
    LevelExtensionController::new(
        policy,
        tsa,
        &CertificatePool::new(),
        revocations,
        Arc::new(RenderedCanonicalizer),
    )
    .at(now)
    .extend(document, params)
}
