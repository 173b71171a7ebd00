//! Timestamps read back from an authority's `TimeStampResp`, with the signer
//! described only by what the token itself carries.

mod common;

use std::time::Duration;

use ades_signer::adapters::offline_tsa::OFFLINE_TSA_SUBJECT;
use ades_signer::domain::asn1::encode_tlv;
use ades_signer::domain::crypto::{
    DigestAlgorithm, DigestBytes, EncryptionAlgorithm, SignatureAlgorithm, TokenSignature,
};
use ades_signer::domain::TimestampBinary;
use ades_signer::infra::error::SigningResult;
use ades_signer::services::TimestampParserService;
use ades_signer::{
    validate, ExtensionParameters, OfflineTimestampSource, SignatureLevel, TimestampSource,
    ValidationPolicy,
};
use common::{at, cms_signature, document, extend_with, revocations_for};

/// Wraps offline tokens in a granted `TimeStampResp` and parses the body the
/// way the HTTP client does.
struct ResponseTsa {
    inner: OfflineTimestampSource,
}

impl ResponseTsa {
    fn at(time: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            inner: OfflineTimestampSource::at(time),
        }
    }
}

impl TimestampSource for ResponseTsa {
    fn request_timestamp(
        &self,
        algorithm: DigestAlgorithm,
        digest: &DigestBytes,
        timeout: Duration,
    ) -> SigningResult<TimestampBinary> {
        let token = self.inner.request_timestamp(algorithm, digest, timeout)?.der;
        let status = encode_tlv(0x30, &encode_tlv(0x02, &[0x00]));
        let body = encode_tlv(0x30, &[status, token].concat());
        TimestampParserService::parse_response(&body, digest)
    }
}

#[test]
fn response_describes_signer_algorithm_key_and_certificate() {
    let digest = DigestAlgorithm::Sha384.digest(b"covered");
    let binary = ResponseTsa::at(at(2024, 3, 1))
        .request_timestamp(DigestAlgorithm::Sha384, &digest, Duration::from_secs(1))
        .unwrap();

    assert_eq!(
        binary.signature,
        Some(TokenSignature::new(
            SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha256),
            Some(3072),
        ))
    );
    assert_eq!(binary.certificates.len(), 1);
    let authority = &binary.certificates[0];
    assert_eq!(authority.subject(), OFFLINE_TSA_SUBJECT);
    assert_eq!(authority.key_size_bits(), Some(3072));

    assert_eq!(binary.signing_certificate_attributes.len(), 1);
    let reference = &binary.signing_certificate_attributes[0].refs[0];
    assert_eq!(reference.digest_algorithm(), Some(DigestAlgorithm::Sha256));
    assert_eq!(reference.resolve(&binary.certificates), Some(authority));
    let issuer_serial = reference.issuer_serial.as_ref().unwrap();
    assert_eq!(issuer_serial.issuer, OFFLINE_TSA_SUBJECT);
    assert_eq!(issuer_serial.serial_number, authority.serial_number());
}

#[test]
fn signature_timestamp_from_response_passes_default_policy() {
    let policy = ValidationPolicy::default();
    let t = extend_with(
        &policy,
        &document(vec![cms_signature("alice", "10", DigestAlgorithm::Sha256)]),
        &ExtensionParameters::new(SignatureLevel::T),
        &ResponseTsa::at(at(2024, 3, 1)),
        &revocations_for(&["10"]),
        at(2024, 3, 1),
    )
    .unwrap();

    let report = validate(&t, &policy, at(2024, 6, 1)).unwrap();
    let signature = &report.signatures[0];
    assert_eq!(signature.timestamps.len(), 1);
    let timestamp = &signature.timestamps[0];
    assert!(timestamp.is_ok(), "{:?}", timestamp.chain.failure());
    let verdict = timestamp.cryptographic.as_ref().unwrap();
    assert!(verdict.acceptable);
    assert_eq!(verdict.key_size_bits, Some(3072));
    assert!(report.success());
}

#[test]
fn archive_chain_from_responses_validates() {
    let policy = ValidationPolicy::default();
    let lta = extend_with(
        &policy,
        &document(vec![cms_signature("alice", "10", DigestAlgorithm::Sha256)]),
        &ExtensionParameters::new(SignatureLevel::Lta).cascading(),
        &ResponseTsa::at(at(2024, 3, 1)),
        &revocations_for(&["10"]),
        at(2024, 3, 1),
    )
    .unwrap();
    assert_eq!(lta.signatures[0].level(), SignatureLevel::Lta);

    let report = validate(&lta, &policy, at(2025, 1, 1)).unwrap();
    assert_eq!(report.signatures[0].timestamps.len(), 2);
    assert!(report.success());
}
