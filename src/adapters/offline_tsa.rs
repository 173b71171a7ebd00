//! Local timestamp source.
//!
//! Issues RFC 3161 tokens without contacting anybody, for dry runs and tests.
//! Tokens carry a complete `SignerInfo` naming a built-in self-issued
//! authority certificate, but the signature value is a placeholder, so they
//! prove nothing about time to a third party. They are read back through
//! the same parser as tokens from a real authority.

use chrono::{DateTime, SubsecRound, Utc};
use der::asn1::{Any, BitString, UtcTime};
use der::Encode;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::{Certificate, TbsCertificate, Version};

use crate::domain::asn1::encode_tlv;
use crate::domain::constants::{
    ASN1_CONTEXT_0_EXPLICIT_TAG, ASN1_CONTEXT_4_EXPLICIT_TAG, ASN1_INTEGER_TAG, ASN1_NULL,
    ASN1_OCTET_STRING_TAG, ASN1_OID_TAG, ASN1_SEQUENCE_TAG, ASN1_SET_TAG, CONTENT_TYPE_ATTR_OID,
    MESSAGE_DIGEST_ATTR_OID, SIGNING_CERTIFICATE_V2_ATTR_OID, TST_INFO_OID,
};
use crate::domain::crypto::{CertificateToken, DigestAlgorithm, DigestBytes, TokenSignature};
use crate::domain::references::SigningCertificateAttribute;
use crate::domain::timestamp::{
    algorithm_identifier, encode_timestamp_token, TimestampBinary, TstInfo,
};
use crate::infra::error::{SigningError, SigningResult};
use crate::services::timestamp_incorporator::TimestampSource;
use crate::services::timestamp_parser::TimestampParserService;

/// 1.3.6.1.4.1.99999.1, a private-arc policy marking offline tokens.
const OFFLINE_POLICY_OID: &[u8] = &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x86, 0x8d, 0x1f, 0x01];

const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

pub const OFFLINE_TSA_SUBJECT: &str = "CN=Offline Timestamp Authority";

/// Bytes of the built-in authority's RSA modulus (3072 bits).
const OFFLINE_TSA_MODULUS_LEN: usize = 384;

/// 2000-01-01T00:00:00Z and 2049-12-31T23:59:59Z, the `UTCTime` range.
const OFFLINE_TSA_NOT_BEFORE: u64 = 946_684_800;
const OFFLINE_TSA_NOT_AFTER: u64 = 2_524_607_999;

pub struct OfflineTimestampSource {
    fixed_time: Option<DateTime<Utc>>,
    serial: AtomicU64,
    reported_signer: Option<(Vec<CertificateToken>, TokenSignature)>,
}

impl Default for OfflineTimestampSource {
    fn default() -> Self {
        Self {
            fixed_time: None,
            serial: AtomicU64::new(1),
            reported_signer: None,
        }
    }
}

impl OfflineTimestampSource {
    /// Every token is issued at `time` instead of the wall clock.
    #[must_use]
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            fixed_time: Some(time),
            ..Self::default()
        }
    }

    /// Report `certificates` (TSA certificate first) and `signature` as the
    /// token's signer in place of the built-in authority.
    #[must_use]
    pub fn with_tsa_chain(
        mut self,
        certificates: Vec<CertificateToken>,
        signature: TokenSignature,
    ) -> Self {
        self.reported_signer = Some((certificates, signature));
        self
    }

    fn next_serial(&self) -> Vec<u8> {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let bytes = serial.to_be_bytes();
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        let mut minimal = bytes[start..].to_vec();
        if minimal[0] & 0x80 != 0 {
            minimal.insert(0, 0x00);
        }
        minimal
    }
}

impl TimestampSource for OfflineTimestampSource {
    fn request_timestamp(
        &self,
        algorithm: DigestAlgorithm,
        digest: &DigestBytes,
        _timeout: Duration,
    ) -> SigningResult<TimestampBinary> {
        if digest.algorithm() != algorithm {
            return Err(SigningError::InvalidInput(format!(
                "Digest computed with {} but {algorithm} requested",
                digest.algorithm()
            )));
        }
        let gen_time = self.fixed_time.unwrap_or_else(Utc::now).trunc_subsecs(0);
        let info = TstInfo {
            message_imprint: digest.clone(),
            gen_time,
            serial_number: self.next_serial(),
        };
        log::debug!("Offline timestamp issued at {gen_time} for {}", digest.to_hex());

        let tst_info = info.encode_tst_info(OFFLINE_POLICY_OID);
        let authority = authority_certificate()?;
        let authority_der = authority.to_der()?;
        let signer_info = signer_info(&authority, &authority_der, &tst_info)?;
        let der = encode_timestamp_token(
            &tst_info,
            DigestAlgorithm::Sha256,
            &[authority_der],
            &[signer_info],
        );
        let mut binary = TimestampParserService::parse_and_validate(der, digest)?;

        if let Some((chain, signature)) = &self.reported_signer {
            binary.signing_certificate_attributes =
                vec![SigningCertificateAttribute::for_chain(chain, DigestAlgorithm::Sha256)];
            binary.certificates = chain.clone();
            binary.signature = Some(*signature);
        }
        Ok(binary)
    }
}

/// Self-issued RSA certificate of the built-in authority. Only the key
/// length is meaningful; the modulus and signature are filler.
fn authority_certificate() -> SigningResult<Certificate> {
    let name = Name::from_str(OFFLINE_TSA_SUBJECT)?;
    let sha256_with_rsa = AlgorithmIdentifierOwned {
        oid: SHA256_WITH_RSA,
        parameters: Some(Any::null()),
    };

    let mut modulus = vec![0x00, 0xC5];
    modulus.resize(OFFLINE_TSA_MODULUS_LEN + 1, 0x5A);
    let rsa_public_key = encode_tlv(
        ASN1_SEQUENCE_TAG,
        &[
            encode_tlv(ASN1_INTEGER_TAG, &modulus),
            encode_tlv(ASN1_INTEGER_TAG, &[0x01, 0x00, 0x01]),
        ]
        .concat(),
    );

    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[0x01])?,
        signature: sha256_with_rsa.clone(),
        issuer: name.clone(),
        validity: Validity {
            not_before: Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(
                OFFLINE_TSA_NOT_BEFORE,
            ))?),
            not_after: Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(
                OFFLINE_TSA_NOT_AFTER,
            ))?),
        },
        subject: name,
        subject_public_key_info: SubjectPublicKeyInfoOwned {
            algorithm: AlgorithmIdentifierOwned {
                oid: RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            subject_public_key: BitString::from_bytes(&rsa_public_key)?,
        },
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    Ok(Certificate {
        tbs_certificate,
        signature_algorithm: sha256_with_rsa,
        signature: BitString::from_bytes(&[0u8; OFFLINE_TSA_MODULUS_LEN])?,
    })
}

fn attribute(attr_type: &[u8], value: &[u8]) -> Vec<u8> {
    let mut attr = encode_tlv(ASN1_OID_TAG, attr_type);
    attr.extend(encode_tlv(ASN1_SET_TAG, value));
    encode_tlv(ASN1_SEQUENCE_TAG, &attr)
}

/// `SignerInfo` with contentType, messageDigest and signingCertificateV2
/// signed attributes, identifying the signer by issuer and serial.
fn signer_info(
    authority: &Certificate,
    authority_der: &[u8],
    tst_info: &[u8],
) -> SigningResult<Vec<u8>> {
    let tbs = &authority.tbs_certificate;
    let issuer = tbs.issuer.to_der()?;
    let serial = tbs.serial_number.to_der()?;

    let sid = encode_tlv(ASN1_SEQUENCE_TAG, &[issuer.clone(), serial.clone()].concat());
    let general_names = encode_tlv(
        ASN1_SEQUENCE_TAG,
        &encode_tlv(ASN1_CONTEXT_4_EXPLICIT_TAG, &issuer),
    );
    let ess_cert_id_v2 = encode_tlv(
        ASN1_SEQUENCE_TAG,
        &[
            encode_tlv(
                ASN1_OCTET_STRING_TAG,
                DigestAlgorithm::Sha256.digest(authority_der).as_slice(),
            ),
            encode_tlv(ASN1_SEQUENCE_TAG, &[general_names, serial].concat()),
        ]
        .concat(),
    );
    let signing_certificate_v2 = encode_tlv(
        ASN1_SEQUENCE_TAG,
        &encode_tlv(ASN1_SEQUENCE_TAG, &ess_cert_id_v2),
    );

    let attributes = [
        attribute(CONTENT_TYPE_ATTR_OID, &encode_tlv(ASN1_OID_TAG, TST_INFO_OID)),
        attribute(
            MESSAGE_DIGEST_ATTR_OID,
            &encode_tlv(
                ASN1_OCTET_STRING_TAG,
                DigestAlgorithm::Sha256.digest(tst_info).as_slice(),
            ),
        ),
        attribute(SIGNING_CERTIFICATE_V2_ATTR_OID, &signing_certificate_v2),
    ]
    .concat();
    let placeholder = DigestAlgorithm::Sha256.digest(&attributes);
    let signature_value: Vec<u8> = placeholder
        .as_slice()
        .iter()
        .copied()
        .cycle()
        .take(OFFLINE_TSA_MODULUS_LEN)
        .collect();

    let mut signature_alg = encode_tlv(ASN1_OID_TAG, SHA256_WITH_RSA.as_bytes());
    signature_alg.extend_from_slice(ASN1_NULL);

    let mut info = encode_tlv(ASN1_INTEGER_TAG, &[0x01]);
    info.extend(sid);
    info.extend(algorithm_identifier(DigestAlgorithm::Sha256));
    info.extend(encode_tlv(ASN1_CONTEXT_0_EXPLICIT_TAG, &attributes));
    info.extend(encode_tlv(ASN1_SEQUENCE_TAG, &signature_alg));
    info.extend(encode_tlv(ASN1_OCTET_STRING_TAG, &signature_value));
    Ok(encode_tlv(ASN1_SEQUENCE_TAG, &info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tokens_carry_imprint_and_fixed_time() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let tsa = OfflineTimestampSource::at(at);
        let digest = DigestAlgorithm::Sha256.digest(b"covered");
        let binary = tsa
            .request_timestamp(DigestAlgorithm::Sha256, &digest, Duration::from_secs(1))
            .unwrap();
        let info = TstInfo::from_token(&binary.der).unwrap();
        assert_eq!(info.gen_time, at);
        assert_eq!(info.message_imprint, digest);
    }

    #[test]
    fn built_in_authority_is_read_back_from_the_token() {
        let digest = DigestAlgorithm::Sha256.digest(b"covered");
        let binary = OfflineTimestampSource::default()
            .request_timestamp(DigestAlgorithm::Sha256, &digest, Duration::from_secs(1))
            .unwrap();
        let signature = binary.signature.unwrap();
        assert_eq!(signature.key_size_bits, Some(3072));
        assert_eq!(binary.certificates[0].subject(), OFFLINE_TSA_SUBJECT);
        assert!(binary.certificates[0].is_self_signed());
    }

    #[test]
    fn reported_chain_replaces_built_in_authority() {
        let leaf = CertificateToken::from_parts(
            b"tsa".to_vec(),
            "CN=TSA",
            "CN=Root",
            "63",
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        );
        let signature = TokenSignature::new(
            crate::domain::crypto::SignatureAlgorithm::new(
                crate::domain::crypto::EncryptionAlgorithm::Ecdsa,
                DigestAlgorithm::Sha384,
            ),
            Some(384),
        );
        let digest = DigestAlgorithm::Sha256.digest(b"covered");
        let binary = OfflineTimestampSource::default()
            .with_tsa_chain(vec![leaf.clone()], signature)
            .request_timestamp(DigestAlgorithm::Sha256, &digest, Duration::from_secs(1))
            .unwrap();
        assert_eq!(binary.signature, Some(signature));
        assert_eq!(binary.certificates, vec![leaf.clone()]);
        assert!(binary.signing_certificate_attributes[0].refs[0].matches(&leaf));
    }

    #[test]
    fn serials_are_unique_and_positive() {
        let tsa = OfflineTimestampSource::default();
        tsa.serial.store(0x7f, Ordering::Relaxed);
        assert_eq!(tsa.next_serial(), vec![0x7f]);
        assert_eq!(tsa.next_serial(), vec![0x00, 0x80]);
        assert_eq!(tsa.next_serial(), vec![0x00, 0x81]);
    }

    #[test]
    fn mismatched_algorithm_is_rejected() {
        let digest = DigestAlgorithm::Sha1.digest(b"x");
        assert!(OfflineTimestampSource::default()
            .request_timestamp(DigestAlgorithm::Sha256, &digest, Duration::from_secs(1))
            .is_err());
    }
}
