//! RFC3161 timestamp token domain type.
//!
//! A token is owned by the unsigned material once incorporated and never
//! changes afterwards. `issued_at` and the message imprint are read from the
//! token's `TSTInfo`, never supplied by the caller.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::asn1::{encode_tlv, read_tlv, Tlv};
use crate::domain::constants::{
    ASN1_CONTEXT_0_EXPLICIT_TAG, ASN1_GENERALIZED_TIME_TAG, ASN1_INTEGER_TAG, ASN1_NULL,
    ASN1_OCTET_STRING_TAG, ASN1_OID_TAG, ASN1_SEQUENCE_TAG, ASN1_SET_TAG, PKCS7_SIGNED_DATA_OID,
    TST_INFO_OID,
};
use crate::domain::crypto::{CertificateToken, DigestAlgorithm, DigestBytes, TokenSignature};
use crate::domain::encoding::base64_bytes;
use crate::domain::references::{DigestMatcher, DigestMatcherKind, SigningCertificateAttribute};
use crate::infra::error::{SigningError, SigningResult};

/// What a timestamp protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimestampType {
    /// Covers the signature value.
    SignatureTimestamp,
    /// SigAndRefs / escTimeStamp: signature, its timestamps and validation material.
    ValidationDataTimestamp,
    /// RefsOnly / certCRLTimestamp: validation material only.
    RefsOnlyTimestamp,
    /// Covers the whole signature as it stood when created.
    ArchiveTimestamp,
}

impl TimestampType {
    #[must_use]
    pub fn xml_element(&self) -> &'static str {
        match self {
            TimestampType::SignatureTimestamp => "SignatureTimeStamp",
            TimestampType::ValidationDataTimestamp => "SigAndRefsTimeStamp",
            TimestampType::RefsOnlyTimestamp => "RefsOnlyTimeStamp",
            TimestampType::ArchiveTimestamp => "ArchiveTimeStamp",
        }
    }
}

impl fmt::Display for TimestampType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.xml_element())
    }
}

/// Raw answer of a timestamp authority plus whatever its decoder learned
/// about the TSA's own signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampBinary {
    pub der: Vec<u8>,
    pub signature: Option<TokenSignature>,
    pub certificates: Vec<CertificateToken>,
    pub signing_certificate_attributes: Vec<SigningCertificateAttribute>,
}

impl TimestampBinary {
    #[must_use]
    pub fn new(der: Vec<u8>) -> Self {
        Self {
            der,
            ..Self::default()
        }
    }
}

/// Fields read out of a `TSTInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TstInfo {
    pub message_imprint: DigestBytes,
    pub gen_time: DateTime<Utc>,
    pub serial_number: Vec<u8>,
}

impl TstInfo {
    /// Parse a `TimeStampToken` (`ContentInfo` wrapping `SignedData` whose
    /// encapsulated content is a `TSTInfo`).
    pub fn from_token(der: &[u8]) -> SigningResult<Self> {
        let (content_info, _) = read_tlv(der).map_err(token_error)?;
        expect_tag(&content_info, ASN1_SEQUENCE_TAG, "ContentInfo")?;
        let ci = content_info.children()?;
        let [content_type, explicit, ..] = ci.as_slice() else {
            return Err(SigningError::TimestampError("ContentInfo is truncated".into()));
        };
        if content_type.tag != ASN1_OID_TAG || content_type.content != PKCS7_SIGNED_DATA_OID {
            return Err(SigningError::TimestampError(
                "Timestamp token is not CMS SignedData".into(),
            ));
        }
        expect_tag(explicit, ASN1_CONTEXT_0_EXPLICIT_TAG, "ContentInfo content")?;
        let (signed_data, _) = read_tlv(explicit.content)?;
        let sd = signed_data.children()?;
        // version, digestAlgorithms, encapContentInfo, ...
        let encap = sd
            .get(2)
            .ok_or_else(|| SigningError::TimestampError("SignedData is truncated".into()))?;
        let eci = encap.children()?;
        let [econtent_type, econtent, ..] = eci.as_slice() else {
            return Err(SigningError::TimestampError(
                "encapContentInfo carries no content".into(),
            ));
        };
        if econtent_type.content != TST_INFO_OID {
            return Err(SigningError::TimestampError(
                "Encapsulated content is not TSTInfo".into(),
            ));
        }
        let (octets, _) = read_tlv(econtent.content)?;
        expect_tag(&octets, ASN1_OCTET_STRING_TAG, "eContent")?;
        Self::from_tst_info(octets.content)
    }

    fn from_tst_info(der: &[u8]) -> SigningResult<Self> {
        let (tst, _) = read_tlv(der)?;
        expect_tag(&tst, ASN1_SEQUENCE_TAG, "TSTInfo")?;
        let fields = tst.children()?;
        // version, policy, messageImprint, serialNumber, genTime, ...
        let [_version, _policy, imprint, serial, gen_time, ..] = fields.as_slice() else {
            return Err(SigningError::TimestampError("TSTInfo is truncated".into()));
        };
        expect_tag(gen_time, ASN1_GENERALIZED_TIME_TAG, "genTime")?;
        Ok(Self {
            message_imprint: parse_message_imprint(imprint)?,
            gen_time: parse_generalized_time(gen_time.content)?,
            serial_number: serial.content.to_vec(),
        })
    }

    /// Encode an unsigned token carrying this `TSTInfo`; the `signerInfos`
    /// set is empty.
    #[must_use]
    pub fn encode_token(&self, policy_oid: &[u8]) -> Vec<u8> {
        encode_timestamp_token(
            &self.encode_tst_info(policy_oid),
            self.message_imprint.algorithm(),
            &[],
            &[],
        )
    }

    /// DER `TSTInfo`, the encapsulated content a TSA signs.
    #[must_use]
    pub fn encode_tst_info(&self, policy_oid: &[u8]) -> Vec<u8> {
        let alg = self.message_imprint.algorithm();
        let mut imprint = algorithm_identifier(alg);
        imprint.extend(encode_tlv(ASN1_OCTET_STRING_TAG, self.message_imprint.as_slice()));

        let mut tst = encode_tlv(ASN1_INTEGER_TAG, &[0x01]);
        tst.extend(encode_tlv(ASN1_OID_TAG, policy_oid));
        tst.extend(encode_tlv(ASN1_SEQUENCE_TAG, &imprint));
        tst.extend(encode_tlv(ASN1_INTEGER_TAG, &self.serial_number));
        tst.extend(encode_tlv(
            ASN1_GENERALIZED_TIME_TAG,
            self.gen_time.format("%Y%m%d%H%M%SZ").to_string().as_bytes(),
        ));
        encode_tlv(ASN1_SEQUENCE_TAG, &tst)
    }
}

/// `AlgorithmIdentifier` for a digest, with NULL parameters.
#[must_use]
pub fn algorithm_identifier(algorithm: DigestAlgorithm) -> Vec<u8> {
    let mut alg_id = encode_tlv(ASN1_OID_TAG, algorithm.oid_bytes());
    alg_id.extend_from_slice(ASN1_NULL);
    encode_tlv(ASN1_SEQUENCE_TAG, &alg_id)
}

/// Wrap an encoded `TSTInfo` into a `ContentInfo`/`SignedData` token.
///
/// `certificates` are whole DER certificates and `signer_infos` whole DER
/// `SignerInfo`s.
#[must_use]
pub fn encode_timestamp_token(
    tst_info: &[u8],
    digest_algorithm: DigestAlgorithm,
    certificates: &[Vec<u8>],
    signer_infos: &[Vec<u8>],
) -> Vec<u8> {
    let mut encap = encode_tlv(ASN1_OID_TAG, TST_INFO_OID);
    encap.extend(encode_tlv(
        ASN1_CONTEXT_0_EXPLICIT_TAG,
        &encode_tlv(ASN1_OCTET_STRING_TAG, tst_info),
    ));

    let mut signed_data = encode_tlv(ASN1_INTEGER_TAG, &[0x03]);
    signed_data.extend(encode_tlv(ASN1_SET_TAG, &algorithm_identifier(digest_algorithm)));
    signed_data.extend(encode_tlv(ASN1_SEQUENCE_TAG, &encap));
    if !certificates.is_empty() {
        signed_data.extend(encode_tlv(ASN1_CONTEXT_0_EXPLICIT_TAG, &certificates.concat()));
    }
    signed_data.extend(encode_tlv(ASN1_SET_TAG, &signer_infos.concat()));

    let mut content_info = encode_tlv(ASN1_OID_TAG, PKCS7_SIGNED_DATA_OID);
    content_info.extend(encode_tlv(
        ASN1_CONTEXT_0_EXPLICIT_TAG,
        &encode_tlv(ASN1_SEQUENCE_TAG, &signed_data),
    ));
    encode_tlv(ASN1_SEQUENCE_TAG, &content_info)
}

fn token_error(e: SigningError) -> SigningError {
    SigningError::TimestampError(format!("Invalid timestamp token structure: {e}"))
}

fn expect_tag(tlv: &Tlv<'_>, tag: u8, what: &str) -> SigningResult<()> {
    if tlv.tag == tag {
        Ok(())
    } else {
        Err(SigningError::TimestampError(format!(
            "Expected {what} (tag 0x{tag:02x}), found 0x{:02x}",
            tlv.tag
        )))
    }
}

/// `MessageImprint ::= SEQUENCE { hashAlgorithm AlgorithmIdentifier, hashedMessage OCTET STRING }`
fn parse_message_imprint(imprint: &Tlv<'_>) -> SigningResult<DigestBytes> {
    expect_tag(imprint, ASN1_SEQUENCE_TAG, "messageImprint")?;
    let parts = imprint.children()?;
    let [alg_id, hashed, ..] = parts.as_slice() else {
        return Err(SigningError::TimestampError("messageImprint is truncated".into()));
    };
    let alg_parts = alg_id.children()?;
    let oid = alg_parts
        .first()
        .filter(|t| t.tag == ASN1_OID_TAG)
        .ok_or_else(|| SigningError::TimestampError("hashAlgorithm has no OID".into()))?;
    let algorithm = DigestAlgorithm::from_oid_bytes(oid.content).ok_or_else(|| {
        SigningError::TimestampError(format!(
            "Unsupported message imprint algorithm {}",
            hex::encode(oid.content)
        ))
    })?;
    expect_tag(hashed, ASN1_OCTET_STRING_TAG, "hashedMessage")?;
    DigestBytes::new(algorithm, hashed.content.to_vec())
        .map_err(|e| SigningError::TimestampError(format!("message imprint: {e}")))
}

/// `YYYYMMDDHHMMSS[.f*]Z`; TSAs commonly send fractional seconds.
fn parse_generalized_time(raw: &[u8]) -> SigningResult<DateTime<Utc>> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| SigningError::TimestampError("genTime is not ASCII".into()))?;
    let bad = || SigningError::TimestampError(format!("Unsupported genTime format: {text}"));
    let body = text.strip_suffix('Z').ok_or_else(bad)?;
    if body.len() < 14 || !body.is_char_boundary(14) {
        return Err(bad());
    }
    let (main, fraction) = body.split_at(14);
    let parsed = NaiveDateTime::parse_from_str(main, "%Y%m%d%H%M%S").map_err(|_| bad())?;
    let nanos = match fraction.strip_prefix('.') {
        None if fraction.is_empty() => 0,
        Some(digits) if !digits.is_empty() && digits.len() <= 9 => {
            let value: u32 = digits.parse().map_err(|_| bad())?;
            value * 10u32.pow(9 - digits.len() as u32)
        }
        _ => return Err(bad()),
    };
    Ok(parsed.and_utc() + chrono::Duration::nanoseconds(i64::from(nanos)))
}

/// An incorporated timestamp.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampToken {
    id: String,
    encapsulated_id: String,
    timestamp_type: TimestampType,
    digest_algorithm: DigestAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    canonicalization_method: Option<String>,
    covered_data_description: String,
    #[serde(with = "base64_bytes")]
    binary: Vec<u8>,
    issued_at: DateTime<Utc>,
    message_imprint: DigestBytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<TokenSignature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    certificates: Vec<CertificateToken>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    signing_certificate_attributes: Vec<SigningCertificateAttribute>,
}

impl TimestampToken {
    /// Wrap a TSA answer, reading `issued_at` and the imprint from the token.
    ///
    /// Gets fresh `TS-<uuid>` / `ETS-<uuid>` identifiers.
    pub fn from_binary(
        timestamp_type: TimestampType,
        binary: TimestampBinary,
        canonicalization_method: Option<String>,
        covered_data_description: impl Into<String>,
    ) -> SigningResult<Self> {
        let info = TstInfo::from_token(&binary.der)?;
        Ok(Self {
            id: format!("TS-{}", uuid::Uuid::new_v4()),
            encapsulated_id: format!("ETS-{}", uuid::Uuid::new_v4()),
            timestamp_type,
            digest_algorithm: info.message_imprint.algorithm(),
            canonicalization_method,
            covered_data_description: covered_data_description.into(),
            binary: binary.der,
            issued_at: info.gen_time,
            message_imprint: info.message_imprint,
            signature: binary.signature,
            certificates: binary.certificates,
            signing_certificate_attributes: binary.signing_certificate_attributes,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
    #[must_use]
    pub fn encapsulated_id(&self) -> &str {
        &self.encapsulated_id
    }
    #[must_use]
    pub fn timestamp_type(&self) -> TimestampType {
        self.timestamp_type
    }
    #[must_use]
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }
    #[must_use]
    pub fn canonicalization_method(&self) -> Option<&str> {
        self.canonicalization_method.as_deref()
    }
    #[must_use]
    pub fn covered_data_description(&self) -> &str {
        &self.covered_data_description
    }
    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.binary
    }
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
    #[must_use]
    pub fn message_imprint(&self) -> &DigestBytes {
        &self.message_imprint
    }
    #[must_use]
    pub fn signature(&self) -> Option<&TokenSignature> {
        self.signature.as_ref()
    }
    #[must_use]
    pub fn certificates(&self) -> &[CertificateToken] {
        &self.certificates
    }
    #[must_use]
    pub fn signing_certificate_attributes(&self) -> &[SigningCertificateAttribute] {
        &self.signing_certificate_attributes
    }

    /// The imprint, seen as a digest the timestamp relies on.
    #[must_use]
    pub fn digest_matchers(&self) -> Vec<DigestMatcher> {
        vec![DigestMatcher::new(DigestMatcherKind::MessageImprint, self.digest_algorithm)
            .named(format!("message-imprint:{}", self.id))]
    }

    /// Check the imprint against the digest of data that should be covered.
    pub fn validate_message_imprint(&self, covered_data: &[u8]) -> SigningResult<()> {
        let expected = self.digest_algorithm.digest(covered_data);
        log::debug!(
            "Validating message imprint of {}: token={}, computed={}",
            self.id,
            self.message_imprint.to_hex(),
            expected.to_hex()
        );
        if expected != self.message_imprint {
            return Err(SigningError::TimestampError(format!(
                "Message imprint of {} does not match the covered data",
                self.id
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for TimestampToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimestampToken(id={}, type={}, alg={}, issued_at={})",
            self.id, self.timestamp_type, self.digest_algorithm, self.issued_at
        )
    }
}
