//! Timestamp response parsing service.
//!
//! Unwraps an RFC3161 `TimeStampResp`, checks the PKI status and the message
//! imprint, and lifts out what acceptance checks need from the embedded
//! `SignedData`: the TSA certificates, the signer's algorithms and key size,
//! and the ESS signing-certificate attributes.

use der::Decode;
use x509_cert::name::Name;
use x509_cert::spki::ObjectIdentifier;

use crate::domain::asn1::{read_tlv, Tlv};
use crate::domain::constants::{
    ASN1_CONTEXT_0_EXPLICIT_TAG, ASN1_CONTEXT_4_EXPLICIT_TAG, ASN1_INTEGER_TAG,
    ASN1_OCTET_STRING_TAG, ASN1_OID_TAG, ASN1_SEQUENCE_TAG, ASN1_SET_TAG,
    SIGNING_CERTIFICATE_ATTR_OID, SIGNING_CERTIFICATE_V2_ATTR_OID,
};
use crate::domain::crypto::{
    CertificateToken, DigestAlgorithm, DigestBytes, SignatureAlgorithm, TokenSignature,
};
use crate::domain::references::{CertificateRef, IssuerSerial, SigningCertificateAttribute};
use crate::domain::timestamp::{TimestampBinary, TstInfo};
use crate::infra::error::{SigningError, SigningResult};

/// `granted` and `grantedWithMods`; everything else is a refusal.
const PKI_STATUS_GRANTED: u8 = 0;
const PKI_STATUS_GRANTED_WITH_MODS: u8 = 1;

pub struct TimestampParserService;

/// What the token's `SignedData` says about its signer.
#[derive(Debug, Default)]
struct SignerDescription {
    certificates: Vec<CertificateToken>,
    signature: Option<TokenSignature>,
    signing_certificate_attributes: Vec<SigningCertificateAttribute>,
}

impl TimestampParserService {
    /// Parse a `TimeStampResp` body and validate the imprint against `expected`.
    pub fn parse_response(body: &[u8], expected: &DigestBytes) -> SigningResult<TimestampBinary> {
        let (response, _) = read_tlv(body)
            .map_err(|e| SigningError::TimestampError(format!("Malformed timestamp response: {e}")))?;
        if response.tag != ASN1_SEQUENCE_TAG {
            return Err(SigningError::TimestampError(
                "Timestamp response is not a SEQUENCE".into(),
            ));
        }
        let parts = response.children()?;
        let status_info = parts
            .first()
            .ok_or_else(|| SigningError::TimestampError("Timestamp response is empty".into()))?;
        Self::check_status(status_info)?;

        let token = parts.get(1).ok_or_else(|| {
            SigningError::TimestampError("Timestamp response carries no token".into())
        })?;
        let der = token.raw.to_vec();
        Self::parse_and_validate(der, expected)
    }

    /// Validate a bare `TimeStampToken` against the digest that was sent.
    pub fn parse_and_validate(der: Vec<u8>, expected: &DigestBytes) -> SigningResult<TimestampBinary> {
        let info = TstInfo::from_token(&der)?;
        if &info.message_imprint != expected {
            return Err(SigningError::TimestampError(format!(
                "imprint validation failed: token {} != request {}",
                info.message_imprint.to_hex(),
                expected.to_hex()
            )));
        }
        let signer = Self::describe_signer(&der).unwrap_or_else(|e| {
            log::warn!("Timestamp SignedData could not be read past TSTInfo: {e}");
            SignerDescription::default()
        });
        match &signer.signature {
            Some(signature) => log::debug!(
                "Timestamp token issued at {} by {} ({} bit key) with {} certificate(s)",
                info.gen_time,
                signature.algorithm,
                signature.key_size_bits.unwrap_or_default(),
                signer.certificates.len()
            ),
            None => log::warn!(
                "Timestamp token issued at {} names no recognisable signer",
                info.gen_time
            ),
        }
        Ok(TimestampBinary {
            der,
            signature: signer.signature,
            certificates: signer.certificates,
            signing_certificate_attributes: signer.signing_certificate_attributes,
        })
    }

    fn check_status(status_info: &Tlv<'_>) -> SigningResult<()> {
        let fields = status_info.children()?;
        let status = fields
            .first()
            .filter(|f| f.tag == ASN1_INTEGER_TAG && f.content.len() == 1)
            .map(|f| f.content[0])
            .ok_or_else(|| SigningError::TimestampError("PKIStatus is missing".into()))?;
        match status {
            PKI_STATUS_GRANTED | PKI_STATUS_GRANTED_WITH_MODS => Ok(()),
            other => Err(SigningError::TimestampError(format!(
                "Timestamp authority refused the request (PKIStatus {other})"
            ))),
        }
    }

    /// `SignedData ::= SEQUENCE { version, digestAlgorithms, encapContentInfo,
    /// certificates [0] IMPLICIT OPTIONAL, crls [1] IMPLICIT OPTIONAL, signerInfos }`
    fn describe_signer(der: &[u8]) -> SigningResult<SignerDescription> {
        let (content_info, _) = read_tlv(der)?;
        let ci = content_info.children()?;
        let explicit = ci
            .get(1)
            .ok_or_else(|| SigningError::Asn1Error("ContentInfo carries no content".into()))?;
        let (signed_data, _) = read_tlv(explicit.content)?;
        let fields = signed_data.children()?;
        let tail = fields.get(3..).unwrap_or_default();

        let certificates = match tail.iter().find(|f| f.tag == ASN1_CONTEXT_0_EXPLICIT_TAG) {
            Some(set) => Self::embedded_certificates(set)?,
            None => Vec::new(),
        };
        let Some(signer_infos) = tail.iter().rev().find(|f| f.tag == ASN1_SET_TAG) else {
            return Ok(SignerDescription {
                certificates,
                ..SignerDescription::default()
            });
        };
        let Some(signer_info) = signer_infos.children()?.into_iter().next() else {
            return Ok(SignerDescription {
                certificates,
                ..SignerDescription::default()
            });
        };

        // SignerInfo ::= SEQUENCE { version, sid, digestAlgorithm,
        //   signedAttrs [0] IMPLICIT OPTIONAL, signatureAlgorithm, signature, ... }
        let si = signer_info.children()?;
        let [_version, sid, digest_alg, rest @ ..] = si.as_slice() else {
            return Err(SigningError::Asn1Error("SignerInfo is truncated".into()));
        };
        let (signed_attrs, signature_alg) = match rest {
            [attrs, alg, ..] if attrs.tag == ASN1_CONTEXT_0_EXPLICIT_TAG => (Some(attrs), alg),
            [alg, ..] => (None, alg),
            [] => return Err(SigningError::Asn1Error("SignerInfo has no signatureAlgorithm".into())),
        };

        let signing_certificate_attributes = match signed_attrs {
            Some(attrs) => Self::signing_certificate_attributes(attrs)?,
            None => Vec::new(),
        };
        let key_size_bits = Self::signer_certificate(sid, &certificates, &signing_certificate_attributes)
            .and_then(CertificateToken::key_size_bits);

        let digest = algorithm_oid(digest_alg)
            .and_then(|oid| DigestAlgorithm::from_oid_bytes(oid.as_bytes()));
        let signature = match (digest, algorithm_oid(signature_alg)) {
            (Some(digest), Some(oid)) => SignatureAlgorithm::from_oid(&oid.to_string(), digest)
                .map(|algorithm| TokenSignature::new(algorithm, key_size_bits)),
            _ => None,
        };

        Ok(SignerDescription {
            certificates,
            signature,
            signing_certificate_attributes,
        })
    }

    /// Undecodable entries are skipped.
    fn embedded_certificates(set: &Tlv<'_>) -> SigningResult<Vec<CertificateToken>> {
        Ok(set
            .children()?
            .into_iter()
            .filter_map(|c| match CertificateToken::from_der(c.raw.to_vec()) {
                Ok(cert) => Some(cert),
                Err(e) => {
                    log::warn!("Skipping undecodable TSA certificate: {e}");
                    None
                }
            })
            .collect())
    }

    /// `signingCertificate` (ESSCertID, SHA-1) and `signingCertificateV2`
    /// (ESSCertIDv2) attributes, in the order they appear.
    fn signing_certificate_attributes(
        signed_attrs: &Tlv<'_>,
    ) -> SigningResult<Vec<SigningCertificateAttribute>> {
        let mut out = Vec::new();
        for attribute in signed_attrs.children()? {
            let parts = attribute.children()?;
            let [attr_type, values, ..] = parts.as_slice() else {
                continue;
            };
            let v2 = match attr_type.content {
                SIGNING_CERTIFICATE_V2_ATTR_OID => true,
                SIGNING_CERTIFICATE_ATTR_OID => false,
                _ => continue,
            };
            for value in values.children()? {
                // SigningCertificate(V2) ::= SEQUENCE { certs SEQUENCE OF ..., policies OPTIONAL }
                let Some(certs) = value.children()?.into_iter().next() else {
                    continue;
                };
                let refs = certs
                    .children()?
                    .iter()
                    .map(|id| ess_cert_id(id, v2))
                    .collect::<SigningResult<Vec<_>>>()?;
                out.push(SigningCertificateAttribute::new(refs));
            }
        }
        Ok(out)
    }

    /// The certificate named by the SignerInfo `sid`, falling back to the
    /// first signing-certificate reference.
    fn signer_certificate<'c>(
        sid: &Tlv<'_>,
        certificates: &'c [CertificateToken],
        attributes: &[SigningCertificateAttribute],
    ) -> Option<&'c CertificateToken> {
        let by_sid = (sid.tag == ASN1_SEQUENCE_TAG)
            .then(|| issuer_serial(sid).ok())
            .flatten()
            .and_then(|is| {
                certificates
                    .iter()
                    .find(|c| c.issuer() == is.issuer && c.serial_number() == is.serial_number)
            });
        by_sid.or_else(|| {
            attributes
                .first()
                .and_then(|attr| attr.refs.first())
                .and_then(|r| r.resolve(certificates))
        })
    }
}

/// OID of an `AlgorithmIdentifier`.
fn algorithm_oid(alg_id: &Tlv<'_>) -> Option<ObjectIdentifier> {
    let parts = alg_id.children().ok()?;
    let oid = parts.first().filter(|t| t.tag == ASN1_OID_TAG)?;
    ObjectIdentifier::from_bytes(oid.content).ok()
}

/// `ESSCertID ::= SEQUENCE { certHash OCTET STRING, issuerSerial OPTIONAL }`;
/// v2 prefixes an optional `hashAlgorithm` defaulting to SHA-256.
fn ess_cert_id(id: &Tlv<'_>, v2: bool) -> SigningResult<CertificateRef> {
    let fields = id.children()?;
    let mut fields = fields.as_slice();
    let mut algorithm = if v2 {
        DigestAlgorithm::Sha256
    } else {
        DigestAlgorithm::Sha1
    };
    if let [first, rest @ ..] = fields {
        if v2 && first.tag == ASN1_SEQUENCE_TAG {
            algorithm = algorithm_oid(first)
                .and_then(|oid| DigestAlgorithm::from_oid_bytes(oid.as_bytes()))
                .ok_or_else(|| SigningError::Asn1Error("Unsupported ESSCertIDv2 hash".into()))?;
            fields = rest;
        }
    }
    let [hash, rest @ ..] = fields else {
        return Err(SigningError::Asn1Error("ESSCertID has no certHash".into()));
    };
    if hash.tag != ASN1_OCTET_STRING_TAG {
        return Err(SigningError::Asn1Error("certHash is not an OCTET STRING".into()));
    }
    let digest = DigestBytes::new(algorithm, hash.content.to_vec())
        .map_err(|e| SigningError::Asn1Error(format!("certHash: {e}")))?;
    Ok(CertificateRef {
        digest: Some(digest),
        issuer_serial: rest.first().map(issuer_serial).transpose()?,
    })
}

/// `IssuerSerial ::= SEQUENCE { issuer GeneralNames, serialNumber INTEGER }`
/// and the identically shaped `IssuerAndSerialNumber`, whose issuer is a bare `Name`.
fn issuer_serial(tlv: &Tlv<'_>) -> SigningResult<IssuerSerial> {
    let parts = tlv.children()?;
    let [issuer, serial, ..] = parts.as_slice() else {
        return Err(SigningError::Asn1Error("IssuerSerial is truncated".into()));
    };
    let name = match issuer.children()?.as_slice() {
        // GeneralNames holding a directoryName [4]
        [general_name, ..] if general_name.tag == ASN1_CONTEXT_4_EXPLICIT_TAG => {
            Name::from_der(general_name.content)?
        }
        _ => Name::from_der(issuer.raw)?,
    };
    Ok(IssuerSerial {
        issuer: name.to_string(),
        serial_number: hex::encode(serial.content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asn1::encode_tlv;
    use crate::domain::crypto::DigestAlgorithm;
    use chrono::{TimeZone, Utc};

    fn response(status: u8, digest: &DigestBytes) -> Vec<u8> {
        let token = TstInfo {
            message_imprint: digest.clone(),
            gen_time: Utc.with_ymd_and_hms(2024, 2, 2, 10, 0, 0).unwrap(),
            serial_number: vec![0x05],
        }
        .encode_token(&[0x2a, 0x03]);
        let status_info = encode_tlv(ASN1_SEQUENCE_TAG, &encode_tlv(ASN1_INTEGER_TAG, &[status]));
        encode_tlv(ASN1_SEQUENCE_TAG, &[status_info, token].concat())
    }

    #[test]
    fn granted_response_yields_token() {
        let digest = DigestAlgorithm::Sha256.digest(b"data");
        let binary = TimestampParserService::parse_response(&response(0, &digest), &digest).unwrap();
        assert_eq!(TstInfo::from_token(&binary.der).unwrap().message_imprint, digest);
        assert!(binary.certificates.is_empty());
        // empty signerInfos: nothing to judge the token by
        assert!(binary.signature.is_none());
        assert!(binary.signing_certificate_attributes.is_empty());
    }

    #[test]
    fn rejection_status_is_an_error() {
        let digest = DigestAlgorithm::Sha256.digest(b"data");
        let err = TimestampParserService::parse_response(&response(2, &digest), &digest).unwrap_err();
        assert!(err.to_string().contains("PKIStatus 2"));
    }

    #[test]
    fn imprint_mismatch_is_an_error() {
        let digest = DigestAlgorithm::Sha256.digest(b"data");
        let other = DigestAlgorithm::Sha256.digest(b"other");
        let err = TimestampParserService::parse_response(&response(0, &other), &digest).unwrap_err();
        assert!(err.is_collaborator_failure());
    }

    #[test]
    fn rejects_short_der() {
        let digest = DigestAlgorithm::Sha256.digest(b"data");
        assert!(TimestampParserService::parse_response(&[0x30], &digest).is_err());
    }
}
