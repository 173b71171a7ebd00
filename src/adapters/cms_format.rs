//! CAdES (CMS) rendition of unsigned material.
//!
//! Every block is laid out as a CMS `Attribute`
//! (`SEQUENCE { attrType OID, attrValues SET }`) so covered data is a
//! deterministic concatenation of DER elements.

use crate::domain::asn1::encode_tlv;
use crate::domain::constants::{
    ARCHIVE_TIMESTAMP_V3_ATTR_OID, ASN1_CONTEXT_0_EXPLICIT_TAG, ASN1_CONTEXT_1_EXPLICIT_TAG,
    ASN1_CONTEXT_2_EXPLICIT_TAG, ASN1_OCTET_STRING_TAG, ASN1_OID_TAG, ASN1_SEQUENCE_TAG,
    ASN1_SET_TAG, CERTIFICATE_VALUES_ATTR_OID, CERT_CRL_TIMESTAMP_ATTR_OID,
    ESC_TIMESTAMP_ATTR_OID, REVOCATION_VALUES_ATTR_OID, SIGNATURE_TIMESTAMP_ATTR_OID,
};
use crate::domain::crypto::CertificateToken;
use crate::domain::document::{SignatureEntry, SignatureForm};
use crate::domain::timestamp::TimestampType;
use crate::domain::unsigned::UnsignedBlock;
use crate::domain::validation_data::{CrlToken, OcspToken};
use crate::infra::error::{SigningError, SigningResult};
use crate::services::format::{CoveredData, SignatureFormat};

#[derive(Debug, Clone, Copy, Default)]
pub struct CmsFormat;

impl CmsFormat {
    fn attribute(oid: &[u8], value: &[u8]) -> Vec<u8> {
        let mut content = encode_tlv(ASN1_OID_TAG, oid);
        content.extend(encode_tlv(ASN1_SET_TAG, value));
        encode_tlv(ASN1_SEQUENCE_TAG, &content)
    }

    fn certificate_values<'c>(certs: impl Iterator<Item = &'c CertificateToken>) -> Vec<u8> {
        let body: Vec<u8> = certs.flat_map(|c| c.as_der().to_vec()).collect();
        encode_tlv(ASN1_SEQUENCE_TAG, &body)
    }

    /// `RevocationValues ::= SEQUENCE { crlVals [0], ocspVals [1] }`
    fn revocation_values<'c>(
        crls: impl Iterator<Item = &'c CrlToken>,
        ocsps: impl Iterator<Item = &'c OcspToken>,
    ) -> Vec<u8> {
        let crl_body: Vec<u8> = crls.flat_map(|c| c.as_der().to_vec()).collect();
        let ocsp_body: Vec<u8> = ocsps.flat_map(|o| o.as_der().to_vec()).collect();
        let mut body = Vec::new();
        if !crl_body.is_empty() {
            body.extend(encode_tlv(
                ASN1_CONTEXT_0_EXPLICIT_TAG,
                &encode_tlv(ASN1_SEQUENCE_TAG, &crl_body),
            ));
        }
        if !ocsp_body.is_empty() {
            body.extend(encode_tlv(
                ASN1_CONTEXT_1_EXPLICIT_TAG,
                &encode_tlv(ASN1_SEQUENCE_TAG, &ocsp_body),
            ));
        }
        encode_tlv(ASN1_SEQUENCE_TAG, &body)
    }

    fn render_all<'b>(
        &self,
        blocks: impl Iterator<Item = &'b UnsignedBlock>,
    ) -> SigningResult<Vec<u8>> {
        let mut out = Vec::new();
        for block in blocks {
            out.extend(self.render_block(block)?);
        }
        Ok(out)
    }
}

impl SignatureFormat for CmsFormat {
    fn name(&self) -> &'static str {
        "CAdES"
    }

    fn validate_preconditions(
        &self,
        signature: &SignatureEntry,
        timestamp_type: TimestampType,
    ) -> SigningResult<()> {
        if signature.form != SignatureForm::Cms {
            return Err(SigningError::InvalidInput(format!(
                "Signature {} is not CMS encoded",
                signature.id
            )));
        }
        if timestamp_type == TimestampType::ArchiveTimestamp && signature.signed_bytes.is_empty() {
            return Err(SigningError::StructuralError(format!(
                "Signature {} has no signed attributes to archive",
                signature.id
            )));
        }
        Ok(())
    }

    fn canonicalize_covered_data(
        &self,
        signature: &SignatureEntry,
        blocks: &[UnsignedBlock],
        timestamp_type: TimestampType,
        canonicalization_method: Option<&str>,
    ) -> SigningResult<CoveredData> {
        if let Some(method) = canonicalization_method {
            log::debug!("Ignoring canonicalization method {method} for CMS signature");
        }
        let covered = match timestamp_type {
            TimestampType::SignatureTimestamp => CoveredData {
                bytes: signature.signature_value.clone(),
                description: "signature value".into(),
            },
            TimestampType::ValidationDataTimestamp => {
                let mut bytes = signature.signature_value.clone();
                bytes.extend(self.render_all(blocks.iter().filter(|b| {
                    matches!(b, UnsignedBlock::SignatureTimestamp(_)) || b.is_validation_data()
                }))?);
                CoveredData {
                    bytes,
                    description: "signature value, signature timestamps and validation data".into(),
                }
            }
            TimestampType::RefsOnlyTimestamp => CoveredData {
                bytes: self.render_all(blocks.iter().filter(|b| b.is_validation_data()))?,
                description: "validation data".into(),
            },
            TimestampType::ArchiveTimestamp => {
                let mut bytes = encode_tlv(ASN1_OCTET_STRING_TAG, &signature.signed_bytes);
                bytes.extend(encode_tlv(ASN1_OCTET_STRING_TAG, &signature.signature_value));
                bytes.extend(self.render_all(blocks.iter())?);
                CoveredData {
                    bytes,
                    description: format!(
                        "signed attributes, signature value and {} unsigned attribute(s)",
                        blocks.len()
                    ),
                }
            }
        };
        Ok(covered)
    }

    fn render_block(&self, block: &UnsignedBlock) -> SigningResult<Vec<u8>> {
        let encoded = match block {
            UnsignedBlock::SignatureTimestamp(t) => {
                Self::attribute(SIGNATURE_TIMESTAMP_ATTR_OID, t.as_der())
            }
            UnsignedBlock::ValidationDataTimestamp(t) => {
                Self::attribute(ESC_TIMESTAMP_ATTR_OID, t.as_der())
            }
            UnsignedBlock::RefsOnlyTimestamp(t) => {
                Self::attribute(CERT_CRL_TIMESTAMP_ATTR_OID, t.as_der())
            }
            UnsignedBlock::ArchiveTimestamp(t) => {
                Self::attribute(ARCHIVE_TIMESTAMP_V3_ATTR_OID, t.as_der())
            }
            UnsignedBlock::CertificateValues(certs) => Self::attribute(
                CERTIFICATE_VALUES_ATTR_OID,
                &Self::certificate_values(certs.iter()),
            ),
            UnsignedBlock::RevocationValues { crls, ocsps } => Self::attribute(
                REVOCATION_VALUES_ATTR_OID,
                &Self::revocation_values(crls.iter(), ocsps.iter()),
            ),
            // No registered attribute exists; carried under a context tag.
            UnsignedBlock::TimestampValidationData { id, data } => {
                let mut body = encode_tlv(ASN1_OCTET_STRING_TAG, id.as_bytes());
                body.extend(Self::certificate_values(data.certificates()));
                body.extend(Self::revocation_values(data.crls(), data.ocsps()));
                encode_tlv(ASN1_CONTEXT_2_EXPLICIT_TAG, &body)
            }
        };
        Ok(encoded)
    }
}
