//! XAdES rendition of unsigned material.
//!
//! Blocks render as the XAdES unsigned signature properties
//! (`SignatureTimeStamp`, `CertificateValues`, `RevocationValues`,
//! `ArchiveTimeStamp`, `xades141:TimeStampValidationData`, ...). Covered data
//! is the canonicalized concatenation of the elements a timestamp protects.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::adapters::canonicalizer::Canonicalizer;
use crate::domain::constants::{DEFAULT_C14N_METHOD, XADES_141_NAMESPACE, XMLDSIG_NAMESPACE};
use crate::domain::crypto::CertificateToken;
use crate::domain::document::{DetachedContent, SignatureEntry, SignatureForm, XadesVersion};
use crate::domain::encoding::to_base64;
use crate::domain::timestamp::{TimestampToken, TimestampType};
use crate::domain::unsigned::UnsignedBlock;
use crate::domain::validation_data::{CrlToken, OcspToken};
use crate::infra::error::{SigningError, SigningResult};
use crate::services::format::{CoveredData, SignatureFormat};

pub struct XmlFormat {
    version: XadesVersion,
    canonicalizer: Arc<dyn Canonicalizer>,
}

impl XmlFormat {
    #[must_use]
    pub fn new(version: XadesVersion, canonicalizer: Arc<dyn Canonicalizer>) -> Self {
        Self {
            version,
            canonicalizer,
        }
    }

    fn xades_ns(&self) -> &'static str {
        self.version.properties_namespace()
    }

    /// `ds:SignatureValue` element as it appears in the signature.
    fn signature_value_element(signature: &SignatureEntry) -> String {
        format!(
            "<ds:SignatureValue xmlns:ds=\"{XMLDSIG_NAMESPACE}\" Id=\"value-{}\">{}</ds:SignatureValue>",
            escape_attr(&signature.id),
            to_base64(&signature.signature_value)
        )
    }

    fn timestamp_element(&self, token: &TimestampToken) -> String {
        let (prefix, ns) = match token.timestamp_type() {
            TimestampType::ArchiveTimestamp if self.version == XadesVersion::V141 => {
                ("xades141", XADES_141_NAMESPACE)
            }
            _ => ("xades", self.xades_ns()),
        };
        let element = token.timestamp_type().xml_element();
        let mut xml = format!(
            "<{prefix}:{element} xmlns:{prefix}=\"{ns}\" Id=\"{}\">",
            escape_attr(token.id())
        );
        if let Some(method) = token.canonicalization_method() {
            let method = escape_attr(method);
            let _ = write!(
                xml,
                "<ds:CanonicalizationMethod xmlns:ds=\"{XMLDSIG_NAMESPACE}\" Algorithm=\"{method}\"></ds:CanonicalizationMethod>"
            );
        }
        let _ = write!(
            xml,
            "<{prefix}:EncapsulatedTimeStamp Id=\"{}\">{}</{prefix}:EncapsulatedTimeStamp></{prefix}:{element}>",
            escape_attr(token.encapsulated_id()),
            to_base64(token.as_der())
        );
        xml
    }

    fn certificate_values<'c>(&self, certs: impl Iterator<Item = &'c CertificateToken>) -> String {
        let ns = self.xades_ns();
        let mut xml = format!("<xades:CertificateValues xmlns:xades=\"{ns}\">");
        for cert in certs {
            let _ = write!(
                xml,
                "<xades:EncapsulatedX509Certificate>{}</xades:EncapsulatedX509Certificate>",
                to_base64(cert.as_der())
            );
        }
        xml.push_str("</xades:CertificateValues>");
        xml
    }

    fn revocation_values<'c>(
        &self,
        crls: impl Iterator<Item = &'c CrlToken>,
        ocsps: impl Iterator<Item = &'c OcspToken>,
    ) -> String {
        let ns = self.xades_ns();
        let crl_values: String = crls
            .map(|c| format!("<xades:EncapsulatedCRLValue>{}</xades:EncapsulatedCRLValue>", to_base64(c.as_der())))
            .collect();
        let ocsp_values: String = ocsps
            .map(|o| format!("<xades:EncapsulatedOCSPValue>{}</xades:EncapsulatedOCSPValue>", to_base64(o.as_der())))
            .collect();
        let mut xml = format!("<xades:RevocationValues xmlns:xades=\"{ns}\">");
        if !crl_values.is_empty() {
            let _ = write!(xml, "<xades:CRLValues>{crl_values}</xades:CRLValues>");
        }
        if !ocsp_values.is_empty() {
            let _ = write!(xml, "<xades:OCSPValues>{ocsp_values}</xades:OCSPValues>");
        }
        xml.push_str("</xades:RevocationValues>");
        xml
    }

    fn canonical(&self, xml: &[u8], method: &str) -> SigningResult<Vec<u8>> {
        self.canonicalizer.canonicalize(xml, method)
    }

    fn canonical_blocks<'b>(
        &self,
        blocks: impl Iterator<Item = &'b UnsignedBlock>,
        method: &str,
    ) -> SigningResult<Vec<u8>> {
        let mut out = Vec::new();
        for block in blocks {
            out.extend(self.canonical(&self.render_block(block)?, method)?);
        }
        Ok(out)
    }
}

impl SignatureFormat for XmlFormat {
    fn name(&self) -> &'static str {
        "XAdES"
    }

    fn validate_preconditions(
        &self,
        signature: &SignatureEntry,
        timestamp_type: TimestampType,
    ) -> SigningResult<()> {
        let SignatureForm::Xml { xades_version } = signature.form else {
            return Err(SigningError::InvalidInput(format!(
                "Signature {} is not XML encoded",
                signature.id
            )));
        };
        if timestamp_type != TimestampType::SignatureTimestamp
            && !xades_version.supports_long_term_timestamps()
        {
            return Err(SigningError::UnsupportedOperation(format!(
                "{timestamp_type} cannot be created for XAdES {xades_version}"
            )));
        }
        if timestamp_type == TimestampType::ArchiveTimestamp {
            if let Some(doc) = signature
                .detached_contents
                .iter()
                .find(|d| matches!(d, DetachedContent::Digest { .. }))
            {
                return Err(SigningError::InvalidInput(format!(
                    "Archive timestamp of {} requires the complete detached document '{}', only its digest was supplied",
                    signature.id,
                    doc.name()
                )));
            }
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
        let method = canonicalization_method.unwrap_or(DEFAULT_C14N_METHOD);
        let signature_value = self.canonical(Self::signature_value_element(signature).as_bytes(), method)?;

        let covered = match timestamp_type {
            TimestampType::SignatureTimestamp => CoveredData {
                bytes: signature_value,
                description: "ds:SignatureValue".into(),
            },
            TimestampType::ValidationDataTimestamp => {
                let mut bytes = signature_value;
                bytes.extend(self.canonical_blocks(
                    blocks.iter().filter(|b| {
                        matches!(b, UnsignedBlock::SignatureTimestamp(_)) || b.is_validation_data()
                    }),
                    method,
                )?);
                CoveredData {
                    bytes,
                    description: "ds:SignatureValue, signature timestamps and validation data".into(),
                }
            }
            TimestampType::RefsOnlyTimestamp => CoveredData {
                bytes: self.canonical_blocks(blocks.iter().filter(|b| b.is_validation_data()), method)?,
                description: "validation data".into(),
            },
            TimestampType::ArchiveTimestamp => {
                let mut bytes = Vec::new();
                for doc in &signature.detached_contents {
                    match doc {
                        DetachedContent::Binary { bytes: content, .. } => bytes.extend_from_slice(content),
                        DetachedContent::Digest { name, .. } => {
                            return Err(SigningError::CanonicalizationError(format!(
                                "Detached document '{name}' is only known by its digest"
                            )))
                        }
                    }
                }
                bytes.extend(self.canonical(&signature.signed_bytes, method)?);
                bytes.extend(signature_value);
                bytes.extend(self.canonical_blocks(blocks.iter(), method)?);
                CoveredData {
                    bytes,
                    description: format!(
                        "{} detached document(s), ds:SignedInfo, ds:SignatureValue and {} unsigned propertie(s)",
                        signature.detached_contents.len(),
                        blocks.len()
                    ),
                }
            }
        };
        Ok(covered)
    }

    fn render_block(&self, block: &UnsignedBlock) -> SigningResult<Vec<u8>> {
        let xml = match block {
            UnsignedBlock::SignatureTimestamp(t)
            | UnsignedBlock::ValidationDataTimestamp(t)
            | UnsignedBlock::RefsOnlyTimestamp(t)
            | UnsignedBlock::ArchiveTimestamp(t) => self.timestamp_element(t),
            UnsignedBlock::CertificateValues(certs) => self.certificate_values(certs.iter()),
            UnsignedBlock::RevocationValues { crls, ocsps } => {
                self.revocation_values(crls.iter(), ocsps.iter())
            }
            UnsignedBlock::TimestampValidationData { id, data } => {
                let id = escape_attr(id);
                let mut xml = format!(
                    "<xades141:TimeStampValidationData xmlns:xades141=\"{XADES_141_NAMESPACE}\" Id=\"{id}\">"
                );
                if data.certificates().next().is_some() {
                    xml.push_str(&self.certificate_values(data.certificates()));
                }
                if data.has_revocation_data() {
                    xml.push_str(&self.revocation_values(data.crls(), data.ocsps()));
                }
                xml.push_str("</xades141:TimeStampValidationData>");
                xml
            }
        };
        Ok(xml.into_bytes())
    }

    fn default_canonicalization_method(&self) -> Option<&'static str> {
        Some(DEFAULT_C14N_METHOD)
    }
}

/// Escape a value for a double-quoted XML attribute.
fn escape_attr(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
