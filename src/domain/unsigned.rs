//! Unsigned signature material: the ordered, append-only sequence of blocks
//! that extension adds and validation reads back.

use serde::{Deserialize, Serialize};

use crate::domain::crypto::CertificateToken;
use crate::domain::level::SignatureLevel;
use crate::domain::timestamp::{TimestampToken, TimestampType};
use crate::domain::validation_data::{CrlToken, OcspToken, ValidationData};
use crate::infra::error::{SigningError, SigningResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnsignedBlock {
    SignatureTimestamp(TimestampToken),
    ValidationDataTimestamp(TimestampToken),
    RefsOnlyTimestamp(TimestampToken),
    ArchiveTimestamp(TimestampToken),
    CertificateValues(Vec<CertificateToken>),
    RevocationValues {
        crls: Vec<CrlToken>,
        ocsps: Vec<OcspToken>,
    },
    TimestampValidationData {
        id: String,
        data: ValidationData,
    },
}

impl UnsignedBlock {
    /// Wrap a token in the block kind matching its type.
    #[must_use]
    pub fn from_timestamp(token: TimestampToken) -> Self {
        match token.timestamp_type() {
            TimestampType::SignatureTimestamp => UnsignedBlock::SignatureTimestamp(token),
            TimestampType::ValidationDataTimestamp => UnsignedBlock::ValidationDataTimestamp(token),
            TimestampType::RefsOnlyTimestamp => UnsignedBlock::RefsOnlyTimestamp(token),
            TimestampType::ArchiveTimestamp => UnsignedBlock::ArchiveTimestamp(token),
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<&TimestampToken> {
        match self {
            UnsignedBlock::SignatureTimestamp(t)
            | UnsignedBlock::ValidationDataTimestamp(t)
            | UnsignedBlock::RefsOnlyTimestamp(t)
            | UnsignedBlock::ArchiveTimestamp(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_validation_data(&self) -> bool {
        matches!(
            self,
            UnsignedBlock::CertificateValues(_)
                | UnsignedBlock::RevocationValues { .. }
                | UnsignedBlock::TimestampValidationData { .. }
        )
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            UnsignedBlock::SignatureTimestamp(_) => "SignatureTimestamp",
            UnsignedBlock::ValidationDataTimestamp(_) => "ValidationDataTimestamp",
            UnsignedBlock::RefsOnlyTimestamp(_) => "RefsOnlyTimestamp",
            UnsignedBlock::ArchiveTimestamp(_) => "ArchiveTimestamp",
            UnsignedBlock::CertificateValues(_) => "CertificateValues",
            UnsignedBlock::RevocationValues { .. } => "RevocationValues",
            UnsignedBlock::TimestampValidationData { .. } => "TimestampValidationData",
        }
    }
}

/// Ordered unsigned blocks of one signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnsignedMaterial {
    blocks: Vec<UnsignedBlock>,
}

impl UnsignedMaterial {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from decoded blocks, rejecting sequences that break the ordering rules.
    pub fn from_blocks(blocks: Vec<UnsignedBlock>) -> SigningResult<Self> {
        let material = Self { blocks };
        material.check_structure()?;
        Ok(material)
    }

    #[must_use]
    pub fn blocks(&self) -> &[UnsignedBlock] {
        &self.blocks
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[must_use]
    pub fn level(&self) -> SignatureLevel {
        SignatureLevel::of(self)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &TimestampToken> {
        self.blocks.iter().filter_map(UnsignedBlock::timestamp)
    }

    pub fn timestamps_of(&self, kind: TimestampType) -> impl Iterator<Item = &TimestampToken> {
        self.timestamps()
            .filter(move |t| t.timestamp_type() == kind)
    }

    #[must_use]
    pub fn has_timestamp_of(&self, kind: TimestampType) -> bool {
        self.timestamps_of(kind).next().is_some()
    }

    #[must_use]
    pub fn last_archive_timestamp(&self) -> Option<&TimestampToken> {
        self.timestamps_of(TimestampType::ArchiveTimestamp).last()
    }

    fn last_archive_index(&self) -> Option<usize> {
        self.blocks
            .iter()
            .rposition(|b| matches!(b, UnsignedBlock::ArchiveTimestamp(_)))
    }

    /// Index of the block holding the timestamp with `id`.
    #[must_use]
    pub fn position_of(&self, timestamp_id: &str) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.timestamp().is_some_and(|t| t.id() == timestamp_id))
    }

    /// Blocks preceding `index`; what a timestamp at `index` was computed over.
    #[must_use]
    pub fn prefix(&self, index: usize) -> &[UnsignedBlock] {
        &self.blocks[..index.min(self.blocks.len())]
    }

    /// Every certificate and revocation token already embedded, including the
    /// certificates carried inside timestamp tokens.
    #[must_use]
    pub fn embedded_validation_data(&self) -> ValidationData {
        let mut data = ValidationData::new();
        for block in &self.blocks {
            match block {
                UnsignedBlock::CertificateValues(certs) => {
                    for cert in certs {
                        data.add_certificate(cert.clone());
                    }
                }
                UnsignedBlock::RevocationValues { crls, ocsps } => {
                    for crl in crls {
                        data.add_crl(crl.clone());
                    }
                    for ocsp in ocsps {
                        data.add_ocsp(ocsp.clone());
                    }
                }
                UnsignedBlock::TimestampValidationData { data: inner, .. } => {
                    data.merge(inner.clone());
                }
                _ => {}
            }
            if let Some(token) = block.timestamp() {
                for cert in token.certificates() {
                    data.add_certificate(cert.clone());
                }
            }
        }
        data
    }

    /// Ordering rules every well-formed sequence obeys.
    pub fn check_structure(&self) -> SigningResult<()> {
        let mut seen_signature_timestamp = false;
        let mut seen_archive = false;
        for (index, block) in self.blocks.iter().enumerate() {
            match block {
                UnsignedBlock::SignatureTimestamp(_) => seen_signature_timestamp = true,
                UnsignedBlock::ArchiveTimestamp(_) => {
                    if !seen_signature_timestamp {
                        return Err(SigningError::StructuralError(format!(
                            "archive timestamp at position {index} precedes any signature timestamp"
                        )));
                    }
                    seen_archive = true;
                }
                UnsignedBlock::CertificateValues(_) | UnsignedBlock::RevocationValues { .. }
                    if seen_archive =>
                {
                    return Err(SigningError::StructuralError(format!(
                        "{} at position {index} follows an archive timestamp",
                        block.kind()
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Append a timestamp block.
    pub(crate) fn push_timestamp(&mut self, token: TimestampToken) {
        self.blocks.push(UnsignedBlock::from_timestamp(token));
    }

    /// Append validation data, choosing the container the current state allows.
    ///
    /// The first long-term data goes into certificate/revocation values blocks.
    /// The certificate values block is written even when `data` is empty: it
    /// is what marks the signature as LT (an empty `certValues` /
    /// `xades:CertificateValues`), while an empty revocation values block is
    /// left out. After that, or once any archive timestamp exists, data is
    /// wrapped in a fresh timestamp-validation-data block so nothing already
    /// covered by an archive timestamp is touched.
    pub(crate) fn incorporate_validation_data(&mut self, data: ValidationData) {
        let has_values = self.blocks.iter().any(|b| {
            matches!(
                b,
                UnsignedBlock::CertificateValues(_) | UnsignedBlock::RevocationValues { .. }
            )
        });
        if self.last_archive_index().is_none() && !has_values {
            let crls: Vec<CrlToken> = data.crls().cloned().collect();
            let ocsps: Vec<OcspToken> = data.ocsps().cloned().collect();
            self.blocks.push(UnsignedBlock::CertificateValues(
                data.certificates().cloned().collect(),
            ));
            if !crls.is_empty() || !ocsps.is_empty() {
                self.blocks.push(UnsignedBlock::RevocationValues { crls, ocsps });
            }
            return;
        }
        if data.is_empty() {
            return;
        }
        let id = format!(
            "id-{}",
            self.last_archive_timestamp().map_or("1", TimestampToken::id)
        );
        self.blocks
            .push(UnsignedBlock::TimestampValidationData { id, data });
    }

    /// Remove the last timestamp-validation-data block if no archive
    /// timestamp covers it yet. Returns its content.
    pub(crate) fn remove_uncovered_validation_data(&mut self) -> Option<ValidationData> {
        let index = self
            .blocks
            .iter()
            .rposition(|b| matches!(b, UnsignedBlock::TimestampValidationData { .. }))?;
        if self.last_archive_index().is_some_and(|archive| archive > index) {
            return None;
        }
        match self.blocks.remove(index) {
            UnsignedBlock::TimestampValidationData { data, .. } => Some(data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::DigestAlgorithm;
    use crate::domain::timestamp::{TimestampBinary, TstInfo};
    use chrono::{TimeZone, Utc};

    fn token(kind: TimestampType) -> TimestampToken {
        let der = TstInfo {
            message_imprint: DigestAlgorithm::Sha256.digest(b"covered"),
            gen_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            serial_number: vec![0x01],
        }
        .encode_token(&[0x2a, 0x03]);
        TimestampToken::from_binary(kind, TimestampBinary::new(der), None, "test").unwrap()
    }

    fn cert(name: &str) -> CertificateToken {
        CertificateToken::from_parts(
            name.as_bytes().to_vec(),
            name,
            "CN=CA",
            "01",
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn data_with(name: &str) -> ValidationData {
        let mut data = ValidationData::new();
        data.add_certificate(cert(name));
        data
    }

    #[test]
    fn level_follows_blocks() {
        let mut material = UnsignedMaterial::new();
        material.push_timestamp(token(TimestampType::SignatureTimestamp));
        assert_eq!(material.level(), SignatureLevel::T);
        material.incorporate_validation_data(data_with("CN=Leaf"));
        assert_eq!(material.level(), SignatureLevel::Lt);
        material.push_timestamp(token(TimestampType::ArchiveTimestamp));
        assert_eq!(material.level(), SignatureLevel::Lta);
    }

    #[test]
    fn empty_first_collection_still_marks_lt() {
        let mut material = UnsignedMaterial::new();
        material.push_timestamp(token(TimestampType::SignatureTimestamp));
        material.incorporate_validation_data(ValidationData::new());
        assert_eq!(material.level(), SignatureLevel::Lt);
        assert_eq!(material.blocks().len(), 2);
        assert!(matches!(
            material.blocks().last(),
            Some(UnsignedBlock::CertificateValues(certs)) if certs.is_empty()
        ));

        // later empty collections add nothing
        material.incorporate_validation_data(ValidationData::new());
        assert_eq!(material.blocks().len(), 2);
    }

    #[test]
    fn data_after_archive_goes_into_timestamp_validation_data() {
        let mut material = UnsignedMaterial::new();
        material.push_timestamp(token(TimestampType::SignatureTimestamp));
        material.incorporate_validation_data(data_with("CN=Leaf"));
        let archive = token(TimestampType::ArchiveTimestamp);
        let archive_id = archive.id().to_string();
        material.push_timestamp(archive);
        material.incorporate_validation_data(data_with("CN=TSA"));

        match material.blocks().last() {
            Some(UnsignedBlock::TimestampValidationData { id, data }) => {
                assert_eq!(id, &format!("id-{archive_id}"));
                assert_eq!(data.len(), 1);
            }
            other => panic!("unexpected last block {other:?}"),
        }
        assert!(material.check_structure().is_ok());
    }

    #[test]
    fn covered_validation_data_is_never_removed() {
        let mut material = UnsignedMaterial::new();
        material.push_timestamp(token(TimestampType::SignatureTimestamp));
        material.incorporate_validation_data(data_with("CN=Leaf"));
        material.incorporate_validation_data(data_with("CN=TSA"));
        assert!(matches!(
            material.blocks().last(),
            Some(UnsignedBlock::TimestampValidationData { id, .. }) if id == "id-1"
        ));
        material.push_timestamp(token(TimestampType::ArchiveTimestamp));
        assert!(material.remove_uncovered_validation_data().is_none());

        material.incorporate_validation_data(data_with("CN=Other"));
        let removed = material.remove_uncovered_validation_data().unwrap();
        assert_eq!(removed.len(), 1);
        assert!(matches!(
            material.blocks().last(),
            Some(UnsignedBlock::ArchiveTimestamp(_))
        ));
    }

    #[test]
    fn structure_rejects_values_after_archive() {
        let blocks = vec![
            UnsignedBlock::SignatureTimestamp(token(TimestampType::SignatureTimestamp)),
            UnsignedBlock::ArchiveTimestamp(token(TimestampType::ArchiveTimestamp)),
            UnsignedBlock::CertificateValues(vec![cert("CN=Late")]),
        ];
        let err = UnsignedMaterial::from_blocks(blocks).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn embedded_data_includes_timestamp_certificates() {
        let mut material = UnsignedMaterial::new();
        material.incorporate_validation_data(data_with("CN=Leaf"));
        let embedded = material.embedded_validation_data();
        assert!(embedded.contains(&cert("CN=Leaf").id()));
    }
}
