//! Baseline level extension (B → T → LT → LTA).
//!
//! Every call works on a copy of each targeted signature and only hands back
//! a new document once all of them succeeded; the input is never touched.
//! Levels are derived from the unsigned material at every step, so each
//! level's precondition is checked against the state actually reached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::canonicalizer::Canonicalizer;
use crate::adapters::format_for;
use crate::domain::document::{SignatureEntry, SignatureIntegrity, SignedDocument, SignedToken};
use crate::domain::level::SignatureLevel;
use crate::domain::policy::ValidationPolicy;
use crate::domain::timestamp::TimestampType;
use crate::domain::verification::{TokenKind, TokenReport};
use crate::infra::error::{SigningError, SigningResult};
use crate::services::acceptance::SignatureAcceptanceValidator;
use crate::services::collector::{CertificateSource, RevocationSource, ValidationDataCollector};
use crate::services::format::SignatureFormat;
use crate::services::timestamp_incorporator::{
    TimestampIncorporator, TimestampParameters, TimestampSource,
};

/// How a target more than one level away is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionMode {
    /// Only the next level may be produced; anything further is a missing prerequisite.
    #[default]
    Strict,
    /// Produce every intermediate level in turn.
    Cascade,
}

/// Context the extension runs in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SigningOperation {
    /// Stand-alone extension of an existing document.
    #[default]
    Extend,
    /// Extension right after signing: only the signature being created is touched.
    Sign { signature_id: String },
}

#[derive(Debug, Clone)]
pub struct ExtensionParameters {
    pub target: SignatureLevel,
    /// `None` extends every signature.
    pub signature_ids: Option<Vec<String>>,
    pub mode: ExtensionMode,
    /// Re-produce the target level even when already reached (another
    /// signature timestamp for T, a new archive cycle for LTA).
    pub refresh: bool,
    pub signature_timestamp: TimestampParameters,
    pub archive_timestamp: TimestampParameters,
    pub timeout: Duration,
    pub operation: SigningOperation,
}

impl ExtensionParameters {
    #[must_use]
    pub fn new(target: SignatureLevel) -> Self {
        Self {
            target,
            signature_ids: None,
            mode: ExtensionMode::Strict,
            refresh: false,
            signature_timestamp: TimestampParameters::default(),
            archive_timestamp: TimestampParameters::default(),
            timeout: Duration::from_secs(30),
            operation: SigningOperation::Extend,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExtensionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn cascading(self) -> Self {
        self.with_mode(ExtensionMode::Cascade)
    }

    #[must_use]
    pub fn refreshing(mut self) -> Self {
        self.refresh = true;
        self
    }

    #[must_use]
    pub fn only<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn during_signing(mut self, signature_id: impl Into<String>) -> Self {
        self.operation = SigningOperation::Sign {
            signature_id: signature_id.into(),
        };
        self
    }

    fn targets(&self, signature: &SignatureEntry) -> bool {
        match &self.operation {
            SigningOperation::Sign { signature_id } => &signature.id == signature_id,
            SigningOperation::Extend => self
                .signature_ids
                .as_ref()
                .map_or(true, |ids| ids.iter().any(|id| id == &signature.id)),
        }
    }

    fn requested_ids(&self) -> Vec<&str> {
        match &self.operation {
            SigningOperation::Sign { signature_id } => vec![signature_id.as_str()],
            SigningOperation::Extend => self
                .signature_ids
                .iter()
                .flatten()
                .map(String::as_str)
                .collect(),
        }
    }
}

pub struct LevelExtensionController<'a> {
    policy: &'a ValidationPolicy,
    tsa: &'a dyn TimestampSource,
    certificates: &'a dyn CertificateSource,
    revocations: &'a dyn RevocationSource,
    canonicalizer: Arc<dyn Canonicalizer>,
    now: Option<DateTime<Utc>>,
}

impl<'a> LevelExtensionController<'a> {
    #[must_use]
    pub fn new(
        policy: &'a ValidationPolicy,
        tsa: &'a dyn TimestampSource,
        certificates: &'a dyn CertificateSource,
        revocations: &'a dyn RevocationSource,
        canonicalizer: Arc<dyn Canonicalizer>,
    ) -> Self {
        Self {
            policy,
            tsa,
            certificates,
            revocations,
            canonicalizer,
            now: None,
        }
    }

    /// Evaluate "now" checks at a fixed instant instead of the wall clock.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }

    /// Extend the targeted signatures of `document` to `params.target`.
    pub fn extend(
        &self,
        document: &SignedDocument,
        params: &ExtensionParameters,
    ) -> SigningResult<SignedDocument> {
        if document.signatures.is_empty() {
            return Err(SigningError::StructuralError(format!(
                "Document '{}' contains no signatures",
                document.name
            )));
        }
        document.check_structure()?;
        for id in params.requested_ids() {
            if document.signature(id).is_none() {
                return Err(SigningError::InvalidInput(format!(
                    "Signature '{id}' not found in '{}'",
                    document.name
                )));
            }
        }

        let mut signatures = Vec::with_capacity(document.signatures.len());
        for signature in &document.signatures {
            if params.targets(signature) {
                signatures.push(self.extend_signature(signature, params)?);
            } else {
                log::debug!("Signature {} is not targeted, kept as is", signature.id);
                signatures.push(signature.clone());
            }
        }
        Ok(SignedDocument::new(document.name.clone(), signatures))
    }

    /// Extend one signature, returning the extended copy.
    pub fn extend_signature(
        &self,
        signature: &SignatureEntry,
        params: &ExtensionParameters,
    ) -> SigningResult<SignatureEntry> {
        let current = signature.level();
        let target = params.target;

        if target < current {
            return Err(SigningError::AlreadyExtended {
                signature_id: signature.id.clone(),
                level: signature.form.profile_name(current),
            });
        }
        if target == current && !params.refresh {
            log::info!(
                "Signature {} is already at {}, nothing to do",
                signature.id,
                signature.form.profile_name(current)
            );
            return Ok(signature.clone());
        }

        let format = format_for(signature.form, Arc::clone(&self.canonicalizer));
        let mut working = signature.clone();

        if target == current {
            log::info!("Refreshing {} of signature {}", target, signature.id);
            self.produce(&mut working, target, target, format.as_ref(), params)?;
            return Ok(working);
        }

        let mut level = current;
        while level < target {
            let Some(next) = level.next() else { break };
            if next != target && params.mode == ExtensionMode::Strict {
                return Err(SigningError::MissingPrerequisite {
                    signature_id: signature.id.clone(),
                    missing: next,
                });
            }
            log::info!(
                "Extending signature {} to {}",
                signature.id,
                signature.form.profile_name(next)
            );
            self.produce(&mut working, next, target, format.as_ref(), params)?;
            level = working.level();
            if level != next {
                return Err(SigningError::StructuralError(format!(
                    "Signature {} ended at {level} instead of {next}",
                    signature.id
                )));
            }
        }
        Ok(working)
    }

    fn produce(
        &self,
        working: &mut SignatureEntry,
        level: SignatureLevel,
        target: SignatureLevel,
        format: &dyn SignatureFormat,
        params: &ExtensionParameters,
    ) -> SigningResult<()> {
        match level {
            SignatureLevel::B => Ok(()),
            SignatureLevel::T => self.produce_t(working, target, format, params),
            SignatureLevel::Lt => self.produce_lt(working, format),
            SignatureLevel::Lta => self.produce_lta(working, format, params),
        }
    }

    fn produce_t(
        &self,
        working: &mut SignatureEntry,
        target: SignatureLevel,
        format: &dyn SignatureFormat,
        params: &ExtensionParameters,
    ) -> SigningResult<()> {
        let blocking = [
            TimestampType::ArchiveTimestamp,
            TimestampType::ValidationDataTimestamp,
            TimestampType::RefsOnlyTimestamp,
        ]
        .into_iter()
        .find(|kind| working.unsigned.has_timestamp_of(*kind));
        if let Some(kind) = blocking {
            return Err(SigningError::AlreadyExtended {
                signature_id: working.id.clone(),
                level: kind.to_string(),
            });
        }
        if target == SignatureLevel::T && working.level() >= SignatureLevel::Lt {
            return Err(SigningError::AlreadyExtended {
                signature_id: working.id.clone(),
                level: working.form.profile_name(working.level()),
            });
        }

        check_integrity(working)?;
        let now = self.now();
        self.check_acceptance(working, now)?;
        let signing_certificate = working.signing_certificate().ok_or_else(|| {
            SigningError::CryptographicUnacceptable(format!(
                "Signature {} presents no signing certificate",
                working.id
            ))
        })?;
        if !signing_certificate.is_valid_at(now) {
            return Err(SigningError::CryptographicUnacceptable(format!(
                "Signing certificate {} is not valid at {now} (valid {} to {})",
                signing_certificate.subject(),
                signing_certificate.not_before(),
                signing_certificate.not_after()
            )));
        }

        TimestampIncorporator::new(format, self.tsa, params.timeout).timestamp(
            working,
            TimestampType::SignatureTimestamp,
            &params.signature_timestamp,
        )?;
        Ok(())
    }

    fn produce_lt(
        &self,
        working: &mut SignatureEntry,
        format: &dyn SignatureFormat,
    ) -> SigningResult<()> {
        match working.level() {
            SignatureLevel::B => {
                return Err(SigningError::MissingPrerequisite {
                    signature_id: working.id.clone(),
                    missing: SignatureLevel::T,
                })
            }
            SignatureLevel::Lta => {
                return Err(SigningError::AlreadyExtended {
                    signature_id: working.id.clone(),
                    level: working.form.profile_name(SignatureLevel::Lta),
                })
            }
            SignatureLevel::T | SignatureLevel::Lt => {}
        }
        let collector = ValidationDataCollector::new(self.certificates, self.revocations);
        let data = format.collect_validation_data(&collector, working)?;
        log::info!(
            "Embedding {} validation data token(s) into {}",
            data.len(),
            working.id
        );
        working.unsigned.incorporate_validation_data(data);
        Ok(())
    }

    fn produce_lta(
        &self,
        working: &mut SignatureEntry,
        format: &dyn SignatureFormat,
        params: &ExtensionParameters,
    ) -> SigningResult<()> {
        if working.level() < SignatureLevel::Lt {
            return Err(SigningError::MissingPrerequisite {
                signature_id: working.id.clone(),
                missing: SignatureLevel::Lt,
            });
        }
        format.validate_preconditions(working, TimestampType::ArchiveTimestamp)?;
        check_integrity(working)?;

        // The signature must still be acceptable at its latest proof of existence.
        let latest = working
            .unsigned
            .timestamps()
            .map(|t| t.issued_at())
            .max()
            .unwrap_or_else(|| self.now());
        self.check_acceptance(working, latest)?;

        let mut data = working
            .unsigned
            .remove_uncovered_validation_data()
            .unwrap_or_default();
        if !data.is_empty() {
            log::debug!(
                "Re-embedding {} uncovered validation data token(s) of {}",
                data.len(),
                working.id
            );
        }
        let collector = ValidationDataCollector::new(self.certificates, self.revocations);
        data.merge(format.collect_validation_data(&collector, working)?);
        working.unsigned.incorporate_validation_data(data);

        TimestampIncorporator::new(format, self.tsa, params.timeout).timestamp(
            working,
            TimestampType::ArchiveTimestamp,
            &params.archive_timestamp,
        )?;
        Ok(())
    }

    fn check_acceptance(&self, signature: &SignatureEntry, at: DateTime<Utc>) -> SigningResult<()> {
        let report = SignatureAcceptanceValidator::new(&self.policy.signature, at)
            .validate(signature, TokenKind::Signature);
        if report.is_ok() {
            Ok(())
        } else {
            Err(SigningError::CryptographicUnacceptable(failure_reason(&report)))
        }
    }
}

fn check_integrity(signature: &SignatureEntry) -> SigningResult<()> {
    match &signature.integrity {
        SignatureIntegrity::Intact => Ok(()),
        SignatureIntegrity::Broken(reason) => Err(SigningError::CryptographicUnacceptable(format!(
            "Cryptographic signature verification has failed: {reason}"
        ))),
        SignatureIntegrity::Unknown => {
            log::warn!(
                "Integrity of signature {} was not verified by the decoder",
                signature.token_id()
            );
            Ok(())
        }
    }
}

fn failure_reason(report: &TokenReport) -> String {
    let verdict = report
        .cryptographic
        .as_ref()
        .filter(|v| !v.acceptable)
        .map(|v| format!(" ({} on {})", v.algorithm, v.concerned_material))
        .unwrap_or_default();
    match report.chain.failure() {
        Some(result) => format!(
            "{}: {}{verdict}",
            result.name,
            result.message.as_deref().unwrap_or("failed")
        ),
        None => format!("acceptance checks of {} failed{verdict}", report.token_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::canonicalizer::RenderedCanonicalizer;
    use crate::adapters::offline_tsa::OfflineTimestampSource;
    use crate::adapters::sources::{CertificatePool, RevocationPool};
    use crate::domain::crypto::{
        CertificateToken, DigestAlgorithm, EncryptionAlgorithm, SignatureAlgorithm, TokenSignature,
    };
    use crate::domain::document::SignatureForm;
    use crate::domain::references::SigningCertificateAttribute;
    use crate::domain::unsigned::{UnsignedBlock, UnsignedMaterial};
    use crate::domain::validation_data::OcspToken;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn cert(subject: &str, issuer: &str, serial: &str) -> CertificateToken {
        CertificateToken::from_parts(
            format!("{subject}|{issuer}|{serial}").into_bytes(),
            subject,
            issuer,
            serial,
            at(2020, 1, 1),
            at(2030, 1, 1),
        )
    }

    fn signature(id: &str) -> SignatureEntry {
        let chain = vec![cert("CN=Signer", "CN=Root", "10"), cert("CN=Root", "CN=Root", "01")];
        SignatureEntry {
            id: id.into(),
            form: SignatureForm::Cms,
            signed_bytes: vec![0x31, 0x00],
            signature_value: id.as_bytes().repeat(8),
            signature: TokenSignature::new(
                SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha256),
                Some(2048),
            ),
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

    struct Fixture {
        policy: ValidationPolicy,
        tsa: OfflineTimestampSource,
        certs: CertificatePool,
        revocations: RevocationPool,
    }

    impl Fixture {
        fn new() -> Self {
            let mut revocations = RevocationPool::new();
            revocations.add_ocsp(OcspToken::new(b"ocsp".to_vec(), "CN=Root", "10", at(2024, 5, 1)));
            Self {
                policy: ValidationPolicy::default(),
                tsa: OfflineTimestampSource::at(at(2024, 5, 1)),
                certs: CertificatePool::new(),
                revocations,
            }
        }

        fn controller(&self) -> LevelExtensionController<'_> {
            LevelExtensionController::new(
                &self.policy,
                &self.tsa,
                &self.certs,
                &self.revocations,
                Arc::new(RenderedCanonicalizer),
            )
            .at(at(2024, 5, 1))
        }
    }

    fn document(ids: &[&str]) -> SignedDocument {
        SignedDocument::new("doc.p7s", ids.iter().map(|id| signature(id)).collect())
    }

    #[test]
    fn b_to_t_adds_one_signature_timestamp() {
        let fx = Fixture::new();
        let doc = document(&["S-1"]);
        let out = fx
            .controller()
            .extend(&doc, &ExtensionParameters::new(SignatureLevel::T))
            .unwrap();
        assert_eq!(out.signatures[0].level(), SignatureLevel::T);
        assert_eq!(out.signatures[0].unsigned.blocks().len(), 1);
        assert!(doc.signatures[0].unsigned.is_empty());
    }

    #[test]
    fn strict_walk_names_missing_level() {
        let fx = Fixture::new();
        let t = fx
            .controller()
            .extend(&document(&["S-1"]), &ExtensionParameters::new(SignatureLevel::T))
            .unwrap();
        let err = fx
            .controller()
            .extend(&t, &ExtensionParameters::new(SignatureLevel::Lta))
            .unwrap_err();
        assert!(matches!(
            err,
            SigningError::MissingPrerequisite { missing: SignatureLevel::Lt, .. }
        ));
    }

    #[test]
    fn cascade_reaches_lta() {
        let fx = Fixture::new();
        let out = fx
            .controller()
            .extend(
                &document(&["S-1"]),
                &ExtensionParameters::new(SignatureLevel::Lta).cascading(),
            )
            .unwrap();
        let kinds: Vec<&str> = out.signatures[0].unsigned.blocks().iter().map(UnsignedBlock::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "SignatureTimestamp",
                "CertificateValues",
                "RevocationValues",
                "ArchiveTimestamp"
            ]
        );
    }

    #[test]
    fn lower_target_is_already_extended() {
        let fx = Fixture::new();
        let lt = fx
            .controller()
            .extend(&document(&["S-1"]), &ExtensionParameters::new(SignatureLevel::Lt).cascading())
            .unwrap();
        let err = fx
            .controller()
            .extend(&lt, &ExtensionParameters::new(SignatureLevel::T))
            .unwrap_err();
        assert!(err.is_already_extended());
    }

    #[test]
    fn broken_signature_is_not_timestamped() {
        let fx = Fixture::new();
        let mut doc = document(&["S-1"]);
        doc.signatures[0].integrity = SignatureIntegrity::Broken("digest mismatch".into());
        let err = fx
            .controller()
            .extend(&doc, &ExtensionParameters::new(SignatureLevel::T))
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Cryptographic signature verification has failed"));
    }

    #[test]
    fn expired_signing_certificate_blocks_t() {
        let fx = Fixture::new();
        let controller = fx.controller().at(at(2031, 1, 1));
        let err = controller
            .extend(&document(&["S-1"]), &ExtensionParameters::new(SignatureLevel::T))
            .unwrap_err();
        assert!(matches!(err, SigningError::CryptographicUnacceptable(_)));
    }

    #[test]
    fn only_targeted_signatures_change() {
        let fx = Fixture::new();
        let doc = document(&["A", "B"]);
        let out = fx
            .controller()
            .extend(&doc, &ExtensionParameters::new(SignatureLevel::T).only(["A"]))
            .unwrap();
        assert_eq!(out.signatures[0].level(), SignatureLevel::T);
        assert_eq!(out.signatures[1], doc.signatures[1]);

        let signing = fx
            .controller()
            .extend(&doc, &ExtensionParameters::new(SignatureLevel::T).during_signing("B"))
            .unwrap();
        assert_eq!(signing.signatures[0], doc.signatures[0]);
        assert_eq!(signing.signatures[1].level(), SignatureLevel::T);
    }

    #[test]
    fn unknown_or_missing_signatures_are_rejected() {
        let fx = Fixture::new();
        let err = fx
            .controller()
            .extend(&document(&[]), &ExtensionParameters::new(SignatureLevel::T))
            .unwrap_err();
        assert!(err.is_structural());

        let err = fx
            .controller()
            .extend(&document(&["A"]), &ExtensionParameters::new(SignatureLevel::T).only(["Z"]))
            .unwrap_err();
        assert!(matches!(err, SigningError::InvalidInput(_)));
    }

    #[test]
    fn refresh_starts_a_new_archive_cycle() {
        let fx = Fixture::new();
        let params = ExtensionParameters::new(SignatureLevel::Lta).cascading();
        let lta = fx.controller().extend(&document(&["S-1"]), &params).unwrap();
        let again = fx.controller().extend(&lta, &params).unwrap();
        assert_eq!(again, lta);

        let refreshed = fx.controller().extend(&lta, &params.clone().refreshing()).unwrap();
        let archives = refreshed.signatures[0]
            .unsigned
            .timestamps_of(TimestampType::ArchiveTimestamp)
            .count();
        assert_eq!(archives, 2);
        assert!(refreshed.signatures[0].unsigned.check_structure().is_ok());
    }
}
