//! Document validation at one instant.
//!
//! Runs the acceptance chain of every signature and every embedded
//! timestamp, recomputes each timestamp's covered data to check its message
//! imprint, and reports per certificate whether revocation data is at hand.
//! Content problems end up in the report; only unreadable input is an error.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::adapters::canonicalizer::Canonicalizer;
use crate::adapters::format_for;
use crate::domain::crypto::{CertificateToken, TokenId};
use crate::domain::document::{SignatureEntry, SignatureIntegrity, SignedDocument};
use crate::domain::policy::ValidationPolicy;
use crate::domain::timestamp::TimestampToken;
use crate::domain::validation_data::ValidationData;
use crate::domain::verification::{
    ConstraintResult, ConstraintStatus, Level, SignatureReport, TokenKind, TokenReport,
    VerificationReport,
};
use crate::infra::error::{SigningError, SigningResult};
use crate::services::acceptance::SignatureAcceptanceValidator;
use crate::services::chain::{ChainItem, CheckOutcome, ConstraintChain, FnItem};
use crate::services::collector::RevocationSource;
use crate::services::field_lock::FieldLockRule;
use crate::services::format::SignatureFormat;
use crate::services::timestamp_incorporator::recompute_covered_data;

pub const SIGNATURE_INTACT: &str = "signature-intact";
pub const TIMESTAMP_MESSAGE_IMPRINT: &str = "timestamp-message-imprint";
pub const REVOCATION_DATA_AVAILABLE: &str = "revocation-data-available";

/// Recomputes what a timestamp covered and compares the token's imprint.
pub struct TimestampMessageImprintCheck<'a> {
    format: &'a dyn SignatureFormat,
    signature: &'a SignatureEntry,
    token: &'a TimestampToken,
    level: Level,
}

impl<'a> TimestampMessageImprintCheck<'a> {
    #[must_use]
    pub fn new(
        format: &'a dyn SignatureFormat,
        signature: &'a SignatureEntry,
        token: &'a TimestampToken,
        level: Level,
    ) -> Self {
        Self {
            format,
            signature,
            token,
            level,
        }
    }
}

impl ChainItem for TimestampMessageImprintCheck<'_> {
    fn name(&self) -> &str {
        TIMESTAMP_MESSAGE_IMPRINT
    }

    fn level(&self) -> Level {
        self.level
    }

    fn check(&self) -> CheckOutcome {
        let verified = recompute_covered_data(self.format, self.signature, self.token.id())
            .and_then(|covered| self.token.validate_message_imprint(&covered.bytes));
        match verified {
            Ok(()) => CheckOutcome::pass(),
            Err(e) => CheckOutcome::fail(e.to_string()),
        }
    }
}

pub struct DocumentValidator<'a> {
    policy: &'a ValidationPolicy,
    revocations: Option<&'a dyn RevocationSource>,
    canonicalizer: Arc<dyn Canonicalizer>,
    field_locks: Vec<FieldLockRule>,
}

impl<'a> DocumentValidator<'a> {
    #[must_use]
    pub fn new(policy: &'a ValidationPolicy, canonicalizer: Arc<dyn Canonicalizer>) -> Self {
        Self {
            policy,
            revocations: None,
            canonicalizer,
            field_locks: Vec::new(),
        }
    }

    /// Ask `source` for revocation data the document does not embed.
    #[must_use]
    pub fn with_revocation_source(mut self, source: &'a dyn RevocationSource) -> Self {
        self.revocations = Some(source);
        self
    }

    #[must_use]
    pub fn with_field_lock(mut self, rule: FieldLockRule) -> Self {
        self.field_locks.push(rule);
        self
    }

    pub fn validate(
        &self,
        document: &SignedDocument,
        at: DateTime<Utc>,
    ) -> SigningResult<VerificationReport> {
        document.check_structure()?;
        if document.signatures.is_empty() {
            return Err(SigningError::StructuralError(format!(
                "Document '{}' contains no signatures",
                document.name
            )));
        }
        log::info!(
            "Validating {} signature(s) of '{}' at {at}",
            document.signatures.len(),
            document.name
        );
        let signatures = document
            .signatures
            .iter()
            .map(|signature| self.validate_signature(signature, at))
            .collect();
        Ok(VerificationReport {
            document: document.name.clone(),
            evaluated_at: at,
            signatures,
        })
    }

    fn validate_signature(&self, signature: &SignatureEntry, at: DateTime<Utc>) -> SignatureReport {
        let format = format_for(signature.form, Arc::clone(&self.canonicalizer));
        let level = signature.level();

        // An unverified signature is reported but does not fail on its own.
        let intact_level = match signature.integrity {
            SignatureIntegrity::Unknown => Level::Warn,
            _ => Level::Fail,
        };
        let mut validator = SignatureAcceptanceValidator::new(&self.policy.signature, at).with_item(
            FnItem::new(SIGNATURE_INTACT, intact_level, || match &signature.integrity {
                SignatureIntegrity::Intact => CheckOutcome::pass(),
                SignatureIntegrity::Broken(reason) => {
                    CheckOutcome::fail(format!("Cryptographic signature verification has failed: {reason}"))
                }
                SignatureIntegrity::Unknown => {
                    CheckOutcome::fail("Cryptographic signature verification was not performed")
                }
            }),
        );
        for rule in self.field_locks.iter().filter(|r| r.signature_id == signature.id) {
            validator = validator.with_item(rule.to_check());
        }
        let acceptance = validator.validate(signature, TokenKind::Signature);

        let timestamps: Vec<TokenReport> = signature
            .unsigned
            .timestamps()
            .map(|token| self.validate_timestamp(format.as_ref(), signature, token, at))
            .collect();

        let report = SignatureReport {
            signature_id: signature.id.clone(),
            level,
            profile: signature.form.profile_name(level),
            acceptance,
            timestamps,
            certificates: self.certificate_checks(signature),
        };
        if report.is_ok() {
            log::info!("Signature {} passed ({})", signature.id, report.profile);
        } else {
            log::warn!("Signature {} failed validation", signature.id);
        }
        report
    }

    fn validate_timestamp(
        &self,
        format: &dyn SignatureFormat,
        signature: &SignatureEntry,
        token: &TimestampToken,
        at: DateTime<Utc>,
    ) -> TokenReport {
        let mut validator = SignatureAcceptanceValidator::new(&self.policy.timestamp, at);
        if let Some(level) = self.policy.timestamp.message_imprint_matches {
            validator =
                validator.with_item(TimestampMessageImprintCheck::new(format, signature, token, level));
        }
        validator.validate(token, TokenKind::Timestamp)
    }

    /// One advisory result per non-self-signed certificate the signature or
    /// its timestamps present.
    fn certificate_checks(&self, signature: &SignatureEntry) -> Vec<ConstraintResult> {
        let Some(level) = self.policy.revocation_data_available else {
            return Vec::new();
        };
        let embedded = signature.unsigned.embedded_validation_data();
        let mut seen = BTreeSet::<TokenId>::new();
        let certificates = signature
            .certificates
            .iter()
            .chain(signature.unsigned.timestamps().flat_map(TimestampToken::certificates))
            .chain(embedded.certificates())
            .filter(|cert| !cert.is_self_signed() && seen.insert(cert.id()))
            .cloned()
            .collect::<Vec<_>>();

        certificates
            .iter()
            .filter_map(|cert| {
                let item = FnItem::new(REVOCATION_DATA_AVAILABLE, level, || {
                    self.revocation_outcome(cert, &embedded)
                });
                let report = ConstraintChain::new(format!("certificate:{}", cert.subject()))
                    .with(item)
                    .execute();
                report.results.into_iter().next().map(|mut result| {
                    result.name = format!("{REVOCATION_DATA_AVAILABLE}:{}", cert.subject());
                    result
                })
            })
            .collect()
    }

    fn revocation_outcome(&self, cert: &CertificateToken, embedded: &ValidationData) -> CheckOutcome {
        if embedded.has_revocation_for(cert) {
            return CheckOutcome::pass().with_message("embedded");
        }
        let Some(source) = self.revocations else {
            return CheckOutcome::fail(format!("No revocation data embedded for {}", cert.subject()));
        };
        match source.fetch(cert, embedded.find_issuer(cert)) {
            Ok(Some(tokens)) if !tokens.is_empty() => {
                CheckOutcome::pass().with_message(format!("{} token(s) available from source", tokens.len()))
            }
            Ok(_) => CheckOutcome::fail(format!("No revocation data found for {}", cert.subject())),
            Err(e) => {
                log::warn!("Revocation lookup for {} failed: {e}", cert.subject());
                CheckOutcome::fail(format!("Revocation source failed: {e}"))
            }
        }
    }
}

/// Certificates whose revocation check did not pass.
#[must_use]
pub fn unchecked_certificates(report: &SignatureReport) -> Vec<&ConstraintResult> {
    report
        .certificates
        .iter()
        .filter(|r| r.status != ConstraintStatus::Ok)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::canonicalizer::RenderedCanonicalizer;
    use crate::adapters::offline_tsa::OfflineTimestampSource;
    use crate::adapters::sources::{CertificatePool, RevocationPool};
    use crate::domain::crypto::{DigestAlgorithm, EncryptionAlgorithm, SignatureAlgorithm, TokenSignature};
    use crate::domain::document::SignatureForm;
    use crate::domain::level::SignatureLevel;
    use crate::domain::references::SigningCertificateAttribute;
    use crate::domain::timestamp::TimestampType;
    use crate::domain::unsigned::UnsignedMaterial;
    use crate::domain::validation_data::OcspToken;
    use crate::domain::verification::Indication;
    use crate::services::extension::{ExtensionParameters, LevelExtensionController};
    use crate::services::field_lock::{FieldLock, LockAction};
    use chrono::TimeZone;

    fn at(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 5, 1, 0, 0, 0).unwrap()
    }

    fn cert(subject: &str, issuer: &str, serial: &str) -> CertificateToken {
        CertificateToken::from_parts(
            format!("{subject}/{serial}").into_bytes(),
            subject,
            issuer,
            serial,
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn signature(digest: DigestAlgorithm) -> SignatureEntry {
        let chain = vec![cert("CN=Signer", "CN=Root", "10"), cert("CN=Root", "CN=Root", "01")];
        SignatureEntry {
            id: "S-1".into(),
            form: SignatureForm::Cms,
            signed_bytes: vec![0x31, 0x00],
            signature_value: vec![0x11; 32],
            signature: TokenSignature::new(
                SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, digest),
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

    fn revocations() -> RevocationPool {
        let mut pool = RevocationPool::new();
        pool.add_ocsp(OcspToken::new(b"ocsp-signer".to_vec(), "CN=Root", "10", at(2024)));
        pool.add_ocsp(OcspToken::new(b"ocsp-tsa".to_vec(), "CN=Root", "20", at(2024)));
        pool
    }

    fn tsa() -> OfflineTimestampSource {
        OfflineTimestampSource::at(at(2024)).with_tsa_chain(
            vec![cert("CN=TSA", "CN=Root", "20"), cert("CN=Root", "CN=Root", "01")],
            TokenSignature::new(
                SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, DigestAlgorithm::Sha256),
                Some(3072),
            ),
        )
    }

    fn lta_document() -> SignedDocument {
        let policy = ValidationPolicy::default();
        let tsa = tsa();
        let certs = CertificatePool::new();
        let revocations = revocations();
        LevelExtensionController::new(
            &policy,
            &tsa,
            &certs,
            &revocations,
            Arc::new(RenderedCanonicalizer),
        )
        .at(at(2024))
        .extend(
            &SignedDocument::new("doc", vec![signature(DigestAlgorithm::Sha256)]),
            &ExtensionParameters::new(SignatureLevel::Lta).cascading(),
        )
        .unwrap()
    }

    #[test]
    fn extended_document_validates() {
        let policy = ValidationPolicy::default();
        let revocations = revocations();
        let report = DocumentValidator::new(&policy, Arc::new(RenderedCanonicalizer))
            .with_revocation_source(&revocations)
            .validate(&lta_document(), at(2025))
            .unwrap();
        assert!(report.success());
        let sig = report.signature("S-1").unwrap();
        assert_eq!(sig.level, SignatureLevel::Lta);
        assert_eq!(sig.profile, "CAdES-BASELINE-LTA");
        assert_eq!(sig.timestamps.len(), 2);
        for ts in &sig.timestamps {
            assert!(ts.chain.result(TIMESTAMP_MESSAGE_IMPRINT).unwrap().is_ok());
        }
        assert!(unchecked_certificates(sig).is_empty());
    }

    #[test]
    fn tampered_coverage_breaks_archive_imprint() {
        let mut doc = lta_document();
        doc.signatures[0].signed_bytes = vec![0x31, 0x01, 0x00];
        let policy = ValidationPolicy::default();
        let report = DocumentValidator::new(&policy, Arc::new(RenderedCanonicalizer))
            .validate(&doc, at(2025))
            .unwrap();
        let sig = &report.signatures[0];
        let archive = sig
            .timestamps
            .iter()
            .find(|t| {
                doc.signatures[0]
                    .find_timestamp(&t.token_id)
                    .is_some_and(|tok| tok.timestamp_type() == TimestampType::ArchiveTimestamp)
            })
            .unwrap();
        assert!(!archive.is_ok());
        assert!(!report.success());
    }

    #[test]
    fn unverified_integrity_only_warns() {
        let policy = ValidationPolicy::default();
        let mut entry = signature(DigestAlgorithm::Sha256);
        entry.integrity = SignatureIntegrity::Unknown;
        let report = DocumentValidator::new(&policy, Arc::new(RenderedCanonicalizer))
            .validate(&SignedDocument::new("doc", vec![entry]), at(2024))
            .unwrap();
        let acceptance = &report.signatures[0].acceptance;
        assert!(acceptance.is_ok());
        assert_eq!(
            acceptance.chain.result(SIGNATURE_INTACT).unwrap().status,
            ConstraintStatus::Warn
        );
    }

    #[test]
    fn sha1_signature_rejected_after_expiry() {
        let mut policy = ValidationPolicy::default();
        policy.signature.cryptographic = policy
            .signature
            .cryptographic
            .map(|c| c.with_expiration(DigestAlgorithm::Sha1, Some(Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap())));
        let doc = SignedDocument::new("doc", vec![signature(DigestAlgorithm::Sha1)]);
        let validator = DocumentValidator::new(&policy, Arc::new(RenderedCanonicalizer));

        let early = validator.validate(&doc, Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap()).unwrap();
        assert!(early.signatures[0].acceptance.is_ok());

        let late = validator.validate(&doc, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()).unwrap();
        let verdict = late.signatures[0].acceptance.cryptographic.as_ref().unwrap();
        assert!(!verdict.acceptable);
        assert_eq!(verdict.concerned_material, "S-1");
        assert_eq!(verdict.algorithm, "SHA1");
        assert_eq!(late.signatures[0].acceptance.chain.indication, Indication::Failed);
    }

    #[test]
    fn missing_revocation_data_only_warns() {
        let policy = ValidationPolicy::default();
        let doc = SignedDocument::new("doc", vec![signature(DigestAlgorithm::Sha256)]);
        let report = DocumentValidator::new(&policy, Arc::new(RenderedCanonicalizer))
            .validate(&doc, at(2024))
            .unwrap();
        let sig = &report.signatures[0];
        assert_eq!(sig.certificates.len(), 1);
        assert_eq!(sig.certificates[0].status, ConstraintStatus::Warn);
        assert!(sig.is_ok());
    }

    struct Unreachable;

    impl RevocationSource for Unreachable {
        fn fetch(
            &self,
            _cert: &CertificateToken,
            _issuer: Option<&CertificateToken>,
        ) -> SigningResult<Option<Vec<crate::domain::validation_data::RevocationToken>>> {
            Err(SigningError::RevocationError("responder down".into()))
        }
    }

    #[test]
    fn failing_revocation_source_degrades_only_that_certificate() {
        let policy = ValidationPolicy::default();
        let doc = SignedDocument::new("doc", vec![signature(DigestAlgorithm::Sha256)]);
        let report = DocumentValidator::new(&policy, Arc::new(RenderedCanonicalizer))
            .with_revocation_source(&Unreachable)
            .validate(&doc, at(2024))
            .unwrap();
        let result = &report.signatures[0].certificates[0];
        assert_eq!(result.status, ConstraintStatus::Warn);
        assert!(result.message.as_deref().unwrap().contains("responder down"));
        assert!(report.success());
    }

    #[test]
    fn field_lock_violation_fails_signature() {
        let policy = ValidationPolicy::default();
        let doc = SignedDocument::new("doc", vec![signature(DigestAlgorithm::Sha256)]);
        let report = DocumentValidator::new(&policy, Arc::new(RenderedCanonicalizer))
            .with_field_lock(FieldLockRule {
                signature_id: "S-1".into(),
                lock: FieldLock {
                    action: LockAction::All,
                    fields: Vec::new(),
                },
                modified_fields: vec!["amount".into()],
                level: Level::Fail,
            })
            .validate(&doc, at(2024))
            .unwrap();
        assert!(!report.signatures[0].acceptance.is_ok());
    }
}
