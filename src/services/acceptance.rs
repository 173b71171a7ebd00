//! Acceptance of a signature, or of a timestamp treated as a signature-like
//! token, at one evaluation instant.
//!
//! The validator assembles the concrete chain from the policy constraints of
//! the token's context:
//!
//! 1. signing-certificate reference present
//! 2. signing-certificate attribute unique
//! 3. signing-certificate reference digest matches the presented chain
//! 4. full certificate chain referenced
//! 5. signature algorithm and key size acceptable
//! 6. every relied-upon digest acceptable (only when 5 passed)
//! 7. every signing-certificate-chain reference digest acceptable
//!
//! Checks missing from the policy are not run. Callers may append further
//! items, such as field-lock or message-imprint checks.

use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};

use crate::domain::document::SignedToken;
use crate::domain::policy::ContextConstraints;
use crate::domain::references::CertificateRef;
use crate::domain::verification::{
    ConstraintResult, CryptographicVerdict, Level, TokenKind, TokenReport,
};
use crate::services::chain::{ChainItem, CheckOutcome, ConstraintChain, FnItem};
use crate::services::cryptographic_checker::CryptographicChecker;

pub const SIGNING_CERTIFICATE_PRESENT: &str = "signing-certificate-present";
pub const SIGNING_CERTIFICATE_UNIQUE: &str = "signing-certificate-unique";
pub const SIGNING_CERTIFICATE_REFERENCE_VALID: &str = "signing-certificate-reference-valid";
pub const ALL_CERTIFICATES_REFERENCED: &str = "all-certificates-referenced";
pub const SIGNATURE_CRYPTOGRAPHIC: &str = "signature-cryptographic";
pub const DIGEST_MATCHERS_CRYPTOGRAPHIC: &str = "digest-matchers-cryptographic";
pub const CERTIFICATE_REFERENCES_CRYPTOGRAPHIC: &str = "certificate-references-cryptographic";

pub struct SignatureAcceptanceValidator<'a> {
    constraints: &'a ContextConstraints,
    at: DateTime<Utc>,
    extra_items: Vec<Box<dyn ChainItem + 'a>>,
}

impl<'a> SignatureAcceptanceValidator<'a> {
    #[must_use]
    pub fn new(constraints: &'a ContextConstraints, at: DateTime<Utc>) -> Self {
        Self {
            constraints,
            at,
            extra_items: Vec::new(),
        }
    }

    /// Append an item that runs after the standard checks.
    #[must_use]
    pub fn with_item(mut self, item: impl ChainItem + 'a) -> Self {
        self.extra_items.push(Box::new(item));
        self
    }

    #[must_use]
    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn validate(self, token: &dyn SignedToken, kind: TokenKind) -> TokenReport {
        let token_id = token.token_id().to_string();
        log::debug!("Running acceptance checks for {token_id} at {}", self.at);

        let recorded: RefCell<Vec<CryptographicVerdict>> = RefCell::new(Vec::new());
        let signature_acceptable = Cell::new(false);
        let c = self.constraints;
        let at = self.at;

        let mut chain = ConstraintChain::new(format!("acceptance:{token_id}"));

        if let Some(level) = c.signing_certificate_present {
            chain.push(FnItem::new(SIGNING_CERTIFICATE_PRESENT, level, || {
                let present = token
                    .signing_certificate_attributes()
                    .iter()
                    .any(|attr| !attr.refs.is_empty());
                CheckOutcome::from_bool(present, "No signing certificate reference found")
            }));
        }

        if let Some(level) = c.signing_certificate_unique {
            chain.push(FnItem::new(SIGNING_CERTIFICATE_UNIQUE, level, || {
                let count = token.signing_certificate_attributes().len();
                CheckOutcome::from_bool(
                    count == 1,
                    format!("Expected one signing certificate attribute, found {count}"),
                )
            }));
        }

        if let Some(level) = c.signing_certificate_reference_valid {
            chain.push(FnItem::new(SIGNING_CERTIFICATE_REFERENCE_VALID, level, || {
                let reference = token
                    .signing_certificate_attributes()
                    .first()
                    .and_then(|attr| attr.refs.first());
                match reference {
                    None => CheckOutcome::fail("No signing certificate reference to verify"),
                    Some(r) if r.resolve(token.certificates()).is_some() => CheckOutcome::pass(),
                    Some(_) => CheckOutcome::fail(
                        "Signing certificate reference does not match any presented certificate",
                    ),
                }
            }));
        }

        if let Some(level) = c.all_certificates_referenced {
            chain.push(FnItem::new(ALL_CERTIFICATES_REFERENCED, level, || {
                let refs: Vec<&CertificateRef> = token
                    .signing_certificate_attributes()
                    .iter()
                    .flat_map(|attr| attr.refs.iter())
                    .collect();
                let missing: Vec<&str> = token
                    .certificates()
                    .iter()
                    .filter(|cert| !refs.iter().any(|r| r.matches(cert)))
                    .map(|cert| cert.subject())
                    .collect();
                CheckOutcome::from_bool(
                    missing.is_empty(),
                    format!("Certificates not referenced: {}", missing.join("; ")),
                )
            }));
        }

        if let Some(policy) = c.cryptographic.as_ref() {
            let checker = CryptographicChecker::new(policy, at);
            let token_id = token_id.as_str();
            let recorded = &recorded;
            let signature_acceptable = &signature_acceptable;

            chain.push(FnItem::new(SIGNATURE_CRYPTOGRAPHIC, policy.level, move || {
                let Some(signature) = token.token_signature() else {
                    return CheckOutcome::fail("Signature algorithm could not be determined");
                };
                let check = checker.check_signature(signature, token_id);
                signature_acceptable.set(check.is_acceptable());
                let outcome = CheckOutcome::from_bool(
                    check.is_acceptable(),
                    check.verdict.failure_reason.clone().unwrap_or_default(),
                )
                .with_sub_results(check.report.results.clone());
                recorded.borrow_mut().push(check.verdict);
                outcome
            }));

            chain.push(DigestMatchersItem {
                token,
                checker: CryptographicChecker::new(policy, at),
                level: policy.level,
                enabled: signature_acceptable,
                recorded,
            });
        }

        let signing_bucket = c.signing_certificate_bucket();
        let ca_bucket = c.ca_certificate_bucket();
        if let Some(level) = signing_bucket.or(ca_bucket).map(|p| p.level) {
            let recorded = &recorded;
            chain.push(FnItem::new(CERTIFICATE_REFERENCES_CRYPTOGRAPHIC, level, move || {
                let mut sub_results = Vec::new();
                let mut failure = None;
                let refs = token
                    .signing_certificate_attributes()
                    .iter()
                    .flat_map(|attr| attr.refs.iter().enumerate());
                for (position, reference) in refs {
                    let bucket = if position == 0 { signing_bucket } else { ca_bucket };
                    let (Some(policy), Some(algorithm)) = (bucket, reference.digest_algorithm())
                    else {
                        continue;
                    };
                    let name = format!("certificate-reference #{}", position + 1);
                    let check = CryptographicChecker::new(policy, at).check_digest(algorithm, &name);
                    sub_results.push(ConstraintResult {
                        name,
                        status: check.report.conclusion,
                        message: check.verdict.failure_reason.clone(),
                        sub_results: Vec::new(),
                    });
                    if !check.is_acceptable() && failure.is_none() {
                        failure = check.verdict.failure_reason.clone();
                        recorded.borrow_mut().push(check.verdict);
                    }
                }
                let outcome = match failure {
                    None => CheckOutcome::pass(),
                    Some(reason) => CheckOutcome::fail(reason),
                };
                outcome.with_sub_results(sub_results)
            }));
        }

        for item in self.extra_items {
            chain.push_boxed(item);
        }

        let report = chain.execute();
        // items borrow `token_id` and the verdict cells
        drop(chain);
        let verdicts = recorded.take();
        let cryptographic = verdicts
            .iter()
            .find(|v| !v.acceptable)
            .or_else(|| verdicts.first())
            .cloned();

        if report.is_ok() {
            log::debug!("{token_id} accepted ({:?})", report.indication);
        } else if let Some(failure) = report.failure() {
            log::warn!(
                "{token_id} rejected by {}: {}",
                failure.name,
                failure.message.as_deref().unwrap_or("no detail")
            );
        }

        TokenReport {
            token_id,
            kind,
            chain: report,
            cryptographic,
        }
    }
}

/// Step 6: every digest the token relies on, stopping at the first failure.
/// Not run when the signature algorithm itself was not acceptable.
struct DigestMatchersItem<'t> {
    token: &'t dyn SignedToken,
    checker: CryptographicChecker<'t>,
    level: Level,
    enabled: &'t Cell<bool>,
    recorded: &'t RefCell<Vec<CryptographicVerdict>>,
}

impl ChainItem for DigestMatchersItem<'_> {
    fn name(&self) -> &str {
        DIGEST_MATCHERS_CRYPTOGRAPHIC
    }

    fn level(&self) -> Level {
        if self.enabled.get() {
            self.level
        } else {
            Level::Ignore
        }
    }

    fn check(&self) -> CheckOutcome {
        for (position, matcher) in self.token.digest_matchers().iter().enumerate() {
            let Some(algorithm) = matcher.algorithm else {
                continue;
            };
            let check = self
                .checker
                .check_digest(algorithm, &matcher.describe(position));
            if !check.is_acceptable() {
                let reason = check.verdict.failure_reason.clone().unwrap_or_default();
                let outcome = CheckOutcome::fail(format!(
                    "{}: {reason}",
                    check.verdict.concerned_material
                ))
                .with_sub_results(check.report.results.clone());
                self.recorded.borrow_mut().push(check.verdict);
                return outcome;
            }
        }
        CheckOutcome::pass()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::crypto::{
        CertificateToken, DigestAlgorithm, EncryptionAlgorithm, SignatureAlgorithm,
        TokenSignature,
    };
    use crate::domain::policy::{CryptographicPolicy, ValidationPolicy};
    use crate::domain::references::{
        DigestMatcher, DigestMatcherKind, SigningCertificateAttribute,
    };
    use crate::domain::verification::{ConstraintStatus, Indication};
    use chrono::TimeZone;

    struct Token {
        signature: TokenSignature,
        attributes: Vec<SigningCertificateAttribute>,
        matchers: Vec<DigestMatcher>,
        chain: Vec<CertificateToken>,
    }

    impl SignedToken for Token {
        fn token_id(&self) -> &str {
            "S-1"
        }
        fn token_signature(&self) -> Option<&TokenSignature> {
            Some(&self.signature)
        }
        fn signing_certificate_attributes(&self) -> &[SigningCertificateAttribute] {
            &self.attributes
        }
        fn digest_matchers(&self) -> Vec<DigestMatcher> {
            self.matchers.clone()
        }
        fn certificates(&self) -> &[CertificateToken] {
            &self.chain
        }
    }

    fn at(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn cert(subject: &str, issuer: &str) -> CertificateToken {
        CertificateToken::from_parts(
            format!("{subject}/{issuer}").into_bytes(),
            subject,
            issuer,
            "01",
            at(2010),
            at(2040),
        )
    }

    fn token(digest: DigestAlgorithm) -> Token {
        let chain = vec![cert("CN=Signer", "CN=CA"), cert("CN=CA", "CN=CA")];
        Token {
            signature: TokenSignature::new(
                SignatureAlgorithm::new(EncryptionAlgorithm::Rsa, digest),
                Some(3072),
            ),
            attributes: vec![SigningCertificateAttribute::for_chain(
                &chain,
                DigestAlgorithm::Sha256,
            )],
            matchers: vec![
                DigestMatcher::new(DigestMatcherKind::Reference, DigestAlgorithm::Sha256)
                    .named("r-doc"),
                DigestMatcher::new(DigestMatcherKind::SignedProperties, digest),
            ],
            chain,
        }
    }

    #[test]
    fn well_formed_token_passes_every_step() {
        let policy = ValidationPolicy::default();
        let report = SignatureAcceptanceValidator::new(&policy.signature, at(2024))
            .validate(&token(DigestAlgorithm::Sha256), TokenKind::Signature);

        assert!(report.is_ok());
        assert_eq!(report.chain.indication, Indication::Passed);
        let names: Vec<&str> = report.chain.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                SIGNING_CERTIFICATE_PRESENT,
                SIGNING_CERTIFICATE_UNIQUE,
                SIGNING_CERTIFICATE_REFERENCE_VALID,
                ALL_CERTIFICATES_REFERENCED,
                SIGNATURE_CRYPTOGRAPHIC,
                DIGEST_MATCHERS_CRYPTOGRAPHIC,
                CERTIFICATE_REFERENCES_CRYPTOGRAPHIC,
            ]
        );
        let verdict = report.cryptographic.unwrap();
        assert!(verdict.acceptable);
        assert_eq!(verdict.concerned_material, "S-1");
    }

    #[test]
    fn expired_sha1_signature_is_rejected_with_signature_id() {
        let mut policy = ValidationPolicy::default();
        policy.signature.cryptographic = Some(
            CryptographicPolicy::default().with_expiration(DigestAlgorithm::Sha1, Some(at(2016))),
        );
        let report = SignatureAcceptanceValidator::new(&policy.signature, at(2020))
            .validate(&token(DigestAlgorithm::Sha1), TokenKind::Signature);

        assert!(!report.is_ok());
        assert_eq!(
            report.chain.failure().map(|r| r.name.as_str()),
            Some(SIGNATURE_CRYPTOGRAPHIC)
        );
        assert!(report.chain.result(DIGEST_MATCHERS_CRYPTOGRAPHIC).is_none());
        let verdict = report.cryptographic.unwrap();
        assert!(!verdict.acceptable);
        assert_eq!(verdict.concerned_material, "S-1");
        assert_eq!(verdict.algorithm, "SHA1");
    }

    #[test]
    fn failing_digest_matcher_is_named_by_position() {
        let mut policy = ValidationPolicy::default();
        policy.signature.cryptographic = Some(
            CryptographicPolicy::default().with_expiration(DigestAlgorithm::Sha224, Some(at(2016))),
        );
        let mut tok = token(DigestAlgorithm::Sha256);
        tok.matchers[1].algorithm = Some(DigestAlgorithm::Sha224);

        let report = SignatureAcceptanceValidator::new(&policy.signature, at(2020))
            .validate(&tok, TokenKind::Signature);
        let failure = report.chain.failure().unwrap();
        assert_eq!(failure.name, DIGEST_MATCHERS_CRYPTOGRAPHIC);
        assert!(failure
            .message
            .as_deref()
            .is_some_and(|m| m.starts_with("SIGNED_PROPERTIES #2")));
        assert_eq!(
            report.cryptographic.unwrap().concerned_material,
            "SIGNED_PROPERTIES #2"
        );
    }

    #[test]
    fn missing_reference_stops_chain_early() {
        let policy = ValidationPolicy::default();
        let mut tok = token(DigestAlgorithm::Sha256);
        tok.attributes.clear();
        let report = SignatureAcceptanceValidator::new(&policy.signature, at(2024))
            .validate(&tok, TokenKind::Signature);

        assert_eq!(report.chain.results.len(), 1);
        assert_eq!(report.chain.results[0].status, ConstraintStatus::NotOk);
        assert!(report.cryptographic.is_none());
    }

    #[test]
    fn unreferenced_chain_only_warns() {
        let policy = ValidationPolicy::default();
        let mut tok = token(DigestAlgorithm::Sha256);
        tok.attributes[0].refs.truncate(1);
        let report = SignatureAcceptanceValidator::new(&policy.signature, at(2024))
            .validate(&tok, TokenKind::Signature);

        assert!(report.is_ok());
        assert_eq!(report.chain.indication, Indication::PassedWithWarnings);
        assert_eq!(
            report.chain.result(ALL_CERTIFICATES_REFERENCED).map(|r| r.status),
            Some(ConstraintStatus::Warn)
        );
    }

    #[test]
    fn empty_constraints_run_nothing() {
        let constraints = ContextConstraints::empty();
        let report = SignatureAcceptanceValidator::new(&constraints, at(2024))
            .validate(&token(DigestAlgorithm::Md5), TokenKind::Timestamp);
        assert!(report.chain.results.is_empty());
        assert!(report.is_ok());
    }

    #[test]
    fn extra_items_run_last() {
        let policy = ValidationPolicy::default();
        let report = SignatureAcceptanceValidator::new(&policy.signature, at(2024))
            .with_item(FnItem::new("custom", Level::Fail, || CheckOutcome::fail("nope")))
            .validate(&token(DigestAlgorithm::Sha256), TokenKind::Signature);
        assert_eq!(report.chain.results.last().map(|r| r.name.as_str()), Some("custom"));
        assert!(!report.is_ok());
    }
}
