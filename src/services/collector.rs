//! Gathers the certificates and revocation data a token needs to be verified
//! offline, returning only what is not embedded yet.

use std::collections::BTreeSet;

use crate::domain::crypto::{CertificateToken, TokenId};
use crate::domain::document::SignedToken;
use crate::domain::validation_data::{RevocationToken, ValidationData};
use crate::infra::error::SigningResult;

/// Where missing issuer certificates come from (AIA fetchers, local stores).
pub trait CertificateSource: Send + Sync {
    fn issuer_of(&self, cert: &CertificateToken) -> Option<CertificateToken>;
}

/// Where CRLs and OCSP responses come from.
pub trait RevocationSource: Send + Sync {
    /// `Ok(None)` when no revocation data exists for the certificate; `Err`
    /// when the source itself failed.
    fn fetch(
        &self,
        cert: &CertificateToken,
        issuer: Option<&CertificateToken>,
    ) -> SigningResult<Option<Vec<RevocationToken>>>;
}

pub struct ValidationDataCollector<'a> {
    certificates: &'a dyn CertificateSource,
    revocations: &'a dyn RevocationSource,
}

impl<'a> ValidationDataCollector<'a> {
    #[must_use]
    pub fn new(certificates: &'a dyn CertificateSource, revocations: &'a dyn RevocationSource) -> Self {
        Self {
            certificates,
            revocations,
        }
    }

    /// Incremental validation data for one token.
    pub fn collect(
        &self,
        token: &dyn SignedToken,
        already_embedded: &ValidationData,
    ) -> SigningResult<ValidationData> {
        self.collect_all(&[token], already_embedded)
    }

    /// Incremental validation data for several tokens at once (a signature
    /// and its timestamps), deduplicated across them.
    pub fn collect_all(
        &self,
        tokens: &[&dyn SignedToken],
        already_embedded: &ValidationData,
    ) -> SigningResult<ValidationData> {
        let mut gathered = ValidationData::new();
        for token in tokens {
            log::debug!("Collecting validation data for {}", token.token_id());
            for cert in token.certificates() {
                self.add_chain(cert, already_embedded, &mut gathered);
            }
        }

        let chain: Vec<CertificateToken> = gathered.certificates().cloned().collect();
        for cert in &chain {
            if cert.is_self_signed()
                || already_embedded.has_revocation_for(cert)
                || gathered.has_revocation_for(cert)
            {
                continue;
            }
            let issuer = gathered
                .find_issuer(cert)
                .or_else(|| already_embedded.find_issuer(cert));
            match self.revocations.fetch(cert, issuer)? {
                Some(tokens) => {
                    for token in tokens {
                        gathered.add_revocation(token);
                    }
                }
                None => log::warn!("No revocation data found for {}", cert.subject()),
            }
        }

        let incremental = difference(gathered, already_embedded);
        log::debug!("Collected {} new validation data token(s)", incremental.len());
        Ok(incremental)
    }

    /// Add `cert` and its issuers up to a self-signed certificate or the
    /// first issuer nobody knows.
    fn add_chain(
        &self,
        cert: &CertificateToken,
        already_embedded: &ValidationData,
        gathered: &mut ValidationData,
    ) {
        let mut seen = BTreeSet::<TokenId>::new();
        let mut current = Some(cert.clone());
        while let Some(cert) = current.take() {
            if !seen.insert(cert.id()) {
                break;
            }
            if !cert.is_self_signed() {
                current = gathered
                    .find_issuer(&cert)
                    .or_else(|| already_embedded.find_issuer(&cert))
                    .cloned()
                    .or_else(|| self.certificates.issuer_of(&cert));
                if current.is_none() {
                    log::warn!("Issuer of {} could not be found", cert.subject());
                }
            }
            gathered.add_certificate(cert);
        }
    }
}

/// Tokens of `gathered` whose content hash is not in `embedded`.
fn difference(gathered: ValidationData, embedded: &ValidationData) -> ValidationData {
    let mut result = ValidationData::new();
    for cert in gathered.certificates() {
        if !embedded.contains(&cert.id()) {
            result.add_certificate(cert.clone());
        }
    }
    for crl in gathered.crls() {
        if !embedded.contains(&crl.id()) {
            result.add_crl(crl.clone());
        }
    }
    for ocsp in gathered.ocsps() {
        if !embedded.contains(&ocsp.id()) {
            result.add_ocsp(ocsp.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sources::{CertificatePool, RevocationPool};
    use crate::domain::crypto::TokenSignature;
    use crate::domain::references::{DigestMatcher, SigningCertificateAttribute};
    use crate::domain::validation_data::{CrlToken, OcspToken};
    use crate::infra::error::SigningError;
    use chrono::{DateTime, TimeZone, Utc};

    struct Leaf(Vec<CertificateToken>);

    impl SignedToken for Leaf {
        fn token_id(&self) -> &str {
            "S-1"
        }
        fn token_signature(&self) -> Option<&TokenSignature> {
            None
        }
        fn signing_certificate_attributes(&self) -> &[SigningCertificateAttribute] {
            &[]
        }
        fn digest_matchers(&self) -> Vec<DigestMatcher> {
            Vec::new()
        }
        fn certificates(&self) -> &[CertificateToken] {
            &self.0
        }
    }

    fn at(y: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, 1, 1, 0, 0, 0).unwrap()
    }

    fn cert(subject: &str, issuer: &str, serial: &str) -> CertificateToken {
        CertificateToken::from_parts(
            format!("{subject}|{issuer}|{serial}").into_bytes(),
            subject,
            issuer,
            serial,
            at(2020),
            at(2030),
        )
    }

    struct FailingRevocations;

    impl RevocationSource for FailingRevocations {
        fn fetch(
            &self,
            _cert: &CertificateToken,
            _issuer: Option<&CertificateToken>,
        ) -> SigningResult<Option<Vec<RevocationToken>>> {
            Err(SigningError::RevocationError("responder unreachable".into()))
        }
    }

    fn fixtures() -> (CertificateToken, CertificateToken, CertificateToken) {
        (
            cert("CN=Signer", "CN=Issuing CA", "10"),
            cert("CN=Issuing CA", "CN=Root", "20"),
            cert("CN=Root", "CN=Root", "30"),
        )
    }

    #[test]
    fn collects_chain_and_revocation_data() {
        let (leaf, ca, root) = fixtures();
        let certs = CertificatePool::from_certificates(vec![ca.clone(), root.clone()]);
        let mut revocations = RevocationPool::new();
        revocations.add_ocsp(OcspToken::new(b"ocsp-leaf".to_vec(), "CN=Issuing CA", "10", at(2024)));
        revocations.add_crl(CrlToken::new(b"crl-root".to_vec(), "CN=Root", at(2024), None));

        let data = ValidationDataCollector::new(&certs, &revocations)
            .collect(&Leaf(vec![leaf]), &ValidationData::new())
            .unwrap();

        assert_eq!(data.certificates().count(), 3);
        assert_eq!(data.ocsps().count(), 1);
        assert_eq!(data.crls().count(), 1);
    }

    #[test]
    fn only_returns_what_is_not_embedded() {
        let (leaf, ca, root) = fixtures();
        let certs = CertificatePool::from_certificates(vec![ca.clone(), root.clone()]);
        let mut revocations = RevocationPool::new();
        let ocsp = OcspToken::new(b"ocsp-leaf".to_vec(), "CN=Issuing CA", "10", at(2024));
        revocations.add_ocsp(ocsp.clone());

        let mut embedded = ValidationData::new();
        embedded.add_certificate(leaf.clone());
        embedded.add_certificate(ca.clone());
        embedded.add_ocsp(ocsp);

        let data = ValidationDataCollector::new(&certs, &revocations)
            .collect(&Leaf(vec![leaf]), &embedded)
            .unwrap();

        let subjects: Vec<&str> = data.certificates().map(|c| c.subject()).collect();
        assert_eq!(subjects, vec!["CN=Root"]);
        assert_eq!(data.ocsps().count(), 0);
    }

    #[test]
    fn absent_revocation_data_is_not_fatal() {
        let (leaf, ..) = fixtures();
        let certs = CertificatePool::new();
        let revocations = RevocationPool::new();
        let data = ValidationDataCollector::new(&certs, &revocations)
            .collect(&Leaf(vec![leaf]), &ValidationData::new())
            .unwrap();
        assert_eq!(data.len(), 1);
        assert!(!data.has_revocation_data());
    }

    #[test]
    fn source_failure_is_propagated() {
        let (leaf, ..) = fixtures();
        let certs = CertificatePool::new();
        let err = ValidationDataCollector::new(&certs, &FailingRevocations)
            .collect(&Leaf(vec![leaf]), &ValidationData::new())
            .unwrap_err();
        assert!(err.is_collaborator_failure());
    }
}
