//! In-memory certificate and revocation sources.
//!
//! Backed by material the caller already holds (a trust store export, a
//! `sources.json` handed to the CLI). Network fetchers plug in behind the same
//! traits.

use std::path::Path;

use crate::domain::crypto::CertificateToken;
use crate::domain::validation_data::{CrlToken, OcspToken, RevocationToken, ValidationData};
use crate::infra::error::{SigningError, SigningResult};
use crate::services::collector::{CertificateSource, RevocationSource};

#[derive(Debug, Clone, Default)]
pub struct CertificatePool {
    certificates: Vec<CertificateToken>,
}

impl CertificatePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_certificates(certificates: Vec<CertificateToken>) -> Self {
        Self { certificates }
    }

    pub fn add(&mut self, cert: CertificateToken) {
        if !self.certificates.iter().any(|c| c.id() == cert.id()) {
            self.certificates.push(cert);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

impl CertificateSource for CertificatePool {
    fn issuer_of(&self, cert: &CertificateToken) -> Option<CertificateToken> {
        self.certificates
            .iter()
            .find(|candidate| cert.is_issued_by(candidate) && candidate.id() != cert.id())
            .cloned()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RevocationPool {
    crls: Vec<CrlToken>,
    ocsps: Vec<OcspToken>,
}

impl RevocationPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_crl(&mut self, crl: CrlToken) {
        self.crls.push(crl);
    }

    pub fn add_ocsp(&mut self, ocsp: OcspToken) {
        self.ocsps.push(ocsp);
    }
}

impl RevocationSource for RevocationPool {
    /// OCSP responses are preferred; CRLs only answer when no response
    /// covers the certificate.
    fn fetch(
        &self,
        cert: &CertificateToken,
        _issuer: Option<&CertificateToken>,
    ) -> SigningResult<Option<Vec<RevocationToken>>> {
        let ocsps: Vec<RevocationToken> = self
            .ocsps
            .iter()
            .filter(|o| o.covers(cert))
            .cloned()
            .map(RevocationToken::Ocsp)
            .collect();
        if !ocsps.is_empty() {
            return Ok(Some(ocsps));
        }
        let crls: Vec<RevocationToken> = self
            .crls
            .iter()
            .filter(|c| c.covers(cert))
            .cloned()
            .map(RevocationToken::Crl)
            .collect();
        Ok((!crls.is_empty()).then_some(crls))
    }
}

/// Both pools filled from one serialized [`ValidationData`] file.
pub fn load_sources(path: &Path) -> SigningResult<(CertificatePool, RevocationPool)> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SigningError::IoError(format!("Failed to read sources {}: {e}", path.display()))
    })?;
    let data: ValidationData = serde_json::from_str(&content)?;
    Ok(split(&data))
}

#[must_use]
pub fn split(data: &ValidationData) -> (CertificatePool, RevocationPool) {
    let certificates = CertificatePool::from_certificates(data.certificates().cloned().collect());
    let revocations = RevocationPool {
        crls: data.crls().cloned().collect(),
        ocsps: data.ocsps().cloned().collect(),
    };
    log::debug!(
        "Loaded {} certificate(s), {} CRL(s), {} OCSP response(s)",
        certificates.len(),
        revocations.crls.len(),
        revocations.ocsps.len()
    );
    (certificates, revocations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    fn cert(subject: &str, issuer: &str, serial: &str) -> CertificateToken {
        CertificateToken::from_parts(
            format!("{subject}:{serial}").into_bytes(),
            subject,
            issuer,
            serial,
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn ocsp_preferred_over_crl() {
        let leaf = cert("CN=Leaf", "CN=CA", "01");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut pool = RevocationPool::new();
        pool.add_crl(CrlToken::new(b"crl".to_vec(), "CN=CA", now, None));
        pool.add_ocsp(OcspToken::new(b"ocsp".to_vec(), "CN=CA", "01", now));

        let tokens = pool.fetch(&leaf, None).unwrap().unwrap();
        assert!(matches!(tokens.as_slice(), [RevocationToken::Ocsp(_)]));

        let other = cert("CN=Other", "CN=CA", "02");
        let tokens = pool.fetch(&other, None).unwrap().unwrap();
        assert!(matches!(tokens.as_slice(), [RevocationToken::Crl(_)]));

        assert!(pool.fetch(&cert("CN=X", "CN=Elsewhere", "03"), None).unwrap().is_none());
    }

    #[test]
    fn issuer_lookup_skips_self() {
        let root = cert("CN=Root", "CN=Root", "00");
        let pool = CertificatePool::from_certificates(vec![root.clone()]);
        assert!(pool.issuer_of(&root).is_none());
        assert_eq!(pool.issuer_of(&cert("CN=CA", "CN=Root", "01")), Some(root));
    }

    #[test]
    fn loads_sources_file() {
        let mut data = ValidationData::new();
        data.add_certificate(cert("CN=CA", "CN=Root", "01"));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&data).unwrap()).unwrap();

        let (certs, _) = load_sources(file.path()).unwrap();
        assert_eq!(certs.len(), 1);
    }
}
