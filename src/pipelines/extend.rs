//! `ExtendWorkflow`: raises signatures of a document to a baseline level.
//!
//! Owns the collaborators the extension controller borrows:
//! 1. A timestamp source (HTTP TSA from configuration, or offline)
//! 2. Certificate and revocation pools, optionally filled from a file
//! 3. The validation policy used for the acceptability checks

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::canonicalizer::{Canonicalizer, RenderedCanonicalizer};
use crate::adapters::offline_tsa::OfflineTimestampSource;
use crate::adapters::sources::{load_sources, CertificatePool, RevocationPool};
use crate::adapters::tsp_http_client::TspHttpClient;
use crate::domain::document::SignedDocument;
use crate::domain::policy::ValidationPolicy;
use crate::infra::config::ExtensionConfiguration;
use crate::infra::error::SigningResult;
use crate::services::extension::{ExtensionParameters, LevelExtensionController};
use crate::services::timestamp_incorporator::TimestampSource;

pub struct ExtendWorkflow {
    policy: ValidationPolicy,
    tsa: Box<dyn TimestampSource>,
    certificates: CertificatePool,
    revocations: RevocationPool,
    canonicalizer: Arc<dyn Canonicalizer>,
    now: Option<DateTime<Utc>>,
}

impl ExtendWorkflow {
    #[must_use]
    pub fn new(policy: ValidationPolicy, tsa: Box<dyn TimestampSource>) -> Self {
        Self {
            policy,
            tsa,
            certificates: CertificatePool::new(),
            revocations: RevocationPool::new(),
            canonicalizer: Arc::new(RenderedCanonicalizer),
            now: None,
        }
    }

    /// HTTP timestamp authorities and policy as configured.
    pub fn from_config(config: &ExtensionConfiguration) -> SigningResult<Self> {
        let client = TspHttpClient::new(config.tsp_config()?)?;
        Ok(Self::new(config.policy()?, Box::new(client)))
    }

    /// Local timestamps, issued at `at` when given.
    #[must_use]
    pub fn offline(policy: ValidationPolicy, at: Option<DateTime<Utc>>) -> Self {
        let tsa = at.map_or_else(OfflineTimestampSource::default, OfflineTimestampSource::at);
        Self::new(policy, Box::new(tsa))
    }

    #[must_use]
    pub fn with_pools(mut self, certificates: CertificatePool, revocations: RevocationPool) -> Self {
        self.certificates = certificates;
        self.revocations = revocations;
        self
    }

    /// Fill the pools from a serialized validation data file.
    pub fn with_sources_file(self, path: &Path) -> SigningResult<Self> {
        let (certificates, revocations) = load_sources(path)?;
        log::debug!(
            "Loaded {} certificate(s) for chain building from {}",
            certificates.len(),
            path.display()
        );
        Ok(self.with_pools(certificates, revocations))
    }

    #[must_use]
    pub fn with_canonicalizer(mut self, canonicalizer: Arc<dyn Canonicalizer>) -> Self {
        self.canonicalizer = canonicalizer;
        self
    }

    /// Evaluate acceptability at `now` instead of the wall clock.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn run(
        &self,
        document: &SignedDocument,
        params: &ExtensionParameters,
    ) -> SigningResult<SignedDocument> {
        log::info!(
            "ExtendWorkflow: '{}' to {} ({:?})",
            document.name,
            params.target,
            params.mode
        );
        let controller = LevelExtensionController::new(
            &self.policy,
            self.tsa.as_ref(),
            &self.certificates,
            &self.revocations,
            Arc::clone(&self.canonicalizer),
        );
        let controller = match self.now {
            Some(now) => controller.at(now),
            None => controller,
        };
        controller.extend(document, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::level::SignatureLevel;
    use crate::infra::error::SigningError;

    #[test]
    fn empty_document_is_rejected() {
        let wf = ExtendWorkflow::offline(ValidationPolicy::default(), None);
        let err = wf
            .run(
                &SignedDocument::new("empty", Vec::new()),
                &ExtensionParameters::new(SignatureLevel::T),
            )
            .unwrap_err();
        assert!(matches!(err, SigningError::StructuralError(_)));
    }

    #[test]
    fn missing_sources_file_is_io_error() {
        let wf = ExtendWorkflow::offline(ValidationPolicy::default(), None);
        assert!(matches!(
            wf.with_sources_file(Path::new("/nonexistent/sources.json")),
            Err(SigningError::IoError(_))
        ));
    }
}
