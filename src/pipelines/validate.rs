//! `ValidateWorkflow`: high-level facade for validating signed documents.
//!
//! Delegates to `DocumentValidator`; keeps symmetry with the extend workflow.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::canonicalizer::{Canonicalizer, RenderedCanonicalizer};
use crate::adapters::sources::{load_sources, RevocationPool};
use crate::domain::document::SignedDocument;
use crate::domain::policy::ValidationPolicy;
use crate::domain::verification::VerificationReport;
use crate::infra::error::SigningResult;
use crate::services::field_lock::FieldLockRule;
use crate::services::validation::DocumentValidator;

/// Orchestrates validation of a signed document at one instant.
pub struct ValidateWorkflow {
    policy: ValidationPolicy,
    revocations: Option<RevocationPool>,
    canonicalizer: Arc<dyn Canonicalizer>,
    field_locks: Vec<FieldLockRule>,
}

impl Default for ValidateWorkflow {
    fn default() -> Self {
        Self::new(ValidationPolicy::default())
    }
}

impl ValidateWorkflow {
    #[must_use]
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            policy,
            revocations: None,
            canonicalizer: Arc::new(RenderedCanonicalizer),
            field_locks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_revocations(mut self, revocations: RevocationPool) -> Self {
        self.revocations = Some(revocations);
        self
    }

    pub fn with_sources_file(self, path: &Path) -> SigningResult<Self> {
        let (_, revocations) = load_sources(path)?;
        Ok(self.with_revocations(revocations))
    }

    #[must_use]
    pub fn with_field_locks(mut self, rules: Vec<FieldLockRule>) -> Self {
        self.field_locks.extend(rules);
        self
    }

    /// Run validation at `at`, or now.
    pub fn run(
        &self,
        document: &SignedDocument,
        at: Option<DateTime<Utc>>,
    ) -> SigningResult<VerificationReport> {
        let mut validator = DocumentValidator::new(&self.policy, Arc::clone(&self.canonicalizer));
        if let Some(revocations) = &self.revocations {
            validator = validator.with_revocation_source(revocations);
        }
        for rule in &self.field_locks {
            validator = validator.with_field_lock(rule.clone());
        }
        validator.validate(document, at.unwrap_or_else(Utc::now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_cannot_be_validated() {
        let wf = ValidateWorkflow::default();
        assert!(wf.run(&SignedDocument::new("empty", Vec::new()), None).is_err());
    }
}
