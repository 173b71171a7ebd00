//! AdES Signer Library
//!
//! Baseline level extension and acceptance validation for CMS (CAdES) and
//! XML (XAdES) advanced electronic signatures. Signatures are raised from
//! B to T, LT and LTA by adding timestamps and validation data, and every
//! signature and embedded timestamp can be validated against a cryptographic
//! policy at a chosen instant.

pub mod adapters;
pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use adapters::{OfflineTimestampSource, RenderedCanonicalizer, TspHttpClient};
pub use domain::{
    SignatureEntry, SignatureForm, SignatureLevel, SignedDocument, ValidationPolicy,
};
pub use domain::verification::VerificationReport;
pub use infra::config::{ConfigManager, ExtensionConfiguration};
pub use infra::error::{SigningError, SigningResult};
pub use pipelines::{ExtendWorkflow, ValidateWorkflow};
pub use services::{
    CertificateSource, ExtensionMode, ExtensionParameters, RevocationSource, TimestampSource,
};

/// Extend every requested signature of `document` to `params.target`.
///
/// The input is never modified; on success the returned document carries the
/// new unsigned material. XML signatures use the built-in canonicalizer.
pub fn extend(
    document: &SignedDocument,
    params: &ExtensionParameters,
    policy: &ValidationPolicy,
    tsa: &dyn TimestampSource,
    certificates: &dyn CertificateSource,
    revocations: &dyn RevocationSource,
) -> SigningResult<SignedDocument> {
    services::LevelExtensionController::new(
        policy,
        tsa,
        certificates,
        revocations,
        Arc::new(RenderedCanonicalizer),
    )
    .extend(document, params)
}

/// Validate `document` against `policy` at `at`.
pub fn validate(
    document: &SignedDocument,
    policy: &ValidationPolicy,
    at: DateTime<Utc>,
) -> SigningResult<VerificationReport> {
    services::DocumentValidator::new(policy, Arc::new(RenderedCanonicalizer)).validate(document, at)
}
