//! Error handling types and result definitions for extension and validation.
//!
//! Validation never raises on content-level problems (those become report
//! entries); every variant here is either fatal to an extension step or means
//! the input could not be read at all.

use crate::domain::level::SignatureLevel;
use thiserror::Error;

/// Result type for signing operations
pub type SigningResult<T> = Result<T, SigningError>;

/// Comprehensive error types for signing operations
#[derive(Error, Debug, miette::Diagnostic)]
pub enum SigningError {
    /// Document or unsigned material is not usable (no signature, bad ordering).
    #[error("Structural error: {0}")]
    #[diagnostic(code(ades::structural))]
    StructuralError(String),

    /// Requested level cannot be reached without first producing `missing`.
    #[error("Signature '{signature_id}' must reach level {missing} before this extension")]
    #[diagnostic(
        code(ades::missing_prerequisite),
        help("extend one level at a time or request a cascading extension")
    )]
    MissingPrerequisite {
        signature_id: String,
        missing: SignatureLevel,
    },

    #[error("Signature '{signature_id}' is already extended with {level}")]
    #[diagnostic(code(ades::already_extended))]
    AlreadyExtended { signature_id: String, level: String },

    #[error("Cryptographic material not acceptable: {0}")]
    #[diagnostic(code(ades::cryptographic_unacceptable))]
    CryptographicUnacceptable(String),

    #[error("Timestamp error: {0}")]
    #[diagnostic(code(ades::collaborator::timestamp))]
    TimestampError(String),

    #[error("Revocation data error: {0}")]
    #[diagnostic(code(ades::collaborator::revocation))]
    RevocationError(String),

    #[error("Invalid certificate format: {0}")]
    InvalidCertificate(String),

    #[error("Canonicalization error: {0}")]
    CanonicalizationError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("ASN.1 encoding/decoding error: {0}")]
    Asn1Error(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl SigningError {
    /// Structural problems, including a missing prerequisite level.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SigningError::StructuralError(_) | SigningError::MissingPrerequisite { .. }
        )
    }

    /// Lets callers treat "nothing to do" separately from real failures.
    #[must_use]
    pub fn is_already_extended(&self) -> bool {
        matches!(self, SigningError::AlreadyExtended { .. })
    }

    /// Failures reported by an external collaborator (TSA, revocation source, network).
    #[must_use]
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            SigningError::TimestampError(_)
                | SigningError::RevocationError(_)
                | SigningError::NetworkError(_)
        )
    }
}

impl From<der::Error> for SigningError {
    fn from(error: der::Error) -> Self {
        SigningError::Asn1Error(error.to_string())
    }
}

impl From<reqwest::Error> for SigningError {
    fn from(error: reqwest::Error) -> Self {
        SigningError::NetworkError(error.to_string())
    }
}

impl From<std::io::Error> for SigningError {
    fn from(error: std::io::Error) -> Self {
        SigningError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for SigningError {
    fn from(error: serde_json::Error) -> Self {
        SigningError::InvalidInput(format!("JSON: {error}"))
    }
}
