//! Timestamp incorporation.
//!
//! Computes the exact data a timestamp of a given type covers, obtains a
//! token for its digest from a [`TimestampSource`], checks the answer and
//! appends it to the unsigned material.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::crypto::{DigestAlgorithm, DigestBytes};
use crate::domain::document::SignatureEntry;
use crate::domain::timestamp::{TimestampBinary, TimestampToken, TimestampType};
use crate::infra::error::{SigningError, SigningResult};
use crate::services::format::{CoveredData, SignatureFormat};

/// A timestamp authority, reached however the implementation likes.
pub trait TimestampSource: Send + Sync {
    fn request_timestamp(
        &self,
        algorithm: DigestAlgorithm,
        digest: &DigestBytes,
        timeout: Duration,
    ) -> SigningResult<TimestampBinary>;
}

/// Digest algorithm and canonicalization used for one kind of timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampParameters {
    pub digest_algorithm: DigestAlgorithm,
    /// XML only; `None` uses the format default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonicalization_method: Option<String>,
}

impl Default for TimestampParameters {
    fn default() -> Self {
        Self {
            digest_algorithm: DigestAlgorithm::Sha256,
            canonicalization_method: None,
        }
    }
}

pub struct TimestampIncorporator<'a> {
    format: &'a dyn SignatureFormat,
    source: &'a dyn TimestampSource,
    timeout: Duration,
}

impl<'a> TimestampIncorporator<'a> {
    #[must_use]
    pub fn new(
        format: &'a dyn SignatureFormat,
        source: &'a dyn TimestampSource,
        timeout: Duration,
    ) -> Self {
        Self {
            format,
            source,
            timeout,
        }
    }

    fn canonicalization_method(&self, params: &TimestampParameters) -> Option<String> {
        params
            .canonicalization_method
            .clone()
            .or_else(|| self.format.default_canonicalization_method().map(str::to_string))
    }

    /// What a new timestamp of `timestamp_type` would cover right now.
    pub fn covered_data(
        &self,
        signature: &SignatureEntry,
        timestamp_type: TimestampType,
        params: &TimestampParameters,
    ) -> SigningResult<CoveredData> {
        let method = self.canonicalization_method(params);
        self.format.canonicalize_covered_data(
            signature,
            signature.unsigned.blocks(),
            timestamp_type,
            method.as_deref(),
        )
    }

    /// Request a token over the current covered data. Nothing is appended.
    pub fn create_timestamp(
        &self,
        signature: &SignatureEntry,
        timestamp_type: TimestampType,
        params: &TimestampParameters,
    ) -> SigningResult<TimestampToken> {
        self.format.validate_preconditions(signature, timestamp_type)?;

        let covered = self.covered_data(signature, timestamp_type, params)?;
        let digest = params.digest_algorithm.digest(&covered.bytes);
        log::debug!(
            "{} for {} covers {} bytes ({}), digest {}",
            timestamp_type,
            signature.id,
            covered.bytes.len(),
            covered.description,
            digest.to_hex()
        );
        log::trace!("Covered data: {}", hex::encode(&covered.bytes));

        let binary = self
            .source
            .request_timestamp(params.digest_algorithm, &digest, self.timeout)?;
        let token = TimestampToken::from_binary(
            timestamp_type,
            binary,
            self.canonicalization_method(params),
            covered.description,
        )?;

        if token.message_imprint() != &digest {
            return Err(SigningError::TimestampError(format!(
                "Timestamp authority answered with imprint {} instead of {}",
                token.message_imprint().to_hex(),
                digest.to_hex()
            )));
        }
        Ok(token)
    }

    /// Append an already created token.
    pub fn incorporate(
        &self,
        signature: &mut SignatureEntry,
        token: TimestampToken,
    ) -> SigningResult<()> {
        log::info!(
            "Incorporating {} {} into {}",
            token.timestamp_type(),
            token.id(),
            signature.id
        );
        self.format.incorporate_timestamp(signature, token)
    }

    /// Create and append in one go. Returns the new timestamp's id.
    pub fn timestamp(
        &self,
        signature: &mut SignatureEntry,
        timestamp_type: TimestampType,
        params: &TimestampParameters,
    ) -> SigningResult<String> {
        let token = self.create_timestamp(signature, timestamp_type, params)?;
        let id = token.id().to_string();
        self.incorporate(signature, token)?;
        Ok(id)
    }
}

/// Covered data of an embedded timestamp, rebuilt from the blocks that
/// preceded it.
pub fn recompute_covered_data(
    format: &dyn SignatureFormat,
    signature: &SignatureEntry,
    timestamp_id: &str,
) -> SigningResult<CoveredData> {
    let index = signature.unsigned.position_of(timestamp_id).ok_or_else(|| {
        SigningError::ValidationError(format!(
            "Timestamp {timestamp_id} not found in signature {}",
            signature.id
        ))
    })?;
    let token = signature.unsigned.blocks()[index]
        .timestamp()
        .ok_or_else(|| SigningError::ValidationError(format!("{timestamp_id} is not a timestamp")))?;
    format.canonicalize_covered_data(
        signature,
        signature.unsigned.prefix(index),
        token.timestamp_type(),
        token.canonicalization_method(),
    )
}
