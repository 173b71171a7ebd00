//! Format capability trait.
//!
//! Extension and validation are format-agnostic; everything that depends on
//! how a signature is encoded (CMS attributes or XAdES elements) goes through
//! [`SignatureFormat`].

use crate::domain::document::{SignatureEntry, SignedToken};
use crate::domain::timestamp::{TimestampToken, TimestampType};
use crate::domain::unsigned::UnsignedBlock;
use crate::domain::validation_data::ValidationData;
use crate::infra::error::SigningResult;
use crate::services::collector::ValidationDataCollector;

/// Bytes a timestamp protects, with a human-readable account of what they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoveredData {
    pub bytes: Vec<u8>,
    pub description: String,
}

pub trait SignatureFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Format-specific checks before a timestamp of `timestamp_type` is produced.
    fn validate_preconditions(
        &self,
        signature: &SignatureEntry,
        timestamp_type: TimestampType,
    ) -> SigningResult<()>;

    /// Validation data missing for the signature and every embedded timestamp.
    fn collect_validation_data(
        &self,
        collector: &ValidationDataCollector<'_>,
        signature: &SignatureEntry,
    ) -> SigningResult<ValidationData> {
        let mut tokens: Vec<&dyn SignedToken> = vec![signature as &dyn SignedToken];
        tokens.extend(signature.unsigned.timestamps().map(|t| t as &dyn SignedToken));
        collector.collect_all(&tokens, &signature.unsigned.embedded_validation_data())
    }

    /// Covered data of a timestamp of `timestamp_type` computed over
    /// `blocks`, the unsigned material preceding it.
    fn canonicalize_covered_data(
        &self,
        signature: &SignatureEntry,
        blocks: &[UnsignedBlock],
        timestamp_type: TimestampType,
        canonicalization_method: Option<&str>,
    ) -> SigningResult<CoveredData>;

    fn incorporate_timestamp(
        &self,
        signature: &mut SignatureEntry,
        token: TimestampToken,
    ) -> SigningResult<()> {
        signature.unsigned.push_timestamp(token);
        Ok(())
    }

    /// Encoded form of one unsigned block.
    fn render_block(&self, block: &UnsignedBlock) -> SigningResult<Vec<u8>>;

    /// Canonicalization method recorded on new timestamps, if the format has one.
    fn default_canonicalization_method(&self) -> Option<&'static str> {
        None
    }
}
