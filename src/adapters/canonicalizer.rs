//! XML canonicalization seam.

use crate::domain::constants::SUPPORTED_C14N_METHODS;
use crate::infra::error::{SigningError, SigningResult};

/// `canonicalize(data, method) -> bytes`, as provided by an XML library.
pub trait Canonicalizer: Send + Sync {
    fn canonicalize(&self, data: &[u8], method: &str) -> SigningResult<Vec<u8>>;
}

/// Canonicalizer for XML this crate rendered itself.
///
/// Rendered elements are already in canonical form (no insignificant
/// whitespace, namespace declarations before attributes, no comments), so
/// only the method is checked and line endings normalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderedCanonicalizer;

impl Canonicalizer for RenderedCanonicalizer {
    fn canonicalize(&self, data: &[u8], method: &str) -> SigningResult<Vec<u8>> {
        if !SUPPORTED_C14N_METHODS.contains(&method) {
            return Err(SigningError::CanonicalizationError(format!(
                "Unsupported canonicalization method: {method}"
            )));
        }
        let mut out = Vec::with_capacity(data.len());
        let mut iter = data.iter().peekable();
        while let Some(&byte) = iter.next() {
            if byte == b'\r' {
                if iter.peek() == Some(&&b'\n') {
                    continue;
                }
                out.push(b'\n');
            } else {
                out.push(byte);
            }
        }
        Ok(out)
    }
}
