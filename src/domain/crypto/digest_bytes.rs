use serde::{Deserialize, Serialize};
use std::fmt;

use super::DigestAlgorithm;

/// Strongly typed digest bytes paired with the algorithm that produced them.
///
/// Invariant: `bytes.len() == algo.digest_size()`.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DigestRepr", into = "DigestRepr")]
pub struct DigestBytes {
    algo: DigestAlgorithm,
    bytes: Box<[u8]>,
}

impl DigestBytes {
    pub fn new(algo: DigestAlgorithm, bytes: Vec<u8>) -> Result<Self, DigestBytesError> {
        if bytes.len() != algo.digest_size() {
            return Err(DigestBytesError::LengthMismatch {
                expected: algo.digest_size(),
                actual: bytes.len(),
            });
        }
        Ok(Self {
            algo,
            bytes: bytes.into_boxed_slice(),
        })
    }

    /// Used by `DigestAlgorithm::digest`, whose output length is correct by construction.
    pub(crate) fn from_trusted(algo: DigestAlgorithm, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), algo.digest_size());
        Self {
            algo,
            bytes: bytes.into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algo
    }
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into()
    }
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for DigestBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigestBytes(algo={}, {})", self.algo, self.to_hex())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DigestBytesError {
    #[error("digest length mismatch (expected {expected}, actual {actual})")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("digest value is not valid hex: {0}")]
    InvalidHex(String),
}

#[derive(Serialize, Deserialize)]
struct DigestRepr {
    algorithm: DigestAlgorithm,
    value: String,
}

impl TryFrom<DigestRepr> for DigestBytes {
    type Error = DigestBytesError;

    fn try_from(repr: DigestRepr) -> Result<Self, Self::Error> {
        let bytes =
            hex::decode(&repr.value).map_err(|e| DigestBytesError::InvalidHex(e.to_string()))?;
        DigestBytes::new(repr.algorithm, bytes)
    }
}

impl From<DigestBytes> for DigestRepr {
    fn from(digest: DigestBytes) -> Self {
        DigestRepr {
            algorithm: digest.algo,
            value: digest.to_hex(),
        }
    }
}
