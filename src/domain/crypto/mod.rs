//! Foundational cryptographic domain types.
//!
//! Provides strongly-typed wrappers for cryptographic artifacts including:
//! - Digest algorithms and digest values with size validation
//! - Certificate tokens identified by content hash
//! - Signature algorithm / key size descriptors judged by the policy

mod cert;
mod digest_bytes;
mod hash;
mod signature;

pub use cert::{CertificateToken, TokenId};
pub use digest_bytes::{DigestBytes, DigestBytesError};
pub use hash::DigestAlgorithm;
pub use signature::{EncryptionAlgorithm, SignatureAlgorithm, TokenSignature};
