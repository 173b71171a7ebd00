//! Domain layer: pure data types for signatures, their unsigned material,
//! validation data, policies and reports. No I/O happens here.

pub mod asn1;
pub mod constants;
pub mod crypto;
pub mod document;
pub mod encoding;
pub mod level;
pub mod policy;
pub mod references;
pub mod timestamp;
pub mod unsigned;
pub mod validation_data;
pub mod verification;

pub use document::{
    DetachedContent, SignatureEntry, SignatureForm, SignatureIntegrity, SignedDocument,
    SignedToken, XadesVersion,
};
pub use level::SignatureLevel;
pub use policy::{CryptoAlgorithm, CryptographicPolicy, ValidationPolicy};
pub use timestamp::{TimestampBinary, TimestampToken, TimestampType};
pub use unsigned::{UnsignedBlock, UnsignedMaterial};
pub use validation_data::{CrlToken, OcspToken, RevocationToken, ValidationData};
