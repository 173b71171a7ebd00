//! Service layer module root.
//! Contains the constraint engine, acceptance validation and the level
//! extension services.

pub mod acceptance;
pub mod chain;
pub mod collector;
pub mod cryptographic_checker;
pub mod extension;
pub mod field_lock;
pub mod format;
pub mod timestamp_incorporator;
pub mod timestamp_parser;
pub mod timestamp_request_builder;
pub mod validation;

pub use acceptance::SignatureAcceptanceValidator;
pub use chain::{ChainItem, CheckOutcome, ConstraintChain, FnItem};
pub use collector::{CertificateSource, RevocationSource, ValidationDataCollector};
pub use cryptographic_checker::{CryptographicCheck, CryptographicChecker};
pub use extension::{
    ExtensionMode, ExtensionParameters, LevelExtensionController, SigningOperation,
};
pub use field_lock::{FieldLock, FieldLockRule, LockAction, LockedFieldsCheck};
pub use format::{CoveredData, SignatureFormat};
pub use timestamp_incorporator::{
    recompute_covered_data, TimestampIncorporator, TimestampParameters, TimestampSource,
};
pub use timestamp_parser::TimestampParserService;
pub use timestamp_request_builder::TimestampRequestBuilder;
pub use validation::{DocumentValidator, TimestampMessageImprintCheck};
