//! Adapter layer modules for external system integration.
//!
//! Provides adapters for:
//! - CAdES and XAdES renditions of unsigned material
//! - XML canonicalization
//! - RFC3161 timestamp authorities over HTTP, with retry and failover
//! - An offline timestamp source for dry runs
//! - In-memory certificate and revocation stores

use std::sync::Arc;

use crate::domain::document::SignatureForm;
use crate::services::format::SignatureFormat;

pub mod canonicalizer;
pub mod cms_format;
pub mod offline_tsa;
pub mod sources;
pub mod tsp_http_client;
pub mod xml_format;

pub use canonicalizer::{Canonicalizer, RenderedCanonicalizer};
pub use cms_format::CmsFormat;
pub use offline_tsa::OfflineTimestampSource;
pub use sources::{CertificatePool, RevocationPool};
pub use tsp_http_client::{TsaUrl, TspHttpClient, TspHttpConfig};
pub use xml_format::XmlFormat;

/// Format implementation for a signature of the given form.
#[must_use]
pub fn format_for(
    form: SignatureForm,
    canonicalizer: Arc<dyn Canonicalizer>,
) -> Box<dyn SignatureFormat> {
    match form {
        SignatureForm::Cms => Box::new(CmsFormat),
        SignatureForm::Xml { xades_version } => Box::new(XmlFormat::new(xades_version, canonicalizer)),
    }
}
