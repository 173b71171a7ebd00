//! HTTP client adapter for RFC3161 timestamp authority requests.
//! Provides retry and failover over a list of timestamp servers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::crypto::{DigestAlgorithm, DigestBytes};
use crate::domain::timestamp::TimestampBinary;
use crate::infra::error::{SigningError, SigningResult};
use crate::services::timestamp_incorporator::TimestampSource;
use crate::services::timestamp_parser::TimestampParserService;
use crate::services::timestamp_request_builder::TimestampRequestBuilder;

/// Validated timestamp server URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TsaUrl(String);

impl TsaUrl {
    pub fn new(url: impl AsRef<str>) -> SigningResult<Self> {
        let url = url.as_ref();
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| SigningError::ConfigurationError(format!("Invalid TSA URL '{url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SigningError::ConfigurationError(format!(
                "TSA URL must use http or https, got: {url}"
            )));
        }
        if parsed.host_str().is_none() {
            return Err(SigningError::ConfigurationError(format!(
                "TSA URL has no host: {url}"
            )));
        }
        Ok(Self(url.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TsaUrl {
    type Error = SigningError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TsaUrl> for String {
    fn from(url: TsaUrl) -> Self {
        url.0
    }
}

impl fmt::Display for TsaUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Configuration for timestamp HTTP operations.
#[derive(Debug, Clone)]
pub struct TspHttpConfig {
    pub primary: TsaUrl,
    pub fallbacks: Vec<TsaUrl>,
    pub retries_per_server: usize,
    pub retry_delay: Duration,
}

impl TspHttpConfig {
    #[must_use]
    pub fn servers(&self) -> Vec<&TsaUrl> {
        std::iter::once(&self.primary)
            .chain(self.fallbacks.iter())
            .collect()
    }
}

/// HTTP adapter performing RFC3161 POST exchanges.
pub struct TspHttpClient {
    cfg: TspHttpConfig,
    http: reqwest::blocking::Client,
    requests: TimestampRequestBuilder,
}

impl TspHttpClient {
    pub fn new(cfg: TspHttpConfig) -> SigningResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("ades-signer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            cfg,
            http,
            requests: TimestampRequestBuilder::new(),
        })
    }

    /// Attempt to obtain a timestamp response body for the given request DER.
    pub fn post_request(&self, ts_request_der: &[u8], timeout: Duration) -> SigningResult<Vec<u8>> {
        let mut last_err: Option<SigningError> = None;
        for (idx, server) in self.cfg.servers().iter().enumerate() {
            log::info!("Timestamp server attempt {}: {}", idx + 1, server);
            match self.post_with_retries(server, ts_request_der, timeout) {
                Ok(body) => return Ok(body),
                Err(e) => {
                    log::warn!("Server {server} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| SigningError::TimestampError("All servers failed".into())))
    }

    fn post_with_retries(
        &self,
        server: &TsaUrl,
        body: &[u8],
        timeout: Duration,
    ) -> SigningResult<Vec<u8>> {
        let attempts = self.cfg.retries_per_server.max(1);
        let mut last_err = SigningError::TimestampError(format!("No attempt made to {server}"));
        for attempt in 1..=attempts {
            log::debug!("Timestamp HTTP attempt {attempt} of {attempts} -> {server}");
            match self.single_post(server, body, timeout) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    last_err = e;
                    if attempt < attempts {
                        std::thread::sleep(self.cfg.retry_delay);
                    }
                }
            }
        }
        Err(last_err)
    }

    fn single_post(&self, server: &TsaUrl, body: &[u8], timeout: Duration) -> SigningResult<Vec<u8>> {
        let resp = self
            .http
            .post(server.as_str())
            .timeout(timeout)
            .header("Content-Type", "application/timestamp-query")
            .header("Accept", "application/timestamp-reply")
            .body(body.to_vec())
            .send()
            .map_err(|e| SigningError::TimestampError(format!("HTTP error: {e}")))?;
        if !resp.status().is_success() {
            return Err(SigningError::TimestampError(format!(
                "HTTP {} from {server}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .map_err(|e| SigningError::TimestampError(format!("Read body failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

impl TimestampSource for TspHttpClient {
    fn request_timestamp(
        &self,
        algorithm: DigestAlgorithm,
        digest: &DigestBytes,
        timeout: Duration,
    ) -> SigningResult<TimestampBinary> {
        if digest.algorithm() != algorithm {
            return Err(SigningError::InvalidInput(format!(
                "Digest computed with {} but {algorithm} requested",
                digest.algorithm()
            )));
        }
        let request = self.requests.build_request(digest)?;
        let body = self.post_request(&request, timeout)?;
        TimestampParserService::parse_response(&body, digest)
    }
}
