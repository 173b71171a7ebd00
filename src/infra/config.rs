//! Configuration management infrastructure.
//!
//! This module provides configuration file support, allowing users to save
//! and load extension preferences, timestamp server lists and the location of
//! the validation policy.

use crate::adapters::tsp_http_client::{TsaUrl, TspHttpConfig};
use crate::domain::constants::SUPPORTED_C14N_METHODS;
use crate::domain::crypto::DigestAlgorithm;
use crate::domain::level::SignatureLevel;
use crate::domain::policy::ValidationPolicy;
use crate::infra::error::{SigningError, SigningResult};
use crate::services::extension::{ExtensionMode, ExtensionParameters};
use crate::services::timestamp_incorporator::TimestampParameters;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration with all extension preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionConfiguration {
    /// Digest algorithm for signature timestamps
    pub signature_timestamp_digest: String,

    /// XML canonicalization for signature timestamps, format default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_timestamp_canonicalization: Option<String>,

    /// Digest algorithm for archive timestamps
    pub archive_timestamp_digest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_timestamp_canonicalization: Option<String>,

    /// Primary timestamp server
    pub primary_timestamp_server: String,

    /// Fallback timestamp servers
    pub fallback_timestamp_servers: Vec<String>,

    /// Network timeout settings
    pub network_timeout_seconds: u64,

    /// Number of attempts per timestamp server
    pub retry_attempts: usize,

    /// Pause between attempts on the same server
    pub retry_delay_millis: u64,

    /// How targets more than one level away are handled
    pub extension_mode: ExtensionMode,

    /// Validation policy file (TOML or JSON); built-in default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_file: Option<PathBuf>,
}

impl Default for ExtensionConfiguration {
    fn default() -> Self {
        Self {
            signature_timestamp_digest: "sha256".to_string(),
            signature_timestamp_canonicalization: None,
            archive_timestamp_digest: "sha256".to_string(),
            archive_timestamp_canonicalization: None,
            primary_timestamp_server: "http://timestamp.digicert.com".to_string(),
            fallback_timestamp_servers: vec![
                "http://timestamp.sectigo.com".to_string(),
                "http://ts.ssl.com".to_string(),
            ],
            network_timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_millis: 500,
            extension_mode: ExtensionMode::Strict,
            policy_file: None,
        }
    }
}

impl ExtensionConfiguration {
    fn timestamp_parameters(
        digest: &str,
        canonicalization: Option<&String>,
    ) -> SigningResult<TimestampParameters> {
        Ok(TimestampParameters {
            digest_algorithm: parse_digest(digest)?,
            canonicalization_method: canonicalization.cloned(),
        })
    }

    /// Extension parameters for `target` carrying the configured timestamp
    /// settings and mode.
    pub fn to_parameters(&self, target: SignatureLevel) -> SigningResult<ExtensionParameters> {
        let mut params = ExtensionParameters::new(target).with_mode(self.extension_mode);
        params.signature_timestamp = Self::timestamp_parameters(
            &self.signature_timestamp_digest,
            self.signature_timestamp_canonicalization.as_ref(),
        )?;
        params.archive_timestamp = Self::timestamp_parameters(
            &self.archive_timestamp_digest,
            self.archive_timestamp_canonicalization.as_ref(),
        )?;
        params.timeout = Duration::from_secs(self.network_timeout_seconds);
        Ok(params)
    }

    /// HTTP timestamp client settings.
    pub fn tsp_config(&self) -> SigningResult<TspHttpConfig> {
        Ok(TspHttpConfig {
            primary: TsaUrl::new(&self.primary_timestamp_server)?,
            fallbacks: self
                .fallback_timestamp_servers
                .iter()
                .map(TsaUrl::new)
                .collect::<SigningResult<_>>()?,
            retries_per_server: self.retry_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_millis),
        })
    }

    /// The configured policy, or the built-in one.
    pub fn policy(&self) -> SigningResult<ValidationPolicy> {
        match &self.policy_file {
            Some(path) => load_policy(path),
            None => Ok(ValidationPolicy::default()),
        }
    }
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new configuration manager with default path
    pub fn new() -> SigningResult<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> SigningResult<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Ok(config_dir.join("ades-signer").join("config.toml"))
        } else {
            Ok(PathBuf::from("ades-signer-config.toml"))
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load_or_create_default(&self) -> SigningResult<ExtensionConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::info!(
                "Configuration file not found, creating default: {}",
                self.config_path.display()
            );
            let default_config = ExtensionConfiguration::default();
            self.save(&default_config)?;
            Ok(default_config)
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> SigningResult<ExtensionConfiguration> {
        log::info!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            SigningError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        let config: ExtensionConfiguration = toml::from_str(&content).map_err(|e| {
            SigningError::ConfigurationError(format!("Failed to parse config file: {e}"))
        })?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &ExtensionConfiguration) -> SigningResult<()> {
        log::info!("Saving configuration to: {}", self.config_path.display());

        if let Some(parent) = self.config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                SigningError::ConfigurationError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(config).map_err(|e| {
            SigningError::ConfigurationError(format!("Failed to serialize config: {e}"))
        })?;

        fs::write(&self.config_path, content).map_err(|e| {
            SigningError::ConfigurationError(format!(
                "Failed to write config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        log::debug!("Configuration saved");
        Ok(())
    }

    /// Update a specific configuration value
    pub fn update_value(&self, key: &str, value: &str) -> SigningResult<()> {
        let mut config = self.load_or_create_default()?;

        match key {
            "signature_timestamp_digest" => {
                parse_digest(value)?;
                config.signature_timestamp_digest = value.to_string();
            }
            "archive_timestamp_digest" => {
                parse_digest(value)?;
                config.archive_timestamp_digest = value.to_string();
            }
            "signature_timestamp_canonicalization" => {
                config.signature_timestamp_canonicalization = parse_c14n(value)?;
            }
            "archive_timestamp_canonicalization" => {
                config.archive_timestamp_canonicalization = parse_c14n(value)?;
            }
            "primary_timestamp_server" => {
                TsaUrl::new(value)?;
                config.primary_timestamp_server = value.to_string();
            }
            "fallback_timestamp_servers" => {
                let urls: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                for url in &urls {
                    TsaUrl::new(url)?;
                }
                config.fallback_timestamp_servers = urls;
            }
            "network_timeout_seconds" => {
                config.network_timeout_seconds = parse_number(key, value)?;
            }
            "retry_attempts" => {
                config.retry_attempts = parse_number(key, value)?;
            }
            "retry_delay_millis" => {
                config.retry_delay_millis = parse_number(key, value)?;
            }
            "extension_mode" => {
                config.extension_mode = parse_mode(value)?;
            }
            "policy_file" => {
                config.policy_file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => {
                return Err(SigningError::ConfigurationError(format!(
                    "Unknown configuration key: {key}"
                )));
            }
        }

        validate_config(&config)?;
        self.save(&config)
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Export configuration as a portable format
    pub fn export_config(&self, format: ConfigFormat) -> SigningResult<String> {
        let config = self.load()?;

        match format {
            ConfigFormat::Toml => toml::to_string_pretty(&config)
                .map_err(|e| SigningError::ConfigurationError(format!("TOML export failed: {e}"))),
            ConfigFormat::Json => serde_json::to_string_pretty(&config)
                .map_err(|e| SigningError::ConfigurationError(format!("JSON export failed: {e}"))),
        }
    }
}

/// Configuration export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Guess from a file extension; anything but `.json` is TOML.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            ConfigFormat::Json
        } else {
            ConfigFormat::Toml
        }
    }
}

/// Load a validation policy from a TOML or JSON file.
pub fn load_policy(path: &Path) -> SigningResult<ValidationPolicy> {
    let content = fs::read_to_string(path).map_err(|e| {
        SigningError::ConfigurationError(format!(
            "Failed to read policy file {}: {}",
            path.display(),
            e
        ))
    })?;
    let policy: ValidationPolicy = match ConfigFormat::from_path(path) {
        ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| {
            SigningError::ConfigurationError(format!("Failed to parse policy file: {e}"))
        })?,
        ConfigFormat::Toml => toml::from_str(&content).map_err(|e| {
            SigningError::ConfigurationError(format!("Failed to parse policy file: {e}"))
        })?,
    };
    log::debug!("Loaded validation policy '{}' from {}", policy.name, path.display());
    Ok(policy)
}

/// Validate configuration values
fn validate_config(config: &ExtensionConfiguration) -> SigningResult<()> {
    parse_digest(&config.signature_timestamp_digest)?;
    parse_digest(&config.archive_timestamp_digest)?;
    for method in [
        &config.signature_timestamp_canonicalization,
        &config.archive_timestamp_canonicalization,
    ]
    .into_iter()
    .flatten()
    {
        parse_c14n(method)?;
    }

    TsaUrl::new(&config.primary_timestamp_server)?;
    for url in &config.fallback_timestamp_servers {
        TsaUrl::new(url)?;
    }

    if config.network_timeout_seconds == 0 {
        return Err(SigningError::ConfigurationError(
            "Network timeout must be greater than 0".to_string(),
        ));
    }

    if config.retry_attempts == 0 {
        return Err(SigningError::ConfigurationError(
            "Retry attempts must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

fn parse_digest(value: &str) -> SigningResult<DigestAlgorithm> {
    value
        .parse::<DigestAlgorithm>()
        .map_err(|_| SigningError::ConfigurationError(format!("Invalid digest algorithm: {value}")))
}

fn parse_c14n(value: &str) -> SigningResult<Option<String>> {
    if value.is_empty() {
        return Ok(None);
    }
    if SUPPORTED_C14N_METHODS.contains(&value) {
        Ok(Some(value.to_string()))
    } else {
        Err(SigningError::ConfigurationError(format!(
            "Unsupported canonicalization method: {value}"
        )))
    }
}

fn parse_mode(value: &str) -> SigningResult<ExtensionMode> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Ok(ExtensionMode::Strict),
        "cascade" => Ok(ExtensionMode::Cascade),
        _ => Err(SigningError::ConfigurationError(format!(
            "Invalid extension mode: {value} (expected strict or cascade)"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> SigningResult<T> {
    value
        .parse()
        .map_err(|_| SigningError::ConfigurationError(format!("Invalid number for {key}: {value}")))
}
