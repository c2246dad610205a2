//! Configuration management module

use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use crate::registry::capability::{CapabilityPolicy, RegistryRef, RegistryType};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_ADDRESS: &str = "REGSYNC_ADDRESS";
pub const ENV_TOKEN: &str = "REGSYNC_TOKEN";

const DEFAULT_TIMEOUT: u64 = 60;
pub const DEFAULT_LISTING_CONCURRENCY: usize = 8;

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub address: String,
    #[serde(default)]
    pub registry_id: u32,
    #[serde(default = "default_registry_type")]
    pub registry_type: RegistryType,
    #[serde(default)]
    pub skip_tls: bool,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// `n` sent with the first page of a listing
    #[serde(default)]
    pub page_size: Option<u32>,
    /// Tag listings walked at once when counting tags per repository
    #[serde(default = "default_listing_concurrency")]
    pub listing_concurrency: usize,
    /// Pre-issued bearer token
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

fn default_registry_type() -> RegistryType {
    RegistryType::Custom
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_listing_concurrency() -> usize {
    DEFAULT_LISTING_CONCURRENCY
}

impl RegistryConfig {
    pub fn new(address: String) -> Self {
        Self {
            address,
            registry_id: 0,
            registry_type: default_registry_type(),
            skip_tls: false,
            timeout: DEFAULT_TIMEOUT,
            page_size: None,
            listing_concurrency: DEFAULT_LISTING_CONCURRENCY,
            token: None,
        }
    }

    pub fn with_registry_type(mut self, registry_type: RegistryType) -> Self {
        self.registry_type = registry_type;
        self
    }

    pub fn with_registry_id(mut self, registry_id: u32) -> Self {
        self.registry_id = registry_id;
        self
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_listing_concurrency(mut self, listing_concurrency: usize) -> Self {
        self.listing_concurrency = listing_concurrency;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn registry_ref(&self) -> RegistryRef {
        RegistryRef::new(self.registry_id, self.registry_type)
    }

    pub fn validate(&self) -> Result<()> {
        ValidationErrorHandler::validate_address(&self.address)?;
        ValidationErrorHandler::validate_timeout(self.timeout)?;

        if self.page_size == Some(0) {
            return Err(RegistryError::Validation(
                "page_size must be greater than 0".to_string(),
            ));
        }
        if self.listing_concurrency == 0 {
            return Err(RegistryError::Validation(
                "listing_concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub registry: RegistryConfig,
    /// Entries layered over the built-in capability table
    #[serde(default = "CapabilityPolicy::empty")]
    pub capabilities: CapabilityPolicy,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub quiet: bool,
}

impl AppConfig {
    pub fn new(registry: RegistryConfig) -> Self {
        Self {
            registry,
            capabilities: CapabilityPolicy::empty(),
            verbose: false,
            quiet: false,
        }
    }

    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            RegistryError::Configuration(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    /// Fill the address and token from the environment when they are unset
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.registry.address.is_empty() {
            if let Some(address) = lookup(ENV_ADDRESS) {
                self.registry.address = address;
            }
        }
        if self.registry.token.is_none() {
            self.registry.token = lookup(ENV_TOKEN).filter(|t| !t.is_empty());
        }
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Built-in capability table with this config's entries on top
    pub fn policy(&self) -> CapabilityPolicy {
        CapabilityPolicy::default().merge(self.capabilities.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.verbose && self.quiet {
            return Err(RegistryError::Validation(
                "verbose and quiet cannot both be set".to_string(),
            ));
        }
        self.registry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_config_defaults_and_validation() {
        let config = RegistryConfig::new("https://ghcr.io".to_string())
            .with_registry_type(RegistryType::Github)
            .with_registry_id(3);
        assert!(config.validate().is_ok());
        assert_eq!(config.registry_ref(), RegistryRef::new(3, RegistryType::Github));

        assert!(RegistryConfig::new("ghcr.io".to_string()).validate().is_err());
        assert!(RegistryConfig::new("https://ghcr.io".to_string())
            .with_timeout(0)
            .validate()
            .is_err());
        assert!(RegistryConfig::new("https://ghcr.io".to_string())
            .with_page_size(Some(0))
            .validate()
            .is_err());
        assert!(RegistryConfig::new("https://ghcr.io".to_string())
            .with_listing_concurrency(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_app_config_from_json() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "registry": { "address": "https://registry.local:5000", "registry_type": "gitlab" },
                "capabilities": { "gitlab": { "max_write_concurrency": 2 } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.registry.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.registry.listing_concurrency, DEFAULT_LISTING_CONCURRENCY);
        assert_eq!(config.registry.registry_type, RegistryType::Gitlab);
        let policy = config.policy();
        assert_eq!(policy.concurrency_step_for(RegistryType::Gitlab), Some(2));
        assert_eq!(policy.concurrency_step_for(RegistryType::Github), Some(1));
    }

    #[test]
    fn test_env_fills_only_missing_values() {
        let lookup = |key: &str| match key {
            ENV_ADDRESS => Some("https://env.example.com".to_string()),
            ENV_TOKEN => Some("secret".to_string()),
            _ => None,
        };

        let config = AppConfig::new(RegistryConfig::new(String::new())).apply_env_with(lookup);
        assert_eq!(config.registry.address, "https://env.example.com");
        assert_eq!(config.registry.token.as_deref(), Some("secret"));

        let config = AppConfig::new(
            RegistryConfig::new("https://cli.example.com".to_string())
                .with_token(Some("flag".to_string())),
        )
        .apply_env_with(lookup);
        assert_eq!(config.registry.address, "https://cli.example.com");
        assert_eq!(config.registry.token.as_deref(), Some("flag"));
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = RegistryConfig::new("https://r.example.com".to_string())
            .with_token(Some("secret".to_string()));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let config = AppConfig::new(RegistryConfig::new("https://r.example.com".to_string()))
            .with_verbose(true)
            .with_quiet(true);
        assert!(config.validate().is_err());
    }
}
