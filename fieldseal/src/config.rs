//! Configuration for the vault and the key amortizer.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vault configuration.
///
/// Deserializes from any serde format; missing entries take their defaults.
///
/// ```rust
/// use fieldseal::config::VaultConfig;
///
/// let config: VaultConfig = serde_json::from_str(r#"{"max_uses_per_data_key": 5}"#).unwrap();
/// assert_eq!(config.max_uses_per_data_key, 5);
/// assert_eq!(config.provider_timeout_ms, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VaultConfig {
    /// How many `encrypt_item` calls may share one provider-issued data key.
    /// `1` requests a fresh key for every call.
    pub max_uses_per_data_key: u32,

    /// Deadline for a single key provider call, in milliseconds.
    pub provider_timeout_ms: Option<u64>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self { max_uses_per_data_key: 1, provider_timeout_ms: None }
    }
}

impl VaultConfig {
    /// Checks that all values are in range.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `max_uses_per_data_key` is zero or
    /// the provider timeout is zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_uses_per_data_key == 0 {
            return Err(Error::InvalidConfig("max_uses_per_data_key must be at least 1".to_string()));
        }
        if self.provider_timeout_ms == Some(0) {
            return Err(Error::InvalidConfig("provider_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Provider call deadline as a [`Duration`].
    #[must_use]
    pub fn provider_timeout(&self) -> Option<Duration> {
        self.provider_timeout_ms.map(Duration::from_millis)
    }
}

/// Key amortizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmortizerConfig {
    /// Number of data keys derived from one provider-issued source key.
    pub derivations_per_key: u32,
}

impl AmortizerConfig {
    /// Creates a configuration deriving `derivations_per_key` keys per source key.
    #[must_use]
    pub const fn new(derivations_per_key: u32) -> Self {
        Self { derivations_per_key }
    }

    /// Checks that all values are in range.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `derivations_per_key` is zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.derivations_per_key == 0 {
            return Err(Error::InvalidConfig("derivations_per_key must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.max_uses_per_data_key, 1);
        assert!(config.provider_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: VaultConfig = serde_json::from_str(r#"{"provider_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.max_uses_per_data_key, 1);
        assert_eq!(config.provider_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = serde_json::from_str::<VaultConfig>(r#"{"max_uses": 3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let zero_uses = VaultConfig { max_uses_per_data_key: 0, provider_timeout_ms: None };
        assert!(matches!(zero_uses.validate(), Err(Error::InvalidConfig(_))));

        let zero_timeout = VaultConfig { max_uses_per_data_key: 1, provider_timeout_ms: Some(0) };
        assert!(matches!(zero_timeout.validate(), Err(Error::InvalidConfig(_))));

        assert!(matches!(AmortizerConfig::new(0).validate(), Err(Error::InvalidConfig(_))));
        assert!(AmortizerConfig::new(1).validate().is_ok());
    }
}
