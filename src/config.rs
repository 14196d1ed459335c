//! Configuration management with validation and defaults
//!
//! Static deployment configuration: TOML file, `SATSDICE_*` environment
//! overrides on top, validation last. Per-wallet game settings are runtime
//! data and live in the session store, not here.

use crate::errors::{GameError, GameResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SatsdiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub draw: DrawConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Payment provider selection. Only the mock provider ships in this
/// build; endpoint and api_key are carried for a node-backed provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub provider: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            endpoint: None,
            api_key: None,
        }
    }
}

/// House draw key. With no seed configured a fresh key is generated at
/// startup, which changes the public key players verify proofs against.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Hex-encoded 32-byte seed.
    pub key_seed_hex: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter, overridden by RUST_LOG.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> GameResult<SatsdiceConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            SatsdiceConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        self.validate(&config)?;
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> GameResult<SatsdiceConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GameError::validation(format!("failed to read {path}: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| GameError::validation(format!("failed to parse {path}: {e}")))
    }

    fn apply_env_overrides(&self, config: &mut SatsdiceConfig) -> GameResult<()> {
        if let Ok(addr) = env::var("SATSDICE_LISTEN_ADDRESS") {
            config.server.listen_address = addr;
        }
        if let Ok(port) = env::var("SATSDICE_PORT") {
            config.server.port = port.parse().map_err(|_| {
                GameError::validation(format!("SATSDICE_PORT: {port} is not a valid port"))
            })?;
        }
        if let Ok(provider) = env::var("SATSDICE_PAYMENTS_PROVIDER") {
            config.payments.provider = provider;
        }
        if let Ok(seed) = env::var("SATSDICE_DRAW_KEY_SEED") {
            config.draw.key_seed_hex = Some(seed);
        }
        if let Ok(filter) = env::var("SATSDICE_LOG_FILTER") {
            config.logging.filter = filter;
        }
        Ok(())
    }

    fn validate(&self, config: &SatsdiceConfig) -> GameResult<()> {
        if config.server.port == 0 {
            return Err(GameError::validation("server.port must not be zero"));
        }
        if config.server.request_timeout_secs == 0 {
            return Err(GameError::validation(
                "server.request_timeout_secs must be at least 1",
            ));
        }
        if config.server.cors_origins.is_empty() {
            return Err(GameError::validation(
                "server.cors_origins must list at least one origin",
            ));
        }
        if config.payments.provider.is_empty() {
            return Err(GameError::validation("payments.provider must be set"));
        }
        if let Some(seed) = &config.draw.key_seed_hex {
            let bytes = hex::decode(seed)
                .map_err(|e| GameError::validation(format!("draw.key_seed_hex: {e}")))?;
            if bytes.len() != 32 {
                return Err(GameError::validation(
                    "draw.key_seed_hex must decode to 32 bytes",
                ));
            }
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &SatsdiceConfig, path: &str) -> GameResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| GameError::validation(format!("failed to serialize config: {e}")))?;

        std::fs::write(path, toml_string)
            .map_err(|e| GameError::validation(format!("failed to write to {path}: {e}")))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> GameResult<()> {
    let config = SatsdiceConfig::default();
    ConfigLoader::new().save(&config, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SatsdiceConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.payments.provider, "mock");
        assert!(config.draw.key_seed_hex.is_none());
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = SatsdiceConfig::default();
        assert!(loader.validate(&config).is_ok());

        config.server.port = 0;
        assert!(loader.validate(&config).is_err());

        config = SatsdiceConfig::default();
        config.draw.key_seed_hex = Some("not-hex".to_string());
        assert!(loader.validate(&config).is_err());

        config.draw.key_seed_hex = Some(hex::encode([9u8; 16]));
        assert!(loader.validate(&config).is_err());

        config.draw.key_seed_hex = Some(hex::encode([9u8; 32]));
        assert!(loader.validate(&config).is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[server]\nport = 9999\n").unwrap();

        let config = ConfigLoader::new()
            .with_path(temp_file.path())
            .load()
            .unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.listen_address, "0.0.0.0");
        assert_eq!(config.payments.provider, "mock");
    }

    #[test]
    fn test_save_and_load_config() -> GameResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = SatsdiceConfig::default();
        original.server.port = 7070;
        original.draw.key_seed_hex = Some(hex::encode([3u8; 32]));

        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.server.port, 7070);
        assert_eq!(loaded.draw.key_seed_hex, original.draw.key_seed_hex);
        Ok(())
    }
}
