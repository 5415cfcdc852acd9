//! Runtime configuration for the registry

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Difficulty used when none is configured
pub const DEFAULT_DIFFICULTY: u32 = 2;

/// Highest difficulty accepted from configuration
pub const MAX_DIFFICULTY: u32 = 8;

pub const DIFFICULTY_VAR: &str = "REGISTRY_DIFFICULTY";
pub const MINING_TIMEOUT_VAR: &str = "REGISTRY_MINING_TIMEOUT_MS";

/// Errors that can occur while reading configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("Difficulty {difficulty} is above the maximum of {max}")]
    DifficultyTooHigh { difficulty: u32, max: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Leading hex zeros required in every block hash
    pub difficulty: u32,

    /// Upper bound on mining a single block, `None` for no bound
    pub mining_timeout: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            difficulty: DEFAULT_DIFFICULTY,
            mining_timeout: None,
        }
    }
}

impl RegistryConfig {
    /// Reads the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, falling back to defaults
    /// for missing keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RegistryConfig::default();

        if let Some(raw) = lookup(DIFFICULTY_VAR) {
            let difficulty = parse_var::<u32>(DIFFICULTY_VAR, &raw)?;
            if difficulty > MAX_DIFFICULTY {
                return Err(ConfigError::DifficultyTooHigh {
                    difficulty,
                    max: MAX_DIFFICULTY,
                });
            }
            config.difficulty = difficulty;
        }

        if let Some(raw) = lookup(MINING_TIMEOUT_VAR) {
            let millis = parse_var::<u64>(MINING_TIMEOUT_VAR, &raw)?;
            // 0 disables the bound
            config.mining_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
    })
}
