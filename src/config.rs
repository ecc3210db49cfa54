// 7.0 config.rs: all settings in one place. margin rates and the per-account lock timeout.
// 7.1 from_env reads overrides, validate keeps the rates consistent.

use crate::margin::MarginParams;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub margin: MarginParams,
    // how long a request waits for an account held by another request
    pub lock_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            margin: MarginParams::default(),
            lock_timeout_ms: 1_000,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `INITIAL_MARGIN_RATE`, `MAINTENANCE_MARGIN_RATE`
    /// and `LOCK_TIMEOUT_MS`. The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var("INITIAL_MARGIN_RATE") {
            config.margin.initial_margin_rate = parse_rate("INITIAL_MARGIN_RATE", &raw)?;
        }
        if let Ok(raw) = env::var("MAINTENANCE_MARGIN_RATE") {
            config.margin.maintenance_margin_rate = parse_rate("MAINTENANCE_MARGIN_RATE", &raw)?;
        }
        if let Ok(raw) = env::var("LOCK_TIMEOUT_MS") {
            config.lock_timeout_ms = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "LOCK_TIMEOUT_MS",
                value: raw.clone(),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let im = self.margin.initial_margin_rate;
        let mm = self.margin.maintenance_margin_rate;

        if im <= Decimal::ZERO || im > Decimal::ONE {
            return Err(ConfigError::InvalidMargin {
                reason: "IM rate must be in (0, 1]".to_string(),
            });
        }
        if mm <= Decimal::ZERO || mm >= im {
            return Err(ConfigError::InvalidMargin {
                reason: "MM rate must be positive and below the IM rate".to_string(),
            });
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidLockTimeout);
        }

        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn parse_rate(key: &'static str, raw: &str) -> Result<Decimal, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid margin configuration: {reason}")]
    InvalidMargin { reason: String },

    #[error("Lock timeout must be positive")]
    InvalidLockTimeout,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
