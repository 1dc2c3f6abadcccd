//! Engine configuration loaded from TOML.
//!
//! Every section is optional; missing sections and fields fall back to the
//! defaults below.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [analyzer]
//! max_price_multiplier = 4.0
//!
//! [trading]
//! flip_max_risk = 0.5
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub logging: LoggingConfig,
    pub market: MarketConfig,
    pub analyzer: AnalyzerConfig,
    pub trading: TradingConfig,
    pub intelligence: IntelligenceConfig,
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let a = &self.analyzer;
        if a.min_price_multiplier <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "analyzer.min_price_multiplier",
                reason: "must be positive".into(),
            }
            .into());
        }
        if a.max_price_multiplier <= a.min_price_multiplier {
            return Err(ConfigError::InvalidValue {
                field: "analyzer.max_price_multiplier",
                reason: format!("must exceed min_price_multiplier ({})", a.min_price_multiplier),
            }
            .into());
        }
        if a.z_score_threshold <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "analyzer.z_score_threshold",
                reason: "must be positive".into(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.trading.flip_max_risk) {
            return Err(ConfigError::InvalidValue {
                field: "trading.flip_max_risk",
                reason: "must be within 0..=1".into(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `RUST_LOG` wins over `level`.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Samples and listings older than this are dropped by `cleanup`.
    pub retention_days: i64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub z_score_threshold: f64,
    /// Prices above `mean * max_price_multiplier` are anomalous.
    pub max_price_multiplier: f64,
    /// Prices below `mean * min_price_multiplier` are anomalous.
    pub min_price_multiplier: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            z_score_threshold: 3.0,
            max_price_multiplier: 3.0,
            min_price_multiplier: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub arbitrage_min_profit: i64,
    pub arbitrage_min_margin: f64,
    pub flip_min_profit: i64,
    pub flip_max_risk: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            arbitrage_min_profit: 1000,
            arbitrage_min_margin: 0.05,
            flip_min_profit: 1000,
            flip_max_risk: 0.6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntelligenceConfig {
    pub recent_alert_limit: usize,
    pub investment_hold_days: i64,
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            recent_alert_limit: 20,
            investment_hold_days: 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::parse_toml("").unwrap();
        assert_eq!(config.market.retention_days, 30);
        assert_eq!(config.analyzer.max_price_multiplier, 3.0);
        assert_eq!(config.analyzer.min_price_multiplier, 0.1);
        assert_eq!(config.intelligence.recent_alert_limit, 20);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_sections_override_fields() {
        let config = EngineConfig::parse_toml(
            r#"
            [analyzer]
            max_price_multiplier = 5.0

            [trading]
            flip_min_profit = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.analyzer.max_price_multiplier, 5.0);
        assert_eq!(config.analyzer.z_score_threshold, 3.0);
        assert_eq!(config.trading.flip_min_profit, 250);
        assert_eq!(config.trading.arbitrage_min_profit, 1000);
    }

    #[test]
    fn inverted_multipliers_are_rejected() {
        let err = EngineConfig::parse_toml(
            r#"
            [analyzer]
            max_price_multiplier = 0.05
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { field: "analyzer.max_price_multiplier", .. })
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::parse_toml("[market\nretention_days = 3").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Parse(_))));
    }
}
