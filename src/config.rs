/// Configuration loading from TOML file
use std::path::Path;

use serde::Deserialize;

use crate::broker::PdtPolicy;
use crate::error::{Result, TradingError};

/// Which backend the broker talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Mock,
    Alpaca,
}

/// Which PDT policy admits orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdtPolicyKind {
    Nun,
    Wiggle,
    Yolo,
}

/// Where daily bar history comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarSourceKind {
    Csv,
    Yahoo,
}

fn default_bar_source() -> BarSourceKind {
    BarSourceKind::Csv
}

/// Runtime configuration for one trading cycle
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Watchlist & Strategy
    pub watchlist: Vec<String>,
    pub strategy: String,
    #[serde(default = "default_strategies_dir")]
    pub strategies_dir: String,

    // Market Data
    #[serde(default = "default_bar_source")]
    pub bar_source: BarSourceKind,
    #[serde(default = "default_bar_data_dir")]
    pub bar_data_dir: String,

    // Broker
    pub broker: BrokerKind,
    pub pdt_policy: PdtPolicyKind,
    pub wiggle_room: Option<u32>,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_strategies_dir() -> String {
    "strategies".to_string()
}

fn default_bar_data_dir() -> String {
    "data/bars".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// The configured PDT policy value
    pub fn pdt_policy(&self) -> Result<PdtPolicy> {
        match self.pdt_policy {
            PdtPolicyKind::Nun => Ok(PdtPolicy::Nun),
            PdtPolicyKind::Yolo => Ok(PdtPolicy::Yolo),
            PdtPolicyKind::Wiggle => {
                let wiggle_room = self.wiggle_room.ok_or_else(|| {
                    TradingError::ConfigError(
                        "wiggle_room is required when pdt_policy is 'wiggle'".to_string(),
                    )
                })?;
                Ok(PdtPolicy::Wiggle { wiggle_room })
            }
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(&path).map_err(|e| {
        TradingError::ConfigError(format!(
            "failed to read config file {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    let config: Config = toml::from_str(&content)
        .map_err(|e| TradingError::ConfigError(format!("failed to parse config: {}", e)))?;

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.watchlist.is_empty() {
        return Err(TradingError::ConfigError("watchlist is empty".to_string()));
    }
    if config.strategy.is_empty() {
        return Err(TradingError::ConfigError("strategy is empty".to_string()));
    }
    // Surface the wiggle_room pairing error at load time
    config.pdt_policy()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        watchlist = ["AAPL", "MSFT"]
        strategy = "basic"
        broker = "mock"
        pdt_policy = "nun"
    "#;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str(VALID).unwrap();
        assert_eq!(config.watchlist, vec!["AAPL", "MSFT"]);
        assert_eq!(config.broker, BrokerKind::Mock);
        assert_eq!(config.bar_source, BarSourceKind::Csv);
        assert_eq!(config.strategies_dir, "strategies");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.pdt_policy().unwrap(), PdtPolicy::Nun);
    }

    #[test]
    fn test_yahoo_bar_source_selected() {
        let source = format!("{}\nbar_source = \"yahoo\"", VALID);
        let config: Config = toml::from_str(&source).unwrap();
        assert_eq!(config.bar_source, BarSourceKind::Yahoo);
    }

    #[test]
    fn test_wiggle_requires_room() {
        let source = VALID.replace("\"nun\"", "\"wiggle\"");
        let config: Config = toml::from_str(&source).unwrap();
        assert!(validate_config(&config).is_err());

        let with_room = format!("{}\nwiggle_room = 2", source);
        let config: Config = toml::from_str(&with_room).unwrap();
        assert_eq!(
            config.pdt_policy().unwrap(),
            PdtPolicy::Wiggle { wiggle_room: 2 }
        );
    }

    #[test]
    fn test_empty_watchlist_rejected() {
        let source = VALID.replace("[\"AAPL\", \"MSFT\"]", "[]");
        let config: Config = toml::from_str(&source).unwrap();
        assert!(matches!(
            validate_config(&config),
            Err(TradingError::ConfigError(_))
        ));
    }
}
