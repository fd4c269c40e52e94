use crate::error::{OrchestratorError, Result};
use crate::exchange::coinbase::{DEFAULT_MARKET_WS_URL, DEFAULT_USER_WS_URL};
use crate::exchange::rest::DEFAULT_REST_URL;
use crate::exchange::FeedUrls;
use crate::manager::{ManagerConfig, ManagerParams};
use crate::models::{CandleSize, StrategyKind};
use crate::signaler::SignalerConfig;
use crate::trader::TraderConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "ORCHESTRATOR";
const DEFAULT_FILE: &str = "config/default";

/// Brokerage endpoints and credentials
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub rest_url: String,
    pub market_ws_url: String,
    pub user_ws_url: String,
    /// Pre-built JWT sent as `Authorization: Bearer`
    pub bearer_token: String,
    pub requests_per_second: u32,
    pub request_timeout_secs: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            rest_url: DEFAULT_REST_URL.to_string(),
            market_ws_url: DEFAULT_MARKET_WS_URL.to_string(),
            user_ws_url: DEFAULT_USER_WS_URL.to_string(),
            bearer_token: String::new(),
            requests_per_second: 10,
            request_timeout_secs: 10,
        }
    }
}

impl ExchangeSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn feed_urls(&self) -> FeedUrls {
        FeedUrls {
            market: self.market_ws_url.clone(),
            user: self.user_ws_url.clone(),
        }
    }
}

/// Process-wide settings
///
/// Layered from built-in defaults, `config/default.toml`, an optional file
/// given on the command line and `ORCHESTRATOR__*` environment variables,
/// later sources winning.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub universe: Vec<String>,
    pub total_funds: f64,
    pub daily_max_pl: f64,
    pub default_strategy: String,
    pub default_candle_size: String,
    pub inbound_candle_size: String,
    /// Symbols started on boot
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub trader: TraderConfig,
    #[serde(default)]
    pub signaler: SignalerConfig,
    #[serde(default)]
    pub manager: ManagerConfig,
}

impl Settings {
    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("universe", Vec::<String>::new())?
            .set_default("total_funds", 1000.0)?
            .set_default("daily_max_pl", 100.0)?
            .set_default("default_strategy", StrategyKind::DonchianChannel.as_str())?
            .set_default("default_candle_size", "5m")?
            .set_default("inbound_candle_size", "5m")?
            .set_default("enabled", Vec::<String>::new())?)
    }

    /// Load every layer and validate the result
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Self::defaults()?.add_source(File::with_name(DEFAULT_FILE).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("universe")
                    .with_list_parse_key("enabled"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overlaid with an inline TOML document
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings: Settings = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.universe.is_empty() {
            return Err(OrchestratorError::Config("universe is empty".to_string()));
        }
        if self.total_funds <= 0.0 {
            return Err(OrchestratorError::Config(format!(
                "total_funds must be positive, got {}",
                self.total_funds
            )));
        }
        if self.daily_max_pl < 0.0 {
            return Err(OrchestratorError::Config(format!(
                "daily_max_pl must not be negative, got {}",
                self.daily_max_pl
            )));
        }
        if let Some(stray) = self.enabled.iter().find(|s| !self.universe.contains(s)) {
            return Err(OrchestratorError::Config(format!(
                "enabled symbol {stray} is not in the universe"
            )));
        }

        self.strategy()?;
        self.candle_size()?;
        self.inbound_size()?;
        Ok(())
    }

    pub fn strategy(&self) -> Result<StrategyKind> {
        self.default_strategy.parse()
    }

    pub fn candle_size(&self) -> Result<CandleSize> {
        self.default_candle_size.parse()
    }

    pub fn inbound_size(&self) -> Result<CandleSize> {
        self.inbound_candle_size.parse()
    }

    pub fn manager_params(&self) -> Result<ManagerParams> {
        Ok(ManagerParams {
            universe: self.universe.clone(),
            total_funds: self.total_funds,
            daily_max_pl: self.daily_max_pl,
            default_strategy: self.strategy()?,
            default_candle_size: self.candle_size()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let settings = Settings::from_toml(r#"universe = ["ETH-USD", "BTC-USD"]"#).unwrap();

        assert_eq!(settings.total_funds, 1000.0);
        assert_eq!(settings.strategy().unwrap(), StrategyKind::DonchianChannel);
        assert_eq!(settings.inbound_size().unwrap(), CandleSize::FiveMinutes);
        assert_eq!(settings.trader.reconcile_interval_ms, 30_000);
        assert_eq!(settings.signaler.publish_timeout_ms, 100);
        assert_eq!(settings.manager.stop_all_timeout_ms, 22_000);
        assert_eq!(settings.exchange.rest_url, DEFAULT_REST_URL);
        assert!(settings.enabled.is_empty());
    }

    #[test]
    fn test_file_overrides_sections() {
        let settings = Settings::from_toml(
            r#"
            universe = ["ETH-USD"]
            total_funds = 2500.0
            default_strategy = "Supertrend"
            default_candle_size = "1h"
            enabled = ["ETH-USD"]

            [trader]
            tolerance_ratio = 0.05

            [exchange]
            requests_per_second = 3
            "#,
        )
        .unwrap();

        let params = settings.manager_params().unwrap();
        assert_eq!(params.total_funds, 2500.0);
        assert_eq!(params.default_strategy, StrategyKind::Supertrend);
        assert_eq!(params.default_candle_size, CandleSize::OneHour);
        assert_eq!(settings.trader.tolerance_ratio, 0.05);
        assert_eq!(settings.trader.close_out_timeout_ms, 10_000);
        assert_eq!(settings.exchange.requests_per_second, 3);
        assert_eq!(settings.exchange.market_ws_url, DEFAULT_MARKET_WS_URL);
    }

    #[test]
    fn test_validation_rejects_bad_settings() {
        let cases = [
            "universe = []",
            r#"universe = ["ETH-USD"]
               total_funds = 0.0"#,
            r#"universe = ["ETH-USD"]
               daily_max_pl = -1.0"#,
            r#"universe = ["ETH-USD"]
               enabled = ["BTC-USD"]"#,
            r#"universe = ["ETH-USD"]
               default_strategy = "Martingale""#,
            r#"universe = ["ETH-USD"]
               default_candle_size = "7m""#,
        ];

        for toml in cases {
            assert!(
                Settings::from_toml(toml).is_err(),
                "accepted invalid settings: {toml}"
            );
        }
    }
}
