//! Layered settings: defaults, optional `palisade.toml`, then `PALISADE__*`
//! environment variables.

use crate::{Error, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "palisade.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub mexc: MexcSettings,
    pub telegram: TelegramSettings,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MexcSettings {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub recv_window_ms: u64,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for MexcSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            base_url: "https://api.mexc.com".to_string(),
            recv_window_ms: 5000,
            requests_per_second: 10,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            base_url: "https://api.telegram.org".to_string(),
            timeout_secs: 10,
        }
    }
}

impl TelegramSettings {
    /// Token and chat id, when both are set and non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_deref().filter(|t| !t.is_empty())?;
        let chat = self.chat_id.as_deref().filter(|c| !c.is_empty())?;
        Some((token, chat))
    }
}

/// Trading and screening parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub quote_asset: String,
    pub max_open_orders: u32,
    pub per_order_notional: Decimal,
    pub max_volatility_percent: Decimal,
    pub min_recheck_minutes: i64,
    pub entry_percentile: u32,
    pub candle_window_hours: i64,
    pub candle_interval_minutes: u32,
    pub candle_limit: u32,
    pub order_timeout_minutes: i64,
    pub settlement_delay_secs: u64,
    pub screen_delay_secs: u64,
    pub sync_delay_secs: u64,
    pub candidate_limit: u32,
    pub screen_limit: u32,
    pub report_utc_offset_hours: i32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            quote_asset: "USDT".to_string(),
            max_open_orders: 5,
            per_order_notional: dec!(2),       // USDT per entry
            max_volatility_percent: dec!(5.0), // flat ceiling
            min_recheck_minutes: 180,
            entry_percentile: 90,
            candle_window_hours: 4,
            candle_interval_minutes: 15,
            candle_limit: 700,
            order_timeout_minutes: 120,
            settlement_delay_secs: 10, // after cancelling before a market sell
            screen_delay_secs: 3,
            sync_delay_secs: 2,
            candidate_limit: 50,
            screen_limit: 3000,
            report_utc_offset_hours: 7, // GMT+7
        }
    }
}

impl Settings {
    /// Load settings from `path` (missing file is fine) and the environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = path.unwrap_or(DEFAULT_CONFIG_FILE);

        let settings: Settings = Config::builder()
            .add_source(File::with_name(file).required(path.is_some()))
            .add_source(
                Environment::with_prefix("PALISADE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(Error::InvalidConfig("database_url is required".to_string()));
        }
        if self.mexc.api_key.is_empty() || self.mexc.api_secret.is_empty() {
            return Err(Error::InvalidConfig(
                "mexc.api_key and mexc.api_secret are required".to_string(),
            ));
        }
        if self.mexc.base_url.is_empty() {
            return Err(Error::InvalidConfig("mexc.base_url is empty".to_string()));
        }
        self.engine.validate()
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_open_orders == 0 {
            return Err(Error::InvalidConfig(
                "engine.max_open_orders must be at least 1".to_string(),
            ));
        }
        if self.per_order_notional <= Decimal::ZERO {
            return Err(Error::InvalidConfig(
                "engine.per_order_notional must be positive".to_string(),
            ));
        }
        if !(1..=100).contains(&self.entry_percentile) {
            return Err(Error::InvalidConfig(
                "engine.entry_percentile must be within 1..=100".to_string(),
            ));
        }
        if self.candle_window_hours <= 0 || self.order_timeout_minutes <= 0 {
            return Err(Error::InvalidConfig(
                "engine window and timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
