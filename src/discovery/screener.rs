use crate::api::ExchangeClient;
use crate::clock::Clock;
use crate::config::EngineSettings;
use crate::db::{CoinFilter, CoinStore};
use crate::indicators::{analyze_flat, CandleWindow, DEFAULT_MAX_VOLATILITY_PERCENT, DEFAULT_WINDOW_HOURS};
use crate::models::{CoinState, FlatAnalysis};
use crate::Result;
use chrono::Duration;
use rust_decimal::Decimal;
use std::fmt;

/// Parameters of one flat check
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenOptions {
    pub min_recheck: Duration,
    pub max_volatility_percent: Decimal,
    pub percentile: Option<u32>,
    pub window: Duration,
    pub interval_minutes: u32,
    pub candle_limit: u32,
}

impl Default for ScreenOptions {
    fn default() -> Self {
        Self {
            min_recheck: Duration::minutes(180),
            max_volatility_percent: DEFAULT_MAX_VOLATILITY_PERCENT,
            percentile: None,
            window: Duration::hours(DEFAULT_WINDOW_HOURS),
            interval_minutes: 15,
            candle_limit: 700,
        }
    }
}

impl ScreenOptions {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            min_recheck: Duration::minutes(settings.min_recheck_minutes),
            max_volatility_percent: settings.max_volatility_percent,
            percentile: None,
            window: Duration::hours(settings.candle_window_hours),
            interval_minutes: settings.candle_interval_minutes,
            candle_limit: settings.candle_limit,
        }
    }

    /// Ignore the last check time
    pub fn forced(mut self) -> Self {
        self.min_recheck = Duration::zero();
        self
    }

    pub fn with_percentile(mut self, percentile: Option<u32>) -> Self {
        self.percentile = percentile;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CheckedRecently,
    InvalidSymbol,
    NoRecentCandles,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::CheckedRecently => write!(f, "checked recently"),
            SkipReason::InvalidSymbol => write!(f, "invalid symbol"),
            SkipReason::NoRecentCandles => write!(f, "no recent candles"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScreenOutcome {
    Skipped(SkipReason),
    Checked(FlatAnalysis),
}

impl ScreenOutcome {
    /// Analysis of a coin found flat
    pub fn flat(&self) -> Option<&FlatAnalysis> {
        match self {
            ScreenOutcome::Checked(analysis) if analysis.is_flat => Some(analysis),
            _ => None,
        }
    }

    /// True when the exchange was queried
    fn touched_exchange(&self) -> bool {
        !matches!(self, ScreenOutcome::Skipped(SkipReason::CheckedRecently))
    }
}

/// Totals of a batch screening pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenReport {
    pub checked: usize,
    pub flat: usize,
    pub skipped_recent: usize,
    pub skipped_invalid: usize,
    pub skipped_no_data: usize,
}

impl ScreenReport {
    fn record(&mut self, outcome: &ScreenOutcome) {
        match outcome {
            ScreenOutcome::Checked(analysis) => {
                self.checked += 1;
                if analysis.is_flat {
                    self.flat += 1;
                }
            }
            ScreenOutcome::Skipped(SkipReason::CheckedRecently) => self.skipped_recent += 1,
            ScreenOutcome::Skipped(SkipReason::InvalidSymbol) => self.skipped_invalid += 1,
            ScreenOutcome::Skipped(SkipReason::NoRecentCandles) => self.skipped_no_data += 1,
        }
    }
}

/// Runs flat detection for coins and persists the verdict
pub struct CoinScreener<'a, E, S, C> {
    exchange: &'a E,
    store: &'a S,
    clock: &'a C,
}

impl<'a, E, S, C> CoinScreener<'a, E, S, C>
where
    E: ExchangeClient,
    S: CoinStore,
    C: Clock,
{
    pub fn new(exchange: &'a E, store: &'a S, clock: &'a C) -> Self {
        Self {
            exchange,
            store,
            clock,
        }
    }

    /// Re-check one coin unless it was checked within `min_recheck`
    ///
    /// The flat flag and check time are stored on every completed check. The
    /// range levels are stored only when the coin is flat; a non-flat verdict
    /// leaves the previous levels in place.
    pub async fn check_and_update(&self, coin: &CoinState, options: &ScreenOptions) -> Result<ScreenOutcome> {
        let now = self.clock.now();

        if options.min_recheck > Duration::zero() {
            if let Some(last_check) = coin.last_check {
                if now - last_check < options.min_recheck {
                    tracing::debug!(symbol = %coin.symbol, "Skipping, checked at {}", last_check);
                    return Ok(ScreenOutcome::Skipped(SkipReason::CheckedRecently));
                }
            }
        }

        let candles = match self
            .exchange
            .candles(&coin.symbol, options.interval_minutes, options.candle_limit)
            .await
        {
            Ok(candles) => candles,
            Err(e) if e.is_invalid_symbol() => {
                tracing::warn!(symbol = %coin.symbol, "Skipping, exchange reports invalid symbol");
                return Ok(ScreenOutcome::Skipped(SkipReason::InvalidSymbol));
            }
            Err(e) => return Err(e),
        };

        let fetched = candles.len();
        let window = CandleWindow::trailing(candles, options.window, now);
        if window.is_empty() {
            tracing::debug!(symbol = %coin.symbol, "Skipping, no candles in the last {}h", options.window.num_hours());
            return Ok(ScreenOutcome::Skipped(SkipReason::NoRecentCandles));
        }

        let analysis = analyze_flat(&window, options.max_volatility_percent, options.percentile);

        tracing::debug!(
            symbol = %coin.symbol,
            "candles {}/{} flat={} support={} resistance={} range={}% avg={} volatility={}% drawdown={}% rise={}%",
            fetched,
            window.len(),
            analysis.is_flat,
            analysis.support,
            analysis.resistance,
            analysis.range_percent.round_dp(2),
            analysis.avg_price,
            analysis.volatility_percent.round_dp(2),
            analysis.max_drawdown_percent.round_dp(2),
            analysis.max_rise_percent.round_dp(2),
        );

        self.store
            .update_flat_flag(&coin.symbol, analysis.is_flat, now)
            .await?;
        if analysis.is_flat {
            self.store.update_levels(&coin.symbol, &analysis).await?;
        }

        Ok(ScreenOutcome::Checked(analysis))
    }

    /// Check every coin matching `filter`, pausing `delay` after each exchange call
    pub async fn screen_batch(
        &self,
        filter: CoinFilter,
        options: &ScreenOptions,
        delay: std::time::Duration,
    ) -> Result<ScreenReport> {
        let coins = self.store.coins(filter).await?;
        tracing::info!("🔍 Screening {} coins", coins.len());

        let mut report = ScreenReport::default();
        for (i, coin) in coins.iter().enumerate() {
            let outcome = self.check_and_update(coin, options).await?;

            match &outcome {
                ScreenOutcome::Checked(a) if a.is_flat => tracing::info!(
                    symbol = %coin.symbol,
                    "✅ [{}/{}] flat: {} .. {}",
                    i + 1,
                    coins.len(),
                    a.support,
                    a.resistance
                ),
                ScreenOutcome::Checked(_) => {
                    tracing::info!(symbol = %coin.symbol, "[{}/{}] not flat", i + 1, coins.len())
                }
                ScreenOutcome::Skipped(reason) => {
                    tracing::info!(symbol = %coin.symbol, "[{}/{}] skipped: {}", i + 1, coins.len(), reason)
                }
            }

            report.record(&outcome);
            if outcome.touched_exchange() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!(
            "📊 Screening done: {} checked, {} flat, {} recent, {} invalid, {} without data",
            report.checked,
            report.flat,
            report.skipped_recent,
            report.skipped_invalid,
            report.skipped_no_data
        );
        Ok(report)
    }
}
