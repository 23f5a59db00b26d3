use crate::api::ExchangeClient;
use crate::db::CoinStore;
use crate::models::CoinState;
use crate::Result;

/// Totals of a coin universe sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub listed: usize,
    pub added: usize,
    pub known: usize,
    pub unresolved: usize,
}

/// Registers every listed pair not yet stored
pub struct CoinUniverseSync<'a, E, S> {
    exchange: &'a E,
    store: &'a S,
}

impl<'a, E, S> CoinUniverseSync<'a, E, S>
where
    E: ExchangeClient,
    S: CoinStore,
{
    pub fn new(exchange: &'a E, store: &'a S) -> Self {
        Self { exchange, store }
    }

    /// New pairs start unchecked and not flat
    pub async fn run(&self, delay: std::time::Duration) -> Result<SyncReport> {
        let tickers = self.exchange.ticker_prices().await?;
        let mut report = SyncReport {
            listed: tickers.len(),
            ..SyncReport::default()
        };
        tracing::info!("🌐 Exchange lists {} pairs", tickers.len());

        for ticker in &tickers {
            if self.store.coin(&ticker.symbol).await?.is_some() {
                report.known += 1;
                continue;
            }

            match self.exchange.symbol_info(&ticker.symbol).await? {
                Some(info) => {
                    if self.store.insert_coin(&CoinState::discovered(&info)).await? {
                        tracing::info!(
                            symbol = %info.symbol,
                            "➕ Added {}/{} (trading allowed: {})",
                            info.base_asset,
                            info.quote_asset,
                            info.trading_allowed
                        );
                        report.added += 1;
                    } else {
                        report.known += 1;
                    }
                }
                None => {
                    tracing::warn!(symbol = %ticker.symbol, "No exchange info, skipping");
                    report.unresolved += 1;
                }
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!(
            "🌐 Sync done: {} added, {} known, {} unresolved",
            report.added,
            report.known,
            report.unresolved
        );
        Ok(report)
    }
}
