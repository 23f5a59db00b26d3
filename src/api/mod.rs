pub mod mexc;
pub mod wire;

pub use mexc::MexcClient;

use crate::models::{
    AveragePrice, Balance, CancelOutcome, Candle, OrderReport, OrderRequest, PlacedOrder,
    SymbolInfo, TickerPrice,
};
use crate::Result;

/// Spot exchange capabilities consumed by the engine
///
/// Implementations normalise every payload into core types; callers never
/// see raw wire values. "Not found" is `Ok(None)`, never an error.
#[allow(async_fn_in_trait)]
pub trait ExchangeClient {
    /// Candles for `symbol`, oldest first
    async fn candles(&self, symbol: &str, interval_minutes: u32, limit: u32) -> Result<Vec<Candle>>;

    async fn average_price(&self, symbol: &str) -> Result<AveragePrice>;

    async fn balances(&self) -> Result<Vec<Balance>>;

    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<CancelOutcome>;

    async fn query_order(&self, symbol: &str, order_id: &str) -> Result<Option<OrderReport>>;

    async fn query_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderReport>>;

    /// Last price of every listed pair
    async fn ticker_prices(&self) -> Result<Vec<TickerPrice>>;

    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>>;
}
