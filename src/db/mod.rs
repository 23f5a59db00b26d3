// Persistence capabilities and the Postgres implementation

pub mod postgres;

pub use postgres::PostgresStore;

use crate::models::{CoinState, FlatAnalysis, NewOrderIntent, NewTradeRecord, OrderIntent, TradeRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Coin selection for screening and entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinFilter {
    pub trading_allowed: bool,
    pub palisade_only: bool,
    pub limit: u32,
    pub offset: u32,
}

impl CoinFilter {
    /// Trading-allowed coins currently flagged flat
    pub fn flat(limit: u32) -> Self {
        Self {
            trading_allowed: true,
            palisade_only: true,
            limit,
            offset: 0,
        }
    }

    /// Every trading-allowed coin
    pub fn tradable(limit: u32) -> Self {
        Self {
            trading_allowed: true,
            palisade_only: false,
            limit,
            offset: 0,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait CoinStore {
    async fn coin(&self, symbol: &str) -> Result<Option<CoinState>>;

    /// Coins matching `filter`, ordered by symbol
    async fn coins(&self, filter: CoinFilter) -> Result<Vec<CoinState>>;

    /// Insert unless the symbol exists; true when a row was added
    async fn insert_coin(&self, coin: &CoinState) -> Result<bool>;

    /// Set the flat flag and the last check time
    async fn update_flat_flag(&self, symbol: &str, is_flat: bool, checked_at: DateTime<Utc>) -> Result<()>;

    async fn update_levels(&self, symbol: &str, analysis: &FlatAnalysis) -> Result<()>;
}

#[allow(async_fn_in_trait)]
pub trait TradeStore {
    /// Records with neither cancel nor close date, oldest first
    async fn open_trades(&self) -> Result<Vec<TradeRecord>>;

    async fn insert_trade(&self, trade: &NewTradeRecord) -> Result<TradeRecord>;

    async fn mark_cancelled(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Shrink an entry to the part of the buy order that executed
    async fn resize_entry(&self, id: i64, amount: Decimal, open_balance: Decimal) -> Result<()>;

    /// Record the active exit order; a `None` deal date keeps the stored one
    async fn mark_exit_placed(&self, id: i64, sell_order_id: &str, deal_date: Option<DateTime<Utc>>) -> Result<()>;

    async fn mark_closed(&self, id: i64, at: DateTime<Utc>, close_balance: Decimal, sell_price: Decimal) -> Result<()>;
}

/// Durable outbox of orders about to be sent
#[allow(async_fn_in_trait)]
pub trait IntentStore {
    async fn record_intent(&self, intent: &NewOrderIntent, at: DateTime<Utc>) -> Result<OrderIntent>;

    async fn fulfill_intent(&self, id: i64, order_id: &str) -> Result<()>;

    async fn abandon_intent(&self, id: i64) -> Result<()>;

    async fn pending_intents(&self) -> Result<Vec<OrderIntent>>;
}
