use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candle as delivered by the exchange, times in epoch milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Balance snapshot for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Range statistics of a candle window and the flat verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatAnalysis {
    pub is_flat: bool,
    pub support: Decimal,    // lowest low
    pub resistance: Decimal, // highest high
    pub range_abs: Decimal,
    pub range_percent: Decimal,
    pub avg_price: Decimal, // mean close
    pub volatility_percent: Decimal,
    pub max_drawdown_percent: Decimal,
    pub max_rise_percent: Decimal,
}

/// Persisted state of a tradable pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinState {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub trading_allowed: bool,
    pub is_palisade: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub support: Decimal,
    pub resistance: Decimal,
    pub range_abs: Decimal,
    pub range_percent: Decimal,
    pub avg_price: Decimal,
    pub volatility_percent: Decimal,
    pub max_drawdown_percent: Decimal,
    pub max_rise_percent: Decimal,
    pub base_size_precision: Decimal, // lot step, zero means whole units
}

impl CoinState {
    /// Freshly discovered pair: never checked, not flat, no levels
    pub fn discovered(info: &SymbolInfo) -> Self {
        Self {
            symbol: info.symbol.clone(),
            base_asset: info.base_asset.clone(),
            quote_asset: info.quote_asset.clone(),
            trading_allowed: info.trading_allowed,
            is_palisade: false,
            last_check: None,
            support: Decimal::ZERO,
            resistance: Decimal::ZERO,
            range_abs: Decimal::ZERO,
            range_percent: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            volatility_percent: Decimal::ZERO,
            max_drawdown_percent: Decimal::ZERO,
            max_rise_percent: Decimal::ZERO,
            base_size_precision: info.base_size_precision,
        }
    }

    /// Copy analysis fields into the persisted levels
    pub fn apply_levels(&mut self, analysis: &FlatAnalysis) {
        self.support = analysis.support;
        self.resistance = analysis.resistance;
        self.range_abs = analysis.range_abs;
        self.range_percent = analysis.range_percent;
        self.avg_price = analysis.avg_price;
        self.volatility_percent = analysis.volatility_percent;
        self.max_drawdown_percent = analysis.max_drawdown_percent;
        self.max_rise_percent = analysis.max_rise_percent;
    }
}

/// Lifecycle record of one buy then sell cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: i64,
    pub open_date: DateTime<Utc>,
    pub deal_date: Option<DateTime<Utc>>,
    pub close_date: Option<DateTime<Utc>>,
    pub cancel_date: Option<DateTime<Utc>>,
    pub open_balance: Decimal,
    pub close_balance: Option<Decimal>,
    pub symbol: String,
    pub buy_price: Decimal,
    pub sell_price: Option<Decimal>,
    pub amount: Decimal,
    pub buy_order_id: String,
    pub sell_order_id: Option<String>,
    pub up_level: Decimal,
    pub down_level: Decimal,
}

impl TradeRecord {
    pub fn is_open(&self) -> bool {
        self.cancel_date.is_none() && self.close_date.is_none()
    }

    /// Time since the entry order was placed
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.open_date
    }
}

/// Fields known when an entry order is acknowledged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTradeRecord {
    pub open_date: DateTime<Utc>,
    pub open_balance: Decimal,
    pub symbol: String,
    pub buy_price: Decimal,
    pub amount: Decimal,
    pub buy_order_id: String,
    pub up_level: Decimal,
    pub down_level: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

/// Exchange-reported order status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    PartiallyCanceled,
    Canceled,
    Rejected,
    Expired,
    Other(String),
}

impl OrderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "PARTIALLY_CANCELED" => OrderStatus::PartiallyCanceled,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            other => OrderStatus::Other(other.to_string()),
        }
    }

    /// Order ended on the exchange without a fill
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::PartiallyCanceled => "PARTIALLY_CANCELED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::Other(raw) => raw.as_str(),
        };
        f.write_str(text)
    }
}

/// Order to submit
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>, // None for market orders
    pub client_order_id: String,
}

/// Exchange acknowledgement of a placed order
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: String,
    pub symbol: String,
    pub client_order_id: Option<String>,
}

/// Exchange view of an existing order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReport {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: String,
    pub status: OrderStatus,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub cumulative_quote_qty: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelError {
    pub order_id: String,
    pub code: i64,
    pub message: String,
}

/// Result of a cancel request
#[derive(Debug, Clone, PartialEq)]
pub struct CancelOutcome {
    pub success: bool,
    pub errors: Vec<CancelError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AveragePrice {
    pub price: Decimal,
    pub window_minutes: u32,
}

/// Trading rules for one pair
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub trading_allowed: bool,
    pub base_size_precision: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// What an outbox intent stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    EntryBuy,
    ExitLimit,
    ExitMarket,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::EntryBuy => "entry_buy",
            IntentKind::ExitLimit => "exit_limit",
            IntentKind::ExitMarket => "exit_market",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "entry_buy" => Some(IntentKind::EntryBuy),
            "exit_limit" => Some(IntentKind::ExitLimit),
            "exit_market" => Some(IntentKind::ExitMarket),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentStatus {
    Pending,
    Fulfilled,
    Abandoned,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Fulfilled => "fulfilled",
            IntentStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(IntentStatus::Pending),
            "fulfilled" => Some(IntentStatus::Fulfilled),
            "abandoned" => Some(IntentStatus::Abandoned),
            _ => None,
        }
    }
}

/// Order the engine is about to send, written before the exchange call
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderIntent {
    pub kind: IntentKind,
    pub symbol: String,
    pub trade_id: Option<i64>, // set for exits
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub up_level: Option<Decimal>,
    pub down_level: Option<Decimal>,
    pub open_balance: Option<Decimal>,
}

/// Durable outbox entry
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub id: i64,
    pub kind: IntentKind,
    pub status: IntentStatus,
    pub symbol: String,
    pub trade_id: Option<i64>,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub up_level: Option<Decimal>,
    pub down_level: Option<Decimal>,
    pub open_balance: Option<Decimal>,
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    /// Client order id sent with the order, unique per intent
    pub fn client_order_id(&self) -> String {
        format!("palisade_{}_{}", self.kind.as_str(), self.id)
    }
}
