// In-memory doubles shared by the integration tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use palisade::config::EngineSettings;
use palisade::db::{CoinFilter, CoinStore, IntentStore, TradeStore};
use palisade::notify::Notifier;
use palisade::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Engine settings with every delay disabled
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        settlement_delay_secs: 0,
        screen_delay_secs: 0,
        sync_delay_secs: 0,
        ..EngineSettings::default()
    }
}

fn quarter_candle(open_time: DateTime<Utc>, low: Decimal, high: Decimal, close: Decimal) -> Candle {
    let open_ms = open_time.timestamp_millis();
    Candle {
        open_time: open_ms,
        close_time: open_ms + 15 * 60 * 1000 - 1,
        open: close,
        high,
        low,
        close,
        volume: dec!(500),
    }
}

/// 16 identical quarter-hour candles ending at `now`: lows 1.00, highs 1.02
pub fn flat_candles(now: DateTime<Utc>) -> Vec<Candle> {
    (0..16)
        .map(|i| {
            let open_time = now - Duration::minutes(15 * (15 - i));
            quarter_candle(open_time, dec!(1.00), dec!(1.02), dec!(1.01))
        })
        .collect()
}

/// 16 candles climbing from 1.0 to 2.5
pub fn trending_candles(now: DateTime<Utc>) -> Vec<Candle> {
    (0..16)
        .map(|i| {
            let open_time = now - Duration::minutes(15 * (15 - i));
            let close = dec!(1.0) + Decimal::from(i) * dec!(0.1);
            quarter_candle(open_time, close - dec!(0.01), close + dec!(0.01), close)
        })
        .collect()
}

pub fn coin(symbol: &str) -> CoinState {
    CoinState::discovered(&SymbolInfo {
        symbol: symbol.to_string(),
        base_asset: symbol.trim_end_matches("USDT").to_string(),
        quote_asset: "USDT".to_string(),
        trading_allowed: true,
        base_size_precision: dec!(0.01),
    })
}

/// Coin already flagged flat with levels 1.00 .. 1.02
pub fn flat_coin(symbol: &str, last_check: DateTime<Utc>) -> CoinState {
    CoinState {
        is_palisade: true,
        last_check: Some(last_check),
        support: dec!(1.00),
        resistance: dec!(1.02),
        range_abs: dec!(0.02),
        avg_price: dec!(1.01),
        ..coin(symbol)
    }
}

pub fn usdt(free: Decimal) -> Vec<Balance> {
    vec![Balance {
        asset: "USDT".to_string(),
        free,
        locked: Decimal::ZERO,
    }]
}

/// Entry of 2 units bought at 1.00 with target 1.02
pub fn new_trade(symbol: &str, open_date: DateTime<Utc>, buy_order_id: &str) -> NewTradeRecord {
    NewTradeRecord {
        open_date,
        open_balance: dec!(2.00),
        symbol: symbol.to_string(),
        buy_price: dec!(1.00),
        amount: dec!(2),
        buy_order_id: buy_order_id.to_string(),
        up_level: dec!(1.02),
        down_level: dec!(1.00),
    }
}

pub fn order_report(symbol: &str, order_id: &str, side: OrderSide, order_type: OrderType, status: OrderStatus) -> OrderReport {
    OrderReport {
        order_id: order_id.to_string(),
        client_order_id: None,
        symbol: symbol.to_string(),
        side,
        order_type: order_type.as_str().to_string(),
        status,
        price: dec!(1.00),
        orig_qty: dec!(2),
        executed_qty: Decimal::ZERO,
        cumulative_quote_qty: Decimal::ZERO,
    }
}

// ============================================================================
// Exchange
// ============================================================================

/// Scripted exchange recording every order it receives
#[derive(Default)]
pub struct MockExchange {
    pub candles: Mutex<HashMap<String, Vec<Candle>>>,
    pub invalid_symbols: Mutex<HashSet<String>>,
    pub avg_prices: Mutex<HashMap<String, Decimal>>,
    pub balances: Mutex<Vec<Balance>>,
    pub orders: Mutex<HashMap<String, OrderReport>>,
    pub placed: Mutex<Vec<OrderRequest>>,
    pub cancelled: Mutex<Vec<String>>,
    pub refuse_cancel: AtomicBool,
    pub tickers: Mutex<Vec<TickerPrice>>,
    pub symbols: Mutex<HashMap<String, SymbolInfo>>,
    pub candle_calls: Mutex<Vec<String>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_candles(&self, symbol: &str, candles: Vec<Candle>) {
        self.candles.lock().unwrap().insert(symbol.to_string(), candles);
    }

    pub fn set_invalid(&self, symbol: &str) {
        self.invalid_symbols.lock().unwrap().insert(symbol.to_string());
    }

    pub fn set_avg_price(&self, symbol: &str, price: Decimal) {
        self.avg_prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_balances(&self, balances: Vec<Balance>) {
        *self.balances.lock().unwrap() = balances;
    }

    pub fn set_order(&self, report: OrderReport) {
        self.orders.lock().unwrap().insert(report.order_id.clone(), report);
    }

    pub fn list_symbol(&self, info: SymbolInfo) {
        self.tickers.lock().unwrap().push(TickerPrice {
            symbol: info.symbol.clone(),
            price: dec!(1),
        });
        self.symbols.lock().unwrap().insert(info.symbol.clone(), info);
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl ExchangeClient for MockExchange {
    async fn candles(&self, symbol: &str, _interval_minutes: u32, _limit: u32) -> palisade::Result<Vec<Candle>> {
        self.candle_calls.lock().unwrap().push(symbol.to_string());
        if self.invalid_symbols.lock().unwrap().contains(symbol) {
            return Err(Error::Exchange {
                code: -1121,
                message: "Invalid symbol.".to_string(),
            });
        }
        Ok(self.candles.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn average_price(&self, symbol: &str) -> palisade::Result<AveragePrice> {
        let price = self.avg_prices.lock().unwrap().get(symbol).copied();
        price
            .map(|price| AveragePrice {
                price,
                window_minutes: 5,
            })
            .ok_or_else(|| Error::InvalidSymbol(symbol.to_string()))
    }

    async fn balances(&self) -> palisade::Result<Vec<Balance>> {
        Ok(self.balances.lock().unwrap().clone())
    }

    async fn place_order(&self, request: &OrderRequest) -> palisade::Result<PlacedOrder> {
        let mut placed = self.placed.lock().unwrap();
        placed.push(request.clone());
        let order_id = format!("ORD{}", placed.len());

        self.orders.lock().unwrap().insert(
            order_id.clone(),
            OrderReport {
                order_id: order_id.clone(),
                client_order_id: Some(request.client_order_id.clone()),
                symbol: request.symbol.clone(),
                side: request.side,
                order_type: request.order_type.as_str().to_string(),
                status: OrderStatus::New,
                price: request.price.unwrap_or_default(),
                orig_qty: request.quantity,
                executed_qty: Decimal::ZERO,
                cumulative_quote_qty: Decimal::ZERO,
            },
        );

        Ok(PlacedOrder {
            order_id,
            symbol: request.symbol.clone(),
            client_order_id: Some(request.client_order_id.clone()),
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> palisade::Result<CancelOutcome> {
        if self.refuse_cancel.load(Ordering::SeqCst) {
            return Ok(CancelOutcome {
                success: false,
                errors: vec![CancelError {
                    order_id: order_id.to_string(),
                    code: -2011,
                    message: "Unknown order".to_string(),
                }],
            });
        }
        self.cancelled.lock().unwrap().push(order_id.to_string());
        if let Some(order) = self.orders.lock().unwrap().get_mut(order_id) {
            order.status = OrderStatus::Canceled;
        }
        Ok(CancelOutcome {
            success: true,
            errors: Vec::new(),
        })
    }

    async fn query_order(&self, _symbol: &str, order_id: &str) -> palisade::Result<Option<OrderReport>> {
        Ok(self.orders.lock().unwrap().get(order_id).cloned())
    }

    async fn query_order_by_client_id(
        &self,
        _symbol: &str,
        client_order_id: &str,
    ) -> palisade::Result<Option<OrderReport>> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .values()
            .find(|o| o.client_order_id.as_deref() == Some(client_order_id))
            .cloned())
    }

    async fn ticker_prices(&self) -> palisade::Result<Vec<TickerPrice>> {
        Ok(self.tickers.lock().unwrap().clone())
    }

    async fn symbol_info(&self, symbol: &str) -> palisade::Result<Option<SymbolInfo>> {
        Ok(self.symbols.lock().unwrap().get(symbol).cloned())
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    pub coins: Mutex<BTreeMap<String, CoinState>>,
    pub trades: Mutex<Vec<TradeRecord>>,
    pub intents: Mutex<Vec<OrderIntent>>,
    pub fail_trade_insert: AtomicBool,
    pub fail_exit_update: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_coin(&self, coin: CoinState) {
        self.coins.lock().unwrap().insert(coin.symbol.clone(), coin);
    }

    pub fn stored_coin(&self, symbol: &str) -> CoinState {
        self.coins.lock().unwrap().get(symbol).cloned().expect("coin stored")
    }

    pub fn trade(&self, id: i64) -> TradeRecord {
        self.trades
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .expect("trade stored")
    }

    pub fn all_trades(&self) -> Vec<TradeRecord> {
        self.trades.lock().unwrap().clone()
    }

    pub fn all_intents(&self) -> Vec<OrderIntent> {
        self.intents.lock().unwrap().clone()
    }

    /// Insert a trade directly, bypassing the failure switch
    pub fn seed_trade(&self, trade: NewTradeRecord) -> TradeRecord {
        let mut trades = self.trades.lock().unwrap();
        let record = TradeRecord {
            id: trades.len() as i64 + 1,
            open_date: trade.open_date,
            deal_date: None,
            close_date: None,
            cancel_date: None,
            open_balance: trade.open_balance,
            close_balance: None,
            symbol: trade.symbol,
            buy_price: trade.buy_price,
            sell_price: None,
            amount: trade.amount,
            buy_order_id: trade.buy_order_id,
            sell_order_id: None,
            up_level: trade.up_level,
            down_level: trade.down_level,
        };
        trades.push(record.clone());
        record
    }

    fn with_trade(&self, id: i64, f: impl FnOnce(&mut TradeRecord)) -> palisade::Result<()> {
        let mut trades = self.trades.lock().unwrap();
        match trades.iter_mut().find(|t| t.id == id) {
            Some(trade) => {
                f(trade);
                Ok(())
            }
            None => Err(Error::Database(sqlx::Error::RowNotFound)),
        }
    }

    fn set_intent_status(&self, id: i64, status: IntentStatus, order_id: Option<&str>) {
        let mut intents = self.intents.lock().unwrap();
        if let Some(intent) = intents.iter_mut().find(|i| i.id == id) {
            intent.status = status;
            if let Some(order_id) = order_id {
                intent.order_id = Some(order_id.to_string());
            }
        }
    }
}

impl CoinStore for MemoryStore {
    async fn coin(&self, symbol: &str) -> palisade::Result<Option<CoinState>> {
        Ok(self.coins.lock().unwrap().get(symbol).cloned())
    }

    async fn coins(&self, filter: CoinFilter) -> palisade::Result<Vec<CoinState>> {
        Ok(self
            .coins
            .lock()
            .unwrap()
            .values()
            .filter(|c| !filter.trading_allowed || c.trading_allowed)
            .filter(|c| !filter.palisade_only || c.is_palisade)
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_coin(&self, coin: &CoinState) -> palisade::Result<bool> {
        let mut coins = self.coins.lock().unwrap();
        if coins.contains_key(&coin.symbol) {
            return Ok(false);
        }
        coins.insert(coin.symbol.clone(), coin.clone());
        Ok(true)
    }

    async fn update_flat_flag(&self, symbol: &str, is_flat: bool, checked_at: DateTime<Utc>) -> palisade::Result<()> {
        if let Some(coin) = self.coins.lock().unwrap().get_mut(symbol) {
            coin.is_palisade = is_flat;
            coin.last_check = Some(checked_at);
        }
        Ok(())
    }

    async fn update_levels(&self, symbol: &str, analysis: &FlatAnalysis) -> palisade::Result<()> {
        if let Some(coin) = self.coins.lock().unwrap().get_mut(symbol) {
            coin.apply_levels(analysis);
        }
        Ok(())
    }
}

impl TradeStore for MemoryStore {
    async fn open_trades(&self) -> palisade::Result<Vec<TradeRecord>> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_open())
            .cloned()
            .collect())
    }

    async fn insert_trade(&self, trade: &NewTradeRecord) -> palisade::Result<TradeRecord> {
        if self.fail_trade_insert.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.seed_trade(trade.clone()))
    }

    async fn mark_cancelled(&self, id: i64, at: DateTime<Utc>) -> palisade::Result<()> {
        self.with_trade(id, |t| t.cancel_date = Some(at))
    }

    async fn resize_entry(&self, id: i64, amount: Decimal, open_balance: Decimal) -> palisade::Result<()> {
        self.with_trade(id, |t| {
            t.amount = amount;
            t.open_balance = open_balance;
        })
    }

    async fn mark_exit_placed(
        &self,
        id: i64,
        sell_order_id: &str,
        deal_date: Option<DateTime<Utc>>,
    ) -> palisade::Result<()> {
        if self.fail_exit_update.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        self.with_trade(id, |t| {
            t.sell_order_id = Some(sell_order_id.to_string());
            if deal_date.is_some() {
                t.deal_date = deal_date;
            }
        })
    }

    async fn mark_closed(
        &self,
        id: i64,
        at: DateTime<Utc>,
        close_balance: Decimal,
        sell_price: Decimal,
    ) -> palisade::Result<()> {
        self.with_trade(id, |t| {
            t.close_date = Some(at);
            t.close_balance = Some(close_balance);
            t.sell_price = Some(sell_price);
        })
    }
}

impl IntentStore for MemoryStore {
    async fn record_intent(&self, intent: &NewOrderIntent, at: DateTime<Utc>) -> palisade::Result<OrderIntent> {
        let mut intents = self.intents.lock().unwrap();
        let record = OrderIntent {
            id: intents.len() as i64 + 1,
            kind: intent.kind,
            status: IntentStatus::Pending,
            symbol: intent.symbol.clone(),
            trade_id: intent.trade_id,
            price: intent.price,
            quantity: intent.quantity,
            up_level: intent.up_level,
            down_level: intent.down_level,
            open_balance: intent.open_balance,
            order_id: None,
            created_at: at,
        };
        intents.push(record.clone());
        Ok(record)
    }

    async fn fulfill_intent(&self, id: i64, order_id: &str) -> palisade::Result<()> {
        self.set_intent_status(id, IntentStatus::Fulfilled, Some(order_id));
        Ok(())
    }

    async fn abandon_intent(&self, id: i64) -> palisade::Result<()> {
        self.set_intent_status(id, IntentStatus::Abandoned, None);
        Ok(())
    }

    async fn pending_intents(&self) -> palisade::Result<Vec<OrderIntent>> {
        Ok(self
            .intents
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.status == IntentStatus::Pending)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Notifier
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> palisade::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
