use super::outbox;
use super::sizing::size_entry;
use crate::api::ExchangeClient;
use crate::clock::{report_offset, Clock};
use crate::config::EngineSettings;
use crate::db::{CoinFilter, CoinStore, IntentStore, TradeStore};
use crate::discovery::{CoinScreener, ScreenOptions, ScreenOutcome};
use crate::indicators::price_in_range;
use crate::models::{
    Balance, CoinState, FlatAnalysis, IntentKind, NewOrderIntent, NewTradeRecord, OrderRequest,
    OrderSide, OrderType, TradeRecord,
};
use crate::notify::{deliver, messages, Notifier};
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rust_decimal::Decimal;

/// How candidates are picked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// One open trade at a time, candidates in stored order
    Single,
    /// Up to `max_open_orders`, candidates shuffled
    Multi,
}

impl EntryMode {
    pub fn max_open_orders(&self, settings: &EngineSettings) -> u32 {
        match self {
            EntryMode::Single => 1,
            EntryMode::Multi => settings.max_open_orders,
        }
    }
}

/// Entry order placed and recorded
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedEntry {
    pub trade: TradeRecord,
    pub analysis: FlatAnalysis,
    pub current_price: Decimal,
}

/// Free amount of `asset`, zero when the account holds none
pub fn free_balance(balances: &[Balance], asset: &str) -> Decimal {
    balances
        .iter()
        .find(|b| b.asset == asset)
        .map(|b| b.free)
        .unwrap_or(Decimal::ZERO)
}

/// Places limit buys at the support of flat coins
pub struct EntryPlanner<'a, E, S, N, C> {
    exchange: &'a E,
    store: &'a S,
    notifier: &'a N,
    clock: &'a C,
    settings: &'a EngineSettings,
}

impl<'a, E, S, N, C> EntryPlanner<'a, E, S, N, C>
where
    E: ExchangeClient,
    S: CoinStore + TradeStore + IntentStore,
    N: Notifier,
    C: Clock,
{
    pub fn new(exchange: &'a E, store: &'a S, notifier: &'a N, clock: &'a C, settings: &'a EngineSettings) -> Self {
        Self {
            exchange,
            store,
            notifier,
            clock,
            settings,
        }
    }

    /// Fill free capacity with new entries
    ///
    /// Capacity reached or a short balance returns an empty list. A failing
    /// candidate is logged and skipped; only a failure to record an order the
    /// exchange already accepted aborts the pass.
    ///
    /// Pending intents are settled first so entries the exchange accepted
    /// but the store never recorded count against capacity.
    ///
    /// Not safe to run concurrently with another pass: the open count is
    /// read once and not locked.
    pub async fn try_enter(
        &self,
        mode: EntryMode,
        max_open_orders: u32,
        per_order_notional: Decimal,
    ) -> Result<Vec<PlacedEntry>> {
        let settled = outbox::resolve_pending(self.exchange, self.store).await?;
        if settled.resolved + settled.abandoned > 0 {
            tracing::info!(
                "🔁 Outbox before entry: {} recovered, {} abandoned",
                settled.resolved,
                settled.abandoned
            );
        }

        let open_count = self.store.open_trades().await?.len() as u32;
        if open_count >= max_open_orders {
            tracing::info!("⏸️  {} of {} orders open, nothing to do", open_count, max_open_orders);
            return Ok(Vec::new());
        }
        let remaining = max_open_orders - open_count;

        let balances = self.exchange.balances().await?;
        let free = free_balance(&balances, &self.settings.quote_asset);
        let required = Decimal::from(remaining) * per_order_notional;
        if free < required {
            tracing::info!(
                "💸 Free {} {} below required {} for {} orders",
                free,
                self.settings.quote_asset,
                required,
                remaining
            );
            return Ok(Vec::new());
        }

        let mut candidates = self
            .store
            .coins(CoinFilter::flat(self.settings.candidate_limit))
            .await?;
        if mode == EntryMode::Multi {
            candidates.shuffle(&mut rand::thread_rng());
            candidates.truncate(remaining as usize);
        }
        tracing::info!(
            "🎯 {} candidates for {} free slots ({:?} mode)",
            candidates.len(),
            remaining,
            mode
        );

        let options = ScreenOptions::from_settings(self.settings)
            .forced()
            .with_percentile(Some(self.settings.entry_percentile));

        let mut placed = Vec::new();
        for coin in &candidates {
            if placed.len() >= remaining as usize {
                break;
            }
            match self.enter_coin(coin, &options, per_order_notional).await {
                Ok(Some(entry)) => placed.push(entry),
                Ok(None) => {}
                Err(e) if e.is_post_action() => return Err(e),
                Err(e) => tracing::error!(symbol = %coin.symbol, "❌ Entry failed: {}", e),
            }
        }

        if mode == EntryMode::Multi && !placed.is_empty() {
            self.send_summary(&placed).await;
        }

        Ok(placed)
    }

    async fn enter_coin(
        &self,
        coin: &CoinState,
        options: &ScreenOptions,
        per_order_notional: Decimal,
    ) -> Result<Option<PlacedEntry>> {
        let screener = CoinScreener::new(self.exchange, self.store, self.clock);
        let analysis = match screener.check_and_update(coin, options).await? {
            ScreenOutcome::Checked(analysis) if analysis.is_flat => analysis,
            ScreenOutcome::Checked(_) => {
                tracing::info!(symbol = %coin.symbol, "No longer flat, skipping");
                return Ok(None);
            }
            ScreenOutcome::Skipped(reason) => {
                tracing::info!(symbol = %coin.symbol, "Skipped: {}", reason);
                return Ok(None);
            }
        };

        let current = self.exchange.average_price(&coin.symbol).await?;
        if !price_in_range(current.price, analysis.support, analysis.resistance) {
            tracing::info!(
                symbol = %coin.symbol,
                "Price {} outside {} .. {}, skipping",
                current.price,
                analysis.support,
                analysis.resistance
            );
            return Ok(None);
        }

        let quantity = match size_entry(per_order_notional, analysis.support, coin.base_size_precision) {
            Ok(quantity) => quantity,
            Err(Error::InvalidQuantity { quantity }) => {
                tracing::warn!(
                    symbol = %coin.symbol,
                    "Quantity {} not tradable at {} with step {}, skipping",
                    quantity,
                    analysis.support,
                    coin.base_size_precision
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let open_balance = analysis.support * quantity;
        let now = self.clock.now();

        let intent = self
            .store
            .record_intent(
                &NewOrderIntent {
                    kind: IntentKind::EntryBuy,
                    symbol: coin.symbol.clone(),
                    trade_id: None,
                    price: Some(analysis.support),
                    quantity,
                    up_level: Some(analysis.resistance),
                    down_level: Some(analysis.support),
                    open_balance: Some(open_balance),
                },
                now,
            )
            .await?;

        let request = OrderRequest {
            symbol: coin.symbol.clone(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity,
            price: Some(analysis.support),
            client_order_id: intent.client_order_id(),
        };
        let order = outbox::submit(self.exchange, self.store, &intent, &request).await?;

        let action = format!("limit buy {} on {}", order.order_id, coin.symbol);
        let trade = self
            .store
            .insert_trade(&NewTradeRecord {
                open_date: now,
                open_balance,
                symbol: coin.symbol.clone(),
                buy_price: analysis.support,
                amount: quantity,
                buy_order_id: order.order_id.clone(),
                up_level: analysis.resistance,
                down_level: analysis.support,
            })
            .await
            .map_err(|e| Error::post_action(action.clone(), e))?;
        self.store
            .fulfill_intent(intent.id, &order.order_id)
            .await
            .map_err(|e| Error::post_action(action, e))?;

        tracing::info!(
            symbol = %coin.symbol,
            trade_id = trade.id,
            "🟢 Buy {} at {} (target {})",
            quantity,
            analysis.support,
            analysis.resistance
        );

        let offset = report_offset(self.settings.report_utc_offset_hours);
        deliver(
            self.notifier,
            &messages::entry_placed(&trade, &analysis, current.price, offset),
        )
        .await;

        Ok(Some(PlacedEntry {
            trade,
            analysis,
            current_price: current.price,
        }))
    }

    async fn send_summary(&self, placed: &[PlacedEntry]) {
        let committed: Decimal = placed.iter().map(|p| p.trade.open_balance).sum();
        let free = match self.exchange.balances().await {
            Ok(balances) => Some(free_balance(&balances, &self.settings.quote_asset)),
            Err(e) => {
                tracing::warn!("Could not read balance for summary: {}", e);
                None
            }
        };

        let message = messages::entry_summary(
            placed.len(),
            committed,
            free,
            &self.settings.quote_asset,
            self.clock.now(),
            report_offset(self.settings.report_utc_offset_hours),
        );
        deliver(self.notifier, &message).await;
    }
}
