use super::outbox::{self, OutboxReport};
use crate::api::ExchangeClient;
use crate::clock::{report_offset, Clock};
use crate::config::EngineSettings;
use crate::db::{IntentStore, TradeStore};
use crate::models::{
    IntentKind, NewOrderIntent, OrderReport, OrderRequest, OrderSide, OrderStatus, OrderType,
    TradeRecord,
};
use crate::notify::{deliver, messages, Notifier};
use crate::{Error, Result};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use rust_decimal::Decimal;
use std::fmt;

/// Why a position is being liquidated at market
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Timeout,
    AboveRange,
    BelowRange,
    ExitOrderTerminated(OrderStatus),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Timeout => write!(f, "position held past the order timeout"),
            ExitReason::AboveRange => write!(f, "price moved above the range"),
            ExitReason::BelowRange => write!(f, "price moved below the range"),
            ExitReason::ExitOrderTerminated(status) => {
                write!(f, "exit order terminated by exchange ({status})")
            }
        }
    }
}

/// What one pass did to a trade
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Nothing to do yet
    Waiting,
    EntryTimedOut,
    EntryCanceledByExchange(OrderStatus),
    /// Tracked order unknown to the exchange, trade cancelled
    OrderMissing,
    ExitPlaced { sell_order_id: String },
    ForcedExit { reason: ExitReason, market_order_id: String },
    Closed { sell_price: Decimal, close_balance: Decimal, profit: Decimal },
    /// Status reported to the operator, trade left open
    NeedsAttention(OrderStatus),
    /// Exchange refused the cancel; re-examined next pass
    CancelRejected,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub outbox: OutboxReport,
    pub transitions: Vec<(i64, Transition)>,
}

/// Drives open trades through entry fill, exit placement and close
///
/// ```text
/// ENTRY_PENDING --FILLED / partial at timeout--> EXIT_PLACED --FILLED--> closed
///      |  timeout / dead           |  timeout / out of range / dead
///      v                           v
///   cancelled              EXIT_FORCED_MARKET --FILLED--> closed
/// ```
pub struct Reconciler<'a, E, S, N, C> {
    exchange: &'a E,
    store: &'a S,
    notifier: &'a N,
    clock: &'a C,
    order_timeout: Duration,
    settlement_delay: std::time::Duration,
    offset: FixedOffset,
}

impl<'a, E, S, N, C> Reconciler<'a, E, S, N, C>
where
    E: ExchangeClient,
    S: TradeStore + IntentStore,
    N: Notifier,
    C: Clock,
{
    pub fn new(exchange: &'a E, store: &'a S, notifier: &'a N, clock: &'a C, settings: &EngineSettings) -> Self {
        Self {
            exchange,
            store,
            notifier,
            clock,
            order_timeout: Duration::minutes(settings.order_timeout_minutes),
            settlement_delay: std::time::Duration::from_secs(settings.settlement_delay_secs),
            offset: report_offset(settings.report_utc_offset_hours),
        }
    }

    /// Settle pending intents, then advance every open trade once
    ///
    /// The first error aborts the pass.
    pub async fn run(&self) -> Result<ReconcileReport> {
        let outbox = outbox::resolve_pending(self.exchange, self.store).await?;
        if outbox.resolved + outbox.abandoned > 0 {
            tracing::info!(
                "🔁 Outbox: {} recovered, {} abandoned",
                outbox.resolved,
                outbox.abandoned
            );
        }

        let trades = self.store.open_trades().await?;
        tracing::info!("🔎 Reconciling {} open trades", trades.len());

        let mut transitions = Vec::with_capacity(trades.len());
        for trade in &trades {
            let transition = self.reconcile_trade(trade).await?;
            tracing::info!(symbol = %trade.symbol, trade_id = trade.id, "{:?}", transition);
            transitions.push((trade.id, transition));
        }

        Ok(ReconcileReport {
            outbox,
            transitions,
        })
    }

    /// Advance one open trade
    ///
    /// The sell order is tracked once recorded, the buy order before that.
    pub async fn reconcile_trade(&self, trade: &TradeRecord) -> Result<Transition> {
        let now = self.clock.now();
        let (order_id, exit_phase) = match &trade.sell_order_id {
            Some(sell_id) => (sell_id.as_str(), true),
            None => (trade.buy_order_id.as_str(), false),
        };

        let Some(report) = self.exchange.query_order(&trade.symbol, order_id).await? else {
            tracing::warn!(symbol = %trade.symbol, "Order {} not found, cancelling trade {}", order_id, trade.id);
            self.store.mark_cancelled(trade.id, now).await?;
            deliver(self.notifier, &messages::order_missing(trade, now, self.offset)).await;
            return Ok(Transition::OrderMissing);
        };

        if exit_phase {
            self.on_exit_order(trade, &report, now).await
        } else {
            self.on_entry_order(trade, &report, now).await
        }
    }

    async fn on_entry_order(&self, trade: &TradeRecord, report: &OrderReport, now: DateTime<Utc>) -> Result<Transition> {
        match &report.status {
            OrderStatus::New => {
                if trade.age(now) <= self.order_timeout {
                    return Ok(Transition::Waiting);
                }

                let outcome = self
                    .exchange
                    .cancel_order(&trade.symbol, &trade.buy_order_id)
                    .await?;
                if !outcome.success {
                    tracing::warn!(symbol = %trade.symbol, "Cancel of {} refused: {:?}", trade.buy_order_id, outcome.errors);
                    return Ok(Transition::CancelRejected);
                }

                self.store
                    .mark_cancelled(trade.id, now)
                    .await
                    .map_err(|e| Error::post_action(format!("cancel of buy order {}", trade.buy_order_id), e))?;

                let timeout_minutes = self.order_timeout.num_minutes();
                deliver(
                    self.notifier,
                    &messages::entry_timed_out(trade, timeout_minutes, now, self.offset),
                )
                .await;
                Ok(Transition::EntryTimedOut)
            }
            OrderStatus::Filled => self.place_exit(trade, now).await,
            status if status.is_dead() => {
                self.store.mark_cancelled(trade.id, now).await?;
                deliver(
                    self.notifier,
                    &messages::entry_canceled_by_exchange(trade, status, now, self.offset),
                )
                .await;
                Ok(Transition::EntryCanceledByExchange(status.clone()))
            }
            OrderStatus::PartiallyFilled => {
                if trade.age(now) <= self.order_timeout {
                    return Ok(Transition::Waiting);
                }
                self.cut_entry_to_fill(trade, report, now).await
            }
            other => self.needs_attention(trade, report, other, now).await,
        }
    }

    /// Cancel a stale, partially filled buy and exit with what executed
    async fn cut_entry_to_fill(&self, trade: &TradeRecord, report: &OrderReport, now: DateTime<Utc>) -> Result<Transition> {
        let outcome = self
            .exchange
            .cancel_order(&trade.symbol, &trade.buy_order_id)
            .await?;
        if !outcome.success {
            tracing::warn!(symbol = %trade.symbol, "Cancel of {} refused: {:?}", trade.buy_order_id, outcome.errors);
            return Ok(Transition::CancelRejected);
        }
        let settled = self.settled_report(trade, report).await?;
        let executed = settled.executed_qty.min(trade.amount);
        let timeout_minutes = self.order_timeout.num_minutes();

        if executed <= Decimal::ZERO {
            self.store
                .mark_cancelled(trade.id, now)
                .await
                .map_err(|e| Error::post_action(format!("cancel of buy order {}", trade.buy_order_id), e))?;
            deliver(
                self.notifier,
                &messages::entry_timed_out(trade, timeout_minutes, now, self.offset),
            )
            .await;
            return Ok(Transition::EntryTimedOut);
        }

        if executed == trade.amount {
            return self.place_exit(trade, now).await;
        }

        let open_balance = trade.buy_price * executed;
        self.store
            .resize_entry(trade.id, executed, open_balance)
            .await
            .map_err(|e| Error::post_action(format!("cancel of buy order {}", trade.buy_order_id), e))?;
        tracing::info!(
            symbol = %trade.symbol,
            trade_id = trade.id,
            "✂️ Entry cut to {} of {}",
            executed,
            trade.amount
        );

        let cut = TradeRecord {
            amount: executed,
            open_balance,
            ..trade.clone()
        };
        deliver(
            self.notifier,
            &messages::entry_cut_to_fill(&cut, trade.amount, timeout_minutes, now, self.offset),
        )
        .await;
        self.place_exit(&cut, now).await
    }

    /// Order state after a cancel, once the settlement delay has passed
    async fn settled_report(&self, trade: &TradeRecord, report: &OrderReport) -> Result<OrderReport> {
        if !self.settlement_delay.is_zero() {
            tokio::time::sleep(self.settlement_delay).await;
        }
        let settled = self
            .exchange
            .query_order(&trade.symbol, &report.order_id)
            .await?;
        Ok(settled.unwrap_or_else(|| report.clone()))
    }

    async fn on_exit_order(&self, trade: &TradeRecord, report: &OrderReport, now: DateTime<Utc>) -> Result<Transition> {
        match &report.status {
            OrderStatus::New | OrderStatus::PartiallyFilled => {
                let current = self.exchange.average_price(&trade.symbol).await?;

                let reason = if trade.age(now) > self.order_timeout {
                    ExitReason::Timeout
                } else if current.price < trade.down_level {
                    ExitReason::BelowRange
                } else if current.price > trade.up_level {
                    ExitReason::AboveRange
                } else {
                    return Ok(Transition::Waiting);
                };

                self.force_exit(trade, report, reason, Some(current.price), true, now)
                    .await
            }
            OrderStatus::Filled => self.close(trade, report, now).await,
            // A dead market exit is not retried automatically
            status if status.is_dead() && report.order_type != OrderType::Market.as_str() => {
                let reason = ExitReason::ExitOrderTerminated(status.clone());
                self.force_exit(trade, report, reason, None, false, now)
                    .await
            }
            other => self.needs_attention(trade, report, other, now).await,
        }
    }

    /// Limit sell of the full amount at the upper level
    async fn place_exit(&self, trade: &TradeRecord, now: DateTime<Utc>) -> Result<Transition> {
        let intent = self
            .store
            .record_intent(
                &NewOrderIntent {
                    kind: IntentKind::ExitLimit,
                    symbol: trade.symbol.clone(),
                    trade_id: Some(trade.id),
                    price: Some(trade.up_level),
                    quantity: trade.amount,
                    up_level: None,
                    down_level: None,
                    open_balance: None,
                },
                now,
            )
            .await?;

        let request = OrderRequest {
            symbol: trade.symbol.clone(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            quantity: trade.amount,
            price: Some(trade.up_level),
            client_order_id: intent.client_order_id(),
        };
        let order = outbox::submit(self.exchange, self.store, &intent, &request).await?;

        let action = format!("limit sell {} on {}", order.order_id, trade.symbol);
        self.store
            .mark_exit_placed(trade.id, &order.order_id, Some(now))
            .await
            .map_err(|e| Error::post_action(action.clone(), e))?;
        self.store
            .fulfill_intent(intent.id, &order.order_id)
            .await
            .map_err(|e| Error::post_action(action, e))?;

        deliver(
            self.notifier,
            &messages::exit_placed(trade, &order.order_id, now, self.offset),
        )
        .await;
        Ok(Transition::ExitPlaced {
            sell_order_id: order.order_id,
        })
    }

    /// Market sell of whatever the limit exit left unsold
    ///
    /// The live exit is cancelled first when `cancel_first` is set.
    async fn force_exit(
        &self,
        trade: &TradeRecord,
        exit: &OrderReport,
        reason: ExitReason,
        current_price: Option<Decimal>,
        cancel_first: bool,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        if trade.amount <= Decimal::ZERO {
            return Err(Error::InvalidQuantity {
                quantity: trade.amount,
            });
        }

        tracing::warn!(symbol = %trade.symbol, trade_id = trade.id, "🚨 Forced exit: {}", reason);

        let exit = if cancel_first {
            let outcome = self.exchange.cancel_order(&trade.symbol, &exit.order_id).await?;
            if !outcome.success {
                tracing::warn!(symbol = %trade.symbol, "Cancel of {} refused: {:?}", exit.order_id, outcome.errors);
                return Ok(Transition::CancelRejected);
            }
            self.settled_report(trade, exit).await?
        } else {
            exit.clone()
        };

        let quantity = trade.amount - exit.executed_qty;
        if quantity <= Decimal::ZERO {
            tracing::info!(symbol = %trade.symbol, "Exit {} filled before the cancel", exit.order_id);
            return self.close(trade, &exit, now).await;
        }

        let intent = self
            .store
            .record_intent(
                &NewOrderIntent {
                    kind: IntentKind::ExitMarket,
                    symbol: trade.symbol.clone(),
                    trade_id: Some(trade.id),
                    price: None,
                    quantity,
                    up_level: None,
                    down_level: None,
                    open_balance: None,
                },
                now,
            )
            .await?;

        let request = OrderRequest {
            symbol: trade.symbol.clone(),
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            quantity,
            price: None,
            client_order_id: intent.client_order_id(),
        };
        let order = outbox::submit(self.exchange, self.store, &intent, &request).await?;

        let action = format!("market sell {} on {}", order.order_id, trade.symbol);
        self.store
            .mark_exit_placed(trade.id, &order.order_id, None)
            .await
            .map_err(|e| Error::post_action(action.clone(), e))?;
        self.store
            .fulfill_intent(intent.id, &order.order_id)
            .await
            .map_err(|e| Error::post_action(action, e))?;

        let reason_text = reason.to_string();
        deliver(
            self.notifier,
            &messages::forced_exit(
                trade,
                &reason_text,
                current_price,
                &order.order_id,
                quantity,
                now,
                self.offset,
            ),
        )
        .await;

        Ok(Transition::ForcedExit {
            reason,
            market_order_id: order.order_id,
        })
    }

    async fn close(&self, trade: &TradeRecord, report: &OrderReport, now: DateTime<Utc>) -> Result<Transition> {
        if report.executed_qty <= Decimal::ZERO {
            return Err(Error::Decode(format!(
                "filled order {} reports no executed quantity",
                report.order_id
            )));
        }

        // Units missing from this order were sold earlier by the limit exit
        let earlier = (trade.amount - report.executed_qty).max(Decimal::ZERO);
        let sold = report.executed_qty + earlier;
        let close_balance = report.cumulative_quote_qty + earlier * trade.up_level;
        let sell_price = close_balance / sold;
        self.store
            .mark_closed(trade.id, now, close_balance, sell_price)
            .await?;

        let profit = close_balance - trade.open_balance;
        let profit_percent = if trade.open_balance.is_zero() {
            Decimal::ZERO
        } else {
            profit / trade.open_balance * Decimal::ONE_HUNDRED
        };

        tracing::info!(
            symbol = %trade.symbol,
            trade_id = trade.id,
            "💰 Closed at {}: profit {} ({}%)",
            sell_price.round_dp(8),
            profit,
            profit_percent.round_dp(2)
        );
        let settlement = messages::Settlement {
            sold,
            sell_price,
            close_balance,
            profit,
            profit_percent,
        };
        deliver(
            self.notifier,
            &messages::trade_closed(trade, report, &settlement, now, self.offset),
        )
        .await;

        Ok(Transition::Closed {
            sell_price,
            close_balance,
            profit,
        })
    }

    async fn needs_attention(
        &self,
        trade: &TradeRecord,
        report: &OrderReport,
        status: &OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        tracing::warn!(symbol = %trade.symbol, "Order {} in status {}", report.order_id, status);
        deliver(
            self.notifier,
            &messages::status_attention(trade, &report.order_id, status, now, self.offset),
        )
        .await;
        Ok(Transition::NeedsAttention(status.clone()))
    }
}
