//! Order intents written before every order placement.
//!
//! A pending intent means the engine was about to send an order and never
//! recorded the outcome. The next reconcile pass asks the exchange for the
//! intent's client order id and either replays the missing bookkeeping or
//! abandons the intent.

use crate::api::ExchangeClient;
use crate::db::{IntentStore, TradeStore};
use crate::models::{IntentKind, NewTradeRecord, OrderIntent, OrderReport, OrderRequest, PlacedOrder};
use crate::Result;

/// Send `request` for an already recorded `intent`
///
/// A classified exchange rejection abandons the intent. Transport failures
/// leave it pending, since the order may have reached the exchange.
pub async fn submit<E, S>(exchange: &E, store: &S, intent: &OrderIntent, request: &OrderRequest) -> Result<PlacedOrder>
where
    E: ExchangeClient,
    S: IntentStore,
{
    match exchange.place_order(request).await {
        Ok(placed) => Ok(placed),
        Err(e) => {
            if e.is_rejection() {
                if let Err(abandon_err) = store.abandon_intent(intent.id).await {
                    tracing::warn!("Could not abandon intent {}: {}", intent.id, abandon_err);
                }
            } else {
                tracing::warn!(
                    "Order {} outcome unknown, intent {} left pending",
                    request.client_order_id,
                    intent.id
                );
            }
            Err(e)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboxReport {
    pub resolved: usize,
    pub abandoned: usize,
}

/// Settle every pending intent against the exchange
pub async fn resolve_pending<E, S>(exchange: &E, store: &S) -> Result<OutboxReport>
where
    E: ExchangeClient,
    S: IntentStore + TradeStore,
{
    let mut report = OutboxReport::default();

    for intent in store.pending_intents().await? {
        let client_order_id = intent.client_order_id();
        let found = exchange
            .query_order_by_client_id(&intent.symbol, &client_order_id)
            .await?;

        let Some(order) = found else {
            tracing::warn!(symbol = %intent.symbol, "Order {} never reached the exchange", client_order_id);
            store.abandon_intent(intent.id).await?;
            report.abandoned += 1;
            continue;
        };

        if replay(store, &intent, &order).await? {
            store.fulfill_intent(intent.id, &order.order_id).await?;
            report.resolved += 1;
            tracing::info!(
                symbol = %intent.symbol,
                "🔁 Recovered {} as order {}",
                client_order_id,
                order.order_id
            );
        } else {
            store.abandon_intent(intent.id).await?;
            report.abandoned += 1;
        }
    }

    Ok(report)
}

/// Apply the bookkeeping the intent stood for; false when it cannot be applied
async fn replay<S>(store: &S, intent: &OrderIntent, order: &OrderReport) -> Result<bool>
where
    S: TradeStore,
{
    match intent.kind {
        IntentKind::EntryBuy => {
            let open = store.open_trades().await?;
            if open.iter().any(|t| t.buy_order_id == order.order_id) {
                return Ok(true);
            }

            let price = intent.price.unwrap_or(order.price);
            store
                .insert_trade(&NewTradeRecord {
                    open_date: intent.created_at,
                    open_balance: intent.open_balance.unwrap_or(price * intent.quantity),
                    symbol: intent.symbol.clone(),
                    buy_price: price,
                    amount: intent.quantity,
                    buy_order_id: order.order_id.clone(),
                    up_level: intent.up_level.unwrap_or_default(),
                    down_level: intent.down_level.unwrap_or(price),
                })
                .await?;
            Ok(true)
        }
        IntentKind::ExitLimit | IntentKind::ExitMarket => {
            let Some(trade_id) = intent.trade_id else {
                tracing::warn!("Exit intent {} has no trade", intent.id);
                return Ok(false);
            };
            let deal_date = match intent.kind {
                IntentKind::ExitLimit => Some(intent.created_at),
                _ => None,
            };
            store
                .mark_exit_placed(trade_id, &order.order_id, deal_date)
                .await?;
            Ok(true)
        }
    }
}
