//! HTML message bodies for trade events.

use crate::clock::format_report_time;
use crate::models::{FlatAnalysis, OrderReport, OrderStatus, TradeRecord};
use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;

fn trade_block(trade: &TradeRecord, offset: FixedOffset) -> String {
    format!(
        "  Symbol: {}\n  Buy order: {}\n  Buy price: {}\n  Amount: {}\n  Opened: {}",
        trade.symbol,
        trade.buy_order_id,
        trade.buy_price,
        trade.amount,
        format_report_time(trade.open_date, offset)
    )
}

pub fn entry_placed(
    trade: &TradeRecord,
    analysis: &FlatAnalysis,
    current_price: Decimal,
    offset: FixedOffset,
) -> String {
    format!(
        "<b>🟢 Limit buy placed</b>\n\n{}\n\n<b>Range:</b>\n  Support: {}\n  Resistance: {}\n  Range: {}%\n  Volatility: {}%\n  Current price: {}\n  Committed: {}",
        trade_block(trade, offset),
        analysis.support,
        analysis.resistance,
        analysis.range_percent.round_dp(2),
        analysis.volatility_percent.round_dp(2),
        current_price,
        trade.open_balance,
    )
}

pub fn entry_summary(
    placed: usize,
    committed: Decimal,
    free_balance: Option<Decimal>,
    quote_asset: &str,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    let balance = free_balance
        .map(|b| format!("{} {}", b.round_dp(2), quote_asset))
        .unwrap_or_else(|| "unavailable".to_string());
    format!(
        "<b>📊 Entry pass finished</b>\n\n  Orders placed: {}\n  Committed: {} {}\n  Free balance: {}\n\n<b>Time:</b> {}",
        placed,
        committed,
        quote_asset,
        balance,
        format_report_time(at, offset)
    )
}

pub fn order_missing(trade: &TradeRecord, at: DateTime<Utc>, offset: FixedOffset) -> String {
    format!(
        "<b>⚠️ Order not found on the exchange</b>\n\n{}\n\n<b>Time:</b> {}\n<b>Action:</b> trade marked as cancelled",
        trade_block(trade, offset),
        format_report_time(at, offset)
    )
}

pub fn entry_timed_out(
    trade: &TradeRecord,
    timeout_minutes: i64,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    format!(
        "<b>⏰ Buy order cancelled</b>\n\n{}\n\n<b>Reason:</b> not filled within {} minutes\n<b>Time:</b> {}",
        trade_block(trade, offset),
        timeout_minutes,
        format_report_time(at, offset)
    )
}

pub fn entry_cut_to_fill(
    trade: &TradeRecord,
    ordered: Decimal,
    timeout_minutes: i64,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    format!(
        "<b>✂️ Buy order cut to its filled part</b>\n\n{}\n  Ordered: {}\n\n<b>Reason:</b> partially filled within {} minutes\n<b>Time:</b> {}\n<b>Action:</b> limit sell of the filled amount",
        trade_block(trade, offset),
        ordered,
        timeout_minutes,
        format_report_time(at, offset)
    )
}

pub fn entry_canceled_by_exchange(
    trade: &TradeRecord,
    status: &OrderStatus,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    format!(
        "<b>❌ Buy order ended without fill</b>\n\n{}\n  Status: {}\n\n<b>Time:</b> {}",
        trade_block(trade, offset),
        status,
        format_report_time(at, offset)
    )
}

pub fn exit_placed(
    trade: &TradeRecord,
    sell_order_id: &str,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    format!(
        "<b>🎯 Buy filled, limit sell placed</b>\n\n{}\n\n<b>Sell:</b>\n  Order: {}\n  Price: {}\n  Amount: {}\n\n<b>Time:</b> {}",
        trade_block(trade, offset),
        sell_order_id,
        trade.up_level,
        trade.amount,
        format_report_time(at, offset)
    )
}

pub fn forced_exit(
    trade: &TradeRecord,
    reason: &str,
    current_price: Option<Decimal>,
    market_order_id: &str,
    quantity: Decimal,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    let price = current_price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "<b>🚨 Market sell placed</b>\n\n{}\n\n<b>Market sell:</b>\n  Order: {}\n  Amount: {}\n  Current price: {}\n  Range: {} .. {}\n\n<b>Time:</b> {}\n<b>Reason:</b> {}",
        trade_block(trade, offset),
        market_order_id,
        quantity,
        price,
        trade.down_level,
        trade.up_level,
        format_report_time(at, offset),
        reason
    )
}

/// Figures of a closed trade, covering every sell that went into it
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub sold: Decimal,
    pub sell_price: Decimal,
    pub close_balance: Decimal,
    pub profit: Decimal,
    pub profit_percent: Decimal,
}

pub fn trade_closed(
    trade: &TradeRecord,
    report: &OrderReport,
    settlement: &Settlement,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    format!(
        "<b>💰 Trade closed</b>\n\n{}\n  Sell order: {}\n  Status: {}\n\n<b>Buy:</b> {} at {} = {}\n<b>Sell:</b> {} at {} = {}\n\n<b>Result:</b> {} ({}%)\n<b>Time:</b> {}",
        trade_block(trade, offset),
        report.order_id,
        report.status,
        trade.amount,
        trade.buy_price,
        trade.open_balance,
        settlement.sold,
        settlement.sell_price.round_dp(8),
        settlement.close_balance,
        settlement.profit.round_dp(4),
        settlement.profit_percent.round_dp(2),
        format_report_time(at, offset)
    )
}

pub fn status_attention(
    trade: &TradeRecord,
    order_id: &str,
    status: &OrderStatus,
    at: DateTime<Utc>,
    offset: FixedOffset,
) -> String {
    format!(
        "<b>❓ Order needs attention</b>\n\n{}\n  Order: {}\n  Status: {}\n\n<b>Time:</b> {}\n<b>Action:</b> none, will be checked again",
        trade_block(trade, offset),
        order_id,
        status,
        format_report_time(at, offset)
    )
}
