use super::candle_window::CandleWindow;
use crate::models::FlatAnalysis;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

/// Default ceiling for volatility, drawdown and rise, in percent
pub const DEFAULT_MAX_VOLATILITY_PERCENT: Decimal = dec!(5);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Compute range statistics and the flat verdict for a window
///
/// # Arguments
/// * `window` - candles to analyse
/// * `max_volatility_percent` - ceiling applied to volatility, drawdown and rise
/// * `percentile` - optional wick trim (1..=100) applied before the statistics
///
/// An empty window, or one whose mean close is zero, yields the zero result
/// with `is_flat = false`.
pub fn analyze_flat(
    window: &CandleWindow,
    max_volatility_percent: Decimal,
    percentile: Option<u32>,
) -> FlatAnalysis {
    let trimmed;
    let window = match percentile {
        Some(p) => {
            trimmed = window.trim_percentile(p);
            &trimmed
        }
        None => window,
    };

    let candles = window.candles();
    let Some(first) = candles.first() else {
        return FlatAnalysis::default();
    };

    let mut support = first.low;
    let mut resistance = first.high;
    let mut total_close = Decimal::ZERO;

    for candle in candles {
        support = support.min(candle.low);
        resistance = resistance.max(candle.high);
        total_close += candle.close;
    }

    let count = Decimal::from(candles.len());
    let avg_price = total_close / count;
    if avg_price.is_zero() {
        return FlatAnalysis::default();
    }

    // Population standard deviation of closes
    let squared: Decimal = candles
        .iter()
        .map(|c| {
            let diff = c.close - avg_price;
            diff * diff
        })
        .sum();
    let std_dev = (squared / count).sqrt().unwrap_or(Decimal::ZERO);

    let range_abs = resistance - support;
    let range_percent = range_abs / avg_price * HUNDRED;
    let volatility_percent = std_dev / avg_price * HUNDRED;
    let max_drawdown_percent = (avg_price - support) / avg_price * HUNDRED;
    let max_rise_percent = (resistance - avg_price) / avg_price * HUNDRED;

    let is_flat = volatility_percent <= max_volatility_percent
        && max_drawdown_percent <= max_volatility_percent
        && max_rise_percent <= max_volatility_percent;

    FlatAnalysis {
        is_flat,
        support,
        resistance,
        range_abs,
        range_percent,
        avg_price,
        volatility_percent,
        max_drawdown_percent,
        max_rise_percent,
    }
}

/// True when `price` lies inside `[support, resistance]`
pub fn price_in_range(price: Decimal, support: Decimal, resistance: Decimal) -> bool {
    support <= price && price <= resistance
}
