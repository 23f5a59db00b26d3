//! MEXC payload shapes and their normalisation into core types.
//!
//! The exchange sends prices, quantities and timestamps either as JSON
//! numbers or as strings depending on the endpoint. Everything passes through
//! [`NumOrText`] before reaching the engine.

use crate::models::{
    AveragePrice, Balance, CancelError, CancelOutcome, Candle, OrderReport, OrderSide,
    OrderStatus, PlacedOrder, SymbolInfo, TickerPrice,
};
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// A JSON value that is either a number or its text rendering
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumOrText {
    Num(serde_json::Number),
    Text(String),
}

impl NumOrText {
    pub fn to_decimal(&self) -> Result<Decimal> {
        let raw = match self {
            NumOrText::Num(n) => n.to_string(),
            NumOrText::Text(s) => s.trim().to_string(),
        };
        if raw.is_empty() {
            return Ok(Decimal::ZERO);
        }
        Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map_err(|_| Error::Decode(format!("not a decimal: {raw}")))
    }

    pub fn to_i64(&self) -> Result<i64> {
        match self {
            NumOrText::Num(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| Error::Decode(format!("not an integer: {n}"))),
            NumOrText::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::Decode(format!("not an integer: {s}"))),
        }
    }

    /// Order ids arrive as numbers on some endpoints
    pub fn to_id(&self) -> String {
        match self {
            NumOrText::Num(n) => n.to_string(),
            NumOrText::Text(s) => s.clone(),
        }
    }
}

/// `{"code": -1121, "msg": "Invalid symbol."}`
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: NumOrText,
    #[serde(alias = "message")]
    pub msg: String,
}

impl ApiErrorBody {
    pub fn into_error(self) -> Error {
        Error::Exchange {
            code: self.code.to_i64().unwrap_or_default(),
            message: self.msg,
        }
    }
}

/// Kline row: `[openTime, open, high, low, close, volume, closeTime, quoteVolume]`
pub fn candle_from_row(row: &[NumOrText]) -> Result<Candle> {
    if row.len() < 7 {
        return Err(Error::Decode(format!(
            "kline row has {} fields, expected at least 7",
            row.len()
        )));
    }
    Ok(Candle {
        open_time: row[0].to_i64()?,
        open: row[1].to_decimal()?,
        high: row[2].to_decimal()?,
        low: row[3].to_decimal()?,
        close: row[4].to_decimal()?,
        volume: row[5].to_decimal()?,
        close_time: row[6].to_i64()?,
    })
}

#[derive(Debug, Deserialize)]
pub struct AvgPriceBody {
    pub mins: NumOrText,
    pub price: NumOrText,
}

impl AvgPriceBody {
    pub fn normalize(self) -> Result<AveragePrice> {
        Ok(AveragePrice {
            price: self.price.to_decimal()?,
            window_minutes: self.mins.to_i64()?.max(0) as u32,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AccountBody {
    #[serde(default)]
    pub balances: Vec<BalanceBody>,
}

#[derive(Debug, Deserialize)]
pub struct BalanceBody {
    pub asset: String,
    pub free: NumOrText,
    pub locked: NumOrText,
}

impl BalanceBody {
    pub fn normalize(self) -> Result<Balance> {
        Ok(Balance {
            asset: self.asset,
            free: self.free.to_decimal()?,
            locked: self.locked.to_decimal()?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderBody {
    pub symbol: String,
    pub order_id: NumOrText,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl PlaceOrderBody {
    pub fn normalize(self) -> PlacedOrder {
        PlacedOrder {
            order_id: self.order_id.to_id(),
            symbol: self.symbol,
            client_order_id: self.client_order_id.filter(|id| !id.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBody {
    pub symbol: String,
    pub order_id: NumOrText,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub side: String,
    #[serde(rename = "type", default)]
    pub order_type: String,
    pub status: String,
    #[serde(default)]
    pub price: Option<NumOrText>,
    #[serde(default)]
    pub orig_qty: Option<NumOrText>,
    #[serde(default)]
    pub executed_qty: Option<NumOrText>,
    #[serde(default)]
    pub cummulative_quote_qty: Option<NumOrText>,
}

fn opt_decimal(value: Option<NumOrText>) -> Result<Decimal> {
    value.map(|v| v.to_decimal()).unwrap_or(Ok(Decimal::ZERO))
}

impl OrderBody {
    pub fn normalize(self) -> Result<OrderReport> {
        let side = OrderSide::parse(&self.side)
            .ok_or_else(|| Error::Decode(format!("unknown order side {}", self.side)))?;
        Ok(OrderReport {
            order_id: self.order_id.to_id(),
            client_order_id: self.client_order_id.filter(|id| !id.is_empty()),
            symbol: self.symbol,
            side,
            order_type: self.order_type,
            status: OrderStatus::parse(&self.status),
            price: opt_decimal(self.price)?,
            orig_qty: opt_decimal(self.orig_qty)?,
            executed_qty: opt_decimal(self.executed_qty)?,
            cumulative_quote_qty: opt_decimal(self.cummulative_quote_qty)?,
        })
    }
}

/// Cancel replies come either as the cancelled order or as a batch result
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CancelBody {
    Batch {
        success: bool,
        #[serde(default)]
        data: Vec<CancelItemBody>,
    },
    Order(OrderBody),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelItemBody {
    pub order_id: NumOrText,
    #[serde(default)]
    pub error_code: Option<NumOrText>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl CancelBody {
    pub fn normalize(self) -> CancelOutcome {
        match self {
            CancelBody::Order(_) => CancelOutcome {
                success: true,
                errors: Vec::new(),
            },
            CancelBody::Batch { success, data } => {
                let errors: Vec<CancelError> = data
                    .into_iter()
                    .filter_map(|item| {
                        let code = item
                            .error_code
                            .as_ref()
                            .and_then(|c| c.to_i64().ok())
                            .unwrap_or_default();
                        if code == 0 {
                            return None;
                        }
                        Some(CancelError {
                            order_id: item.order_id.to_id(),
                            code,
                            message: item.error_msg.unwrap_or_default(),
                        })
                    })
                    .collect();
                CancelOutcome {
                    success: success && errors.is_empty(),
                    errors,
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TickerPriceBody {
    pub symbol: String,
    pub price: NumOrText,
}

impl TickerPriceBody {
    pub fn normalize(self) -> Result<TickerPrice> {
        Ok(TickerPrice {
            price: self.price.to_decimal()?,
            symbol: self.symbol,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeInfoBody {
    #[serde(default)]
    pub symbols: Vec<SymbolBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolBody {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub is_spot_trading_allowed: bool,
    #[serde(default)]
    pub base_size_precision: Option<NumOrText>,
}

impl SymbolBody {
    pub fn normalize(self) -> Result<SymbolInfo> {
        Ok(SymbolInfo {
            base_size_precision: opt_decimal(self.base_size_precision)?,
            symbol: self.symbol,
            base_asset: self.base_asset,
            quote_asset: self.quote_asset,
            trading_allowed: self.is_spot_trading_allowed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_num_or_text_decimal() {
        let num: NumOrText = serde_json::from_str("1.25").unwrap();
        let text: NumOrText = serde_json::from_str("\"1.25\"").unwrap();
        assert_eq!(num.to_decimal().unwrap(), dec!(1.25));
        assert_eq!(text.to_decimal().unwrap(), dec!(1.25));

        let sci: NumOrText = serde_json::from_str("\"1e-7\"").unwrap();
        assert_eq!(sci.to_decimal().unwrap(), dec!(0.0000001));

        let bad: NumOrText = serde_json::from_str("\"abc\"").unwrap();
        assert!(matches!(bad.to_decimal(), Err(Error::Decode(_))));
    }

    #[test]
    fn test_kline_row() {
        let row: Vec<NumOrText> = serde_json::from_str(
            r#"[1714550400000,"0.1010","0.1025","0.1001","0.1012","12345.6",1714551299999,"1249.5"]"#,
        )
        .unwrap();

        let candle = candle_from_row(&row).unwrap();
        assert_eq!(candle.open_time, 1714550400000);
        assert_eq!(candle.close_time, 1714551299999);
        assert_eq!(candle.high, dec!(0.1025));
        assert_eq!(candle.close, dec!(0.1012));
    }

    #[test]
    fn test_short_kline_row_rejected() {
        let row: Vec<NumOrText> = serde_json::from_str(r#"[1,"1","1"]"#).unwrap();
        assert!(candle_from_row(&row).is_err());
    }

    #[test]
    fn test_order_body_with_numeric_fields() {
        let body: OrderBody = serde_json::from_str(
            r#"{
                "symbol": "FOOUSDT",
                "orderId": 123456789,
                "clientOrderId": "palisade_entry_buy_3",
                "side": "SELL",
                "type": "LIMIT",
                "status": "FILLED",
                "price": "2.6",
                "origQty": 100,
                "executedQty": "100",
                "cummulativeQuoteQty": "250"
            }"#,
        )
        .unwrap();

        let report = body.normalize().unwrap();
        assert_eq!(report.order_id, "123456789");
        assert_eq!(report.side, OrderSide::Sell);
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.executed_qty, dec!(100));
        assert_eq!(report.cumulative_quote_qty, dec!(250));
    }

    #[test]
    fn test_cancel_batch_with_errors() {
        let body: CancelBody = serde_json::from_str(
            r#"{"success": true, "code": 0, "data": [{"orderId": "9", "errorCode": -2011, "errorMsg": "Unknown order"}]}"#,
        )
        .unwrap();
        let outcome = body.normalize();
        assert!(!outcome.success);
        assert_eq!(outcome.errors[0].code, -2011);
    }

    #[test]
    fn test_cancel_order_echo_is_success() {
        let body: CancelBody = serde_json::from_str(
            r#"{"symbol":"FOOUSDT","orderId":"9","side":"BUY","type":"LIMIT","status":"CANCELED"}"#,
        )
        .unwrap();
        assert!(body.normalize().success);
    }

    #[test]
    fn test_error_body() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"code":-1121,"msg":"Invalid symbol."}"#).unwrap();
        assert!(body.into_error().is_invalid_symbol());
    }
}
