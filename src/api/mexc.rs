use super::wire::{
    candle_from_row, AccountBody, ApiErrorBody, AvgPriceBody, CancelBody, ExchangeInfoBody,
    NumOrText, OrderBody, PlaceOrderBody, TickerPriceBody,
};
use super::ExchangeClient;
use crate::config::MexcSettings;
use crate::models::{
    AveragePrice, Balance, CancelOutcome, Candle, OrderReport, OrderRequest, PlacedOrder,
    SymbolInfo, TickerPrice,
};
use crate::{Error, Result};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const API_KEY_HEADER: &str = "X-MEXC-APIKEY";
const MAX_RETRIES: u32 = 3;

/// Exchange code for a query against an order that does not exist
const ORDER_NOT_FOUND_CODE: i64 = -2013;

type HmacSha256 = Hmac<Sha256>;

type MexcRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// MEXC spot v3 REST client
///
/// Public market data requests are retried on 429 and 5xx. Signed requests
/// are sent once: a retried order placement could duplicate the order.
#[derive(Clone)]
pub struct MexcClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
    rate_limiter: Arc<MexcRateLimiter>,
}

impl MexcClient {
    pub fn new(settings: &MexcSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            api_secret: settings.api_secret.clone(),
            recv_window_ms: settings.recv_window_ms,
            rate_limiter,
        })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| Error::InvalidConfig(format!("bad MEXC base url: {e}")))?;
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// HMAC-SHA256 of the query string, hex encoded
    fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| Error::InvalidConfig(format!("unusable MEXC secret: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    async fn public_get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = self.url(path, params)?;

        let mut attempt = 1;
        loop {
            self.rate_limiter.until_ready().await;
            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt < MAX_RETRIES {
                let backoff_secs = 2u64.pow(attempt);
                tracing::warn!(
                    "MEXC returned {} for {}, retrying in {}s (attempt {}/{})",
                    status,
                    path,
                    backoff_secs,
                    attempt,
                    MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                attempt += 1;
                continue;
            }

            return decode(response).await;
        }
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut all: Vec<(&str, String)> = params.to_vec();
        all.push(("recvWindow", self.recv_window_ms.to_string()));
        all.push(("timestamp", chrono::Utc::now().timestamp_millis().to_string()));

        let mut url = self.url(path, &all)?;
        let signature = self.sign(url.query().unwrap_or_default())?;
        url.query_pairs_mut().append_pair("signature", &signature);

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        decode(response).await
    }

    async fn query(&self, symbol: &str, key: &str, value: &str) -> Result<Option<OrderReport>> {
        let params = [("symbol", symbol.to_string()), (key, value.to_string())];
        match self.signed::<OrderBody>(Method::GET, "/api/v3/order", &params).await {
            Ok(body) => body.normalize().map(Some),
            Err(Error::Exchange { code, .. }) if code == ORDER_NOT_FOUND_CODE => Ok(None),
            Err(e) => Err(e),
        }
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        // Only a 4xx carrying an error body is a definite refusal
        if status.is_client_error() {
            if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(&body) {
                return Err(api_error.into_error());
            }
        }
        return Err(Error::Unavailable {
            status: status.as_u16(),
            message: body,
        });
    }

    // Some endpoints answer 200 with an error body
    if let Ok(api_error) = serde_json::from_str::<ApiErrorBody>(&body) {
        let err = api_error.into_error();
        if matches!(err, Error::Exchange { code, .. } if code != 0 && code != 200) {
            return Err(err);
        }
    }

    Ok(serde_json::from_str(&body)?)
}

/// Kline interval code for a minute count
fn interval_code(minutes: u32) -> Result<&'static str> {
    match minutes {
        1 => Ok("1m"),
        5 => Ok("5m"),
        15 => Ok("15m"),
        30 => Ok("30m"),
        60 => Ok("60m"),
        240 => Ok("4h"),
        1440 => Ok("1d"),
        other => Err(Error::InvalidConfig(format!(
            "unsupported kline interval {other} minutes"
        ))),
    }
}

fn classify_symbol_error(symbol: &str, err: Error) -> Error {
    if err.is_invalid_symbol() {
        Error::InvalidSymbol(symbol.to_string())
    } else {
        err
    }
}

impl ExchangeClient for MexcClient {
    async fn candles(&self, symbol: &str, interval_minutes: u32, limit: u32) -> Result<Vec<Candle>> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval_code(interval_minutes)?.to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<NumOrText>> = self
            .public_get("/api/v3/klines", &params)
            .await
            .map_err(|e| classify_symbol_error(symbol, e))?;

        rows.iter().map(|row| candle_from_row(row)).collect()
    }

    async fn average_price(&self, symbol: &str) -> Result<AveragePrice> {
        let body: AvgPriceBody = self
            .public_get("/api/v3/avgPrice", &[("symbol", symbol.to_string())])
            .await
            .map_err(|e| classify_symbol_error(symbol, e))?;
        body.normalize()
    }

    async fn balances(&self) -> Result<Vec<Balance>> {
        let body: AccountBody = self.signed(Method::GET, "/api/v3/account", &[]).await?;
        body.balances.into_iter().map(|b| b.normalize()).collect()
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<PlacedOrder> {
        let mut params = vec![
            ("symbol", request.symbol.clone()),
            ("side", request.side.as_str().to_string()),
            ("type", request.order_type.as_str().to_string()),
            ("quantity", request.quantity.normalize().to_string()),
            ("newClientOrderId", request.client_order_id.clone()),
        ];
        if let Some(price) = request.price {
            params.push(("price", price.normalize().to_string()));
        }

        let body: PlaceOrderBody = self.signed(Method::POST, "/api/v3/order", &params).await?;
        let mut placed = body.normalize();
        if placed.client_order_id.is_none() {
            placed.client_order_id = Some(request.client_order_id.clone());
        }

        tracing::info!(
            symbol = %placed.symbol,
            "📝 {} {} {} placed: order {}",
            request.order_type.as_str(),
            request.side.as_str(),
            request.quantity,
            placed.order_id
        );
        Ok(placed)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<CancelOutcome> {
        let params = [("symbol", symbol.to_string()), ("orderId", order_id.to_string())];
        let body: CancelBody = self.signed(Method::DELETE, "/api/v3/order", &params).await?;
        Ok(body.normalize())
    }

    async fn query_order(&self, symbol: &str, order_id: &str) -> Result<Option<OrderReport>> {
        self.query(symbol, "orderId", order_id).await
    }

    async fn query_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderReport>> {
        self.query(symbol, "origClientOrderId", client_order_id).await
    }

    async fn ticker_prices(&self) -> Result<Vec<TickerPrice>> {
        let rows: Vec<TickerPriceBody> = self.public_get("/api/v3/ticker/price", &[]).await?;
        rows.into_iter().map(|row| row.normalize()).collect()
    }

    async fn symbol_info(&self, symbol: &str) -> Result<Option<SymbolInfo>> {
        let body: ExchangeInfoBody = match self
            .public_get("/api/v3/exchangeInfo", &[("symbol", symbol.to_string())])
            .await
        {
            Ok(body) => body,
            Err(e) if e.is_invalid_symbol() => return Ok(None),
            Err(e) => return Err(e),
        };

        body.symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .map(|s| s.normalize())
            .transpose()
    }
}
