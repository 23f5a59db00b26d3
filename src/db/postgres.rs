use super::{CoinFilter, CoinStore, IntentStore, TradeStore};
use crate::models::{
    CoinState, FlatAnalysis, IntentKind, IntentStatus, NewOrderIntent, NewTradeRecord,
    OrderIntent, TradeRecord,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

const COIN_COLUMNS: &str = r#"
    symbol, base_asset, quote_asset, trading_allowed, is_palisade, last_check,
    support, resistance, range_abs, range_percent, avg_price,
    volatility_percent, max_drawdown_percent, max_rise_percent, base_size_precision
"#;

const TRADE_COLUMNS: &str = r#"
    id, open_date, deal_date, close_date, cancel_date, open_balance, close_balance,
    symbol, buy_price, sell_price, amount, buy_order_id, sell_order_id, up_level, down_level
"#;

const INTENT_COLUMNS: &str = r#"
    id, kind, status, symbol, trade_id, price, quantity, up_level, down_level,
    open_balance, order_id, created_at
"#;

/// Postgres persistence for coins, trades and order intents
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to Postgres and apply pending migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM order_intents").execute(&self.pool).await?;
        sqlx::query("DELETE FROM trade_log").execute(&self.pool).await?;
        sqlx::query("DELETE FROM coins").execute(&self.pool).await?;
        Ok(())
    }
}

fn coin_from_row(row: &PgRow) -> CoinState {
    CoinState {
        symbol: row.get("symbol"),
        base_asset: row.get("base_asset"),
        quote_asset: row.get("quote_asset"),
        trading_allowed: row.get("trading_allowed"),
        is_palisade: row.get("is_palisade"),
        last_check: row.get("last_check"),
        support: row.get("support"),
        resistance: row.get("resistance"),
        range_abs: row.get("range_abs"),
        range_percent: row.get("range_percent"),
        avg_price: row.get("avg_price"),
        volatility_percent: row.get("volatility_percent"),
        max_drawdown_percent: row.get("max_drawdown_percent"),
        max_rise_percent: row.get("max_rise_percent"),
        base_size_precision: row.get("base_size_precision"),
    }
}

fn trade_from_row(row: &PgRow) -> TradeRecord {
    TradeRecord {
        id: row.get("id"),
        open_date: row.get("open_date"),
        deal_date: row.get("deal_date"),
        close_date: row.get("close_date"),
        cancel_date: row.get("cancel_date"),
        open_balance: row.get("open_balance"),
        close_balance: row.get("close_balance"),
        symbol: row.get("symbol"),
        buy_price: row.get("buy_price"),
        sell_price: row.get("sell_price"),
        amount: row.get("amount"),
        buy_order_id: row.get("buy_order_id"),
        sell_order_id: row.get("sell_order_id"),
        up_level: row.get("up_level"),
        down_level: row.get("down_level"),
    }
}

fn intent_from_row(row: &PgRow) -> Result<OrderIntent> {
    let kind_str: String = row.get("kind");
    let status_str: String = row.get("status");

    let kind = IntentKind::parse(&kind_str)
        .ok_or_else(|| Error::Decode(format!("unknown intent kind {kind_str}")))?;
    let status = IntentStatus::parse(&status_str)
        .ok_or_else(|| Error::Decode(format!("unknown intent status {status_str}")))?;

    Ok(OrderIntent {
        id: row.get("id"),
        kind,
        status,
        symbol: row.get("symbol"),
        trade_id: row.get("trade_id"),
        price: row.get("price"),
        quantity: row.get("quantity"),
        up_level: row.get("up_level"),
        down_level: row.get("down_level"),
        open_balance: row.get("open_balance"),
        order_id: row.get("order_id"),
        created_at: row.get("created_at"),
    })
}

impl CoinStore for PostgresStore {
    async fn coin(&self, symbol: &str) -> Result<Option<CoinState>> {
        let row = sqlx::query(&format!("SELECT {COIN_COLUMNS} FROM coins WHERE symbol = $1"))
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(coin_from_row))
    }

    async fn coins(&self, filter: CoinFilter) -> Result<Vec<CoinState>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COIN_COLUMNS}
            FROM coins
            WHERE trading_allowed = $1
              AND ($2 = FALSE OR is_palisade = TRUE)
            ORDER BY symbol ASC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.trading_allowed)
        .bind(filter.palisade_only)
        .bind(i64::from(filter.limit))
        .bind(i64::from(filter.offset))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(coin_from_row).collect())
    }

    async fn insert_coin(&self, coin: &CoinState) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO coins (
                symbol, base_asset, quote_asset, trading_allowed, is_palisade,
                last_check, base_size_precision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (symbol) DO NOTHING
            "#,
        )
        .bind(&coin.symbol)
        .bind(&coin.base_asset)
        .bind(&coin.quote_asset)
        .bind(coin.trading_allowed)
        .bind(coin.is_palisade)
        .bind(coin.last_check)
        .bind(coin.base_size_precision)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_flat_flag(&self, symbol: &str, is_flat: bool, checked_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE coins
            SET is_palisade = $2, last_check = $3, updated_at = NOW()
            WHERE symbol = $1
            "#,
        )
        .bind(symbol)
        .bind(is_flat)
        .bind(checked_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved flat flag {} for {}", is_flat, symbol);
        Ok(())
    }

    async fn update_levels(&self, symbol: &str, analysis: &FlatAnalysis) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE coins SET
                support = $2,
                resistance = $3,
                range_abs = $4,
                range_percent = $5,
                avg_price = $6,
                volatility_percent = $7,
                max_drawdown_percent = $8,
                max_rise_percent = $9,
                updated_at = NOW()
            WHERE symbol = $1
            "#,
        )
        .bind(symbol)
        .bind(analysis.support)
        .bind(analysis.resistance)
        .bind(analysis.range_abs)
        .bind(analysis.range_percent)
        .bind(analysis.avg_price)
        .bind(analysis.volatility_percent)
        .bind(analysis.max_drawdown_percent)
        .bind(analysis.max_rise_percent)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl TradeStore for PostgresStore {
    async fn open_trades(&self) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trade_log
            WHERE cancel_date IS NULL AND close_date IS NULL
            ORDER BY id ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(trade_from_row).collect())
    }

    async fn insert_trade(&self, trade: &NewTradeRecord) -> Result<TradeRecord> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO trade_log (
                open_date, open_balance, symbol, buy_price, amount,
                buy_order_id, up_level, down_level
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TRADE_COLUMNS}
            "#
        ))
        .bind(trade.open_date)
        .bind(trade.open_balance)
        .bind(&trade.symbol)
        .bind(trade.buy_price)
        .bind(trade.amount)
        .bind(&trade.buy_order_id)
        .bind(trade.up_level)
        .bind(trade.down_level)
        .fetch_one(&self.pool)
        .await?;

        let record = trade_from_row(&row);
        tracing::debug!("Saved trade {} for {}", record.id, record.symbol);
        Ok(record)
    }

    async fn mark_cancelled(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE trade_log SET cancel_date = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resize_entry(&self, id: i64, amount: Decimal, open_balance: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trade_log
            SET amount = $2, open_balance = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(open_balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_exit_placed(&self, id: i64, sell_order_id: &str, deal_date: Option<DateTime<Utc>>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trade_log
            SET sell_order_id = $2, deal_date = COALESCE($3, deal_date)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sell_order_id)
        .bind(deal_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_closed(&self, id: i64, at: DateTime<Utc>, close_balance: Decimal, sell_price: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trade_log
            SET close_date = $2, close_balance = $3, sell_price = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(close_balance)
        .bind(sell_price)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl IntentStore for PostgresStore {
    async fn record_intent(&self, intent: &NewOrderIntent, at: DateTime<Utc>) -> Result<OrderIntent> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO order_intents (
                kind, status, symbol, trade_id, price, quantity,
                up_level, down_level, open_balance, created_at
            )
            VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {INTENT_COLUMNS}
            "#
        ))
        .bind(intent.kind.as_str())
        .bind(&intent.symbol)
        .bind(intent.trade_id)
        .bind(intent.price)
        .bind(intent.quantity)
        .bind(intent.up_level)
        .bind(intent.down_level)
        .bind(intent.open_balance)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        intent_from_row(&row)
    }

    async fn fulfill_intent(&self, id: i64, order_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE order_intents
            SET status = 'fulfilled', order_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn abandon_intent(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE order_intents SET status = 'abandoned', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pending_intents(&self) -> Result<Vec<OrderIntent>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTENT_COLUMNS} FROM order_intents WHERE status = 'pending' ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(intent_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SymbolInfo;
    use rust_decimal_macros::dec;

    async fn get_test_db() -> PostgresStore {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/palisade_test".to_string());

        PostgresStore::connect(&database_url)
            .await
            .expect("Failed to connect to test database")
    }

    fn coin(symbol: &str) -> CoinState {
        CoinState::discovered(&SymbolInfo {
            symbol: symbol.to_string(),
            base_asset: symbol.trim_end_matches("USDT").to_string(),
            quote_asset: "USDT".to_string(),
            trading_allowed: true,
            base_size_precision: dec!(0.01),
        })
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_coin_insert_is_idempotent() {
        let db = get_test_db().await;
        db.clear_all().await.unwrap();

        assert!(db.insert_coin(&coin("FOOUSDT")).await.unwrap());
        assert!(!db.insert_coin(&coin("FOOUSDT")).await.unwrap());

        let stored = db.coin("FOOUSDT").await.unwrap().unwrap();
        assert_eq!(stored.base_size_precision, dec!(0.01));
        assert!(stored.last_check.is_none());

        db.clear_all().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_flat_flag_and_levels() {
        let db = get_test_db().await;
        db.clear_all().await.unwrap();
        db.insert_coin(&coin("FOOUSDT")).await.unwrap();
        db.insert_coin(&coin("BARUSDT")).await.unwrap();

        let now = Utc::now();
        db.update_flat_flag("FOOUSDT", true, now).await.unwrap();
        db.update_levels(
            "FOOUSDT",
            &FlatAnalysis {
                is_flat: true,
                support: dec!(1.0),
                resistance: dec!(1.02),
                ..FlatAnalysis::default()
            },
        )
        .await
        .unwrap();

        let flat = db.coins(CoinFilter::flat(50)).await.unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].symbol, "FOOUSDT");
        assert_eq!(flat[0].resistance, dec!(1.02));

        let all = db.coins(CoinFilter::tradable(50)).await.unwrap();
        assert_eq!(all.len(), 2);

        db.clear_all().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_trade_lifecycle_and_intents() {
        let db = get_test_db().await;
        db.clear_all().await.unwrap();

        let now = Utc::now();
        let intent = db
            .record_intent(
                &NewOrderIntent {
                    kind: IntentKind::EntryBuy,
                    symbol: "FOOUSDT".to_string(),
                    trade_id: None,
                    price: Some(dec!(1.0)),
                    quantity: dec!(2),
                    up_level: Some(dec!(1.02)),
                    down_level: Some(dec!(1.0)),
                    open_balance: Some(dec!(2)),
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(db.pending_intents().await.unwrap().len(), 1);

        let trade = db
            .insert_trade(&NewTradeRecord {
                open_date: now,
                open_balance: dec!(2),
                symbol: "FOOUSDT".to_string(),
                buy_price: dec!(1.0),
                amount: dec!(2),
                buy_order_id: "B1".to_string(),
                up_level: dec!(1.02),
                down_level: dec!(1.0),
            })
            .await
            .unwrap();
        db.fulfill_intent(intent.id, "B1").await.unwrap();
        assert!(db.pending_intents().await.unwrap().is_empty());

        db.resize_entry(trade.id, dec!(1.5), dec!(1.5)).await.unwrap();
        db.mark_exit_placed(trade.id, "S1", Some(now)).await.unwrap();
        db.mark_exit_placed(trade.id, "S2", None).await.unwrap();
        let open = db.open_trades().await.unwrap();
        assert_eq!(open[0].amount, dec!(1.5));
        assert_eq!(open[0].open_balance, dec!(1.5));
        assert_eq!(open[0].sell_order_id.as_deref(), Some("S2"));
        assert!(open[0].deal_date.is_some());

        db.mark_closed(trade.id, now, dec!(2.04), dec!(1.02)).await.unwrap();
        assert!(db.open_trades().await.unwrap().is_empty());

        db.clear_all().await.unwrap();
    }
}
