mod common;

use chrono::Duration;
use common::*;
use palisade::clock::ManualClock;
use palisade::db::CoinFilter;
use palisade::discovery::{CoinScreener, CoinUniverseSync, ScreenOptions, ScreenOutcome, SkipReason};
use palisade::*;
use rust_decimal_macros::dec;

fn options() -> ScreenOptions {
    ScreenOptions::from_settings(&test_settings())
}

#[tokio::test]
async fn test_recently_checked_coin_is_skipped() {
    let exchange = MockExchange::new();
    let store = MemoryStore::new();
    store.put_coin(flat_coin("FOOUSDT", start_time() - Duration::minutes(179)));
    let clock = ManualClock::new(start_time());

    let screener = CoinScreener::new(&exchange, &store, &clock);
    let coin = store.stored_coin("FOOUSDT");
    let outcome = screener.check_and_update(&coin, &options()).await.unwrap();

    assert_eq!(outcome, ScreenOutcome::Skipped(SkipReason::CheckedRecently));
    assert!(exchange.candle_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_forced_check_ignores_last_check() {
    let exchange = MockExchange::new();
    exchange.set_candles("FOOUSDT", flat_candles(start_time()));
    let store = MemoryStore::new();
    store.put_coin(flat_coin("FOOUSDT", start_time() - Duration::minutes(1)));
    let clock = ManualClock::new(start_time());

    let screener = CoinScreener::new(&exchange, &store, &clock);
    let coin = store.stored_coin("FOOUSDT");
    let outcome = screener
        .check_and_update(&coin, &options().forced())
        .await
        .unwrap();

    assert!(outcome.flat().is_some());
}

#[tokio::test]
async fn test_invalid_symbol_is_skipped_without_update() {
    let exchange = MockExchange::new();
    exchange.set_invalid("DEADUSDT");
    let store = MemoryStore::new();
    store.put_coin(coin("DEADUSDT"));
    let clock = ManualClock::new(start_time());

    let screener = CoinScreener::new(&exchange, &store, &clock);
    let outcome = screener
        .check_and_update(&coin("DEADUSDT"), &options())
        .await
        .unwrap();

    assert_eq!(outcome, ScreenOutcome::Skipped(SkipReason::InvalidSymbol));
    assert_eq!(store.stored_coin("DEADUSDT").last_check, None);
}

#[tokio::test]
async fn test_flat_coin_persists_levels() {
    let exchange = MockExchange::new();
    exchange.set_candles("FOOUSDT", flat_candles(start_time()));
    let store = MemoryStore::new();
    store.put_coin(coin("FOOUSDT"));
    let clock = ManualClock::new(start_time());

    let screener = CoinScreener::new(&exchange, &store, &clock);
    let outcome = screener
        .check_and_update(&coin("FOOUSDT"), &options())
        .await
        .unwrap();

    let analysis = outcome.flat().cloned().unwrap();
    assert!(analysis.is_flat);

    let stored = store.stored_coin("FOOUSDT");
    assert!(stored.is_palisade);
    assert_eq!(stored.last_check, Some(start_time()));
    assert_eq!(stored.support, dec!(1.00));
    assert_eq!(stored.resistance, dec!(1.02));
    assert_eq!(stored.avg_price, dec!(1.01));
    assert_eq!(stored.volatility_percent, dec!(0));
}

#[tokio::test]
async fn test_trending_coin_keeps_previous_levels() {
    let exchange = MockExchange::new();
    exchange.set_candles("FOOUSDT", trending_candles(start_time()));
    let store = MemoryStore::new();
    store.put_coin(flat_coin("FOOUSDT", start_time() - Duration::hours(4)));
    let clock = ManualClock::new(start_time());

    let screener = CoinScreener::new(&exchange, &store, &clock);
    let coin = store.stored_coin("FOOUSDT");
    let outcome = screener.check_and_update(&coin, &options()).await.unwrap();

    assert!(matches!(outcome, ScreenOutcome::Checked(ref a) if !a.is_flat));

    let stored = store.stored_coin("FOOUSDT");
    assert!(!stored.is_palisade);
    assert_eq!(stored.last_check, Some(start_time()));
    assert_eq!(stored.support, dec!(1.00));
    assert_eq!(stored.resistance, dec!(1.02));
}

#[tokio::test]
async fn test_stale_candles_are_skipped() {
    let exchange = MockExchange::new();
    exchange.set_candles("FOOUSDT", flat_candles(start_time() - Duration::hours(6)));
    let store = MemoryStore::new();
    store.put_coin(coin("FOOUSDT"));
    let clock = ManualClock::new(start_time());

    let screener = CoinScreener::new(&exchange, &store, &clock);
    let outcome = screener
        .check_and_update(&coin("FOOUSDT"), &options())
        .await
        .unwrap();

    assert_eq!(outcome, ScreenOutcome::Skipped(SkipReason::NoRecentCandles));
    assert!(!store.stored_coin("FOOUSDT").is_palisade);
}

#[tokio::test]
async fn test_batch_screening_report() {
    let exchange = MockExchange::new();
    exchange.set_candles("AAAUSDT", flat_candles(start_time()));
    exchange.set_candles("BBBUSDT", trending_candles(start_time()));
    exchange.set_invalid("CCCUSDT");
    let store = MemoryStore::new();
    store.put_coin(coin("AAAUSDT"));
    store.put_coin(coin("BBBUSDT"));
    store.put_coin(coin("CCCUSDT"));
    store.put_coin(flat_coin("DDDUSDT", start_time() - Duration::minutes(10)));
    store.put_coin(CoinState {
        trading_allowed: false,
        ..coin("EEEUSDT")
    });
    let clock = ManualClock::new(start_time());

    let screener = CoinScreener::new(&exchange, &store, &clock);
    let report = screener
        .screen_batch(CoinFilter::tradable(100), &options(), std::time::Duration::ZERO)
        .await
        .unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.flat, 1);
    assert_eq!(report.skipped_invalid, 1);
    assert_eq!(report.skipped_recent, 1);
    assert!(!exchange
        .candle_calls
        .lock()
        .unwrap()
        .contains(&"EEEUSDT".to_string()));
}

#[tokio::test]
async fn test_universe_sync_adds_only_new_pairs() {
    let exchange = MockExchange::new();
    for symbol in ["AAAUSDT", "BBBUSDT"] {
        exchange.list_symbol(SymbolInfo {
            symbol: symbol.to_string(),
            base_asset: symbol.trim_end_matches("USDT").to_string(),
            quote_asset: "USDT".to_string(),
            trading_allowed: true,
            base_size_precision: dec!(0.1),
        });
    }
    exchange.tickers.lock().unwrap().push(TickerPrice {
        symbol: "GHOSTUSDT".to_string(),
        price: dec!(1),
    });
    let store = MemoryStore::new();
    store.put_coin(flat_coin("AAAUSDT", start_time()));

    let sync = CoinUniverseSync::new(&exchange, &store);
    let report = sync.run(std::time::Duration::ZERO).await.unwrap();

    assert_eq!(report.listed, 3);
    assert_eq!(report.added, 1);
    assert_eq!(report.known, 1);
    assert_eq!(report.unresolved, 1);

    let added = store.stored_coin("BBBUSDT");
    assert!(!added.is_palisade);
    assert_eq!(added.last_check, None);
    assert_eq!(added.base_size_precision, dec!(0.1));
    // Existing coin untouched
    assert!(store.stored_coin("AAAUSDT").is_palisade);
}
