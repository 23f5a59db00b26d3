// Coin discovery and flat screening

pub mod screener;
pub mod universe;

pub use screener::{CoinScreener, ScreenOptions, ScreenOutcome, ScreenReport, SkipReason};
pub use universe::{CoinUniverseSync, SyncReport};
