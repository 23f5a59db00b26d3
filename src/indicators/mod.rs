// Candle windows and flat-range detection

pub mod candle_window;
pub mod flat;

pub use candle_window::{CandleWindow, DEFAULT_WINDOW_HOURS};
pub use flat::{analyze_flat, price_in_range, DEFAULT_MAX_VOLATILITY_PERCENT};
