//! Error types shared by the screening and trading engine.

use rust_decimal::Decimal;
use thiserror::Error;

/// Exchange error code for an unknown trading pair.
pub const INVALID_SYMBOL_CODE: i64 = -1121;

/// Unified error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Exchange rejected the request with a classified error body.
    #[error("exchange error {code}: {message}")]
    Exchange { code: i64, message: String },

    /// Exchange answered without a classified error body. The request may
    /// or may not have taken effect.
    #[error("exchange unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The pair is unknown to the exchange.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Rounded order quantity is not tradable.
    #[error("invalid order quantity {quantity}")]
    InvalidQuantity { quantity: Decimal },

    /// Exchange payload could not be normalised into core types.
    #[error("unexpected exchange payload: {0}")]
    Decode(String),

    /// Coin is not present in the store.
    #[error("unknown coin {0}")]
    UnknownCoin(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Persistence error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but holds unusable values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Notification channel failure. Never fatal to a pass.
    #[error("notification failed: {0}")]
    Notify(String),

    /// An exchange action went through but its record could not be written.
    #[error("{action} succeeded on the exchange but was not persisted: {source}")]
    PostActionPersistence {
        action: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap a store failure that followed a successful exchange action.
    pub fn post_action(action: impl Into<String>, source: Error) -> Self {
        Error::PostActionPersistence {
            action: action.into(),
            source: Box::new(source),
        }
    }

    /// True when the exchange classified the request as targeting an unknown pair.
    pub fn is_invalid_symbol(&self) -> bool {
        match self {
            Error::InvalidSymbol(_) => true,
            Error::Exchange { code, message } => {
                *code == INVALID_SYMBOL_CODE || message.contains("Invalid symbol")
            }
            _ => false,
        }
    }

    /// True when the exchange definitely refused the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Exchange { .. } | Error::InvalidSymbol(_))
    }

    /// True for failures that must abort the invocation loudly.
    pub fn is_post_action(&self) -> bool {
        matches!(self, Error::PostActionPersistence { .. })
    }
}
