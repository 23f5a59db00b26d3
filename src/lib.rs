// Core modules
pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod notify;

// Re-export commonly used types
pub use api::ExchangeClient;
pub use error::Error;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
