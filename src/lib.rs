// Core modules
pub mod backtest;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution;
pub mod features;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod strategy;
pub mod walk_forward;

// Re-export commonly used types
pub use error::{EngineError, EngineResult};
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
