// Core modules
pub mod channel;
pub mod config;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod manager;
pub mod models;
pub mod signaler;
pub mod store;
pub mod strategy;
pub mod trader;

// Re-export commonly used types
pub use error::{OrchestratorError, Result};
pub use exchange::Exchange;
pub use manager::Manager;
pub use models::*;
pub use strategy::Strategy;
