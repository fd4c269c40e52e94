// Price-action store module
// Aggregates the inbound candle cadence into per-symbol primary and long series

pub mod aggregator;
pub mod history;
pub mod price_action;
pub mod views;

pub use aggregator::{align_to_bucket, InboundTracker, Series};
pub use history::{CandleHistory, PriceHistory, CANDLE_HISTORY_CAPACITY, PRICE_HISTORY_CAPACITY};
pub use price_action::PriceActionStore;
pub use views::{heiken_ashi, renko_bricks};
