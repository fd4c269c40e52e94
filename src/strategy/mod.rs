// Trading strategy module
pub mod candlestick_aggregation;
pub mod donchian;
pub mod grover_llorens;
pub mod heiken_ashi;
pub mod helpers;
pub mod mean_reversion;
pub mod patterns;
pub mod position;
pub mod renko;
pub mod supertrend;
pub mod trend_following;
pub mod trendline_breakout;
pub mod turtle;

pub use candlestick_aggregation::{CandlestickAggregationConfig, CandlestickAggregationStrategy};
pub use donchian::{DonchianConfig, DonchianStrategy};
pub use grover_llorens::{GroverLlorensConfig, GroverLlorensStrategy};
pub use heiken_ashi::{HeikenAshiConfig, HeikenAshiStrategy};
pub use mean_reversion::{MeanReversionConfig, MeanReversionStrategy};
pub use position::{PositionHolder, PositionState};
pub use renko::{RenkoConfig, RenkoStrategy};
pub use supertrend::{SupertrendConfig, SupertrendStrategy};
pub use trend_following::{TrendFollowingConfig, TrendFollowingStrategy};
pub use trendline_breakout::{TrendlineBreakoutConfig, TrendlineBreakoutStrategy};
pub use turtle::{PredictionUnit, TurtleConfig, TurtleStrategy};

use crate::models::{Signal, StrategyKind, Ticker};
use crate::store::PriceActionStore;
use std::sync::Arc;

/// Base trait for all trading strategies
///
/// `calculate_signal` never mutates position state. Entry levels travel on
/// the returned signal and land in the [`PositionHolder`] only once the
/// signal engine confirms the trader received it.
pub trait Strategy: Send + Sync {
    /// Evaluate the latest store snapshot for `symbol`
    fn calculate_signal(&self, symbol: &str, store: &PriceActionStore) -> Signal;

    /// Position bookkeeping consulted for exits and scale-ins
    fn positions(&self) -> &PositionHolder;

    fn kind(&self) -> StrategyKind;

    /// Get strategy name
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;

    fn confirm_signal_delivered(&self, symbol: &str, signal: &Signal) {
        self.positions().confirm(symbol, signal);
    }

    fn update_trailing_stop(&self, symbol: &str, ticker: &Ticker) {
        self.positions().update_trailing_stop(symbol, ticker.price);
    }

    /// Forget everything known about a symbol
    fn reset_symbol(&self, symbol: &str) {
        self.positions().remove(symbol);
    }
}

/// Build a strategy with its default parameters
pub fn build_strategy(kind: StrategyKind) -> Arc<dyn Strategy> {
    match kind {
        StrategyKind::MeanReversion => Arc::new(MeanReversionStrategy::default()),
        StrategyKind::TrendFollowing => Arc::new(TrendFollowingStrategy::default()),
        StrategyKind::CandlestickAggregation => {
            Arc::new(CandlestickAggregationStrategy::default())
        }
        StrategyKind::RenkoCandlesticks => Arc::new(RenkoStrategy::default()),
        StrategyKind::HeikenAshi => Arc::new(HeikenAshiStrategy::default()),
        StrategyKind::DonchianChannel => Arc::new(DonchianStrategy::default()),
        StrategyKind::TurtleTrader => Arc::new(TurtleStrategy::default()),
        StrategyKind::TrendlineBreakout => Arc::new(TrendlineBreakoutStrategy::default()),
        StrategyKind::Supertrend => Arc::new(SupertrendStrategy::default()),
        StrategyKind::GroverLlorensActivator => Arc::new(GroverLlorensStrategy::default()),
    }
}

/// HOLD for a symbol whose history is still too short
pub(crate) fn not_enough_history(
    strategy: &dyn Strategy,
    symbol: &str,
    have: usize,
    need: usize,
) -> Signal {
    tracing::debug!(
        strategy = strategy.name(),
        symbol,
        have,
        need,
        "not enough history"
    );
    Signal::hold(symbol)
}
