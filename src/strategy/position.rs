use crate::models::{Signal, SignalType};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Per-symbol position bookkeeping owned by a strategy
///
/// Zero means "not set" for every price level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PositionState {
    pub in_position: bool,
    pub side: Option<SignalType>,
    pub entry_price: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub trailing_stop: f64,
    pub last_trailing_stop_price: f64,
    pub position_increase_threshold: f64,
}

impl PositionState {
    pub fn take_profit_hit(&self, price: f64) -> bool {
        self.take_profit > 0.0 && price >= self.take_profit
    }

    pub fn stop_loss_hit(&self, price: f64) -> bool {
        self.stop_loss > 0.0 && price <= self.stop_loss
    }

    pub fn trailing_stop_hit(&self, price: f64) -> bool {
        self.trailing_stop > 0.0 && price <= self.trailing_stop
    }

    pub fn increase_threshold_hit(&self, price: f64) -> bool {
        self.position_increase_threshold > 0.0 && price >= self.position_increase_threshold
    }
}

/// Map of symbol to position state, shared by every strategy variant
#[derive(Debug, Default)]
pub struct PositionHolder {
    states: Mutex<HashMap<String, PositionState>>,
}

impl PositionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PositionState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of a symbol's state (flat when never confirmed)
    pub fn get(&self, symbol: &str) -> PositionState {
        self.lock().get(symbol).copied().unwrap_or_default()
    }

    pub fn in_position(&self, symbol: &str) -> bool {
        self.get(symbol).in_position
    }

    /// Record a signal the trader actually received
    ///
    /// BUY opens (or scales) the position from the signal's levels; any
    /// other type clears it. The signal engine never delivers HOLD.
    pub fn confirm(&self, symbol: &str, signal: &Signal) {
        let mut states = self.lock();
        match signal.signal_type {
            SignalType::Buy => {
                states.insert(
                    symbol.to_string(),
                    PositionState {
                        in_position: true,
                        side: Some(SignalType::Buy),
                        entry_price: signal.entry_price.unwrap_or(0.0),
                        take_profit: signal.take_profit.unwrap_or(0.0),
                        stop_loss: signal.stop_loss.unwrap_or(0.0),
                        trailing_stop: signal.trailing_stop.unwrap_or(0.0),
                        last_trailing_stop_price: signal.last_trailing_stop_price.unwrap_or(0.0),
                        position_increase_threshold: signal
                            .position_increase_threshold
                            .unwrap_or(0.0),
                    },
                );
            }
            SignalType::Sell | SignalType::Hold => {
                states.insert(symbol.to_string(), PositionState::default());
            }
        }
    }

    /// Ratchet the trailing stop up by however far price has risen
    pub fn update_trailing_stop(&self, symbol: &str, price: f64) {
        let mut states = self.lock();
        if let Some(state) = states.get_mut(symbol) {
            if state.in_position
                && state.trailing_stop != 0.0
                && price > state.last_trailing_stop_price
            {
                state.trailing_stop += price - state.last_trailing_stop_price;
                state.last_trailing_stop_price = price;
            }
        }
    }

    pub fn remove(&self, symbol: &str) {
        self.lock().remove(symbol);
    }
}
