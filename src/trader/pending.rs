use crate::models::Side;
use chrono::{DateTime, Utc};
use serde::Serialize;

const RESOLVED_EPSILON: f64 = 1e-9;

/// The single outstanding order of a trader
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingOrder {
    pub order_id: String,
    pub submit_time: DateTime<Utc>,
    pub side: Side,
    pub original_usd: f64,
    pub remaining_usd: f64,
    pub filled_usd: f64,
    pub original_tokens: f64,
    pub filled_tokens: f64,
}

/// Increment produced by one fill report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillDelta {
    pub usd: f64,
    pub tokens: f64,
}

impl PendingOrder {
    pub fn new(order_id: String, side: Side, usd: f64, price: f64) -> Self {
        let original_tokens = if price > 0.0 { usd / price } else { 0.0 };
        Self {
            order_id,
            submit_time: Utc::now(),
            side,
            original_usd: usd,
            remaining_usd: usd,
            filled_usd: 0.0,
            original_tokens,
            filled_tokens: 0.0,
        }
    }

    /// Fold a cumulative fill report into the order
    ///
    /// `leaves` is the USD still open and `cumulative_tokens` the total filled
    /// so far. Stale or repeated reports yield `None`; filled amounts never
    /// move backwards.
    pub fn apply_fill(&mut self, leaves: f64, cumulative_tokens: f64) -> Option<FillDelta> {
        let filled_usd = (self.original_usd - leaves).clamp(0.0, self.original_usd);
        let usd = (filled_usd - self.filled_usd).max(0.0);
        let tokens = (cumulative_tokens - self.filled_tokens).max(0.0);

        if usd <= 0.0 && tokens <= 0.0 {
            return None;
        }

        self.filled_usd += usd;
        self.filled_tokens += tokens;
        self.remaining_usd = (self.original_usd - self.filled_usd).max(0.0);

        Some(FillDelta { usd, tokens })
    }

    pub fn is_resolved(&self) -> bool {
        self.remaining_usd <= RESOLVED_EPSILON
    }

    /// Remaining USD signed by side: positive for buys, negative for sells
    pub fn signed_remaining(&self) -> f64 {
        self.side.sign() * self.remaining_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_then_full_fill() {
        let mut order = PendingOrder::new("o-1".to_string(), Side::Buy, 500.0, 100.0);
        assert_eq!(order.original_tokens, 5.0);

        let first = order.apply_fill(300.0, 2.0).unwrap();
        assert_eq!(first, FillDelta { usd: 200.0, tokens: 2.0 });
        assert_eq!(order.remaining_usd, 300.0);
        assert!(!order.is_resolved());

        let second = order.apply_fill(0.0, 5.0).unwrap();
        assert_eq!(second, FillDelta { usd: 300.0, tokens: 3.0 });
        assert!(order.is_resolved());
        assert!(order.filled_usd + order.remaining_usd <= order.original_usd);
    }

    #[test]
    fn test_repeated_report_is_ignored() {
        let mut order = PendingOrder::new("o-1".to_string(), Side::Sell, 100.0, 10.0);
        order.apply_fill(50.0, 5.0).unwrap();

        assert!(order.apply_fill(50.0, 5.0).is_none());
        // out of order report cannot unwind fills
        assert!(order.apply_fill(80.0, 2.0).is_none());
        assert_eq!(order.filled_usd, 50.0);
        assert_eq!(order.filled_tokens, 5.0);
        assert_eq!(order.signed_remaining(), -50.0);
    }

    #[test]
    fn test_zero_price_has_no_token_estimate() {
        let order = PendingOrder::new("o-1".to_string(), Side::Buy, 100.0, 0.0);
        assert_eq!(order.original_tokens, 0.0);
        assert_eq!(order.signed_remaining(), 100.0);
    }
}
