use crate::models::ProfitLossUpdate;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Daily profit/loss limit across every trader
///
/// Keeps the latest P/L reported by each symbol for the current UTC day and
/// trips once their sum exceeds the configured limit.
#[derive(Debug, Clone)]
pub struct DailyPnlGuard {
    max_pl: f64,
    day: NaiveDate,
    per_symbol: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PnlTrip {
    pub total: f64,
    pub limit: f64,
    pub day: NaiveDate,
}

impl DailyPnlGuard {
    pub fn new(max_pl: f64, now: DateTime<Utc>) -> Self {
        Self {
            max_pl,
            day: now.date_naive(),
            per_symbol: HashMap::new(),
        }
    }

    pub fn max_pl(&self) -> f64 {
        self.max_pl
    }

    pub fn set_max_pl(&mut self, max_pl: f64) {
        self.max_pl = max_pl;
    }

    /// Forget every report once the UTC date moves on
    pub fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day {
            tracing::info!(previous = %self.day, total = self.total(), "daily P/L reset");
            self.day = today;
            self.per_symbol.clear();
        }
    }

    pub fn record(&mut self, update: &ProfitLossUpdate, now: DateTime<Utc>) {
        self.roll_day(now);
        if update.time.date_naive() < self.day {
            return;
        }
        self.per_symbol
            .insert(update.symbol.clone(), update.profit_loss);
    }

    pub fn total(&self) -> f64 {
        self.per_symbol.values().sum()
    }

    pub fn symbol_pl(&self, symbol: &str) -> Option<f64> {
        self.per_symbol.get(symbol).copied()
    }

    pub fn check(&mut self, now: DateTime<Utc>) -> Result<(), PnlTrip> {
        self.roll_day(now);
        let total = self.total();
        if total > self.max_pl {
            return Err(PnlTrip {
                total,
                limit: self.max_pl,
                day: self.day,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn update(symbol: &str, profit_loss: f64, time: DateTime<Utc>) -> ProfitLossUpdate {
        ProfitLossUpdate {
            symbol: symbol.to_string(),
            profit_loss,
            time,
        }
    }

    #[test]
    fn test_trips_when_sum_exceeds_limit() {
        let mut guard = DailyPnlGuard::new(100.0, at(9));
        guard.record(&update("A-USD", 60.0, at(9)), at(9));
        guard.record(&update("B-USD", 40.0, at(9)), at(9));
        assert!(guard.check(at(9)).is_ok());

        guard.record(&update("B-USD", 41.0, at(10)), at(10));
        let trip = guard.check(at(10)).unwrap_err();
        assert_eq!(trip.total, 101.0);
        assert_eq!(trip.limit, 100.0);
    }

    #[test]
    fn test_latest_report_per_symbol_wins() {
        let mut guard = DailyPnlGuard::new(100.0, at(9));
        guard.record(&update("A-USD", 90.0, at(9)), at(9));
        guard.record(&update("A-USD", 10.0, at(9)), at(9));

        assert_eq!(guard.total(), 10.0);
        assert_eq!(guard.symbol_pl("A-USD"), Some(10.0));
    }

    #[test]
    fn test_resets_at_utc_midnight() {
        let mut guard = DailyPnlGuard::new(100.0, at(23));
        guard.record(&update("A-USD", 150.0, at(23)), at(23));
        assert!(guard.check(at(23)).is_err());

        let tomorrow = at(23) + Duration::hours(2);
        assert!(guard.check(tomorrow).is_ok());
        assert_eq!(guard.total(), 0.0);

        // a report stamped yesterday arriving late is dropped
        guard.record(&update("A-USD", 150.0, at(23)), tomorrow);
        assert_eq!(guard.total(), 0.0);
    }

    #[test]
    fn test_raising_limit_clears_trip() {
        let mut guard = DailyPnlGuard::new(100.0, at(9));
        guard.record(&update("A-USD", 150.0, at(9)), at(9));
        assert!(guard.check(at(9)).is_err());

        guard.set_max_pl(200.0);
        assert!(guard.check(at(9)).is_ok());
        assert_eq!(guard.max_pl(), 200.0);
    }
}
