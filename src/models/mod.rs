use crate::error::OrchestratorError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trading symbol, e.g. "ETH-USD"
pub type Symbol = String;

/// Base currency of a symbol ("ETH-USD" -> "ETH")
pub fn base_currency(symbol: &str) -> &str {
    symbol.split('-').next().unwrap_or(symbol)
}

/// Last traded price of a symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticker {
    pub symbol: Symbol,
    pub price: f64,
    pub time: DateTime<Utc>,
}

/// OHLCV candlestick data
///
/// The newest candle of a series is mutated in place until a newer bucket opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: Symbol,
    pub start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Candle with every price set to `price`
    pub fn flat(symbol: &str, start: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }
}

/// Bucket duration of a candle series
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum CandleSize {
    OneMinute,
    #[default]
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    OneDay,
}

impl CandleSize {
    pub const ALL: [CandleSize; 9] = [
        CandleSize::OneMinute,
        CandleSize::FiveMinutes,
        CandleSize::FifteenMinutes,
        CandleSize::ThirtyMinutes,
        CandleSize::OneHour,
        CandleSize::TwoHours,
        CandleSize::FourHours,
        CandleSize::SixHours,
        CandleSize::OneDay,
    ];

    pub fn seconds(&self) -> i64 {
        match self {
            CandleSize::OneMinute => 60,
            CandleSize::FiveMinutes => 5 * 60,
            CandleSize::FifteenMinutes => 15 * 60,
            CandleSize::ThirtyMinutes => 30 * 60,
            CandleSize::OneHour => 60 * 60,
            CandleSize::TwoHours => 2 * 60 * 60,
            CandleSize::FourHours => 4 * 60 * 60,
            CandleSize::SixHours => 6 * 60 * 60,
            CandleSize::OneDay => 24 * 60 * 60,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Upstream granularity token
    pub fn granularity(&self) -> &'static str {
        match self {
            CandleSize::OneMinute => "ONE_MINUTE",
            CandleSize::FiveMinutes => "FIVE_MINUTE",
            CandleSize::FifteenMinutes => "FIFTEEN_MINUTE",
            CandleSize::ThirtyMinutes => "THIRTY_MINUTE",
            CandleSize::OneHour => "ONE_HOUR",
            CandleSize::TwoHours => "TWO_HOUR",
            CandleSize::FourHours => "FOUR_HOUR",
            CandleSize::SixHours => "SIX_HOUR",
            CandleSize::OneDay => "ONE_DAY",
        }
    }

    /// Canonical companion size of the long series
    pub fn long_size(&self) -> CandleSize {
        match self {
            CandleSize::OneMinute => CandleSize::FifteenMinutes,
            CandleSize::FiveMinutes => CandleSize::ThirtyMinutes,
            CandleSize::FifteenMinutes => CandleSize::OneHour,
            CandleSize::ThirtyMinutes => CandleSize::TwoHours,
            CandleSize::OneHour => CandleSize::FourHours,
            CandleSize::TwoHours => CandleSize::SixHours,
            CandleSize::FourHours | CandleSize::SixHours | CandleSize::OneDay => {
                CandleSize::OneDay
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CandleSize::OneMinute => "1m",
            CandleSize::FiveMinutes => "5m",
            CandleSize::FifteenMinutes => "15m",
            CandleSize::ThirtyMinutes => "30m",
            CandleSize::OneHour => "1h",
            CandleSize::TwoHours => "2h",
            CandleSize::FourHours => "4h",
            CandleSize::SixHours => "6h",
            CandleSize::OneDay => "1d",
        }
    }
}

impl fmt::Display for CandleSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CandleSize {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let label = trimmed.strip_prefix("CandleSize").unwrap_or(trimmed);
        CandleSize::ALL
            .iter()
            .copied()
            .find(|size| size.label().eq_ignore_ascii_case(label) || size.granularity() == label)
            .ok_or_else(|| OrchestratorError::UnknownCandleSize(s.to_string()))
    }
}

impl TryFrom<String> for CandleSize {
    type Error = OrchestratorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CandleSize> for String {
    fn from(size: CandleSize) -> Self {
        size.to_string()
    }
}

/// Order side (long-only spot: BUY opens, SELL reduces)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// +1 for buys, -1 for sells
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl FromStr for Side {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(OrchestratorError::Protocol(format!("unknown order side {other}"))),
        }
    }
}

/// Order status as reported by the user stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Pending,
    Filled,
    Cancelled,
    Expired,
    Failed,
    Unknown(String),
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "OPEN" => OrderStatus::Open,
            "PENDING" => OrderStatus::Pending,
            "FILLED" => OrderStatus::Filled,
            "CANCELLED" => OrderStatus::Cancelled,
            "EXPIRED" => OrderStatus::Expired,
            "FAILED" => OrderStatus::Failed,
            _ => OrderStatus::Unknown(s.to_string()),
        }
    }
}

/// Order event from the user stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderUpdate {
    pub symbol: Symbol,
    pub order_id: String,
    pub status: OrderStatus,
    /// Cumulative base tokens filled
    pub filled_qty: f64,
    pub filled_value: f64,
    /// USD still outstanding on the order
    pub leaves: f64,
    pub price: f64,
    pub side: Side,
    pub time: DateTime<Utc>,
}

/// Exchange acknowledgement of an order submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderAck {
    pub order_id: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Trading signal type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

/// Trading signal with optional risk parameters attached on entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub symbol: Symbol,
    pub signal_type: SignalType,
    /// Share of allocated funds, 0..=100
    pub percent: f64,
    pub time: DateTime<Utc>,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub trailing_stop: Option<f64>,
    pub entry_price: Option<f64>,
    pub position_increase_threshold: Option<f64>,
    pub last_trailing_stop_price: Option<f64>,
}

impl Signal {
    fn new(symbol: &str, signal_type: SignalType, percent: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            signal_type,
            percent: percent.clamp(0.0, 100.0),
            time: Utc::now(),
            take_profit: None,
            stop_loss: None,
            trailing_stop: None,
            entry_price: None,
            position_increase_threshold: None,
            last_trailing_stop_price: None,
        }
    }

    pub fn hold(symbol: &str) -> Self {
        Self::new(symbol, SignalType::Hold, 0.0)
    }

    pub fn buy(symbol: &str, percent: f64) -> Self {
        Self::new(symbol, SignalType::Buy, percent)
    }

    pub fn sell(symbol: &str, percent: f64) -> Self {
        Self::new(symbol, SignalType::Sell, percent)
    }

    pub fn with_entry(mut self, price: f64) -> Self {
        self.entry_price = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    /// Trailing stop level plus the price it was last advanced from
    pub fn with_trailing_stop(mut self, stop: f64, anchor_price: f64) -> Self {
        self.trailing_stop = Some(stop);
        self.last_trailing_stop_price = Some(anchor_price);
        self
    }

    pub fn with_position_increase_threshold(mut self, price: f64) -> Self {
        self.position_increase_threshold = Some(price);
        self
    }

    pub fn is_hold(&self) -> bool {
        self.signal_type == SignalType::Hold
    }
}

/// Closed set of strategy implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StrategyKind {
    MeanReversion,
    TrendFollowing,
    CandlestickAggregation,
    RenkoCandlesticks,
    HeikenAshi,
    DonchianChannel,
    TurtleTrader,
    TrendlineBreakout,
    Supertrend,
    GroverLlorensActivator,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 10] = [
        StrategyKind::MeanReversion,
        StrategyKind::TrendFollowing,
        StrategyKind::CandlestickAggregation,
        StrategyKind::RenkoCandlesticks,
        StrategyKind::HeikenAshi,
        StrategyKind::DonchianChannel,
        StrategyKind::TurtleTrader,
        StrategyKind::TrendlineBreakout,
        StrategyKind::Supertrend,
        StrategyKind::GroverLlorensActivator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::MeanReversion => "MeanReversion",
            StrategyKind::TrendFollowing => "TrendFollowing",
            StrategyKind::CandlestickAggregation => "CandlestickAggregation",
            StrategyKind::RenkoCandlesticks => "RenkoCandlesticks",
            StrategyKind::HeikenAshi => "HeikenAshi",
            StrategyKind::DonchianChannel => "DonchianChannel",
            StrategyKind::TurtleTrader => "TurtleTrader",
            StrategyKind::TrendlineBreakout => "TrendlineBreakout",
            StrategyKind::Supertrend => "Supertrend",
            StrategyKind::GroverLlorensActivator => "GroverLlorensActivator",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| OrchestratorError::UnknownStrategy(s.to_string()))
    }
}

impl TryFrom<String> for StrategyKind {
    type Error = OrchestratorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StrategyKind> for String {
    fn from(kind: StrategyKind) -> Self {
        kind.to_string()
    }
}

/// Per-trader configuration pushed by the manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeCfg {
    pub symbol: Symbol,
    pub allocated_funds: f64,
    pub strategy: StrategyKind,
    pub candle_size: CandleSize,
}

/// Unrealised P/L reported by a trader
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfitLossUpdate {
    pub symbol: Symbol,
    pub profit_loss: f64,
    pub time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candle_size_long_mapping() {
        assert_eq!(CandleSize::FiveMinutes.long_size(), CandleSize::ThirtyMinutes);
        assert_eq!(CandleSize::OneHour.long_size(), CandleSize::FourHours);
        assert_eq!(CandleSize::SixHours.long_size(), CandleSize::OneDay);
        assert_eq!(CandleSize::OneDay.long_size(), CandleSize::OneDay);
    }

    #[test]
    fn test_candle_size_parsing() {
        assert_eq!("5m".parse::<CandleSize>().unwrap(), CandleSize::FiveMinutes);
        assert_eq!(
            "CandleSize1h".parse::<CandleSize>().unwrap(),
            CandleSize::OneHour
        );
        assert_eq!(
            "FIFTEEN_MINUTE".parse::<CandleSize>().unwrap(),
            CandleSize::FifteenMinutes
        );
        assert!("7m".parse::<CandleSize>().is_err());
        assert_eq!(CandleSize::TwoHours.to_string(), "2h");
        assert_eq!(CandleSize::TwoHours.granularity(), "TWO_HOUR");
    }

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!(
            "TurtleTrader".parse::<StrategyKind>().unwrap(),
            StrategyKind::TurtleTrader
        );
        let err = "Astrology".parse::<StrategyKind>().unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownStrategy(_)));
    }

    #[test]
    fn test_signal_percent_clamped() {
        let signal = Signal::buy("ETH-USD", 150.0);
        assert_eq!(signal.percent, 100.0);
        assert_eq!(signal.signal_type, SignalType::Buy);
        assert!(Signal::hold("ETH-USD").is_hold());
    }

    #[test]
    fn test_order_status_from_wire() {
        assert_eq!(OrderStatus::from("FILLED"), OrderStatus::Filled);
        assert_eq!(
            OrderStatus::from("QUEUED"),
            OrderStatus::Unknown("QUEUED".to_string())
        );
    }

    #[test]
    fn test_base_currency() {
        assert_eq!(base_currency("ETH-USD"), "ETH");
        assert_eq!(base_currency("BTC"), "BTC");
    }
}
