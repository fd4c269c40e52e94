/// Candlestick pattern tables (25 bullish, 25 bearish, 34 neutral)
///
/// Each table is a fixed list of detectors evaluated on the latest bar,
/// paired with a strength from 1 to 10.

use super::helpers::{
    body_size, candle_range, is_bearish, is_bullish, is_doji, is_engulfing, is_gap_down,
    is_gap_up, is_harami_strict, is_long_body, is_long_shadow, is_marubozu, is_small_body,
    lower_shadow, upper_shadow,
};
use crate::models::Candle;

pub const LONG_BODY_ATR_MULT: f64 = 0.8;
pub const SMALL_BODY_ATR_MULT: f64 = 0.3;

pub const BULLISH_NAMES: [&str; 25] = [
    "Hammer",
    "Bullish Engulfing",
    "Piercing Line",
    "Morning Star",
    "Three White Soldiers",
    "Inverted Hammer",
    "Bullish Harami",
    "Rising Three",
    "Tweezer Bottom",
    "Bullish Marubozu",
    "Belt Hold Bull",
    "Matching Low",
    "Three Inside Up",
    "Kicking Bull",
    "Stick Sandwich",
    "Ladder Bottom",
    "Dragonfly Doji",
    "White Marubozu",
    "Three Line Strike Bull",
    "Abandoned Baby Bull",
    "Thrusting Line",
    "Meeting Lines Bull",
    "Separating Lines Bull",
    "Unique Three River Bottom",
    "Hook Reversal Bull",
];

pub const BULLISH_STRENGTHS: [f64; 25] = [
    8.0, 10.0, 8.0, 7.0, 9.0, 6.0, 6.0, 8.0, 6.0, 8.0, 6.0, 4.0, 7.0, 10.0, 6.0, 7.0, 8.0, 8.0,
    9.0, 10.0, 4.0, 4.0, 6.0, 8.0, 6.0,
];

pub const BEARISH_NAMES: [&str; 25] = [
    "Hanging Man",
    "Bearish Engulfing",
    "Dark Cloud Cover",
    "Evening Star",
    "Three Black Crows",
    "Gravestone Doji",
    "Shooting Star",
    "Bearish Harami",
    "Falling Three",
    "Tweezer Top",
    "Bearish Marubozu",
    "Belt Hold Bear",
    "Matching High",
    "Three Inside Down",
    "Kicking Bear",
    "Deliberation",
    "Descending Hawk",
    "Downside Tasuki Gap",
    "Upside Gap Two Crows",
    "Black Marubozu",
    "Dark Cloud Cover (Weakened)",
    "Meeting Lines Bear",
    "Separating Lines Bear",
    "Concealing Baby Swallow",
    "Hook Reversal Bear",
];

pub const BEARISH_STRENGTHS: [f64; 25] = [
    8.0, 10.0, 8.0, 7.0, 9.0, 8.0, 6.0, 6.0, 8.0, 6.0, 8.0, 6.0, 4.0, 7.0, 10.0, 4.0, 4.0, 6.0,
    8.0, 8.0, 6.0, 4.0, 6.0, 8.0, 6.0,
];

pub const NEUTRAL_NAMES: [&str; 34] = [
    "Doji",
    "Long-Legged Doji",
    "Four-Price Doji",
    "Spinning Top",
    "Gapping Doji",
    "Harami Cross Bull",
    "Harami Cross Bear",
    "Upside Tasuki Gap",
    "On-Neck Line",
    "In-Neck Line",
    "Three-Bar Inside Bull",
    "Three-Bar Inside Bear",
    "Homing Pigeon",
    "Last Engulfing Bottom",
    "Last Engulfing Top",
    "Counterattack Bull",
    "Counterattack Bear",
    "Three Stars in the South",
    "Three Stars in the North",
    "Squeeze Alert",
    "Stalled Pattern",
    "Upside Gap Three",
    "Downside Gap Three",
    "Engulfing Doji",
    "High-Wave Candle",
    "One-Bar Reversal Bull",
    "One-Bar Reversal Bear",
    "Three Gap Up",
    "Three Gap Down",
    "Two Crows",
    "Morning Doji Star",
    "Evening Doji Star",
    "Advancing Block",
    "Kicking (Indecision)",
];

pub const NEUTRAL_STRENGTHS: [f64; 34] = [
    5.0, 4.0, 2.0, 4.0, 4.0, 8.0, 8.0, 4.0, 4.0, 4.0, 3.0, 3.0, 6.0, 4.0, 4.0, 4.0, 4.0, 2.0, 4.0,
    2.0, 4.0, 8.0, 8.0, 6.0, 4.0, 3.0, 3.0, 3.0, 3.0, 4.0, 7.0, 7.0, 6.0, 5.0,
];

/// The five most recent candles, addressed by bars-ago
pub struct Bars<'a> {
    candles: &'a [Candle],
    atr: f64,
    mintick: f64,
}

impl<'a> Bars<'a> {
    pub const LOOKBACK: usize = 5;

    /// `None` when fewer than five candles are available
    pub fn new(candles: &'a [Candle], atr: f64) -> Option<Self> {
        let last = candles.last()?;
        if candles.len() < Self::LOOKBACK {
            return None;
        }
        Some(Self {
            candles,
            atr,
            mintick: (last.close * 0.0005).max(0.01),
        })
    }

    fn bar(&self, ago: usize) -> &Candle {
        &self.candles[self.candles.len() - 1 - ago]
    }

    fn o(&self, ago: usize) -> f64 {
        self.bar(ago).open
    }

    fn h(&self, ago: usize) -> f64 {
        self.bar(ago).high
    }

    fn l(&self, ago: usize) -> f64 {
        self.bar(ago).low
    }

    fn c(&self, ago: usize) -> f64 {
        self.bar(ago).close
    }

    fn bull(&self, ago: usize) -> bool {
        is_bullish(self.bar(ago))
    }

    fn bear(&self, ago: usize) -> bool {
        is_bearish(self.bar(ago))
    }

    fn body(&self, ago: usize) -> f64 {
        body_size(self.bar(ago))
    }

    fn range(&self, ago: usize) -> f64 {
        candle_range(self.bar(ago))
    }

    fn upper(&self, ago: usize) -> f64 {
        upper_shadow(self.bar(ago))
    }

    fn lower(&self, ago: usize) -> f64 {
        lower_shadow(self.bar(ago))
    }

    fn small(&self, ago: usize, range_pct: f64) -> bool {
        is_small_body(self.bar(ago), self.atr, SMALL_BODY_ATR_MULT, range_pct)
    }

    fn long(&self, ago: usize) -> bool {
        is_long_body(self.bar(ago), self.atr, LONG_BODY_ATR_MULT, 0.6)
    }

    fn doji(&self, ago: usize) -> bool {
        is_doji(self.bar(ago), self.atr, SMALL_BODY_ATR_MULT, 0.1)
    }

    fn marubozu(&self, ago: usize) -> bool {
        is_marubozu(self.bar(ago), 0.05)
    }

    fn harami(&self, ago: usize) -> bool {
        is_harami_strict(self.bar(ago), self.bar(ago + 1))
    }

    fn engulfing(&self, ago: usize) -> bool {
        is_engulfing(self.bar(ago), self.bar(ago + 1))
    }

    fn gap_up(&self, ago: usize) -> bool {
        is_gap_up(self.bar(ago), self.bar(ago + 1))
    }

    fn gap_down(&self, ago: usize) -> bool {
        is_gap_down(self.bar(ago), self.bar(ago + 1))
    }

    fn long_upper(&self, ago: usize, pct: f64) -> bool {
        is_long_shadow(self.upper(ago), self.range(ago), pct)
    }

    fn long_lower(&self, ago: usize, pct: f64) -> bool {
        is_long_shadow(self.lower(ago), self.range(ago), pct)
    }

    fn midpoint(&self, ago: usize) -> f64 {
        (self.o(ago) + self.c(ago)) / 2.0
    }

    /// Closes within two ticks of each other
    fn closes_meet(&self, a: usize, b: usize) -> bool {
        (self.c(a) - self.c(b)).abs() / self.mintick < 2.0
    }

    fn bullish_harami(&self, ago: usize) -> bool {
        self.bear(ago + 1)
            && self.long(ago + 1)
            && self.bull(ago)
            && self.small(ago, 0.25)
            && self.harami(ago)
    }

    fn bearish_harami(&self, ago: usize) -> bool {
        self.bull(ago + 1)
            && self.long(ago + 1)
            && self.bear(ago)
            && self.small(ago, 0.25)
            && self.harami(ago)
    }

    fn hammer_shape(&self) -> bool {
        self.small(0, 0.2) && self.lower(0) > 2.0 * self.body(0) && self.upper(0) < 0.1 * self.range(0)
    }

    fn inverted_hammer_shape(&self) -> bool {
        self.small(0, 0.2) && self.upper(0) > 2.0 * self.body(0) && self.lower(0) < 0.1 * self.range(0)
    }
}

pub fn bullish_patterns(b: &Bars) -> [bool; 25] {
    let marubozu_bull = b.marubozu(0) && b.bull(0);

    [
        // Hammer
        b.bear(0) && b.hammer_shape(),
        // Bullish Engulfing
        b.bear(1) && b.bull(0) && b.engulfing(0),
        // Piercing Line
        b.bear(1)
            && b.long(1)
            && b.bull(0)
            && b.o(0) < b.l(1)
            && b.c(0) > b.midpoint(1)
            && b.c(0) < b.o(1),
        // Morning Star
        b.bear(2)
            && b.long(2)
            && b.small(1, 0.2)
            && b.o(1) < b.c(2)
            && b.bull(0)
            && b.long(0)
            && b.c(0) > b.midpoint(2),
        // Three White Soldiers
        b.bull(2)
            && b.bull(1)
            && b.bull(0)
            && b.c(1) > b.c(2)
            && b.c(0) > b.c(1)
            && b.o(1) > b.o(2)
            && b.o(0) > b.o(1)
            && b.o(0) < b.c(1),
        // Inverted Hammer
        b.bear(0) && b.inverted_hammer_shape(),
        // Bullish Harami
        b.bullish_harami(0),
        // Rising Three
        b.bull(4)
            && b.long(4)
            && b.bear(3)
            && b.bear(2)
            && b.bear(1)
            && b.c(1) > b.o(4)
            && b.bull(0)
            && b.long(0)
            && b.c(0) > b.h(4),
        // Tweezer Bottom
        b.l(1) == b.l(0) && b.bear(1) && b.bull(0),
        // Bullish Marubozu
        marubozu_bull,
        // Belt Hold Bull
        b.bull(0) && b.long(0) && b.o(0) == b.l(0),
        // Matching Low
        b.bear(1)
            && b.small(1, 0.2)
            && b.bear(0)
            && b.small(0, 0.2)
            && b.c(0) == b.c(1)
            && b.l(0) == b.l(1),
        // Three Inside Up
        b.bear(2) && b.long(2) && b.bullish_harami(1) && b.bull(0) && b.c(0) > b.c(2),
        // Kicking Bull
        b.marubozu(1) && b.bear(1) && marubozu_bull && b.gap_up(0),
        // Stick Sandwich
        b.bear(2) && b.bear(1) && b.bull(0) && b.c(0) == b.c(2) && b.c(0) < b.c(1),
        // Ladder Bottom
        b.bear(4)
            && b.bear(3)
            && b.bear(2)
            && b.bear(1)
            && b.small(1, 0.2)
            && b.o(1) < b.c(2)
            && b.bull(0)
            && b.long(0),
        // Dragonfly Doji
        b.doji(0) && b.lower(0) > 5.0 * b.body(0) && b.upper(0) < 0.1 * b.body(0),
        // White Marubozu
        marubozu_bull,
        // Three Line Strike Bull
        b.bear(3)
            && b.bear(2)
            && b.bear(1)
            && b.c(1) < b.c(2)
            && b.c(2) < b.c(3)
            && b.bull(0)
            && b.long(0)
            && b.c(0) > b.o(3),
        // Abandoned Baby Bull
        b.bear(2)
            && b.long(2)
            && b.doji(1)
            && b.l(1) < b.l(2)
            && b.h(1) < b.c(2)
            && b.bull(0)
            && b.long(0)
            && b.o(0) > b.h(1)
            && b.o(0) > b.c(2),
        // Thrusting Line
        b.bear(1)
            && b.long(1)
            && b.bull(0)
            && b.o(0) < b.c(1)
            && b.c(0) > b.c(1)
            && b.c(0) < b.midpoint(1),
        // Meeting Lines Bull
        b.bear(1) && b.bull(0) && b.closes_meet(0, 1),
        // Separating Lines Bull
        b.bull(1) && b.long(1) && b.bull(0) && b.long(0) && b.o(0) == b.o(1) && b.o(0) > b.c(1),
        // Unique Three River Bottom
        b.bear(2)
            && b.bear(1)
            && b.l(1) < b.l(2)
            && b.bull(0)
            && b.o(0) > b.l(1)
            && b.o(0) < b.c(1)
            && b.c(0) < b.o(1)
            && b.l(0) == b.l(1),
        // Hook Reversal Bull
        b.bull(1)
            && b.long(1)
            && b.bull(0)
            && b.small(0, 0.25)
            && b.o(0) > b.c(1)
            && b.o(0) < b.o(1)
            && b.c(0) > b.h(1),
    ]
}

pub fn bearish_patterns(b: &Bars) -> [bool; 25] {
    let marubozu_bear = b.marubozu(0) && b.bear(0);

    [
        // Hanging Man
        b.bull(0) && b.hammer_shape(),
        // Bearish Engulfing
        b.bull(1) && b.bear(0) && b.engulfing(0),
        // Dark Cloud Cover
        b.bull(1)
            && b.long(1)
            && b.bear(0)
            && b.o(0) > b.h(1)
            && b.c(0) < b.midpoint(1)
            && b.c(0) > b.o(1),
        // Evening Star
        b.bull(2)
            && b.long(2)
            && b.small(1, 0.2)
            && b.o(1) > b.c(2)
            && b.bear(0)
            && b.long(0)
            && b.c(0) < b.midpoint(2),
        // Three Black Crows
        b.bear(2)
            && b.bear(1)
            && b.bear(0)
            && b.c(1) < b.c(2)
            && b.c(0) < b.c(1)
            && b.o(0) < b.o(2)
            && b.o(1) < b.o(2)
            && b.o(0) > b.c(1),
        // Gravestone Doji
        b.doji(0) && b.upper(0) > 5.0 * b.body(0) && b.lower(0) < 0.1 * b.body(0),
        // Shooting Star
        b.bull(0) && b.inverted_hammer_shape(),
        // Bearish Harami
        b.bearish_harami(0),
        // Falling Three
        b.bear(4)
            && b.long(4)
            && b.bull(3)
            && b.bull(2)
            && b.bull(1)
            && b.c(1) < b.o(4)
            && b.bear(0)
            && b.long(0)
            && b.c(0) < b.l(4),
        // Tweezer Top
        b.h(1) == b.h(0) && b.bull(1) && b.bear(0),
        // Bearish Marubozu
        marubozu_bear,
        // Belt Hold Bear
        b.bear(0) && b.long(0) && b.o(0) == b.h(0),
        // Matching High
        b.bull(1)
            && b.small(1, 0.2)
            && b.bull(0)
            && b.small(0, 0.2)
            && b.c(0) == b.c(1)
            && b.h(0) == b.h(1),
        // Three Inside Down
        b.bull(2) && b.long(2) && b.bearish_harami(1) && b.bear(0) && b.c(0) < b.c(2),
        // Kicking Bear
        b.marubozu(1) && b.bull(1) && marubozu_bear && b.gap_down(0),
        // Deliberation
        b.bull(2)
            && b.bull(1)
            && b.small(1, 0.2)
            && b.o(0) > b.o(2)
            && b.c(0) > b.c(2)
            && b.small(0, 0.2),
        // Descending Hawk
        b.bull(1) && b.bear(0) && b.h(0) == b.h(1) && b.l(0) < b.l(1),
        // Downside Tasuki Gap
        b.bear(2)
            && b.long(2)
            && b.bear(1)
            && b.long(1)
            && b.o(1) < b.c(2)
            && b.bull(0)
            && b.small(0, 0.2)
            && b.o(0) > b.c(1)
            && b.o(0) < b.o(1)
            && b.c(0) > b.o(1)
            && b.c(0) < b.c(2),
        // Upside Gap Two Crows
        b.bull(2)
            && b.long(2)
            && b.bear(1)
            && b.small(1, 0.2)
            && b.o(1) > b.h(2)
            && b.bear(0)
            && b.c(0) < b.o(1)
            && b.o(0) < b.c(2),
        // Black Marubozu
        marubozu_bear,
        // Dark Cloud Cover (Weakened)
        b.bull(1)
            && b.long(1)
            && b.bear(0)
            && b.long(0)
            && b.o(0) > b.h(1)
            && b.c(0) <= b.midpoint(1)
            && b.c(0) > 0.75 * b.o(1) + 0.25 * b.c(1),
        // Meeting Lines Bear
        b.bull(1) && b.bear(0) && b.closes_meet(0, 1),
        // Separating Lines Bear
        b.bear(1) && b.long(1) && b.bear(0) && b.long(0) && b.o(0) == b.o(1) && b.o(0) < b.c(1),
        // Concealing Baby Swallow
        b.marubozu(3)
            && b.bear(3)
            && b.marubozu(2)
            && b.bear(2)
            && b.bear(1)
            && b.o(1) < b.l(2)
            && b.bear(0)
            && b.long(0)
            && b.o(0) < b.c(1),
        // Hook Reversal Bear
        b.bull(1)
            && b.long(1)
            && b.bear(0)
            && b.small(0, 0.25)
            && b.o(0) < b.c(1)
            && b.o(0) > b.o(1)
            && b.c(0) < b.l(1),
    ]
}

pub fn neutral_patterns(b: &Bars) -> [bool; 34] {
    let doji = b.doji(0);

    [
        // Doji
        doji,
        // Long-Legged Doji
        doji && (b.long_upper(0, 0.3) || b.long_lower(0, 0.3)),
        // Four-Price Doji
        b.o(0) == b.h(0) && b.o(0) == b.l(0) && b.o(0) == b.c(0),
        // Spinning Top
        b.small(0, 0.25) && b.long_upper(0, 0.2) && b.long_lower(0, 0.2),
        // Gapping Doji
        doji && (b.gap_up(0) || b.gap_down(0)),
        // Harami Cross Bull
        b.bull(1) && b.long(1) && doji && b.harami(0),
        // Harami Cross Bear
        b.bear(1) && b.long(1) && doji && b.harami(0),
        // Upside Tasuki Gap
        b.bull(2)
            && b.bull(1)
            && b.o(1) > b.h(2)
            && b.bear(0)
            && b.small(0, 0.25)
            && b.o(0) < b.c(1)
            && b.o(0) > b.o(1)
            && b.c(0) > b.o(1)
            && b.c(0) < b.c(2),
        // On-Neck Line
        b.bear(1)
            && b.long(1)
            && b.bull(0)
            && b.small(0, 0.25)
            && b.o(0) < b.l(1)
            && b.closes_meet(0, 1),
        // In-Neck Line
        b.bear(1)
            && b.long(1)
            && b.bull(0)
            && b.small(0, 0.25)
            && b.o(0) < b.l(1)
            && b.c(0) > b.c(1)
            && b.c(0) < b.c(1) + b.body(1) * 0.1,
        // Three-Bar Inside Bull
        b.bull(2) && b.bull(1) && b.o(1) > b.o(2) && b.c(1) < b.c(2) && b.bull(0),
        // Three-Bar Inside Bear
        b.bear(2) && b.bear(1) && b.o(1) < b.o(2) && b.c(1) > b.c(2) && b.bear(0),
        // Homing Pigeon
        b.bear(1) && b.long(1) && b.bull(0) && b.small(0, 0.25) && b.harami(0),
        // Last Engulfing Bottom
        b.bull(1) && b.bear(0) && b.engulfing(0),
        // Last Engulfing Top
        b.bear(1) && b.bull(0) && b.engulfing(0),
        // Counterattack Bull
        b.bear(1) && b.long(1) && b.bull(0) && b.long(0) && b.closes_meet(0, 1),
        // Counterattack Bear
        b.bull(1) && b.long(1) && b.bear(0) && b.long(0) && b.closes_meet(0, 1),
        // Three Stars in the South
        b.doji(2)
            && b.doji(1)
            && doji
            && b.long_upper(2, 0.3)
            && b.long_upper(1, 0.3)
            && b.long_upper(0, 0.3),
        // Three Stars in the North
        b.doji(2)
            && b.doji(1)
            && doji
            && b.long_lower(2, 0.3)
            && b.long_lower(1, 0.3)
            && b.long_lower(0, 0.3),
        // Squeeze Alert
        b.small(0, 0.1) && b.long_upper(0, 0.4) && b.long_lower(0, 0.4),
        // Stalled Pattern
        b.bull(2)
            && b.long(2)
            && b.bull(1)
            && b.long(1)
            && b.bull(0)
            && b.small(0, 0.15)
            && b.long_upper(0, 0.5),
        // Upside Gap Three
        b.bull(3)
            && b.long(3)
            && b.bull(2)
            && b.o(2) > b.h(3)
            && b.bull(1)
            && b.o(1) > b.h(2)
            && b.bull(0)
            && b.c(0) > b.h(3),
        // Downside Gap Three
        b.bear(3)
            && b.long(3)
            && b.bear(2)
            && b.o(2) < b.l(3)
            && b.bear(1)
            && b.o(1) < b.l(2)
            && b.bear(0)
            && b.c(0) < b.l(3),
        // Engulfing Doji
        doji
            && ((b.o(0) < b.o(1) && b.c(0) > b.c(1)) || (b.o(0) > b.o(1) && b.c(0) < b.c(1)))
            && b.h(0) > b.o(1).max(b.c(1))
            && b.l(0) < b.o(1).min(b.c(1)),
        // High-Wave Candle
        b.small(0, 0.1) && b.long_upper(0, 0.3) && b.long_lower(0, 0.3),
        // One-Bar Reversal Bull
        b.bull(0) && b.small(0, 0.1) && b.o(0) > b.h(1),
        // One-Bar Reversal Bear
        b.bear(0) && b.small(0, 0.1) && b.o(0) < b.l(1),
        // Three Gap Up
        b.bull(2) && b.o(2) > b.h(3) && b.bull(1) && b.o(1) > b.h(2) && b.bull(0) && b.o(0) > b.h(1),
        // Three Gap Down
        b.bear(2) && b.o(2) < b.l(3) && b.bear(1) && b.o(1) < b.l(2) && b.bear(0) && b.o(0) < b.l(1),
        // Two Crows
        b.bull(2)
            && b.long(2)
            && b.bear(1)
            && b.small(1, 0.2)
            && b.bear(0)
            && b.o(0) > b.c(1)
            && b.o(0) < b.o(1)
            && b.c(0) < b.o(1),
        // Morning Doji Star
        b.bear(2)
            && b.long(2)
            && b.doji(1)
            && b.o(1) < b.l(2)
            && b.bull(0)
            && b.o(0) > b.o(1)
            && b.c(0) > b.midpoint(2),
        // Evening Doji Star
        b.bull(2)
            && b.long(2)
            && b.doji(1)
            && b.o(1) > b.h(2)
            && b.bear(0)
            && b.o(0) < b.o(1)
            && b.c(0) < b.midpoint(2),
        // Advancing Block
        b.bull(2)
            && b.bull(1)
            && b.bull(0)
            && b.o(1) > b.o(2)
            && b.o(1) < b.c(2)
            && b.o(0) > b.o(1)
            && b.o(0) < b.c(1)
            && b.body(0) < b.body(1),
        // Kicking (Indecision): opposite marubozus back to back
        (b.marubozu(1) && b.bull(1) && b.marubozu(0) && b.bear(0) && b.gap_up(0))
            || (b.marubozu(1) && b.bear(1) && b.marubozu(0) && b.bull(0) && b.gap_down(0)),
    ]
}

/// Mean strength of the fired patterns that are at least `min_strength`
///
/// Returns 0 when none qualify.
pub fn average_strength(hits: &[bool], strengths: &[f64], min_strength: f64) -> f64 {
    let (count, sum) = hits
        .iter()
        .zip(strengths)
        .filter(|(&hit, &strength)| hit && strength >= min_strength)
        .fold((0usize, 0.0), |(count, sum), (_, &strength)| (count + 1, sum + strength));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Names of the fired patterns, for logging
pub fn fired<'n>(hits: &[bool], names: &[&'n str]) -> Vec<&'n str> {
    hits.iter()
        .zip(names)
        .filter(|(&hit, _)| hit)
        .map(|(_, &name)| name)
        .collect()
}
