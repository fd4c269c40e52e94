use crate::models::{Candle, Ticker};

/// Heiken-Ashi transform of a candle series
pub fn heiken_ashi(candles: &[Candle]) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());

    for candle in candles {
        let close = (candle.open + candle.high + candle.low + candle.close) / 4.0;
        let open = match out.last() {
            Some(prev) => (prev.open + prev.close) / 2.0,
            None => (candle.open + candle.close) / 2.0,
        };

        out.push(Candle {
            symbol: candle.symbol.clone(),
            start: candle.start,
            open,
            high: candle.high.max(open).max(close),
            low: candle.low.min(open).min(close),
            close,
            volume: candle.volume,
        });
    }

    out
}

/// Renko bricks built from a tick stream
///
/// A brick closes each time price moves a full `brick_size` away from the
/// previous brick's close. Each brick opens at the previous close.
pub fn renko_bricks(ticks: &[Ticker], brick_size: f64) -> Vec<Candle> {
    let mut bricks = Vec::new();
    if brick_size <= 0.0 || !brick_size.is_finite() {
        return bricks;
    }

    let Some(first) = ticks.first() else {
        return bricks;
    };
    let mut last_close = first.price;

    for tick in &ticks[1..] {
        while tick.price >= last_close + brick_size {
            let open = last_close;
            last_close += brick_size;
            bricks.push(brick(tick, open, last_close));
        }
        while tick.price <= last_close - brick_size {
            let open = last_close;
            last_close -= brick_size;
            bricks.push(brick(tick, open, last_close));
        }
    }

    bricks
}

fn brick(tick: &Ticker, open: f64, close: f64) -> Candle {
    Candle {
        symbol: tick.symbol.clone(),
        start: tick.time,
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        volume: 0.0,
    }
}
