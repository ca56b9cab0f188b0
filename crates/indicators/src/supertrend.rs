use common::Candle;

use crate::volatility::atr_series;

/// Supertrend direction per row: +1.0 while price rides above the trend
/// line, −1.0 below.
pub fn supertrend_direction_series(candles: &[Candle], period: usize, multiplier: f64) -> Vec<f64> {
    let n = candles.len();
    if n == 0 {
        return Vec::new();
    }
    let atr = atr_series(candles, period);

    let mut direction = vec![1.0; n];
    let mut upper = vec![0.0; n];
    let mut lower = vec![0.0; n];

    for i in 0..n {
        let mid = (candles[i].high + candles[i].low) / 2.0;
        let basic_upper = mid + multiplier * atr[i];
        let basic_lower = mid - multiplier * atr[i];

        if i == 0 {
            upper[i] = basic_upper;
            lower[i] = basic_lower;
            continue;
        }

        // Bands only ratchet in the trend's favour.
        upper[i] = if basic_upper < upper[i - 1] || candles[i - 1].close > upper[i - 1] {
            basic_upper
        } else {
            upper[i - 1]
        };
        lower[i] = if basic_lower > lower[i - 1] || candles[i - 1].close < lower[i - 1] {
            basic_lower
        } else {
            lower[i - 1]
        };

        direction[i] = if candles[i].close > upper[i - 1] {
            1.0
        } else if candles[i].close < lower[i - 1] {
            -1.0
        } else {
            direction[i - 1]
        };
    }

    direction
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(i: i64, close: f64) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(i * 300, 0).unwrap(),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn direction_flips_negative_in_a_collapse() {
        let mut candles: Vec<Candle> = (0..20i64).map(|i| candle(i, 100.0 + i as f64)).collect();
        candles.extend((20..50i64).map(|i| candle(i, 120.0 - (i - 20) as f64 * 4.0)));
        let dir = supertrend_direction_series(&candles, 10, 3.0);
        assert_eq!(dir[49], -1.0);
    }

    #[test]
    fn direction_positive_in_a_steady_climb() {
        let candles: Vec<Candle> = (0..50i64).map(|i| candle(i, 100.0 + i as f64 * 2.0)).collect();
        let dir = supertrend_direction_series(&candles, 10, 3.0);
        assert_eq!(dir[49], 1.0);
    }
}
