use common::Candle;

use crate::ma::{sma_series, stddev_series};

/// True range per candle; the first row falls back to high − low.
pub fn true_range_series(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                let prev_close = candles[i - 1].close;
                (c.high - c.low)
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs())
            }
        })
        .collect()
}

/// ATR (Average True Range) via Wilder smoothing; warmup uses a running mean.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let tr = true_range_series(candles);
    if tr.is_empty() || period == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(tr.len());
    let mut atr = tr[0];
    for (i, &range) in tr.iter().enumerate() {
        if i < period {
            atr = (atr * i as f64 + range) / (i + 1) as f64;
        } else {
            atr = (atr * (period - 1) as f64 + range) / period as f64;
        }
        out.push(atr);
    }
    out
}

/// Bollinger bands: (upper, middle, lower) with a 2-sigma width.
pub fn bollinger_series(closes: &[f64], period: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = sma_series(closes, period);
    let sd = stddev_series(closes, period);
    let upper: Vec<f64> = middle.iter().zip(sd.iter()).map(|(m, s)| m + 2.0 * s).collect();
    let lower: Vec<f64> = middle.iter().zip(sd.iter()).map(|(m, s)| m - 2.0 * s).collect();
    (upper, middle, lower)
}

/// ADX (Average Directional Index) via Wilder smoothing of +DM/−DM/TR.
pub fn adx_series(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    if n == 0 || period == 0 {
        return Vec::new();
    }
    let tr = true_range_series(candles);

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let smooth = |values: &[f64]| -> Vec<f64> {
        let mut out = Vec::with_capacity(values.len());
        let mut acc = values[0];
        for (i, &v) in values.iter().enumerate() {
            if i < period {
                acc = (acc * i as f64 + v) / (i + 1) as f64;
            } else {
                acc = (acc * (period - 1) as f64 + v) / period as f64;
            }
            out.push(acc);
        }
        out
    };

    let tr_s = smooth(&tr);
    let plus_s = smooth(&plus_dm);
    let minus_s = smooth(&minus_dm);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            if tr_s[i] <= 0.0 {
                return 0.0;
            }
            let plus_di = 100.0 * plus_s[i] / tr_s[i];
            let minus_di = 100.0 * minus_s[i] / tr_s[i];
            let sum = plus_di + minus_di;
            if sum <= 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / sum
            }
        })
        .collect();

    smooth(&dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(i * 300, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    fn flat(n: usize) -> Vec<Candle> {
        (0..n as i64)
            .map(|i| candle(i, 100.0, 101.0, 99.0, 100.0))
            .collect()
    }

    #[test]
    fn atr_of_constant_range_equals_range() {
        let atr = atr_series(&flat(40), 14);
        assert!((atr[39] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn bollinger_bands_order() {
        let closes: Vec<f64> = (0..50)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0)
            .collect();
        let (upper, middle, lower) = bollinger_series(&closes, 20);
        for i in 0..50 {
            assert!(upper[i] >= middle[i]);
            assert!(middle[i] >= lower[i]);
        }
    }

    #[test]
    fn adx_low_in_a_flat_market() {
        let adx = adx_series(&flat(60), 14);
        assert!(adx[59] < 20.0, "flat market should not trend, got {}", adx[59]);
    }

    #[test]
    fn adx_high_in_a_strong_trend() {
        let candles: Vec<Candle> = (0..60i64)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(i, base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        let adx = adx_series(&candles, 14);
        assert!(adx[59] > 30.0, "persistent trend should score high, got {}", adx[59]);
    }
}
