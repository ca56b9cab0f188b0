use common::Candle;

/// OBV (On-Balance Volume): cumulative volume signed by the close-to-close
/// move.
pub fn obv_series(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut obv = 0.0;
    for (i, c) in candles.iter().enumerate() {
        if i > 0 {
            let prev = candles[i - 1].close;
            if c.close > prev {
                obv += c.volume;
            } else if c.close < prev {
                obv -= c.volume;
            }
        }
        out.push(obv);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(i: i64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(i * 300, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn obv_accumulates_with_rising_closes() {
        let candles: Vec<Candle> = (0..5).map(|i| candle(i, 100.0 + i as f64, 10.0)).collect();
        let obv = obv_series(&candles);
        assert_eq!(obv, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn obv_flat_closes_do_not_move() {
        let candles: Vec<Candle> = (0..4).map(|i| candle(i, 100.0, 10.0)).collect();
        let obv = obv_series(&candles);
        assert!(obv.iter().all(|&v| v == 0.0));
    }
}
