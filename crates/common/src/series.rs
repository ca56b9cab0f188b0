use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Indicator columns attached to a candle series by the indicator engine.
///
/// Every column is optional: an engine that cannot compute a column leaves it
/// `None`, and consumers substitute their documented fallbacks instead of
/// failing. Columns run parallel to `MarketSeries::candles` (same length,
/// oldest first), except `fib_levels`, which is a per-series set of
/// retracement price levels ordered shallow to deep.
#[derive(Debug, Clone, Default)]
pub struct IndicatorColumns {
    pub ema5: Option<Vec<f64>>,
    pub ema20: Option<Vec<f64>>,
    pub rsi: Option<Vec<f64>>,
    pub macd: Option<Vec<f64>>,
    pub macd_signal: Option<Vec<f64>>,
    pub atr: Option<Vec<f64>>,
    pub obv: Option<Vec<f64>>,
    pub bb_upper: Option<Vec<f64>>,
    pub bb_middle: Option<Vec<f64>>,
    pub bb_lower: Option<Vec<f64>>,
    pub adx: Option<Vec<f64>>,
    pub vi_plus: Option<Vec<f64>>,
    pub vi_minus: Option<Vec<f64>>,
    pub vortex_cross_up: Option<Vec<bool>>,
    pub vortex_cross_down: Option<Vec<bool>>,
    /// +1.0 while the supertrend line sits below price, −1.0 above.
    pub supertrend_direction: Option<Vec<f64>>,
    /// Price levels of recognized swing highs/lows, oldest first.
    pub swing_highs: Option<Vec<f64>>,
    pub swing_lows: Option<Vec<f64>>,
    /// Fibonacci retracement price levels for the latest swing, shallow first.
    pub fib_levels: Option<Vec<f64>>,
}

/// A candle series enriched with indicator columns.
#[derive(Debug, Clone, Default)]
pub struct MarketSeries {
    pub candles: Vec<Candle>,
    pub indicators: IndicatorColumns,
}

impl MarketSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Close price `back` candles from the end (0 = latest).
    pub fn close(&self, back: usize) -> Option<f64> {
        nth_back_by(&self.candles, back).map(|c| c.close)
    }

    pub fn volume(&self, back: usize) -> Option<f64> {
        nth_back_by(&self.candles, back).map(|c| c.volume)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Minutes between consecutive candles, derived from the timestamps.
    pub fn candle_minutes(&self) -> Option<f64> {
        let n = self.candles.len();
        if n < 2 {
            return None;
        }
        let span = self.candles[n - 1].open_time - self.candles[n - 2].open_time;
        let minutes = span.num_seconds() as f64 / 60.0;
        (minutes > 0.0).then_some(minutes)
    }
}

/// Latest value of an optional indicator column.
pub fn column_last<T: Copy>(column: &Option<Vec<T>>) -> Option<T> {
    column.as_ref().and_then(|v| v.last().copied())
}

/// Value `back` rows from the end of an optional column (0 = latest).
pub fn column_back<T: Copy>(column: &Option<Vec<T>>, back: usize) -> Option<T> {
    column.as_ref().and_then(|v| nth_back_by(v, back).copied())
}

/// Mean of the last `window` values of an optional column.
pub fn column_tail_mean(column: &Option<Vec<f64>>, window: usize) -> Option<f64> {
    let values = column.as_ref()?;
    if values.is_empty() || window == 0 {
        return None;
    }
    let tail = &values[values.len().saturating_sub(window)..];
    Some(tail.iter().sum::<f64>() / tail.len() as f64)
}

fn nth_back_by<T>(values: &[T], back: usize) -> Option<&T> {
    values.len().checked_sub(back + 1).map(|i| &values[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(minute: i64, close: f64) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(minute * 60, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn close_indexes_from_the_end() {
        let series = MarketSeries {
            candles: vec![candle(0, 1.0), candle(5, 2.0), candle(10, 3.0)],
            indicators: IndicatorColumns::default(),
        };
        assert_eq!(series.close(0), Some(3.0));
        assert_eq!(series.close(2), Some(1.0));
        assert_eq!(series.close(3), None);
    }

    #[test]
    fn candle_minutes_from_timestamps() {
        let series = MarketSeries {
            candles: vec![candle(0, 1.0), candle(5, 2.0)],
            indicators: IndicatorColumns::default(),
        };
        assert_eq!(series.candle_minutes(), Some(5.0));
    }

    #[test]
    fn column_helpers_treat_absence_as_none() {
        let absent: Option<Vec<f64>> = None;
        assert_eq!(column_last(&absent), None);
        assert_eq!(column_tail_mean(&absent, 20), None);

        let present = Some(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(column_last(&present), Some(4.0));
        assert_eq!(column_back(&present, 1), Some(3.0));
        assert_eq!(column_tail_mean(&present, 2), Some(3.5));
    }
}
