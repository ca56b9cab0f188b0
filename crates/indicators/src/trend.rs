use common::{
    column_last, Candle, Error, IndicatorColumns, IndicatorEngine, MarketSeries, Result, Trend,
    TrendConfidence, TrendReading,
};

use crate::levels::{fibonacci_retracements, swing_points};
use crate::ma::ema_series;
use crate::oscillators::{macd_series, rsi_series};
use crate::supertrend::supertrend_direction_series;
use crate::volatility::{adx_series, atr_series, bollinger_series};
use crate::volume::obv_series;
use crate::vortex::vortex_series;

/// Fewest candles on which a trend classification is attempted.
const MIN_TREND_ROWS: usize = 20;

/// EMA separation below which the market is treated as flat.
const FLAT_BAND: f64 = 0.001;

/// Default indicator engine: smart-money-concept trend reading over a
/// standard set of columns.
#[derive(Debug, Clone, Default)]
pub struct SmcEngine;

impl SmcEngine {
    pub fn new() -> Self {
        Self
    }
}

impl IndicatorEngine for SmcEngine {
    fn enrich(&self, candles: Vec<Candle>) -> MarketSeries {
        if candles.len() < 5 {
            // Too short for any meaningful column; consumers fall back.
            return MarketSeries {
                candles,
                indicators: IndicatorColumns::default(),
            };
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let (macd, macd_signal) = macd_series(&closes, 12, 26, 9);
        let (bb_upper, bb_middle, bb_lower) = bollinger_series(&closes, 20);
        let (vi_plus, vi_minus, cross_up, cross_down) = vortex_series(&candles, 14);
        let (swing_highs, swing_lows) = swing_points(&candles);

        let indicators = IndicatorColumns {
            ema5: Some(ema_series(&closes, 5)),
            ema20: Some(ema_series(&closes, 20)),
            rsi: Some(rsi_series(&closes, 14)),
            macd: Some(macd),
            macd_signal: Some(macd_signal),
            atr: Some(atr_series(&candles, 14)),
            obv: Some(obv_series(&candles)),
            bb_upper: Some(bb_upper),
            bb_middle: Some(bb_middle),
            bb_lower: Some(bb_lower),
            adx: Some(adx_series(&candles, 14)),
            vi_plus: Some(vi_plus),
            vi_minus: Some(vi_minus),
            vortex_cross_up: Some(cross_up),
            vortex_cross_down: Some(cross_down),
            supertrend_direction: Some(supertrend_direction_series(&candles, 10, 3.0)),
            swing_highs: Some(swing_highs),
            swing_lows: Some(swing_lows),
            fib_levels: Some(fibonacci_retracements(&candles)),
        };

        MarketSeries { candles, indicators }
    }

    fn trend_and_duration(&self, series: &MarketSeries) -> Result<TrendReading> {
        if series.len() < MIN_TREND_ROWS {
            return Err(Error::InsufficientData {
                have: series.len(),
                need: MIN_TREND_ROWS,
            });
        }
        let ema5 = series
            .indicators
            .ema5
            .as_ref()
            .ok_or_else(|| Error::Indicator("EMA5".into()))?;
        let ema20 = series
            .indicators
            .ema20
            .as_ref()
            .ok_or_else(|| Error::Indicator("EMA20".into()))?;

        let n = series.len().min(ema5.len()).min(ema20.len());
        let latest = classify(ema5[n - 1], ema20[n - 1]);

        // Count how many consecutive rows from the end share the latest
        // classification.
        let mut streak = 1usize;
        for i in (0..n - 1).rev() {
            if classify(ema5[i], ema20[i]) == latest {
                streak += 1;
            } else {
                break;
            }
        }

        let candle_minutes = series.candle_minutes().unwrap_or(1.0);
        let duration_minutes = streak as f64 * candle_minutes;

        let confidence = match column_last(&series.indicators.adx) {
            Some(adx) if adx >= 35.0 => TrendConfidence::High,
            Some(adx) if adx >= 25.0 => TrendConfidence::MediumHigh,
            Some(adx) if adx >= 20.0 => TrendConfidence::Medium,
            Some(_) => TrendConfidence::Low,
            None => TrendConfidence::None,
        };

        let reason = match latest {
            Trend::Up => format!("EMA5 above EMA20 for {streak} candles"),
            Trend::Down => format!("EMA5 below EMA20 for {streak} candles"),
            _ => format!("EMA5 and EMA20 entangled for {streak} candles"),
        };

        Ok(TrendReading {
            trend: latest,
            duration_minutes,
            confidence,
            reason,
        })
    }
}

fn classify(ema5: f64, ema20: f64) -> Trend {
    if ema20.abs() < f64::EPSILON {
        return Trend::Unknown;
    }
    let gap = (ema5 - ema20) / ema20.abs();
    if gap > FLAT_BAND {
        Trend::Up
    } else if gap < -FLAT_BAND {
        Trend::Down
    } else {
        Trend::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: Utc.timestamp_opt(i as i64 * 300, 0).unwrap(),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn enrich_attaches_full_length_columns() {
        let engine = SmcEngine::new();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let series = engine.enrich(candles(&closes));
        assert_eq!(series.indicators.ema5.as_ref().unwrap().len(), 60);
        assert_eq!(series.indicators.rsi.as_ref().unwrap().len(), 60);
        assert_eq!(series.indicators.adx.as_ref().unwrap().len(), 60);
    }

    #[test]
    fn enrich_on_tiny_series_leaves_columns_absent() {
        let engine = SmcEngine::new();
        let series = engine.enrich(candles(&[100.0, 101.0]));
        assert!(series.indicators.ema5.is_none());
        assert!(series.indicators.fib_levels.is_none());
    }

    #[test]
    fn uptrend_reads_up_with_positive_duration() {
        let engine = SmcEngine::new();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 2.0).collect();
        let reading = engine.trend_and_duration(&engine.enrich(candles(&closes))).unwrap();
        assert_eq!(reading.trend, Trend::Up);
        assert!(reading.duration_minutes > 0.0);
    }

    #[test]
    fn downtrend_reads_down() {
        let engine = SmcEngine::new();
        let closes: Vec<f64> = (0..60).map(|i| 300.0 - i as f64 * 2.0).collect();
        let reading = engine.trend_and_duration(&engine.enrich(candles(&closes))).unwrap();
        assert_eq!(reading.trend, Trend::Down);
    }

    #[test]
    fn short_series_is_rejected() {
        let engine = SmcEngine::new();
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let err = engine.trend_and_duration(&engine.enrich(candles(&closes)));
        assert!(matches!(err, Err(Error::InsufficientData { .. })));
    }

    #[test]
    fn same_series_reads_identically_twice() {
        let engine = SmcEngine::new();
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.4).sin() * 10.0)
            .collect();
        let series = engine.enrich(candles(&closes));
        let a = engine.trend_and_duration(&series).unwrap();
        let b = engine.trend_and_duration(&series).unwrap();
        assert_eq!(a.trend, b.trend);
        assert_eq!(a.duration_minutes, b.duration_minutes);
    }
}
