use tracing::debug;

use common::{column_last, Direction, MarketSeries, TimingQuality, Trend};

/// Outcome of an entry-timing check: enter now, or wait for a better price.
#[derive(Debug, Clone)]
pub struct EntryTiming {
    pub should_enter: bool,
    /// Target price to wait for when not entering immediately.
    pub expected_price: f64,
    /// Rough wait estimate until the target is plausible.
    pub wait_minutes: u64,
    pub reason: String,
    pub quality: TimingQuality,
}

impl EntryTiming {
    fn enter(reason: String, quality: TimingQuality) -> Self {
        Self {
            should_enter: true,
            expected_price: 0.0,
            wait_minutes: 0,
            reason,
            quality,
        }
    }

    fn wait(expected_price: f64, wait_minutes: u64, reason: String) -> Self {
        Self {
            should_enter: false,
            expected_price,
            wait_minutes,
            reason,
            quality: TimingQuality::Fair,
        }
    }

    /// How long a deferred entry stays valid: 1.5× the wait estimate, capped
    /// at two hours.
    pub fn expiry_minutes(&self) -> u64 {
        ((self.wait_minutes as f64 * 1.5) as u64).min(120)
    }
}

/// Decide whether to enter at the current price or defer to a target.
///
/// Recognized immediate-entry setups (long side; shorts mirrored): breakout
/// past recent resistance or the upper band, price sitting on support, a
/// pullback to the middle band inside an up-trend, and price at a
/// retracement level. Anything else produces a wait target at the nearest
/// recognized level. Fails open: with too little data the entry is allowed.
pub fn check_entry_timing(
    series: &MarketSeries,
    direction: Direction,
    current_price: f64,
    trend: Trend,
) -> EntryTiming {
    if series.len() < 20 || current_price <= 0.0 {
        return EntryTiming::enter("insufficient data, entry allowed".into(), TimingQuality::Unknown);
    }

    let ind = &series.indicators;
    let bb_upper = column_last(&ind.bb_upper);
    let bb_middle = column_last(&ind.bb_middle);
    let bb_lower = column_last(&ind.bb_lower);

    // Per-minute price drift estimate from ATR, for wait-time guesses.
    let atr = column_last(&ind.atr).unwrap_or_else(|| {
        series
            .candles
            .last()
            .map(|c| (c.high - c.low) * 0.1)
            .unwrap_or(0.0)
    });
    let atr_per_minute = (atr * 0.05).max(f64::EPSILON);
    let wait_estimate = |gap: f64, floor: u64| -> u64 {
        ((gap.abs() / atr_per_minute) as u64).max(floor)
    };

    let resistance = ind.swing_highs.as_ref().and_then(|h| h.last().copied());
    let support = ind.swing_lows.as_ref().and_then(|l| l.last().copied());

    let timing = match direction {
        Direction::Long => {
            if let Some(r) = resistance {
                if current_price > r * 1.005 {
                    return entered(EntryTiming::enter(
                        format!("price {current_price:.6} broke above resistance {r:.6}"),
                        TimingQuality::Excellent,
                    ));
                }
            }
            if let Some(s) = support {
                if current_price < s * 1.01 {
                    return entered(EntryTiming::enter(
                        format!("price {current_price:.6} sitting on support {s:.6}"),
                        TimingQuality::Excellent,
                    ));
                }
            }
            if let Some(upper) = bb_upper {
                if current_price > upper * 1.002 {
                    return entered(EntryTiming::enter(
                        format!("price {current_price:.6} broke above upper band {upper:.6}"),
                        TimingQuality::Excellent,
                    ));
                }
            }
            if let Some(middle) = bb_middle {
                if trend == Trend::Up
                    && current_price < middle * 1.01
                    && current_price > middle * 0.99
                {
                    return entered(EntryTiming::enter(
                        format!("pullback to middle band {middle:.6} inside an up-trend"),
                        TimingQuality::Good,
                    ));
                }
            }
            if let Some(level) = nearby_fib(ind.fib_levels.as_deref(), current_price) {
                return entered(EntryTiming::enter(
                    format!("price {current_price:.6} at retracement level {level:.6}"),
                    TimingQuality::Good,
                ));
            }

            // No immediate setup: propose a wait target.
            if let (Some(middle), Some(r)) = (bb_middle, resistance) {
                if current_price > middle && current_price < r * 0.99 {
                    let target = r * 1.01;
                    return EntryTiming::wait(
                        target,
                        wait_estimate(target - current_price, 10),
                        format!("below resistance {r:.6}, waiting for a breakout"),
                    );
                }
            }
            if let Some(s) = support {
                if current_price > s * 1.03 {
                    let target = s * 1.01;
                    return EntryTiming::wait(
                        target,
                        wait_estimate(current_price - target, 15),
                        format!("stretched above support, waiting for a pullback to {s:.6}"),
                    );
                }
            }
            if let Some(middle) = bb_middle {
                if current_price > middle * 1.02 {
                    return EntryTiming::wait(
                        middle,
                        wait_estimate(current_price - middle, 12),
                        format!("above middle band, waiting for a pullback to {middle:.6}"),
                    );
                }
            }
            EntryTiming::enter("no wait condition applies".into(), TimingQuality::Fair)
        }

        Direction::Short => {
            if let Some(s) = support {
                if current_price < s * 0.995 {
                    return entered(EntryTiming::enter(
                        format!("price {current_price:.6} broke below support {s:.6}"),
                        TimingQuality::Excellent,
                    ));
                }
            }
            if let Some(r) = resistance {
                if current_price > r * 0.99 {
                    return entered(EntryTiming::enter(
                        format!("price {current_price:.6} pressing resistance {r:.6}"),
                        TimingQuality::Excellent,
                    ));
                }
            }
            if let Some(lower) = bb_lower {
                if current_price < lower * 0.998 {
                    return entered(EntryTiming::enter(
                        format!("price {current_price:.6} broke below lower band {lower:.6}"),
                        TimingQuality::Excellent,
                    ));
                }
            }
            if let Some(middle) = bb_middle {
                if trend == Trend::Down
                    && current_price < middle * 1.01
                    && current_price > middle * 0.99
                {
                    return entered(EntryTiming::enter(
                        format!("bounce to middle band {middle:.6} inside a down-trend"),
                        TimingQuality::Good,
                    ));
                }
            }
            if let Some(level) = nearby_fib(ind.fib_levels.as_deref(), current_price) {
                return entered(EntryTiming::enter(
                    format!("price {current_price:.6} at retracement level {level:.6}"),
                    TimingQuality::Good,
                ));
            }

            if let (Some(middle), Some(s)) = (bb_middle, support) {
                if current_price < middle && current_price > s * 1.01 {
                    let target = s * 0.99;
                    return EntryTiming::wait(
                        target,
                        wait_estimate(current_price - target, 10),
                        format!("above support {s:.6}, waiting for a breakdown"),
                    );
                }
            }
            if let Some(r) = resistance {
                if current_price < r * 0.97 {
                    let target = r * 0.99;
                    return EntryTiming::wait(
                        target,
                        wait_estimate(target - current_price, 15),
                        format!("stretched below resistance, waiting for a bounce to {r:.6}"),
                    );
                }
            }
            if let Some(middle) = bb_middle {
                if current_price < middle * 0.98 {
                    return EntryTiming::wait(
                        middle,
                        wait_estimate(middle - current_price, 12),
                        format!("below middle band, waiting for a bounce to {middle:.6}"),
                    );
                }
            }
            EntryTiming::enter("no wait condition applies".into(), TimingQuality::Fair)
        }
    };

    timing
}

fn entered(timing: EntryTiming) -> EntryTiming {
    debug!(reason = %timing.reason, quality = %timing.quality, "immediate entry");
    timing
}

fn nearby_fib(levels: Option<&[f64]>, price: f64) -> Option<f64> {
    // The 0.382 and 0.618 retracements are the ones worth entering on.
    let levels = levels?;
    [levels.get(1), levels.get(2)]
        .into_iter()
        .flatten()
        .find(|&&level| level > 0.0 && (price - level).abs() / level < 0.01)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{Candle, IndicatorColumns};

    /// 30 flat candles with hand-set levels so each branch is addressable.
    fn series() -> MarketSeries {
        let candles: Vec<Candle> = (0..30)
            .map(|i| Candle {
                open_time: Utc.timestamp_opt(i * 900, 0).unwrap(),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 10.0,
            })
            .collect();
        let n = candles.len();
        let indicators = IndicatorColumns {
            bb_upper: Some(vec![106.0; n]),
            bb_middle: Some(vec![100.0; n]),
            bb_lower: Some(vec![94.0; n]),
            atr: Some(vec![2.0; n]),
            swing_highs: Some(vec![110.0]),
            swing_lows: Some(vec![90.0]),
            fib_levels: Some(vec![118.0, 112.0, 103.0, 97.0]),
            ..IndicatorColumns::default()
        };
        MarketSeries { candles, indicators }
    }

    #[test]
    fn long_breakout_above_resistance_enters_immediately() {
        let timing = check_entry_timing(&series(), Direction::Long, 110.6, Trend::Up);
        assert!(timing.should_enter);
        assert_eq!(timing.quality, TimingQuality::Excellent);
    }

    #[test]
    fn long_on_support_enters_immediately() {
        let timing = check_entry_timing(&series(), Direction::Long, 90.5, Trend::Down);
        assert!(timing.should_enter);
        assert_eq!(timing.quality, TimingQuality::Excellent);
    }

    #[test]
    fn long_pullback_to_middle_band_needs_an_uptrend() {
        let in_trend = check_entry_timing(&series(), Direction::Long, 100.0, Trend::Up);
        assert!(in_trend.should_enter);
        assert_eq!(in_trend.quality, TimingQuality::Good);

        // Same price without the trend falls through to a wait target.
        let no_trend = check_entry_timing(&series(), Direction::Long, 100.5, Trend::Neutral);
        assert!(!no_trend.should_enter);
    }

    #[test]
    fn long_without_a_setup_waits_for_the_breakout() {
        let timing = check_entry_timing(&series(), Direction::Long, 105.0, Trend::Neutral);
        assert!(!timing.should_enter);
        // Wait target: resistance 110 × 1.01
        assert!((timing.expected_price - 111.1).abs() < 1e-9);
        assert!(timing.wait_minutes >= 10);
        assert_eq!(timing.quality, TimingQuality::Fair);
    }

    #[test]
    fn short_breakdown_below_support_enters_immediately() {
        let timing = check_entry_timing(&series(), Direction::Short, 89.0, Trend::Down);
        assert!(timing.should_enter);
        assert_eq!(timing.quality, TimingQuality::Excellent);
    }

    #[test]
    fn short_without_a_setup_waits_for_the_breakdown() {
        let timing = check_entry_timing(&series(), Direction::Short, 95.0, Trend::Neutral);
        assert!(!timing.should_enter);
        // Wait target: support 90 × 0.99
        assert!((timing.expected_price - 89.1).abs() < 1e-9);
        assert!(timing.wait_minutes >= 10);
    }

    #[test]
    fn retracement_level_allows_entry() {
        // 103.0 is the third fib level; within 1%.
        let timing = check_entry_timing(&series(), Direction::Long, 103.2, Trend::Neutral);
        assert!(timing.should_enter);
        assert_eq!(timing.quality, TimingQuality::Good);
    }

    #[test]
    fn thin_series_fails_open() {
        let thin = MarketSeries {
            candles: series().candles[..5].to_vec(),
            indicators: IndicatorColumns::default(),
        };
        let timing = check_entry_timing(&thin, Direction::Long, 100.0, Trend::Unknown);
        assert!(timing.should_enter);
        assert_eq!(timing.quality, TimingQuality::Unknown);
    }

    #[test]
    fn expiry_is_capped_at_two_hours() {
        let timing = EntryTiming::wait(100.0, 300, "test".into());
        assert_eq!(timing.expiry_minutes(), 120);
        let short = EntryTiming::wait(100.0, 20, "test".into());
        assert_eq!(short.expiry_minutes(), 30);
    }
}
