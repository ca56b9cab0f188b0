use common::Candle;

/// Retracement ratios, shallow to deep.
const FIB_RATIOS: [f64; 4] = [0.236, 0.382, 0.618, 0.786];

/// How many candles on each side must be lower/higher for a pivot.
const SWING_LOOKAROUND: usize = 2;

/// Swing high and swing low price levels, oldest first.
pub fn swing_points(candles: &[Candle]) -> (Vec<f64>, Vec<f64>) {
    let n = candles.len();
    let mut highs = Vec::new();
    let mut lows = Vec::new();
    if n < SWING_LOOKAROUND * 2 + 1 {
        return (highs, lows);
    }

    for i in SWING_LOOKAROUND..n - SWING_LOOKAROUND {
        let window = &candles[i - SWING_LOOKAROUND..=i + SWING_LOOKAROUND];
        let high = candles[i].high;
        let low = candles[i].low;
        if window.iter().all(|c| c.high <= high) {
            highs.push(high);
        }
        if window.iter().all(|c| c.low >= low) {
            lows.push(low);
        }
    }
    (highs, lows)
}

/// Fibonacci retracement price levels measured down from the highest high of
/// the series toward its lowest low, shallow first.
pub fn fibonacci_retracements(candles: &[Candle]) -> Vec<f64> {
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if candles.is_empty() || high <= low {
        return Vec::new();
    }
    let range = high - low;
    FIB_RATIOS.iter().map(|r| high - range * r).collect()
}
