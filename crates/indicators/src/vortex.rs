use common::Candle;

use crate::volatility::true_range_series;

/// Vortex indicator: (VI+, VI−, cross-up flags, cross-down flags).
///
/// VI+ = Σ|high − prev_low| / ΣTR over the window, VI− the mirror. The cross
/// flags mark rows where one line freshly crossed the other.
pub fn vortex_series(
    candles: &[Candle],
    period: usize,
) -> (Vec<f64>, Vec<f64>, Vec<bool>, Vec<bool>) {
    let n = candles.len();
    if n == 0 || period == 0 {
        return (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    }
    let tr = true_range_series(candles);

    let mut vm_plus = vec![0.0; n];
    let mut vm_minus = vec![0.0; n];
    for i in 1..n {
        vm_plus[i] = (candles[i].high - candles[i - 1].low).abs();
        vm_minus[i] = (candles[i].low - candles[i - 1].high).abs();
    }

    let mut vi_plus = vec![1.0; n];
    let mut vi_minus = vec![1.0; n];
    for i in 0..n {
        let start = (i + 1).saturating_sub(period);
        let tr_sum: f64 = tr[start..=i].iter().sum();
        if tr_sum > 0.0 {
            vi_plus[i] = vm_plus[start..=i].iter().sum::<f64>() / tr_sum;
            vi_minus[i] = vm_minus[start..=i].iter().sum::<f64>() / tr_sum;
        }
    }

    let mut cross_up = vec![false; n];
    let mut cross_down = vec![false; n];
    for i in 1..n {
        cross_up[i] = vi_plus[i] > vi_minus[i] && vi_plus[i - 1] <= vi_minus[i - 1];
        cross_down[i] = vi_plus[i] < vi_minus[i] && vi_plus[i - 1] >= vi_minus[i - 1];
    }

    (vi_plus, vi_minus, cross_up, cross_down)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(i: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(i * 300, 0).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn vi_plus_dominates_in_an_uptrend() {
        let candles: Vec<Candle> = (0..40i64)
            .map(|i| {
                let base = 100.0 + i as f64 * 1.5;
                candle(i, base + 1.0, base - 1.0, base)
            })
            .collect();
        let (vi_plus, vi_minus, _, _) = vortex_series(&candles, 14);
        assert!(vi_plus[39] > vi_minus[39]);
    }

    #[test]
    fn cross_flags_fire_on_reversal() {
        // Down-leg then a sharp up-leg forces VI+ across VI−.
        let mut candles: Vec<Candle> = (0..30i64)
            .map(|i| {
                let base = 200.0 - i as f64 * 1.5;
                candle(i, base + 1.0, base - 1.0, base)
            })
            .collect();
        candles.extend((30..60i64).map(|i| {
            let base = 155.0 + (i - 30) as f64 * 3.0;
            candle(i, base + 1.0, base - 1.0, base)
        }));
        let (_, _, cross_up, _) = vortex_series(&candles, 14);
        assert!(cross_up.iter().any(|&c| c), "expected at least one cross-up");
    }
}
