use crate::ma::ema_series;

/// RSI (Relative Strength Index) over the whole series.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard
/// RSI). Warmup rows (fewer than `period` changes available) are pinned to
/// the neutral value 50.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    if closes.is_empty() || period == 0 {
        return Vec::new();
    }
    let mut out = vec![50.0; closes.len()];
    if closes.len() < period + 1 {
        return out;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let initial = &changes[..period];
    let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss =
        initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / period as f64;

    out[period] = rsi_value(avg_gain, avg_loss);
    for (i, &change) in changes.iter().enumerate().skip(period) {
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { change.abs() } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out[i + 1] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// MACD line and signal line over the whole series.
///
/// MACD line = EMA(fast) − EMA(slow); signal = EMA(macd_line, signal_period).
pub fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>) {
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);
    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_series(&macd, signal);
    (macd, signal_line)
}
