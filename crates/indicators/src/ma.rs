/// Exponential moving average over the whole series.
///
/// Seeded with the first value; warmup rows converge toward the true EMA as
/// the window fills.
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut ema = values[0];
    for &v in values {
        ema = v * k + ema * (1.0 - k);
        out.push(ema);
    }
    out
}

/// Simple moving average; warmup rows average whatever prefix is available.
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        let window = (i + 1).min(period);
        out.push(sum / window as f64);
    }
    out
}

/// Rolling population standard deviation with the same warmup convention
/// as `sma_series`.
pub fn stddev_series(values: &[f64], period: usize) -> Vec<f64> {
    let means = sma_series(values, period);
    values
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let start = (i + 1).saturating_sub(period);
            let window = &values[start..=i];
            let mean = means[i];
            let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / window.len() as f64;
            var.sqrt()
        })
        .collect()
}
