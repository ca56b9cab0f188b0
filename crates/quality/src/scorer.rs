use std::sync::Arc;

use tracing::debug;

use common::{
    column_back, column_last, column_tail_mean, IndicatorEngine, MarketSeries, Trend, TrendReading,
};

/// Fewest rows the scorer accepts before returning the zero score.
pub const MIN_ROWS: usize = 20;

/// Credit every scored symbol starts from.
const BASE_RISK_SCORE: f64 = 3.0;

/// Sub-score fallbacks substituted when the inputs for a component are
/// unavailable. Each substitution is recorded in the metrics.
const ORDER_BLOCK_FALLBACK: f64 = 0.5;
const SR_FALLBACK: f64 = 1.0;
const TECH_FALLBACK: f64 = 0.8;
const SENTIMENT_FALLBACK: f64 = 0.5;

/// Flat deduction applied in a non-trending (ranging) regime.
const RANGING_PENALTY: f64 = 2.0;
/// ADX below this reads as ranging.
const RANGING_ADX: f64 = 20.0;
/// Composite multiplier applied when the trend is classified neutral.
const NEUTRAL_SCALE: f64 = 0.8;

/// Optional market-wide context folded into the sentiment term.
#[derive(Debug, Clone, Default)]
pub struct SentimentSnapshot {
    /// Reference-asset series (typically BTC) for the market-mood read.
    pub reference: Option<MarketSeries>,
    /// Current funding rate of the scored symbol's perpetual.
    pub funding_rate: Option<f64>,
}

/// Every sub-component of a scoring pass, kept for diagnostics and display.
/// Produced fresh on every call, never cached.
#[derive(Debug, Clone, Default)]
pub struct QualityMetrics {
    pub insufficient_data: bool,
    pub trend: Option<Trend>,
    pub trend_duration_minutes: f64,
    pub structure_score: f64,
    pub volume_ratio: Option<f64>,
    pub atr_ratio: Option<f64>,
    pub has_order_block: bool,
    pub obv_rising: bool,
    pub supertrend_aligned: bool,
    pub order_block_score: f64,
    pub support_distance: Option<f64>,
    pub resistance_distance: Option<f64>,
    /// Index into the retracement ladder the price is sitting on, if any.
    pub near_fib_level: Option<usize>,
    pub sr_score: f64,
    pub macd_cross: bool,
    pub macd_fresh_cross: bool,
    pub rsi: Option<f64>,
    pub rsi_healthy: bool,
    pub price_above_ema: bool,
    pub bb_width: Option<f64>,
    pub bb_position: Option<f64>,
    pub vortex_aligned: bool,
    pub vortex_strength: Option<f64>,
    pub tech_score: f64,
    pub sentiment_score: f64,
    pub reference_change: Option<f64>,
    pub funding_rate: Option<f64>,
    pub is_ranging: bool,
    pub adx: Option<f64>,
    pub final_score: f64,
    /// Names of sub-scores that fell back to their documented constant.
    pub fallbacks: Vec<&'static str>,
}

/// Composite 0–10 quality score: higher means lower risk.
///
/// Scoring never fails: thin input yields a zero score with the
/// `insufficient_data` marker, and any sub-score whose inputs are missing is
/// substituted with its fallback constant. Two calls over the same immutable
/// series produce identical output.
pub struct QualityScorer {
    engine: Arc<dyn IndicatorEngine>,
}

impl QualityScorer {
    pub fn new(engine: Arc<dyn IndicatorEngine>) -> Self {
        Self { engine }
    }

    pub fn score(
        &self,
        symbol: &str,
        series: &MarketSeries,
        sentiment: Option<&SentimentSnapshot>,
    ) -> (f64, QualityMetrics) {
        let mut metrics = QualityMetrics::default();

        if series.len() < MIN_ROWS {
            debug!(symbol = %symbol, rows = series.len(), "not enough data to score");
            metrics.insufficient_data = true;
            return (0.0, metrics);
        }

        let reading = match self.engine.trend_and_duration(series) {
            Ok(r) => r,
            Err(e) => {
                debug!(symbol = %symbol, error = %e, "trend read failed, scoring as unknown");
                TrendReading {
                    trend: Trend::Unknown,
                    duration_minutes: 0.0,
                    confidence: common::TrendConfidence::None,
                    reason: String::new(),
                }
            }
        };
        metrics.trend = Some(reading.trend);
        metrics.trend_duration_minutes = reading.duration_minutes;

        let structure = structure_score(&reading);
        metrics.structure_score = structure;

        let order_block = order_block_score(series, reading.trend, &mut metrics);
        let sr = support_resistance_score(series, &mut metrics);
        let tech = technical_score(series, reading.trend, &mut metrics);
        let market = sentiment_score(sentiment, &mut metrics);

        metrics.adx = column_last(&series.indicators.adx);
        metrics.is_ranging = metrics.adx.map_or(false, |adx| adx < RANGING_ADX);

        let mut score = BASE_RISK_SCORE + structure + order_block + sr + tech + market;
        if metrics.is_ranging {
            score = (score - RANGING_PENALTY).max(0.0);
        }
        if reading.trend == Trend::Neutral {
            score *= NEUTRAL_SCALE;
        }
        let score = score.clamp(0.0, 10.0);
        metrics.final_score = score;

        debug!(
            symbol = %symbol,
            score = score,
            structure = structure,
            order_block = order_block,
            sr = sr,
            tech = tech,
            market = market,
            ranging = metrics.is_ranging,
            "quality score computed"
        );
        (score, metrics)
    }
}

/// Market-structure credit, 0–2: rewarded for a sustained up-trend,
/// penalized for a sustained down-trend.
fn structure_score(reading: &TrendReading) -> f64 {
    match reading.trend {
        Trend::Up if reading.duration_minutes > 30.0 => 2.0,
        Trend::Up => 1.5,
        Trend::Neutral => 1.0,
        Trend::Down if reading.duration_minutes > 30.0 => 0.5,
        _ => 0.8,
    }
}

/// Order-block / liquidity confluence, 0–2, scaled down in high volatility.
fn order_block_score(series: &MarketSeries, trend: Trend, metrics: &mut QualityMetrics) -> f64 {
    let (Some(last_close), Some(prev_close), Some(recent_volume)) =
        (series.close(0), series.close(1), series.volume(0))
    else {
        metrics.fallbacks.push("order_block");
        metrics.order_block_score = ORDER_BLOCK_FALLBACK;
        return ORDER_BLOCK_FALLBACK;
    };

    let volumes: Option<Vec<f64>> = Some(series.candles.iter().map(|c| c.volume).collect());
    let volume_mean = column_tail_mean(&volumes, 20).unwrap_or(0.0);
    let volume_ratio = if volume_mean > 0.0 {
        recent_volume / volume_mean
    } else {
        1.0
    };

    let obv_rising = match (column_last(&series.indicators.obv), column_back(&series.indicators.obv, 4)) {
        (Some(now), Some(then)) => now > then,
        _ => false,
    };

    let atr = column_last(&series.indicators.atr).unwrap_or(0.0);
    let atr_mean = column_tail_mean(&series.indicators.atr, 20).unwrap_or(1.0);
    let atr_ratio = if atr_mean > 0.0 { atr / atr_mean } else { 1.0 };

    let supertrend_aligned = column_last(&series.indicators.supertrend_direction)
        .map_or(false, |dir| {
            (dir > 0.0 && trend == Trend::Up) || (dir < 0.0 && trend == Trend::Down)
        });

    let has_order_block = volume_ratio > 1.3 && (last_close - prev_close).abs() < atr;

    metrics.volume_ratio = Some(volume_ratio);
    metrics.atr_ratio = Some(atr_ratio);
    metrics.has_order_block = has_order_block;
    metrics.obv_rising = obv_rising;
    metrics.supertrend_aligned = supertrend_aligned;

    let mut score = if has_order_block && obv_rising && supertrend_aligned {
        2.0
    } else if has_order_block && (obv_rising || supertrend_aligned) {
        1.5
    } else if has_order_block || obv_rising {
        1.0
    } else if volume_ratio > 0.8 {
        0.7
    } else {
        0.5
    };

    // Elevated volatility makes the block unreliable.
    if atr_ratio > 1.5 {
        score *= 0.7;
    }
    metrics.order_block_score = score;
    score
}

/// Support/resistance proximity, 0–2: best when price sits on a recognized
/// retracement level, scaled down for deeper levels.
fn support_resistance_score(series: &MarketSeries, metrics: &mut QualityMetrics) -> f64 {
    let current = series.close(0).filter(|p| *p > 0.0);
    let Some(current) = current else {
        metrics.fallbacks.push("support_resistance");
        metrics.sr_score = SR_FALLBACK;
        return SR_FALLBACK;
    };

    let swing_lows = series.indicators.swing_lows.as_deref().unwrap_or(&[]);
    let swing_highs = series.indicators.swing_highs.as_deref().unwrap_or(&[]);

    let support = if swing_lows.len() >= 2 {
        swing_lows[swing_lows.len() - 1].min(swing_lows[swing_lows.len() - 2])
    } else {
        series.candles.iter().map(|c| c.low).fold(f64::MAX, f64::min)
    };
    let resistance = if swing_highs.len() >= 2 {
        swing_highs[swing_highs.len() - 1].max(swing_highs[swing_highs.len() - 2])
    } else {
        series.candles.iter().map(|c| c.high).fold(f64::MIN, f64::max)
    };

    let support_distance = (current - support) / current;
    let resistance_distance = (resistance - current) / current;
    metrics.support_distance = Some(support_distance);
    metrics.resistance_distance = Some(resistance_distance);

    let near_fib = series.indicators.fib_levels.as_ref().and_then(|levels| {
        levels
            .iter()
            .position(|level| (current - level).abs() / current < 0.01)
    });
    metrics.near_fib_level = near_fib;

    let score = if let Some(level_idx) = near_fib {
        2.0 - level_idx as f64 * 0.3
    } else if support_distance < 0.01 && resistance_distance > 0.05 {
        1.8
    } else if support_distance < 0.03 {
        1.5
    } else if resistance_distance < 0.03 {
        0.8
    } else {
        1.0
    };
    metrics.sr_score = score;
    score
}

/// Oscillator/momentum confluence, clamped to 0–2. Missing columns take the
/// documented neutral defaults (MACD 0, RSI 50, band width 0.1).
fn technical_score(series: &MarketSeries, trend: Trend, metrics: &mut QualityMetrics) -> f64 {
    let Some(last_close) = series.close(0) else {
        metrics.fallbacks.push("technical");
        metrics.tech_score = TECH_FALLBACK;
        return TECH_FALLBACK;
    };

    let ind = &series.indicators;
    if ind.macd.is_none() || ind.rsi.is_none() || ind.ema20.is_none() {
        metrics.fallbacks.push("technical_columns");
    }

    let macd = column_last(&ind.macd).unwrap_or(0.0);
    let macd_signal = column_last(&ind.macd_signal).unwrap_or(0.0);
    let macd_cross = macd > macd_signal;
    let macd_fresh_cross = match (column_back(&ind.macd, 1), column_back(&ind.macd_signal, 1)) {
        (Some(prev_macd), Some(prev_sig)) => {
            (macd > macd_signal && prev_macd <= prev_sig)
                || (macd < macd_signal && prev_macd >= prev_sig)
        }
        _ => false,
    };

    let rsi = column_last(&ind.rsi).unwrap_or(50.0);
    let rsi_healthy = (30.0..=70.0).contains(&rsi);

    let ema20 = column_last(&ind.ema20).unwrap_or(0.0);
    let price_above_ema = last_close > ema20;

    let bb_width = match (
        column_last(&ind.bb_upper),
        column_last(&ind.bb_middle),
        column_last(&ind.bb_lower),
    ) {
        (Some(u), Some(m), Some(l)) if m != 0.0 => (u - l) / m,
        _ => 0.1,
    };
    let bb_position = match (column_last(&ind.bb_upper), column_last(&ind.bb_lower)) {
        (Some(u), Some(l)) if u > l => Some((last_close - l) / (u - l)),
        _ => None,
    };

    metrics.macd_cross = macd_cross;
    metrics.macd_fresh_cross = macd_fresh_cross;
    metrics.rsi = Some(rsi);
    metrics.rsi_healthy = rsi_healthy;
    metrics.price_above_ema = price_above_ema;
    metrics.bb_width = Some(bb_width);
    metrics.bb_position = bb_position;

    let mut score: f64 = 0.0;
    if macd_cross && rsi_healthy {
        score += 1.0;
    } else if rsi_healthy {
        score += 0.6;
    } else {
        score -= 0.2;
    }
    if price_above_ema {
        score += 0.5;
    }
    if bb_width < 0.03 {
        score += 0.5;
    } else if bb_width < 0.06 {
        score += 0.3;
    } else if bb_width > 0.08 {
        score -= 0.2;
    }

    // Vortex confluence, when the columns exist.
    if let (Some(vi_plus), Some(vi_minus)) =
        (column_last(&ind.vi_plus), column_last(&ind.vi_minus))
    {
        let aligned = (vi_plus > vi_minus && trend == Trend::Up)
            || (vi_plus < vi_minus && trend == Trend::Down);
        let strength = (vi_plus - vi_minus).abs() * 10.0;
        metrics.vortex_aligned = aligned;
        metrics.vortex_strength = Some(strength);

        if aligned {
            score += 0.4;
            if strength > 1.5 {
                score += 0.2;
            }
        }

        let cross_up = column_last(&ind.vortex_cross_up).unwrap_or(false);
        let cross_down = column_last(&ind.vortex_cross_down).unwrap_or(false);
        if (cross_up && trend == Trend::Up) || (cross_down && trend == Trend::Down) {
            score += 0.5;
        }
    }

    let score = score.clamp(0.0, 2.0);
    metrics.tech_score = score;
    score
}

/// Market-mood term, clamped to 0–1: reference-asset short-horizon return
/// with an optional funding-rate nudge.
fn sentiment_score(sentiment: Option<&SentimentSnapshot>, metrics: &mut QualityMetrics) -> f64 {
    let Some(snapshot) = sentiment else {
        metrics.fallbacks.push("sentiment");
        metrics.sentiment_score = SENTIMENT_FALLBACK;
        return SENTIMENT_FALLBACK;
    };

    let mut score = SENTIMENT_FALLBACK;
    if let Some(reference) = &snapshot.reference {
        if let (Some(now), Some(then)) = (reference.close(0), reference.close(4)) {
            if then > 0.0 {
                let change = (now - then) / then;
                metrics.reference_change = Some(change);
                score = if change > 0.02 {
                    1.0
                } else if change > 0.005 {
                    0.8
                } else if change < -0.02 {
                    0.2
                } else if change < -0.005 {
                    0.3
                } else {
                    SENTIMENT_FALLBACK
                };
            }
        }
    }

    if let Some(funding) = snapshot.funding_rate {
        metrics.funding_rate = Some(funding);
        // Negative funding pays longs.
        if funding < -0.0002 {
            score += 0.1;
        } else if funding > 0.0002 {
            score -= 0.1;
        }
    }

    let score = score.clamp(0.0, 1.0);
    metrics.sentiment_score = score;
    score
}
