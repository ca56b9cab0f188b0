use serde::Serialize;
use tracing::{debug, info, warn};

use common::{AgreementLevel, Recommendation, Result, Timeframe, TradeSignal, Trend};

use crate::engine::{CoherenceResult, GroupTrends, TimeframeCoordinator};

/// One bounded nudge applied to a raw quality score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreAdjustment {
    pub reason: &'static str,
    pub value: f64,
}

/// Full record of how a raw score became the adjusted score.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentTrail {
    pub original_score: f64,
    pub final_score: f64,
    pub adjustments: Vec<ScoreAdjustment>,
}

/// Everything behind a generated signal, for display and post-mortems.
#[derive(Debug, Clone)]
pub struct SignalDetails {
    pub coherence: CoherenceResult,
    pub trail: AdjustmentTrail,
    pub primary_timeframe: Timeframe,
}

/// Directional price estimate from the timeframe picture.
#[derive(Debug, Clone, Serialize)]
pub struct PricePrediction {
    pub current_price: f64,
    pub predicted_price: f64,
    pub direction: Trend,
    pub expected_movement_pct: f64,
    pub confidence: f64,
}

impl TimeframeCoordinator {
    /// Nudge a raw quality score by how much the timeframes agree.
    ///
    /// High agreement adds up to 20% of the raw score, strong up to 10%;
    /// inconsistency subtracts up to 20%. Recorded conflicts cost up to
    /// another 10%, and a dominant trend that disagrees with which side of
    /// the 5.0 midpoint the score sits on pulls it back toward the middle.
    /// The result is clamped to [0, 10].
    pub async fn adjust_quality(&self, symbol: &str, original_score: f64) -> (f64, AdjustmentTrail) {
        let coherence = self.get_coherence(symbol, false).await;
        let mut adjustments = Vec::new();
        let mut score = original_score;

        match coherence.agreement_level {
            AgreementLevel::High => {
                let value = (original_score * 0.2).min(2.0);
                score = (score + value).min(10.0);
                adjustments.push(ScoreAdjustment { reason: "high timeframe agreement", value });
            }
            AgreementLevel::Strong => {
                let value = (original_score * 0.1).min(1.0);
                score = (score + value).min(10.0);
                adjustments.push(ScoreAdjustment { reason: "strong timeframe agreement", value });
            }
            AgreementLevel::Inconsistent => {
                let value = (original_score * 0.2).min(2.0);
                score = (score - value).max(0.0);
                adjustments.push(ScoreAdjustment {
                    reason: "inconsistent timeframes",
                    value: -value,
                });
            }
            AgreementLevel::Medium | AgreementLevel::Weak => {
                adjustments.push(ScoreAdjustment {
                    reason: "medium or weak agreement, unadjusted",
                    value: 0.0,
                });
            }
        }

        if !coherence.conflicts.is_empty() {
            let value = (original_score * 0.1).min(1.0);
            score = (score - value).max(0.0);
            adjustments.push(ScoreAdjustment { reason: "timeframe trend conflict", value: -value });
        }

        // Centering nudge when the dominant trend disagrees with the side of
        // the midpoint the raw score landed on.
        if coherence.dominant_trend == Trend::Up && original_score < 5.0 {
            let value = ((5.0 - original_score) * 0.5).min(1.0);
            score += value;
            adjustments.push(ScoreAdjustment {
                reason: "up-trend dominant but raw score low",
                value,
            });
        } else if coherence.dominant_trend == Trend::Down && original_score > 5.0 {
            let value = ((original_score - 5.0) * 0.5).min(1.0);
            score -= value;
            adjustments.push(ScoreAdjustment {
                reason: "down-trend dominant but raw score high",
                value: -value,
            });
        }

        let score = score.clamp(0.0, 10.0);
        for adj in &adjustments {
            if adj.value != 0.0 {
                debug!(symbol = %symbol, reason = adj.reason, value = adj.value, "score adjusted");
            }
        }
        info!(symbol = %symbol, original = original_score, adjusted = score, "quality score adjusted");

        (
            score,
            AdjustmentTrail { original_score, final_score: score, adjustments },
        )
    }

    /// Reconcile the adjusted score with the coherence recommendation into a
    /// final per-symbol signal.
    pub async fn generate_signal(
        &self,
        symbol: &str,
        quality_score: f64,
    ) -> (TradeSignal, f64, SignalDetails) {
        let coherence = self.get_coherence(symbol, false).await;
        let (adjusted, trail) = self.adjust_quality(symbol, quality_score).await;

        let signal = match coherence.recommendation {
            Recommendation::Buy if adjusted >= 6.0 => TradeSignal::Buy,
            Recommendation::Sell if adjusted <= 4.0 => TradeSignal::Sell,
            Recommendation::LightUp if adjusted >= 5.5 => TradeSignal::LightBuy,
            Recommendation::LightDown if adjusted <= 4.5 => TradeSignal::LightSell,
            _ => TradeSignal::Neutral,
        };

        let primary_timeframe = self.primary_timeframe(symbol).await;
        info!(
            symbol = %symbol,
            signal = %signal,
            adjusted = adjusted,
            recommendation = %coherence.recommendation,
            primary_timeframe = %primary_timeframe,
            "signal generated"
        );

        (
            signal,
            adjusted,
            SignalDetails { coherence, trail, primary_timeframe },
        )
    }

    /// Project the near-term price from group trends and coherence strength.
    pub async fn predict_price_movement(
        &self,
        symbol: &str,
        groups: &GroupTrends,
        coherence: &CoherenceResult,
    ) -> Result<PricePrediction> {
        let current_price = self.market().latest_price(symbol).await.map_err(|e| {
            warn!(symbol = %symbol, error = %e, "price fetch failed for prediction");
            e
        })?;

        let (direction, strength): (i8, f64) = if groups.short_term == groups.long_term
            && groups.short_term != Trend::Neutral
        {
            (if groups.short_term == Trend::Up { 1 } else { -1 }, 0.8)
        } else if coherence.dominant_trend != Trend::Neutral
            && coherence.dominant_trend != Trend::Unknown
            && matches!(
                coherence.agreement_level,
                AgreementLevel::High | AgreementLevel::Strong
            )
        {
            (if coherence.dominant_trend == Trend::Up { 1 } else { -1 }, 0.7)
        } else if groups.short_term != Trend::Neutral {
            (if groups.short_term == Trend::Up { 1 } else { -1 }, 0.5)
        } else if groups.long_term != Trend::Neutral {
            (if groups.long_term == Trend::Up { 1 } else { -1 }, 0.4)
        } else {
            (0, 0.0)
        };

        let base_movement = 0.03;
        let expected = base_movement * strength * direction as f64;
        let predicted_price = current_price * (1.0 + expected);

        Ok(PricePrediction {
            current_price,
            predicted_price,
            direction: match direction {
                1 => Trend::Up,
                -1 => Trend::Down,
                _ => Trend::Neutral,
            },
            expected_movement_pct: expected * 100.0,
            confidence: strength,
        })
    }
}
