pub mod scorer;
pub mod sizing;

pub use scorer::{QualityMetrics, QualityScorer, SentimentSnapshot, MIN_ROWS};
pub use sizing::{leverage_for_score, order_notional};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use common::{Candle, IndicatorEngine, MarketSeries};
    use indicators::SmcEngine;

    use crate::scorer::{QualityScorer, SentimentSnapshot};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: Utc.timestamp_opt(i as i64 * 900, 0).unwrap(),
                open: close,
                high: close * 1.005,
                low: close * 0.995,
                close,
                volume: 100.0,
            })
            .collect()
    }

    fn enriched(closes: &[f64]) -> MarketSeries {
        SmcEngine::new().enrich(candles(closes))
    }

    fn scorer() -> QualityScorer {
        QualityScorer::new(Arc::new(SmcEngine::new()))
    }

    #[test]
    fn thin_series_scores_zero_with_marker() {
        let series = enriched(&[100.0; 10]);
        let (score, metrics) = scorer().score("TESTUSDT", &series, None);
        assert_eq!(score, 0.0);
        assert!(metrics.insufficient_data);
    }

    #[test]
    fn score_is_always_in_range() {
        let shapes: Vec<Vec<f64>> = vec![
            (0..80).map(|i| 100.0 + i as f64 * 2.0).collect(),
            (0..80).map(|i| 300.0 - i as f64 * 2.0).collect(),
            (0..80).map(|i| 100.0 + (i as f64 * 0.5).sin() * 8.0).collect(),
            vec![100.0; 80],
        ];
        for closes in shapes {
            let (score, _) = scorer().score("TESTUSDT", &enriched(&closes), None);
            assert!((0.0..=10.0).contains(&score), "score out of range: {score}");
        }
    }

    #[test]
    fn scoring_is_idempotent_over_the_same_series() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).cos() * 6.0).collect();
        let series = enriched(&closes);
        let s = scorer();
        let (a, am) = s.score("TESTUSDT", &series, None);
        let (b, bm) = s.score("TESTUSDT", &series, None);
        assert_eq!(a, b);
        assert_eq!(am.structure_score, bm.structure_score);
        assert_eq!(am.tech_score, bm.tech_score);
    }

    #[test]
    fn uptrend_outscores_downtrend() {
        let up: Vec<f64> = (0..80).map(|i| 100.0 + i as f64 * 2.0).collect();
        let down: Vec<f64> = (0..80).map(|i| 300.0 - i as f64 * 2.0).collect();
        let s = scorer();
        let (up_score, _) = s.score("TESTUSDT", &enriched(&up), None);
        let (down_score, _) = s.score("TESTUSDT", &enriched(&down), None);
        assert!(
            up_score > down_score,
            "expected uptrend {up_score} > downtrend {down_score}"
        );
    }

    #[test]
    fn ranging_market_is_penalized() {
        // Identical flat tape, scored with and without the ADX column.
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.9).sin() * 0.4).collect();
        let with_adx = enriched(&closes);
        let mut without_adx = with_adx.clone();
        without_adx.indicators.adx = None;

        let s = scorer();
        let (penalized, pm) = s.score("TESTUSDT", &with_adx, None);
        let (unpenalized, um) = s.score("TESTUSDT", &without_adx, None);
        assert!(pm.is_ranging, "choppy flat tape should read as ranging");
        assert!(!um.is_ranging);
        assert!(penalized < unpenalized);
    }

    #[test]
    fn rising_reference_lifts_sentiment() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let series = enriched(&closes);
        let bullish = SentimentSnapshot {
            reference: Some(enriched(
                &(0..40).map(|i| 100.0 * (1.0 + i as f64 * 0.01)).collect::<Vec<_>>(),
            )),
            funding_rate: None,
        };
        let bearish = SentimentSnapshot {
            reference: Some(enriched(
                &(0..40).map(|i| 100.0 * (1.0 - i as f64 * 0.008)).collect::<Vec<_>>(),
            )),
            funding_rate: None,
        };
        let s = scorer();
        let (_, bm) = s.score("TESTUSDT", &series, Some(&bullish));
        let (_, sm) = s.score("TESTUSDT", &series, Some(&bearish));
        assert!(bm.sentiment_score > sm.sentiment_score);
    }

    #[test]
    fn funding_rate_nudges_sentiment() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let series = enriched(&closes);
        let s = scorer();
        let negative = SentimentSnapshot { reference: None, funding_rate: Some(-0.001) };
        let positive = SentimentSnapshot { reference: None, funding_rate: Some(0.001) };
        let (_, nm) = s.score("TESTUSDT", &series, Some(&negative));
        let (_, pm) = s.score("TESTUSDT", &series, Some(&positive));
        assert!((nm.sentiment_score - 0.6).abs() < 1e-9);
        assert!((pm.sentiment_score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn missing_sentiment_falls_back_and_is_recorded() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let (_, metrics) = scorer().score("TESTUSDT", &enriched(&closes), None);
        assert_eq!(metrics.sentiment_score, 0.5);
        assert!(metrics.fallbacks.contains(&"sentiment"));
    }
}
