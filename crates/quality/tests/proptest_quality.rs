use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use common::{Candle, IndicatorEngine};
use indicators::SmcEngine;
use quality::{QualityScorer, SentimentSnapshot};

fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: Utc.timestamp_opt(i as i64 * 900, 0).unwrap(),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 50.0,
        })
        .collect()
}

proptest! {
    /// Scoring arbitrary positive price tapes must never panic and must stay
    /// inside the documented [0, 10] band.
    #[test]
    fn score_stays_in_band_on_random_tapes(
        closes in prop::collection::vec(0.0001f64..1_000_000.0f64, 20..120),
        funding in prop::option::of(-0.01f64..0.01f64),
    ) {
        let engine = SmcEngine::new();
        let series = engine.enrich(candles_from_closes(&closes));
        let scorer = QualityScorer::new(Arc::new(SmcEngine::new()));

        let sentiment = SentimentSnapshot { reference: None, funding_rate: funding };
        let (score, metrics) = scorer.score("PROPUSDT", &series, Some(&sentiment));

        prop_assert!((0.0..=10.0).contains(&score), "score out of band: {score}");
        prop_assert!(score.is_finite());
        prop_assert_eq!(score, metrics.final_score);
    }

    /// Short tapes always take the zero path instead of erroring.
    #[test]
    fn short_tapes_score_zero(
        closes in prop::collection::vec(0.0001f64..1_000_000.0f64, 0..20),
    ) {
        let engine = SmcEngine::new();
        let series = engine.enrich(candles_from_closes(&closes));
        let scorer = QualityScorer::new(Arc::new(SmcEngine::new()));

        let (score, metrics) = scorer.score("PROPUSDT", &series, None);
        prop_assert_eq!(score, 0.0);
        prop_assert!(metrics.insufficient_data);
    }
}
