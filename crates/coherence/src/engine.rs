use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{
    column_last, column_tail_mean, AgreementLevel, IndicatorEngine, MarketData, MarketSeries,
    Recommendation, Timeframe, Trend, TrendConfidence,
};

/// How long a computed coherence result stays valid, independent of the
/// per-timeframe refresh intervals.
pub const COHERENCE_TTL: Duration = Duration::from_secs(300);

/// Reliability bonus granted to the long-frame group's trend when the short
/// and long groups unanimously disagree.
const LONG_FRAME_BONUS: f64 = 0.5;

const SHORT_FRAMES: [Timeframe; 2] = [Timeframe::M5, Timeframe::M15];
const LONG_FRAMES: [Timeframe; 2] = [Timeframe::H1, Timeframe::H2];

/// Static per-timeframe policy: vote weight, cache refresh interval and how
/// many candles to request. Longer frames carry more weight and refresh less
/// often.
pub fn timeframe_policy(tf: Timeframe) -> (f64, Duration, usize) {
    match tf {
        Timeframe::M5 => (0.7, Duration::from_secs(150), 100),
        Timeframe::M15 => (1.0, Duration::from_secs(300), 100),
        Timeframe::H1 => (1.5, Duration::from_secs(900), 200),
        Timeframe::H2 => (1.8, Duration::from_secs(1800), 200),
    }
}

/// Trend reading of one timeframe, normalized to that frame's period count.
#[derive(Debug, Clone)]
pub struct TimeframeSnapshot {
    pub timeframe: Timeframe,
    pub trend: Trend,
    pub duration_minutes: f64,
    /// Trend duration expressed in this timeframe's candle periods.
    pub periods: f64,
    pub confidence: TrendConfidence,
    pub valid: bool,
}

impl TimeframeSnapshot {
    fn invalid(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            trend: Trend::Unknown,
            duration_minutes: 0.0,
            periods: 0.0,
            confidence: TrendConfidence::None,
            valid: false,
        }
    }

    /// Weighted vote this snapshot contributes to its trend direction.
    fn vote_weight(&self) -> f64 {
        let (tf_weight, _, _) = timeframe_policy(self.timeframe);
        let duration_factor = self.periods.min(10.0).sqrt() / 3.0;
        tf_weight * duration_factor * self.confidence.weight()
    }
}

/// Accumulated weighted votes per trend direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendVotes {
    pub up: f64,
    pub down: f64,
    pub neutral: f64,
}

impl TrendVotes {
    fn add(&mut self, trend: Trend, weight: f64) {
        match trend {
            Trend::Up => self.up += weight,
            Trend::Down => self.down += weight,
            Trend::Neutral => self.neutral += weight,
            Trend::Unknown => {}
        }
    }

    fn get(&self, trend: Trend) -> f64 {
        match trend {
            Trend::Up => self.up,
            Trend::Down => self.down,
            Trend::Neutral => self.neutral,
            Trend::Unknown => 0.0,
        }
    }

    fn total(&self) -> f64 {
        self.up + self.down + self.neutral
    }

    /// Highest-scored direction; ties resolve UP over DOWN over NEUTRAL.
    fn dominant(&self) -> Trend {
        if self.up >= self.down && self.up >= self.neutral {
            Trend::Up
        } else if self.down >= self.neutral {
            Trend::Down
        } else {
            Trend::Neutral
        }
    }
}

/// Cross-timeframe agreement summary for one symbol.
#[derive(Debug, Clone)]
pub struct CoherenceResult {
    /// Share of weighted votes behind the dominant trend, 0–100.
    pub coherence_score: f64,
    /// Share of valid timeframes agreeing with the dominant trend, 0–100.
    pub trend_agreement: f64,
    pub dominant_timeframe: Option<Timeframe>,
    pub dominant_trend: Trend,
    pub conflicts: Vec<String>,
    pub agreement_level: AgreementLevel,
    pub recommendation: Recommendation,
    pub votes: TrendVotes,
}

impl Default for CoherenceResult {
    fn default() -> Self {
        Self {
            coherence_score: 0.0,
            trend_agreement: 0.0,
            dominant_timeframe: None,
            dominant_trend: Trend::Unknown,
            conflicts: Vec::new(),
            agreement_level: AgreementLevel::Inconsistent,
            recommendation: Recommendation::Neutral,
            votes: TrendVotes::default(),
        }
    }
}

/// Dominant trend per timeframe group (5m/15m vs 1h/2h).
#[derive(Debug, Clone, Copy)]
pub struct GroupTrends {
    pub short_term: Trend,
    pub long_term: Trend,
}

struct CachedSeries {
    series: MarketSeries,
    fetched_at: Instant,
}

struct CachedCoherence {
    result: CoherenceResult,
    computed_at: Instant,
}

/// Fetches and caches per-timeframe series, reads their trends and scores how
/// much the timeframes agree.
///
/// Owns two caches: per-(symbol, timeframe) enriched series refreshed on each
/// frame's own interval, and a per-symbol coherence result with a fixed TTL.
/// Both are engine-internal; callers only ever receive copies.
pub struct TimeframeCoordinator {
    market: Arc<dyn MarketData>,
    engine: Arc<dyn IndicatorEngine>,
    series_cache: RwLock<HashMap<(String, Timeframe), CachedSeries>>,
    coherence_cache: RwLock<HashMap<String, CachedCoherence>>,
}

impl TimeframeCoordinator {
    pub fn new(market: Arc<dyn MarketData>, engine: Arc<dyn IndicatorEngine>) -> Self {
        Self {
            market,
            engine,
            series_cache: RwLock::new(HashMap::new()),
            coherence_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Enriched series for every configured timeframe.
    ///
    /// Reuses each frame's cached series unless it is older than the frame's
    /// refresh interval or `force_refresh` is set. A failed fetch falls back
    /// to the last good series (or an empty one) and is logged, never
    /// propagated.
    pub async fn fetch_all(
        &self,
        symbol: &str,
        force_refresh: bool,
    ) -> HashMap<Timeframe, MarketSeries> {
        let mut result = HashMap::new();

        for tf in Timeframe::ALL {
            let (_, refresh, limit) = timeframe_policy(tf);
            let key = (symbol.to_string(), tf);

            let cached = {
                let cache = self.series_cache.read().await;
                cache.get(&key).map(|c| (c.series.clone(), c.fetched_at.elapsed()))
            };

            if let Some((series, age)) = &cached {
                if !force_refresh && *age <= refresh {
                    debug!(symbol = %symbol, timeframe = %tf, age_secs = age.as_secs(), "series cache hit");
                    result.insert(tf, series.clone());
                    continue;
                }
            }

            // Fetch outside any lock; stale data keeps flowing on failure.
            match self.market.klines(symbol, tf, limit).await {
                Ok(candles) => {
                    let series = self.engine.enrich(candles);
                    debug!(symbol = %symbol, timeframe = %tf, rows = series.len(), "series refreshed");
                    self.series_cache.write().await.insert(
                        key,
                        CachedSeries { series: series.clone(), fetched_at: Instant::now() },
                    );
                    result.insert(tf, series);
                }
                Err(e) => {
                    warn!(symbol = %symbol, timeframe = %tf, error = %e, "kline fetch failed");
                    let fallback = cached.map(|(s, _)| s).unwrap_or_else(MarketSeries::empty);
                    result.insert(tf, fallback);
                }
            }
        }

        result
    }

    /// Trend snapshot per timeframe. Empty series or a failed trend read
    /// yields an invalid snapshot instead of an error.
    pub fn analyze_trends(
        &self,
        symbol: &str,
        series_map: &HashMap<Timeframe, MarketSeries>,
    ) -> HashMap<Timeframe, TimeframeSnapshot> {
        let mut snapshots = HashMap::new();

        for tf in Timeframe::ALL {
            let Some(series) = series_map.get(&tf) else {
                snapshots.insert(tf, TimeframeSnapshot::invalid(tf));
                continue;
            };
            if series.is_empty() {
                snapshots.insert(tf, TimeframeSnapshot::invalid(tf));
                continue;
            }
            match self.engine.trend_and_duration(series) {
                Ok(reading) => {
                    let periods = reading.duration_minutes / tf.minutes();
                    debug!(
                        symbol = %symbol,
                        timeframe = %tf,
                        trend = %reading.trend,
                        periods = periods,
                        confidence = %reading.confidence,
                        "timeframe trend"
                    );
                    snapshots.insert(
                        tf,
                        TimeframeSnapshot {
                            timeframe: tf,
                            trend: reading.trend,
                            duration_minutes: reading.duration_minutes,
                            periods,
                            confidence: reading.confidence,
                            valid: true,
                        },
                    );
                }
                Err(e) => {
                    warn!(symbol = %symbol, timeframe = %tf, error = %e, "trend read failed");
                    snapshots.insert(tf, TimeframeSnapshot::invalid(tf));
                }
            }
        }

        snapshots
    }

    /// Score cross-timeframe agreement and cache the result under the
    /// coherence TTL.
    pub async fn compute_coherence(
        &self,
        symbol: &str,
        snapshots: &HashMap<Timeframe, TimeframeSnapshot>,
    ) -> CoherenceResult {
        let result = assemble_coherence(snapshots);

        info!(
            symbol = %symbol,
            coherence = result.coherence_score,
            agreement = result.trend_agreement,
            dominant = %result.dominant_trend,
            level = %result.agreement_level,
            recommendation = %result.recommendation,
            "coherence computed"
        );
        if !result.conflicts.is_empty() {
            warn!(symbol = %symbol, conflicts = ?result.conflicts, "trend conflicts detected");
        }

        self.coherence_cache.write().await.insert(
            symbol.to_string(),
            CachedCoherence { result: result.clone(), computed_at: Instant::now() },
        );
        result
    }

    /// Cached coherence if it is inside the TTL and no refresh was forced;
    /// otherwise fetch, analyze and recompute.
    pub async fn get_coherence(&self, symbol: &str, force_refresh: bool) -> CoherenceResult {
        if !force_refresh {
            let cache = self.coherence_cache.read().await;
            if let Some(entry) = cache.get(symbol) {
                if entry.computed_at.elapsed() < COHERENCE_TTL {
                    debug!(symbol = %symbol, age_secs = entry.computed_at.elapsed().as_secs(), "coherence cache hit");
                    return entry.result.clone();
                }
            }
        }

        let series_map = self.fetch_all(symbol, force_refresh).await;
        let snapshots = self.analyze_trends(symbol, &series_map);
        self.compute_coherence(symbol, &snapshots).await
    }

    /// Dominant trend of the short-frame and long-frame groups; an UP/DOWN
    /// tie inside a group reads as NEUTRAL.
    pub async fn timeframe_groups(&self, symbol: &str) -> GroupTrends {
        let series_map = self.fetch_all(symbol, false).await;
        let snapshots = self.analyze_trends(symbol, &series_map);

        GroupTrends {
            short_term: group_dominant(&snapshots, &SHORT_FRAMES),
            long_term: group_dominant(&snapshots, &LONG_FRAMES),
        }
    }

    /// Timeframe best suited to current conditions: the coherence dominant
    /// frame when there is one, otherwise volatility (ATR ratio) and trend
    /// strength (ADX) bands over the cached 15m series, defaulting to 15m.
    pub async fn primary_timeframe(&self, symbol: &str) -> Timeframe {
        let coherence = self.get_coherence(symbol, false).await;
        if let Some(tf) = coherence.dominant_timeframe {
            return tf;
        }

        let cached = {
            let cache = self.series_cache.read().await;
            cache
                .get(&(symbol.to_string(), Timeframe::M15))
                .map(|c| c.series.clone())
        };
        let Some(series) = cached else {
            return Timeframe::M15;
        };

        if let Some(atr) = column_last(&series.indicators.atr) {
            let atr_mean = column_tail_mean(&series.indicators.atr, series.len()).unwrap_or(0.0);
            if atr_mean > 0.0 {
                let ratio = atr / atr_mean;
                return if ratio > 2.0 {
                    Timeframe::H1
                } else if ratio > 1.5 {
                    Timeframe::M15
                } else if ratio < 0.5 {
                    Timeframe::M5
                } else {
                    Timeframe::M15
                };
            }
        }
        if let Some(adx) = column_last(&series.indicators.adx) {
            if adx > 30.0 {
                return Timeframe::H1;
            }
            if adx < 15.0 {
                return Timeframe::M5;
            }
        }
        Timeframe::M15
    }

    pub(crate) fn market(&self) -> &Arc<dyn MarketData> {
        &self.market
    }
}

/// Pure aggregation of timeframe snapshots into a coherence result.
pub fn assemble_coherence(snapshots: &HashMap<Timeframe, TimeframeSnapshot>) -> CoherenceResult {
    let valid: Vec<&TimeframeSnapshot> = Timeframe::ALL
        .iter()
        .filter_map(|tf| snapshots.get(tf))
        .filter(|s| s.valid && s.trend != Trend::Unknown)
        .collect();

    if valid.is_empty() {
        return CoherenceResult::default();
    }

    let mut votes = TrendVotes::default();
    for snapshot in &valid {
        votes.add(snapshot.trend, snapshot.vote_weight());
    }

    let mut conflicts = Vec::new();
    let up_frames: Vec<Timeframe> =
        valid.iter().filter(|s| s.trend == Trend::Up).map(|s| s.timeframe).collect();
    let down_frames: Vec<Timeframe> =
        valid.iter().filter(|s| s.trend == Trend::Down).map(|s| s.timeframe).collect();

    if !up_frames.is_empty() && !down_frames.is_empty() {
        let group_all = |frames: &[Timeframe], trend: Trend| {
            valid
                .iter()
                .filter(|s| frames.contains(&s.timeframe))
                .all(|s| s.trend == trend)
        };
        let short_up = group_all(&SHORT_FRAMES, Trend::Up);
        let short_down = group_all(&SHORT_FRAMES, Trend::Down);
        let long_up = group_all(&LONG_FRAMES, Trend::Up);
        let long_down = group_all(&LONG_FRAMES, Trend::Down);

        if short_up && long_down {
            conflicts.push(format!(
                "short-term up ({}) vs long-term down ({})",
                frame_list(&up_frames),
                frame_list(&down_frames)
            ));
            // Long frames are the more reliable witness.
            votes.add(Trend::Down, LONG_FRAME_BONUS);
        } else if short_down && long_up {
            conflicts.push(format!(
                "short-term down ({}) vs long-term up ({})",
                frame_list(&down_frames),
                frame_list(&up_frames)
            ));
            votes.add(Trend::Up, LONG_FRAME_BONUS);
        } else {
            conflicts.push(format!(
                "up trend ({}) vs down trend ({})",
                frame_list(&up_frames),
                frame_list(&down_frames)
            ));
        }
    }

    let dominant_trend = votes.dominant();
    let total_weight = votes.total();
    let coherence_score = if total_weight > 0.0 {
        (votes.get(dominant_trend) / total_weight) * 100.0
    } else {
        0.0
    };
    let agreeing = valid.iter().filter(|s| s.trend == dominant_trend).count();
    let trend_agreement = (agreeing as f64 / valid.len() as f64) * 100.0;

    let dominant_timeframe = valid
        .iter()
        .filter(|s| s.trend == dominant_trend)
        .max_by(|a, b| a.vote_weight().total_cmp(&b.vote_weight()))
        .map(|s| s.timeframe);

    let agreement_level = if coherence_score >= 80.0 && trend_agreement >= 80.0 {
        AgreementLevel::High
    } else if coherence_score >= 70.0 && trend_agreement >= 60.0 {
        AgreementLevel::Strong
    } else if coherence_score >= 60.0 && trend_agreement >= 50.0 {
        AgreementLevel::Medium
    } else if coherence_score >= 50.0 {
        AgreementLevel::Weak
    } else {
        AgreementLevel::Inconsistent
    };

    let recommendation = match (dominant_trend, agreement_level) {
        (Trend::Up, AgreementLevel::High | AgreementLevel::Strong) => Recommendation::Buy,
        (Trend::Down, AgreementLevel::High | AgreementLevel::Strong) => Recommendation::Sell,
        (Trend::Up, AgreementLevel::Medium) => Recommendation::LightUp,
        (Trend::Down, AgreementLevel::Medium) => Recommendation::LightDown,
        _ => Recommendation::Neutral,
    };

    CoherenceResult {
        coherence_score,
        trend_agreement,
        dominant_timeframe,
        dominant_trend,
        conflicts,
        agreement_level,
        recommendation,
        votes,
    }
}

fn group_dominant(
    snapshots: &HashMap<Timeframe, TimeframeSnapshot>,
    frames: &[Timeframe],
) -> Trend {
    let mut up = 0usize;
    let mut down = 0usize;
    let mut neutral = 0usize;
    for tf in frames {
        if let Some(s) = snapshots.get(tf) {
            if s.valid {
                match s.trend {
                    Trend::Up => up += 1,
                    Trend::Down => down += 1,
                    Trend::Neutral => neutral += 1,
                    Trend::Unknown => {}
                }
            }
        }
    }
    if up == down {
        return Trend::Neutral;
    }
    if up >= down && up >= neutral {
        Trend::Up
    } else if down >= neutral {
        Trend::Down
    } else {
        Trend::Neutral
    }
}

fn frame_list(frames: &[Timeframe]) -> String {
    frames
        .iter()
        .map(|tf| tf.interval())
        .collect::<Vec<_>>()
        .join(",")
}
