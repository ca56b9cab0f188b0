pub mod adjust;
pub mod engine;

pub use adjust::{AdjustmentTrail, PricePrediction, ScoreAdjustment, SignalDetails};
pub use engine::{
    assemble_coherence, timeframe_policy, CoherenceResult, GroupTrends, TimeframeCoordinator,
    TimeframeSnapshot, TrendVotes, COHERENCE_TTL,
};
