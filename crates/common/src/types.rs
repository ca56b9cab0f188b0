use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Order side that opens a position in this direction.
    pub fn open_side(&self) -> &'static str {
        match self {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
        }
    }

    /// Order side that closes a position in this direction.
    pub fn close_side(&self) -> &'static str {
        match self {
            Direction::Long => "SELL",
            Direction::Short => "BUY",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Trend direction read from a single timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Neutral,
    Unknown,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "UP"),
            Trend::Down => write!(f, "DOWN"),
            Trend::Neutral => write!(f, "NEUTRAL"),
            Trend::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Confidence attached to a trend reading by the indicator engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendConfidence {
    High,
    MediumHigh,
    Medium,
    Low,
    None,
}

impl TrendConfidence {
    /// Vote weight used when accumulating trend scores across timeframes.
    pub fn weight(&self) -> f64 {
        match self {
            TrendConfidence::High => 1.0,
            TrendConfidence::MediumHigh => 0.8,
            TrendConfidence::Medium => 0.6,
            TrendConfidence::Low => 0.4,
            TrendConfidence::None => 0.2,
        }
    }
}

impl std::fmt::Display for TrendConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendConfidence::High => write!(f, "high"),
            TrendConfidence::MediumHigh => write!(f, "medium-high"),
            TrendConfidence::Medium => write!(f, "medium"),
            TrendConfidence::Low => write!(f, "low"),
            TrendConfidence::None => write!(f, "none"),
        }
    }
}

/// How strongly the timeframes agree on one trend, from strongest to weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    High,
    Strong,
    Medium,
    Weak,
    Inconsistent,
}

impl std::fmt::Display for AgreementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgreementLevel::High => write!(f, "high"),
            AgreementLevel::Strong => write!(f, "strong"),
            AgreementLevel::Medium => write!(f, "medium"),
            AgreementLevel::Weak => write!(f, "weak"),
            AgreementLevel::Inconsistent => write!(f, "inconsistent"),
        }
    }
}

/// Trading stance derived from cross-timeframe agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Sell,
    LightUp,
    LightDown,
    Neutral,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::Buy => write!(f, "BUY"),
            Recommendation::Sell => write!(f, "SELL"),
            Recommendation::LightUp => write!(f, "LIGHT_UP"),
            Recommendation::LightDown => write!(f, "LIGHT_DOWN"),
            Recommendation::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Final per-symbol signal after the quality score is reconciled with the
/// recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSignal {
    Buy,
    Sell,
    LightBuy,
    LightSell,
    Neutral,
}

impl std::fmt::Display for TradeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSignal::Buy => write!(f, "BUY"),
            TradeSignal::Sell => write!(f, "SELL"),
            TradeSignal::LightBuy => write!(f, "LIGHT_BUY"),
            TradeSignal::LightSell => write!(f, "LIGHT_SELL"),
            TradeSignal::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Label attached to an entry-timing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingQuality {
    Excellent,
    Good,
    Fair,
    Unknown,
}

impl std::fmt::Display for TimingQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimingQuality::Excellent => write!(f, "excellent"),
            TimingQuality::Good => write!(f, "good"),
            TimingQuality::Fair => write!(f, "fair"),
            TimingQuality::Unknown => write!(f, "unknown"),
        }
    }
}

/// Candle aggregation interval over which trend is independently assessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M5,
    M15,
    H1,
    H2,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Timeframe::M5, Timeframe::M15, Timeframe::H1, Timeframe::H2];

    /// Exchange interval string for kline requests.
    pub fn interval(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
        }
    }

    pub fn minutes(&self) -> f64 {
        match self {
            Timeframe::M5 => 5.0,
            Timeframe::M15 => 15.0,
            Timeframe::H1 => 60.0,
            Timeframe::H2 => 120.0,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.interval())
    }
}

/// A deferred entry waiting for its target price.
///
/// At most one entry exists per (symbol, direction) pair; re-adding the same
/// pair replaces the previous entry (latest intent wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub symbol: String,
    pub direction: Direction,
    /// Order notional in quote currency.
    pub amount: f64,
    pub leverage: u32,
    pub target_price: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Human-readable description of the condition being waited for.
    pub condition: String,
    pub timing_quality: TimingQuality,
}

impl WaitingEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Confirmation of a filled entry order returned by the execution client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub direction: Direction,
    pub price: f64,
    pub quantity: f64,
    /// Profit fraction at which the position auto-closes.
    pub take_profit: f64,
    /// Loss fraction (negative) at which the position auto-closes.
    pub stop_loss: f64,
    pub timestamp: DateTime<Utc>,
}

/// An open position tracked by the position book.
///
/// Entry price is the volume-weighted average across merged fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    pub id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub take_profit: f64,
    pub stop_loss: f64,
}

impl OpenPosition {
    /// Signed profit fraction at the given mark price.
    pub fn profit_pct(&self, current_price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        match self.direction {
            Direction::Long => (current_price - self.entry_price) / self.entry_price,
            Direction::Short => (self.entry_price - current_price) / self.entry_price,
        }
    }
}

/// A fully-liquidated position together with its realized outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: OpenPosition,
    pub exit_price: f64,
    pub profit_pct: f64,
}

/// Trend reading produced by the indicator engine for one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReading {
    pub trend: Trend,
    /// How long the trend has persisted, in wall-clock minutes.
    pub duration_minutes: f64,
    pub confidence: TrendConfidence,
    pub reason: String,
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}
