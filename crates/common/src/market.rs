use async_trait::async_trait;

use crate::series::{Candle, MarketSeries};
use crate::types::{Direction, Fill, Timeframe, TrendReading};
use crate::Result;

/// Abstraction over the market-data feed.
///
/// `BinanceFuturesClient` implements this for live trading, `PaperClient`
/// for simulation. Background monitors call `latest_price` on every tick,
/// so implementations should be cheap to call repeatedly.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Latest traded price for a symbol.
    async fn latest_price(&self, symbol: &str) -> Result<f64>;

    /// Recent candles for a symbol at the given interval, oldest first.
    async fn klines(&self, symbol: &str, timeframe: Timeframe, limit: usize)
        -> Result<Vec<Candle>>;

    /// Current funding rate of the perpetual contract.
    async fn funding_rate(&self, symbol: &str) -> Result<f64>;
}

/// A market entry to be submitted by the execution client.
#[derive(Debug, Clone)]
pub struct EntryOrder {
    pub symbol: String,
    pub direction: Direction,
    /// Notional in quote currency.
    pub amount: f64,
    pub leverage: u32,
    /// Profit fraction carried onto the resulting position.
    pub take_profit: f64,
    /// Loss fraction (negative) carried onto the resulting position.
    pub stop_loss: f64,
}

/// Abstraction over order placement and liquidation.
///
/// Implementations are the exchange's source of truth; callers treat a
/// returned error as a rejected order and never blind-retry it.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Submit a market entry and return the fill confirmation.
    async fn open(&self, order: &EntryOrder) -> Result<Fill>;

    /// Fully liquidate a position and return the exit price.
    async fn close(&self, symbol: &str, direction: Direction, quantity: f64) -> Result<f64>;

    /// Free account balance in quote currency.
    async fn account_balance(&self) -> Result<f64>;
}

/// Abstraction over indicator computation.
///
/// Pure computation over immutable inputs: enriching the same candles or
/// reading the same series twice yields identical output.
pub trait IndicatorEngine: Send + Sync {
    /// Attach indicator columns to a raw candle series.
    fn enrich(&self, candles: Vec<Candle>) -> MarketSeries;

    /// Classify the prevailing trend of an enriched series and estimate how
    /// long it has persisted.
    fn trend_and_duration(&self, series: &MarketSeries) -> Result<TrendReading>;
}
