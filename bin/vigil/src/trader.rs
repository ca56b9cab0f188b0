use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use coherence::TimeframeCoordinator;
use common::{
    Config, Direction, EntryOrder, ExecutionClient, Fill, IndicatorEngine, MarketData,
    MarketSeries, SymbolConfig, TradeSignal, Trend, WaitingEntry,
};
use engine::{check_entry_timing, EntryWaitlist};
use quality::{leverage_for_score, order_notional, QualityScorer, SentimentSnapshot};

/// Reference asset whose short-horizon move stands in for overall market
/// mood.
const REFERENCE_SYMBOL: &str = "BTCUSDC";

/// The per-symbol decision loop: score, adjust, and either enter now or park
/// the entry on the waitlist.
pub struct Trader {
    market: Arc<dyn MarketData>,
    execution: Arc<dyn ExecutionClient>,
    coordinator: Arc<TimeframeCoordinator>,
    scorer: QualityScorer,
    waitlist: Arc<EntryWaitlist>,
    fill_tx: mpsc::Sender<Fill>,
    take_profit: f64,
    stop_loss: f64,
}

impl Trader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market: Arc<dyn MarketData>,
        execution: Arc<dyn ExecutionClient>,
        engine: Arc<dyn IndicatorEngine>,
        coordinator: Arc<TimeframeCoordinator>,
        waitlist: Arc<EntryWaitlist>,
        fill_tx: mpsc::Sender<Fill>,
        config: &Config,
    ) -> Self {
        Self {
            market,
            execution,
            coordinator,
            scorer: QualityScorer::new(engine),
            waitlist,
            fill_tx,
            take_profit: config.take_profit_pct,
            stop_loss: config.stop_loss_pct,
        }
    }

    /// One decision pass over a watched symbol. Faults are logged and leave
    /// the rest of the scan untouched.
    pub async fn scan_symbol(&self, cfg: &SymbolConfig) {
        let symbol = cfg.name.as_str();

        let series_map = self.coordinator.fetch_all(symbol, false).await;
        let primary = self.coordinator.primary_timeframe(symbol).await;
        let Some(series) = series_map.get(&primary) else {
            warn!(symbol = %symbol, timeframe = %primary, "no primary series, skipping");
            return;
        };

        let sentiment = self.sentiment(symbol).await;
        let (raw_score, metrics) = self.scorer.score(symbol, series, Some(&sentiment));
        if metrics.insufficient_data {
            warn!(symbol = %symbol, "insufficient data, skipping");
            return;
        }

        let (signal, adjusted, _details) =
            self.coordinator.generate_signal(symbol, raw_score).await;

        let (direction, size_factor) = match signal {
            TradeSignal::Buy => (Direction::Long, 1.0),
            TradeSignal::Sell => (Direction::Short, 1.0),
            // Light signals trade at half size.
            TradeSignal::LightBuy => (Direction::Long, 0.5),
            TradeSignal::LightSell => (Direction::Short, 0.5),
            TradeSignal::Neutral => return,
        };

        let leverage = leverage_for_score(adjusted).min(cfg.max_leverage);
        let amount = if cfg.amount > 0.0 {
            cfg.amount * size_factor
        } else {
            let balance = match self.execution.account_balance().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "balance lookup failed, skipping entry");
                    return;
                }
            };
            order_notional(balance, self.stop_loss.abs()) * size_factor
        };

        let trend = metrics.trend.unwrap_or(Trend::Unknown);
        self.place_order(symbol, direction, amount, leverage, series, trend, false)
            .await;
    }

    /// Submit an entry, or defer it onto the waitlist when the timing check
    /// disapproves. `force` skips the timing check (used for manual and
    /// waitlist-triggered entries, which must not re-enter the check).
    #[allow(clippy::too_many_arguments)]
    pub async fn place_order(
        &self,
        symbol: &str,
        direction: Direction,
        amount: f64,
        leverage: u32,
        series: &MarketSeries,
        trend: Trend,
        force: bool,
    ) -> bool {
        if !force {
            let price = match self.market.latest_price(symbol).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "price fetch failed, skipping entry");
                    return false;
                }
            };
            let timing = check_entry_timing(series, direction, price, trend);
            if !timing.should_enter {
                info!(
                    symbol = %symbol,
                    direction = %direction,
                    expected = timing.expected_price,
                    wait_minutes = timing.wait_minutes,
                    reason = %timing.reason,
                    "timing unfavourable, deferring entry"
                );
                let now = Utc::now();
                self.waitlist
                    .add(WaitingEntry {
                        symbol: symbol.to_string(),
                        direction,
                        amount,
                        leverage,
                        target_price: timing.expected_price,
                        created_at: now,
                        expires_at: now
                            + chrono::Duration::minutes(timing.expiry_minutes() as i64),
                        condition: timing.reason,
                        timing_quality: timing.quality,
                    })
                    .await;
                return false;
            }
            info!(symbol = %symbol, quality = %timing.quality, reason = %timing.reason, "timing favourable");
        }

        let order = EntryOrder {
            symbol: symbol.to_string(),
            direction,
            amount,
            leverage,
            take_profit: self.take_profit,
            stop_loss: self.stop_loss,
        };
        match self.execution.open(&order).await {
            Ok(fill) => {
                info!(
                    symbol = %symbol,
                    direction = %direction,
                    price = fill.price,
                    qty = fill.quantity,
                    leverage = leverage,
                    "entry filled"
                );
                // A filled entry supersedes any pending deferral for the pair.
                self.waitlist.cancel(symbol, direction).await;
                let _ = self.fill_tx.send(fill).await;
                true
            }
            Err(e) => {
                error!(symbol = %symbol, direction = %direction, error = %e, "entry failed");
                false
            }
        }
    }

    async fn sentiment(&self, symbol: &str) -> SentimentSnapshot {
        let reference = match self
            .market
            .klines(REFERENCE_SYMBOL, common::Timeframe::M15, 50)
            .await
        {
            Ok(candles) => Some(MarketSeries { candles, indicators: Default::default() }),
            Err(e) => {
                warn!(error = %e, "reference series unavailable");
                None
            }
        };
        let funding_rate = self.market.funding_rate(symbol).await.ok();
        SentimentSnapshot { reference, funding_rate }
    }

    /// Run the scan loop until shutdown is signalled.
    pub async fn run(self, watchlist: Vec<SymbolConfig>, scan_interval: Duration) {
        info!(symbols = watchlist.len(), interval_secs = scan_interval.as_secs(), "trader running");
        let mut ticker = tokio::time::interval(scan_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for cfg in &watchlist {
                self.scan_symbol(cfg).await;
            }
        }
    }
}
