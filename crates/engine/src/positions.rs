use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{error, info, warn};

use common::{ClosedTrade, Direction, ExecutionClient, Fill, MarketData, OpenPosition};

use crate::monitor::MonitorHandle;

/// Open positions and their exit supervision.
///
/// Holds at most one position per (symbol, direction): a second fill for the
/// same pair merges in by volume-weighted average price. A background
/// monitor polls the live price on a fixed interval and fully liquidates any
/// position whose profit fraction crosses its take-profit or stop-loss
/// threshold. As with the waitlist, all network I/O happens outside the
/// collection lock.
pub struct PositionBook {
    inner: Arc<BookInner>,
}

struct BookInner {
    positions: RwLock<Vec<OpenPosition>>,
    market: Arc<dyn MarketData>,
    execution: Arc<dyn ExecutionClient>,
    poll_interval: Duration,
    monitor: Mutex<MonitorHandle>,
}

impl PositionBook {
    pub fn new(
        market: Arc<dyn MarketData>,
        execution: Arc<dyn ExecutionClient>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BookInner {
                positions: RwLock::new(Vec::new()),
                market,
                execution,
                poll_interval,
                monitor: Mutex::new(MonitorHandle::default()),
            }),
        }
    }

    /// Record a fill: merge into the existing (symbol, direction) position
    /// by volume-weighted average price, or open a new one.
    pub async fn record(&self, fill: Fill) {
        let mut positions = self.inner.positions.write().await;

        if let Some(pos) = positions
            .iter_mut()
            .find(|p| p.symbol == fill.symbol && p.direction == fill.direction)
        {
            let total = pos.quantity + fill.quantity;
            if total <= 0.0 {
                warn!(symbol = %fill.symbol, "ignoring merge with non-positive quantity");
                return;
            }
            pos.entry_price =
                (pos.entry_price * pos.quantity + fill.price * fill.quantity) / total;
            pos.quantity = total;
            pos.updated_at = fill.timestamp;
            pos.take_profit = fill.take_profit;
            pos.stop_loss = fill.stop_loss;
            info!(
                symbol = %pos.symbol,
                direction = %pos.direction,
                entry = pos.entry_price,
                qty = pos.quantity,
                "position merged"
            );
            return;
        }

        let position = OpenPosition {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: fill.symbol.clone(),
            direction: fill.direction,
            entry_price: fill.price,
            quantity: fill.quantity,
            opened_at: fill.timestamp,
            updated_at: fill.timestamp,
            take_profit: fill.take_profit,
            stop_loss: fill.stop_loss,
        };
        info!(
            symbol = %position.symbol,
            direction = %position.direction,
            entry = position.entry_price,
            qty = position.quantity,
            take_profit = position.take_profit,
            stop_loss = position.stop_loss,
            "position opened"
        );
        positions.push(position);
    }

    /// Fully liquidate matching positions; `direction = None` closes both
    /// sides of the symbol. Positions the execution client rejects stay in
    /// the book.
    pub async fn close(&self, symbol: &str, direction: Option<Direction>) -> Vec<ClosedTrade> {
        self.inner.close_matching(symbol, direction).await
    }

    /// Point-in-time copy of the open set, for display.
    pub async fn open_positions(&self) -> Vec<OpenPosition> {
        self.inner.positions.read().await.clone()
    }

    /// Start the exit monitor; idempotent.
    pub async fn start_monitor(&self) {
        let mut monitor = self.inner.monitor.lock().await;
        if monitor.is_running() {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(monitor_loop(self.inner.clone(), stop_rx));
        monitor.track(task, stop_tx);
        info!("position monitor started");
    }

    /// Stop the monitor and wait for it, bounded.
    pub async fn shutdown(&self) {
        self.inner.monitor.lock().await.stop("position-book").await;
    }
}

impl BookInner {
    async fn close_matching(&self, symbol: &str, direction: Option<Direction>) -> Vec<ClosedTrade> {
        let matching: Vec<OpenPosition> = {
            let positions = self.positions.read().await;
            positions
                .iter()
                .filter(|p| p.symbol == symbol && direction.map_or(true, |d| d == p.direction))
                .cloned()
                .collect()
        };
        if matching.is_empty() {
            warn!(symbol = %symbol, direction = ?direction, "no position to close");
            return Vec::new();
        }

        let mut closed = Vec::new();
        for pos in matching {
            match self.execution.close(&pos.symbol, pos.direction, pos.quantity).await {
                Ok(exit_price) => {
                    let profit_pct = pos.profit_pct(exit_price);
                    info!(
                        symbol = %pos.symbol,
                        direction = %pos.direction,
                        entry = pos.entry_price,
                        exit = exit_price,
                        profit_pct = profit_pct,
                        "position closed"
                    );
                    closed.push(ClosedTrade { position: pos, exit_price, profit_pct });
                }
                Err(e) => {
                    error!(symbol = %pos.symbol, direction = %pos.direction, error = %e, "close failed");
                }
            }
        }

        if !closed.is_empty() {
            let mut positions = self.positions.write().await;
            positions.retain(|p| !closed.iter().any(|c| c.position.id == p.id));
        }
        closed
    }
}

async fn monitor_loop(inner: Arc<BookInner>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        // Snapshot under the lock, then evaluate each position outside it.
        let open = inner.positions.read().await.clone();
        for pos in open {
            let price = match inner.market.latest_price(&pos.symbol).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(symbol = %pos.symbol, error = %e, "price poll failed");
                    continue;
                }
            };
            let profit_pct = pos.profit_pct(price);

            if profit_pct >= pos.take_profit {
                info!(
                    symbol = %pos.symbol,
                    direction = %pos.direction,
                    profit_pct = profit_pct,
                    threshold = pos.take_profit,
                    "take-profit reached"
                );
                inner.close_matching(&pos.symbol, Some(pos.direction)).await;
            } else if profit_pct <= pos.stop_loss {
                info!(
                    symbol = %pos.symbol,
                    direction = %pos.direction,
                    profit_pct = profit_pct,
                    threshold = pos.stop_loss,
                    "stop-loss reached"
                );
                inner.close_matching(&pos.symbol, Some(pos.direction)).await;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(inner.poll_interval) => {}
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!("position monitor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use paper::PaperClient;

    fn fill(symbol: &str, direction: Direction, price: f64, quantity: f64) -> Fill {
        Fill {
            symbol: symbol.into(),
            direction,
            price,
            quantity,
            take_profit: 0.0175,
            stop_loss: -0.0125,
            timestamp: Utc::now(),
        }
    }

    fn book(client: Arc<PaperClient>) -> PositionBook {
        PositionBook::new(client.clone(), client, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn same_pair_fills_merge_by_vwap() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        let book = book(client);

        book.record(fill("BTCUSDT", Direction::Long, 100.0, 1.0)).await;
        book.record(fill("BTCUSDT", Direction::Long, 200.0, 3.0)).await;

        let positions = book.open_positions().await;
        assert_eq!(positions.len(), 1, "same pair must never duplicate");
        // (100*1 + 200*3) / 4 = 175
        assert!((positions[0].entry_price - 175.0).abs() < 1e-9);
        assert!((positions[0].quantity - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn opposite_directions_are_separate_positions() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        let book = book(client);

        book.record(fill("BTCUSDT", Direction::Long, 100.0, 1.0)).await;
        book.record(fill("BTCUSDT", Direction::Short, 100.0, 1.0)).await;

        assert_eq!(book.open_positions().await.len(), 2);
    }

    #[tokio::test]
    async fn close_realizes_profit_and_empties_the_book() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        client.set_price("BTCUSDT", 110.0).await;
        let book = book(client);

        book.record(fill("BTCUSDT", Direction::Long, 100.0, 1.0)).await;
        let closed = book.close("BTCUSDT", Some(Direction::Long)).await;

        assert_eq!(closed.len(), 1);
        assert!((closed[0].profit_pct - 0.10).abs() < 1e-9);
        assert!(book.open_positions().await.is_empty());
    }

    #[tokio::test]
    async fn short_profit_is_computed_inverted() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        client.set_price("BTCUSDT", 90.0).await;
        let book = book(client);

        book.record(fill("BTCUSDT", Direction::Short, 100.0, 1.0)).await;
        let closed = book.close("BTCUSDT", None).await;

        assert_eq!(closed.len(), 1);
        assert!((closed[0].profit_pct - 0.10).abs() < 1e-9);
    }

    #[tokio::test]
    async fn close_of_an_unknown_symbol_is_a_noop() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        let book = book(client);
        assert!(book.close("GHOSTUSDT", None).await.is_empty());
    }

    #[tokio::test]
    async fn monitor_closes_on_take_profit() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        let book = book(client.clone());

        // take_profit 0.0175 on entry 100 → close at or above 101.75
        book.record(fill("BTCUSDT", Direction::Long, 100.0, 1.0)).await;
        book.start_monitor().await;

        client.set_price("BTCUSDT", 101.75).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(
            book.open_positions().await.is_empty(),
            "position should auto-close at the take-profit threshold"
        );
        book.shutdown().await;
    }

    #[tokio::test]
    async fn monitor_closes_on_stop_loss() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        let book = book(client.clone());

        // stop_loss −0.0125 on entry 100 → close at or below 98.75
        book.record(fill("BTCUSDT", Direction::Long, 100.0, 1.0)).await;
        book.start_monitor().await;

        client.set_price("BTCUSDT", 98.75).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(book.open_positions().await.is_empty());
        book.shutdown().await;
    }

    #[tokio::test]
    async fn monitor_holds_inside_the_thresholds() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        let book = book(client.clone());

        book.record(fill("BTCUSDT", Direction::Long, 100.0, 1.0)).await;
        book.start_monitor().await;

        client.set_price("BTCUSDT", 100.9).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(book.open_positions().await.len(), 1, "inside the band, nothing closes");
        book.shutdown().await;
    }

    #[tokio::test]
    async fn price_fetch_failure_skips_the_position() {
        // No price fed: every poll fails, the position must survive.
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        let book = book(client);

        book.record(fill("BTCUSDT", Direction::Long, 100.0, 1.0)).await;
        book.start_monitor().await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(book.open_positions().await.len(), 1);
        book.shutdown().await;
    }

    #[tokio::test]
    async fn record_then_close_round_trip_clears_the_pair() {
        let client = Arc::new(PaperClient::new(10_000.0, 0.0));
        client.set_price("ETHUSDT", 100.0).await;
        let book = book(client);

        book.record(fill("ETHUSDT", Direction::Long, 100.0, 2.0)).await;
        let closed = book.close("ETHUSDT", Some(Direction::Long)).await;
        assert_eq!(closed.len(), 1);
        assert!((closed[0].position.quantity - 2.0).abs() < 1e-9);

        let remaining = book.open_positions().await;
        assert!(
            !remaining
                .iter()
                .any(|p| p.symbol == "ETHUSDT" && p.direction == Direction::Long),
            "closed pair must leave the book"
        );
    }
}
