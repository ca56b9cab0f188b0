use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{error, info, warn};

use common::{Direction, EntryOrder, ExecutionClient, Fill, MarketData, WaitingEntry};

use crate::monitor::MonitorHandle;

/// Tolerance applied to entry targets: a long triggers at or below
/// target × (1 + ε), a short at or above target × (1 − ε).
pub const PRICE_TOLERANCE: f64 = 0.001;

/// Deferred entries waiting for their target price.
///
/// The pending set is keyed by (symbol, direction): re-adding a pair
/// replaces the previous entry. A background monitor polls the live price on
/// a fixed interval and triggers, expires or keeps each entry; it stops
/// itself once the set drains and is restarted by the next `add`. Price
/// lookups and order execution happen outside the set's lock, so callers are
/// never blocked behind network I/O.
pub struct EntryWaitlist {
    inner: Arc<WaitlistInner>,
}

struct WaitlistInner {
    entries: RwLock<Vec<WaitingEntry>>,
    market: Arc<dyn MarketData>,
    execution: Arc<dyn ExecutionClient>,
    /// Successful triggered fills are handed off here for position recording.
    fill_tx: mpsc::Sender<Fill>,
    poll_interval: Duration,
    /// Exit thresholds stamped onto orders triggered from the waitlist.
    take_profit: f64,
    stop_loss: f64,
    monitor: Mutex<MonitorHandle>,
}

impl EntryWaitlist {
    pub fn new(
        market: Arc<dyn MarketData>,
        execution: Arc<dyn ExecutionClient>,
        fill_tx: mpsc::Sender<Fill>,
        poll_interval: Duration,
        take_profit: f64,
        stop_loss: f64,
    ) -> Self {
        Self {
            inner: Arc::new(WaitlistInner {
                entries: RwLock::new(Vec::new()),
                market,
                execution,
                fill_tx,
                poll_interval,
                take_profit,
                stop_loss,
                monitor: Mutex::new(MonitorHandle::default()),
            }),
        }
    }

    /// Queue a deferred entry, replacing any pending entry for the same
    /// (symbol, direction), and make sure the monitor is running.
    pub async fn add(&self, entry: WaitingEntry) {
        {
            let mut entries = self.inner.entries.write().await;
            if let Some(idx) = entries
                .iter()
                .position(|e| e.symbol == entry.symbol && e.direction == entry.direction)
            {
                info!(symbol = %entry.symbol, direction = %entry.direction, "replacing waiting entry");
                entries.remove(idx);
            }
            info!(
                symbol = %entry.symbol,
                direction = %entry.direction,
                target = entry.target_price,
                expires_at = %entry.expires_at,
                condition = %entry.condition,
                "waiting entry queued"
            );
            entries.push(entry);
        }
        self.ensure_monitor().await;
    }

    /// Drop any pending entry for the pair; no-op when absent.
    pub async fn cancel(&self, symbol: &str, direction: Direction) -> bool {
        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !(e.symbol == symbol && e.direction == direction));
        let removed = entries.len() < before;
        if removed {
            info!(symbol = %symbol, direction = %direction, "waiting entry cancelled");
        }
        removed
    }

    /// Point-in-time copy of the pending set, for display.
    pub async fn pending(&self) -> Vec<WaitingEntry> {
        self.inner.entries.read().await.clone()
    }

    /// Stop the monitor and wait for it, bounded.
    pub async fn shutdown(&self) {
        self.inner.monitor.lock().await.stop("entry-waitlist").await;
    }

    async fn ensure_monitor(&self) {
        let mut monitor = self.inner.monitor.lock().await;
        if monitor.is_running() {
            return;
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(monitor_loop(self.inner.clone(), stop_rx));
        monitor.track(task, stop_tx);
        info!("entry monitor started");
    }
}

async fn monitor_loop(inner: Arc<WaitlistInner>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        // Snapshot under the lock, then do all I/O outside it.
        let pending = inner.entries.read().await.clone();
        if pending.is_empty() {
            info!("waitlist empty, entry monitor stopping");
            break;
        }

        let now = Utc::now();
        let mut done: Vec<(String, Direction)> = Vec::new();

        for entry in pending {
            if entry.is_expired(now) {
                warn!(
                    symbol = %entry.symbol,
                    direction = %entry.direction,
                    expired_at = %entry.expires_at,
                    "waiting entry expired"
                );
                done.push((entry.symbol.clone(), entry.direction));
                continue;
            }

            let price = match inner.market.latest_price(&entry.symbol).await {
                Ok(p) => p,
                Err(e) => {
                    // Transient: skip this entry this cycle, retry next tick.
                    warn!(symbol = %entry.symbol, error = %e, "price poll failed");
                    continue;
                }
            };

            let met = match entry.direction {
                Direction::Long => price <= entry.target_price * (1.0 + PRICE_TOLERANCE),
                Direction::Short => price >= entry.target_price * (1.0 - PRICE_TOLERANCE),
            };
            if !met {
                continue;
            }

            info!(
                symbol = %entry.symbol,
                direction = %entry.direction,
                target = entry.target_price,
                price = price,
                "entry condition met, executing"
            );

            let order = EntryOrder {
                symbol: entry.symbol.clone(),
                direction: entry.direction,
                amount: entry.amount,
                leverage: entry.leverage,
                take_profit: inner.take_profit,
                stop_loss: inner.stop_loss,
            };
            match inner.execution.open(&order).await {
                Ok(fill) => {
                    info!(symbol = %fill.symbol, price = fill.price, qty = fill.quantity, "triggered entry filled");
                    let _ = inner.fill_tx.send(fill).await;
                }
                Err(e) => {
                    // A rejected order is not retried; re-triggering it every
                    // poll would hammer the exchange with a known-bad order.
                    error!(symbol = %entry.symbol, error = %e, "triggered entry failed, dropping");
                }
            }
            done.push((entry.symbol.clone(), entry.direction));
        }

        if !done.is_empty() {
            let mut entries = inner.entries.write().await;
            entries.retain(|e| !done.iter().any(|(s, d)| *s == e.symbol && *d == e.direction));
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
    info!("entry monitor stopped");
}
