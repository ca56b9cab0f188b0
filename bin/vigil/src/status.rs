use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::MarketData;
use engine::{EntryWaitlist, PositionBook};

/// Print the pending-entry and open-position tables once.
pub async fn print_status(
    waitlist: &EntryWaitlist,
    book: &PositionBook,
    market: &Arc<dyn MarketData>,
) {
    let pending = waitlist.pending().await;
    let now = Utc::now();

    if pending.is_empty() {
        println!("waiting queue: empty");
    } else {
        println!("\n==== waiting entries ====");
        println!(
            "{:<12} {:<6} {:>12} {:>12} {:>9}  {}",
            "symbol", "side", "target", "current", "remaining", "condition"
        );
        println!("{}", "-".repeat(90));
        for entry in &pending {
            let current = market.latest_price(&entry.symbol).await.unwrap_or(0.0);
            let remaining = (entry.expires_at - now).num_seconds().max(0);
            println!(
                "{:<12} {:<6} {:>12.6} {:>12.6} {:>6}:{:02}  {}",
                entry.symbol,
                entry.direction.to_string(),
                entry.target_price,
                current,
                remaining / 60,
                remaining % 60,
                &entry.condition[..entry.condition.len().min(40)],
            );
        }
        println!("{}", "-".repeat(90));
    }

    let positions = book.open_positions().await;
    if positions.is_empty() {
        println!("open positions: none");
        return;
    }
    println!("\n==== open positions ====");
    println!(
        "{:<12} {:<6} {:>12} {:>12} {:>12} {:>8} {:>9}",
        "symbol", "side", "qty", "entry", "current", "pnl %", "held"
    );
    println!("{}", "-".repeat(80));
    for pos in &positions {
        let current = market.latest_price(&pos.symbol).await.unwrap_or(0.0);
        let pnl = if current > 0.0 { pos.profit_pct(current) * 100.0 } else { 0.0 };
        let held_mins = (now - pos.opened_at).num_minutes();
        println!(
            "{:<12} {:<6} {:>12.4} {:>12.6} {:>12.6} {:>7.2}% {:>6}min",
            pos.symbol,
            pos.direction.to_string(),
            pos.quantity,
            pos.entry_price,
            current,
            pnl,
            held_mins,
        );
    }
    println!("{}", "-".repeat(80));
}

/// Periodically re-print the status tables.
pub async fn status_loop(
    waitlist: Arc<EntryWaitlist>,
    book: Arc<PositionBook>,
    market: Arc<dyn MarketData>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        print_status(&waitlist, &book, &market).await;
    }
}
