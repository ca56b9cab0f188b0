mod status;
mod trader;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use coherence::TimeframeCoordinator;
use common::{Config, ExecutionClient, Fill, IndicatorEngine, MarketData, TradingMode, WatchlistConfig};
use engine::{EntryWaitlist, PositionBook};
use exchange::BinanceFuturesClient;
use indicators::SmcEngine;
use paper::PaperClient;

use trader::Trader;

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let watchlist = WatchlistConfig::load(&cfg.watchlist_path);
    let symbols: Vec<String> = watchlist.symbols.iter().map(|s| s.name.clone()).collect();
    info!(mode = %cfg.trading_mode, symbols = ?symbols, "vigil starting");

    // ── Collaborators ─────────────────────────────────────────────────────────
    // Market data always comes from the live feed; in paper mode execution is
    // simulated against a price board mirrored from that feed.
    let live = Arc::new(BinanceFuturesClient::new(&cfg.binance_api_key, &cfg.binance_secret));
    let market: Arc<dyn MarketData> = live.clone();
    let execution: Arc<dyn ExecutionClient> = match cfg.trading_mode {
        TradingMode::Live => {
            info!("live trading mode");
            live.clone()
        }
        TradingMode::Paper => {
            info!(
                balance = cfg.paper_balance_usd,
                slippage_bps = cfg.paper_slippage_bps,
                "paper trading mode"
            );
            let paper = Arc::new(PaperClient::new(cfg.paper_balance_usd, cfg.paper_slippage_bps));
            tokio::spawn(mirror_prices(
                market.clone(),
                paper.clone(),
                symbols.clone(),
                Duration::from_secs(cfg.entry_poll_secs),
            ));
            paper
        }
    };
    let engine: Arc<dyn IndicatorEngine> = Arc::new(SmcEngine::new());

    // ── Core components ───────────────────────────────────────────────────────
    let coordinator = Arc::new(TimeframeCoordinator::new(market.clone(), engine.clone()));
    let (fill_tx, mut fill_rx) = mpsc::channel::<Fill>(64);

    let waitlist = Arc::new(EntryWaitlist::new(
        market.clone(),
        execution.clone(),
        fill_tx.clone(),
        Duration::from_secs(cfg.entry_poll_secs),
        cfg.take_profit_pct,
        cfg.stop_loss_pct,
    ));
    let book = Arc::new(PositionBook::new(
        market.clone(),
        execution.clone(),
        Duration::from_secs(cfg.position_poll_secs),
    ));
    book.start_monitor().await;

    // Fills from both the trader and the waitlist land in the book here.
    {
        let book = book.clone();
        tokio::spawn(async move {
            while let Some(fill) = fill_rx.recv().await {
                book.record(fill).await;
            }
            warn!("fill channel closed");
        });
    }

    // ── Status display ────────────────────────────────────────────────────────
    tokio::spawn(status::status_loop(
        waitlist.clone(),
        book.clone(),
        market.clone(),
        Duration::from_secs(60),
    ));

    // ── Decision loop ─────────────────────────────────────────────────────────
    let trader = Trader::new(
        market.clone(),
        execution,
        engine,
        coordinator,
        waitlist.clone(),
        fill_tx,
        &cfg,
    );
    let scan = tokio::spawn(trader.run(
        watchlist.symbols.clone(),
        Duration::from_secs(cfg.scan_interval_secs),
    ));

    info!("all subsystems started, waiting for shutdown signal");
    tokio::signal::ctrl_c().await.expect("ctrl-c handler failed");
    info!("shutdown signal received");

    scan.abort();
    waitlist.shutdown().await;
    book.shutdown().await;
    status::print_status(&waitlist, &book, &market).await;
    info!("vigil stopped");
}

/// Paper-mode helper: keep the simulated exchange's price board in sync with
/// the live ticker so fills and exits land at realistic prices.
async fn mirror_prices(
    market: Arc<dyn MarketData>,
    paper: Arc<PaperClient>,
    symbols: Vec<String>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        for symbol in &symbols {
            match market.latest_price(symbol).await {
                Ok(price) => paper.set_price(symbol, price).await,
                Err(e) => warn!(symbol = %symbol, error = %e, "price mirror failed"),
            }
        }
    }
}
