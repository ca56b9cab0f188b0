use serde::{Deserialize, Serialize};

use crate::TradingMode;

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // Exchange credentials (unused in paper mode, still required to be set)
    pub binance_api_key: String,
    pub binance_secret: String,

    // Trading
    pub trading_mode: TradingMode,
    pub paper_slippage_bps: f64,
    pub paper_balance_usd: f64,

    // Scheduling
    /// Main decision-loop interval.
    pub scan_interval_secs: u64,
    /// Waiting-entry price poll interval.
    pub entry_poll_secs: u64,
    /// Open-position price poll interval.
    pub position_poll_secs: u64,

    // Exit thresholds applied to new positions
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,

    // Watchlist file path
    pub watchlist_path: String,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let trading_mode = match required_env("TRADING_MODE").to_lowercase().as_str() {
            "paper" => TradingMode::Paper,
            "live" => TradingMode::Live,
            other => panic!("ERROR: TRADING_MODE must be 'paper' or 'live', got: '{other}'"),
        };

        Config {
            binance_api_key: required_env("BINANCE_API_KEY"),
            binance_secret: required_env("BINANCE_SECRET"),
            trading_mode,
            paper_slippage_bps: optional_env("PAPER_SLIPPAGE_BPS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            paper_balance_usd: optional_env("PAPER_BALANCE_USD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000.0),
            scan_interval_secs: optional_env("SCAN_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            entry_poll_secs: optional_env("ENTRY_POLL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            position_poll_secs: optional_env("POSITION_POLL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            take_profit_pct: optional_env("TAKE_PROFIT_PCT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0175),
            stop_loss_pct: optional_env("STOP_LOSS_PCT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(-0.0125),
            watchlist_path: optional_env("WATCHLIST_PATH")
                .unwrap_or_else(|| "config/watchlist.toml".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Top-level watchlist file (TOML).
///
/// Example `config/watchlist.toml`:
/// ```toml
/// [[symbol]]
/// name = "BTCUSDT"
/// amount = 50.0
/// max_leverage = 20
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchlistConfig {
    #[serde(rename = "symbol")]
    pub symbols: Vec<SymbolConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SymbolConfig {
    /// Trading pair, e.g. "BTCUSDT".
    pub name: String,
    /// Fixed order notional in quote currency; 0 = size dynamically from
    /// the account balance.
    #[serde(default)]
    pub amount: f64,
    /// Ceiling applied to the quality-derived leverage ladder.
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
}

fn default_max_leverage() -> u32 {
    20
}

impl WatchlistConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read watchlist at '{path}': {e}"));
        toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse watchlist at '{path}': {e}"))
    }
}
