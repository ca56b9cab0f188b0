pub mod config;
pub mod error;
pub mod market;
pub mod series;
pub mod types;

pub use config::{Config, SymbolConfig, WatchlistConfig};
pub use error::{Error, Result};
pub use market::{EntryOrder, ExecutionClient, IndicatorEngine, MarketData};
pub use series::{column_back, column_last, column_tail_mean, Candle, IndicatorColumns, MarketSeries};
pub use types::*;
