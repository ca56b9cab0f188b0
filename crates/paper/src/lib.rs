use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    Candle, Direction, EntryOrder, Error, ExecutionClient, Fill, MarketData, Result, Timeframe,
};

/// Simulated exchange for paper trading and tests.
///
/// Prices, candles and funding rates are fed in from outside; fills are
/// simulated at the latest known price with configurable slippage. No real
/// orders are ever sent anywhere.
pub struct PaperClient {
    balance_usd: Arc<RwLock<f64>>,
    /// Latest known price per symbol, updated via `set_price`.
    prices: RwLock<HashMap<String, f64>>,
    /// Candle history per (symbol, timeframe), updated via `set_klines`.
    klines: RwLock<HashMap<(String, Timeframe), Vec<Candle>>>,
    funding: RwLock<HashMap<String, f64>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(initial_balance_usd: f64, slippage_bps: f64) -> Self {
        info!(
            balance = initial_balance_usd,
            slippage_bps = slippage_bps,
            "PaperClient initialized"
        );
        Self {
            balance_usd: Arc::new(RwLock::new(initial_balance_usd)),
            prices: RwLock::new(HashMap::new()),
            klines: RwLock::new(HashMap::new()),
            funding: RwLock::new(HashMap::new()),
            slippage_bps,
        }
    }

    /// Update the latest price for a symbol.
    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    /// Replace the candle history for a (symbol, timeframe).
    pub async fn set_klines(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.klines
            .write()
            .await
            .insert((symbol.to_string(), timeframe), candles);
    }

    pub async fn set_funding(&self, symbol: &str, rate: f64) {
        self.funding.write().await.insert(symbol.to_string(), rate);
    }

    fn slip(&self, price: f64, paying_up: bool) -> f64 {
        let factor = self.slippage_bps / 10_000.0;
        if paying_up {
            price * (1.0 + factor)
        } else {
            price * (1.0 - factor)
        }
    }
}

#[async_trait]
impl MarketData for PaperClient {
    async fn latest_price(&self, symbol: &str) -> Result<f64> {
        self.prices
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Exchange(format!("No price available for {symbol}")))
    }

    async fn klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let store = self.klines.read().await;
        let candles = store
            .get(&(symbol.to_string(), timeframe))
            .ok_or_else(|| Error::Exchange(format!("No {timeframe} klines for {symbol}")))?;
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn funding_rate(&self, symbol: &str) -> Result<f64> {
        self.funding
            .read()
            .await
            .get(symbol)
            .copied()
            .ok_or_else(|| Error::Exchange(format!("No funding rate for {symbol}")))
    }
}

#[async_trait]
impl ExecutionClient for PaperClient {
    async fn open(&self, order: &EntryOrder) -> Result<Fill> {
        let mid = self.latest_price(&order.symbol).await.map_err(|_| {
            Error::Execution(format!(
                "PaperClient has no price for '{}'. Feed prices before trading.",
                order.symbol
            ))
        })?;

        // Longs pay up, shorts receive less.
        let fill_price = self.slip(mid, order.direction == Direction::Long);
        let quantity = order.amount * order.leverage as f64 / fill_price;

        debug!(
            symbol = %order.symbol,
            direction = %order.direction,
            mid = mid,
            fill = fill_price,
            qty = quantity,
            "paper fill simulated"
        );

        Ok(Fill {
            symbol: order.symbol.clone(),
            direction: order.direction,
            price: fill_price,
            quantity,
            take_profit: order.take_profit,
            stop_loss: order.stop_loss,
            timestamp: Utc::now(),
        })
    }

    async fn close(&self, symbol: &str, direction: Direction, quantity: f64) -> Result<f64> {
        let mid = self.latest_price(symbol).await.map_err(|_| {
            Error::Execution(format!("PaperClient has no price for '{symbol}' to close against"))
        })?;
        // Closing a long sells (receives less); closing a short buys back.
        let exit_price = self.slip(mid, direction == Direction::Short);
        debug!(symbol = %symbol, direction = %direction, qty = quantity, exit = exit_price, "paper close simulated");
        Ok(exit_price)
    }

    async fn account_balance(&self) -> Result<f64> {
        Ok(*self.balance_usd.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(symbol: &str, direction: Direction) -> EntryOrder {
        EntryOrder {
            symbol: symbol.into(),
            direction,
            amount: 100.0,
            leverage: 5,
            take_profit: 0.0175,
            stop_loss: -0.0125,
        }
    }

    #[tokio::test]
    async fn long_fill_pays_positive_slippage() {
        let client = PaperClient::new(10_000.0, 10.0); // 10 bps
        client.set_price("BTCUSDT", 1000.0).await;

        let fill = client.open(&order("BTCUSDT", Direction::Long)).await.unwrap();
        let expected = 1000.0 * (1.0 + 10.0 / 10_000.0);
        assert!((fill.price - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn short_fill_receives_negative_slippage() {
        let client = PaperClient::new(10_000.0, 10.0);
        client.set_price("BTCUSDT", 1000.0).await;

        let fill = client.open(&order("BTCUSDT", Direction::Short)).await.unwrap();
        let expected = 1000.0 * (1.0 - 10.0 / 10_000.0);
        assert!((fill.price - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fill_quantity_reflects_leverage() {
        let client = PaperClient::new(10_000.0, 0.0);
        client.set_price("ETHUSDT", 500.0).await;

        let fill = client.open(&order("ETHUSDT", Direction::Long)).await.unwrap();
        // 100 USDC margin at 5x = 500 USDC notional = 1.0 ETH at 500
        assert!((fill.quantity - 1.0).abs() < 1e-9);
        assert_eq!(fill.take_profit, 0.0175);
        assert_eq!(fill.stop_loss, -0.0125);
    }

    #[tokio::test]
    async fn open_without_a_price_is_an_execution_error() {
        let client = PaperClient::new(10_000.0, 0.0);
        let err = client.open(&order("MISSINGUSDT", Direction::Long)).await;
        assert!(matches!(err, Err(Error::Execution(_))));
    }

    #[tokio::test]
    async fn klines_are_truncated_to_limit() {
        let client = PaperClient::new(10_000.0, 0.0);
        let candles: Vec<Candle> = (0..50)
            .map(|i| Candle {
                open_time: Utc::now(),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0 + i as f64,
                volume: 1.0,
            })
            .collect();
        client.set_klines("BTCUSDT", Timeframe::M15, candles).await;

        let got = client.klines("BTCUSDT", Timeframe::M15, 10).await.unwrap();
        assert_eq!(got.len(), 10);
        assert!((got[9].close - 50.0).abs() < 1e-9);
    }
}
