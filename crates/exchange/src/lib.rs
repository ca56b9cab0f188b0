use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

use common::{
    Candle, Direction, EntryOrder, Error, ExecutionClient, Fill, MarketData, Result, Timeframe,
};

const BASE_URL: &str = "https://fapi.binance.com";

/// Quote asset of the contracts this bot trades.
const QUOTE_ASSET: &str = "USDC";

/// REST client for Binance USDⓈ-M futures: market data, leverage and
/// market-order placement.
pub struct BinanceFuturesClient {
    api_key: String,
    secret: String,
    http: Client,
}

impl BinanceFuturesClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            http: Client::builder()
                .use_rustls_tls()
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    fn sign(&self, query: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn public_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{BASE_URL}{path}?{params}");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let ts = Self::timestamp_ms();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&query);
        let url = format!("{BASE_URL}{path}?{query}&signature={signature}");

        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {body}")));
        }
        Ok(body)
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let ts = Self::timestamp_ms();
        let query = format!("{params}&timestamp={ts}");
        let signature = self.sign(&query);
        let body = format!("{query}&signature={signature}");
        let url = format!("{BASE_URL}{path}");

        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Exchange(format!("HTTP {status}: {text}")));
        }
        Ok(text)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let params = format!("symbol={symbol}&leverage={leverage}");
        self.signed_post("/fapi/v1/leverage", &params).await?;
        Ok(())
    }
}

#[async_trait]
impl MarketData for BinanceFuturesClient {
    async fn latest_price(&self, symbol: &str) -> Result<f64> {
        let body = self
            .public_get("/fapi/v1/ticker/price", &format!("symbol={symbol}"))
            .await?;
        let ticker: PriceTicker = serde_json::from_str(&body)?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|e| Error::Exchange(e.to_string()))
    }

    async fn klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let params = format!(
            "symbol={symbol}&interval={}&limit={limit}",
            timeframe.interval()
        );
        let body = self.public_get("/fapi/v1/klines", &params).await?;
        let rows: Vec<KlineRow> = serde_json::from_str(&body)?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            candles.push(row.into_candle()?);
        }
        Ok(candles)
    }

    async fn funding_rate(&self, symbol: &str) -> Result<f64> {
        let body = self
            .public_get("/fapi/v1/premiumIndex", &format!("symbol={symbol}"))
            .await?;
        let index: PremiumIndex = serde_json::from_str(&body)?;
        index
            .last_funding_rate
            .parse::<f64>()
            .map_err(|e| Error::Exchange(e.to_string()))
    }
}

#[async_trait]
impl ExecutionClient for BinanceFuturesClient {
    async fn open(&self, order: &EntryOrder) -> Result<Fill> {
        self.set_leverage(&order.symbol, order.leverage).await?;

        let mark = self.latest_price(&order.symbol).await?;
        if mark <= 0.0 {
            return Err(Error::Execution(format!("no mark price for {}", order.symbol)));
        }
        let quantity = order.amount * order.leverage as f64 / mark;

        let params = format!(
            "symbol={}&side={}&type=MARKET&quantity={:.3}",
            order.symbol,
            order.direction.open_side(),
            quantity
        );
        debug!(symbol = %order.symbol, direction = %order.direction, qty = quantity, "submitting entry order");
        let body = self
            .signed_post("/fapi/v1/order", &params)
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        let resp: OrderResponse = serde_json::from_str(&body)?;

        let fill_price = resp
            .avg_price
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| *p > 0.0)
            .unwrap_or(mark);

        Ok(Fill {
            symbol: order.symbol.clone(),
            direction: order.direction,
            price: fill_price,
            quantity: resp
                .executed_qty
                .as_deref()
                .and_then(|q| q.parse::<f64>().ok())
                .filter(|q| *q > 0.0)
                .unwrap_or(quantity),
            take_profit: order.take_profit,
            stop_loss: order.stop_loss,
            timestamp: Utc::now(),
        })
    }

    async fn close(&self, symbol: &str, direction: Direction, quantity: f64) -> Result<f64> {
        let params = format!(
            "symbol={symbol}&side={}&type=MARKET&quantity={quantity:.3}&reduceOnly=true",
            direction.close_side()
        );
        debug!(symbol = %symbol, direction = %direction, qty = quantity, "submitting close order");
        let body = self
            .signed_post("/fapi/v1/order", &params)
            .await
            .map_err(|e| Error::Execution(e.to_string()))?;
        let resp: OrderResponse = serde_json::from_str(&body)?;

        if let Some(price) = resp
            .avg_price
            .as_deref()
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| *p > 0.0)
        {
            return Ok(price);
        }
        // Market closes occasionally report avgPrice 0; fall back to the ticker.
        warn!(symbol = %symbol, "close response carried no average price, using ticker");
        self.latest_price(symbol).await
    }

    async fn account_balance(&self) -> Result<f64> {
        let body = self.signed_get("/fapi/v2/balance", "").await?;
        let balances: Vec<FuturesBalance> = serde_json::from_str(&body)?;
        balances
            .iter()
            .find(|b| b.asset == QUOTE_ASSET)
            .and_then(|b| b.available_balance.parse::<f64>().ok())
            .ok_or_else(|| Error::Exchange(format!("no {QUOTE_ASSET} balance in account")))
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    last_funding_rate: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesBalance {
    asset: String,
    available_balance: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(default)]
    avg_price: Option<String>,
    #[serde(default)]
    executed_qty: Option<String>,
}

/// One kline row as Binance returns it: a heterogeneous JSON array of which
/// only the first six fields matter here.
#[derive(Deserialize)]
struct KlineRow(
    i64,    // open time (ms)
    String, // open
    String, // high
    String, // low
    String, // close
    String, // volume
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
    #[serde(default)] serde_json::Value,
);

impl KlineRow {
    fn into_candle(self) -> Result<Candle> {
        let parse = |s: &str| {
            s.parse::<f64>()
                .map_err(|e| Error::Exchange(format!("bad kline field '{s}': {e}")))
        };
        let open_time = Utc
            .timestamp_millis_opt(self.0)
            .single()
            .ok_or_else(|| Error::Exchange(format!("bad kline timestamp {}", self.0)))?;
        Ok(Candle {
            open_time,
            open: parse(&self.1)?,
            high: parse(&self.2)?,
            low: parse(&self.3)?,
            close: parse(&self.4)?,
            volume: parse(&self.5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kline_rows_parse_from_exchange_json() {
        let body = r#"[
            [1700000000000,"100.1","101.5","99.2","100.9","1234.5",1700000299999,"0",10,"0","0","0"],
            [1700000300000,"100.9","102.0","100.0","101.7","999.0",1700000599999,"0",8,"0","0","0"]
        ]"#;
        let rows: Vec<KlineRow> = serde_json::from_str(body).unwrap();
        let candles: Vec<Candle> = rows
            .into_iter()
            .map(|r| r.into_candle().unwrap())
            .collect();
        assert_eq!(candles.len(), 2);
        assert!((candles[0].close - 100.9).abs() < 1e-9);
        assert!((candles[1].volume - 999.0).abs() < 1e-9);
        assert!(candles[1].open_time > candles[0].open_time);
    }

    #[test]
    fn malformed_kline_field_is_an_exchange_error() {
        let row: KlineRow = serde_json::from_str(
            r#"[1700000000000,"not-a-number","101.5","99.2","100.9","1.0",0,"0",0,"0","0","0"]"#,
        )
        .unwrap();
        assert!(matches!(row.into_candle(), Err(Error::Exchange(_))));
    }

    #[test]
    fn order_response_tolerates_missing_fields() {
        let resp: OrderResponse = serde_json::from_str(r#"{"orderId": 1}"#).unwrap();
        assert!(resp.avg_price.is_none());
        assert!(resp.executed_qty.is_none());
    }
}
