use std::sync::Arc;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tracing::info;

use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::model::{Candle, ExchangeKind, Ticker, TimeFrame};

const BINANCE_BASE_URL: &str = "https://api.binance.com";
const MAX_CANDLES_PER_REQUEST: usize = 1000;

pub struct BinanceExchange {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl BinanceExchange {
    pub fn new() -> Self {
        // Kline endpoint costs weight 2 against a 6000/min budget; 20 req/s leaves headroom.
        let quota = Quota::per_second(nonzero!(20u32));
        Self {
            client: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Report<ExchangeError>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{BINANCE_BASE_URL}{path}");
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .change_context(ExchangeError::Request {
                exchange: "binance".into(),
            })
            .attach_with(|| format!("url: {url}"))?;

        if !response.status().is_success() {
            return Err(Report::new(ExchangeError::Request {
                exchange: "binance".into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        response
            .json()
            .await
            .change_context(ExchangeError::ResponseParse {
                exchange: "binance".into(),
            })
    }
}

impl Default for BinanceExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange for BinanceExchange {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Binance
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let limit_str = limit.clamp(1, MAX_CANDLES_PER_REQUEST).to_string();
            let params = [
                ("symbol", symbol.as_str()),
                ("interval", timeframe.binance_interval()),
                ("limit", limit_str.as_str()),
            ];

            let raw: Vec<BinanceKlineRow> = self.get("/api/v3/klines", &params).await?;

            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                fetched = raw.len(),
                "binance candle fetch complete"
            );

            raw.into_iter()
                .map(|row| row.into_candle(&symbol, timeframe))
                .collect()
        })
    }

    fn fetch_ticker(&self, symbol: &str) -> BoxFuture<'_, Result<Ticker, Report<ExchangeError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let raw: BinanceTicker24h = self
                .get("/api/v3/ticker/24hr", &[("symbol", symbol.as_str())])
                .await?;
            raw.into_ticker()
        })
    }
}

// ── REST response types ───────────────────────────────────────────────────────

/// Binance kline row: 12-element array
/// [open_time, open, high, low, close, volume, close_time, ...]
#[derive(Debug, Deserialize)]
struct BinanceKlineRow(
    i64,                        // 0: open_time (ms)
    String,                     // 1: open
    String,                     // 2: high
    String,                     // 3: low
    String,                     // 4: close
    String,                     // 5: volume
    #[allow(dead_code)] i64,    // 6: close_time
    #[allow(dead_code)] String, // 7: quote asset volume
    #[allow(dead_code)] i64,    // 8: number of trades
    #[allow(dead_code)] String, // 9: taker buy base volume
    #[allow(dead_code)] String, // 10: taker buy quote volume
    #[allow(dead_code)] String, // 11: ignore
);

fn parse_f64(s: &str) -> Result<f64, Report<ExchangeError>> {
    s.parse::<f64>()
        .change_context(ExchangeError::ResponseParse {
            exchange: "binance".into(),
        })
        .attach_with(|| format!("value: {s}"))
}

impl BinanceKlineRow {
    fn into_candle(
        self,
        symbol: &str,
        timeframe: TimeFrame,
    ) -> Result<Candle, Report<ExchangeError>> {
        let open_time = DateTime::from_timestamp_millis(self.0).unwrap_or_else(Utc::now);

        Ok(Candle {
            exchange: ExchangeKind::Binance,
            symbol: symbol.to_owned(),
            timeframe,
            open_time,
            open: parse_f64(&self.1)?,
            high: parse_f64(&self.2)?,
            low: parse_f64(&self.3)?,
            close: parse_f64(&self.4)?,
            volume: parse_f64(&self.5)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTicker24h {
    symbol: String,
    last_price: String,
    price_change_percent: String,
    /// Base asset volume
    volume: String,
    close_time: i64,
}

impl BinanceTicker24h {
    fn into_ticker(self) -> Result<Ticker, Report<ExchangeError>> {
        Ok(Ticker {
            exchange: ExchangeKind::Binance,
            last: parse_f64(&self.last_price)?,
            percentage: self.price_change_percent.parse().ok(),
            base_volume: self.volume.parse().ok(),
            timestamp: DateTime::from_timestamp_millis(self.close_time).unwrap_or_else(Utc::now),
            symbol: self.symbol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binance_kline_row_parses_into_candle() {
        let row = BinanceKlineRow(
            1704067200000,
            "42000.0".into(),
            "43000.0".into(),
            "41500.0".into(),
            "42500.0".into(),
            "100.5".into(),
            1704067259999,
            "0".into(),
            10,
            "0".into(),
            "0".into(),
            "0".into(),
        );
        let candle = row.into_candle("BTCUSDT", TimeFrame::Hour1).unwrap();
        assert_eq!(candle.exchange, ExchangeKind::Binance);
        assert_eq!(candle.symbol, "BTCUSDT");
        assert_eq!(candle.timestamp_millis(), 1704067200000);
        assert_eq!(candle.open, 42000.0);
        assert_eq!(candle.close, 42500.0);
        assert_eq!(candle.volume, 100.5);
    }

    #[test]
    fn binance_kline_row_rejects_garbage_numbers() {
        let row = BinanceKlineRow(
            1704067200000,
            "n/a".into(),
            "1".into(),
            "1".into(),
            "1".into(),
            "1".into(),
            0,
            "0".into(),
            0,
            "0".into(),
            "0".into(),
            "0".into(),
        );
        assert!(row.into_candle("BTCUSDT", TimeFrame::Hour1).is_err());
    }

    #[test]
    fn binance_ticker_parses_from_json() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "lastPrice": "42123.45",
            "priceChangePercent": "-1.234",
            "volume": "12345.6",
            "closeTime": 1704067200000,
            "openPrice": "42000.00"
        }"#;
        let raw: BinanceTicker24h = serde_json::from_str(json).unwrap();
        let ticker = raw.into_ticker().unwrap();
        assert_eq!(ticker.symbol, "BTCUSDT");
        assert_eq!(ticker.last, 42123.45);
        assert_eq!(ticker.percentage, Some(-1.234));
        assert_eq!(ticker.base_volume, Some(12345.6));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_candles() {
        let exchange = BinanceExchange::new();
        let candles = exchange
            .fetch_candles("BTCUSDT", TimeFrame::Hour1, 10)
            .await
            .unwrap();
        assert!(!candles.is_empty());
        assert!(candles.len() <= 10);
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_ticker() {
        let exchange = BinanceExchange::new();
        let ticker = exchange.fetch_ticker("BTCUSDT").await.unwrap();
        assert!(ticker.last > 0.0);
    }
}
