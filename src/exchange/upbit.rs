use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::model::{Candle, ExchangeKind, Ticker, TimeFrame};

const UPBIT_BASE_URL: &str = "https://api.upbit.com";
const MAX_CANDLES_PER_REQUEST: usize = 200;

pub struct UpbitExchange {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    quote: String,
}

impl UpbitExchange {
    /// `quote` is the suffix normalized symbols carry (e.g. `USDT` in `BTCUSDT`).
    pub fn new(quote: &str) -> Self {
        // Upbit allows 10 req/s; use 8 for safety margin
        let quota = Quota::per_second(nonzero!(8u32));
        Self {
            client: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            quote: quote.to_uppercase(),
        }
    }

    /// Map `BTCUSDT` to Upbit's `USDT-BTC` market code.
    fn market_code(&self, symbol: &str) -> Result<String, Report<ExchangeError>> {
        match symbol.strip_suffix(self.quote.as_str()) {
            Some(base) if !base.is_empty() => Ok(format!("{}-{}", self.quote, base)),
            _ => Err(Report::new(ExchangeError::UnknownSymbol {
                exchange: "upbit".into(),
                symbol: symbol.to_owned(),
            })),
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Report<ExchangeError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let url = format!("{UPBIT_BASE_URL}{path}");
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .change_context(ExchangeError::Request {
                exchange: "upbit".into(),
            })
            .attach_with(|| format!("url: {url}"))?;

        if !response.status().is_success() {
            return Err(Report::new(ExchangeError::Request {
                exchange: "upbit".into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        response
            .json()
            .await
            .change_context(ExchangeError::ResponseParse {
                exchange: "upbit".into(),
            })
    }

    async fn fetch_candles_page(
        &self,
        market: &str,
        timeframe: TimeFrame,
        count: usize,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<UpbitCandle>, Report<ExchangeError>> {
        let mut params = vec![("market", market.to_owned()), ("count", count.to_string())];
        if let Some(to_dt) = to {
            params.push(("to", to_dt.format("%Y-%m-%dT%H:%M:%S").to_string()));
        }
        self.get(timeframe.upbit_endpoint(), &params).await
    }
}

impl Exchange for UpbitExchange {
    fn kind(&self) -> ExchangeKind {
        ExchangeKind::Upbit
    }

    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let market = self.market_code(&symbol)?;
            let mut collected: Vec<UpbitCandle> = Vec::with_capacity(limit);
            let mut to: Option<DateTime<Utc>> = None;

            while collected.len() < limit {
                let count = (limit - collected.len()).min(MAX_CANDLES_PER_REQUEST);
                let page = self
                    .fetch_candles_page(&market, timeframe, count, to)
                    .await?;
                match absorb_page(&mut collected, page, count) {
                    Some(cursor) => to = Some(cursor),
                    None => break,
                }
            }

            let candles = into_ascending(collected, &symbol, timeframe);
            info!(
                symbol = %symbol,
                market = %market,
                timeframe = %timeframe,
                fetched = candles.len(),
                "upbit candle fetch complete"
            );
            Ok(candles)
        })
    }

    fn fetch_ticker(&self, symbol: &str) -> BoxFuture<'_, Result<Ticker, Report<ExchangeError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let market = self.market_code(&symbol)?;
            let raw: Vec<UpbitTicker> = self.get("/v1/ticker", &[("markets", market)]).await?;
            raw.into_iter()
                .next()
                .map(|t| t.into_ticker(&symbol))
                .ok_or_else(|| {
                    Report::new(ExchangeError::ResponseParse {
                        exchange: "upbit".into(),
                    })
                    .attach("empty ticker list")
                })
        })
    }
}

/// Upbit timestamps are UTC without an offset, e.g. `2024-01-01T00:00:00`.
fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Append one newest-first page and return the `to` cursor for the next,
/// older page. `None` ends paging: the page came back short or its oldest
/// candle carries no usable time.
fn absorb_page(
    collected: &mut Vec<UpbitCandle>,
    page: Vec<UpbitCandle>,
    requested: usize,
) -> Option<DateTime<Utc>> {
    let full = !page.is_empty() && page.len() >= requested;
    let cursor = page
        .last()
        .and_then(|c| parse_utc(&c.candle_date_time_utc));
    if full && cursor.is_none() {
        warn!("upbit page cursor unparseable, stopping pagination");
    }
    collected.extend(page);
    if full { cursor } else { None }
}

/// Convert collected newest-first rows into oldest-first candles, dropping
/// rows whose time does not parse.
fn into_ascending(collected: Vec<UpbitCandle>, symbol: &str, timeframe: TimeFrame) -> Vec<Candle> {
    collected
        .into_iter()
        .rev()
        .filter_map(|raw| raw.into_candle(symbol, timeframe))
        .collect()
}

// ── REST response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UpbitCandle {
    candle_date_time_utc: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_volume: f64,
}

impl UpbitCandle {
    fn into_candle(self, symbol: &str, timeframe: TimeFrame) -> Option<Candle> {
        let Some(open_time) = parse_utc(&self.candle_date_time_utc) else {
            warn!(
                time = %self.candle_date_time_utc,
                "skipping upbit candle with unparseable time"
            );
            return None;
        };

        Some(Candle {
            exchange: ExchangeKind::Upbit,
            symbol: symbol.to_owned(),
            timeframe,
            open_time,
            open: self.opening_price,
            high: self.high_price,
            low: self.low_price,
            close: self.trade_price,
            volume: self.candle_acc_trade_volume,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UpbitTicker {
    trade_price: f64,
    /// Fractional change versus the previous close, e.g. `0.0123`.
    signed_change_rate: Option<f64>,
    acc_trade_volume_24h: Option<f64>,
    timestamp: i64,
}

impl UpbitTicker {
    fn into_ticker(self, symbol: &str) -> Ticker {
        Ticker {
            exchange: ExchangeKind::Upbit,
            symbol: symbol.to_owned(),
            last: self.trade_price,
            percentage: self.signed_change_rate.map(|r| r * 100.0),
            base_volume: self.acc_trade_volume_24h,
            timestamp: DateTime::from_timestamp_millis(self.timestamp).unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_code_flips_base_and_quote() {
        let exchange = UpbitExchange::new("usdt");
        assert_eq!(exchange.market_code("BTCUSDT").unwrap(), "USDT-BTC");
        assert!(exchange.market_code("USDT").is_err());
        assert!(exchange.market_code("BTCKRW").is_err());
    }

    #[test]
    fn upbit_candle_parses_into_candle() {
        let raw = UpbitCandle {
            candle_date_time_utc: "2024-01-01T00:00:00".to_owned(),
            opening_price: 50000.0,
            high_price: 51000.0,
            low_price: 49000.0,
            trade_price: 50500.0,
            candle_acc_trade_volume: 10.5,
        };
        let candle = raw.into_candle("BTCUSDT", TimeFrame::Hour1).unwrap();
        assert_eq!(candle.exchange, ExchangeKind::Upbit);
        assert_eq!(candle.symbol, "BTCUSDT");
        assert_eq!(candle.timestamp_millis(), 1704067200000);
        assert_eq!(candle.open, 50000.0);
        assert_eq!(candle.close, 50500.0);
        assert_eq!(candle.volume, 10.5);
    }

    fn raw_at(time: &str, close: f64) -> UpbitCandle {
        UpbitCandle {
            candle_date_time_utc: time.to_owned(),
            opening_price: close,
            high_price: close,
            low_price: close,
            trade_price: close,
            candle_acc_trade_volume: 1.0,
        }
    }

    /// `len` hourly rows, newest first, the newest `newest` hours after 2024-01-01.
    fn page(newest: i64, len: i64) -> Vec<UpbitCandle> {
        let base = parse_utc("2024-01-01T00:00:00").unwrap();
        (0..len)
            .map(|i| {
                let hour = newest - i;
                let time = base + chrono::Duration::hours(hour);
                let stamp = time.format("%Y-%m-%dT%H:%M:%S").to_string();
                raw_at(&stamp, hour as f64)
            })
            .collect()
    }

    #[test]
    fn full_pages_advance_cursor_until_short_page() {
        let mut collected = Vec::new();

        let cursor = absorb_page(&mut collected, page(449, 200), 200);
        assert_eq!(cursor, parse_utc("2024-01-11T10:00:00"));

        let cursor = absorb_page(&mut collected, page(249, 200), 200);
        assert_eq!(cursor, parse_utc("2024-01-03T02:00:00"));

        // only 30 of the 50 requested rows exist
        assert_eq!(absorb_page(&mut collected, page(49, 30), 50), None);
        assert_eq!(collected.len(), 430);

        let candles = into_ascending(collected, "BTCUSDT", TimeFrame::Hour1);
        assert_eq!(candles.len(), 430);
        assert_eq!(candles[0].close, 20.0);
        assert_eq!(candles[429].close, 449.0);
        assert!(candles.windows(2).all(|w| w[0].open_time < w[1].open_time));
    }

    #[test]
    fn empty_page_ends_paging() {
        let mut collected = Vec::new();
        assert_eq!(absorb_page(&mut collected, Vec::new(), 200), None);
        assert!(collected.is_empty());
    }

    #[test]
    fn unparseable_cursor_stops_paging() {
        let mut rows = page(10, 3);
        rows[2].candle_date_time_utc = "bad".into();

        let mut collected = Vec::new();
        assert_eq!(absorb_page(&mut collected, rows, 3), None);
        assert_eq!(collected.len(), 3);

        // the row without a time is dropped rather than stamped with the current time
        let candles = into_ascending(collected, "BTCUSDT", TimeFrame::Hour1);
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![9.0, 10.0]);
    }

    #[test]
    fn upbit_ticker_reports_percent() {
        let json = r#"[{
            "market": "USDT-BTC",
            "trade_price": 42000.5,
            "signed_change_rate": 0.0125,
            "acc_trade_volume_24h": 3.5,
            "timestamp": 1704067200000
        }]"#;
        let raw: Vec<UpbitTicker> = serde_json::from_str(json).unwrap();
        let ticker = raw.into_iter().next().unwrap().into_ticker("BTCUSDT");
        assert_eq!(ticker.last, 42000.5);
        assert!((ticker.percentage.unwrap() - 1.25).abs() < 1e-9);
        assert_eq!(ticker.base_volume, Some(3.5));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_candles() {
        let exchange = UpbitExchange::new("USDT");
        let candles = exchange
            .fetch_candles("BTCUSDT", TimeFrame::Hour1, 10)
            .await
            .unwrap();
        assert!(!candles.is_empty());
        assert!(candles.len() <= 10);
        assert!(candles[0].open_time <= candles[candles.len() - 1].open_time);
    }
}
