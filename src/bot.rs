use std::sync::Arc;

use chrono::Utc;
use error_stack::Report;
use tracing::{debug, warn};

use crate::activity::ActivityLog;
use crate::chart;
use crate::command::{self, ANALYSIS_CANDLES, Command, HELP_TEXT, Market, PlanRequest};
use crate::config::ChartConfig;
use crate::error::{ExchangeError, MessagingError};
use crate::exchange::{Exchange, ExchangeRegistry, normalize_symbol};
use crate::indicator::{atr, recent_levels};
use crate::messaging::{Messenger, ReplyMessage};
use crate::model::{Candle, ExchangeKind, IndicatorSnapshot, LogRow, Ticker, TimeFrame};
use crate::narrative::{Narrator, UNAVAILABLE_NOTICE, fmt_reading};
use crate::plan::{self, PlanReport};

/// Reply messages for one command and the row to record once replied.
struct Outcome {
    messages: Vec<ReplyMessage>,
    row: Option<LogRow>,
}

impl Outcome {
    fn text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ReplyMessage::text(text)],
            row: None,
        }
    }
}

/// Runs chat commands against the market data, narrative, chart and logging
/// collaborators and replies through the messenger.
pub struct Bot {
    exchanges: ExchangeRegistry,
    narrator: Arc<dyn Narrator>,
    messenger: Arc<dyn Messenger>,
    activity: Arc<dyn ActivityLog>,
    chart: ChartConfig,
    quote: String,
}

impl Bot {
    pub fn new(
        exchanges: ExchangeRegistry,
        narrator: Arc<dyn Narrator>,
        messenger: Arc<dyn Messenger>,
        activity: Arc<dyn ActivityLog>,
        chart: ChartConfig,
        quote: &str,
    ) -> Self {
        Self {
            exchanges,
            narrator,
            messenger,
            activity,
            chart,
            quote: quote.to_uppercase(),
        }
    }

    pub fn default_exchange(&self) -> ExchangeKind {
        self.exchanges.default_kind()
    }

    /// Answer one text message. Only a failed reply is an error; activity-log
    /// failures are logged and swallowed.
    pub async fn handle_text(
        &self,
        reply_token: &str,
        text: &str,
    ) -> Result<(), Report<MessagingError>> {
        let outcome = match command::parse(text) {
            Ok(command) => self.execute(command).await,
            Err(err) => {
                debug!(error = %err, "command rejected");
                Outcome::text(err.to_string())
            }
        };

        let replied = self.messenger.reply(reply_token, outcome.messages).await;

        if let Some(row) = outcome.row {
            if let Err(report) = self.activity.append(row).await {
                warn!(error = ?report, "activity log append failed");
            }
        }

        replied
    }

    async fn execute(&self, command: Command) -> Outcome {
        match command {
            Command::Price { market } => self.price(&market).await,
            Command::Kline {
                market,
                timeframe,
                limit,
            } => self.kline(&market, timeframe, limit).await,
            Command::Ta { market, timeframe } => self.ta(&market, timeframe).await,
            Command::Plan(request) => self.plan(&request).await,
            Command::Help => Outcome::text(HELP_TEXT),
        }
    }

    async fn price(&self, market: &Market) -> Outcome {
        match self.fetch_ticker(market).await {
            Ok(ticker) => Outcome::text(format!(
                "{} last: {:.4} | 24h: {}% | vol: {}",
                ticker.symbol,
                ticker.last,
                fmt_reading(ticker.percentage, 2),
                fmt_reading(ticker.base_volume, 2),
            )),
            Err(report) => upstream_failure("price", report),
        }
    }

    async fn kline(&self, market: &Market, timeframe: TimeFrame, limit: usize) -> Outcome {
        let (symbol, candles) = match self.series(market, timeframe, limit).await {
            Ok(series) => series,
            Err(report) => return upstream_failure("kline", report),
        };
        let snapshot = snapshot_of(&symbol, &candles);
        let analysis = self.analysis(&symbol, timeframe, &snapshot).await;
        let summary = summary_text(&symbol, timeframe, &snapshot, &analysis);

        let mut messages = vec![ReplyMessage::text(summary)];
        let image = match chart::chart_url(&candles, &symbol, &self.chart) {
            Ok(url) => {
                messages.push(ReplyMessage::image(url.clone()));
                Some(url)
            }
            Err(report) => {
                warn!(
                    error = ?report,
                    symbol = %symbol,
                    "chart unavailable, replying with text only"
                );
                None
            }
        };
        let row = indicator_row(&symbol, timeframe, &snapshot, "kline", analysis, image);

        Outcome {
            messages,
            row: Some(row),
        }
    }

    async fn ta(&self, market: &Market, timeframe: TimeFrame) -> Outcome {
        let (symbol, candles) = match self.series(market, timeframe, ANALYSIS_CANDLES).await {
            Ok(series) => series,
            Err(report) => return upstream_failure("ta", report),
        };
        let snapshot = snapshot_of(&symbol, &candles);
        let analysis = self.analysis(&symbol, timeframe, &snapshot).await;
        let summary = summary_text(&symbol, timeframe, &snapshot, &analysis);
        let row = indicator_row(&symbol, timeframe, &snapshot, "ta", analysis, None);

        Outcome {
            messages: vec![ReplyMessage::text(summary)],
            row: Some(row),
        }
    }

    async fn plan(&self, request: &PlanRequest) -> Outcome {
        let (market, timeframe) = (&request.market, request.timeframe);
        let (symbol, candles) = match self.series(market, timeframe, ANALYSIS_CANDLES).await {
            Ok(series) => series,
            Err(report) => return upstream_failure("plan", report),
        };
        let snapshot = snapshot_of(&symbol, &candles);
        let Some(levels) = recent_levels(&candles, request.window) else {
            return Outcome::text("plan failed: no candles in window");
        };
        let atr = atr(&candles, request.atr_period);

        let ladder = match plan::ladder(
            request.entry,
            request.side,
            request.mode,
            atr,
            request.atr_period,
            levels,
        ) {
            Ok(ladder) => ladder,
            Err(err) => return Outcome::text(format!("plan failed: {err}")),
        };

        let report = PlanReport {
            symbol: &symbol,
            timeframe,
            entry: request.entry,
            side: request.side,
            mode: request.mode,
            window: request.window,
            atr_period: request.atr_period,
            atr,
            levels,
            snapshot,
            ladder,
        };
        let text = report.render();
        let tag = report.tag();
        let row = indicator_row(&symbol, timeframe, &snapshot, &tag, text.clone(), None);

        Outcome {
            messages: vec![ReplyMessage::text(text)],
            row: Some(row),
        }
    }

    /// Pick the requested or default exchange and normalize the coin for it.
    fn resolve(
        &self,
        market: &Market,
    ) -> Result<(Arc<dyn Exchange>, String), Report<ExchangeError>> {
        let exchange = match &market.exchange {
            Some(name) => self.exchanges.get(name),
            None => self.exchanges.default_exchange(),
        };
        let Some(exchange) = exchange else {
            let name = match &market.exchange {
                Some(name) => name.clone(),
                None => self.exchanges.default_kind().to_string(),
            };
            return Err(Report::new(ExchangeError::NotEnabled { exchange: name }));
        };
        Ok((exchange, normalize_symbol(&market.coin, &self.quote)))
    }

    async fn fetch_ticker(&self, market: &Market) -> Result<Ticker, Report<ExchangeError>> {
        let (exchange, symbol) = self.resolve(market)?;
        let ticker = exchange.fetch_ticker(&symbol).await?;
        debug!(exchange = %ticker.exchange, symbol, at = %ticker.timestamp, "ticker fetched");
        Ok(ticker)
    }

    /// Fetch `limit` candles for the market, returning the normalized symbol
    /// with them. An empty series is an error.
    async fn series(
        &self,
        market: &Market,
        timeframe: TimeFrame,
        limit: usize,
    ) -> Result<(String, Vec<Candle>), Report<ExchangeError>> {
        let (exchange, symbol) = self.resolve(market)?;
        let candles = exchange.fetch_candles(&symbol, timeframe, limit).await?;
        let Some(latest) = candles.last() else {
            return Err(Report::new(ExchangeError::NoCandles {
                exchange: exchange.kind().to_string(),
                symbol,
            }));
        };
        debug!(
            exchange = %latest.exchange,
            symbol = %latest.symbol,
            timeframe = %latest.timeframe,
            open_time = %latest.open_time,
            volume = latest.volume,
            count = candles.len(),
            "candles fetched"
        );
        Ok((symbol, candles))
    }

    async fn analysis(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        snapshot: &IndicatorSnapshot,
    ) -> String {
        match self.narrator.summarize(symbol, timeframe, snapshot).await {
            Ok(text) => text,
            Err(report) => {
                warn!(error = ?report, symbol, "narrative unavailable");
                UNAVAILABLE_NOTICE.to_owned()
            }
        }
    }
}

fn snapshot_of(symbol: &str, candles: &[Candle]) -> IndicatorSnapshot {
    let snapshot = IndicatorSnapshot::from_candles(candles);
    if !snapshot.is_complete() {
        debug!(
            symbol,
            candles = candles.len(),
            "short history, some indicators unavailable"
        );
    }
    snapshot
}

fn upstream_failure(action: &str, report: Report<ExchangeError>) -> Outcome {
    warn!(error = ?report, action, "market data request failed");
    Outcome::text(format!("{action} failed: {}", report.current_context()))
}

fn summary_text(
    symbol: &str,
    timeframe: TimeFrame,
    snapshot: &IndicatorSnapshot,
    analysis: &str,
) -> String {
    format!(
        "{symbol} {timeframe}\nclose:{}  RSI:{}  EMA20/50:{}/{}\n- AI: {analysis}",
        fmt_reading(snapshot.close, 4),
        fmt_reading(snapshot.rsi14, 1),
        fmt_reading(snapshot.ema20, 4),
        fmt_reading(snapshot.ema50, 4),
    )
}

/// `[time, symbol, tf, close, rsi, ema20, ema50, tag, text, image]`
fn indicator_row(
    symbol: &str,
    timeframe: TimeFrame,
    snapshot: &IndicatorSnapshot,
    tag: &str,
    text: String,
    image: Option<String>,
) -> LogRow {
    vec![
        Utc::now().format("%Y-%m-%d %H:%M:%S").to_string().into(),
        symbol.into(),
        timeframe.as_str().into(),
        snapshot.close.into(),
        snapshot.rsi14.into(),
        snapshot.ema20.into(),
        snapshot.ema50.into(),
        tag.into(),
        text.into(),
        image.unwrap_or_default().into(),
    ]
}
