use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Upbit,
    Binance,
}

impl ExchangeKind {
    /// Every exchange the registry knows how to construct.
    pub const ALL: [ExchangeKind; 2] = [Self::Binance, Self::Upbit];

    /// Parse a config-format name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "upbit" => Some(Self::Upbit),
            "binance" => Some(Self::Binance),
            _ => None,
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upbit => write!(f, "upbit"),
            Self::Binance => write!(f, "binance"),
        }
    }
}

/// Candle timeframe supported by the application.
///
/// String representations match what users type in chat (e.g. `"1m"`, `"1h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFrame {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour4,
    Day1,
    Week1,
}

impl TimeFrame {
    /// Parse a user-format string into a `TimeFrame` (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "1m" => Some(Self::Min1),
            "3m" => Some(Self::Min3),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            "1w" => Some(Self::Week1),
            _ => None,
        }
    }

    /// Return the user-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min3 => "3m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
            Self::Week1 => "1w",
        }
    }

    /// Return the Upbit REST endpoint path segment for this timeframe.
    pub fn upbit_endpoint(self) -> &'static str {
        match self {
            Self::Min1 => "/v1/candles/minutes/1",
            Self::Min3 => "/v1/candles/minutes/3",
            Self::Min5 => "/v1/candles/minutes/5",
            Self::Min15 => "/v1/candles/minutes/15",
            Self::Min30 => "/v1/candles/minutes/30",
            Self::Hour1 => "/v1/candles/minutes/60",
            Self::Hour4 => "/v1/candles/minutes/240",
            Self::Day1 => "/v1/candles/days",
            Self::Week1 => "/v1/candles/weeks",
        }
    }

    /// Return the Binance kline interval string for this timeframe.
    pub fn binance_interval(self) -> &'static str {
        // Binance intervals share the user-facing spelling.
        self.as_str()
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Candle {
    pub exchange: ExchangeKind,
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Open time as milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.open_time.timestamp_millis()
    }
}

/// Current price snapshot for a symbol.
#[derive(Debug, Clone)]
pub struct Ticker {
    pub exchange: ExchangeKind,
    pub symbol: String,
    pub last: f64,
    /// 24h change in percent, when the exchange reports it.
    pub percentage: Option<f64>,
    /// 24h traded volume in the base asset.
    pub base_volume: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Indicator readings for the most recent candle of a series.
///
/// `None` means the series was too short for that indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub close: Option<f64>,
    pub ema20: Option<f64>,
    pub ema50: Option<f64>,
    pub rsi14: Option<f64>,
}

/// One spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogValue {
    Text(String),
    Number(f64),
}

impl From<&str> for LogValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for LogValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for LogValue {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Self::Number(value)
        } else {
            Self::Text(String::new())
        }
    }
}

impl From<Option<f64>> for LogValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or_else(|| Self::Text(String::new()), Self::from)
    }
}

/// A row appended verbatim to the activity log. Column order is the caller's business.
pub type LogRow = Vec<LogValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeframe_parses_user_spelling() {
        let frames = [
            ("1m", TimeFrame::Min1),
            ("3m", TimeFrame::Min3),
            ("15m", TimeFrame::Min15),
            ("1h", TimeFrame::Hour1),
            ("4H", TimeFrame::Hour4),
            ("1d", TimeFrame::Day1),
            ("1w", TimeFrame::Week1),
        ];
        for (s, tf) in frames {
            assert_eq!(TimeFrame::from_str(s), Some(tf));
        }
        assert_eq!(TimeFrame::Hour4.as_str(), "4h");
    }

    #[test]
    fn timeframe_invalid_string_returns_none() {
        assert_eq!(TimeFrame::from_str("2m"), None);
        assert_eq!(TimeFrame::from_str(""), None);
    }

    #[test]
    fn exchange_kind_display_and_parse() {
        assert_eq!(ExchangeKind::Upbit.to_string(), "upbit");
        assert_eq!(ExchangeKind::Binance.to_string(), "binance");
        assert_eq!(
            ExchangeKind::from_name("Binance"),
            Some(ExchangeKind::Binance)
        );
        assert_eq!(ExchangeKind::from_name("kraken"), None);
    }

    #[test]
    fn exchange_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ExchangeKind::Upbit).unwrap();
        assert_eq!(json, r#""upbit""#);
    }

    #[test]
    fn log_values_serialize_as_plain_cells() {
        let row: LogRow = vec!["kline".into(), 42.5.into(), None.into(), f64::NAN.into()];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["kline",42.5,"",""]"#);
    }

    #[test]
    fn candle_exposes_millisecond_timestamp() {
        let candle = Candle {
            exchange: ExchangeKind::Binance,
            symbol: "BTCUSDT".into(),
            timeframe: TimeFrame::Hour1,
            open_time: DateTime::from_timestamp_millis(1_704_067_200_000).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        assert_eq!(candle.timestamp_millis(), 1_704_067_200_000);
    }
}
