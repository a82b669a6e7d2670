use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum ExchangeError {
    #[display("request to {exchange} failed")]
    Request { exchange: String },
    #[display("failed to parse response from {exchange}")]
    ResponseParse { exchange: String },
    #[display("{exchange} has no market for {symbol}")]
    UnknownSymbol { exchange: String, symbol: String },
    #[display("{exchange} returned no candles for {symbol}")]
    NoCandles { exchange: String, symbol: String },
    #[display("exchange \"{exchange}\" is not enabled")]
    NotEnabled { exchange: String },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum NarrativeError {
    #[display("language model request failed")]
    Request,
    #[display("language model returned an unusable response")]
    Response,
}

#[derive(Debug, Display, Error)]
pub enum ChartError {
    #[display("invalid chart base url")]
    BaseUrl,
    #[display("failed to encode chart specification")]
    Encode,
}

#[derive(Debug, Display, Error)]
pub enum MessagingError {
    #[display("failed to send reply")]
    Reply,
    #[display("messaging platform rejected the reply")]
    Rejected,
}

#[derive(Debug, Display, Error)]
pub enum ActivityError {
    #[display("invalid service account credentials")]
    Credentials,
    #[display("failed to obtain access token")]
    Token,
    #[display("failed to append row")]
    Append,
}

#[derive(Debug, Display, Error)]
pub enum CommandError {
    #[display("usage: {usage}")]
    Usage { usage: &'static str },
    #[display("unknown timeframe \"{value}\" (use 1m 3m 5m 15m 30m 1h 4h 1d 1w)")]
    UnknownTimeframe { value: String },
    #[display("entry price must be a positive number, got \"{value}\"")]
    InvalidEntry { value: String },
    #[display("candle count must be a number, got \"{value}\"")]
    InvalidLimit { value: String },
}

#[derive(Debug, Display, Error)]
pub enum PlanError {
    #[display("not enough candles for ATR({period})")]
    AtrUnavailable { period: usize },
}
