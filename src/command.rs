use crate::error::CommandError;
use crate::model::TimeFrame;
use crate::plan::{
    DEFAULT_ATR_PERIOD, DEFAULT_WINDOW, MAX_ATR_PERIOD, MAX_WINDOW, MIN_ATR_PERIOD, MIN_WINDOW,
    PlanMode, Side,
};

pub const DEFAULT_COIN: &str = "btc";
pub const DEFAULT_TIMEFRAME: TimeFrame = TimeFrame::Hour1;
pub const DEFAULT_KLINE_LIMIT: usize = 100;
pub const MAX_KLINE_LIMIT: usize = 1000;
/// Candles fetched by `/ta` and `/plan`.
pub const ANALYSIS_CANDLES: usize = 200;

const KLINE_USAGE: &str = "/kline btc 1h 100";
const TA_USAGE: &str = "/ta btc 4h";
const PLAN_USAGE: &str = "/plan eth 1h 4290 [short] [atr|sr|mix] [wN] [atrN]";

pub const HELP_TEXT: &str = "Commands: /price btc, /kline btc 1h 100, /ta btc 4h, \
/plan eth 1h 4290 [short] [atr|sr|mix] [wN] [atrN]. \
Add @binance or @upbit to any command to pick the exchange.";

/// Coin plus the exchange it was asked for, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Market {
    pub coin: String,
    /// Lower-cased name given with `@name`; `None` means the default exchange.
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub market: Market,
    pub timeframe: TimeFrame,
    pub entry: f64,
    pub side: Side,
    pub mode: PlanMode,
    pub window: usize,
    pub atr_period: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Price { market: Market },
    Kline {
        market: Market,
        timeframe: TimeFrame,
        limit: usize,
    },
    Ta {
        market: Market,
        timeframe: TimeFrame,
    },
    Plan(PlanRequest),
    Help,
}

/// Parse a chat message. Unrecognised text yields `Command::Help`.
pub fn parse(text: &str) -> Result<Command, CommandError> {
    let mut exchange = None;
    let mut parts = Vec::new();
    for token in text.split_whitespace() {
        match token.strip_prefix('@') {
            Some(name) if !name.is_empty() => exchange = Some(name.to_ascii_lowercase()),
            _ => parts.push(token),
        }
    }

    let Some((head, args)) = parts.split_first() else {
        return Ok(Command::Help);
    };
    let market = |coin: &str| Market {
        coin: coin.to_owned(),
        exchange: exchange.clone(),
    };

    match head.to_ascii_lowercase().as_str() {
        "/price" => Ok(Command::Price {
            market: market(args.first().copied().unwrap_or(DEFAULT_COIN)),
        }),
        "/kline" => {
            let [coin, rest @ ..] = args else {
                return Err(CommandError::Usage { usage: KLINE_USAGE });
            };
            let timeframe = match rest.first() {
                Some(s) => timeframe(s)?,
                None => DEFAULT_TIMEFRAME,
            };
            let limit = match rest.get(1) {
                Some(s) => kline_limit(s)?,
                None => DEFAULT_KLINE_LIMIT,
            };
            Ok(Command::Kline {
                market: market(coin),
                timeframe,
                limit,
            })
        }
        "/ta" => {
            let [coin, rest @ ..] = args else {
                return Err(CommandError::Usage { usage: TA_USAGE });
            };
            let timeframe = match rest.first() {
                Some(s) => timeframe(s)?,
                None => DEFAULT_TIMEFRAME,
            };
            Ok(Command::Ta {
                market: market(coin),
                timeframe,
            })
        }
        "/plan" => {
            let [coin, tf, entry, options @ ..] = args else {
                return Err(CommandError::Usage { usage: PLAN_USAGE });
            };
            let mut request = PlanRequest {
                market: market(coin),
                timeframe: timeframe(tf)?,
                entry: entry_price(entry)?,
                side: Side::default(),
                mode: PlanMode::default(),
                window: DEFAULT_WINDOW,
                atr_period: DEFAULT_ATR_PERIOD,
            };
            apply_plan_options(&mut request, options);
            Ok(Command::Plan(request))
        }
        _ => Ok(Command::Help),
    }
}

fn timeframe(s: &str) -> Result<TimeFrame, CommandError> {
    TimeFrame::from_str(s).ok_or_else(|| CommandError::UnknownTimeframe {
        value: s.to_owned(),
    })
}

fn kline_limit(s: &str) -> Result<usize, CommandError> {
    let n: i64 = s.parse().map_err(|_| CommandError::InvalidLimit {
        value: s.to_owned(),
    })?;
    Ok(n.clamp(1, MAX_KLINE_LIMIT as i64) as usize)
}

fn entry_price(s: &str) -> Result<f64, CommandError> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(CommandError::InvalidEntry {
            value: s.to_owned(),
        }),
    }
}

/// Optional `/plan` flags in any order. Unknown flags are ignored.
fn apply_plan_options(request: &mut PlanRequest, options: &[&str]) {
    for option in options {
        let option = option.to_lowercase();
        if matches!(option.as_str(), "short" | "s" | "空" | "空單") {
            request.side = Side::Short;
        } else if option == "long" {
            request.side = Side::Long;
        } else if let Some(mode) = PlanMode::from_name(&option) {
            request.mode = mode;
        } else if let Some(n) = option.strip_prefix("atr").and_then(digits) {
            request.atr_period = n.clamp(MIN_ATR_PERIOD, MAX_ATR_PERIOD);
        } else if let Some(n) = option.strip_prefix('w').and_then(digits) {
            request.window = n.clamp(MIN_WINDOW, MAX_WINDOW);
        }
    }
}

/// An all-digit string as a number, saturating on overflow.
fn digits(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(s.parse().unwrap_or(usize::MAX))
}
