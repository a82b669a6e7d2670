use std::fmt;
use std::fmt::Write as _;

use crate::error::PlanError;
use crate::indicator::Levels;
use crate::model::{IndicatorSnapshot, TimeFrame};
use crate::narrative::fmt_reading;

pub const DEFAULT_WINDOW: usize = 50;
pub const MIN_WINDOW: usize = 10;
pub const MAX_WINDOW: usize = 500;
pub const DEFAULT_ATR_PERIOD: usize = 14;
pub const MIN_ATR_PERIOD: usize = 5;
pub const MAX_ATR_PERIOD: usize = 100;

const STOP_ATR: f64 = 1.5;
const TARGET_ATR: [f64; 3] = [2.0, 3.0, 4.0];
/// Fixed steps used by SR mode when entry is already past the opposite level.
const FALLBACK_STEPS: [f64; 3] = [20.0, 40.0, 70.0];
const SPAN_FRACTIONS: [f64; 2] = [0.35, 0.65];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Long,
    Short,
}

impl Side {
    /// `+1` for long, `-1` for short: multiplies every offset from entry.
    fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// How the stop and targets are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanMode {
    /// Multiples of ATR around entry.
    #[default]
    Atr,
    /// Recent support and resistance.
    Sr,
    /// ATR targets with a structure-aware stop and final target.
    Mix,
}

impl PlanMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "atr" => Some(Self::Atr),
            "sr" => Some(Self::Sr),
            "mix" => Some(Self::Mix),
            _ => None,
        }
    }
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atr => write!(f, "atr"),
            Self::Sr => write!(f, "sr"),
            Self::Mix => write!(f, "mix"),
        }
    }
}

/// Stop-loss and three take-profit steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ladder {
    pub stop: f64,
    pub targets: [f64; 3],
}

/// Distance kept between a structure level and the stop placed beyond it.
pub fn structure_buffer(levels: Levels) -> f64 {
    (levels.span() * 0.002).max(0.5)
}

/// Place the stop and targets for a position opened at `entry`.
///
/// `atr` is required by ATR and mixed modes; SR mode ignores it.
pub fn ladder(
    entry: f64,
    side: Side,
    mode: PlanMode,
    atr: Option<f64>,
    atr_period: usize,
    levels: Levels,
) -> Result<Ladder, PlanError> {
    let sign = side.sign();
    let buffer = structure_buffer(levels);
    let require_atr = || atr.ok_or(PlanError::AtrUnavailable { period: atr_period });

    let ladder = match mode {
        PlanMode::Atr => {
            let atr = require_atr()?;
            Ladder {
                stop: entry - sign * STOP_ATR * atr,
                targets: TARGET_ATR.map(|m| entry + sign * m * atr),
            }
        }
        PlanMode::Sr => {
            // the level the position runs toward and the one it hides behind
            let (stop, objective) = match side {
                Side::Long => (levels.low - buffer, levels.high),
                Side::Short => (levels.high + buffer, levels.low),
            };
            let span = sign * (objective - entry);
            let targets = if span <= 0.0 {
                FALLBACK_STEPS.map(|step| entry + sign * step)
            } else {
                [
                    entry + sign * span * SPAN_FRACTIONS[0],
                    entry + sign * span * SPAN_FRACTIONS[1],
                    objective,
                ]
            };
            Ladder { stop, targets }
        }
        PlanMode::Mix => {
            let atr = require_atr()?;
            let atr_stop = entry - sign * STOP_ATR * atr;
            let (stop, objective) = match side {
                Side::Long => (atr_stop.min(levels.low - buffer), levels.high),
                Side::Short => (atr_stop.max(levels.high + buffer), levels.low),
            };
            Ladder {
                stop,
                targets: [
                    entry + sign * TARGET_ATR[0] * atr,
                    entry + sign * TARGET_ATR[1] * atr,
                    objective,
                ],
            }
        }
    };
    Ok(ladder)
}

/// Everything the plan reply describes.
pub struct PlanReport<'a> {
    pub symbol: &'a str,
    pub timeframe: TimeFrame,
    pub entry: f64,
    pub side: Side,
    pub mode: PlanMode,
    pub window: usize,
    pub atr_period: usize,
    pub atr: Option<f64>,
    pub levels: Levels,
    pub snapshot: IndicatorSnapshot,
    pub ladder: Ladder,
}

impl PlanReport<'_> {
    /// Activity-log tag, e.g. `plan-long-atr-w50-atr14`.
    pub fn tag(&self) -> String {
        format!(
            "plan-{}-{}-w{}-atr{}",
            self.side, self.mode, self.window, self.atr_period
        )
    }

    pub fn render(&self) -> String {
        let close = self.snapshot.close;
        let mut out = String::new();

        let _ = writeln!(
            out,
            "{} {} {} plan from {}: {}.",
            self.symbol,
            self.timeframe,
            self.side,
            fmt_price(self.entry),
            self.position_status(),
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "Market");
        let _ = writeln!(
            out,
            "Range: {} - {} over the last {} candles, last close {}.",
            fmt_price(self.levels.low),
            fmt_price(self.levels.high),
            self.window,
            close.map_or_else(|| "n/a".to_owned(), fmt_price),
        );
        let _ = writeln!(
            out,
            "RSI: {}, {}.",
            fmt_reading(self.snapshot.rsi14, 1),
            rsi_zone(self.snapshot.rsi14)
        );
        let _ = writeln!(out, "EMA20/50: {}.", self.trend());
        let _ = writeln!(out);
        let _ = writeln!(out, "Plan ({} mode)", self.mode);
        let _ = writeln!(out, "Stop: {}", fmt_price(self.ladder.stop));
        let [t1, t2, t3] = self.ladder.targets;
        let _ = writeln!(out, "T1: {} -> close 1/3", fmt_price(t1));
        let _ = writeln!(out, "T2: {} -> close another 1/3", fmt_price(t2));
        let _ = writeln!(out, "T3: {} -> trail the last 1/3", fmt_price(t3));
        let _ = writeln!(out);
        let _ = write!(out, "Note: {}", self.mode_note());
        out
    }

    fn position_status(&self) -> &'static str {
        let Some(close) = self.snapshot.close else {
            return "status unknown";
        };
        match self.side {
            Side::Long if close > self.entry => "in profit above entry",
            Side::Long => "below entry, be careful",
            Side::Short if close < self.entry => "in profit below entry",
            Side::Short => "above entry, be careful",
        }
    }

    fn trend(&self) -> &'static str {
        let (Some(fast), Some(slow)) = (self.snapshot.ema20, self.snapshot.ema50) else {
            return "not enough history";
        };
        match self.side {
            Side::Long if fast > slow => "bullish alignment",
            Side::Long => "bearish alignment",
            Side::Short if fast < slow => "bearish alignment",
            Side::Short => "bullish alignment, watch for squeezes",
        }
    }

    fn mode_note(&self) -> String {
        let atr = fmt_reading(self.atr, 2);
        let buffer = structure_buffer(self.levels);
        let (near, far) = match self.side {
            Side::Long => ("below the recent low", "resistance"),
            Side::Short => ("above the recent high", "support"),
        };
        match self.mode {
            PlanMode::Atr => format!(
                "ATR mode (ATR {atr}, n={}): stop 1.5x ATR from entry, targets at 2/3/4x ATR.",
                self.atr_period
            ),
            PlanMode::Sr => format!(
                "S/R mode (window={}): stop {buffer:.2} {near}, targets scale toward {far}.",
                self.window
            ),
            PlanMode::Mix => format!(
                "mixed mode (ATR {atr}, n={}, window={}): stop at the farther of the ATR \
                 and structure stops, T1/T2 at ATR multiples, T3 at {far}.",
                self.atr_period, self.window
            ),
        }
    }
}

pub fn rsi_zone(rsi: Option<f64>) -> &'static str {
    match rsi {
        Some(v) if v >= 70.0 => "overbought risk",
        Some(v) if v <= 30.0 => "oversold risk",
        Some(_) => "neutral",
        None => "unknown",
    }
}

/// Two decimals for prices of 1 and up, more below that.
fn fmt_price(value: f64) -> String {
    if value.abs() >= 1.0 {
        format!("{value:.2}")
    } else {
        format!("{value:.6}")
    }
}
