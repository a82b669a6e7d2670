pub mod atr;
pub mod levels;
pub mod ma;
pub mod rsi;

use crate::model::{Candle, IndicatorSnapshot};

pub use atr::atr;
pub use levels::{Levels, recent_levels};
pub use ma::{Ema, ema, sma};
pub use rsi::rsi;

pub const EMA_FAST: usize = 20;
pub const EMA_SLOW: usize = 50;
pub const RSI_PERIOD: usize = 14;

/// A technical analysis indicator that operates on a slice of candles.
///
/// Candles must be in ascending chronological order (oldest first).
pub trait Indicator: Send + Sync {
    /// Display label, e.g. "EMA20".
    fn label(&self) -> String;

    /// Minimum number of candles required to produce at least one output value.
    fn required_candles(&self) -> usize;

    /// Calculate indicator values from candles.
    ///
    /// Returns one value per output point, or an empty vector when fewer than
    /// `required_candles()` candles are given.
    fn calculate(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Extract close prices from a slice of candles.
pub fn close_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

impl IndicatorSnapshot {
    /// Read close, EMA(20), EMA(50) and RSI(14) off the last candle of `candles`.
    pub fn from_candles(candles: &[Candle]) -> Self {
        let closes = close_prices(candles);
        Self {
            close: closes.last().copied(),
            ema20: ema(&closes, EMA_FAST),
            ema50: ema(&closes, EMA_SLOW),
            rsi14: rsi(&closes, RSI_PERIOD),
        }
    }

    /// True when every reading is available.
    pub fn is_complete(&self) -> bool {
        self.close.is_some() && self.ema20.is_some() && self.ema50.is_some() && self.rsi14.is_some()
    }
}
