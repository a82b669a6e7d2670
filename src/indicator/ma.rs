use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, close_prices};
use crate::model::Candle;

/// Mean of the last `length` values, `None` when there are fewer than `length`.
pub fn sma(values: &[f64], length: usize) -> Option<f64> {
    if length == 0 || values.len() < length {
        return None;
    }
    let window = &values[values.len() - length..];
    Some(window.iter().sum::<f64>() / length as f64)
}

/// Exponential moving average of the whole series, seeded with the SMA of the
/// first `length` values.
pub fn ema(values: &[f64], length: usize) -> Option<f64> {
    ema_series(values, length).last().copied()
}

/// Every EMA value from index `length - 1` onwards. Empty when `values` is
/// shorter than `length`.
pub fn ema_series(values: &[f64], length: usize) -> Vec<f64> {
    if length == 0 || values.len() < length {
        return Vec::new();
    }

    let k = 2.0 / (length as f64 + 1.0);
    let mut ema = values[..length].iter().sum::<f64>() / length as f64;
    let mut results = Vec::with_capacity(values.len() - length + 1);
    results.push(ema);

    for &value in &values[length..] {
        ema = value * k + ema * (1.0 - k);
        results.push(ema);
    }

    results
}

/// Exponential Moving Average.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Ema {
    fn label(&self) -> String {
        format!("EMA{}", self.period)
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Vec<f64> {
        ema_series(&close_prices(candles), self.period)
    }
}
