use crate::indicator::sma;
use crate::model::Candle;

/// Average True Range: plain mean of the last `length` true ranges.
///
/// The first candle has no previous close, so `length + 1` candles are needed.
pub fn atr(candles: &[Candle], length: usize) -> Option<f64> {
    if length == 0 || candles.len() <= length {
        return None;
    }
    let ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();
    sma(&ranges, length)
}

fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::{candles_from_closes, candles_with_range};

    #[test]
    fn atr_unavailable_without_previous_close() {
        let candles = candles_from_closes(&[1.0; 14]);
        assert_eq!(atr(&candles, 14), None);
        assert_eq!(atr(&candles, 0), None);
    }

    #[test]
    fn atr_of_flat_candles_is_zero() {
        let candles = candles_from_closes(&[5.0; 20]);
        assert_eq!(atr(&candles, 14), Some(0.0));
    }

    #[test]
    fn atr_uses_gaps_against_previous_close() {
        // (high, low, close)
        let candles = candles_with_range(&[
            (10.0, 9.0, 10.0),
            (12.0, 11.0, 11.5), // gap up: |12 - 10| = 2
            (11.5, 10.5, 11.0), // range 1, |11.5 - 11.5| = 0, |10.5 - 11.5| = 1
        ]);
        assert_eq!(atr(&candles, 2), Some(1.5));
        assert_eq!(atr(&candles, 1), Some(1.0));
    }
}
