use crate::model::Candle;

/// Recent support (lowest low) and resistance (highest high).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub low: f64,
    pub high: f64,
}

impl Levels {
    pub fn span(&self) -> f64 {
        self.high - self.low
    }
}

/// Levels over the last `window` candles, or over all of them when the series
/// is shorter. `None` for an empty series or a zero window.
pub fn recent_levels(candles: &[Candle], window: usize) -> Option<Levels> {
    if window == 0 || candles.is_empty() {
        return None;
    }
    let tail = &candles[candles.len().saturating_sub(window)..];
    let low = tail.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let high = tail
        .iter()
        .map(|c| c.high)
        .fold(f64::NEG_INFINITY, f64::max);
    Some(Levels { low, high })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::test_support::candles_with_range;

    #[test]
    fn levels_cover_only_the_window() {
        let candles = candles_with_range(&[
            (200.0, 1.0, 100.0),
            (105.0, 95.0, 100.0),
            (110.0, 98.0, 104.0),
        ]);
        let levels = recent_levels(&candles, 2).unwrap();
        assert_eq!(
            levels,
            Levels {
                low: 95.0,
                high: 110.0
            }
        );
        assert_eq!(levels.span(), 15.0);
    }

    #[test]
    fn short_series_uses_everything() {
        let candles = candles_with_range(&[(3.0, 1.0, 2.0), (4.0, 2.0, 3.0)]);
        let levels = recent_levels(&candles, 50).unwrap();
        assert_eq!(
            levels,
            Levels {
                low: 1.0,
                high: 4.0
            }
        );
    }

    #[test]
    fn empty_series_has_no_levels() {
        assert_eq!(recent_levels(&[], 50), None);
    }
}
