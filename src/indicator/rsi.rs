/// RSI for the last value of `values`, `None` unless there are more than
/// `length` values.
pub fn rsi(values: &[f64], length: usize) -> Option<f64> {
    rsi_series(values, length).last().copied()
}

/// RSI (Relative Strength Index) using Wilder's smoothing method, one value
/// per delta from index `length` on.
fn rsi_series(values: &[f64], length: usize) -> Vec<f64> {
    if length == 0 || values.len() <= length {
        return Vec::new();
    }

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    // Seed using simple average of first `length` gains/losses
    let mut avg_gain: f64 =
        deltas[..length].iter().map(|&d| d.max(0.0)).sum::<f64>() / length as f64;
    let mut avg_loss: f64 =
        deltas[..length].iter().map(|&d| (-d).max(0.0)).sum::<f64>() / length as f64;

    let mut results = Vec::with_capacity(deltas.len() - length + 1);
    results.push(rsi_value(avg_gain, avg_loss));

    for &delta in &deltas[length..] {
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        avg_gain = (avg_gain * (length - 1) as f64 + gain) / length as f64;
        avg_loss = (avg_loss * (length - 1) as f64 + loss) / length as f64;
        results.push(rsi_value(avg_gain, avg_loss));
    }

    results
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    // No losses in the window: relative strength is unbounded.
    // A flat window, with no gains either, reads 100 as well.
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_unavailable_without_enough_deltas() {
        assert_eq!(rsi(&[1.0; 14], 14), None);
        assert_eq!(rsi(&[1.0; 10], 14), None);
        assert!(rsi(&[1.0; 15], 14).is_some());
    }

    #[test]
    fn rsi_period_zero_unavailable() {
        assert_eq!(rsi(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0, 4.0], 3), Some(100.0));
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let value = rsi(&[4.0, 3.0, 2.0, 1.0], 3).unwrap();
        assert!(value.abs() < 1e-9);
    }

    #[test]
    fn rsi_flat_series_hits_zero_loss_guard() {
        // avg_gain = avg_loss = 0; the zero-loss guard reads 100 rather than NaN
        assert_eq!(rsi(&[10.0; 20], 14), Some(100.0));
    }

    #[test]
    fn rsi_balanced_moves_read_50() {
        // +1, -1, +1, -1 -> avg_gain == avg_loss
        let value = rsi(&[10.0, 11.0, 10.0, 11.0, 10.0], 4).unwrap();
        assert!((value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_monotonic_series_converge_to_extremes() {
        let rising: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert_eq!(rsi(&rising, 14), Some(100.0));
        assert!(rsi(&falling, 14).unwrap() < 1e-9);
    }

    #[test]
    fn rsi_wilder_smoothing_known_value() {
        // deltas: +1, +1, -2 (seed, length 2), then +1
        // seed gain = 1, loss = 0; after -2: gain = 0.5, loss = 1
        // after +1: gain = 0.75, loss = 0.5
        // rs = 1.5 -> 100 - 100/2.5 = 60
        let value = rsi(&[10.0, 11.0, 12.0, 10.0, 11.0], 2).unwrap();
        assert!((value - 60.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_output_length() {
        let values = rsi_series(&[100.0_f64; 20], 14);
        // 20 prices -> 19 deltas -> 1 seed + 5 subsequent = 6 values
        assert_eq!(values.len(), 20 - 14);
    }
}
