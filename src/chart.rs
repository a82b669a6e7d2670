use error_stack::{Report, ResultExt};
use reqwest::Url;
use serde_json::{Value, json};

use crate::config::ChartConfig;
use crate::error::ChartError;
use crate::indicator::{EMA_FAST, EMA_SLOW, Ema, Indicator};
use crate::model::Candle;

/// Build a QuickChart URL for a candlestick chart of the trailing
/// `config.window` candles with EMA overlays.
///
/// Overlays are computed over the whole series so the first drawn candle
/// already carries a smoothed value.
pub fn chart_url(
    candles: &[Candle],
    symbol: &str,
    config: &ChartConfig,
) -> Result<String, Report<ChartError>> {
    let overlays: Vec<Box<dyn Indicator>> = vec![
        Box::new(Ema::new(EMA_FAST).change_context(ChartError::Encode)?),
        Box::new(Ema::new(EMA_SLOW).change_context(ChartError::Encode)?),
    ];
    let body = chart_body(candles, symbol, config.window, &overlays);
    let encoded = serde_json::to_string(&body).change_context(ChartError::Encode)?;

    let url = Url::parse_with_params(
        &config.base_url,
        &[
            ("w", config.width.to_string()),
            ("h", config.height.to_string()),
            ("c", encoded),
        ],
    )
    .change_context(ChartError::BaseUrl)
    .attach_with(|| format!("base_url: {}", config.base_url))?;

    Ok(url.into())
}

fn chart_body(
    candles: &[Candle],
    symbol: &str,
    window: usize,
    overlays: &[Box<dyn Indicator>],
) -> Value {
    let start = candles.len().saturating_sub(window);
    let visible = &candles[start..];

    let ohlc: Vec<Value> = visible
        .iter()
        .map(|c| json!([c.timestamp_millis(), c.open, c.high, c.low, c.close]))
        .collect();

    let mut datasets = vec![json!({
        "type": "candlestick",
        "label": symbol,
        "data": ohlc,
    })];

    for overlay in overlays {
        datasets.push(json!({
            "type": "line",
            "label": overlay.label(),
            "data": overlay_points(candles, start, overlay.as_ref()),
            "yAxisID": "y",
        }));
    }

    json!({
        "type": "financial",
        "data": { "datasets": datasets },
        "options": {
            "plugins": { "legend": { "display": true } },
            "scales": { "y": { "position": "left" } },
        },
    })
}

/// `[ms, value]` points for candles at index `start` onwards. Candles before the
/// indicator's first value get no point.
fn overlay_points(candles: &[Candle], start: usize, indicator: &dyn Indicator) -> Vec<Value> {
    if candles.len() < indicator.required_candles() {
        return Vec::new();
    }
    let values = indicator.calculate(candles);
    // values[0] belongs to candle index `offset`
    let offset = candles.len() - values.len();
    candles
        .iter()
        .enumerate()
        .skip(start.max(offset))
        .map(|(i, c)| json!([c.timestamp_millis(), values[i - offset]]))
        .collect()
}
