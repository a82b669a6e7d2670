pub mod binance;
pub mod upbit;

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::config::AppConfig;
use crate::error::ExchangeError;
use crate::model::{Candle, ExchangeKind, Ticker, TimeFrame};

/// Abstraction over a cryptocurrency exchange.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn Exchange`).
pub trait Exchange: Send + Sync {
    fn kind(&self) -> ExchangeKind;

    /// Fetch the most recent `limit` candles, oldest first.
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Candle>, Report<ExchangeError>>>;

    /// Fetch the current price and 24h statistics.
    fn fetch_ticker(&self, symbol: &str) -> BoxFuture<'_, Result<Ticker, Report<ExchangeError>>>;
}

/// Upper-case `coin` and append `quote` unless it already ends with it.
pub fn normalize_symbol(coin: &str, quote: &str) -> String {
    let coin = coin.trim().to_uppercase();
    let quote = quote.to_uppercase();
    if coin.ends_with(&quote) {
        coin
    } else {
        format!("{coin}{quote}")
    }
}

/// Construct the client for a known exchange.
pub fn build_exchange(kind: ExchangeKind, quote: &str) -> Arc<dyn Exchange> {
    match kind {
        ExchangeKind::Binance => Arc::new(binance::BinanceExchange::new()),
        ExchangeKind::Upbit => Arc::new(upbit::UpbitExchange::new(quote)),
    }
}

/// The set of exchange clients created at startup, looked up by name.
pub struct ExchangeRegistry {
    exchanges: HashMap<ExchangeKind, Arc<dyn Exchange>>,
    default: ExchangeKind,
}

impl ExchangeRegistry {
    /// Build every enabled exchange named in `config`.
    ///
    /// Unknown names are skipped; config validation guarantees the default
    /// exchange is known and enabled.
    pub fn from_config(config: &AppConfig) -> Self {
        let quote = &config.market.quote;
        let exchanges = config
            .exchanges
            .iter()
            .filter(|e| e.enabled)
            .filter_map(|e| match ExchangeKind::from_name(&e.name) {
                Some(kind) => Some((kind, build_exchange(kind, quote))),
                None => {
                    tracing::warn!(name = %e.name, "unknown exchange in config, skipping");
                    None
                }
            })
            .collect();

        let default = ExchangeKind::from_name(&config.market.default_exchange)
            .unwrap_or(ExchangeKind::Binance);

        Self { exchanges, default }
    }

    /// Registry over explicit clients, first one is the default.
    #[cfg(test)]
    pub fn with_exchanges(exchanges: Vec<Arc<dyn Exchange>>) -> Self {
        let default = exchanges
            .first()
            .map(|e| e.kind())
            .unwrap_or(ExchangeKind::Binance);
        Self {
            exchanges: exchanges.into_iter().map(|e| (e.kind(), e)).collect(),
            default,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Exchange>> {
        ExchangeKind::from_name(name).and_then(|kind| self.exchanges.get(&kind).cloned())
    }

    pub fn default_kind(&self) -> ExchangeKind {
        self.default
    }

    pub fn default_exchange(&self) -> Option<Arc<dyn Exchange>> {
        self.exchanges.get(&self.default).cloned()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ExchangeConfig};

    #[test]
    fn bare_coin_gets_quote_suffix() {
        assert_eq!(normalize_symbol("btc", "USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol(" eth ", "usdt"), "ETHUSDT");
    }

    #[test]
    fn suffixed_symbol_is_unchanged() {
        assert_eq!(normalize_symbol("BTCUSDT", "USDT"), "BTCUSDT");
        assert_eq!(normalize_symbol("btcusdt", "USDT"), "BTCUSDT");
    }

    #[test]
    fn registry_builds_enabled_known_exchanges() {
        let mut config = AppConfig::default();
        config.exchanges = vec![
            ExchangeConfig {
                name: "binance".into(),
                enabled: true,
            },
            ExchangeConfig {
                name: "upbit".into(),
                enabled: false,
            },
            ExchangeConfig {
                name: "kraken".into(),
                enabled: true,
            },
        ];
        let registry = ExchangeRegistry::from_config(&config);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("Binance").is_some());
        assert!(registry.get("upbit").is_none());
        assert!(registry.get("kraken").is_none());
        assert_eq!(registry.default_kind(), ExchangeKind::Binance);
        assert_eq!(
            registry.default_exchange().map(|e| e.kind()),
            Some(ExchangeKind::Binance)
        );
    }
}
