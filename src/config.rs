use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::ExchangeKind;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_bind() -> String {
    "0.0.0.0:8000".into()
}

fn default_exchange() -> String {
    "binance".into()
}

fn default_quote() -> String {
    "USDT".into()
}

fn default_exchanges() -> Vec<ExchangeConfig> {
    ExchangeKind::ALL
        .iter()
        .map(|kind| ExchangeConfig {
            name: kind.to_string(),
            enabled: true,
        })
        .collect()
}

fn default_line_api_base() -> String {
    "https://api.line.me".into()
}

fn default_reply_timeout_secs() -> u64 {
    10
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_chart_base_url() -> String {
    "https://quickchart.io/chart".into()
}

fn default_chart_width() -> u32 {
    900
}

fn default_chart_height() -> u32 {
    480
}

fn default_chart_window() -> usize {
    100
}

fn default_sheet_name() -> String {
    "TV_LOG".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default = "default_exchanges")]
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub line: LineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            market: MarketConfig::default(),
            exchanges: default_exchanges(),
            line: LineConfig::default(),
            llm: LlmConfig::default(),
            chart: ChartConfig::default(),
            sheets: SheetsConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_exchange")]
    pub default_exchange: String,
    /// Quote currency appended to bare coin names.
    #[serde(default = "default_quote")]
    pub quote: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            default_exchange: default_exchange(),
            quote: default_quote(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct LineConfig {
    #[serde(default)]
    pub channel_secret: String,
    #[serde(default)]
    pub channel_access_token: String,
    #[serde(default = "default_line_api_base")]
    pub api_base: String,
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_secret: String::new(),
            channel_access_token: String::new(),
            api_base: default_line_api_base(),
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_chart_base_url")]
    pub base_url: String,
    #[serde(default = "default_chart_width")]
    pub width: u32,
    #[serde(default = "default_chart_height")]
    pub height: u32,
    /// Number of trailing candles drawn.
    #[serde(default = "default_chart_window")]
    pub window: usize,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            base_url: default_chart_base_url(),
            width: default_chart_width(),
            height: default_chart_height(),
            window: default_chart_window(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SheetsConfig {
    /// Spreadsheet id; logging goes to the tracing sink when empty.
    #[serde(default)]
    pub sheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    /// Inline service-account key JSON. Takes precedence over `service_account_path`.
    #[serde(default)]
    pub service_account_json: String,
    #[serde(default)]
    pub service_account_path: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            sheet_id: String::new(),
            sheet_name: default_sheet_name(),
            service_account_json: String::new(),
            service_account_path: String::new(),
        }
    }
}

impl SheetsConfig {
    pub fn is_enabled(&self) -> bool {
        !self.sheet_id.is_empty()
    }
}

/// Load an `AppConfig` from an optional TOML file, apply environment
/// overrides and validate the result.
pub fn load(path: Option<&Path>) -> Result<AppConfig, Report<ConfigError>> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .change_context(ConfigError::ReadFile)
                .attach_with(|| format!("path: {}", path.display()))?;
            parse(&content)?
        }
        None => AppConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

fn parse(content: &str) -> Result<AppConfig, Report<ConfigError>> {
    toml::from_str(content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })
}

/// Overlay secrets and identifiers from the environment. Empty variables are ignored.
fn apply_env(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = get("LINE_CHANNEL_SECRET") {
        config.line.channel_secret = v;
    }
    if let Some(v) = get("LINE_CHANNEL_ACCESS_TOKEN") {
        config.line.channel_access_token = v;
    }
    if let Some(v) = get("OPENAI_API_KEY") {
        config.llm.api_key = v;
    }
    if let Some(v) = get("DEFAULT_EXCHANGE") {
        config.market.default_exchange = v.to_lowercase();
    }
    if let Some(v) = get("SHEET_ID") {
        config.sheets.sheet_id = v;
    }
    if let Some(v) = get("SHEET_NAME") {
        config.sheets.sheet_name = v;
    }
    if let Some(v) = get("SHEET_SA_JSON") {
        config.sheets.service_account_json = v;
    }
    if let Some(v) = get("SHEET_SA_PATH") {
        config.sheets.service_account_path = v;
    }
    if let Some(v) = get("BIND_ADDR") {
        config.server.bind = v;
    }
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_line(config)?;
    validate_default_exchange(config)?;
    validate_market(config)?;
    validate_chart(config)?;
    validate_sheets(config)?;
    Ok(())
}

fn validate_line(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.line.channel_secret.is_empty() || config.line.channel_access_token.is_empty() {
        return Err(Report::new(ConfigError::Validation {
            field: "line.channel_secret and line.channel_access_token are required".into(),
        }));
    }
    Ok(())
}

fn validate_default_exchange(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let name = &config.market.default_exchange;
    let Some(kind) = ExchangeKind::from_name(name) else {
        return Err(Report::new(ConfigError::Validation {
            field: format!("market.default_exchange: unknown exchange \"{name}\""),
        }));
    };

    let enabled = config
        .exchanges
        .iter()
        .any(|e| e.enabled && ExchangeKind::from_name(&e.name) == Some(kind));

    if !enabled {
        return Err(Report::new(ConfigError::Validation {
            field: format!("market.default_exchange \"{name}\" is not an enabled exchange"),
        }));
    }
    Ok(())
}

fn validate_market(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.market.quote.trim().is_empty() {
        return Err(Report::new(ConfigError::Validation {
            field: "market.quote must not be empty".into(),
        }));
    }
    Ok(())
}

fn validate_chart(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let chart = &config.chart;
    if chart.width == 0 || chart.height == 0 || chart.window == 0 {
        return Err(Report::new(ConfigError::Validation {
            field: "chart.width, chart.height and chart.window must be positive".into(),
        }));
    }
    Ok(())
}

fn validate_sheets(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let sheets = &config.sheets;
    if sheets.is_enabled()
        && sheets.service_account_json.is_empty()
        && sheets.service_account_path.is_empty()
    {
        return Err(Report::new(ConfigError::Validation {
            field: "sheets.sheet_id requires service_account_json or service_account_path".into(),
        }));
    }
    Ok(())
}
