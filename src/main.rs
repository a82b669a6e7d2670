mod activity;
mod bot;
mod chart;
mod command;
mod config;
mod error;
mod exchange;
mod indicator;
mod messaging;
mod model;
mod narrative;
mod plan;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use activity::ActivityLog;
use activity::sheets::SheetsLog;
use activity::terminal::TracingLog;
use bot::Bot;
use config::AppConfig;
use exchange::ExchangeRegistry;
use messaging::line::LineMessenger;
use narrative::OpenAiNarrator;
use server::AppState;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("client setup error")]
    Setup,
    #[display("server error")]
    Server,
}

#[derive(Parser)]
#[command(name = "coin-chart-bot", about = "Crypto chart chat bot")]
struct Cli {
    /// Path to the TOML configuration file; defaults and environment variables apply without one
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = config::load(cli.config.as_deref()).change_context(AppError::Config)?;

    init_tracing(&config);

    // ── Collaborators ─────────────────────────────────────────────────────────
    let exchanges = ExchangeRegistry::from_config(&config);
    if exchanges.is_empty() {
        return Err(Report::new(AppError::Config).attach("no exchanges enabled"));
    }
    info!(
        exchanges = exchanges.len(),
        default = %exchanges.default_kind(),
        "exchange clients ready"
    );

    let narrator = Arc::new(OpenAiNarrator::new(&config.llm).change_context(AppError::Setup)?);
    let messenger = Arc::new(LineMessenger::new(&config.line).change_context(AppError::Setup)?);
    let activity = build_activity_log(&config)?;

    let bot = Bot::new(
        exchanges,
        narrator,
        messenger,
        activity,
        config.chart.clone(),
        &config.market.quote,
    );
    let state = AppState::new(
        Arc::new(bot),
        &config.line.channel_secret,
        config.sheets.is_enabled(),
    );

    // ── Server ────────────────────────────────────────────────────────────────
    let bind = &config.server.bind;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .change_context(AppError::Server)
        .attach_with(|| format!("bind: {bind}"))?;
    info!(bind = %bind, "listening for webhooks");

    let cancel = CancellationToken::new();
    let mut server = tokio::spawn(server::serve(listener, state, cancel.clone()));

    // ── Shutdown ──────────────────────────────────────────────────────────────
    let stopped_early = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.change_context(AppError::Server)?;
            info!("ctrl+c received, shutting down");
            cancel.cancel();
            None
        }
        // the server only returns on its own when it fails
        result = &mut server => Some(result),
    };
    let result = match stopped_early {
        Some(result) => result,
        None => server.await,
    };

    result
        .change_context(AppError::Server)?
        .change_context(AppError::Server)?;

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn build_activity_log(config: &AppConfig) -> Result<Arc<dyn ActivityLog>, Report<AppError>> {
    if !config.sheets.is_enabled() {
        info!("no spreadsheet configured, activity goes to the log");
        return Ok(Arc::new(TracingLog));
    }
    let sheets = SheetsLog::from_config(&config.sheets).change_context(AppError::Setup)?;
    Ok(Arc::new(sheets))
}
