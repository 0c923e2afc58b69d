//! Folio CLI - portfolio management and analytics.
//!
//! Every command prints a JSON `ApiResponse` on stdout. Logs go to stderr and
//! are controlled with `RUST_LOG` (default `warn`).

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use folio_core::{
    engine::AnalyticsEngine,
    market::{MarketSnapshot, QuoteProvider},
    portfolio::{NewLot, PortfolioTracker, PositionEdit},
    ApiResponse, EngineConfig,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Folio portfolio CLI - valuation, history and risk analytics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Portfolio management commands
    Portfolio {
        #[command(subcommand)]
        action: PortfolioAction,
    },
    /// Show or change settings
    Settings {
        /// Display currency (USD, CAD, KRW, ...)
        #[arg(long)]
        display_currency: Option<String>,
        /// Annual risk-free rate (0.045 = 4.5%)
        #[arg(long)]
        risk_free_rate: Option<f64>,
        /// Expected annual return for the manual Sharpe estimate
        #[arg(long)]
        roi: Option<f64>,
        /// Expected annual volatility for the manual Sharpe estimate
        #[arg(long)]
        volatility: Option<f64>,
    },
    /// Run valuation, history and risk analytics against a market snapshot
    Report {
        /// Market snapshot JSON file
        #[arg(short, long)]
        market: PathBuf,
        /// Also report the return since this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
        /// Engine config TOML (defaults to FOLIO_CONFIG or the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum PortfolioAction {
    /// Get portfolio status
    Status,
    /// Add a lot; an existing ticker is merged at weighted-average cost
    Add {
        /// Ticker symbol
        #[arg(short, long)]
        ticker: String,
        /// Units bought (accepts "1,000")
        #[arg(short = 'n', long)]
        quantity: String,
        /// Cost per unit (accepts "$1,250.50")
        #[arg(short, long, default_value = "0")]
        cost: String,
        /// Asset class (Stock, ETF, Crypto, Bond, ...)
        #[arg(long)]
        class: Option<String>,
        /// Sector label
        #[arg(long)]
        sector: Option<String>,
        /// Classify from this market snapshot when no class is given
        #[arg(long)]
        market: Option<PathBuf>,
    },
    /// Remove a position
    Remove {
        /// Ticker symbol
        #[arg(short, long)]
        ticker: String,
    },
    /// Edit fields of a position; malformed numbers are ignored
    Edit {
        /// Ticker symbol
        #[arg(short, long)]
        ticker: String,
        /// Rename the ticker
        #[arg(long)]
        rename: Option<String>,
        #[arg(short = 'n', long)]
        quantity: Option<String>,
        #[arg(short, long)]
        cost: Option<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        sector: Option<String>,
    },
    /// Get or set a cash balance
    Cash {
        /// Currency code
        #[arg(long, default_value = "USD")]
        currency: String,
        /// Cash amount to set (optional)
        #[arg(short, long)]
        set: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Portfolio { action } => handle_portfolio(action),
        Commands::Settings {
            display_currency,
            risk_free_rate,
            roi,
            volatility,
        } => handle_settings(display_currency, risk_free_rate, roi, volatility),
        Commands::Report {
            market,
            since,
            config,
        } => handle_report(market, since, config),
    };

    let output = match output {
        Ok(json) => json,
        Err(e) => render(&ApiResponse::<()>::err(format!("{:#}", e)))?,
    };
    println!("{}", output);
    Ok(())
}

fn render<T: Serialize>(response: &ApiResponse<T>) -> anyhow::Result<String> {
    serde_json::to_string_pretty(response).context("failed to serialize response")
}

fn handle_portfolio(action: PortfolioAction) -> anyhow::Result<String> {
    let mut tracker = PortfolioTracker::new();

    match action {
        PortfolioAction::Status => {
            let portfolio = tracker.get();
            render(&ApiResponse::ok(json!({
                "positions": portfolio.positions,
                "position_count": portfolio.position_count(),
                "total_cost": portfolio.total_cost(),
                "cash": portfolio.cash,
                "settings": portfolio.settings,
                "updated_at": portfolio.updated_at,
            })))
        }
        PortfolioAction::Add {
            ticker,
            quantity,
            cost,
            class,
            sector,
            market,
        } => {
            let mut lot = NewLot::from_input(
                &ticker,
                &quantity,
                &cost,
                class.as_deref(),
                sector.as_deref(),
            );
            if lot.asset_class.is_none() {
                if let Some(path) = market {
                    let snapshot = MarketSnapshot::load(&path)
                        .with_context(|| format!("failed to load {}", path.display()))?;
                    if let Some(info) = snapshot.asset_info(&lot.ticker) {
                        lot.asset_class = Some(info.asset_class);
                        lot.sector.get_or_insert(info.sector);
                    }
                }
            }

            let (position, was_update) = tracker.add_position(lot)?;
            tracker.save()?;
            render(&ApiResponse::ok(json!({
                "position": position,
                "action": if was_update { "updated" } else { "added" },
            })))
        }
        PortfolioAction::Remove { ticker } => {
            let removed = tracker.remove_position(&ticker)?;
            tracker.save()?;
            render(&ApiResponse::ok(json!({
                "removed": removed,
            })))
        }
        PortfolioAction::Edit {
            ticker,
            rename,
            quantity,
            cost,
            class,
            sector,
        } => {
            let edit = PositionEdit {
                ticker: rename,
                quantity,
                avg_cost: cost,
                asset_class: class,
                sector,
            };
            let position = tracker.edit_position(&ticker, edit)?;
            tracker.save()?;
            render(&ApiResponse::ok(json!({
                "position": position,
            })))
        }
        PortfolioAction::Cash { currency, set } => {
            if let Some(amount) = set {
                tracker.set_cash(&currency, amount);
                tracker.save()?;
            }
            render(&ApiResponse::ok(json!({
                "currency": currency.to_uppercase(),
                "cash": tracker.cash(&currency),
            })))
        }
    }
}

fn handle_settings(
    display_currency: Option<String>,
    risk_free_rate: Option<f64>,
    roi: Option<f64>,
    volatility: Option<f64>,
) -> anyhow::Result<String> {
    let mut tracker = PortfolioTracker::new();
    let changed = display_currency.is_some()
        || risk_free_rate.is_some()
        || roi.is_some()
        || volatility.is_some();

    if let Some(currency) = display_currency {
        tracker.set_display_currency(&currency);
    }
    if let Some(rate) = risk_free_rate {
        tracker.set_risk_free_rate(rate)?;
    }
    if roi.is_some() || volatility.is_some() {
        let current = tracker.settings().risk_inputs;
        tracker.set_risk_inputs(
            roi.unwrap_or(current.roi),
            volatility.unwrap_or(current.volatility),
        );
    }
    if changed {
        tracker.save()?;
    }

    render(&ApiResponse::ok(tracker.settings()))
}

fn handle_report(
    market: PathBuf,
    since: Option<NaiveDate>,
    config: Option<PathBuf>,
) -> anyhow::Result<String> {
    let config = match config {
        Some(path) => EngineConfig::load_from_path(&path),
        None => EngineConfig::load(),
    }
    .context("failed to load engine config")?;

    let snapshot = MarketSnapshot::load(&market)
        .with_context(|| format!("failed to load {}", market.display()))?;
    let today = snapshot.as_of.unwrap_or_else(|| Local::now().date_naive());

    let tracker = PortfolioTracker::new();
    let engine = AnalyticsEngine::new(&snapshot, &snapshot, &config);
    let report = engine.run(tracker.get(), today);

    let since_return = since.map(|date| report.return_since(date));
    let stale = report.fx_stale;
    render(
        &ApiResponse::ok(json!({
            "report": report,
            "since": since,
            "since_return": since_return,
        }))
        .with_stale(stale),
    )
}
