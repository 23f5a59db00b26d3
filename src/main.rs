use anyhow::Context;
use clap::{Parser, Subcommand};
use palisade::api::MexcClient;
use palisade::clock::SystemClock;
use palisade::config::Settings;
use palisade::db::{CoinFilter, CoinStore, PostgresStore};
use palisade::discovery::{CoinScreener, CoinUniverseSync, ScreenOptions, ScreenOutcome};
use palisade::execution::{EntryMode, EntryPlanner, Reconciler, Transition};
use palisade::notify::{AnyNotifier, LogNotifier, TelegramNotifier};
use palisade::Error;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Flat-range ("palisade") spot trading engine
#[derive(Parser, Debug)]
#[command(name = "palisade")]
#[command(version)]
struct Args {
    /// Settings file (defaults to palisade.toml if present)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log per-coin analysis details
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register every listed pair not yet stored
    SyncCoins,

    /// Re-check trading-allowed coins for a flat regime
    Screen {
        /// Trim wicks at this percentile (1-100) before analysis
        #[arg(short, long)]
        percentile: Option<u32>,

        /// Only re-check coins currently flagged flat
        #[arg(long)]
        only_flat: bool,
    },

    /// Force a check of a single pair
    CheckCoin {
        #[arg(short, long)]
        symbol: String,

        #[arg(short, long)]
        percentile: Option<u32>,
    },

    /// Place entry orders on flat coins
    Enter {
        /// Fill up to max_open_orders slots with shuffled candidates
        #[arg(long)]
        multi: bool,
    },

    /// Advance open trades through their lifecycle
    Reconcile,

    /// Reconcile, then enter (cron entry point)
    Run {
        #[arg(long)]
        multi: bool,
    },
}

// ============================================================================
// Wiring
// ============================================================================

struct App {
    settings: Settings,
    exchange: MexcClient,
    store: PostgresStore,
    notifier: AnyNotifier,
    clock: SystemClock,
}

impl App {
    async fn build(config_path: Option<&str>) -> anyhow::Result<Self> {
        let settings = Settings::load(config_path).context("Failed to load settings")?;

        let exchange = MexcClient::new(&settings.mexc).context("Failed to build MEXC client")?;
        let store = PostgresStore::connect(&settings.database_url)
            .await
            .context("Failed to connect to Postgres")?;

        let notifier = match TelegramNotifier::from_settings(&settings.telegram)? {
            Some(telegram) => AnyNotifier::Telegram(telegram),
            None => {
                tracing::warn!("Telegram not configured, notifications go to the log");
                AnyNotifier::Log(LogNotifier)
            }
        };

        Ok(Self {
            settings,
            exchange,
            store,
            notifier,
            clock: SystemClock,
        })
    }
}

fn setup_logging(debug: bool) {
    let default = if debug { "palisade=debug" } else { "palisade=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging(args.debug);

    tracing::info!("🚀 Palisade starting: {:?}", args.command);

    let app = App::build(args.config.as_deref()).await?;

    let result = match args.command {
        Command::SyncCoins => cmd_sync_coins(&app).await,
        Command::Screen {
            percentile,
            only_flat,
        } => cmd_screen(&app, percentile, only_flat).await,
        Command::CheckCoin { symbol, percentile } => cmd_check_coin(&app, &symbol, percentile).await,
        Command::Enter { multi } => cmd_enter(&app, multi).await,
        Command::Reconcile => cmd_reconcile(&app).await,
        Command::Run { multi } => cmd_run(&app, multi).await,
    };

    if let Err(Error::PostActionPersistence { action, source }) = &result {
        tracing::error!(
            "🛑 {} went through on the exchange but was not recorded: {}. Reconcile before the next run.",
            action,
            source
        );
    }

    result.map_err(anyhow::Error::from)
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_sync_coins(app: &App) -> palisade::Result<()> {
    let delay = Duration::from_secs(app.settings.engine.sync_delay_secs);
    let report = CoinUniverseSync::new(&app.exchange, &app.store).run(delay).await?;
    tracing::info!("✅ {} new coins of {} listed", report.added, report.listed);
    Ok(())
}

async fn cmd_screen(app: &App, percentile: Option<u32>, only_flat: bool) -> palisade::Result<()> {
    let engine = &app.settings.engine;
    let filter = if only_flat {
        CoinFilter::flat(engine.screen_limit)
    } else {
        CoinFilter::tradable(engine.screen_limit)
    };
    let options = ScreenOptions::from_settings(engine).with_percentile(percentile);
    let delay = Duration::from_secs(engine.screen_delay_secs);

    let screener = CoinScreener::new(&app.exchange, &app.store, &app.clock);
    screener.screen_batch(filter, &options, delay).await?;
    Ok(())
}

async fn cmd_check_coin(app: &App, symbol: &str, percentile: Option<u32>) -> palisade::Result<()> {
    let coin = app
        .store
        .coin(symbol)
        .await?
        .ok_or_else(|| Error::UnknownCoin(symbol.to_string()))?;

    let options = ScreenOptions::from_settings(&app.settings.engine)
        .forced()
        .with_percentile(percentile);
    let screener = CoinScreener::new(&app.exchange, &app.store, &app.clock);

    match screener.check_and_update(&coin, &options).await? {
        ScreenOutcome::Checked(a) => {
            tracing::info!("=== {} ===", symbol);
            tracing::info!("  Flat: {}", a.is_flat);
            tracing::info!("  Support: {}", a.support);
            tracing::info!("  Resistance: {}", a.resistance);
            tracing::info!("  Range: {} ({}%)", a.range_abs, a.range_percent.round_dp(2));
            tracing::info!("  Avg price: {}", a.avg_price);
            tracing::info!("  Volatility: {}%", a.volatility_percent.round_dp(2));
            tracing::info!("  Max drawdown: {}%", a.max_drawdown_percent.round_dp(2));
            tracing::info!("  Max rise: {}%", a.max_rise_percent.round_dp(2));
        }
        ScreenOutcome::Skipped(reason) => tracing::info!("{} skipped: {}", symbol, reason),
    }
    Ok(())
}

async fn cmd_enter(app: &App, multi: bool) -> palisade::Result<()> {
    let engine = &app.settings.engine;
    let mode = if multi { EntryMode::Multi } else { EntryMode::Single };

    let planner = EntryPlanner::new(&app.exchange, &app.store, &app.notifier, &app.clock, engine);
    let placed = planner
        .try_enter(mode, mode.max_open_orders(engine), engine.per_order_notional)
        .await?;

    tracing::info!("✅ Entry pass placed {} orders", placed.len());
    Ok(())
}

async fn cmd_reconcile(app: &App) -> palisade::Result<()> {
    let reconciler = Reconciler::new(
        &app.exchange,
        &app.store,
        &app.notifier,
        &app.clock,
        &app.settings.engine,
    );
    let report = reconciler.run().await?;

    let changed = report
        .transitions
        .iter()
        .filter(|(_, t)| *t != Transition::Waiting)
        .count();
    tracing::info!(
        "✅ Reconciled {} trades, {} changed",
        report.transitions.len(),
        changed
    );
    Ok(())
}

async fn cmd_run(app: &App, multi: bool) -> palisade::Result<()> {
    cmd_reconcile(app).await?;
    cmd_enter(app, multi).await
}
