use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futuresbot::api::{BinanceFuturesClient, Credentials};
use futuresbot::config::{BotConfig, DEFAULT_CONFIG_PATH};
use futuresbot::error::StartupError;
use futuresbot::execution::position_quantity;
use futuresbot::persistence::PnlLog;
use futuresbot::pnl::PnlReporter;
use futuresbot::scheduler::{
    closed_candles, load_instruments, SchedulerSettings, TokioClock, TradeCycleScheduler,
};
use futuresbot::strategy::{IndicatorSnapshot, MeanReversionStrategy, Strategy};
use futuresbot::venue::{DryRunGateway, MarketDataProvider, VenueGateway};
use futuresbot::Instrument;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

#[derive(Parser)]
#[command(
    name = "futuresbot",
    about = "Mean-reversion trading bot for Binance USDⓈ-M futures"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop.
    Run {
        /// Path to a TOML config file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Stop after this many cycles (runs until Ctrl+C otherwise).
        #[arg(long)]
        cycles: Option<u64>,

        /// Read venue state but only log orders instead of sending them.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Validate the configuration and load instrument precisions.
    Check {
        /// Path to a TOML config file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Print the indicator snapshot and entry signal for one symbol.
    Signal {
        /// Symbol to evaluate (e.g. BTCUSDT).
        symbol: String,

        /// Path to a TOML config file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            cycles,
            dry_run,
        } => run_bot(&config, cycles, dry_run).await,
        Commands::Check { config } => run_check(&config).await,
        Commands::Signal { symbol, config } => run_signal(&symbol.to_uppercase(), &config).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("futuresbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_bot(config_path: &Path, cycles: Option<u64>, dry_run: bool) -> Result<()> {
    let config = BotConfig::load(config_path)?;
    let credentials = Credentials::from_env()?;

    tracing::info!("🚀 futuresbot starting");
    tracing::info!("🔐 API key: {}", credentials.masked_key());
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Venue: {}", config.base_url);
    tracing::info!("  Instruments: {}", config.symbols.len());
    tracing::info!("  Interval: {} ({} candles)", config.interval, config.candle_limit);
    tracing::info!("  Order notional: {} USDT", config.order_notional);
    tracing::info!(
        "  Stop loss: {}% | Take profit: {}%",
        config.protection.stop_loss_pct * rust_decimal::Decimal::ONE_HUNDRED,
        config.protection.take_profit_pct * rust_decimal::Decimal::ONE_HUNDRED
    );
    if dry_run {
        tracing::warn!("🧪 Dry run: orders are logged, not sent");
    }

    let client = BinanceFuturesClient::new(&config, Some(credentials)).context("Failed to build HTTP client")?;

    let instruments = load_instruments(
        &client,
        &config.symbols,
        config.default_quantity_precision,
        config.price_precision,
    )
    .await?;

    let log = PnlLog::open(&config.pnl_log_path).map_err(StartupError::from)?;
    tracing::info!("📝 PnL log: {}", log.path().display());
    let pnl = PnlReporter::new(client.clone(), log, config.pnl_window(), config.pnl_dedupe)
        .map_err(StartupError::from)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("\n⚠️  Received Ctrl+C, finishing current step...");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!("\nPress Ctrl+C to stop...\n");

    let completed = if dry_run {
        let gateway = DryRunGateway::new(client.clone());
        trade_loop(gateway, client, &config, instruments, pnl, cycles, shutdown_rx).await
    } else {
        trade_loop(client.clone(), client, &config, instruments, pnl, cycles, shutdown_rx).await
    };

    tracing::info!("👋 Stopped after {} cycle(s)", completed);
    Ok(())
}

async fn trade_loop<G: VenueGateway>(
    gateway: G,
    client: BinanceFuturesClient,
    config: &BotConfig,
    instruments: Vec<Instrument>,
    pnl: PnlReporter<BinanceFuturesClient>,
    cycles: Option<u64>,
    shutdown: watch::Receiver<bool>,
) -> u64 {
    let strategy = MeanReversionStrategy::new(config.strategy.clone(), config.protection.clone());
    tracing::info!("📈 Strategy: {}", strategy.name());

    let mut scheduler = TradeCycleScheduler::new(
        SchedulerSettings::from(config),
        instruments,
        gateway,
        client,
        strategy,
        pnl,
        TokioClock,
    );

    for instrument in scheduler.instruments() {
        tracing::debug!(
            "  {} | qty {} dp | price {} dp",
            instrument.symbol,
            instrument.quantity_precision,
            instrument.price_precision
        );
    }

    scheduler.run(cycles, shutdown).await
}

async fn run_check(config_path: &Path) -> Result<()> {
    let config = BotConfig::load(config_path)?;
    let client = BinanceFuturesClient::new(&config, None).context("Failed to build HTTP client")?;

    let instruments = load_instruments(
        &client,
        &config.symbols,
        config.default_quantity_precision,
        config.price_precision,
    )
    .await?;

    println!("Configuration OK ({})", config.base_url);
    println!("{:<12} {:>8} {:>8}", "SYMBOL", "QTY DP", "PRICE DP");
    for instrument in &instruments {
        println!(
            "{:<12} {:>8} {:>8}",
            instrument.symbol, instrument.quantity_precision, instrument.price_precision
        );
    }
    if instruments.len() < config.symbols.len() {
        println!(
            "{} of {} configured symbols dropped (see log)",
            config.symbols.len() - instruments.len(),
            config.symbols.len()
        );
    }

    Ok(())
}

async fn run_signal(symbol: &str, config_path: &Path) -> Result<()> {
    let config = BotConfig::load(config_path)?;
    let client = BinanceFuturesClient::new(&config, None).context("Failed to build HTTP client")?;

    let instrument = load_instruments(
        &client,
        &[symbol.to_string()],
        config.default_quantity_precision,
        config.price_precision,
    )
    .await?
    .remove(0);

    let candles = client
        .candles(symbol, &config.interval, config.candle_limit)
        .await
        .with_context(|| format!("Failed to fetch candles for {}", symbol))?;
    let candles = closed_candles(candles, chrono::Utc::now());

    let strategy = MeanReversionStrategy::new(config.strategy.clone(), config.protection.clone());

    println!("{} | {} closed {} candles", symbol, candles.len(), config.interval);
    match IndicatorSnapshot::from_candles(&candles, strategy.config()) {
        Some(s) => {
            println!("  close      {:.4}", s.close);
            println!("  range      {:.4} .. {:.4}", s.range_low, s.range_high);
            println!("  RSI        {:.2}", s.rsi);
            println!("  EMA fast   {:.4}", s.ema_fast);
            println!("  EMA slow   {:.4}", s.ema_slow);
            println!("  ADX        {:.2}", s.adx);
        }
        None => println!(
            "  not enough history (need {} candles)",
            strategy.min_candles_required()
        ),
    }

    let signal = strategy.evaluate(&instrument, &candles);
    if signal.is_actionable() {
        let quantity = position_quantity(
            config.order_notional,
            signal.entry_price,
            instrument.quantity_precision,
        );
        println!(
            "Signal: {:?} @ {} | qty {} | TP {} | SL {}",
            signal.direction, signal.entry_price, quantity, signal.take_profit, signal.stop_loss
        );
    } else {
        println!("Signal: none");
    }

    Ok(())
}
