use clap::Parser;
use scalpbot::classifier::GbdtFactory;
use scalpbot::config::AppConfig;
use scalpbot::execution::{Collaborators, CsvCandleSource, LiveEngine, PaperBroker};
use scalpbot::notify::{LogNotifier, Notifier, TelegramNotifier};
use scalpbot::persistence::{CsvTradeLog, TradeLog};
use scalpbot::strategy::StrategyParams;
use scalpbot::walk_forward::WalkForward;
use scalpbot::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Paper-trading loop: candles from a CSV that an external recorder appends to
#[derive(Parser, Debug)]
#[command(name = "scalpbot", version, about)]
struct Args {
    /// TOML config file (optional; SCALPBOT__* variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base configuration under the file: intraday, daily or daily-live
    #[arg(short, long, default_value = "intraday")]
    profile: String,

    /// Strategy preset overriding the configured one
    #[arg(short, long)]
    strategy: Option<String>,

    /// Candle CSV overriding the configured path
    #[arg(long)]
    candles: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let base = AppConfig::profile(&args.profile)?;
    let mut config = AppConfig::load_over(&base, args.config.as_deref())?;
    if let Some(name) = &args.strategy {
        config.live.strategy = StrategyParams::preset(name)?;
    }
    if let Some(path) = args.candles {
        config.candle_path = path;
    }

    tracing::info!("🚀 ScalpBot starting (paper)");
    tracing::info!("📊 Configuration:");
    tracing::info!("  Profile: {}", args.profile);
    tracing::info!("  Instrument: {}", config.live.instrument);
    tracing::info!("  Strategy: {}", config.live.strategy.name);
    tracing::info!("  Candles: {}", config.candle_path.display());
    tracing::info!("  Trade log: {}", config.trade_log_path.display());
    tracing::info!(
        "  Cadence: price {}s, refresh {}s",
        config.live.price_check_secs,
        config.live.refresh_secs
    );

    let trade_log = Arc::new(CsvTradeLog::new(&config.trade_log_path));
    let (_, held) = trade_log.last_unclosed().await?;
    let broker = PaperBroker::new(config.initial_cash, config.live.strategy.fees).with_position(held);

    let notifier: Arc<dyn Notifier> = match TelegramNotifier::from_env() {
        Some(telegram) => {
            tracing::info!("📣 Telegram notifications enabled");
            Arc::new(telegram?)
        }
        None => {
            tracing::warn!("TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID not set, logging notifications only");
            Arc::new(LogNotifier)
        }
    };

    let io = Collaborators {
        market: Arc::new(CsvCandleSource::new(
            &config.candle_path,
            config.live.interval_minutes,
        )),
        executor: Arc::new(broker),
        trade_log,
        notifier,
    };

    let trainer = WalkForward::new(config.walk_forward, GbdtFactory::new(config.model.clone()));
    let mut engine = LiveEngine::new(
        config.live.clone(),
        config.features.clone(),
        config.labels,
        trainer,
        io,
    )?;

    engine.run().await?;

    tracing::info!("👋 ScalpBot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scalpbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
