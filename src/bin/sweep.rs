use anyhow::{bail, Context, Result};
use clap::Parser;
use scalpbot::backtest::{run_sweep, BacktestRunner, MarketScenario, SweepGrid, SyntheticDataGenerator};
use scalpbot::classifier::GbdtFactory;
use scalpbot::config::AppConfig;
use scalpbot::execution::load_candles;
use scalpbot::features::build_feature_table;
use scalpbot::strategy::StrategyParams;
use scalpbot::walk_forward::WalkForward;
use std::path::PathBuf;

/// Grid search over buy threshold, take profit and stop loss
#[derive(Parser, Debug)]
#[command(name = "sweep", about)]
struct Args {
    /// Candle CSV; synthetic 5-minute sessions when omitted
    #[arg(long)]
    candles: Option<PathBuf>,

    #[arg(long, default_value = "volatile")]
    scenario: String,

    #[arg(long, default_value_t = 60)]
    sessions: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Preset providing every parameter outside the grid
    #[arg(short, long, default_value = "ai-scalper")]
    strategy: String,

    #[arg(long, value_delimiter = ',')]
    buy: Option<Vec<f64>>,

    #[arg(long, value_delimiter = ',')]
    tp: Option<Vec<f64>>,

    /// Negative returns, e.g. --sl=-0.008,-0.012
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    sl: Option<Vec<f64>>,

    /// Rows printed from the top of the ranking
    #[arg(long, default_value_t = 10)]
    top: usize,

    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("scalpbot=info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    let base = StrategyParams::preset(&args.strategy)?;

    let mut grid = SweepGrid::default();
    if let Some(buy) = args.buy {
        grid.buy_thresholds = buy;
    }
    if let Some(tp) = args.tp {
        grid.take_profits = tp;
    }
    if let Some(sl) = args.sl {
        grid.stop_losses = sl;
    }
    if grid.is_empty() {
        bail!("sweep grid is empty");
    }

    let candles = match &args.candles {
        Some(path) => load_candles(path)
            .with_context(|| format!("loading candles from {}", path.display()))?,
        None => {
            let scenario = MarketScenario::parse(&args.scenario)
                .with_context(|| format!("unknown scenario '{}'", args.scenario))?;
            SyntheticDataGenerator::new(args.seed).generate_sessions(scenario, args.sessions, 76, 5)
        }
    };

    let table = build_feature_table(&candles, &config.features, &config.labels)?;
    let trainer = WalkForward::new(config.walk_forward, GbdtFactory::new(config.model.clone()));
    let report = trainer.run(&table)?;

    let runner = BacktestRunner::new(config.initial_cash, config.live.clock.utc_offset_secs);
    let results = run_sweep(&runner, &base, &grid, &table, &report)?;

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              PARAMETER SWEEP ({:>3} cells)              ║", grid.len());
    println!("╚═══════════════════════════════════════════════════════╝\n");
    println!(
        "{:>6} {:>7} {:>8} {:>10} {:>8} {:>8} {:>8}",
        "Buy", "TP", "SL", "Return%", "Trades", "Win%", "PF"
    );
    println!("{}", "─".repeat(62));
    for result in results.iter().take(args.top) {
        let m = &result.metrics;
        println!(
            "{:>6.2} {:>7.3} {:>8.3} {:>10.2} {:>8} {:>8.1} {:>8.2}",
            result.buy_threshold,
            result.take_profit,
            result.stop_loss,
            m.total_return_pct,
            m.total_trades,
            m.win_rate,
            m.profit_factor
        );
    }
    println!();

    Ok(())
}
