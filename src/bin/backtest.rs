use clap::Parser;
use scalpbot::backtest::{BacktestMetrics, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use scalpbot::classifier::GbdtFactory;
use scalpbot::config::AppConfig;
use scalpbot::execution::load_candles;
use scalpbot::features::build_feature_table;
use scalpbot::strategy::StrategyParams;
use scalpbot::walk_forward::WalkForward;
use scalpbot::Result;
use std::path::PathBuf;

/// Walk-forward backtest of one or more strategy presets
#[derive(Parser, Debug)]
#[command(name = "backtest", about)]
struct Args {
    /// Candle CSV; synthetic data is generated when omitted
    #[arg(long)]
    candles: Option<PathBuf>,

    /// Synthetic scenario: uptrend, downtrend, sideways, volatile, momentum, gaps
    #[arg(long, default_value = "volatile")]
    scenario: String,

    /// Synthetic sessions to generate
    #[arg(long, default_value_t = 60)]
    sessions: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Strategy presets to compare (repeatable)
    #[arg(short, long = "strategy", default_values_t = ["ai-scalper".to_string(), "combined".to_string(), "volatility-breakout".to_string()])]
    strategies: Vec<String>,

    /// Daily bars and the daily feature/label/model presets
    #[arg(long)]
    daily: bool,

    /// Optional TOML config layered over the intraday or daily presets
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write all metrics as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Fit on the full history and save the model as JSON
    #[arg(long)]
    save_model: Option<PathBuf>,
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
    let base = if args.daily {
        AppConfig::daily()
    } else {
        AppConfig::intraday()
    };
    let config = AppConfig::load_over(&base, args.config.as_deref())?;

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║          SCALPBOT WALK-FORWARD BACKTEST               ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let candles = match &args.candles {
        Some(path) => {
            println!("📂 Loading candles from {}", path.display());
            load_candles(path)?
        }
        None => {
            let scenario = MarketScenario::parse(&args.scenario)
                .ok_or_else(|| format!("unknown scenario '{}'", args.scenario))?;
            println!("🧪 Generating {:?} data, {} sessions", scenario, args.sessions);
            let mut generator = SyntheticDataGenerator::new(args.seed);
            if args.daily {
                generator.generate(scenario, args.sessions, 24 * 60)
            } else {
                // 09:00-15:20 in 5-minute bars
                generator.generate_sessions(scenario, args.sessions, 76, 5)
            }
        }
    };
    println!("   {} candles", candles.len());

    let table = build_feature_table(&candles, &config.features, &config.labels)?;
    let trainer = WalkForward::new(config.walk_forward, GbdtFactory::new(config.model.clone()));
    let report = trainer.run(&table)?;

    let runner = BacktestRunner::new(config.initial_cash, config.live.clock.utc_offset_secs);
    let mut results: Vec<BacktestMetrics> = Vec::new();
    for name in &args.strategies {
        let params = StrategyParams::preset(name)?;
        match runner.run_and_report(&params, &table, &report) {
            Ok(metrics) => results.push(metrics),
            Err(e) => eprintln!("❌ Backtest failed for {}: {}", name, e),
        }
    }

    print_summary_comparison(&results);

    if let Some(path) = &args.save_model {
        let latest = trainer.fit_latest(&table)?;
        latest.model.save(path)?;
        println!(
            "🧠 Model saved to {} (next-bar up-probability {:.1}%)",
            path.display(),
            latest.probability * 100.0
        );
    }

    if let Some(path) = &args.json {
        std::fs::write(path, serde_json::to_string_pretty(&results)?)?;
        println!("💾 Metrics written to {}", path.display());
    }

    Ok(())
}

fn print_summary_comparison(results: &[BacktestMetrics]) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              STRATEGY COMPARISON                      ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<24} {:>10} {:>10} {:>8} {:>8} {:>10}",
        "Strategy", "Return%", "B&H%", "Trades", "Win%", "MaxDD%"
    );
    println!("{}", "─".repeat(74));

    for metrics in results {
        println!(
            "{:<24} {:>10.2} {:>10.2} {:>8} {:>8.1} {:>10.2}",
            metrics.strategy,
            metrics.total_return_pct,
            metrics.buy_and_hold_pct,
            metrics.total_trades,
            metrics.win_rate,
            metrics.max_drawdown_pct
        );
    }
    println!();
}
