use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use scalpbot::classifier::GbdtFactory;
use scalpbot::execution::{Collaborators, LiveConfig, LiveEngine, MarketDataSource, PaperBroker};
use scalpbot::features::{FeatureConfig, LabelConfig};
use scalpbot::notify::Notifier;
use scalpbot::persistence::{TradeLog, TradeLogEntry};
use scalpbot::strategy::{Decision, SkipReason, StrategyParams};
use scalpbot::walk_forward::{WalkForward, WalkForwardConfig};
use scalpbot::{Candle, EngineResult, ExitReason, TradeSide};
use std::sync::{Arc, Mutex};

struct MemorySource {
    candles: Vec<Candle>,
    price: Mutex<f64>,
}

#[async_trait]
impl MarketDataSource for MemorySource {
    async fn fetch(&self, _: &str, lookback: usize, _: u32) -> EngineResult<Vec<Candle>> {
        let skip = self.candles.len().saturating_sub(lookback);
        Ok(self.candles[skip..].to_vec())
    }

    async fn current_price(&self, _: &str) -> EngineResult<f64> {
        Ok(*self.price.lock().unwrap())
    }
}

#[derive(Default)]
struct MemoryTradeLog {
    entries: Mutex<Vec<TradeLogEntry>>,
}

#[async_trait]
impl TradeLog for MemoryTradeLog {
    async fn append(&self, entry: &TradeLogEntry) -> EngineResult<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn last_unclosed(&self) -> EngineResult<(f64, u64)> {
        Ok(match self.entries.lock().unwrap().last() {
            Some(e) if e.side == TradeSide::Buy => (e.price, e.quantity),
            _ => (0.0, 0),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> EngineResult<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

fn kst(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap() - Duration::hours(9)
}

fn candle(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume: 1_000.0,
    }
}

/// Monday session aggregating to O100 H110 L95 C105, then Tuesday's opening bar at 100
fn create_test_candles() -> Vec<Candle> {
    vec![
        candle(kst(4, 9, 0), 100.0, 110.0, 99.0, 108.0),
        candle(kst(4, 9, 5), 108.0, 108.0, 95.0, 100.0),
        candle(kst(4, 9, 10), 100.0, 104.0, 100.0, 105.0),
        candle(kst(5, 9, 0), 100.0, 101.0, 99.0, 100.0),
    ]
}

struct Harness {
    engine: LiveEngine<GbdtFactory>,
    source: Arc<MemorySource>,
    log: Arc<MemoryTradeLog>,
    notifier: Arc<RecordingNotifier>,
    target: f64,
}

fn harness() -> Harness {
    let strategy = StrategyParams::volatility_breakout();
    let previous = candle(kst(4, 9, 0), 100.0, 110.0, 95.0, 105.0);
    let target = strategy
        .breakout
        .as_ref()
        .map(|b| b.target(100.0, &previous))
        .unwrap();

    let source = Arc::new(MemorySource {
        candles: create_test_candles(),
        price: Mutex::new(100.0),
    });
    let log = Arc::new(MemoryTradeLog::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let io = Collaborators {
        market: source.clone(),
        executor: Arc::new(PaperBroker::new(10_000_000.0, strategy.fees)),
        trade_log: log.clone(),
        notifier: notifier.clone(),
    };
    let config = LiveConfig {
        strategy,
        ..LiveConfig::default()
    };
    let engine = LiveEngine::new(
        config,
        FeatureConfig::intraday(),
        LabelConfig::intraday(),
        WalkForward::new(WalkForwardConfig::intraday(), GbdtFactory::default()),
        io,
    )
    .unwrap();

    Harness {
        engine,
        source,
        log,
        notifier,
        target,
    }
}

#[tokio::test]
async fn test_breakout_session_round_trip() {
    let mut h = harness();
    h.engine.bootstrap().await.unwrap();

    // Below target: wait
    assert_eq!(h.engine.on_price_tick(kst(5, 9, 10)).await.unwrap(), Decision::Hold);
    assert_eq!(h.engine.machine().session_target(), Some(h.target));

    *h.source.price.lock().unwrap() = h.target * 1.002;
    let decision = h.engine.on_price_tick(kst(5, 9, 11)).await.unwrap();
    assert!(matches!(decision, Decision::Buy { .. }));

    let decision = h.engine.on_price_tick(kst(5, 15, 15)).await.unwrap();
    assert!(matches!(
        decision,
        Decision::Sell {
            reason: ExitReason::ForcedLiquidation,
            ..
        }
    ));

    // Once per session: no re-entry even back above target
    assert_eq!(h.engine.on_price_tick(kst(5, 15, 16)).await.unwrap(), Decision::Hold);

    let entries = h.log.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].side, TradeSide::Buy);
    assert_eq!(entries[0].reason, "breakout");
    assert_eq!(entries[1].reason, "forced-liquidation");
    assert!(entries[1].net_return_pct.is_some());

    let messages = h.notifier.messages.lock().unwrap().clone();
    assert!(messages.iter().any(|m| m.contains("BUY")));
    assert!(messages.iter().any(|m| m.contains("forced-liquidation")));
}

#[tokio::test]
async fn test_session_summary_sent_once() {
    let mut h = harness();
    h.engine.bootstrap().await.unwrap();

    *h.source.price.lock().unwrap() = h.target * 1.002;
    h.engine.on_price_tick(kst(5, 9, 11)).await.unwrap();
    h.engine.on_price_tick(kst(5, 15, 15)).await.unwrap();

    // Closed market, then the next morning's first tick
    assert_eq!(h.engine.on_price_tick(kst(5, 16, 0)).await.unwrap(), Decision::Hold);
    assert_eq!(h.engine.on_price_tick(kst(5, 16, 5)).await.unwrap(), Decision::Hold);
    h.engine.on_price_tick(kst(6, 9, 5)).await.unwrap();

    let summaries = h
        .notifier
        .messages
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m.contains("Session summary"))
        .count();
    assert_eq!(summaries, 1);
}

#[tokio::test]
async fn test_breakout_slippage_abandons_session() {
    let mut h = harness();
    h.engine.bootstrap().await.unwrap();

    *h.source.price.lock().unwrap() = h.target * 1.05;
    assert_eq!(
        h.engine.on_price_tick(kst(5, 9, 10)).await.unwrap(),
        Decision::Skip(SkipReason::SlippageExceeded)
    );

    *h.source.price.lock().unwrap() = h.target * 1.001;
    assert_eq!(h.engine.on_price_tick(kst(5, 9, 11)).await.unwrap(), Decision::Hold);
    assert!(h.log.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_resumes_open_position() {
    let mut h = harness();
    h.log
        .append(&TradeLogEntry {
            timestamp: kst(5, 9, 30),
            side: TradeSide::Buy,
            price: 109.0,
            quantity: 3,
            net_return_pct: None,
            reason: "breakout".to_string(),
        })
        .await
        .unwrap();

    h.engine.bootstrap().await.unwrap();
    let holding = h.engine.machine().holding().cloned().unwrap();
    assert_eq!(holding.entry_price, 109.0);
    assert_eq!(holding.quantity, 3);
    assert!(h
        .notifier
        .messages
        .lock()
        .unwrap()
        .iter()
        .any(|m| m.contains("resumed")));
}
