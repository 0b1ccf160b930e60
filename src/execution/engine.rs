//! Live trading loop
//!
//! Two cadences share one position machine: a fast price check that runs the
//! exit and entry rules, and a slower refresh that pulls candles and updates
//! the up-probability. Between refreshes the price check reuses the last
//! probability, so a signal can be up to one refresh interval old.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::candle_buffer::CandleBuffer;
use super::clock::SessionClock;
use super::paper::OrderExecutor;
use super::source::MarketDataSource;
use crate::classifier::{Classifier, ClassifierFactory};
use crate::error::{EngineError, EngineResult};
use crate::features::{build_feature_table, FeatureConfig, LabelConfig};
use crate::models::{offset_from_secs, Candle, ExitReason, Trade, TradeSide};
use crate::notify::{notify, Notifier};
use crate::persistence::{TradeLog, TradeLogEntry};
use crate::strategy::{session_bars, Decision, PositionMachine, StrategyParams, Tick};
use crate::walk_forward::WalkForward;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LiveConfig {
    pub instrument: String,
    pub interval_minutes: u32,
    /// Candles fetched at startup and kept in the rolling buffer
    pub history_candles: usize,
    pub price_check_secs: u64,
    pub refresh_secs: u64,
    pub strategy: StrategyParams,
    pub clock: SessionClock,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            instrument: "005930".to_string(),
            interval_minutes: 5,
            history_candles: 600,
            price_check_secs: 60,
            refresh_secs: 300,
            strategy: StrategyParams::ai_scalper_live(),
            clock: SessionClock::krx(),
        }
    }
}

/// Everything the engine talks to outside the process
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketDataSource>,
    pub executor: Arc<dyn OrderExecutor>,
    pub trade_log: Arc<dyn TradeLog>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct LiveEngine<F: ClassifierFactory> {
    config: LiveConfig,
    features: FeatureConfig,
    labels: LabelConfig,
    trainer: WalkForward<F>,
    io: Collaborators,
    machine: PositionMachine,
    buffer: CandleBuffer,
    model: Option<F::Model>,
    last_fit: Option<DateTime<Utc>>,
    probability: Option<f64>,
    probability_at: Option<DateTime<Utc>>,
    session: Option<NaiveDate>,
    /// Summary already sent for `session`
    session_closed: bool,
    session_trades: Vec<Trade>,
}

impl<F: ClassifierFactory> LiveEngine<F> {
    pub fn new(
        config: LiveConfig,
        features: FeatureConfig,
        labels: LabelConfig,
        trainer: WalkForward<F>,
        io: Collaborators,
    ) -> EngineResult<Self> {
        config.strategy.validate()?;
        features.validate()?;
        labels.validate()?;
        if config.price_check_secs == 0 || config.refresh_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "price check and refresh intervals must be positive".to_string(),
            ));
        }

        let machine = PositionMachine::new(config.strategy.clone());
        let buffer = CandleBuffer::new(config.history_candles);
        Ok(Self {
            config,
            features,
            labels,
            trainer,
            io,
            machine,
            buffer,
            model: None,
            last_fit: None,
            probability: None,
            probability_at: None,
            session: None,
            session_closed: false,
            session_trades: Vec::new(),
        })
    }

    pub fn machine(&self) -> &PositionMachine {
        &self.machine
    }

    pub fn probability(&self) -> Option<f64> {
        self.probability
    }

    pub fn buffer(&self) -> &CandleBuffer {
        &self.buffer
    }

    fn name(&self) -> &str {
        &self.config.strategy.name
    }

    /// Whether any rule reads the classifier output
    fn uses_signal(&self) -> bool {
        self.config.strategy.buy_threshold.is_some() || self.config.strategy.reversal.is_some()
    }

    /// Load history and resume an open position recorded in the trade log
    pub async fn bootstrap(&mut self) -> EngineResult<()> {
        let history = self
            .io
            .market
            .fetch(
                &self.config.instrument,
                self.config.history_candles,
                self.config.interval_minutes,
            )
            .await?;
        self.buffer.merge(history);

        let (entry_price, quantity) = self.io.trade_log.last_unclosed().await?;
        let restored = self.machine.restore(entry_price, quantity);

        tracing::info!(
            strategy = %self.name(),
            instrument = %self.config.instrument,
            candles = self.buffer.len(),
            restored,
            "🚀 Live engine started"
        );

        let body = if restored {
            format!(
                "{} resumed holding {} @ {:.2}",
                self.config.instrument, quantity, entry_price
            )
        } else {
            format!("{} started flat", self.config.instrument)
        };
        notify(self.io.notifier.as_ref(), self.name(), "Started", &body).await;
        Ok(())
    }

    /// Pull fresh candles and update the probability
    ///
    /// Any failure keeps the previous probability; the price check carries on
    /// with it and warns once it is older than a refresh interval.
    pub async fn refresh_signal(&mut self, now: DateTime<Utc>) {
        if let Err(e) = self
            .io
            .market
            .refresh(
                &mut self.buffer,
                &self.config.instrument,
                self.config.interval_minutes,
            )
            .await
        {
            tracing::warn!(error = %e, "⚠️ Candle refresh failed, keeping last signal");
            return;
        }

        if !self.uses_signal() {
            return;
        }

        match self.predict(now) {
            Ok(probability) => {
                self.probability = Some(probability);
                self.probability_at = Some(now);
                tracing::info!(
                    strategy = %self.name(),
                    probability_pct = probability * 100.0,
                    "🤖 Signal updated"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    last = self.probability,
                    "⚠️ Signal stale, keeping last probability"
                );
            }
        }
    }

    fn predict(&mut self, now: DateTime<Utc>) -> EngineResult<f64> {
        let candles = self.buffer.candles();
        let table = build_feature_table(&candles, &self.features, &self.labels)?;

        let cadence = self.trainer.config().cadence;
        if self.model.is_none() || cadence.should_retrain(self.last_fit, now) {
            let fit = self.trainer.fit_latest(&table)?;
            tracing::info!(
                window = fit.training_rows,
                scale_pos_weight = fit.scale_pos_weight,
                "🔁 Model retrained"
            );
            self.model = Some(fit.model);
            self.last_fit = Some(now);
            return Ok(fit.probability);
        }

        let (Some(model), Some(last)) = (self.model.as_ref(), table.rows.last()) else {
            return Err(EngineError::Model("no model or feature row available".to_string()));
        };
        let probability = model.predict_proba(&last.values)?;
        tracing::debug!(timestamp = %last.timestamp, probability, "Prediction");
        Ok(probability)
    }

    fn breakout_target(&self, date: NaiveDate) -> Option<f64> {
        let offset = offset_from_secs(self.config.clock.utc_offset_secs);
        let candles: Vec<Candle> = self.buffer.candles();
        let bars = session_bars(&candles, offset);
        let today = bars.iter().position(|bar| bar.session_date(offset) == date)?;
        let previous = today.checked_sub(1).map(|i| &bars[i]);
        self.machine.breakout_target(bars[today].open, previous)
    }

    /// One fast-cadence evaluation
    ///
    /// Returns the decision that was executed. An order rejected by the
    /// executor surfaces as `ExecutionFailure` and leaves the position as it was.
    pub async fn on_price_tick(&mut self, now: DateTime<Utc>) -> EngineResult<Decision> {
        let clock = self.config.clock;
        if !clock.is_open(now) {
            if self.session.is_some() && !self.session_closed {
                self.end_session().await;
                tracing::info!(
                    next_open_in_min = clock.until_open(now).num_minutes(),
                    "💤 Market closed"
                );
            }
            return Ok(Decision::Hold);
        }

        let date = clock.session_date(now);
        if self.session != Some(date) {
            if self.session.is_some() {
                self.end_session().await;
            }
            let target = self.breakout_target(date);
            self.machine.start_session(target);
            self.session = Some(date);
            self.session_closed = false;
            tracing::info!(%date, target, "🌅 Session started");
        } else if self.config.strategy.breakout.is_some() && self.machine.session_target().is_none() {
            let target = self.breakout_target(date);
            self.machine.set_session_target(target);
        }

        let price = self
            .io
            .market
            .current_price(&self.config.instrument)
            .await?;

        if clock.should_liquidate(now) {
            let decision = match self.machine.on_session_end(price) {
                Decision::Hold if self.machine.is_holding() => self.machine.on_tick(&Tick {
                    price,
                    probability: self.probability,
                    timestamp: now,
                    available_cash: 0.0,
                }),
                decision => decision,
            };
            return self.execute(decision, now).await;
        }

        if self.uses_signal() {
            let max_age = chrono::Duration::seconds(
                (self.config.refresh_secs + self.config.price_check_secs) as i64,
            );
            if self
                .probability_at
                .is_some_and(|at| now - at > max_age)
            {
                tracing::warn!(
                    age_secs = self.probability_at.map(|at| (now - at).num_seconds()),
                    "⚠️ Signal older than one refresh interval"
                );
            }
        }

        let available_cash = self.io.executor.available_cash().await?;
        let decision = self.machine.on_tick(&Tick {
            price,
            probability: self.probability,
            timestamp: now,
            available_cash,
        });
        self.execute(decision, now).await
    }

    async fn execute(&mut self, decision: Decision, now: DateTime<Utc>) -> EngineResult<Decision> {
        match decision {
            Decision::Buy { quantity, price } => {
                let fill = match self
                    .io
                    .executor
                    .submit_buy(&self.config.instrument, quantity, price)
                    .await
                {
                    Ok(fill) => fill,
                    Err(e) => return Err(self.report_failure(TradeSide::Buy, e).await),
                };
                self.machine.commit_entry(fill)?;

                self.log_trade(TradeLogEntry {
                    timestamp: fill.timestamp,
                    side: TradeSide::Buy,
                    price: fill.price,
                    quantity: fill.quantity,
                    net_return_pct: None,
                    reason: match self.probability {
                        Some(p) => format!("signal {:.1}%", p * 100.0),
                        None => "breakout".to_string(),
                    },
                })
                .await;

                let body = format!(
                    "{} BUY {} @ {:.2}",
                    self.config.instrument, fill.quantity, fill.price
                );
                notify(self.io.notifier.as_ref(), self.name(), "Buy", &body).await;
            }
            Decision::Sell {
                reason,
                quantity,
                price,
            } => {
                let fill = match self
                    .io
                    .executor
                    .submit_sell(&self.config.instrument, quantity, price)
                    .await
                {
                    Ok(fill) => fill,
                    Err(e) => return Err(self.report_failure(TradeSide::Sell, e).await),
                };
                let trade = self.machine.commit_exit(reason, fill.price, fill.timestamp)?;
                self.record_exit(&trade, reason).await;
            }
            Decision::Hold | Decision::Skip(_) => {
                tracing::debug!(?decision, %now, "No order");
            }
        }
        Ok(decision)
    }

    async fn record_exit(&mut self, trade: &Trade, reason: ExitReason) {
        let net = self.machine.net_return(trade.entry_price, trade.exit_price);
        self.log_trade(TradeLogEntry {
            timestamp: trade.exit_time.unwrap_or_else(Utc::now),
            side: TradeSide::Sell,
            price: trade.exit_price,
            quantity: trade.quantity,
            net_return_pct: Some(net * 100.0),
            reason: reason.to_string(),
        })
        .await;

        let body = format!(
            "{} SELL {} @ {:.2}\nreason: {}\nnet: {:+.2}%",
            self.config.instrument,
            trade.quantity,
            trade.exit_price,
            reason,
            net * 100.0
        );
        notify(self.io.notifier.as_ref(), self.name(), "Sell", &body).await;
        self.session_trades.push(trade.clone());
    }

    async fn log_trade(&self, entry: TradeLogEntry) {
        if let Err(e) = self.io.trade_log.append(&entry).await {
            tracing::error!(error = %e, side = %entry.side, "❌ Failed to append trade log");
        }
    }

    async fn report_failure(&self, side: TradeSide, error: EngineError) -> EngineError {
        tracing::error!(error = %error, %side, instrument = %self.config.instrument, "❌ Order failed");
        let body = format!("{} {} failed: {}", self.config.instrument, side, error);
        notify(self.io.notifier.as_ref(), self.name(), "Order failed", &body).await;
        error
    }

    /// Summarise the finished session and clear its trade list
    ///
    /// A no-op once the current session has been summarised.
    pub async fn end_session(&mut self) {
        if self.session_closed {
            return;
        }
        self.session_closed = true;
        let trades = std::mem::take(&mut self.session_trades);
        let wins = trades.iter().filter(|t| t.is_win()).count();
        let net_pct: f64 = trades
            .iter()
            .map(|t| self.machine.net_return(t.entry_price, t.exit_price) * 100.0)
            .sum();

        tracing::info!(
            session = ?self.session,
            trades = trades.len(),
            wins,
            net_pct,
            "🌇 Session closed"
        );
        let body = format!(
            "trades: {}\nwins: {}\nnet: {:+.2}%",
            trades.len(),
            wins,
            net_pct
        );
        notify(self.io.notifier.as_ref(), self.name(), "Session summary", &body).await;
    }

    /// Run both cadences until Ctrl+C
    ///
    /// Shutdown is only observed between ticks, never halfway through an order.
    pub async fn run(&mut self) -> EngineResult<()> {
        self.bootstrap().await?;

        let mut price_timer =
            tokio::time::interval(Duration::from_secs(self.config.price_check_secs));
        let mut refresh_timer = tokio::time::interval(Duration::from_secs(self.config.refresh_secs));
        price_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        refresh_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("🛑 Shutdown requested");
                    break;
                }
                _ = refresh_timer.tick() => {
                    let now = Utc::now();
                    if self.config.clock.is_open(now) {
                        self.refresh_signal(now).await;
                    }
                }
                _ = price_timer.tick() => {
                    if let Err(e) = self.on_price_tick(Utc::now()).await {
                        tracing::error!(error = %e, "Price tick failed");
                    }
                }
            }
        }

        let state = if self.machine.is_holding() {
            "holding"
        } else {
            "flat"
        };
        notify(self.io.notifier.as_ref(), self.name(), "Stopped", state).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::PaperBroker;
    use crate::models::FeeSchedule;
    use crate::notify::LogNotifier;
    use crate::persistence::CsvTradeLog;
    use crate::walk_forward::WalkForwardConfig;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;

    struct ConstantModel(f64);

    impl Classifier for ConstantModel {
        fn fit(&mut self, _x: &[&[f64]], _y: &[bool]) -> EngineResult<()> {
            Ok(())
        }

        fn predict_proba(&self, _x: &[f64]) -> EngineResult<f64> {
            Ok(self.0)
        }
    }

    struct ConstantFactory(f64);

    impl ClassifierFactory for ConstantFactory {
        type Model = ConstantModel;

        fn create(&self, _scale_pos_weight: f64) -> ConstantModel {
            ConstantModel(self.0)
        }
    }

    struct StaticSource {
        candles: Vec<Candle>,
        price: Mutex<f64>,
    }

    #[async_trait]
    impl MarketDataSource for StaticSource {
        async fn fetch(&self, _: &str, lookback: usize, _: u32) -> EngineResult<Vec<Candle>> {
            let skip = self.candles.len().saturating_sub(lookback);
            Ok(self.candles[skip..].to_vec())
        }

        async fn current_price(&self, _: &str) -> EngineResult<f64> {
            Ok(*self.price.lock().unwrap())
        }
    }

    fn create_test_candles(n: usize) -> Vec<Candle> {
        // 5-minute bars ending just before 2024-03-04 10:00 KST
        let end = Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 2.0 + i as f64 * 0.01;
                Candle {
                    timestamp: end - ChronoDuration::minutes(5 * (n - i) as i64),
                    open: close - 0.2,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1000.0 + (i % 7) as f64 * 100.0,
                }
            })
            .collect()
    }

    fn engine_with(
        probability: f64,
        broker: Arc<PaperBroker>,
        log: Arc<CsvTradeLog>,
    ) -> (LiveEngine<ConstantFactory>, Arc<StaticSource>) {
        let source = Arc::new(StaticSource {
            candles: create_test_candles(300),
            price: Mutex::new(100.0),
        });
        let mut strategy = StrategyParams::ai_scalper_live();
        strategy.fees = FeeSchedule::zero();
        let config = LiveConfig {
            strategy,
            ..LiveConfig::default()
        };
        let io = Collaborators {
            market: source.clone(),
            executor: broker,
            trade_log: log,
            notifier: Arc::new(LogNotifier),
        };
        let engine = LiveEngine::new(
            config,
            FeatureConfig::intraday(),
            LabelConfig::intraday(),
            WalkForward::new(WalkForwardConfig::intraday(), ConstantFactory(probability)),
            io,
        )
        .unwrap();
        (engine, source)
    }

    fn at_kst(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap() - ChronoDuration::hours(9)
    }

    #[tokio::test]
    async fn test_buy_then_take_profit() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(CsvTradeLog::new(dir.path().join("trades.csv")));
        let broker = Arc::new(PaperBroker::new(1_000_000.0, FeeSchedule::zero()));
        let (mut engine, source) = engine_with(0.9, broker.clone(), log.clone());

        engine.bootstrap().await.unwrap();
        engine.refresh_signal(at_kst(10, 0)).await;
        assert_eq!(engine.probability(), Some(0.9));

        let decision = engine.on_price_tick(at_kst(10, 1)).await.unwrap();
        assert!(matches!(decision, Decision::Buy { .. }));
        assert!(engine.machine().is_holding());
        assert_eq!(log.last_unclosed().await.unwrap().0, 100.0);

        *source.price.lock().unwrap() = 101.5;
        let decision = engine.on_price_tick(at_kst(10, 2)).await.unwrap();
        assert!(matches!(
            decision,
            Decision::Sell {
                reason: ExitReason::TakeProfit,
                ..
            }
        ));
        assert!(!engine.machine().is_holding());
        assert_eq!(log.last_unclosed().await.unwrap(), (0.0, 0));
        assert_eq!(broker.holdings().await, 0);
    }

    #[tokio::test]
    async fn test_rejected_order_leaves_state() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(CsvTradeLog::new(dir.path().join("trades.csv")));
        let broker = Arc::new(PaperBroker::new(1_000_000.0, FeeSchedule::zero()));
        let (mut engine, _source) = engine_with(0.9, broker.clone(), log.clone());

        engine.bootstrap().await.unwrap();
        engine.refresh_signal(at_kst(10, 0)).await;
        broker.set_reject_orders(true);

        let err = engine.on_price_tick(at_kst(10, 1)).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutionFailure(_)));
        assert!(!engine.machine().is_holding());
        assert!(log.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_low_probability_holds_and_closed_market_idles() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(CsvTradeLog::new(dir.path().join("trades.csv")));
        let broker = Arc::new(PaperBroker::new(1_000_000.0, FeeSchedule::zero()));
        let (mut engine, _source) = engine_with(0.2, broker, log);

        engine.bootstrap().await.unwrap();
        engine.refresh_signal(at_kst(10, 0)).await;
        assert_eq!(engine.on_price_tick(at_kst(10, 1)).await.unwrap(), Decision::Hold);
        assert_eq!(engine.on_price_tick(at_kst(16, 0)).await.unwrap(), Decision::Hold);
    }

    #[tokio::test]
    async fn test_restore_and_forced_liquidation() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(CsvTradeLog::new(dir.path().join("trades.csv")));
        log.append(&TradeLogEntry {
            timestamp: at_kst(9, 30),
            side: TradeSide::Buy,
            price: 99.5,
            quantity: 10,
            net_return_pct: None,
            reason: "signal".to_string(),
        })
        .await
        .unwrap();

        let broker = Arc::new(PaperBroker::new(0.0, FeeSchedule::zero()).with_position(10));
        let (mut engine, _source) = engine_with(0.5, broker.clone(), log.clone());

        engine.bootstrap().await.unwrap();
        assert!(engine.machine().is_holding());

        let decision = engine.on_price_tick(at_kst(15, 16)).await.unwrap();
        assert!(matches!(
            decision,
            Decision::Sell {
                reason: ExitReason::ForcedLiquidation,
                quantity: 10,
                ..
            }
        ));
        assert_eq!(broker.available_cash().await.unwrap(), 1_000.0);

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].reason, "forced-liquidation");
    }
}
