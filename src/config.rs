use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::ModelParams;
use crate::error::{EngineError, EngineResult};
use crate::execution::LiveConfig;
use crate::features::{FeatureConfig, LabelConfig};
use crate::strategy::StrategyParams;
use crate::walk_forward::WalkForwardConfig;

/// Environment prefix; nested keys are separated by `__`,
/// e.g. `SCALPBOT__LIVE__INSTRUMENT=000660`
pub const ENV_PREFIX: &str = "SCALPBOT";

/// Everything a binary needs, one section per concern
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub features: FeatureConfig,
    pub labels: LabelConfig,
    pub model: ModelParams,
    pub walk_forward: WalkForwardConfig,
    pub live: LiveConfig,
    pub initial_cash: f64,
    /// Candle CSV read by the paper loop and the backtest
    pub candle_path: PathBuf,
    pub trade_log_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::intraday()
    }
}

impl AppConfig {
    /// 5-minute bars, session-cadence retraining
    pub fn intraday() -> Self {
        Self {
            features: FeatureConfig::intraday(),
            labels: LabelConfig::intraday(),
            model: ModelParams::intraday(),
            walk_forward: WalkForwardConfig::intraday(),
            live: LiveConfig::default(),
            initial_cash: 10_000_000.0,
            candle_path: PathBuf::from("data/candles_5m.csv"),
            trade_log_path: PathBuf::from("trade_log.csv"),
        }
    }

    /// Daily bars, retrain before every prediction
    pub fn daily() -> Self {
        let mut config = Self::intraday();
        config.features = FeatureConfig::daily();
        config.labels = LabelConfig::daily();
        config.model = ModelParams::daily();
        config.walk_forward = WalkForwardConfig::daily();
        config.live.interval_minutes = 24 * 60;
        config.live.strategy = StrategyParams::ai_daily();
        config.candle_path = PathBuf::from("data/candles_1d.csv");
        config
    }

    /// Daily model traded live: one entry per day, exits checked every 30 minutes
    pub fn daily_live() -> Self {
        let mut config = Self::daily();
        config.live.strategy = StrategyParams::ai_daily_live();
        config.live.price_check_secs = 30 * 60;
        config
    }

    /// Named base configuration, as used on the command line
    pub fn profile(name: &str) -> EngineResult<Self> {
        match name {
            "intraday" => Ok(Self::intraday()),
            "daily" => Ok(Self::daily()),
            "daily-live" => Ok(Self::daily_live()),
            other => Err(EngineError::InvalidConfig(format!(
                "unknown profile '{}'",
                other
            ))),
        }
    }

    /// Layer an optional TOML file and `SCALPBOT__*` variables over the intraday defaults
    ///
    /// Call `dotenvy::dotenv()` first so `.env` entries count as environment.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        Self::load_over(&Self::intraday(), path)
    }

    /// Same layering as [`AppConfig::load`] with `base` underneath
    pub fn load_over(base: &AppConfig, path: Option<&Path>) -> EngineResult<Self> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(base)?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                // Values stay strings so instrument codes keep leading zeros;
                // numeric fields are converted during deserialization
                config::Environment::with_prefix(ENV_PREFIX).separator("__"),
            )
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.features.validate()?;
        self.labels.validate()?;
        self.model.validate()?;
        self.walk_forward.validate()?;
        self.live.strategy.validate()?;
        if !(self.initial_cash > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "initial_cash must be positive, got {}",
                self.initial_cash
            )));
        }
        Ok(())
    }
}
