use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::labels::{compute_labels, LabelConfig};
use crate::error::{EngineError, EngineResult};
use crate::indicators::{
    atr_series, bollinger_bands, macd_series, pct_change, rolling_mean, rolling_std, rsi_series,
    sma_series, stoch_rsi_series, BollingerBands, MacdSeries, StochRsi,
};
use crate::models::Candle;

/// Feature columns of the 5-minute model, in training order (default windows)
pub const INTRADAY_FEATURES: [&str; 23] = [
    "close",
    "MA5",
    "MA20",
    "RSI",
    "BB_Pct",
    "MACD",
    "MACD_Hist",
    "StochRSI_K",
    "StochRSI_D",
    "ATR",
    "Vol_Ratio",
    "Vol_Spike",
    "Body_Ratio",
    "Ret_1",
    "Ret_3",
    "Ret_6",
    "Ret_12",
    "MA5_Dist",
    "MA20_Dist",
    "Intraday_Pos",
    "VOL",
    "Vol_6",
    "volume",
];

/// Feature columns of the daily model, in training order (default windows)
pub const DAILY_FEATURES: [&str; 11] = [
    "close",
    "MA5",
    "MA20",
    "RSI",
    "VOL",
    "volume",
    "BB_Upper",
    "BB_Lower",
    "Vol_Ratio",
    "MACD",
    "MACD_Sig",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSet {
    Intraday,
    Daily,
}

/// Indicator windows for the feature pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    pub feature_set: FeatureSet,
    pub ma_short: usize,
    pub ma_mid: usize,
    /// Long MA is not a feature; it only extends the warm-up so rows start
    /// once the long trend is defined
    pub ma_long: Option<usize>,
    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub stoch_period: usize,
    pub stoch_k: usize,
    pub stoch_d: usize,
    pub atr_period: usize,
    pub volume_window: usize,
    pub volume_spike_ratio: f64,
    pub return_lags: Vec<usize>,
    pub volatility_window: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self::intraday()
    }
}

impl FeatureConfig {
    pub fn intraday() -> Self {
        Self {
            feature_set: FeatureSet::Intraday,
            ma_short: 5,
            ma_mid: 20,
            ma_long: Some(60),
            rsi_period: 14,
            bb_period: 20,
            bb_std: 2.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            stoch_period: 14,
            stoch_k: 3,
            stoch_d: 3,
            atr_period: 14,
            volume_window: 20,
            volume_spike_ratio: 2.0,
            return_lags: vec![1, 3, 6, 12],
            volatility_window: 6,
        }
    }

    pub fn daily() -> Self {
        Self {
            feature_set: FeatureSet::Daily,
            ma_long: None,
            volume_window: 10,
            ..Self::intraday()
        }
    }

    /// Column names in the order they appear in every `FeatureRow::values`
    pub fn feature_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name()).collect()
    }

    /// Rows consumed before the first fully-populated row
    pub fn warmup_rows(&self) -> usize {
        let longest = self
            .columns()
            .iter()
            .map(|c| c.first_valid(self))
            .chain(self.ma_long.map(|w| w.saturating_sub(1)))
            .max()
            .unwrap_or(0);
        longest + 1
    }

    pub fn validate(&self) -> EngineResult<()> {
        let windows = [
            ("ma_short", self.ma_short),
            ("ma_mid", self.ma_mid),
            ("rsi_period", self.rsi_period),
            ("bb_period", self.bb_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("stoch_period", self.stoch_period),
            ("stoch_k", self.stoch_k),
            ("stoch_d", self.stoch_d),
            ("atr_period", self.atr_period),
            ("volume_window", self.volume_window),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, w)| *w == 0) {
            return Err(EngineError::InvalidConfig(format!("{} must be at least 1", name)));
        }
        if self.volatility_window < 2 {
            return Err(EngineError::InvalidConfig(
                "volatility_window must be at least 2".to_string(),
            ));
        }
        if self.ma_long == Some(0) || self.return_lags.contains(&0) {
            return Err(EngineError::InvalidConfig(
                "windows and lags must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn columns(&self) -> Vec<Column> {
        match self.feature_set {
            FeatureSet::Intraday => {
                let mut cols = vec![
                    Column::Close,
                    Column::Sma(self.ma_short),
                    Column::Sma(self.ma_mid),
                    Column::Rsi,
                    Column::BbPct,
                    Column::Macd,
                    Column::MacdHist,
                    Column::StochK,
                    Column::StochD,
                    Column::Atr,
                    Column::VolRatio,
                    Column::VolSpike,
                    Column::BodyRatio,
                ];
                cols.extend(self.return_lags.iter().map(|&lag| Column::Return(lag)));
                cols.extend([
                    Column::SmaDist(self.ma_short),
                    Column::SmaDist(self.ma_mid),
                    Column::IntradayPos,
                    Column::Range,
                    Column::Volatility(self.volatility_window),
                    Column::Volume,
                ]);
                cols
            }
            FeatureSet::Daily => vec![
                Column::Close,
                Column::Sma(self.ma_short),
                Column::Sma(self.ma_mid),
                Column::Rsi,
                Column::Range,
                Column::Volume,
                Column::BbUpper,
                Column::BbLower,
                Column::VolRatio,
                Column::Macd,
                Column::MacdSignal,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Close,
    Volume,
    /// High minus low ("VOL")
    Range,
    Sma(usize),
    SmaDist(usize),
    Rsi,
    BbPct,
    BbUpper,
    BbLower,
    Macd,
    MacdSignal,
    MacdHist,
    StochK,
    StochD,
    Atr,
    VolRatio,
    VolSpike,
    BodyRatio,
    Return(usize),
    IntradayPos,
    Volatility(usize),
}

impl Column {
    fn name(&self) -> String {
        match self {
            Column::Close => "close".to_string(),
            Column::Volume => "volume".to_string(),
            Column::Range => "VOL".to_string(),
            Column::Sma(w) => format!("MA{}", w),
            Column::SmaDist(w) => format!("MA{}_Dist", w),
            Column::Rsi => "RSI".to_string(),
            Column::BbPct => "BB_Pct".to_string(),
            Column::BbUpper => "BB_Upper".to_string(),
            Column::BbLower => "BB_Lower".to_string(),
            Column::Macd => "MACD".to_string(),
            Column::MacdSignal => "MACD_Sig".to_string(),
            Column::MacdHist => "MACD_Hist".to_string(),
            Column::StochK => "StochRSI_K".to_string(),
            Column::StochD => "StochRSI_D".to_string(),
            Column::Atr => "ATR".to_string(),
            Column::VolRatio => "Vol_Ratio".to_string(),
            Column::VolSpike => "Vol_Spike".to_string(),
            Column::BodyRatio => "Body_Ratio".to_string(),
            Column::Return(lag) => format!("Ret_{}", lag),
            Column::IntradayPos => "Intraday_Pos".to_string(),
            Column::Volatility(w) => format!("Vol_{}", w),
        }
    }

    /// Index of the first defined value
    fn first_valid(&self, cfg: &FeatureConfig) -> usize {
        let macd_line = cfg.macd_fast.max(cfg.macd_slow) - 1;
        let stoch_k = cfg.rsi_period + cfg.stoch_period - 1 + cfg.stoch_k - 1;
        match self {
            Column::Close
            | Column::Volume
            | Column::Range
            | Column::BodyRatio
            | Column::IntradayPos => 0,
            Column::Sma(w) | Column::SmaDist(w) => w - 1,
            Column::Rsi => cfg.rsi_period,
            Column::BbPct | Column::BbUpper | Column::BbLower => cfg.bb_period - 1,
            Column::Macd => macd_line,
            Column::MacdSignal | Column::MacdHist => macd_line + cfg.macd_signal - 1,
            Column::StochK => stoch_k,
            Column::StochD => stoch_k + cfg.stoch_d - 1,
            Column::Atr => cfg.atr_period,
            Column::VolRatio | Column::VolSpike => cfg.volume_window - 1,
            Column::Return(lag) => *lag,
            Column::Volatility(w) => w - 1,
        }
    }
}

/// Shared multi-output indicators, computed once per build
struct Computed {
    closes: Vec<f64>,
    rsi: Vec<Option<f64>>,
    bands: BollingerBands,
    macd: MacdSeries,
    stoch: StochRsi,
    atr: Vec<Option<f64>>,
    volume_ratio: Vec<Option<f64>>,
}

impl Computed {
    fn new(candles: &[Candle], cfg: &FeatureConfig) -> Self {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let volume_ratio = rolling_mean(&volumes, cfg.volume_window)
            .iter()
            .zip(&volumes)
            .map(|(avg, vol)| avg.map(|a| if a > 0.0 { vol / a } else { 1.0 }))
            .collect();

        Self {
            rsi: rsi_series(&closes, cfg.rsi_period),
            bands: bollinger_bands(&closes, cfg.bb_period, cfg.bb_std),
            macd: macd_series(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal),
            stoch: stoch_rsi_series(
                &closes,
                cfg.rsi_period,
                cfg.stoch_period,
                cfg.stoch_k,
                cfg.stoch_d,
            ),
            atr: atr_series(candles, cfg.atr_period),
            volume_ratio,
            closes,
        }
    }

    fn series(&self, column: Column, candles: &[Candle], cfg: &FeatureConfig) -> Vec<Option<f64>> {
        match column {
            Column::Close => self.closes.iter().map(|&c| Some(c)).collect(),
            Column::Volume => candles.iter().map(|c| Some(c.volume)).collect(),
            Column::Range => candles.iter().map(|c| Some(c.range())).collect(),
            Column::Sma(w) => sma_series(&self.closes, w),
            Column::SmaDist(w) => sma_series(&self.closes, w)
                .iter()
                .zip(&self.closes)
                .map(|(ma, close)| {
                    ma.map(|m| if m > 0.0 { (close / m - 1.0) * 100.0 } else { 0.0 })
                })
                .collect(),
            Column::Rsi => self.rsi.clone(),
            Column::BbPct => self.bands.percent_b.clone(),
            Column::BbUpper => self.bands.upper.clone(),
            Column::BbLower => self.bands.lower.clone(),
            Column::Macd => self.macd.macd.clone(),
            Column::MacdSignal => self.macd.signal.clone(),
            Column::MacdHist => self.macd.histogram.clone(),
            Column::StochK => self.stoch.k.clone(),
            Column::StochD => self.stoch.d.clone(),
            Column::Atr => self.atr.clone(),
            Column::VolRatio => self.volume_ratio.clone(),
            Column::VolSpike => self
                .volume_ratio
                .iter()
                .map(|r| r.map(|r| if r > cfg.volume_spike_ratio { 1.0 } else { 0.0 }))
                .collect(),
            Column::BodyRatio => candles
                .iter()
                .map(|c| {
                    let range = c.range();
                    Some(if range > 0.0 {
                        (c.close - c.open) / range
                    } else {
                        0.0
                    })
                })
                .collect(),
            Column::Return(lag) => pct_change(&self.closes, lag),
            Column::IntradayPos => candles
                .iter()
                .map(|c| {
                    let range = c.range();
                    Some(if range > 0.0 {
                        (c.close - c.low) / range
                    } else {
                        0.5
                    })
                })
                .collect(),
            Column::Volatility(w) => rolling_std(&self.closes, w, 1),
        }
    }
}

/// A candle with every indicator defined, plus its forward label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub timestamp: DateTime<Utc>,
    /// Position of the source candle in the input sequence
    pub candle_index: usize,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Values in `FeatureTable::names` order
    pub values: Vec<f64>,
    /// `None` for the trailing rows without a full horizon ahead
    pub label: Option<bool>,
}

/// Ordered, fully-populated feature rows sharing one column layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub names: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Value of `name` in row `row`
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let col = self.column_index(name)?;
        self.rows.get(row).map(|r| r.values[col])
    }

    pub fn labeled_count(&self) -> usize {
        self.rows.iter().filter(|r| r.label.is_some()).count()
    }
}

/// Turn an ordered candle sequence into a labeled feature table
///
/// Rows lacking any indicator value are dropped, never imputed. Labels come
/// from the full candle sequence, so a kept row near the end is unlabeled
/// rather than dropped.
///
/// # Errors
/// `InsufficientData` when `candles` is shorter than the warm-up plus the
/// label horizon; no partial table is produced.
pub fn build_feature_table(
    candles: &[Candle],
    features: &FeatureConfig,
    labels: &LabelConfig,
) -> EngineResult<FeatureTable> {
    features.validate()?;
    labels.validate()?;

    let needed = features.warmup_rows() + labels.horizon;
    if candles.len() < needed {
        return Err(EngineError::InsufficientData {
            needed,
            available: candles.len(),
        });
    }

    let computed = Computed::new(candles, features);
    let columns = features.columns();
    let series: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|&c| computed.series(c, candles, features))
        .collect();
    let long_ma = features.ma_long.map(|w| sma_series(&computed.closes, w));
    let label_series = compute_labels(candles, labels);

    let mut rows = Vec::with_capacity(candles.len());
    for (i, candle) in candles.iter().enumerate() {
        if let Some(ma) = &long_ma {
            if ma[i].is_none() {
                continue;
            }
        }

        let values: Option<Vec<f64>> = series
            .iter()
            .map(|s| s[i].filter(|v| v.is_finite()))
            .collect();
        let Some(values) = values else { continue };

        rows.push(FeatureRow {
            timestamp: candle.timestamp,
            candle_index: i,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            values,
            label: label_series[i],
        });
    }

    let table = FeatureTable {
        names: features.feature_names(),
        rows,
    };

    tracing::debug!(
        candles = candles.len(),
        rows = table.len(),
        labeled = table.labeled_count(),
        features = table.names.len(),
        "🧮 Feature table built"
    );

    Ok(table)
}
