use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cadence::RetrainCadence;
use crate::classifier::{Classifier, ClassifierFactory};
use crate::error::{EngineError, EngineResult};
use crate::features::{FeatureRow, FeatureTable};

/// Walk-forward loop configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Fraction of the table used as the initial training prefix
    pub train_ratio: f64,
    pub cadence: RetrainCadence,
    /// Rows dropped from the end of every training window. With 0 the window
    /// for test row `i` is exactly rows `0..i`.
    pub embargo: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self::intraday()
    }
}

impl WalkForwardConfig {
    pub fn daily() -> Self {
        Self {
            train_ratio: 0.75,
            cadence: RetrainCadence::EveryStep,
            embargo: 0,
        }
    }

    /// Retrains once per KST session
    pub fn intraday() -> Self {
        Self {
            train_ratio: 0.75,
            cadence: RetrainCadence::OnSessionChange {
                utc_offset_secs: 9 * 3600,
            },
            embargo: 0,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "train_ratio must be in (0, 1), got {}",
                self.train_ratio
            )));
        }
        Ok(())
    }
}

/// One out-of-sample prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Row index in the feature table
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub probability: f64,
    /// `probability >= 0.5`, for accuracy reporting only
    pub predicted: bool,
    /// Realised label, if the row has a full horizon ahead
    pub label: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    /// First test row
    pub split_index: usize,
    pub predictions: Vec<Prediction>,
    /// Share of labeled test rows whose class was predicted correctly
    pub accuracy: Option<f64>,
    pub retrain_count: usize,
}

impl WalkForwardReport {
    pub fn probabilities(&self) -> Vec<f64> {
        self.predictions.iter().map(|p| p.probability).collect()
    }
}

/// Model fitted on the whole labeled history plus its call for the newest row
pub struct LatestFit<M> {
    pub model: M,
    pub probability: f64,
    pub timestamp: DateTime<Utc>,
    pub training_rows: usize,
    pub scale_pos_weight: f64,
}

/// Negatives/positives ratio, or 1.0 when the window holds no positive label
pub fn imbalance_weight(labels: impl IntoIterator<Item = bool>) -> f64 {
    let (pos, neg) = labels.into_iter().fold((0usize, 0usize), |(p, n), label| {
        if label {
            (p + 1, n)
        } else {
            (p, n + 1)
        }
    });

    if pos == 0 {
        tracing::debug!("No positive labels in window; using unit class weight");
        return 1.0;
    }
    neg as f64 / pos as f64
}

/// Walk-forward trainer/predictor over a feature table
pub struct WalkForward<F: ClassifierFactory> {
    config: WalkForwardConfig,
    factory: F,
}

impl<F: ClassifierFactory> WalkForward<F> {
    pub fn new(config: WalkForwardConfig, factory: F) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    /// First test row for a table of `len` rows
    pub fn split_index(&self, len: usize) -> usize {
        (len as f64 * self.config.train_ratio).floor() as usize
    }

    /// Fit a fresh model on the labeled rows of `window`
    fn train(&self, window: &[FeatureRow]) -> EngineResult<(F::Model, usize, f64)> {
        let (x, y): (Vec<&[f64]>, Vec<bool>) = window
            .iter()
            .filter_map(|row| row.label.map(|label| (row.values.as_slice(), label)))
            .unzip();

        if x.is_empty() {
            return Err(EngineError::InsufficientData {
                needed: 1,
                available: 0,
            });
        }

        let weight = imbalance_weight(y.iter().copied());
        let mut model = self.factory.create(weight);
        model.fit(&x, &y)?;
        Ok((model, x.len(), weight))
    }

    /// Retrain on an expanding window and predict every test row
    ///
    /// The model that predicts row `i` never saw row `i` or anything after it.
    pub fn run(&self, table: &FeatureTable) -> EngineResult<WalkForwardReport> {
        self.config.validate()?;

        let len = table.len();
        let split = self.split_index(len);
        if split == 0 || split >= len {
            return Err(EngineError::InsufficientData {
                needed: ((1.0 / self.config.train_ratio).ceil() as usize).max(2),
                available: len,
            });
        }

        tracing::info!(
            rows = len,
            train = split,
            test = len - split,
            cadence = ?self.config.cadence,
            "🚶 Walk-forward started"
        );

        let mut model: Option<F::Model> = None;
        let mut previous: Option<DateTime<Utc>> = None;
        let mut retrain_count = 0;
        let mut predictions = Vec::with_capacity(len - split);

        for i in split..len {
            let row = &table.rows[i];

            if model.is_none() || self.config.cadence.should_retrain(previous, row.timestamp) {
                let window_end = i.saturating_sub(self.config.embargo);
                let (fitted, window, weight) = self.train(&table.rows[..window_end])?;
                tracing::debug!(
                    index = i,
                    window,
                    scale_pos_weight = weight,
                    "🔁 Retrained"
                );
                model = Some(fitted);
                retrain_count += 1;
            }
            previous = Some(row.timestamp);

            let Some(current) = model.as_ref() else {
                continue;
            };
            let probability = current.predict_proba(&row.values)?;
            tracing::debug!(index = i, probability, "Prediction");

            predictions.push(Prediction {
                index: i,
                timestamp: row.timestamp,
                probability,
                predicted: probability >= 0.5,
                label: row.label,
            });
        }

        let labeled: Vec<&Prediction> = predictions.iter().filter(|p| p.label.is_some()).collect();
        let accuracy = if labeled.is_empty() {
            None
        } else {
            let correct = labeled
                .iter()
                .filter(|p| p.label == Some(p.predicted))
                .count();
            Some(correct as f64 / labeled.len() as f64)
        };

        tracing::info!(
            predictions = predictions.len(),
            retrains = retrain_count,
            accuracy = accuracy.map(|a| a * 100.0),
            "🎯 Walk-forward finished"
        );

        Ok(WalkForwardReport {
            split_index: split,
            predictions,
            accuracy,
            retrain_count,
        })
    }

    /// Fit on every labeled row and score the newest row
    ///
    /// The newest row is normally unlabeled; that is the live use case.
    pub fn fit_latest(&self, table: &FeatureTable) -> EngineResult<LatestFit<F::Model>> {
        let Some(last) = table.rows.last() else {
            return Err(EngineError::InsufficientData {
                needed: 1,
                available: 0,
            });
        };

        let (model, training_rows, scale_pos_weight) = self.train(&table.rows)?;
        let probability = model.predict_proba(&last.values)?;

        let top = model.top_features(&table.names, 10);
        if !top.is_empty() {
            let summary: Vec<String> = top
                .iter()
                .map(|(name, share)| format!("{}={:.3}", name, share))
                .collect();
            tracing::info!(features = %summary.join(", "), "📊 Top features");
        }
        tracing::info!(
            training_rows,
            scale_pos_weight,
            probability,
            "🧠 Model refreshed"
        );

        Ok(LatestFit {
            model,
            probability,
            timestamp: last.timestamp,
            training_rows,
            scale_pos_weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{GbdtFactory, ModelParams};
    use chrono::{Duration, TimeZone};
    use std::sync::{Arc, Mutex};

    /// Records every training window it is fitted on
    struct RecordingModel {
        log: Arc<Mutex<Vec<(usize, f64)>>>,
        weight: f64,
    }

    impl Classifier for RecordingModel {
        fn fit(&mut self, x: &[&[f64]], _y: &[bool]) -> EngineResult<()> {
            self.log.lock().unwrap().push((x.len(), self.weight));
            Ok(())
        }

        fn predict_proba(&self, _x: &[f64]) -> EngineResult<f64> {
            Ok(0.7)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingFactory {
        log: Arc<Mutex<Vec<(usize, f64)>>>,
    }

    impl ClassifierFactory for RecordingFactory {
        type Model = RecordingModel;

        fn create(&self, scale_pos_weight: f64) -> RecordingModel {
            RecordingModel {
                log: self.log.clone(),
                weight: scale_pos_weight,
            }
        }
    }

    fn create_test_table(len: usize, step_minutes: i64, labels: impl Fn(usize) -> Option<bool>) -> FeatureTable {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let rows = (0..len)
            .map(|i| FeatureRow {
                timestamp: start + Duration::minutes(step_minutes * i as i64),
                candle_index: i,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                values: vec![i as f64, (i % 7) as f64],
                label: labels(i),
            })
            .collect();
        FeatureTable {
            names: vec!["idx".to_string(), "mod7".to_string()],
            rows,
        }
    }

    #[test]
    fn test_imbalance_weight() {
        assert_eq!(imbalance_weight([true, false, false, false]), 3.0);
        assert_eq!(imbalance_weight([false, false]), 1.0);
        assert_eq!(imbalance_weight(Vec::<bool>::new()), 1.0);
    }

    #[test]
    fn test_training_window_equals_test_index() {
        let factory = RecordingFactory::default();
        let table = create_test_table(40, 24 * 60, |i| Some(i % 3 == 0));
        let walk = WalkForward::new(WalkForwardConfig::daily(), factory.clone());

        let report = walk.run(&table).unwrap();
        assert_eq!(report.split_index, 30);
        assert_eq!(report.predictions.len(), 10);
        assert_eq!(report.retrain_count, 10);

        let log = factory.log.lock().unwrap();
        for (step, (window, _)) in log.iter().enumerate() {
            assert_eq!(*window, 30 + step);
        }
    }

    #[test]
    fn test_session_cadence_retrains_once_per_day() {
        let factory = RecordingFactory::default();
        // 12 rows a day at 2h spacing, sessions split at UTC midnight
        let table = create_test_table(96, 120, |i| Some(i % 2 == 0));
        let config = WalkForwardConfig {
            cadence: RetrainCadence::OnSessionChange { utc_offset_secs: 0 },
            ..WalkForwardConfig::intraday()
        };
        let walk = WalkForward::new(config, factory.clone());

        let report = walk.run(&table).unwrap();
        assert_eq!(report.split_index, 72);
        // Rows 72..96 cover days 6 and 7
        assert_eq!(report.retrain_count, 2);

        let log = factory.log.lock().unwrap();
        assert_eq!(log[0].0, 72);
        assert_eq!(log[1].0, 84);
    }

    #[test]
    fn test_zero_positive_window_uses_unit_weight() {
        let factory = RecordingFactory::default();
        let table = create_test_table(20, 24 * 60, |_| Some(false));
        let walk = WalkForward::new(WalkForwardConfig::daily(), factory.clone());

        let report = walk.run(&table).unwrap();
        assert!(!report.predictions.is_empty());
        assert!(factory.log.lock().unwrap().iter().all(|(_, w)| *w == 1.0));
    }

    #[test]
    fn test_embargo_shrinks_window() {
        let factory = RecordingFactory::default();
        let table = create_test_table(40, 24 * 60, |i| Some(i % 2 == 0));
        let config = WalkForwardConfig {
            embargo: 5,
            ..WalkForwardConfig::daily()
        };
        WalkForward::new(config, factory.clone()).run(&table).unwrap();

        assert_eq!(factory.log.lock().unwrap()[0].0, 25);
    }

    #[test]
    fn test_unlabeled_tail_predicted_not_trained() {
        let factory = RecordingFactory::default();
        let table = create_test_table(40, 24 * 60, |i| if i < 36 { Some(i % 2 == 0) } else { None });
        let walk = WalkForward::new(WalkForwardConfig::daily(), factory.clone());

        let report = walk.run(&table).unwrap();
        assert_eq!(report.predictions.len(), 10);
        assert!(report.predictions[9].label.is_none());

        // Window for the last row holds only the 36 labeled rows
        assert_eq!(factory.log.lock().unwrap().last().unwrap().0, 36);
    }

    #[test]
    fn test_accuracy_counts_labeled_rows() {
        // RecordingModel always says 0.7, so accuracy is the positive share
        let factory = RecordingFactory::default();
        let table = create_test_table(40, 24 * 60, |i| Some(i % 2 == 0));
        let report = WalkForward::new(WalkForwardConfig::daily(), factory)
            .run(&table)
            .unwrap();

        assert_eq!(report.accuracy, Some(0.5));
        assert!(report.predictions.iter().all(|p| p.predicted));
    }

    #[test]
    fn test_too_short_table() {
        let table = create_test_table(1, 60, |_| Some(true));
        let walk = WalkForward::new(WalkForwardConfig::daily(), RecordingFactory::default());
        assert!(matches!(
            walk.run(&table),
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_fit_latest_with_boosted_trees() {
        let table = create_test_table(60, 24 * 60, |i| if i < 55 { Some(i >= 30) } else { None });
        let params = ModelParams {
            n_estimators: 10,
            ..ModelParams::daily()
        };
        let walk = WalkForward::new(WalkForwardConfig::daily(), GbdtFactory::new(params));

        let latest = walk.fit_latest(&table).unwrap();
        assert_eq!(latest.training_rows, 55);
        assert_eq!(latest.timestamp, table.rows[59].timestamp);
        assert!(latest.probability > 0.5);
        assert!((latest.scale_pos_weight - 30.0 / 25.0).abs() < 1e-12);
    }
}
