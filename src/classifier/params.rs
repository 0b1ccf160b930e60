use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Boosting hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Minimum hessian sum in each child of a split
    pub min_child_weight: f64,
    /// Row sampling ratio per tree
    pub subsample: f64,
    /// Feature sampling ratio per tree
    pub colsample_bytree: f64,
    /// L1 regularisation on leaf weights
    pub reg_alpha: f64,
    /// L2 regularisation on leaf weights
    pub reg_lambda: f64,
    /// Minimum loss reduction to make a split
    pub gamma: f64,
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self::intraday()
    }
}

impl ModelParams {
    /// Shallow, short ensemble for daily bars
    pub fn daily() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_child_weight: 1.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_alpha: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
            seed: 42,
        }
    }

    /// Deeper, regularised ensemble for 5-minute bars
    pub fn intraday() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.05,
            max_depth: 6,
            min_child_weight: 5.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_alpha: 0.1,
            reg_lambda: 1.0,
            gamma: 0.0,
            seed: 42,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: &str| Err(EngineError::InvalidConfig(msg.to_string()));

        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1");
        }
        if self.max_depth == 0 {
            return invalid("max_depth must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid("learning_rate must be in (0, 1]");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample must be in (0, 1]");
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return invalid("colsample_bytree must be in (0, 1]");
        }
        if self.min_child_weight < 0.0
            || self.reg_alpha < 0.0
            || self.reg_lambda < 0.0
            || self.gamma < 0.0
        {
            return invalid("regularisation terms must be non-negative");
        }
        Ok(())
    }
}
