// Classifier module
// Trait seam for the up-probability model plus the boosted-tree implementation

pub mod gbdt;
pub mod params;

pub use gbdt::{GbdtFactory, GradientBoostedTrees};
pub use params::ModelParams;

use crate::error::EngineResult;

/// Binary classifier producing an up-probability
///
/// Instances are fit once and then only read; the walk-forward trainer owns
/// exactly one at a time and replaces it on every retrain.
pub trait Classifier: Send {
    /// Fit on feature rows `x` (all the same width) and labels `y`
    fn fit(&mut self, x: &[&[f64]], y: &[bool]) -> EngineResult<()>;

    /// Probability in [0, 1] that the row's label is positive
    fn predict_proba(&self, x: &[f64]) -> EngineResult<f64>;

    /// Most influential features by share, when the model can tell
    fn top_features(&self, _names: &[String], _n: usize) -> Vec<(String, f64)> {
        Vec::new()
    }
}

/// Builds a fresh, unfitted classifier for one training window
pub trait ClassifierFactory: Send + Sync {
    type Model: Classifier;

    /// `scale_pos_weight` is the negatives/positives ratio of the window
    fn create(&self, scale_pos_weight: f64) -> Self::Model;
}
