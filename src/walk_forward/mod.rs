// Walk-forward training and inference
// Expanding-window retraining with one-step-ahead predictions

pub mod cadence;
pub mod trainer;

pub use cadence::RetrainCadence;
pub use trainer::{
    imbalance_weight, LatestFit, Prediction, WalkForward, WalkForwardConfig, WalkForwardReport,
};
