// Feature pipeline
// Candle sequence -> fully-populated indicator rows with forward-looking labels

pub mod labels;
pub mod pipeline;

pub use labels::{compute_labels, label_at, LabelConfig, LabelMode};
pub use pipeline::{
    build_feature_table, FeatureConfig, FeatureRow, FeatureSet, FeatureTable, DAILY_FEATURES,
    INTRADAY_FEATURES,
};
