use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{offset_from_secs, session_date};

/// When the walk-forward loop refits its model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrainCadence {
    /// Refit before every prediction (daily bars)
    EveryStep,
    /// Refit when the calendar date changes in the exchange's UTC offset;
    /// predictions within one session share a model (intraday bars)
    OnSessionChange { utc_offset_secs: i32 },
}

impl RetrainCadence {
    /// Whether a model used for `previous` must be refit before predicting `current`
    pub fn should_retrain(&self, previous: Option<DateTime<Utc>>, current: DateTime<Utc>) -> bool {
        match (self, previous) {
            (_, None) | (RetrainCadence::EveryStep, _) => true,
            (RetrainCadence::OnSessionChange { utc_offset_secs }, Some(prev)) => {
                let offset = offset_from_secs(*utc_offset_secs);
                session_date(prev, offset) != session_date(current, offset)
            }
        }
    }
}
