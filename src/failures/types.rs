//! Failure log record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::events::FailureStage;

/// One failed or skipped item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Title identifier or artifact name.
    pub item: String,
    pub error: String,
    pub stage: FailureStage,
    pub timestamp: DateTime<Utc>,
}

/// Failure counts by stage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureStats {
    pub fetch: usize,
    pub parse: usize,
    pub validate: usize,
    pub upload: usize,
}

impl FailureStats {
    pub fn increment(&mut self, stage: FailureStage) {
        match stage {
            FailureStage::Fetch => self.fetch += 1,
            FailureStage::Parse => self.parse += 1,
            FailureStage::Validate => self.validate += 1,
            FailureStage::Upload => self.upload += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.fetch + self.parse + self.validate + self.upload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_item_json_shape() {
        let json = r#"{"item":"9999999","error":"Title 9999999 not found","stage":"fetch","timestamp":"2025-01-26T10:30:00Z"}"#;
        let failed: FailedItem = serde_json::from_str(json).unwrap();
        assert_eq!(failed.item, "9999999");
        assert_eq!(failed.stage, FailureStage::Fetch);

        let back = serde_json::to_string(&failed).unwrap();
        assert!(back.contains(r#""stage":"fetch""#));
    }

    #[test]
    fn test_stats_total() {
        let mut stats = FailureStats::default();
        stats.increment(FailureStage::Fetch);
        stats.increment(FailureStage::Validate);
        stats.increment(FailureStage::Validate);
        assert_eq!(stats.validate, 2);
        assert_eq!(stats.total(), 3);
    }
}
