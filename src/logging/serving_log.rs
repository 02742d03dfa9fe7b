use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Ad, AdType};

/// **Audit record for one serving attempt**
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServingLog {
    pub timestamp: String,
    pub log_type: String,
    pub ad_type: AdType,
    /// `served`, `failed` or `already_serving`.
    pub status: String,
    pub failure_reason: Option<String>,
    pub had_opportunity: bool,
    pub segments: Vec<String>,
    pub eligible_count: usize,
    pub creative_instance_id: Option<String>,
    pub placement_id: Option<String>,
    pub exclusions: Vec<ExclusionLog>,
}

/// **Candidates dropped by one exclusion rule**
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExclusionLog {
    pub rule: String,
    pub excluded: usize,
}

impl ServingLog {
    pub fn new(ad_type: AdType, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: timestamp.to_rfc3339(),
            log_type: "serving_attempt".to_string(),
            ad_type,
            status: "failed".to_string(),
            failure_reason: None,
            had_opportunity: false,
            segments: Vec::new(),
            eligible_count: 0,
            creative_instance_id: None,
            placement_id: None,
            exclusions: Vec::new(),
        }
    }

    pub fn set_eligible(
        &mut self,
        had_opportunity: bool,
        eligible_count: usize,
        excluded_counts: &BTreeMap<&'static str, usize>,
    ) {
        self.had_opportunity = had_opportunity;
        self.eligible_count = eligible_count;
        self.exclusions = excluded_counts
            .iter()
            .map(|(rule, excluded)| ExclusionLog {
                rule: rule.to_string(),
                excluded: *excluded,
            })
            .collect();
    }

    pub fn set_served(&mut self, ad: &Ad) {
        self.status = "served".to_string();
        self.failure_reason = None;
        self.creative_instance_id = Some(ad.creative_instance_id.clone());
        self.placement_id = Some(ad.placement_id.clone());
    }

    pub fn set_failed(&mut self, reason: impl Into<String>) {
        self.status = "failed".to_string();
        self.failure_reason = Some(reason.into());
    }

    pub fn set_already_serving(&mut self) {
        self.status = "already_serving".to_string();
    }
}
