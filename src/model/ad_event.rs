use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ad::Ad;
use crate::model::creative_ad::AdType;

/// What happened to an ad.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationType {
    Served,
    Viewed,
    Clicked,
    Dismissed,
    Transferred,
    Saved,
    Flagged,
    Upvoted,
    Downvoted,
    Conversion,
}

impl ConfirmationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationType::Served => "served",
            ConfirmationType::Viewed => "view",
            ConfirmationType::Clicked => "click",
            ConfirmationType::Dismissed => "dismiss",
            ConfirmationType::Transferred => "landed",
            ConfirmationType::Saved => "bookmark",
            ConfirmationType::Flagged => "flag",
            ConfirmationType::Upvoted => "upvote",
            ConfirmationType::Downvoted => "downvote",
            ConfirmationType::Conversion => "conversion",
        }
    }
}

impl std::fmt::Display for ConfirmationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only record in the ad event log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdEvent {
    pub ad_type: AdType,
    pub confirmation_type: ConfirmationType,
    pub placement_id: String,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub segment: String,
    pub created_at: DateTime<Utc>,
}

impl AdEvent {
    pub fn new(ad: &Ad, confirmation_type: ConfirmationType, created_at: DateTime<Utc>) -> Self {
        Self {
            ad_type: ad.ad_type,
            confirmation_type,
            placement_id: ad.placement_id.clone(),
            creative_instance_id: ad.creative_instance_id.clone(),
            creative_set_id: ad.creative_set_id.clone(),
            campaign_id: ad.campaign_id.clone(),
            advertiser_id: ad.advertiser_id.clone(),
            segment: ad.segment.clone(),
            created_at,
        }
    }
}

/// Timestamps of events matching `predicate`, in log order.
pub fn timestamps_where<F>(ad_events: &[AdEvent], predicate: F) -> Vec<DateTime<Utc>>
where
    F: Fn(&AdEvent) -> bool,
{
    ad_events
        .iter()
        .filter(|event| predicate(event))
        .map(|event| event.created_at)
        .collect()
}
