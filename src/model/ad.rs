use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AdsError;
use crate::model::creative_ad::{AdType, CreativeAd};

/// A concrete, shown instance of a creative ad.
///
/// `placement_id` is freshly generated for every build so two impressions of the same
/// creative never share one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Ad {
    pub ad_type: AdType,
    pub placement_id: String,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub segment: String,
    pub title: String,
    pub body: String,
    pub target_url: String,
}

impl Ad {
    /// **Builds a servable ad from a catalog creative**
    pub fn build(creative_ad: &CreativeAd) -> Self {
        Self::build_with_placement_id(creative_ad, &Uuid::new_v4().to_string())
    }

    pub fn build_with_placement_id(creative_ad: &CreativeAd, placement_id: &str) -> Self {
        Self {
            ad_type: creative_ad.ad_type,
            placement_id: placement_id.to_string(),
            creative_instance_id: creative_ad.creative_instance_id.clone(),
            creative_set_id: creative_ad.creative_set_id.clone(),
            campaign_id: creative_ad.campaign_id.clone(),
            advertiser_id: creative_ad.advertiser_id.clone(),
            segment: creative_ad.segment.clone(),
            title: creative_ad.title.clone(),
            body: creative_ad.body.clone(),
            target_url: creative_ad.target_url.clone(),
        }
    }

    /// Every identifier plus the copy shown to the user must be present.
    pub fn validate(&self) -> Result<(), AdsError> {
        let required = [
            ("placement_id", &self.placement_id),
            ("creative_instance_id", &self.creative_instance_id),
            ("creative_set_id", &self.creative_set_id),
            ("campaign_id", &self.campaign_id),
            ("advertiser_id", &self.advertiser_id),
            ("segment", &self.segment),
            ("target_url", &self.target_url),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(AdsError::InvalidAd(format!("missing {field}")));
        }
        if self.ad_type == AdType::NotificationAd && (self.title.is_empty() || self.body.is_empty()) {
            return Err(AdsError::InvalidAd("missing title or body".to_string()));
        }
        Ok(())
    }
}
