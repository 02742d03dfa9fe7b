use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::ExclusionRule;
use crate::frequency_capping::occurrences_within;
use crate::model::ad_event::timestamps_where;
use crate::model::{AdEvent, ConfirmationType, CreativeAd};

fn campaign_events_within(
    ad_events: &[AdEvent],
    now: DateTime<Utc>,
    window: Option<Duration>,
    confirmation_type: ConfirmationType,
    campaign_id: &str,
) -> usize {
    let history = timestamps_where(ad_events, |event| {
        event.confirmation_type == confirmation_type && event.campaign_id == campaign_id
    });
    occurrences_within(&history, now, window)
}

/// Campaigns the user already converted on.
pub struct ConversionExclusionRule {
    ad_events: Arc<[AdEvent]>,
    now: DateTime<Utc>,
    window: Option<Duration>,
}

impl ConversionExclusionRule {
    pub fn new(ad_events: Arc<[AdEvent]>, now: DateTime<Utc>, window: Option<Duration>) -> Self {
        Self {
            ad_events,
            now,
            window,
        }
    }
}

impl ExclusionRule for ConversionExclusionRule {
    fn name(&self) -> &'static str {
        "conversion"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.campaign_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        let conversions = campaign_events_within(
            &self.ad_events,
            self.now,
            self.window,
            ConfirmationType::Conversion,
            &creative_ad.campaign_id,
        );
        if conversions > 0 {
            return Err(format!(
                "campaignId {} excluded due to having converted",
                creative_ad.campaign_id
            ));
        }
        Ok(())
    }
}

/// Campaigns whose landing page the user visited recently.
pub struct TransferredExclusionRule {
    ad_events: Arc<[AdEvent]>,
    now: DateTime<Utc>,
    window: Duration,
}

impl TransferredExclusionRule {
    pub fn new(ad_events: Arc<[AdEvent]>, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            ad_events,
            now,
            window,
        }
    }
}

impl ExclusionRule for TransferredExclusionRule {
    fn name(&self) -> &'static str {
        "transferred"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.campaign_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        let transfers = campaign_events_within(
            &self.ad_events,
            self.now,
            Some(self.window),
            ConfirmationType::Transferred,
            &creative_ad.campaign_id,
        );
        if transfers > 0 {
            return Err(format!(
                "campaignId {} has exceeded the transferred frequency cap",
                creative_ad.campaign_id
            ));
        }
        Ok(())
    }
}
