use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::ExclusionRule;
use crate::frequency_capping::to_time_delta;
use crate::model::{AdEvent, ConfirmationType, CreativeAd};

/// Campaigns dismissed `cap` times within the window without a click in between.
pub struct DismissedExclusionRule {
    ad_events: Arc<[AdEvent]>,
    now: DateTime<Utc>,
    window: Duration,
    cap: u32,
}

impl DismissedExclusionRule {
    pub fn new(ad_events: Arc<[AdEvent]>, now: DateTime<Utc>, window: Duration, cap: u32) -> Self {
        Self {
            ad_events,
            now,
            window,
            cap,
        }
    }
}

impl ExclusionRule for DismissedExclusionRule {
    fn name(&self) -> &'static str {
        "dismissed"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.campaign_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        if self.cap == 0 {
            return Ok(());
        }
        let start = self
            .now
            .checked_sub_signed(to_time_delta(self.window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut campaign_events: Vec<&AdEvent> = self
            .ad_events
            .iter()
            .filter(|event| event.campaign_id == creative_ad.campaign_id)
            .filter(|event| event.created_at > start && event.created_at <= self.now)
            .collect();
        campaign_events.sort_by_key(|event| event.created_at);

        let mut dismissed = 0u32;
        for event in campaign_events {
            match event.confirmation_type {
                ConfirmationType::Clicked => dismissed = 0,
                ConfirmationType::Dismissed => dismissed += 1,
                _ => {}
            }
        }

        if dismissed >= self.cap {
            return Err(format!(
                "campaignId {} has exceeded the dismissed frequency cap",
                creative_ad.campaign_id
            ));
        }
        Ok(())
    }
}
