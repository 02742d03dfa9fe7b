use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Ad unit a creative is served through.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AdType {
    NotificationAd,
    InlineContentAd,
    NewTabPageAd,
    PromotedContentAd,
    SearchResultAd,
}

impl AdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::NotificationAd => "notification_ad",
            AdType::InlineContentAd => "inline_content_ad",
            AdType::NewTabPageAd => "new_tab_page_ad",
            AdType::PromotedContentAd => "promoted_content_ad",
            AdType::SearchResultAd => "search_result_ad",
        }
    }
}

impl std::fmt::Display for AdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scheduled window in which a creative may be shown.
///
/// `days_of_week` holds one digit per allowed day, `0` being Sunday. Minutes are counted
/// from local midnight and both bounds are inclusive.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreativeDaypart {
    pub days_of_week: String,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl Default for CreativeDaypart {
    fn default() -> Self {
        Self {
            days_of_week: "0123456".to_string(),
            start_minute: 0,
            end_minute: 24 * 60 - 1,
        }
    }
}

fn default_pass_through_rate() -> f64 {
    1.0
}

fn default_priority() -> u32 {
    1
}

/// Catalog record for one creative instance.
///
/// Immutable once loaded; the serving pipeline only ever clones it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreativeAd {
    pub ad_type: AdType,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    /// Served events allowed per campaign in a rolling day.
    #[serde(default)]
    pub daily_cap: u32,
    #[serde(default)]
    pub per_day: u32,
    #[serde(default)]
    pub per_week: u32,
    #[serde(default)]
    pub per_month: u32,
    #[serde(default)]
    pub total_max: u32,
    #[serde(default = "default_pass_through_rate")]
    pub pass_through_rate: f64,
    /// Lower wins. Zero marks an ad that must never be picked.
    #[serde(default = "default_priority")]
    pub priority: u32,
    pub segment: String,
    #[serde(default)]
    pub geo_targets: BTreeSet<String>,
    #[serde(default)]
    pub dayparts: Vec<CreativeDaypart>,
    #[serde(default)]
    pub target_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

impl CreativeAd {
    /// Minimal notification creative with unlimited caps, used by tests and fixtures.
    pub fn notification(creative_instance_id: &str, creative_set_id: &str, segment: &str) -> Self {
        Self {
            ad_type: AdType::NotificationAd,
            creative_instance_id: creative_instance_id.to_string(),
            creative_set_id: creative_set_id.to_string(),
            campaign_id: format!("campaign-{creative_set_id}"),
            advertiser_id: format!("advertiser-{creative_set_id}"),
            daily_cap: 1000,
            per_day: 1000,
            per_week: 1000,
            per_month: 1000,
            total_max: 1000,
            pass_through_rate: 1.0,
            priority: 1,
            segment: segment.to_string(),
            geo_targets: BTreeSet::new(),
            dayparts: Vec::new(),
            target_url: "https://brave.com".to_string(),
            title: "Test Ad Title".to_string(),
            body: "Test Ad Body".to_string(),
            embedding: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_pass_through_rate(mut self, pass_through_rate: f64) -> Self {
        self.pass_through_rate = pass_through_rate;
        self
    }

    pub fn with_campaign(mut self, campaign_id: &str) -> Self {
        self.campaign_id = campaign_id.to_string();
        self
    }

    pub fn with_advertiser(mut self, advertiser_id: &str) -> Self {
        self.advertiser_id = advertiser_id.to_string();
        self
    }

    /// Pass-through rate clamped to `[0, 1]`; anything unparseable behaves as `1.0`.
    pub fn effective_pass_through_rate(&self) -> f64 {
        if self.pass_through_rate.is_nan() {
            return 1.0;
        }
        self.pass_through_rate.clamp(0.0, 1.0)
    }
}
