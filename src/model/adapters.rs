use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AdsError;
use crate::model::ad::Ad;
use crate::model::ad_event::{AdEvent, ConfirmationType};
use crate::model::creative_ad::{AdType, CreativeAd};
use crate::model::history_item::{HistoryItem, Reactions};
use crate::model::subdivision::SubdivisionSettings;
use crate::model::user_model::UserModel;

/// Catalog-backed creative ads, queried by segment.
#[async_trait]
pub trait CreativeAdsDatabase: Send + Sync {
    async fn get_creative_ads(
        &self,
        ad_type: AdType,
        segments: &BTreeSet<String>,
    ) -> Result<Vec<CreativeAd>, AdsError>;
}

/// The append-only ad event log.
#[async_trait]
pub trait AdEventStore: Send + Sync {
    /// Events of `ad_type` (any when `None`) and `confirmation_type` (any when `None`)
    /// created at or after `since` (all when `None`).
    async fn get_ad_events(
        &self,
        ad_type: Option<AdType>,
        confirmation_type: Option<ConfirmationType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AdEvent>, AdsError>;

    async fn record_ad_event(&self, ad_event: AdEvent) -> Result<(), AdsError>;
}

#[async_trait]
pub trait UserModelSource: Send + Sync {
    async fn build_user_model(&self) -> UserModel;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderType {
    ClickedSameAdMultipleTimes,
}

/// Browser and preference glue. All calls are cheap and synchronous.
pub trait AdsClient: Send + Sync {
    fn can_show_notification_ads(&self) -> bool;
    fn is_network_connection_available(&self) -> bool;
    fn is_browser_in_full_screen_mode(&self) -> bool;
    fn is_browser_active(&self) -> bool;
    fn is_media_playing(&self) -> bool;
    fn browser_major_version(&self) -> u32;
    fn unblinded_token_count(&self) -> usize;
    /// Kicks off an asynchronous refill; the result is observed on a later attempt.
    fn refill_unblinded_tokens(&self);
    fn user_activity_score(&self) -> f64;
    fn catalog_last_updated_at(&self) -> Option<DateTime<Utc>>;
    fn browsing_history(&self) -> Vec<String>;
    fn subdivision_settings(&self) -> SubdivisionSettings;
    fn maximum_notification_ads_per_hour(&self) -> u32;
    fn maximum_notification_ads_per_day(&self) -> u32;
    fn show_reminder(&self, reminder_type: ReminderType);
}

/// Client state persisted across sessions.
pub trait ClientState: Send + Sync {
    fn history_items(&self) -> Vec<HistoryItem>;
    fn set_history_items(&self, items: Vec<HistoryItem>);
    fn reactions(&self) -> Reactions;
    fn set_reactions(&self, reactions: Reactions);
    fn seen_ads(&self, ad_type: AdType) -> BTreeSet<String>;
    fn mark_ad_as_seen(&self, ad_type: AdType, creative_instance_id: &str);
    fn reset_seen_ads(&self, ad_type: AdType);
    fn last_served_ad(&self) -> Option<Ad>;
    fn set_last_served_ad(&self, ad: &Ad);
    fn serve_ad_at(&self) -> Option<DateTime<Utc>>;
    fn set_serve_ad_at(&self, serve_ad_at: Option<DateTime<Utc>>);
}

/// Reads a JSON array of creative ads, as produced by the catalog component.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<CreativeAd>, AdsError> {
    let content = fs::read_to_string(path)?;
    let creative_ads: Vec<CreativeAd> = serde_json::from_str(&content)?;
    Ok(creative_ads)
}
