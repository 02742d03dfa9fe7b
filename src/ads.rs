//! The entry point that wires collaborators, history and the serving state machine
//! together.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{AdsConfig, ConfigManager};
use crate::eligible_ads::pacing::RandomSource;
use crate::error::AdsError;
use crate::frequency_capping::exclusion_rules::AntiTargetingResource;
use crate::history::{HistoryManager, HistoryPrecondition, Reminder};
use crate::logging::LogManager;
use crate::model::adapters::{
    AdEventStore, AdsClient, ClientState, CreativeAdsDatabase, UserModelSource,
};
use crate::model::{Ad, AdEvent, ConfirmationType, HistoryItem};
use crate::serving::Serving;

/// Everything the engine reads from or writes to outside itself.
#[derive(Clone)]
pub struct AdsServices {
    pub database: Arc<dyn CreativeAdsDatabase>,
    pub ad_event_store: Arc<dyn AdEventStore>,
    pub user_model_source: Arc<dyn UserModelSource>,
    pub ads_client: Arc<dyn AdsClient>,
    pub client_state: Arc<dyn ClientState>,
    pub clock: Arc<dyn Clock>,
    pub random: Arc<dyn RandomSource>,
    pub anti_targeting: Arc<AntiTargetingResource>,
}

pub struct Ads {
    config: Arc<AdsConfig>,
    services: AdsServices,
    history: Arc<HistoryManager>,
    serving: Arc<Serving>,
}

/// Optional wiring for [`Ads::with_options`].
#[derive(Default)]
pub struct AdsOptions {
    /// History is recorded only while this holds. Always recorded when absent.
    pub history_precondition: Option<HistoryPrecondition>,
    /// Receives one audit record per serving attempt.
    pub audit_log: Option<Arc<LogManager>>,
}

impl Ads {
    pub fn new(config: AdsConfig, services: AdsServices) -> Result<Self, AdsError> {
        Self::with_options(config, services, AdsOptions::default())
    }

    pub fn with_options(
        config: AdsConfig,
        services: AdsServices,
        options: AdsOptions,
    ) -> Result<Self, AdsError> {
        let config = Arc::new(ConfigManager::new(config)?.config().clone());
        let mut history = HistoryManager::new(
            config.clone(),
            services.client_state.clone(),
            services.clock.clone(),
        );
        if let Some(precondition) = options.history_precondition {
            history = history.with_precondition(precondition);
        }
        let history = Arc::new(history);

        let mut serving = Serving::new(config.clone(), services.clone(), history.clone())?;
        if let Some(audit_log) = options.audit_log {
            serving = serving.with_audit_log(audit_log);
        }
        info!(
            serving_version = config.serving_version,
            platform = ?config.platform,
            "Ads initialised"
        );
        Ok(Self {
            config,
            services,
            history,
            serving: Arc::new(serving),
        })
    }

    pub fn config(&self) -> &AdsConfig {
        &self.config
    }

    pub fn serving(&self) -> &Arc<Serving> {
        &self.serving
    }

    pub fn history(&self) -> &Arc<HistoryManager> {
        &self.history
    }

    /// Arms the serving timer on platforms that serve at regular intervals. Returns the
    /// scheduled time, or `None` when ads are served on external triggers only.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        if !self.config.should_serve_at_regular_intervals() {
            info!("Serving ads on demand");
            return None;
        }
        Some(self.serving.start_serving_ads_at_regular_intervals())
    }

    /// Runs the serving driver until `shutdown` completes.
    pub fn spawn_driver<F>(&self, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.serving.clone().run(shutdown))
    }

    /// Starts the click reminder, seeded with the clicks already in history.
    pub fn spawn_reminder(&self) -> JoinHandle<()> {
        let mut reminder = Reminder::new(
            self.services.ads_client.clone(),
            self.config.remind_user_if_clicking_same_ad_after,
            self.config.history_time_window,
        );
        reminder.seed(&self.history.items());
        reminder.spawn(self.history.subscribe())
    }

    /// Records a user interaction with a shown ad and adds it to history.
    ///
    /// The ad is looked up by placement id in the last served ad, then in history.
    pub async fn trigger_ad_event(
        &self,
        placement_id: &str,
        confirmation_type: ConfirmationType,
    ) -> Result<Option<HistoryItem>, AdsError> {
        let Some(ad) = self.find_ad(placement_id) else {
            warn!(%placement_id, %confirmation_type, "Ad event for unknown placement");
            return Err(AdsError::InvalidAd(format!(
                "unknown placement {placement_id}"
            )));
        };

        let now = self.services.clock.now();
        self.services
            .ad_event_store
            .record_ad_event(AdEvent::new(&ad, confirmation_type, now))
            .await?;
        info!(%placement_id, %confirmation_type, "Triggered ad event");
        Ok(self.history.add(&ad, confirmation_type))
    }

    fn find_ad(&self, placement_id: &str) -> Option<Ad> {
        if let Some(ad) = self.services.client_state.last_served_ad() {
            if ad.placement_id == placement_id {
                return Some(ad);
            }
        }
        self.history
            .items()
            .iter()
            .rev()
            .find(|item| item.ad_content.placement_id == placement_id)
            .map(|item| item.ad_content.to_ad())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::clock::MockClock;
    use crate::config::Platform;
    use crate::eligible_ads::pacing::FixedRandom;
    use crate::error::{ConfigError, ServeAdOutcome};
    use crate::model::adapters::ReminderType;
    use crate::model::CreativeAd;
    use crate::store::{BrowserConditions, InMemoryServices};

    fn harness() -> InMemoryServices {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        InMemoryServices::new(
            vec![
                CreativeAd::notification("ci-1", "cs-1", "untargeted"),
                CreativeAd::notification("ci-2", "cs-2", "untargeted"),
            ],
            BrowserConditions::default(),
            MockClock::new(start),
        )
        .with_random(Arc::new(FixedRandom::new(0.0)))
    }

    async fn serve(ads: &Ads) -> Ad {
        match ads.serving().maybe_serve_ad().await {
            ServeAdOutcome::Served(ad) => ad,
            other => panic!("expected an ad to be served, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = AdsConfig {
            serving_version: 9,
            ..AdsConfig::default()
        };
        let result = Ads::new(config, harness().services());
        assert!(matches!(result, Err(AdsError::Config(ConfigError::Invalid(_)))));
    }

    #[tokio::test]
    async fn click_is_recorded_and_added_to_history() {
        let harness = harness();
        let ads = Ads::new(AdsConfig::default(), harness.services()).unwrap();
        let ad = serve(&ads).await;

        let item = ads
            .trigger_ad_event(&ad.placement_id, ConfirmationType::Clicked)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.ad_content.confirmation_type, ConfirmationType::Clicked);

        let events = harness.ad_event_store.all();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].confirmation_type, ConfirmationType::Clicked);
        assert_eq!(ads.history().items().len(), 2);
    }

    #[tokio::test]
    async fn older_placements_are_found_in_history() {
        let harness = harness();
        let ads = Ads::new(AdsConfig::default(), harness.services()).unwrap();
        let first = serve(&ads).await;
        harness.clock.advance(TimeDelta::minutes(10));
        let second = serve(&ads).await;
        assert_ne!(first.placement_id, second.placement_id);

        ads.trigger_ad_event(&first.placement_id, ConfirmationType::Dismissed)
            .await
            .unwrap();
        let dismissed = harness.ad_event_store.all().pop().unwrap();
        assert_eq!(dismissed.placement_id, first.placement_id);
        assert_eq!(dismissed.creative_instance_id, first.creative_instance_id);
    }

    #[tokio::test]
    async fn unknown_placement_is_rejected() {
        let harness = harness();
        let ads = Ads::new(AdsConfig::default(), harness.services()).unwrap();

        let result = ads
            .trigger_ad_event("no-such-placement", ConfirmationType::Clicked)
            .await;
        assert!(matches!(result, Err(AdsError::InvalidAd(_))));
        assert!(harness.ad_event_store.all().is_empty());
    }

    #[tokio::test]
    async fn failed_precondition_skips_history_but_records_event() {
        let harness = harness();
        let options = AdsOptions {
            history_precondition: Some(Arc::new(|| false)),
            ..AdsOptions::default()
        };
        let ads = Ads::with_options(AdsConfig::default(), harness.services(), options).unwrap();
        // Nothing reaches history, so the ad can only be found as the last served ad.
        let ad = serve(&ads).await;

        let item = ads
            .trigger_ad_event(&ad.placement_id, ConfirmationType::Viewed)
            .await
            .unwrap();
        assert!(item.is_none());
        assert!(ads.history().items().is_empty());
        assert_eq!(harness.ad_event_store.all().len(), 2);
    }

    #[tokio::test]
    async fn reminder_fires_on_third_click() {
        let harness = harness();
        let ads = Ads::new(AdsConfig::default(), harness.services()).unwrap();
        let _reminder = ads.spawn_reminder();
        let ad = serve(&ads).await;

        for _ in 0..3 {
            ads.trigger_ad_event(&ad.placement_id, ConfirmationType::Clicked)
                .await
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while harness.ads_client.reminders().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("reminder should fire");
        assert_eq!(
            harness.ads_client.reminders(),
            vec![ReminderType::ClickedSameAdMultipleTimes]
        );
    }

    #[tokio::test]
    async fn start_depends_on_platform() {
        let desktop = Ads::new(AdsConfig::default(), harness().services()).unwrap();
        assert_eq!(desktop.start(), None);

        let harness = harness();
        let config = AdsConfig {
            platform: Platform::Android,
            ..AdsConfig::default()
        };
        let mobile = Ads::new(config, harness.services()).unwrap();
        assert_eq!(
            mobile.start(),
            Some(harness.clock.now() + TimeDelta::minutes(2))
        );
    }
}
