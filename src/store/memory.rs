//! In-memory collaborators used by the simulator and the test suite.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ads::AdsServices;
use crate::clock::{Clock, MockClock};
use crate::eligible_ads::pacing::{RandomSource, ThreadRandom};
use crate::eligible_ads::segments::matches_segment;
use crate::error::AdsError;
use crate::frequency_capping::exclusion_rules::AntiTargetingResource;
use crate::model::adapters::{
    AdEventStore, AdsClient, ClientState, CreativeAdsDatabase, ReminderType, UserModelSource,
};
use crate::model::{
    Ad, AdEvent, AdType, ConfirmationType, CreativeAd, HistoryItem, Reactions,
    SubdivisionSettings, UserModel,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
pub struct InMemoryAdsDatabase {
    creative_ads: Mutex<Vec<CreativeAd>>,
    unavailable: AtomicBool,
    queries: AtomicUsize,
}

impl InMemoryAdsDatabase {
    pub fn new(creative_ads: Vec<CreativeAd>) -> Self {
        Self {
            creative_ads: Mutex::new(creative_ads),
            ..Self::default()
        }
    }

    pub fn replace(&self, creative_ads: Vec<CreativeAd>) {
        *lock(&self.creative_ads) = creative_ads;
    }

    /// Makes every following query fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CreativeAdsDatabase for InMemoryAdsDatabase {
    async fn get_creative_ads(
        &self,
        ad_type: AdType,
        segments: &BTreeSet<String>,
    ) -> Result<Vec<CreativeAd>, AdsError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdsError::Database("creative ads table unavailable".to_string()));
        }
        Ok(lock(&self.creative_ads)
            .iter()
            .filter(|creative_ad| creative_ad.ad_type == ad_type)
            .filter(|creative_ad| {
                segments
                    .iter()
                    .any(|segment| matches_segment(segment, &creative_ad.segment))
            })
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAdEventStore {
    ad_events: Mutex<Vec<AdEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryAdEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<AdEvent> {
        lock(&self.ad_events).clone()
    }

    /// Appends without going through the async interface, for seeding history.
    pub fn push(&self, ad_event: AdEvent) {
        lock(&self.ad_events).push(ad_event);
    }
}

#[async_trait]
impl AdEventStore for InMemoryAdEventStore {
    async fn get_ad_events(
        &self,
        ad_type: Option<AdType>,
        confirmation_type: Option<ConfirmationType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AdEvent>, AdsError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdsError::Database("ad events table unavailable".to_string()));
        }
        Ok(lock(&self.ad_events)
            .iter()
            .filter(|event| ad_type.map_or(true, |ad_type| event.ad_type == ad_type))
            .filter(|event| {
                confirmation_type.map_or(true, |confirmation_type| {
                    event.confirmation_type == confirmation_type
                })
            })
            .filter(|event| since.map_or(true, |since| event.created_at >= since))
            .cloned()
            .collect())
    }

    async fn record_ad_event(&self, ad_event: AdEvent) -> Result<(), AdsError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdsError::Database("ad events table unavailable".to_string()));
        }
        self.push(ad_event);
        Ok(())
    }
}

/// Returns the same user model on every attempt; tests swap it between attempts.
#[derive(Debug, Default)]
pub struct StaticUserModelSource {
    user_model: Mutex<UserModel>,
}

impl StaticUserModelSource {
    pub fn new(user_model: UserModel) -> Self {
        Self {
            user_model: Mutex::new(user_model),
        }
    }

    pub fn set(&self, user_model: UserModel) {
        *lock(&self.user_model) = user_model;
    }
}

#[async_trait]
impl UserModelSource for StaticUserModelSource {
    async fn build_user_model(&self) -> UserModel {
        lock(&self.user_model).clone()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
struct ClientStateData {
    history_items: Vec<HistoryItem>,
    reactions: Reactions,
    seen_ads: HashMap<AdType, BTreeSet<String>>,
    last_served_ad: Option<Ad>,
    serve_ad_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct InMemoryClientState {
    data: Mutex<ClientStateData>,
}

impl InMemoryClientState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialises the whole state, as the browser would persist it to disk.
    pub fn to_json(&self) -> Result<String, AdsError> {
        Ok(serde_json::to_string(&*lock(&self.data))?)
    }

    pub fn from_json(json: &str) -> Result<Self, AdsError> {
        let data: ClientStateData = serde_json::from_str(json)?;
        Ok(Self {
            data: Mutex::new(data),
        })
    }
}

impl ClientState for InMemoryClientState {
    fn history_items(&self) -> Vec<HistoryItem> {
        lock(&self.data).history_items.clone()
    }

    fn set_history_items(&self, items: Vec<HistoryItem>) {
        lock(&self.data).history_items = items;
    }

    fn reactions(&self) -> Reactions {
        lock(&self.data).reactions.clone()
    }

    fn set_reactions(&self, reactions: Reactions) {
        lock(&self.data).reactions = reactions;
    }

    fn seen_ads(&self, ad_type: AdType) -> BTreeSet<String> {
        lock(&self.data)
            .seen_ads
            .get(&ad_type)
            .cloned()
            .unwrap_or_default()
    }

    fn mark_ad_as_seen(&self, ad_type: AdType, creative_instance_id: &str) {
        lock(&self.data)
            .seen_ads
            .entry(ad_type)
            .or_default()
            .insert(creative_instance_id.to_string());
    }

    fn reset_seen_ads(&self, ad_type: AdType) {
        lock(&self.data).seen_ads.remove(&ad_type);
    }

    fn last_served_ad(&self) -> Option<Ad> {
        lock(&self.data).last_served_ad.clone()
    }

    fn set_last_served_ad(&self, ad: &Ad) {
        lock(&self.data).last_served_ad = Some(ad.clone());
    }

    fn serve_ad_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.data).serve_ad_at
    }

    fn set_serve_ad_at(&self, serve_ad_at: Option<DateTime<Utc>>) {
        lock(&self.data).serve_ad_at = serve_ad_at;
    }
}

/// Browser conditions and preferences as seen by [`SimulatedAdsClient`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BrowserConditions {
    pub can_show_notification_ads: bool,
    pub network_connection_available: bool,
    pub full_screen: bool,
    pub browser_active: bool,
    pub media_playing: bool,
    pub browser_major_version: u32,
    pub unblinded_tokens: usize,
    pub user_activity_score: f64,
    pub catalog_last_updated_at: Option<DateTime<Utc>>,
    pub browsing_history: Vec<String>,
    pub subdivision: SubdivisionSettings,
    pub maximum_ads_per_hour: u32,
    pub maximum_ads_per_day: u32,
}

impl Default for BrowserConditions {
    fn default() -> Self {
        Self {
            can_show_notification_ads: true,
            network_connection_available: true,
            full_screen: false,
            browser_active: true,
            media_playing: false,
            browser_major_version: 120,
            unblinded_tokens: 50,
            user_activity_score: 1.0,
            catalog_last_updated_at: None,
            browsing_history: Vec::new(),
            subdivision: SubdivisionSettings::default(),
            maximum_ads_per_hour: 10,
            maximum_ads_per_day: 100,
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedAdsClient {
    conditions: Mutex<BrowserConditions>,
    refill_requests: AtomicUsize,
    reminders: Mutex<Vec<ReminderType>>,
}

impl SimulatedAdsClient {
    pub fn new(conditions: BrowserConditions) -> Self {
        Self {
            conditions: Mutex::new(conditions),
            ..Self::default()
        }
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut BrowserConditions),
    {
        f(&mut lock(&self.conditions));
    }

    pub fn conditions(&self) -> BrowserConditions {
        lock(&self.conditions).clone()
    }

    pub fn refill_requests(&self) -> usize {
        self.refill_requests.load(Ordering::SeqCst)
    }

    pub fn reminders(&self) -> Vec<ReminderType> {
        lock(&self.reminders).clone()
    }
}

impl AdsClient for SimulatedAdsClient {
    fn can_show_notification_ads(&self) -> bool {
        lock(&self.conditions).can_show_notification_ads
    }

    fn is_network_connection_available(&self) -> bool {
        lock(&self.conditions).network_connection_available
    }

    fn is_browser_in_full_screen_mode(&self) -> bool {
        lock(&self.conditions).full_screen
    }

    fn is_browser_active(&self) -> bool {
        lock(&self.conditions).browser_active
    }

    fn is_media_playing(&self) -> bool {
        lock(&self.conditions).media_playing
    }

    fn browser_major_version(&self) -> u32 {
        lock(&self.conditions).browser_major_version
    }

    fn unblinded_token_count(&self) -> usize {
        lock(&self.conditions).unblinded_tokens
    }

    fn refill_unblinded_tokens(&self) {
        self.refill_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn user_activity_score(&self) -> f64 {
        lock(&self.conditions).user_activity_score
    }

    fn catalog_last_updated_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.conditions).catalog_last_updated_at
    }

    fn browsing_history(&self) -> Vec<String> {
        lock(&self.conditions).browsing_history.clone()
    }

    fn subdivision_settings(&self) -> SubdivisionSettings {
        lock(&self.conditions).subdivision.clone()
    }

    fn maximum_notification_ads_per_hour(&self) -> u32 {
        lock(&self.conditions).maximum_ads_per_hour
    }

    fn maximum_notification_ads_per_day(&self) -> u32 {
        lock(&self.conditions).maximum_ads_per_day
    }

    fn show_reminder(&self, reminder_type: ReminderType) {
        lock(&self.reminders).push(reminder_type);
    }
}

/// Concrete in-memory collaborators on a mock clock, wired together for tests and the
/// simulator.
pub struct InMemoryServices {
    pub database: Arc<InMemoryAdsDatabase>,
    pub ad_event_store: Arc<InMemoryAdEventStore>,
    pub user_model_source: Arc<StaticUserModelSource>,
    pub ads_client: Arc<SimulatedAdsClient>,
    pub client_state: Arc<InMemoryClientState>,
    pub clock: Arc<MockClock>,
    pub random: Arc<dyn RandomSource>,
    pub anti_targeting: Arc<AntiTargetingResource>,
}

impl InMemoryServices {
    /// The catalog is considered fresh as of the clock's current time.
    pub fn new(creative_ads: Vec<CreativeAd>, conditions: BrowserConditions, clock: MockClock) -> Self {
        let now = clock.now();
        let ads_client = SimulatedAdsClient::new(conditions);
        ads_client.update(|c| {
            c.catalog_last_updated_at.get_or_insert(now);
        });
        Self {
            database: Arc::new(InMemoryAdsDatabase::new(creative_ads)),
            ad_event_store: Arc::new(InMemoryAdEventStore::new()),
            user_model_source: Arc::new(StaticUserModelSource::default()),
            ads_client: Arc::new(ads_client),
            client_state: Arc::new(InMemoryClientState::new()),
            clock: Arc::new(clock),
            random: Arc::new(ThreadRandom),
            anti_targeting: Arc::new(AntiTargetingResource::default()),
        }
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn with_anti_targeting(mut self, anti_targeting: AntiTargetingResource) -> Self {
        self.anti_targeting = Arc::new(anti_targeting);
        self
    }

    pub fn services(&self) -> AdsServices {
        AdsServices {
            database: self.database.clone(),
            ad_event_store: self.ad_event_store.clone(),
            user_model_source: self.user_model_source.clone(),
            ads_client: self.ads_client.clone(),
            client_state: self.client_state.clone(),
            clock: self.clock.clone(),
            random: self.random.clone(),
            anti_targeting: self.anti_targeting.clone(),
        }
    }
}
