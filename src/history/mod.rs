//! Rolling history of shown and interacted-with ads, and the user's reactions to them.
//!
//! Every change is published on a broadcast channel; the reminder and any reward
//! component subscribe to it.

pub mod reminder;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{AdsConfig, ReactionNotifyPolicy};
use crate::frequency_capping::to_time_delta;
use crate::model::adapters::ClientState;
use crate::model::{
    Ad, AdContent, CategoryContent, ConfirmationType, HistoryItem, ReactionType,
};

pub use reminder::Reminder;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Like,
    Dislike,
}

impl Toggle {
    fn apply(self, reaction: ReactionType) -> ReactionType {
        match self {
            Toggle::Like => reaction.toggle_like(),
            Toggle::Dislike => reaction.toggle_dislike(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEvent {
    DidAddHistory(HistoryItem),
    DidLikeAd(AdContent),
    DidDislikeAd(AdContent),
    DidSaveAd(AdContent),
    DidMarkAdAsInappropriate(AdContent),
    DidLikeCategory(CategoryContent),
    DidDislikeCategory(CategoryContent),
}

/// Decides whether history may be recorded at all, e.g. whether the user joined
/// rewards.
pub type HistoryPrecondition = Arc<dyn Fn() -> bool + Send + Sync>;

pub struct HistoryManager {
    config: Arc<AdsConfig>,
    client_state: Arc<dyn ClientState>,
    clock: Arc<dyn Clock>,
    precondition: HistoryPrecondition,
    sender: broadcast::Sender<HistoryEvent>,
}

impl HistoryManager {
    pub fn new(config: Arc<AdsConfig>, client_state: Arc<dyn ClientState>, clock: Arc<dyn Clock>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            config,
            client_state,
            clock,
            precondition: Arc::new(|| true),
            sender,
        }
    }

    pub fn with_precondition(mut self, precondition: HistoryPrecondition) -> Self {
        self.precondition = precondition;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.sender.subscribe()
    }

    pub fn items(&self) -> Vec<HistoryItem> {
        self.client_state.history_items()
    }

    /// Appends a history item carrying the current reaction state, purging items that
    /// have fallen out of the history window. Returns `None` when the precondition
    /// rejects recording.
    pub fn add(&self, ad: &Ad, confirmation_type: ConfirmationType) -> Option<HistoryItem> {
        if !(self.precondition)() {
            debug!(placement_id = %ad.placement_id, "History precondition not met");
            return None;
        }

        let now = self.clock.now();
        let reactions = self.client_state.reactions();
        let mut ad_content = AdContent::from_ad(ad, confirmation_type);
        ad_content.user_reaction_type = reactions.ad_reaction(&ad.advertiser_id);
        ad_content.is_saved = reactions.is_saved(&ad.creative_instance_id);
        ad_content.is_flagged = reactions.is_flagged(&ad.creative_set_id);
        let item = HistoryItem {
            created_at: now,
            ad_content,
            category_content: CategoryContent {
                category: ad.segment.clone(),
                user_reaction_type: reactions.category_reaction(&ad.segment),
            },
        };

        let mut items = self.client_state.history_items();
        items.push(item.clone());
        let cutoff = now - to_time_delta(self.config.history_time_window);
        let before = items.len();
        items.retain(|item| item.created_at > cutoff);
        if items.len() < before {
            debug!(purged = before - items.len(), "Purged expired history items");
        }
        self.client_state.set_history_items(items);

        info!(
            placement_id = %ad.placement_id,
            confirmation_type = %confirmation_type,
            "Added history item"
        );
        self.notify(HistoryEvent::DidAddHistory(item.clone()));
        Some(item)
    }

    /// Toggles a like for the ad's advertiser. Returns the new reaction.
    pub fn like_ad(&self, ad_content: &AdContent) -> ReactionType {
        self.toggle_ad_reaction(ad_content, Toggle::Like)
    }

    /// Toggles a dislike for the ad's advertiser. Returns the new reaction.
    pub fn dislike_ad(&self, ad_content: &AdContent) -> ReactionType {
        self.toggle_ad_reaction(ad_content, Toggle::Dislike)
    }

    pub fn like_category(&self, category_content: &CategoryContent) -> ReactionType {
        self.toggle_category_reaction(category_content, Toggle::Like)
    }

    pub fn dislike_category(&self, category_content: &CategoryContent) -> ReactionType {
        self.toggle_category_reaction(category_content, Toggle::Dislike)
    }

    /// Returns whether the ad is saved afterwards.
    pub fn toggle_save_ad(&self, ad_content: &AdContent) -> bool {
        let mut reactions = self.client_state.reactions();
        let is_saved = !reactions.is_saved(&ad_content.creative_instance_id);
        if is_saved {
            reactions.saved_ads.insert(ad_content.creative_instance_id.clone());
        } else {
            reactions.saved_ads.remove(&ad_content.creative_instance_id);
        }
        self.client_state.set_reactions(reactions);

        let updated = self.update_ad_content(
            |content| content.creative_instance_id == ad_content.creative_instance_id,
            |content| content.is_saved = is_saved,
            ad_content,
        );
        info!(creative_instance_id = %ad_content.creative_instance_id, is_saved, "Toggled saved ad");
        if self.should_notify(is_saved) {
            self.notify(HistoryEvent::DidSaveAd(updated));
        }
        is_saved
    }

    /// Returns whether the ad's creative set is flagged afterwards.
    pub fn toggle_mark_ad_as_inappropriate(&self, ad_content: &AdContent) -> bool {
        let mut reactions = self.client_state.reactions();
        let is_flagged = !reactions.is_flagged(&ad_content.creative_set_id);
        if is_flagged {
            reactions.flagged_ads.insert(ad_content.creative_set_id.clone());
        } else {
            reactions.flagged_ads.remove(&ad_content.creative_set_id);
        }
        self.client_state.set_reactions(reactions);

        let updated = self.update_ad_content(
            |content| content.creative_set_id == ad_content.creative_set_id,
            |content| content.is_flagged = is_flagged,
            ad_content,
        );
        info!(creative_set_id = %ad_content.creative_set_id, is_flagged, "Toggled inappropriate ad");
        if self.should_notify(is_flagged) {
            self.notify(HistoryEvent::DidMarkAdAsInappropriate(updated));
        }
        is_flagged
    }

    fn toggle_ad_reaction(
        &self,
        ad_content: &AdContent,
        toggle: Toggle,
    ) -> ReactionType {
        let mut reactions = self.client_state.reactions();
        let reaction = toggle.apply(reactions.ad_reaction(&ad_content.advertiser_id));
        reactions.set_ad_reaction(&ad_content.advertiser_id, reaction);
        self.client_state.set_reactions(reactions);

        let updated = self.update_ad_content(
            |content| content.advertiser_id == ad_content.advertiser_id,
            |content| content.user_reaction_type = reaction,
            ad_content,
        );
        info!(advertiser_id = %ad_content.advertiser_id, ?reaction, "Toggled ad reaction");

        let event = match toggle {
            Toggle::Like => HistoryEvent::DidLikeAd(updated),
            Toggle::Dislike => HistoryEvent::DidDislikeAd(updated),
        };
        if self.should_notify(reaction != ReactionType::Neutral) {
            self.notify(event);
        }
        reaction
    }

    fn toggle_category_reaction(
        &self,
        category_content: &CategoryContent,
        toggle: Toggle,
    ) -> ReactionType {
        let mut reactions = self.client_state.reactions();
        let reaction = toggle.apply(reactions.category_reaction(&category_content.category));
        reactions.set_category_reaction(&category_content.category, reaction);
        self.client_state.set_reactions(reactions);

        let mut items = self.client_state.history_items();
        for item in items
            .iter_mut()
            .filter(|item| item.category_content.category == category_content.category)
        {
            item.category_content.user_reaction_type = reaction;
        }
        self.client_state.set_history_items(items);
        info!(category = %category_content.category, ?reaction, "Toggled category reaction");

        let updated = CategoryContent {
            category: category_content.category.clone(),
            user_reaction_type: reaction,
        };
        let event = match toggle {
            Toggle::Like => HistoryEvent::DidLikeCategory(updated),
            Toggle::Dislike => HistoryEvent::DidDislikeCategory(updated),
        };
        if self.should_notify(reaction != ReactionType::Neutral) {
            self.notify(event);
        }
        reaction
    }

    /// Applies `update` to every stored item selected by `matches` and returns the
    /// updated content for the newest match, falling back to `ad_content` itself.
    fn update_ad_content<M, U>(&self, matches: M, update: U, ad_content: &AdContent) -> AdContent
    where
        M: Fn(&AdContent) -> bool,
        U: Fn(&mut AdContent),
    {
        let mut items = self.client_state.history_items();
        for item in items.iter_mut().filter(|item| matches(&item.ad_content)) {
            update(&mut item.ad_content);
        }
        let latest = items
            .iter()
            .rev()
            .find(|item| item.ad_content.placement_id == ad_content.placement_id)
            .map(|item| item.ad_content.clone());
        self.client_state.set_history_items(items);

        latest.unwrap_or_else(|| {
            let mut content = ad_content.clone();
            update(&mut content);
            content
        })
    }

    fn should_notify(&self, is_positive: bool) -> bool {
        match self.config.reaction_notify_policy {
            ReactionNotifyPolicy::EveryChange => true,
            ReactionNotifyPolicy::PositiveOnly => is_positive,
        }
    }

    fn notify(&self, event: HistoryEvent) {
        if self.sender.send(event).is_err() {
            debug!("No history observers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::model::CreativeAd;
    use crate::store::InMemoryClientState;
    use chrono::{TimeDelta, TimeZone, Utc};

    struct Fixture {
        clock: Arc<MockClock>,
        client_state: Arc<InMemoryClientState>,
        history: HistoryManager,
    }

    fn fixture(policy: ReactionNotifyPolicy) -> Fixture {
        let clock = Arc::new(MockClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
        let client_state = Arc::new(InMemoryClientState::new());
        let config = AdsConfig {
            reaction_notify_policy: policy,
            ..AdsConfig::default()
        };
        let history = HistoryManager::new(Arc::new(config), client_state.clone(), clock.clone());
        Fixture {
            clock,
            client_state,
            history,
        }
    }

    fn ad(creative_instance_id: &str) -> Ad {
        Ad::build(&CreativeAd::notification(creative_instance_id, "cs-1", "finance-banking"))
    }

    #[test]
    fn add_records_item_and_notifies() {
        let fixture = fixture(ReactionNotifyPolicy::EveryChange);
        let mut events = fixture.history.subscribe();
        let item = fixture
            .history
            .add(&ad("ci-1"), ConfirmationType::Viewed)
            .unwrap();
        assert_eq!(item.category_content.category, "finance-banking");
        assert_eq!(fixture.history.items(), vec![item.clone()]);
        assert_eq!(events.try_recv().unwrap(), HistoryEvent::DidAddHistory(item));
    }

    #[test]
    fn precondition_blocks_recording() {
        let fixture = fixture(ReactionNotifyPolicy::EveryChange);
        let history = fixture.history.with_precondition(Arc::new(|| false));
        assert!(history.add(&ad("ci-1"), ConfirmationType::Viewed).is_none());
        assert!(history.items().is_empty());
    }

    #[test]
    fn expired_items_are_purged_on_append() {
        let fixture = fixture(ReactionNotifyPolicy::EveryChange);
        fixture.history.add(&ad("ci-1"), ConfirmationType::Viewed);
        fixture.clock.advance(TimeDelta::days(31));
        fixture.history.add(&ad("ci-2"), ConfirmationType::Viewed);
        let items = fixture.history.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].ad_content.creative_instance_id, "ci-2");
    }

    #[test]
    fn like_and_dislike_toggle_through_neutral() {
        let fixture = fixture(ReactionNotifyPolicy::EveryChange);
        let item = fixture.history.add(&ad("ci-1"), ConfirmationType::Viewed).unwrap();
        let content = &item.ad_content;

        assert_eq!(fixture.history.like_ad(content), ReactionType::Liked);
        assert_eq!(fixture.history.dislike_ad(content), ReactionType::Disliked);
        assert!(fixture
            .client_state
            .reactions()
            .is_advertiser_disliked(&content.advertiser_id));
        assert_eq!(
            fixture.history.items()[0].ad_content.user_reaction_type,
            ReactionType::Disliked
        );
        assert_eq!(fixture.history.dislike_ad(content), ReactionType::Neutral);
        assert!(fixture.client_state.reactions().ads.is_empty());
    }

    #[test]
    fn save_and_flag_are_boolean_toggles() {
        let fixture = fixture(ReactionNotifyPolicy::EveryChange);
        let item = fixture.history.add(&ad("ci-1"), ConfirmationType::Viewed).unwrap();
        let content = &item.ad_content;

        assert!(fixture.history.toggle_save_ad(content));
        assert!(fixture.history.items()[0].ad_content.is_saved);
        assert!(!fixture.history.toggle_save_ad(content));

        assert!(fixture.history.toggle_mark_ad_as_inappropriate(content));
        assert!(fixture.client_state.reactions().is_flagged("cs-1"));
        // Later items pick up the flag.
        let next = fixture.history.add(&ad("ci-2"), ConfirmationType::Served).unwrap();
        assert!(next.ad_content.is_flagged);
    }

    #[test]
    fn category_dislike_feeds_reactions() {
        let fixture = fixture(ReactionNotifyPolicy::EveryChange);
        let item = fixture.history.add(&ad("ci-1"), ConfirmationType::Viewed).unwrap();
        assert_eq!(
            fixture.history.dislike_category(&item.category_content),
            ReactionType::Disliked
        );
        assert!(fixture
            .client_state
            .reactions()
            .is_category_disliked("finance-banking"));
        assert_eq!(
            fixture.history.like_category(&item.category_content),
            ReactionType::Liked
        );
    }

    #[test]
    fn every_change_policy_notifies_toggle_off() {
        let fixture = fixture(ReactionNotifyPolicy::EveryChange);
        let item = fixture.history.add(&ad("ci-1"), ConfirmationType::Viewed).unwrap();
        let mut events = fixture.history.subscribe();

        fixture.history.like_ad(&item.ad_content);
        fixture.history.like_ad(&item.ad_content);
        let first = events.try_recv().unwrap();
        let second = events.try_recv().unwrap();
        assert!(matches!(first, HistoryEvent::DidLikeAd(c) if c.user_reaction_type == ReactionType::Liked));
        assert!(matches!(second, HistoryEvent::DidLikeAd(c) if c.user_reaction_type == ReactionType::Neutral));
    }

    #[test]
    fn positive_only_policy_skips_toggle_off() {
        let fixture = fixture(ReactionNotifyPolicy::PositiveOnly);
        let item = fixture.history.add(&ad("ci-1"), ConfirmationType::Viewed).unwrap();
        let mut events = fixture.history.subscribe();

        fixture.history.toggle_save_ad(&item.ad_content);
        fixture.history.toggle_save_ad(&item.ad_content);
        assert!(matches!(events.try_recv().unwrap(), HistoryEvent::DidSaveAd(c) if c.is_saved));
        assert!(events.try_recv().is_err());
    }
}
