use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ad::Ad;
use crate::model::ad_event::ConfirmationType;
use crate::model::creative_ad::AdType;

/// Three-state reaction used for both ads (per advertiser) and categories (per segment).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    #[default]
    Neutral,
    Liked,
    Disliked,
}

impl ReactionType {
    /// Selecting `Liked` twice returns to `Neutral`; selecting it from `Disliked` replaces
    /// the dislike.
    pub fn toggle_like(self) -> Self {
        match self {
            ReactionType::Liked => ReactionType::Neutral,
            _ => ReactionType::Liked,
        }
    }

    pub fn toggle_dislike(self) -> Self {
        match self {
            ReactionType::Disliked => ReactionType::Neutral,
            _ => ReactionType::Disliked,
        }
    }
}

/// Denormalised ad plus the user's reaction state at the time the item was recorded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdContent {
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
    pub confirmation_type: ConfirmationType,
    #[serde(default)]
    pub user_reaction_type: ReactionType,
    #[serde(default)]
    pub is_saved: bool,
    #[serde(default)]
    pub is_flagged: bool,
}

impl AdContent {
    pub fn from_ad(ad: &Ad, confirmation_type: ConfirmationType) -> Self {
        Self {
            ad_type: ad.ad_type,
            placement_id: ad.placement_id.clone(),
            creative_instance_id: ad.creative_instance_id.clone(),
            creative_set_id: ad.creative_set_id.clone(),
            campaign_id: ad.campaign_id.clone(),
            advertiser_id: ad.advertiser_id.clone(),
            segment: ad.segment.clone(),
            title: ad.title.clone(),
            body: ad.body.clone(),
            target_url: ad.target_url.clone(),
            confirmation_type,
            user_reaction_type: ReactionType::Neutral,
            is_saved: false,
            is_flagged: false,
        }
    }

    /// The shown ad this content was recorded for.
    pub fn to_ad(&self) -> Ad {
        Ad {
            ad_type: self.ad_type,
            placement_id: self.placement_id.clone(),
            creative_instance_id: self.creative_instance_id.clone(),
            creative_set_id: self.creative_set_id.clone(),
            campaign_id: self.campaign_id.clone(),
            advertiser_id: self.advertiser_id.clone(),
            segment: self.segment.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            target_url: self.target_url.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CategoryContent {
    pub category: String,
    #[serde(default)]
    pub user_reaction_type: ReactionType,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub created_at: DateTime<Utc>,
    pub ad_content: AdContent,
    pub category_content: CategoryContent,
}

/// Persisted reaction lists read by the exclusion rules.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Reactions {
    /// Keyed by advertiser id.
    pub ads: BTreeMap<String, ReactionType>,
    /// Keyed by segment.
    pub categories: BTreeMap<String, ReactionType>,
    /// Creative instance ids.
    pub saved_ads: BTreeSet<String>,
    /// Creative set ids.
    pub flagged_ads: BTreeSet<String>,
}

impl Reactions {
    pub fn ad_reaction(&self, advertiser_id: &str) -> ReactionType {
        self.ads.get(advertiser_id).copied().unwrap_or_default()
    }

    pub fn category_reaction(&self, segment: &str) -> ReactionType {
        self.categories.get(segment).copied().unwrap_or_default()
    }

    pub fn is_advertiser_disliked(&self, advertiser_id: &str) -> bool {
        self.ad_reaction(advertiser_id) == ReactionType::Disliked
    }

    pub fn is_category_disliked(&self, segment: &str) -> bool {
        self.category_reaction(segment) == ReactionType::Disliked
    }

    pub fn is_saved(&self, creative_instance_id: &str) -> bool {
        self.saved_ads.contains(creative_instance_id)
    }

    pub fn is_flagged(&self, creative_set_id: &str) -> bool {
        self.flagged_ads.contains(creative_set_id)
    }

    pub(crate) fn set_ad_reaction(&mut self, advertiser_id: &str, reaction: ReactionType) {
        if reaction == ReactionType::Neutral {
            self.ads.remove(advertiser_id);
        } else {
            self.ads.insert(advertiser_id.to_string(), reaction);
        }
    }

    pub(crate) fn set_category_reaction(&mut self, segment: &str, reaction: ReactionType) {
        if reaction == ReactionType::Neutral {
            self.categories.remove(segment);
        } else {
            self.categories.insert(segment.to_string(), reaction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_and_dislike_are_mutually_exclusive_toggles() {
        let reaction = ReactionType::Neutral.toggle_like();
        assert_eq!(reaction, ReactionType::Liked);
        assert_eq!(reaction.toggle_like(), ReactionType::Neutral);
        assert_eq!(reaction.toggle_dislike(), ReactionType::Disliked);
        assert_eq!(ReactionType::Disliked.toggle_dislike(), ReactionType::Neutral);
        assert_eq!(ReactionType::Disliked.toggle_like(), ReactionType::Liked);
    }

    #[test]
    fn neutral_reactions_are_not_persisted() {
        let mut reactions = Reactions::default();
        reactions.set_ad_reaction("advertiser-1", ReactionType::Disliked);
        assert!(reactions.is_advertiser_disliked("advertiser-1"));
        reactions.set_ad_reaction("advertiser-1", ReactionType::Neutral);
        assert!(reactions.ads.is_empty());
    }
}
