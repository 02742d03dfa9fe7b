//! Per-creative exclusion rules.
//!
//! Each rule answers whether a candidate may stay in the eligible set and explains why
//! not. [`ExclusionRules`] runs all of them and remembers, per rule, which cache keys
//! (campaign, creative set, ...) were already excluded so siblings sharing the key are
//! dropped without re-evaluation.

mod anti_targeting;
mod caps;
mod conversion;
mod daypart;
mod dismissed;
mod embedding;
mod reactions;
mod subdivision_targeting;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::debug;

use crate::config::AdsConfig;
use crate::model::{AdEvent, CreativeAd, Reactions, SubdivisionSettings};

pub use anti_targeting::{AntiTargetingExclusionRule, AntiTargetingResource};
pub use caps::{
    DailyCapExclusionRule, PerDayExclusionRule, PerMonthExclusionRule, PerWeekExclusionRule,
    TotalMaxExclusionRule,
};
pub use conversion::{ConversionExclusionRule, TransferredExclusionRule};
pub use daypart::DaypartExclusionRule;
pub use dismissed::DismissedExclusionRule;
pub use embedding::EmbeddingExclusionRule;
pub use reactions::{
    DislikeExclusionRule, MarkedAsInappropriateExclusionRule,
    MarkedToNoLongerReceiveExclusionRule,
};
pub use subdivision_targeting::SubdivisionTargetingExclusionRule;

pub trait ExclusionRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Key whose exclusion also excludes every other candidate sharing it.
    fn cache_key(&self, creative_ad: &CreativeAd) -> String;

    /// `Err` carries the reason the candidate was excluded.
    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String>;
}

/// Everything the rules read, snapshotted once per serving attempt.
#[derive(Debug, Clone)]
pub struct ExclusionContext {
    pub now: DateTime<Utc>,
    pub local_now: DateTime<FixedOffset>,
    pub ad_events: Arc<[AdEvent]>,
    pub reactions: Reactions,
    pub browsing_history: Vec<String>,
    pub subdivision: SubdivisionSettings,
    pub anti_targeting: Arc<AntiTargetingResource>,
}

/// **Ordered set of exclusion rules with a shared exclusion cache**
pub struct ExclusionRules {
    rules: Vec<Box<dyn ExclusionRule>>,
    excluded_keys: HashSet<(&'static str, String)>,
    excluded_counts: BTreeMap<&'static str, usize>,
}

impl ExclusionRules {
    pub fn new(rules: Vec<Box<dyn ExclusionRule>>) -> Self {
        Self {
            rules,
            excluded_keys: HashSet::new(),
            excluded_counts: BTreeMap::new(),
        }
    }

    /// The standard rule set. `require_embedding` adds the embedding rule used by the
    /// embedding-based serving version.
    pub fn standard(context: &ExclusionContext, config: &AdsConfig, require_embedding: bool) -> Self {
        let mut rules: Vec<Box<dyn ExclusionRule>> = vec![
            Box::new(AntiTargetingExclusionRule::new(
                context.anti_targeting.clone(),
                context.browsing_history.clone(),
            )),
            Box::new(ConversionExclusionRule::new(
                context.ad_events.clone(),
                context.now,
                config.conversion_window,
            )),
            Box::new(DailyCapExclusionRule::new(context.ad_events.clone(), context.now)),
            Box::new(DaypartExclusionRule::new(context.local_now)),
            Box::new(DislikeExclusionRule::new(context.reactions.clone())),
            Box::new(DismissedExclusionRule::new(
                context.ad_events.clone(),
                context.now,
                config.dismissed_window,
                config.dismissed_cap,
            )),
            Box::new(MarkedAsInappropriateExclusionRule::new(context.reactions.clone())),
            Box::new(MarkedToNoLongerReceiveExclusionRule::new(context.reactions.clone())),
            Box::new(PerDayExclusionRule::new(context.ad_events.clone(), context.now)),
            Box::new(PerWeekExclusionRule::new(context.ad_events.clone(), context.now)),
            Box::new(PerMonthExclusionRule::new(context.ad_events.clone(), context.now)),
            Box::new(SubdivisionTargetingExclusionRule::new(context.subdivision.clone())),
            Box::new(TotalMaxExclusionRule::new(context.ad_events.clone(), context.now)),
            Box::new(TransferredExclusionRule::new(
                context.ad_events.clone(),
                context.now,
                config.transferred_window,
            )),
        ];
        if require_embedding {
            rules.push(Box::new(EmbeddingExclusionRule));
        }
        Self::new(rules)
    }

    /// Returns the name of the first rule excluding `creative_ad`, or `None` if every rule
    /// lets it through.
    pub fn should_exclude(&mut self, creative_ad: &CreativeAd) -> Option<&'static str> {
        for rule in &self.rules {
            let key = (rule.name(), rule.cache_key(creative_ad));
            if self.excluded_keys.contains(&key) {
                *self.excluded_counts.entry(rule.name()).or_default() += 1;
                return Some(rule.name());
            }
            if let Err(reason) = rule.should_include(creative_ad) {
                debug!(
                    rule = rule.name(),
                    creative_instance_id = %creative_ad.creative_instance_id,
                    %reason,
                    "Excluded creative ad"
                );
                self.excluded_keys.insert(key);
                *self.excluded_counts.entry(rule.name()).or_default() += 1;
                return Some(rule.name());
            }
        }
        None
    }

    /// Drops every excluded candidate, preserving order.
    pub fn apply(&mut self, creative_ads: Vec<CreativeAd>) -> Vec<CreativeAd> {
        creative_ads
            .into_iter()
            .filter(|creative_ad| self.should_exclude(creative_ad).is_none())
            .collect()
    }

    /// How many candidates each rule excluded so far.
    pub fn excluded_counts(&self) -> &BTreeMap<&'static str, usize> {
        &self.excluded_counts
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::model::{AdType, ConfirmationType};

    pub fn served_event(creative_ad: &CreativeAd, created_at: DateTime<Utc>) -> AdEvent {
        event(creative_ad, ConfirmationType::Served, created_at)
    }

    pub fn event(
        creative_ad: &CreativeAd,
        confirmation_type: ConfirmationType,
        created_at: DateTime<Utc>,
    ) -> AdEvent {
        AdEvent {
            ad_type: AdType::NotificationAd,
            confirmation_type,
            placement_id: uuid::Uuid::new_v4().to_string(),
            creative_instance_id: creative_ad.creative_instance_id.clone(),
            creative_set_id: creative_ad.creative_set_id.clone(),
            campaign_id: creative_ad.campaign_id.clone(),
            advertiser_id: creative_ad.advertiser_id.clone(),
            segment: creative_ad.segment.clone(),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct RejectCampaign(&'static str);

    impl ExclusionRule for RejectCampaign {
        fn name(&self) -> &'static str {
            "reject_campaign"
        }

        fn cache_key(&self, creative_ad: &CreativeAd) -> String {
            creative_ad.campaign_id.clone()
        }

        fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
            if creative_ad.campaign_id == self.0 && creative_ad.creative_instance_id == "ci-1" {
                return Err("rejected".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn excluded_key_skips_siblings() {
        let mut rules = ExclusionRules::new(vec![Box::new(RejectCampaign("campaign-a"))]);
        let first = CreativeAd::notification("ci-1", "cs-1", "finance").with_campaign("campaign-a");
        // The rule itself would include this sibling; the cache excludes it.
        let sibling =
            CreativeAd::notification("ci-2", "cs-2", "finance").with_campaign("campaign-a");
        let other = CreativeAd::notification("ci-3", "cs-3", "finance").with_campaign("campaign-b");

        let eligible = rules.apply(vec![first, sibling, other]);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].creative_instance_id, "ci-3");
        assert_eq!(rules.excluded_counts().get("reject_campaign"), Some(&2));
    }

    #[test]
    fn standard_rules_include_unconstrained_ad() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let context = ExclusionContext {
            now,
            local_now: now.fixed_offset(),
            ad_events: Arc::from(Vec::new()),
            reactions: Reactions::default(),
            browsing_history: vec![],
            subdivision: SubdivisionSettings::default(),
            anti_targeting: Arc::new(AntiTargetingResource::default()),
        };
        let mut rules = ExclusionRules::standard(&context, &AdsConfig::default(), false);
        let creative_ad = CreativeAd::notification("ci-1", "cs-1", "finance");
        assert_eq!(rules.should_exclude(&creative_ad), None);

        let mut rules = ExclusionRules::standard(&context, &AdsConfig::default(), true);
        assert_eq!(rules.should_exclude(&creative_ad), Some("embedding"));
    }
}
