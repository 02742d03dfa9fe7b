use std::collections::BTreeSet;

use crate::config::SeenAdsPolicy;
use crate::model::CreativeAd;

/// Result of filtering candidates against the seen-ads store.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenAdsFilter {
    pub creative_ads: Vec<CreativeAd>,
    /// Every candidate had been seen and the round-robin cycle starts over.
    pub should_reset: bool,
}

/// Drops candidates the user has already been served.
///
/// Round robin starts a new cycle once every candidate has been seen; `Exclude` never
/// does.
pub fn filter_seen_ads(
    creative_ads: Vec<CreativeAd>,
    seen: &BTreeSet<String>,
    policy: SeenAdsPolicy,
) -> SeenAdsFilter {
    if policy == SeenAdsPolicy::Disabled {
        return SeenAdsFilter {
            creative_ads,
            should_reset: false,
        };
    }

    let (unseen, seen_ads): (Vec<_>, Vec<_>) = creative_ads
        .into_iter()
        .partition(|creative_ad| !seen.contains(&creative_ad.creative_instance_id));

    if unseen.is_empty() && !seen_ads.is_empty() && policy == SeenAdsPolicy::RoundRobin {
        return SeenAdsFilter {
            creative_ads: seen_ads,
            should_reset: true,
        };
    }

    SeenAdsFilter {
        creative_ads: unseen,
        should_reset: false,
    }
}
