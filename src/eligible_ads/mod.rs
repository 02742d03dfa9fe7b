//! Builds the set of creative ads that may be served to a user right now.
//!
//! Candidates are fetched for the user's segments, run through the exclusion rules,
//! paced, narrowed to the best priority, deduplicated and finally filtered against the
//! seen-ads store. The serving version picks how segments are queried.

pub mod pacing;
pub mod seen_ads;
pub mod segments;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::ads::AdsServices;
use crate::config::AdsConfig;
use crate::error::{AdsError, ConfigError};
use crate::frequency_capping::exclusion_rules::{ExclusionContext, ExclusionRules};
use crate::model::{AdEvent, AdType, CreativeAd, UserModel};

use pacing::{highest_priority, pace};
use seen_ads::filter_seen_ads;
use segments::{child_segments, parent_segments, resolve_segments, untargeted_segments};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingVersion {
    /// Child segments, then parents, then untargeted; first non-empty set wins.
    V1,
    /// One query over child, parent and untargeted segments.
    V2,
    /// As V2, restricted to creatives carrying an embedding.
    V3,
}

impl TryFrom<u32> for ServingVersion {
    type Error = ConfigError;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        match version {
            1 => Ok(ServingVersion::V1),
            2 => Ok(ServingVersion::V2),
            3 => Ok(ServingVersion::V3),
            other => Err(ConfigError::Invalid(format!(
                "unsupported serving version {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EligibleAdsResult {
    /// Inventory existed for the user's segments, whatever the filters did with it.
    pub had_opportunity: bool,
    pub creative_ads: Vec<CreativeAd>,
    /// Candidates dropped per exclusion rule.
    pub excluded_counts: BTreeMap<&'static str, usize>,
}

pub struct EligibleAds {
    version: ServingVersion,
    ad_type: AdType,
    config: Arc<AdsConfig>,
    services: AdsServices,
}

impl EligibleAds {
    pub fn new(config: Arc<AdsConfig>, services: AdsServices) -> Result<Self, ConfigError> {
        Ok(Self {
            version: ServingVersion::try_from(config.serving_version)?,
            ad_type: AdType::NotificationAd,
            config,
            services,
        })
    }

    pub fn version(&self) -> ServingVersion {
        self.version
    }

    pub async fn get_for_user_model(
        &self,
        user_model: &UserModel,
    ) -> Result<EligibleAdsResult, AdsError> {
        let ad_events: Arc<[AdEvent]> = self
            .services
            .ad_event_store
            .get_ad_events(Some(self.ad_type), None, None)
            .await?
            .into();
        let context = self.exclusion_context(ad_events);
        let mut rules =
            ExclusionRules::standard(&context, &self.config, self.version == ServingVersion::V3);

        let mut result = EligibleAdsResult::default();
        match self.version {
            ServingVersion::V1 => {
                let chain = [
                    child_segments(user_model),
                    parent_segments(user_model),
                    untargeted_segments(),
                ];
                for segments in chain.iter().filter(|segments| !segments.is_empty()) {
                    let (had_opportunity, creative_ads) =
                        self.eligible_for_segments(segments, &mut rules).await?;
                    result.had_opportunity |= had_opportunity;
                    if !creative_ads.is_empty() {
                        result.creative_ads = creative_ads;
                        break;
                    }
                }
            }
            ServingVersion::V2 | ServingVersion::V3 => {
                let segments = resolve_segments(user_model);
                let (had_opportunity, creative_ads) =
                    self.eligible_for_segments(&segments, &mut rules).await?;
                result.had_opportunity = had_opportunity;
                result.creative_ads = creative_ads;
            }
        }
        result.excluded_counts = rules.excluded_counts().clone();

        info!(
            version = ?self.version,
            had_opportunity = result.had_opportunity,
            eligible = result.creative_ads.len(),
            "Resolved eligible ads"
        );
        Ok(result)
    }

    fn exclusion_context(&self, ad_events: Arc<[AdEvent]>) -> ExclusionContext {
        let services = &self.services;
        ExclusionContext {
            now: services.clock.now(),
            local_now: services.clock.local_now(),
            ad_events,
            reactions: services.client_state.reactions(),
            browsing_history: services.ads_client.browsing_history(),
            subdivision: services.ads_client.subdivision_settings(),
            anti_targeting: services.anti_targeting.clone(),
        }
    }

    async fn eligible_for_segments(
        &self,
        segments: &BTreeSet<String>,
        rules: &mut ExclusionRules,
    ) -> Result<(bool, Vec<CreativeAd>), AdsError> {
        let candidates = self
            .services
            .database
            .get_creative_ads(self.ad_type, segments)
            .await?;
        let had_opportunity = !candidates.is_empty();
        debug!(?segments, candidates = candidates.len(), "Fetched candidate ads");

        let included = rules.apply(candidates);
        let paced = pace(included, self.services.random.as_ref());
        let prioritized = highest_priority(paced);
        let deduplicated = deduplicate(prioritized);

        let seen = self.services.client_state.seen_ads(self.ad_type);
        let filtered = filter_seen_ads(deduplicated, &seen, self.config.seen_ads_policy);
        if filtered.should_reset {
            debug!(ad_type = %self.ad_type, "All eligible ads seen, starting a new round");
            self.services.client_state.reset_seen_ads(self.ad_type);
        }
        Ok((had_opportunity, filtered.creative_ads))
    }
}

fn deduplicate(creative_ads: Vec<CreativeAd>) -> Vec<CreativeAd> {
    let mut ids = HashSet::new();
    creative_ads
        .into_iter()
        .filter(|creative_ad| ids.insert(creative_ad.creative_instance_id.clone()))
        .collect()
}
