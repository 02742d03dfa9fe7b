use super::ExclusionRule;
use crate::model::{CreativeAd, Reactions};

/// Advertisers the user thumbed down.
pub struct DislikeExclusionRule {
    reactions: Reactions,
}

impl DislikeExclusionRule {
    pub fn new(reactions: Reactions) -> Self {
        Self { reactions }
    }
}

impl ExclusionRule for DislikeExclusionRule {
    fn name(&self) -> &'static str {
        "dislike"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.advertiser_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        if self.reactions.is_advertiser_disliked(&creative_ad.advertiser_id) {
            return Err(format!(
                "advertiserId {} excluded due to being disliked",
                creative_ad.advertiser_id
            ));
        }
        Ok(())
    }
}

/// Creative sets the user flagged as inappropriate.
pub struct MarkedAsInappropriateExclusionRule {
    reactions: Reactions,
}

impl MarkedAsInappropriateExclusionRule {
    pub fn new(reactions: Reactions) -> Self {
        Self { reactions }
    }
}

impl ExclusionRule for MarkedAsInappropriateExclusionRule {
    fn name(&self) -> &'static str {
        "marked_as_inappropriate"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.creative_set_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        if self.reactions.is_flagged(&creative_ad.creative_set_id) {
            return Err(format!(
                "creativeSetId {} excluded due to being marked as inappropriate",
                creative_ad.creative_set_id
            ));
        }
        Ok(())
    }
}

/// Categories the user opted out of.
pub struct MarkedToNoLongerReceiveExclusionRule {
    reactions: Reactions,
}

impl MarkedToNoLongerReceiveExclusionRule {
    pub fn new(reactions: Reactions) -> Self {
        Self { reactions }
    }
}

impl ExclusionRule for MarkedToNoLongerReceiveExclusionRule {
    fn name(&self) -> &'static str {
        "marked_to_no_longer_receive"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.segment.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        if self.reactions.is_category_disliked(&creative_ad.segment) {
            return Err(format!(
                "creativeSetId {} excluded due to {} category being marked to no longer receive",
                creative_ad.creative_set_id, creative_ad.segment
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReactionType;

    #[test]
    fn disliked_advertiser_is_excluded() {
        let creative_ad = CreativeAd::notification("ci-1", "cs-1", "finance");
        let mut reactions = Reactions::default();
        let rule = DislikeExclusionRule::new(reactions.clone());
        assert!(rule.should_include(&creative_ad).is_ok());

        reactions.set_ad_reaction(&creative_ad.advertiser_id, ReactionType::Disliked);
        let rule = DislikeExclusionRule::new(reactions);
        assert!(rule.should_include(&creative_ad).is_err());
    }

    #[test]
    fn liked_advertiser_is_included() {
        let creative_ad = CreativeAd::notification("ci-1", "cs-1", "finance");
        let mut reactions = Reactions::default();
        reactions.set_ad_reaction(&creative_ad.advertiser_id, ReactionType::Liked);
        assert!(DislikeExclusionRule::new(reactions).should_include(&creative_ad).is_ok());
    }

    #[test]
    fn flagged_creative_set_is_excluded() {
        let creative_ad = CreativeAd::notification("ci-1", "cs-1", "finance");
        let mut reactions = Reactions::default();
        reactions.flagged_ads.insert("cs-1".to_string());
        let rule = MarkedAsInappropriateExclusionRule::new(reactions);
        assert!(rule.should_include(&creative_ad).is_err());
    }

    #[test]
    fn opted_out_category_is_excluded() {
        let creative_ad = CreativeAd::notification("ci-1", "cs-1", "finance-banking");
        let mut reactions = Reactions::default();
        reactions.set_category_reaction("finance-banking", ReactionType::Disliked);
        let rule = MarkedToNoLongerReceiveExclusionRule::new(reactions);
        assert!(rule.should_include(&creative_ad).is_err());
    }
}
