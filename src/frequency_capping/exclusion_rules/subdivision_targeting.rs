use super::ExclusionRule;
use crate::model::subdivision::{country_code_of, is_subdivision_code};
use crate::model::{CreativeAd, SubdivisionSettings};

pub struct SubdivisionTargetingExclusionRule {
    settings: SubdivisionSettings,
}

impl SubdivisionTargetingExclusionRule {
    pub fn new(settings: SubdivisionSettings) -> Self {
        Self { settings }
    }

    fn targets_subdivision(creative_ad: &CreativeAd) -> bool {
        creative_ad
            .geo_targets
            .iter()
            .any(|geo_target| is_subdivision_code(geo_target))
    }
}

impl ExclusionRule for SubdivisionTargetingExclusionRule {
    fn name(&self) -> &'static str {
        "subdivision_targeting"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.campaign_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        if !self.settings.is_supported_locale() || self.settings.is_disabled() {
            if Self::targets_subdivision(creative_ad) {
                return Err(format!(
                    "creativeSetId {} excluded as subdivision targeting is not allowed",
                    creative_ad.creative_set_id
                ));
            }
            return Ok(());
        }

        let Some(subdivision) = self.settings.effective_subdivision() else {
            return Err(format!(
                "creativeSetId {} excluded as the subdivision is unknown",
                creative_ad.creative_set_id
            ));
        };

        let country_code = country_code_of(subdivision);
        if creative_ad.geo_targets.contains(subdivision)
            || creative_ad.geo_targets.contains(country_code)
        {
            return Ok(());
        }
        Err(format!(
            "creativeSetId {} excluded as not within the targeted subdivision",
            creative_ad.creative_set_id
        ))
    }
}
