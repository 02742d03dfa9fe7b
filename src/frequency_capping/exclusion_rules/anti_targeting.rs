use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::ExclusionRule;
use crate::error::AdsError;
use crate::model::CreativeAd;

/// Sites whose recent visitors must not see a creative set, keyed by creative set id.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AntiTargetingResource {
    #[serde(default)]
    pub creative_sets: BTreeMap<String, BTreeSet<String>>,
}

impl AntiTargetingResource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AdsError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

pub struct AntiTargetingExclusionRule {
    resource: Arc<AntiTargetingResource>,
    visited_hosts: BTreeSet<String>,
}

impl AntiTargetingExclusionRule {
    pub fn new(resource: Arc<AntiTargetingResource>, browsing_history: Vec<String>) -> Self {
        let visited_hosts = browsing_history.iter().filter_map(|url| host_of(url)).collect();
        Self {
            resource,
            visited_hosts,
        }
    }
}

impl ExclusionRule for AntiTargetingExclusionRule {
    fn name(&self) -> &'static str {
        "anti_targeting"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.creative_set_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        let Some(sites) = self.resource.creative_sets.get(&creative_ad.creative_set_id) else {
            return Ok(());
        };
        let visited = sites
            .iter()
            .filter_map(|site| host_of(site))
            .any(|host| self.visited_hosts.contains(&host));
        if visited {
            return Err(format!(
                "creativeSetId {} excluded due to visiting an anti-targeted site",
                creative_ad.creative_set_id
            ));
        }
        Ok(())
    }
}
