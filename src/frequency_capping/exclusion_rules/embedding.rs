use super::ExclusionRule;
use crate::model::CreativeAd;

/// Embedding-based serving can only rank creatives that carry an embedding.
pub struct EmbeddingExclusionRule;

impl ExclusionRule for EmbeddingExclusionRule {
    fn name(&self) -> &'static str {
        "embedding"
    }

    fn cache_key(&self, creative_ad: &CreativeAd) -> String {
        creative_ad.creative_instance_id.clone()
    }

    fn should_include(&self, creative_ad: &CreativeAd) -> Result<(), String> {
        match &creative_ad.embedding {
            Some(embedding) if !embedding.is_empty() => Ok(()),
            _ => Err(format!(
                "creativeSetId {} does not have a matching embedding",
                creative_ad.creative_set_id
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_non_empty_embedding() {
        let mut creative_ad = CreativeAd::notification("ci-1", "cs-1", "finance");
        assert!(EmbeddingExclusionRule.should_include(&creative_ad).is_err());
        creative_ad.embedding = Some(vec![]);
        assert!(EmbeddingExclusionRule.should_include(&creative_ad).is_err());
        creative_ad.embedding = Some(vec![0.1, 0.2]);
        assert!(EmbeddingExclusionRule.should_include(&creative_ad).is_ok());
    }
}
