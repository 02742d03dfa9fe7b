use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TextEmbeddingEvent {
    pub created_at: Option<DateTime<Utc>>,
    pub embedding: Vec<f32>,
}

/// Locally inferred targeting signals, rebuilt for every serving attempt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct UserModel {
    #[serde(default)]
    pub interest_segments: Vec<String>,
    #[serde(default)]
    pub latent_interest_segments: Vec<String>,
    #[serde(default)]
    pub purchase_intent_segments: Vec<String>,
    #[serde(default)]
    pub text_embedding_events: Vec<TextEmbeddingEvent>,
}

impl UserModel {
    pub fn with_interest_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interest_segments: segments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// All segments in priority order: purchase intent, latent interest, interest.
    /// Duplicates keep their first position.
    pub fn segments(&self) -> Vec<String> {
        let mut segments: Vec<String> = Vec::new();
        for segment in self
            .purchase_intent_segments
            .iter()
            .chain(&self.latent_interest_segments)
            .chain(&self.interest_segments)
        {
            if !segments.contains(segment) {
                segments.push(segment.clone());
            }
        }
        segments
    }

    /// The `max_count` highest ranked segments, reported when an opportunity arises.
    pub fn top_segments(&self, max_count: usize) -> Vec<String> {
        self.segments().into_iter().take(max_count).collect()
    }
}
