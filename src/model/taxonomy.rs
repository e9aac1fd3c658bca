//! Taxonomy tree and the model-facing outline types
//!
//! `Topic`/`Subtopic` form the in-memory tree that the pipeline stages
//! populate and reorder. The `*Outline` types mirror the JSON the model is
//! asked to return when proposing the taxonomy (titles and short
//! descriptions only, no claims).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::claims::Claim;

/// A top-level topic with its subtopics.
#[derive(Debug, Clone)]
pub struct Topic {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub subtopics: Vec<Subtopic>,
}

impl Topic {
    /// Total claims across all subtopics.
    pub fn claim_count(&self) -> usize {
        self.subtopics.iter().map(|s| s.claims.len()).sum()
    }
}

/// A subtopic holding the claims assigned to it.
#[derive(Debug, Clone)]
pub struct Subtopic {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub claims: Vec<Claim>,
}

/// Taxonomy proposal returned by the model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaxonomyOutline {
    pub taxonomy: Vec<TopicOutline>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopicOutline {
    #[serde(rename = "topicName")]
    pub topic_name: String,
    #[serde(rename = "topicShortDescription")]
    pub topic_short_description: String,
    pub subtopics: Vec<SubtopicOutline>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubtopicOutline {
    #[serde(rename = "subtopicName")]
    pub subtopic_name: String,
    #[serde(rename = "subtopicShortDescription")]
    pub subtopic_short_description: String,
}

impl TaxonomyOutline {
    /// Materialize empty topic/subtopic shells with fresh ids.
    pub fn into_shells(self) -> Vec<Topic> {
        self.taxonomy
            .into_iter()
            .map(|t| Topic {
                id: Uuid::new_v4(),
                title: t.topic_name,
                description: t.topic_short_description,
                subtopics: t
                    .subtopics
                    .into_iter()
                    .map(|s| Subtopic {
                        id: Uuid::new_v4(),
                        title: s.subtopic_name,
                        description: s.subtopic_short_description,
                        claims: Vec::new(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Outline view of an already-built taxonomy, used to inject the tree into
/// claim-extraction prompts without the claims.
pub fn outline_of(topics: &[Topic]) -> TaxonomyOutline {
    TaxonomyOutline {
        taxonomy: topics
            .iter()
            .map(|t| TopicOutline {
                topic_name: t.title.clone(),
                topic_short_description: t.description.clone(),
                subtopics: t
                    .subtopics
                    .iter()
                    .map(|s| SubtopicOutline {
                        subtopic_name: s.title.clone(),
                        subtopic_short_description: s.description.clone(),
                    })
                    .collect(),
            })
            .collect(),
    }
}
