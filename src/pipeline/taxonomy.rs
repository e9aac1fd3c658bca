//! Taxonomy generation stage
//!
//! One model call over the corpus produces the topic/subtopic shells every
//! later stage hangs claims on. This call is load-bearing: a response that
//! fails validation gets exactly one corrective retry, then the run aborts.

use std::sync::Arc;

use crate::gateway::{
    self, CompletionRequest, ModelGateway, NamedSchema, RetryPolicy, strip_code_fences,
};
use crate::model::SourceIndex;
use crate::model::taxonomy::{TaxonomyOutline, Topic};
use crate::pipeline::error::{PipelineError, Stage};
use crate::pipeline::prompts;
use crate::telemetry::{CostStage, CostTracker};

const MIN_TOPICS: usize = 3;
const MAX_TOPICS: usize = 12;
const MIN_SUBTOPICS: usize = 1;
const MAX_SUBTOPICS: usize = 6;

pub struct TaxonomyBuilder {
    gateway: Arc<dyn ModelGateway>,
    costs: Arc<CostTracker>,
    retry: RetryPolicy,
    char_budget: usize,
    temperature: f32,
}

pub struct TaxonomyOutcome {
    pub topics: Vec<Topic>,
    pub warnings: Vec<String>,
}

impl TaxonomyBuilder {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        costs: Arc<CostTracker>,
        retry: RetryPolicy,
        char_budget: usize,
        temperature: f32,
    ) -> Self {
        Self {
            gateway,
            costs,
            retry,
            char_budget,
            temperature,
        }
    }

    pub async fn build(&self, index: &SourceIndex) -> Result<TaxonomyOutcome, PipelineError> {
        let mut warnings = Vec::new();
        let (texts, included) = self.select_corpus(index);
        if included < index.len() {
            let warning = format!(
                "taxonomy input truncated to character budget: {} of {} comments included",
                included,
                index.len()
            );
            tracing::warn!(
                included = included,
                total = index.len(),
                budget = self.char_budget,
                "Taxonomy corpus truncated"
            );
            warnings.push(warning);
        }

        let prompt = prompts::build_taxonomy_prompt(texts.iter().copied());
        let request = CompletionRequest::new(prompts::SYSTEM_PROMPT, prompt.clone())
            .with_schema(NamedSchema::of::<TaxonomyOutline>("taxonomy"))
            .with_temperature(self.temperature);

        let completion = gateway::complete_with_retry(self.gateway.as_ref(), request, &self.retry)
            .await
            .map_err(|source| PipelineError::Gateway {
                stage: Stage::TaxonomyBuilt,
                source,
            })?;
        self.costs.record(CostStage::Taxonomy, &completion.usage);

        let outline = match parse_outline(&completion.content) {
            Ok(outline) => outline,
            Err(validation_error) => {
                tracing::warn!(
                    error = %validation_error,
                    "Taxonomy response failed validation, sending corrective retry"
                );
                self.corrective_retry(&prompt, &validation_error).await?
            }
        };

        let topics = outline.into_shells();
        tracing::info!(
            topics = topics.len(),
            subtopics = topics.iter().map(|t| t.subtopics.len()).sum::<usize>(),
            "Taxonomy created"
        );

        Ok(TaxonomyOutcome { topics, warnings })
    }

    /// One follow-up call that feeds the validation error back to the model.
    async fn corrective_retry(
        &self,
        original_prompt: &str,
        validation_error: &str,
    ) -> Result<TaxonomyOutline, PipelineError> {
        let retry_prompt = prompts::build_taxonomy_retry_prompt(original_prompt, validation_error);
        let request = CompletionRequest::new(prompts::SYSTEM_PROMPT, retry_prompt)
            .with_schema(NamedSchema::of::<TaxonomyOutline>("taxonomy"))
            .with_temperature(self.temperature);

        let completion = gateway::complete_with_retry(self.gateway.as_ref(), request, &self.retry)
            .await
            .map_err(|source| PipelineError::Gateway {
                stage: Stage::TaxonomyBuilt,
                source,
            })?;
        self.costs.record(CostStage::Taxonomy, &completion.usage);

        parse_outline(&completion.content).map_err(PipelineError::TaxonomyGeneration)
    }

    /// Whole comments in registration order until the character budget is
    /// reached. Returns the selected texts and how many made the cut.
    fn select_corpus<'a>(&self, index: &'a SourceIndex) -> (Vec<&'a str>, usize) {
        let mut texts = Vec::new();
        let mut used = 0usize;
        for source in index.iter() {
            let len = source.text.chars().count();
            if !texts.is_empty() && used + len > self.char_budget {
                break;
            }
            used += len;
            texts.push(source.text.as_str());
        }
        let included = texts.len();
        (texts, included)
    }
}

/// Parse and structurally validate a taxonomy response.
fn parse_outline(content: &str) -> Result<TaxonomyOutline, String> {
    let outline: TaxonomyOutline = serde_json::from_str(strip_code_fences(content))
        .map_err(|e| format!("response is not valid taxonomy JSON: {}", e))?;

    let topic_count = outline.taxonomy.len();
    if !(MIN_TOPICS..=MAX_TOPICS).contains(&topic_count) {
        return Err(format!(
            "expected {}-{} topics, got {}",
            MIN_TOPICS, MAX_TOPICS, topic_count
        ));
    }

    for topic in &outline.taxonomy {
        if topic.topic_name.trim().is_empty() {
            return Err("a topic has an empty name".to_string());
        }
        let subtopic_count = topic.subtopics.len();
        if !(MIN_SUBTOPICS..=MAX_SUBTOPICS).contains(&subtopic_count) {
            return Err(format!(
                "topic '{}' has {} subtopics, expected {}-{}",
                topic.topic_name, subtopic_count, MIN_SUBTOPICS, MAX_SUBTOPICS
            ));
        }
        if topic
            .subtopics
            .iter()
            .any(|s| s.subtopic_name.trim().is_empty())
        {
            return Err(format!(
                "topic '{}' has a subtopic with an empty name",
                topic.topic_name
            ));
        }
    }

    Ok(outline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::Pricing;
    use crate::testing::{MockGateway, ok};

    fn outline_json(topics: usize, subtopics: usize) -> String {
        let topic_entries: Vec<String> = (0..topics)
            .map(|t| {
                let subtopic_entries: Vec<String> = (0..subtopics)
                    .map(|s| {
                        format!(
                            r#"{{"subtopicName": "Sub {t}-{s}", "subtopicShortDescription": "d"}}"#
                        )
                    })
                    .collect();
                format!(
                    r#"{{"topicName": "Topic {t}", "topicShortDescription": "d", "subtopics": [{}]}}"#,
                    subtopic_entries.join(",")
                )
            })
            .collect();
        format!(r#"{{"taxonomy": [{}]}}"#, topic_entries.join(","))
    }

    #[test]
    fn test_parse_valid_outline() {
        let outline = parse_outline(&outline_json(3, 2)).unwrap();
        assert_eq!(outline.taxonomy.len(), 3);
    }

    #[test]
    fn test_parse_rejects_topic_count_out_of_bounds() {
        let err = parse_outline(&outline_json(1, 2)).unwrap_err();
        assert!(err.contains("expected 3-12 topics"));
        let err = parse_outline(&outline_json(13, 2)).unwrap_err();
        assert!(err.contains("got 13"));
    }

    #[test]
    fn test_parse_rejects_subtopic_count_out_of_bounds() {
        let err = parse_outline(&outline_json(3, 7)).unwrap_err();
        assert!(err.contains("expected 1-6"));
        let err = parse_outline(&outline_json(3, 0)).unwrap_err();
        assert!(err.contains("0 subtopics"));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let err = parse_outline("not json at all").unwrap_err();
        assert!(err.contains("not valid taxonomy JSON"));
    }

    #[test]
    fn test_parse_accepts_fenced_json() {
        let fenced = format!("```json\n{}\n```", outline_json(3, 1));
        assert!(parse_outline(&fenced).is_ok());
    }

    #[tokio::test]
    async fn test_corpus_truncation_is_a_warning_not_a_failure() {
        let gateway = MockGateway::new().on("propose a way to organize", ok(outline_json(3, 1)));
        let builder = TaxonomyBuilder::new(
            Arc::new(gateway),
            Arc::new(CostTracker::new(Pricing {
                input_per_10k: 0.0,
                output_per_10k: 0.0,
            })),
            RetryPolicy {
                max_retries: 0,
                initial_backoff_ms: 1,
            },
            // Only the first comment fits the budget
            12,
            0.0,
        );

        let mut index = SourceIndex::new();
        index.register("I love cats", None);
        index.register("Dogs are the best", None);

        let outcome = builder.build(&index).await.unwrap();
        assert_eq!(outcome.topics.len(), 3);
        assert!(outcome.warnings.iter().any(|w| w.contains("truncated")));
    }
}
