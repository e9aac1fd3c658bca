//! Claims extraction stage
//!
//! One model call per source, with the taxonomy injected as context. Model
//! output is untrusted: every quote is re-verified against the true source
//! text and every claim must land in a known subtopic. Calls across sources
//! run concurrently but results are consumed in original source order.

use std::sync::Arc;

use futures::{StreamExt, stream};
use uuid::Uuid;

use crate::gateway::{
    self, CompletionRequest, GatewayError, ModelGateway, NamedSchema, RetryPolicy,
    strip_code_fences,
};
use crate::model::claims::{Claim, ClaimsResponse, ExtractedClaim, Quote};
use crate::model::source::{QuoteRef, Source, SourceIndex, char_slice};
use crate::model::taxonomy::{Subtopic, Topic, outline_of};
use crate::pipeline::CancelFlag;
use crate::pipeline::error::{PipelineError, Stage};
use crate::pipeline::prompts;
use crate::telemetry::{CostStage, CostTracker};

pub struct ClaimsExtractor {
    gateway: Arc<dyn ModelGateway>,
    costs: Arc<CostTracker>,
    retry: RetryPolicy,
    concurrency: usize,
    temperature: f32,
}

#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub claims_kept: usize,
    pub claims_dropped: usize,
    pub quotes_dropped: usize,
    pub sources_skipped: usize,
    pub warnings: Vec<String>,
}

impl ExtractionOutcome {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }
}

enum SourceTask {
    Completed {
        response: ClaimsResponse,
    },
    Malformed {
        error: String,
    },
    Failed(GatewayError),
    Cancelled,
}

impl ClaimsExtractor {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        costs: Arc<CostTracker>,
        retry: RetryPolicy,
        concurrency: usize,
        temperature: f32,
    ) -> Self {
        Self {
            gateway,
            costs,
            retry,
            concurrency: concurrency.max(1),
            temperature,
        }
    }

    pub async fn extract(
        &self,
        topics: &mut [Topic],
        index: &SourceIndex,
        cancel: &CancelFlag,
    ) -> Result<ExtractionOutcome, PipelineError> {
        let taxonomy_json =
            serde_json::to_string_pretty(&outline_of(topics)).unwrap_or_default();

        let sources: Vec<&Source> = index.iter().collect();
        let prompts: Vec<String> = sources
            .iter()
            .map(|source| prompts::build_claims_prompt(&taxonomy_json, &source.text))
            .collect();

        // Bounded fan-out; `buffered` yields results in input order so the
        // ranking stage sees deterministic extraction order.
        let results: Vec<SourceTask> = stream::iter(prompts.into_iter())
            .map(|prompt| {
                let gateway = Arc::clone(&self.gateway);
                let costs = Arc::clone(&self.costs);
                let retry = self.retry;
                let temperature = self.temperature;
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return SourceTask::Cancelled;
                    }
                    let request = CompletionRequest::new(prompts::SYSTEM_PROMPT, prompt)
                        .with_schema(NamedSchema::of::<ClaimsResponse>("claims"))
                        .with_temperature(temperature);
                    match gateway::complete_with_retry(gateway.as_ref(), request, &retry).await {
                        Ok(completion) => {
                            costs.record(CostStage::Claims, &completion.usage);
                            match serde_json::from_str::<ClaimsResponse>(strip_code_fences(
                                &completion.content,
                            )) {
                                Ok(response) => SourceTask::Completed { response },
                                Err(e) => SourceTask::Malformed {
                                    error: e.to_string(),
                                },
                            }
                        }
                        Err(e) => SourceTask::Failed(e),
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut outcome = ExtractionOutcome::default();
        for (source, result) in sources.iter().copied().zip(results) {
            match result {
                SourceTask::Completed { response } => {
                    ingest_response(topics, source, response, &mut outcome);
                }
                SourceTask::Malformed { error } => {
                    outcome.warn(format!(
                        "dropping claims for source {}: response was not valid claims JSON: {}",
                        source.label, error
                    ));
                }
                SourceTask::Cancelled => {
                    outcome.sources_skipped += 1;
                }
                SourceTask::Failed(e) => {
                    return Err(PipelineError::Gateway {
                        stage: Stage::ClaimsExtracted,
                        source: e,
                    });
                }
            }
        }

        tracing::info!(
            sources = sources.len(),
            sources_skipped = outcome.sources_skipped,
            claims_kept = outcome.claims_kept,
            claims_dropped = outcome.claims_dropped,
            quotes_dropped = outcome.quotes_dropped,
            "Claims extraction complete"
        );

        Ok(outcome)
    }
}

/// Fold one source's verified claims into the taxonomy.
fn ingest_response(
    topics: &mut [Topic],
    source: &Source,
    response: ClaimsResponse,
    outcome: &mut ExtractionOutcome,
) {
    for extracted in response.claims {
        let Some(subtopic) = find_subtopic(topics, &extracted.topic_name, &extracted.subtopic_name)
        else {
            outcome.claims_dropped += 1;
            outcome.warn(format!(
                "dropping claim '{}' from {}: unknown subtopic '{} / {}'",
                extracted.claim, source.label, extracted.topic_name, extracted.subtopic_name
            ));
            continue;
        };

        let quotes = verify_quotes(&extracted, source, outcome);
        if quotes.is_empty() {
            outcome.claims_dropped += 1;
            outcome.warn(format!(
                "dropping claim '{}' from {}: no quote could be verified against the source",
                extracted.claim, source.label
            ));
            continue;
        }

        subtopic.claims.push(Claim::new(extracted.claim, quotes));
        outcome.claims_kept += 1;
    }
}

/// Re-locate every quote against the true source text; drop what cannot be
/// verified verbatim.
fn verify_quotes(
    extracted: &ExtractedClaim,
    source: &Source,
    outcome: &mut ExtractionOutcome,
) -> Vec<Quote> {
    let mut quotes = Vec::new();
    for raw in &extracted.quotes {
        let hint = match (raw.start_idx, raw.end_idx) {
            (Some(start), Some(end)) => Some((start as usize, end as usize)),
            _ => None,
        };
        match locate_quote(&source.text, &raw.quote, hint) {
            Some((start_idx, end_idx, text)) => quotes.push(Quote {
                id: Uuid::new_v4(),
                text,
                reference: QuoteRef {
                    source_id: source.id,
                    start_idx,
                    end_idx,
                },
            }),
            None => {
                outcome.quotes_dropped += 1;
                outcome.warn(format!(
                    "dropping quote for claim '{}' from {}: text not found verbatim in source",
                    extracted.claim, source.label
                ));
            }
        }
    }
    quotes
}

/// Find the character span of `quote` in `text`.
///
/// The model's reported offsets are only a hint: they are trusted when the
/// spanned slice matches the quote exactly, otherwise the quote is
/// re-located by exact substring search (raw, then trimmed). Returns the
/// half-open char span and the verbatim text it covers.
pub(crate) fn locate_quote(
    text: &str,
    quote: &str,
    hint: Option<(usize, usize)>,
) -> Option<(usize, usize, String)> {
    let text_chars = text.chars().count();

    if let Some((start, end)) = hint {
        if start < end && end <= text_chars && char_slice(text, start, end) == quote {
            return Some((start, end, quote.to_string()));
        }
    }

    if let Some(span) = find_char_span(text, quote) {
        return Some((span.0, span.1, quote.to_string()));
    }

    let trimmed = quote.trim();
    if !trimmed.is_empty() && trimmed != quote {
        if let Some(span) = find_char_span(text, trimmed) {
            return Some((span.0, span.1, trimmed.to_string()));
        }
    }

    None
}

/// Byte-level substring search converted to character offsets.
fn find_char_span(text: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let byte_pos = text.find(needle)?;
    let start = text[..byte_pos].chars().count();
    let end = start + needle.chars().count();
    Some((start, end))
}

fn find_subtopic<'a>(
    topics: &'a mut [Topic],
    topic_name: &str,
    subtopic_name: &str,
) -> Option<&'a mut Subtopic> {
    let topic_name = topic_name.trim();
    let subtopic_name = subtopic_name.trim();
    topics
        .iter_mut()
        .find(|t| t.title.trim().eq_ignore_ascii_case(topic_name))?
        .subtopics
        .iter_mut()
        .find(|s| s.title.trim().eq_ignore_ascii_case(subtopic_name))
}
