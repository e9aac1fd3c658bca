//! Output formatting stage
//!
//! Assembles the fixed report document and validates it exhaustively before
//! anything is serialized. Validation collects every violation it finds so a
//! caller can fix all of them in one pass.

use std::collections::HashSet;

use uuid::Uuid;

use crate::model::claims::{Quote, SimilarClaim};
use crate::model::report::{
    AddOns, OutputDocument, ReportBody, ReportClaim, ReportQuote, ReportReference,
    ReportSimilarClaim, ReportSubtopic, ReportTopic, SpanIndices,
};
use crate::model::source::{SourceIndex, char_slice};
use crate::model::taxonomy::Topic;
use crate::pipeline::error::{PipelineError, SchemaViolations};

pub struct OutputFormatter;

impl OutputFormatter {
    /// Build and validate the final document. Any violation is fatal and all
    /// of them are reported together.
    pub fn format(
        run_title: &str,
        run_description: &str,
        topics: &[Topic],
        index: &SourceIndex,
    ) -> Result<OutputDocument, PipelineError> {
        let document = assemble(run_title, run_description, topics, index);
        let violations = validate(&document, index);
        if !violations.is_empty() {
            return Err(PipelineError::SchemaValidation(SchemaViolations(violations)));
        }
        Ok(document)
    }
}

fn assemble(
    run_title: &str,
    run_description: &str,
    topics: &[Topic],
    index: &SourceIndex,
) -> OutputDocument {
    let report_topics = topics
        .iter()
        .map(|topic| ReportTopic {
            id: topic.id,
            title: topic.title.clone(),
            description: topic.description.clone(),
            subtopics: topic
                .subtopics
                .iter()
                .map(|subtopic| ReportSubtopic {
                    id: subtopic.id,
                    title: subtopic.title.clone(),
                    description: subtopic.description.clone(),
                    claims: subtopic
                        .claims
                        .iter()
                        .map(|claim| ReportClaim {
                            id: claim.id,
                            title: claim.title.clone(),
                            quotes: claim.quotes.iter().map(|q| format_quote(q, index)).collect(),
                            number: claim.number,
                            similar_claims: claim
                                .similar_claims
                                .iter()
                                .map(|s| format_similar(s, index))
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    OutputDocument::new(ReportBody {
        title: run_title.to_string(),
        description: run_description.to_string(),
        add_ons: AddOns::default(),
        topics: report_topics,
    })
}

fn format_quote(quote: &Quote, index: &SourceIndex) -> ReportQuote {
    let interview = index
        .resolve(quote.reference.source_id)
        .map(|s| s.label.clone())
        .unwrap_or_default();
    ReportQuote {
        id: quote.id,
        text: quote.text.clone(),
        reference: ReportReference {
            id: Uuid::new_v4(),
            source_id: quote.reference.source_id,
            interview,
            data: (
                "text".to_string(),
                SpanIndices {
                    start_idx: quote.reference.start_idx,
                    end_idx: quote.reference.end_idx,
                },
            ),
        },
    }
}

fn format_similar(similar: &SimilarClaim, index: &SourceIndex) -> ReportSimilarClaim {
    ReportSimilarClaim {
        id: similar.id,
        title: similar.title.clone(),
        quotes: similar.quotes.iter().map(|q| format_quote(q, index)).collect(),
        number: similar.number,
    }
}

/// Collect every violation in the document. Empty means valid.
pub fn validate(document: &OutputDocument, index: &SourceIndex) -> Vec<String> {
    let mut checker = DocumentChecker::new(index);
    checker.check(document);
    checker.violations
}

/// Walks a document accumulating violations rather than failing fast.
struct DocumentChecker<'a> {
    index: &'a SourceIndex,
    seen_ids: HashSet<Uuid>,
    violations: Vec<String>,
}

impl<'a> DocumentChecker<'a> {
    fn new(index: &'a SourceIndex) -> Self {
        Self {
            index,
            seen_ids: HashSet::new(),
            violations: Vec::new(),
        }
    }

    fn add_violation(&mut self, violation: String) {
        self.violations.push(violation);
    }

    /// Ids must be unique across the entire document, not just per parent.
    fn check_id(&mut self, id: Uuid, what: &str) {
        if !self.seen_ids.insert(id) {
            self.add_violation(format!("duplicate id {} on {}", id, what));
        }
    }

    fn check(&mut self, document: &OutputDocument) {
        if document.version() != crate::model::report::SCHEMA_VERSION {
            self.add_violation(format!(
                "unexpected schema version '{}'",
                document.version()
            ));
        }

        for topic in &document.body().topics {
            self.check_id(topic.id, &format!("topic '{}'", topic.title));
            if topic.title.trim().is_empty() {
                self.add_violation(format!("topic {} has an empty title", topic.id));
            }
            for subtopic in &topic.subtopics {
                self.check_subtopic(subtopic);
            }
        }
    }

    fn check_subtopic(&mut self, subtopic: &ReportSubtopic) {
        self.check_id(subtopic.id, &format!("subtopic '{}'", subtopic.title));
        if subtopic.title.trim().is_empty() {
            self.add_violation(format!("subtopic {} has an empty title", subtopic.id));
        }

        let mut numbers: Vec<u32> = Vec::new();
        for claim in &subtopic.claims {
            self.check_id(claim.id, &format!("claim '{}'", claim.title));
            if claim.title.trim().is_empty() {
                self.add_violation(format!("claim {} has an empty title", claim.id));
            }
            numbers.push(claim.number);

            for quote in &claim.quotes {
                self.check_quote(quote, &claim.title);
            }
            for similar in &claim.similar_claims {
                self.check_id(similar.id, &format!("similar claim '{}'", similar.title));
                for quote in &similar.quotes {
                    self.check_quote(quote, &similar.title);
                }
            }
        }

        // Claim numbers must be the contiguous 1-based ranks
        let mut sorted = numbers.clone();
        sorted.sort_unstable();
        let expected: Vec<u32> = (1..=numbers.len() as u32).collect();
        if sorted != expected {
            self.add_violation(format!(
                "subtopic '{}' claim numbers {:?} are not contiguous 1..{}",
                subtopic.title,
                numbers,
                numbers.len()
            ));
        }
    }

    fn check_quote(&mut self, quote: &ReportQuote, owner_title: &str) {
        self.check_id(quote.id, &format!("quote under '{}'", owner_title));
        self.check_id(
            quote.reference.id,
            &format!("quote reference under '{}'", owner_title),
        );

        let span = &quote.reference.data.1;
        let source = match self.index.resolve(quote.reference.source_id) {
            Ok(source) => source,
            Err(_) => {
                self.add_violation(format!(
                    "quote {} references unknown source {}",
                    quote.id, quote.reference.source_id
                ));
                return;
            }
        };

        let text_chars = source.text.chars().count();
        if span.start_idx >= span.end_idx || span.end_idx > text_chars {
            self.add_violation(format!(
                "quote {} has invalid span [{}, {}) for source of length {}",
                quote.id, span.start_idx, span.end_idx, text_chars
            ));
            return;
        }

        if char_slice(&source.text, span.start_idx, span.end_idx) != quote.text {
            self.add_violation(format!(
                "quote {} text does not match source span [{}, {})",
                quote.id, span.start_idx, span.end_idx
            ));
        }
    }
}
